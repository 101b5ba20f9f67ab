use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::cnf::Cnf;
use crate::ident::{ComplexIdent, Ident};
use crate::nodes::Node;

/// One classification of one input position. A position may carry several
/// of these when a token admits more than one terminal reading.
#[derive(Debug, Clone)]
pub struct Token {
  pub class: ComplexIdent,
  pub text: String,
}

impl Token {
  pub fn new(class: ComplexIdent, text: impl Into<String>) -> Self {
    Self {
      class,
      text: text.into(),
    }
  }
}

/// What one rule position matches against. Generated idents match by
/// identity; everything else matches by attribute subsumption.
#[derive(Debug, Clone)]
enum Selector {
  Unique(Ident),
  Complex(ComplexIdent),
}

impl Selector {
  fn of(ident: &Ident, terminals: &FxHashMap<Ident, ComplexIdent>) -> Self {
    if ident.generated {
      Selector::Unique(ident.clone())
    } else {
      let complex = terminals
        .get(ident)
        .cloned()
        .unwrap_or_else(|| ComplexIdent::plain(ident.id.clone()));
      Selector::Complex(complex)
    }
  }

  fn matches(&self, node: &Node) -> bool {
    match (self, node.head()) {
      (Selector::Unique(u), Some(h)) => u == h,
      (Selector::Unique(_), None) => false,
      // nonterminal heads carry no attributes, so only a property-free
      // selector can take them, by id
      (Selector::Complex(c), Some(h)) => {
        !h.generated && c.properties.is_empty() && c.id == h.id
      }
      (Selector::Complex(c), None) => c.select(node.token_class().unwrap()),
    }
  }
}

impl fmt::Display for Selector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Selector::Unique(i) => write!(f, "{}", i),
      Selector::Complex(c) => write!(f, "{}", c),
    }
  }
}

#[derive(Debug, Clone)]
struct BinaryRule {
  head: Ident,
  left: Selector,
  right: Selector,
}

#[derive(Debug, Clone)]
struct UnitRule {
  head: Ident,
  sel: Selector,
}

/// The triangular CYK chart. `cells[(x, y)]` with `y ≤ x` enumerates every
/// derivation over input positions `y ..= x`; the diagonal is seeded from
/// the classified input, everything else is computed line by line from
/// strictly shorter spans. Cells are only ever addressed by `parse`, so the
/// seeded/filled distinction cannot be violated from outside.
pub struct Matrix {
  binary: Vec<BinaryRule>,
  unit: Vec<UnitRule>,
  chains: FxHashMap<Ident, Vec<Ident>>,
  start: Ident,
  can_be_empty: bool,

  cells: FxHashMap<(usize, usize), Vec<Rc<Node>>>,
  len: usize,
}

impl Matrix {
  pub fn new(cnf: &Cnf) -> Self {
    let mut binary = Vec::new();
    for (head, alts) in &cnf.rules {
      for dual in alts.values() {
        binary.push(BinaryRule {
          head: head.clone(),
          left: Selector::of(&dual.0, &cnf.terminals),
          right: Selector::of(&dual.1, &cnf.terminals),
        });
      }
    }

    let mut unit = Vec::new();
    for (symbol, heads) in &cnf.stop_rules {
      let sel = Selector::of(symbol, &cnf.terminals);
      for head in heads {
        unit.push(UnitRule {
          head: head.clone(),
          sel: sel.clone(),
        });
      }
    }

    let chains = cnf
      .chains
      .iter()
      .map(|obj| (obj.from.clone(), obj.chain.clone()))
      .collect();

    Self {
      binary,
      unit,
      chains,
      start: Ident::plain(cnf.start_rule.clone()),
      can_be_empty: cnf.can_be_empty,
      cells: FxHashMap::default(),
      len: 0,
    }
  }

  /// Runs the chart over the classified input and returns every collapsed
  /// derivation covering all of it. No derivation means the input is not in
  /// the language; ambiguity means several trees. Roots are not filtered by
  /// start symbol (callers wanting only the start restrict on the tree
  /// head), but bare tokens and normalization intermediates are dropped.
  pub fn parse(&mut self, input: &[Vec<Token>]) -> Vec<Node> {
    self.cells.clear();
    self.len = input.len();

    if input.is_empty() {
      return if self.can_be_empty {
        vec![Node::Tree {
          head: self.start.clone(),
          children: Vec::new(),
        }]
      } else {
        Vec::new()
      };
    }

    self.seed(input);
    for line in 1..self.len {
      for y in 0..self.len - line {
        self.fill_cell(y + line, y);
      }
    }

    let roots = self
      .cells
      .get(&(self.len - 1, 0))
      .cloned()
      .unwrap_or_default();

    roots
      .iter()
      .filter_map(|root| match self.collapse(root) {
        tree @ Node::Tree { .. } if !tree.head().unwrap().generated => Some(tree),
        _ => None,
      })
      .collect()
  }

  /// Diagonal seeding: each position's classifications, chain-closed.
  fn seed(&mut self, input: &[Vec<Token>]) {
    for (i, classifications) in input.iter().enumerate() {
      let mut nodes = Vec::new();
      for token in classifications {
        let leaf = Rc::new(Node::token(token.class.clone(), token.text.clone()));
        nodes.extend(self.close(leaf));
      }
      self.cells.insert((i, i), nodes);
    }
  }

  /// Every split of the span: the left part from the diagonal outward, the
  /// bottom part shrinking with it. Each binary-rule match is chain-closed
  /// into the cell.
  fn fill_cell(&mut self, x: usize, y: usize) {
    debug_assert!(y < x, "diagonal cells are seeded, not filled");

    let mut res = Vec::new();
    for k in y..x {
      let (left, bottom) = match (self.cells.get(&(k, y)), self.cells.get(&(x, k + 1))) {
        (Some(l), Some(b)) => (l, b),
        _ => continue,
      };

      for l in left {
        for b in bottom {
          for rule in &self.binary {
            if rule.left.matches(l) && rule.right.matches(b) {
              res.extend(self.close(Rc::new(Node::Raw {
                head: rule.head.clone(),
                left: l.clone(),
                right: b.clone(),
              })));
            }
          }
        }
      }
    }

    self.cells.insert((x, y), res);
  }

  /// Breadth-first closure over the unit rules: every head reachable from
  /// `node` through stop rules, including `node` itself. Terminates because
  /// chain elimination left the unit-rule graph acyclic.
  fn close(&self, node: Rc<Node>) -> Vec<Rc<Node>> {
    let mut out = Vec::new();
    let mut frontier = vec![node];

    while !frontier.is_empty() {
      let mut next = Vec::new();
      for n in &frontier {
        for rule in &self.unit {
          if rule.sel.matches(n) {
            next.push(Rc::new(Node::Single {
              head: rule.head.clone(),
              inner: n.clone(),
            }));
          }
        }
      }
      out.append(&mut frontier);
      frontier = next;
    }

    out
  }

  /// Rewrites a chart node into the caller-visible tree: nodes headed by a
  /// chain ident are expanded back into the recorded derivation first, and
  /// every other generated intermediate is spliced into its parent.
  fn collapse(&self, node: &Rc<Node>) -> Node {
    match node.as_ref() {
      Node::Token { .. } => node.as_ref().clone(),

      Node::Raw { head, .. } | Node::Single { head, .. } => {
        if let Some(chain) = self.chains.get(head) {
          return self.collapse(&expand_chain(node, chain));
        }

        let mut gathered = Vec::new();
        self.gather(node, &mut gathered);

        Node::Tree {
          head: head.clone(),
          children: gathered.iter().map(|c| self.collapse(c)).collect(),
        }
      }

      Node::Tree { .. } => panic!("collapse reached an already collapsed node"),
    }
  }

  fn gather(&self, node: &Rc<Node>, out: &mut Vec<Rc<Node>>) {
    match node.as_ref() {
      Node::Token { .. } => out.push(node.clone()),
      Node::Single { inner, .. } => self.gather_child(inner, out),
      Node::Raw { left, right, .. } => {
        self.gather_child(left, out);
        self.gather_child(right, out);
      }
      Node::Tree { .. } => panic!("collapse reached an already collapsed node"),
    }
  }

  fn gather_child(&self, child: &Rc<Node>, out: &mut Vec<Rc<Node>>) {
    match child.head() {
      // binarization and repetition intermediates dissolve into the parent;
      // chain idents survive gathering and expand during collapse
      Some(h) if h.generated && !self.chains.contains_key(h) => self.gather(child, out),
      _ => out.push(child.clone()),
    }
  }

  #[cfg(test)]
  fn cell_coords(&self) -> Vec<(usize, usize)> {
    self.cells.keys().copied().collect()
  }
}

/// The user wrote `chain[0] → chain[1] → … → X` where only `X` has a
/// non-chain definition: rename the definition node back to `X` and wrap
/// one unit layer per remaining chain element, outermost first.
fn expand_chain(node: &Rc<Node>, chain: &[Ident]) -> Rc<Node> {
  let last = chain.last().unwrap().clone();

  let mut rebuilt = match node.as_ref() {
    Node::Raw { left, right, .. } => Rc::new(Node::Raw {
      head: last,
      left: left.clone(),
      right: right.clone(),
    }),
    Node::Single { inner, .. } => Rc::new(Node::Single {
      head: last,
      inner: inner.clone(),
    }),
    _ => unreachable!("chain idents only head nonterminal nodes"),
  };

  for ident in chain[..chain.len() - 1].iter().rev() {
    rebuilt = Rc::new(Node::Single {
      head: ident.clone(),
      inner: rebuilt,
    });
  }

  rebuilt
}

impl fmt::Display for Matrix {
  /// Debug grid of cell head lists; `·` marks the unused lower triangle.
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for y in 0..self.len {
      write!(f, "y={}", y)?;
      for x in 0..self.len {
        if x < y {
          write!(f, " | ·")?;
          continue;
        }

        let names = self
          .cells
          .get(&(x, y))
          .map(|nodes| {
            nodes
              .iter()
              .map(|n| match n.head() {
                Some(h) => h.to_string(),
                None => n.token_class().unwrap().to_string(),
              })
              .collect::<Vec<_>>()
              .join(",")
          })
          .unwrap_or_default();
        write!(f, " | {}", names)?;
      }
      writeln!(f)?;
    }
    Ok(())
  }
}

#[cfg(test)]
use rustc_hash::FxHashSet;

#[cfg(test)]
fn tiny_cnf() -> Cnf {
  // S : A B ;  A : a ;  B : b ;
  use crate::rules::DualRule;

  let dual = DualRule(Ident::plain("A"), Ident::plain("B"));
  let mut rules: FxHashMap<Ident, FxHashMap<u64, DualRule>> = FxHashMap::default();
  rules.insert(
    Ident::plain("S"),
    [(dual.content_hash(), dual)].into_iter().collect(),
  );

  let mut stop_rules: FxHashMap<Ident, FxHashSet<Ident>> = FxHashMap::default();
  stop_rules
    .entry(Ident::plain("a"))
    .or_default()
    .insert(Ident::plain("A"));
  stop_rules
    .entry(Ident::plain("b"))
    .or_default()
    .insert(Ident::plain("B"));

  Cnf {
    start_rule: "S".to_string(),
    can_be_empty: false,
    chains: crate::chains::ChainList::new(),
    rules,
    stop_rules,
    terminals: FxHashMap::default(),
  }
}

#[cfg(test)]
fn word(s: &str) -> Vec<Token> {
  vec![Token::new(ComplexIdent::plain(s), s)]
}

#[test]
fn binary_and_unit_rules_combine() {
  let mut m = Matrix::new(&tiny_cnf());
  let trees = m.parse(&[word("a"), word("b")]);

  assert_eq!(trees.len(), 1);
  assert_eq!(trees[0].head().unwrap(), &Ident::plain("S"));
  assert_eq!(trees[0].leaves(), vec!["a", "b"]);

  match &trees[0] {
    Node::Tree { children, .. } => {
      assert_eq!(children.len(), 2);
      assert_eq!(children[0].head().unwrap(), &Ident::plain("A"));
      assert_eq!(children[1].head().unwrap(), &Ident::plain("B"));
    }
    other => panic!("expected a tree, got {:?}", other),
  }
}

#[test]
fn unparseable_input_yields_no_trees() {
  let mut m = Matrix::new(&tiny_cnf());
  assert!(m.parse(&[word("b"), word("a")]).is_empty());

  // a lone `a` still derives an A, but never the start symbol
  let trees = m.parse(&[word("a")]);
  assert!(trees.iter().all(|t| t.head() != Some(&Ident::plain("S"))));
}

#[test]
fn empty_input_depends_on_can_be_empty() {
  let mut m = Matrix::new(&tiny_cnf());
  assert!(m.parse(&[]).is_empty());

  let mut cnf = tiny_cnf();
  cnf.can_be_empty = true;
  let mut m = Matrix::new(&cnf);
  let trees = m.parse(&[]);
  assert_eq!(trees.len(), 1);
  assert_eq!(trees[0].head().unwrap(), &Ident::plain("S"));
  assert!(trees[0].leaves().is_empty());
}

#[test]
fn chart_stays_triangular() {
  let mut m = Matrix::new(&tiny_cnf());
  m.parse(&[word("a"), word("b")]);

  for (x, y) in m.cell_coords() {
    assert!(y <= x, "cell ({}, {}) is above the diagonal", x, y);
  }
}

#[test]
fn ambiguous_classifications_seed_multiple_nodes() {
  // one token that reads as both a and b cannot make an S alone, but two
  // of them can
  let mut m = Matrix::new(&tiny_cnf());
  let both = vec![
    Token::new(ComplexIdent::plain("a"), "ab"),
    Token::new(ComplexIdent::plain("b"), "ab"),
  ];

  let trees = m.parse(&[both.clone(), both]);
  assert_eq!(trees.len(), 1);
  assert_eq!(trees[0].leaves(), vec!["ab", "ab"]);
}

#[test]
fn chart_display_shows_cell_heads() {
  let mut m = Matrix::new(&tiny_cnf());
  m.parse(&[word("a"), word("b")]);

  let grid = m.to_string();
  assert!(grid.contains('S'));
  assert!(grid.contains('·'));
}

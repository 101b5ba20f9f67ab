#[macro_use]
extern crate lazy_static;

pub mod bnf;
pub mod chains;
pub mod cnf;
pub mod ebnf;
pub mod error;
pub mod ident;
pub mod matrix;
pub mod nodes;
pub mod parse_grammar;
pub mod rules;

mod binarize;
mod epsilon;

pub use crate::bnf::Bnf;
pub use crate::chains::{ChainList, ChainObj};
pub use crate::cnf::Cnf;
pub use crate::ebnf::{Ebnf, Expr};
pub use crate::error::Error;
pub use crate::ident::{ComplexIdent, Ident, IdentCounter, EMPTY_HASH};
pub use crate::matrix::{Matrix, Token};
pub use crate::nodes::Node;
pub use crate::parse_grammar::parse;
pub use crate::rules::{DualRule, IdentSeq, RuleSet};

/// Grammar text straight to normal form: parse, unwrap to BNF, normalize.
pub fn compile(src: &str, terminals: &[&str], start_rule: &str) -> Result<Cnf, Error> {
  parse_grammar::parse(src, terminals)?.to_cnf(start_rule)
}

#[cfg(test)]
fn words(input: &str) -> Vec<Vec<Token>> {
  input
    .split_whitespace()
    .map(|w| vec![Token::new(ComplexIdent::plain(w), w)])
    .collect()
}

#[cfg(test)]
fn with_start(trees: Vec<Node>, start: &str) -> Vec<Node> {
  trees
    .into_iter()
    .filter(|t| t.head().map(|h| h.id == start) == Some(true))
    .collect()
}

#[cfg(test)]
fn assert_no_generated_heads(node: &Node) {
  if let Node::Tree { head, children } = node {
    assert!(!head.generated, "generated head {} left in output", head);
    for child in children {
      assert_no_generated_heads(child);
    }
  }
}

#[test]
fn parses_the_canonical_cnf_example() {
  let cnf = compile(
    "S : A B | B C ;
     A : B A | a ;
     B : C C | b ;
     C : A B | a ;",
    &["a", "b"],
    "S",
  )
  .unwrap();

  let mut m = Matrix::new(&cnf);
  let trees = with_start(m.parse(&words("b a a b a")), "S");

  assert!(!trees.is_empty());
  for tree in &trees {
    assert_eq!(tree.leaves(), vec!["b", "a", "a", "b", "a"]);
    assert_no_generated_heads(tree);
  }
}

#[test]
fn nullable_rules_are_eliminated_but_still_derivable() {
  // S : A B C | D S ;  A : ε ;  B : A C ;  C : ε ;  D : d ;
  let mut bnf = Bnf::default();
  bnf
    .terminals
    .insert(Ident::plain("d"), ComplexIdent::plain("d"));
  bnf
    .rules
    .append(&Ident::plain("S"), rules::seq(&["A", "B", "C"]));
  bnf.rules.append(&Ident::plain("S"), rules::seq(&["D", "S"]));
  bnf.rules.append(&Ident::plain("A"), IdentSeq::empty());
  bnf.rules.append(&Ident::plain("B"), rules::seq(&["A", "C"]));
  bnf.rules.append(&Ident::plain("C"), IdentSeq::empty());
  bnf.rules.append(&Ident::plain("D"), rules::seq(&["d"]));

  let cnf = bnf.into_cnf("S").unwrap();
  assert!(cnf.can_be_empty);

  let mut m = Matrix::new(&cnf);
  let trees = with_start(m.parse(&words("d")), "S");

  assert_eq!(trees.len(), 1);
  assert_eq!(trees[0].leaves(), vec!["d"]);
  assert_no_generated_heads(&trees[0]);
}

#[test]
fn chain_heavy_grammar_parses_through_recorded_chains() {
  let cnf = compile(
    "S    : g1 ;
     g1   : g2 C b | g1 A | g1 | A | g2 ;
     g2   : d b ;
     A    : x y | x ;
     C    : d x ;",
    &["d", "b", "x", "y"],
    "S",
  )
  .unwrap();

  // every unit rule is gone; the traversals are tabulated instead
  assert!(!cnf.chains.is_empty());
  for symbol in cnf.stop_rules.keys() {
    assert!(cnf.terminals.contains_key(symbol));
  }

  let mut m = Matrix::new(&cnf);
  let trees = with_start(m.parse(&words("d b d x b")), "S");

  assert!(!trees.is_empty());
  for tree in &trees {
    assert_eq!(tree.leaves(), vec!["d", "b", "d", "x", "b"]);
    assert_no_generated_heads(tree);
  }
}

#[test]
fn repetition_accepts_empty_and_repeated_input() {
  let cnf = compile("S : { a } ;", &["a"], "S").unwrap();
  assert!(cnf.can_be_empty);

  let mut m = Matrix::new(&cnf);

  let empty = with_start(m.parse(&[]), "S");
  assert_eq!(empty.len(), 1);
  assert!(empty[0].leaves().is_empty());

  for input in ["a", "a a", "a a a a"] {
    let trees = with_start(m.parse(&words(input)), "S");
    assert!(!trees.is_empty(), "{:?} should parse", input);
    for tree in &trees {
      assert_eq!(tree.leaves().len(), input.split_whitespace().count());
      assert_no_generated_heads(tree);
    }
  }

  assert!(with_start(m.parse(&words("a b")), "S").is_empty());
}

#[test]
fn attribute_filters_subsume_token_classifications() {
  let cnf = compile("S : noun<number=sg> ;", &["noun"], "S").unwrap();
  let mut m = Matrix::new(&cnf);

  let observed = ComplexIdent::plain("noun")
    .with("number", Some("sg"))
    .with("gender", Some("m"));
  let trees = with_start(m.parse(&[vec![Token::new(observed, "dog")]]), "S");
  assert_eq!(trees.len(), 1);
  assert_eq!(trees[0].leaves(), vec!["dog"]);

  let plural = ComplexIdent::plain("noun").with("number", Some("pl"));
  assert!(m.parse(&[vec![Token::new(plural, "dogs")]]).is_empty());
}

#[test]
fn ambiguity_yields_every_derivation() {
  let cnf = compile("S : S S | a ;", &["a"], "S").unwrap();
  let mut m = Matrix::new(&cnf);

  let trees = m.parse(&words("a a a"));
  assert_eq!(trees.len(), 2, "left- and right-leaning trees");
  assert_ne!(trees[0], trees[1]);

  for tree in &trees {
    assert_eq!(tree.head().unwrap(), &Ident::plain("S"));
    assert_eq!(tree.leaves(), vec!["a", "a", "a"]);
  }
}

#[test]
fn alternative_order_does_not_change_the_tree_set() {
  let render = |src: &str| {
    let cnf = compile(src, &["a"], "S").unwrap();
    let mut m = Matrix::new(&cnf);
    let mut seen = m
      .parse(&words("a a"))
      .iter()
      .map(|t| format!("{:?}", t))
      .collect::<Vec<_>>();
    seen.sort();
    seen
  };

  assert_eq!(render("S : S S | a ;"), render("S : a | S S ;"));
}

#[test]
fn string_constants_match_only_their_own_literal() {
  let cnf = compile(r#"S : "+" num ;"#, &["num"], "S").unwrap();
  let mut m = Matrix::new(&cnf);

  let plus = cnf
    .terminals
    .values()
    .find(|c| c.id == ident::CONST_ID)
    .cloned()
    .unwrap();

  let input = vec![
    vec![Token::new(plus, "+")],
    vec![Token::new(ComplexIdent::plain("num"), "7")],
  ];
  let trees = with_start(m.parse(&input), "S");
  assert_eq!(trees.len(), 1);
  assert_eq!(trees[0].leaves(), vec!["+", "7"]);

  // a different literal's classification does not select it
  let minus = ComplexIdent::plain(ident::CONST_ID).with("-", None);
  let input = vec![
    vec![Token::new(minus, "-")],
    vec![Token::new(ComplexIdent::plain("num"), "7")],
  ];
  assert!(with_start(m.parse(&input), "S").is_empty());
}

#[test]
fn compile_rejects_an_unknown_start_rule() {
  assert!(matches!(
    compile("S : a ;", &["a"], "T"),
    Err(Error::UnknownStartRule(name)) if name == "T"
  ));
}

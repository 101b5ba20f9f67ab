use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::bnf::Bnf;
use crate::error::Error;
use crate::ident::Ident;
use crate::rules::{hash_idents, IdentSeq, RuleSet};

/// One tabulated unit-chain traversal `A → B → … → X`, replaced everywhere
/// by the fresh ident `from`. Keeping the path lets the parser rebuild the
/// derivation the user actually wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainObj {
  pub from: Ident,
  pub chain: Vec<Ident>,
}

impl fmt::Display for ChainObj {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ::", self.from)?;
    for (i, ident) in self.chain.iter().enumerate() {
      if i > 0 {
        write!(f, " ->")?;
      }
      write!(f, " {}", ident)?;
    }
    Ok(())
  }
}

/// Chain records keyed by the digest of the traversal, so a recurring path
/// maps onto one fresh ident.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainList {
  entries: FxHashMap<u64, ChainObj>,
}

impl ChainList {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &ChainObj> {
    self.entries.values()
  }

  /// The fresh ident standing in for `chain`, minting one on first sight.
  /// Chains never repeat a head; the tabulation path-guard upholds that.
  pub fn get_or_generate(
    &mut self,
    chain: &[Ident],
    fresh: &mut dyn FnMut() -> Ident,
  ) -> Ident {
    debug_assert!(
      chain.iter().collect::<FxHashSet<_>>().len() == chain.len(),
      "cyclic chain"
    );

    let key = hash_idents(chain);
    if let Some(obj) = self.entries.get(&key) {
      return obj.from.clone();
    }

    let from = fresh();
    self.entries.insert(
      key,
      ChainObj {
        from: from.clone(),
        chain: chain.to_vec(),
      },
    );
    from
  }

  /// For each chain head, every fresh ident of a chain beginning there:
  /// the substitution `replace_everywhere` applies after tabulation.
  pub fn replaces(&self) -> FxHashMap<Ident, Vec<IdentSeq>> {
    let mut res: FxHashMap<Ident, Vec<IdentSeq>> = FxHashMap::default();
    for obj in self.entries.values() {
      res
        .entry(obj.chain[0].clone())
        .or_default()
        .push(IdentSeq::single(obj.from.clone()));
    }
    res
  }
}

impl fmt::Display for ChainList {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut objs = self.entries.values().collect::<Vec<_>>();
    objs.sort_by(|a, b| a.from.cmp(&b.from));

    for obj in objs {
      writeln!(f, "{}", obj)?;
    }
    Ok(())
  }
}

impl Bnf {
  /// Replaces every maximal unit chain by a fresh head carrying the chained
  /// definition, recording the traversal. Self-chains are dropped on sight;
  /// a chain step back into the current path is cut silently (the cut is
  /// visible on the debug log).
  pub fn pop_chains(&mut self) -> Result<ChainList, Error> {
    let original = std::mem::take(&mut self.rules);
    let mut res = RuleSet::new();
    let mut chains = ChainList::new();

    for (head, rhs) in original.iter() {
      if !rhs.is_chain(|i| self.terminals.contains_key(i)) {
        res.append(head, rhs.clone());
        continue;
      }

      let next = &rhs.0[0];
      if head == next {
        tracing::debug!(head = %head, "dropping self-chain");
        continue;
      }

      self.tabulate(
        &original,
        &mut res,
        &mut chains,
        vec![head.clone(), next.clone()],
      )?;
    }

    for (from, to) in chains.replaces() {
      res = res.replace_everywhere(&from, &to);
    }

    self.rules = res;
    Ok(chains)
  }

  /// Walks from the last element of `path`, extending the path through
  /// chain rules and materializing a fresh head at every non-chain
  /// definition reached.
  fn tabulate(
    &mut self,
    original: &RuleSet,
    res: &mut RuleSet,
    chains: &mut ChainList,
    path: Vec<Ident>,
  ) -> Result<(), Error> {
    let last = path.last().unwrap().clone();
    let alts = original
      .alternatives(&last)
      .ok_or_else(|| Error::MissingRule(last.clone()))?
      .cloned()
      .collect::<Vec<_>>();

    for rhs in alts {
      if rhs.is_chain(|i| self.terminals.contains_key(i)) {
        let next = rhs.0[0].clone();
        if path.contains(&next) {
          tracing::debug!(
            path = %IdentSeq(path.clone()),
            next = %next,
            "cutting cyclic chain"
          );
          continue;
        }

        let mut extended = path.clone();
        extended.push(next);
        self.tabulate(original, res, chains, extended)?;
        continue;
      }

      let fresh = chains.get_or_generate(&path, &mut || {
        self.counter.new_ident(&path[0].id)
      });
      res.append(&fresh, rhs);
    }

    Ok(())
  }
}

#[cfg(test)]
use crate::ident::ComplexIdent;
#[cfg(test)]
use crate::rules::seq;

#[cfg(test)]
fn chain_fixture() -> Bnf {
  // S    : g1 ;
  // g1   : g2 C b | g1 A | g1 | A | g2 ;
  // g2   : d b ;
  // A    : x y | x ;
  // C    : d x ;
  let mut bnf = Bnf::default();
  for t in ["d", "b", "x", "y"] {
    bnf
      .terminals
      .insert(Ident::plain(t), ComplexIdent::plain(t));
  }

  bnf.rules.append(&Ident::plain("S"), seq(&["g1"]));
  bnf.rules.append(&Ident::plain("g1"), seq(&["g2", "C", "b"]));
  bnf.rules.append(&Ident::plain("g1"), seq(&["g1", "A"]));
  bnf.rules.append(&Ident::plain("g1"), seq(&["g1"]));
  bnf.rules.append(&Ident::plain("g1"), seq(&["A"]));
  bnf.rules.append(&Ident::plain("g1"), seq(&["g2"]));
  bnf.rules.append(&Ident::plain("g2"), seq(&["d", "b"]));
  bnf.rules.append(&Ident::plain("A"), seq(&["x", "y"]));
  bnf.rules.append(&Ident::plain("A"), seq(&["x"]));
  bnf.rules.append(&Ident::plain("C"), seq(&["d", "x"]));
  bnf
}

#[test]
fn chains_are_tabulated_and_removed() {
  let mut bnf = chain_fixture();
  bnf.binarize();
  let chains = bnf.pop_chains().unwrap();

  let mut paths = chains
    .iter()
    .map(|obj| {
      obj
        .chain
        .iter()
        .map(|i| i.id.clone())
        .collect::<Vec<_>>()
        .join(" ")
    })
    .collect::<Vec<_>>();
  paths.sort();

  assert_eq!(
    paths,
    vec!["S g1", "S g1 A", "S g1 g2", "g1 A", "g1 g2"]
  );

  // no unit rule over a nonterminal survives
  for (_, rhs) in bnf.rules.iter() {
    assert!(!rhs.is_chain(|i| bnf.terminals.contains_key(i)));
  }
}

#[test]
fn chain_entries_never_repeat_a_head() {
  let mut bnf = chain_fixture();
  bnf.binarize();
  let chains = bnf.pop_chains().unwrap();

  for obj in chains.iter() {
    let distinct = obj.chain.iter().collect::<FxHashSet<_>>();
    assert_eq!(distinct.len(), obj.chain.len(), "cycle in {}", obj);
  }
}

#[test]
fn chain_heads_are_substituted_on_right_hand_sides() {
  let mut bnf = chain_fixture();
  bnf.binarize();
  let chains = bnf.pop_chains().unwrap();

  // g1 : g1 A had its inner g1 expanded to the fresh heads of chains
  // rooted at g1.
  let g1_chains = chains
    .iter()
    .filter(|obj| obj.chain[0].id == "g1")
    .map(|obj| obj.from.clone())
    .collect::<FxHashSet<_>>();
  assert_eq!(g1_chains.len(), 2);

  let g1 = Ident::plain("g1");
  let bodies = bnf
    .rules
    .alternatives(&g1)
    .unwrap()
    .cloned()
    .collect::<Vec<_>>();

  for fresh in &g1_chains {
    assert!(
      bodies
        .iter()
        .any(|rhs| rhs.len() == 2 && rhs.0[0] == *fresh && rhs.0[1].id == "A"),
      "missing substituted body for {}",
      fresh
    );
  }
}

#[test]
fn pop_chains_is_idempotent() {
  let mut bnf = chain_fixture();
  bnf.binarize();
  bnf.pop_chains().unwrap();

  let once = bnf.rules.clone();
  let again = bnf.pop_chains().unwrap();

  assert!(again.is_empty());
  assert_eq!(bnf.rules, once);
}

#[test]
fn chain_to_an_undefined_head_is_fatal() {
  let mut bnf = Bnf::default();
  bnf.rules.append(&Ident::plain("S"), seq(&["Q"]));

  assert!(matches!(
    bnf.pop_chains(),
    Err(Error::MissingRule(i)) if i.id == "Q"
  ));
}
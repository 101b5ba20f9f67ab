use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cnf::Cnf;
use crate::error::Error;
use crate::ident::{ComplexIdent, Ident, IdentCounter};
use crate::rules::{DualRule, RuleSet};

/// Plain BNF: every alternative is an identifier sequence. Mutated in place
/// by the normalization passes, then consumed into an immutable [`Cnf`].
#[derive(Debug, Clone, Default)]
pub struct Bnf {
  pub rules: RuleSet,
  pub terminals: FxHashMap<Ident, ComplexIdent>,
  pub counter: IdentCounter,
}

impl Bnf {
  pub fn is_terminal(&self, i: &Ident) -> bool {
    self.terminals.contains_key(i)
  }

  /// Runs the full normalization pipeline (binarize, ε-elimination, chain
  /// elimination) and splits the survivors by arity into binary rules and
  /// stop rules. A surviving rule of any other arity is a pipeline bug.
  pub fn into_cnf(mut self, start_rule: &str) -> Result<Cnf, Error> {
    let start = Ident::plain(start_rule);
    if !self.rules.has_head(&start) {
      return Err(Error::UnknownStartRule(start_rule.to_string()));
    }

    self.binarize();
    let nullable = self.remove_epsilon();
    let can_be_empty = nullable.contains(&start);
    let chains = self.pop_chains()?;

    let mut rules: FxHashMap<Ident, FxHashMap<u64, DualRule>> = FxHashMap::default();
    let mut stop_rules: FxHashMap<Ident, FxHashSet<Ident>> = FxHashMap::default();

    for (head, rhs) in self.rules.iter() {
      match rhs.len() {
        0 => return Err(Error::EmptyRule(head.clone())),
        1 => {
          stop_rules
            .entry(rhs.0[0].clone())
            .or_default()
            .insert(head.clone());
        }
        2 => {
          let dual = DualRule(rhs.0[0].clone(), rhs.0[1].clone());
          rules
            .entry(head.clone())
            .or_default()
            .insert(dual.content_hash(), dual);
        }
        n => return Err(Error::OverlongRule(head.clone(), n)),
      }
    }

    Ok(Cnf {
      start_rule: start_rule.to_string(),
      can_be_empty,
      chains,
      rules,
      stop_rules,
      terminals: self.terminals,
    })
  }
}

impl fmt::Display for Bnf {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.rules)
  }
}

#[test]
fn unknown_start_rule_is_fatal() {
  let bnf = Bnf::default();
  assert!(matches!(
    bnf.into_cnf("S"),
    Err(Error::UnknownStartRule(s)) if s == "S"
  ));
}

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::chains::ChainList;
use crate::ident::{ComplexIdent, Ident};
use crate::rules::DualRule;

/// Chomsky normal form, the immutable end of the normalization pipeline.
///
/// Binary rules are keyed by head. Stop rules are the surviving unit
/// associations, keyed by their right-hand symbol: reaching that symbol
/// means every head listed with it has been derived too. The chain list
/// maps fresh idents back to the user-written unit derivations they
/// replaced, and the terminals table carries the attribute form behind
/// every non-generated selector.
#[derive(Debug, Clone)]
pub struct Cnf {
  pub start_rule: String,
  pub can_be_empty: bool,
  pub chains: ChainList,

  pub rules: FxHashMap<Ident, FxHashMap<u64, DualRule>>,
  pub stop_rules: FxHashMap<Ident, FxHashSet<Ident>>,

  pub terminals: FxHashMap<Ident, ComplexIdent>,
}

impl Cnf {
  pub fn rule_count(&self) -> usize {
    self.rules.values().map(|alts| alts.len()).sum::<usize>()
      + self.stop_rules.values().map(|heads| heads.len()).sum::<usize>()
  }
}

impl fmt::Display for Cnf {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut heads = self.rules.keys().collect::<Vec<_>>();
    heads.sort();

    for head in heads {
      let mut bodies = self.rules[head].values().collect::<Vec<_>>();
      bodies.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

      for body in bodies {
        writeln!(f, "{} -> {} .", head, body)?;
      }
    }

    let mut stops = self.stop_rules.keys().collect::<Vec<_>>();
    stops.sort();

    for symbol in stops {
      let mut heads = self.stop_rules[symbol].iter().collect::<Vec<_>>();
      heads.sort();
      for head in heads {
        writeln!(f, ". {} <- {}", symbol, head)?;
      }
    }

    write!(f, "{}", self.chains)
  }
}

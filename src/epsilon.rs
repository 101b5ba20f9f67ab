use rustc_hash::{FxHashMap, FxHashSet};

use crate::bnf::Bnf;
use crate::ident::{ComplexIdent, Ident};
use crate::rules::{expand_positions, IdentSeq, RuleSet};

impl Bnf {
  /// Removes ε alternatives: finds every nullable head, expands each rule
  /// over the presence/absence of its nullable symbols, drops the empty
  /// expansions, then scrubs symbols that can no longer derive anything.
  /// Returns the nullable set, so the caller can record whether the start
  /// symbol accepted the empty input before the evidence is erased.
  pub fn remove_epsilon(&mut self) -> FxHashSet<Ident> {
    let nullable = self.find_nullable();

    let mut rewritten = RuleSet::new();
    for (head, rhs) in self.rules.iter() {
      let options = rhs
        .iter()
        .map(|i| {
          if nullable.contains(i) {
            vec![IdentSeq::empty(), IdentSeq::single(i.clone())]
          } else {
            vec![IdentSeq::single(i.clone())]
          }
        })
        .collect::<Vec<_>>();

      for variant in expand_positions(&options) {
        if !variant.is_empty() {
          rewritten.append(head, variant);
        }
      }
    }

    self.rules = filter_completely_empty(&rewritten, &self.terminals);

    nullable
  }

  /// Nullable detection by counting. Each rule keeps a countdown of symbols
  /// not yet known nullable; each nonterminal keeps back-references to every
  /// RHS occurrence of itself. Marking a head nullable decrements the
  /// counters of every rule that mentions it, once per occurrence, until no
  /// counter reaches zero anymore.
  pub fn find_nullable(&self) -> FxHashSet<Ident> {
    let mut counters: FxHashMap<Ident, Vec<usize>> = FxHashMap::default();
    let mut concerned: FxHashMap<Ident, Vec<(Ident, usize)>> = FxHashMap::default();

    for head in self.rules.heads() {
      let alts = self.rules.alternatives(head).unwrap().collect::<Vec<_>>();
      counters.insert(head.clone(), alts.iter().map(|a| a.len()).collect());

      for (idx, alt) in alts.iter().enumerate() {
        for symbol in alt.iter() {
          if self.is_terminal(symbol) {
            continue;
          }
          concerned
            .entry(symbol.clone())
            .or_default()
            .push((head.clone(), idx));
        }
      }
    }

    let mut nullable: FxHashSet<Ident> = FxHashSet::default();
    loop {
      let newly = counters
        .iter()
        .filter(|(head, counts)| {
          !nullable.contains(*head) && counts.iter().any(|c| *c == 0)
        })
        .map(|(head, _)| head.clone())
        .collect::<Vec<_>>();

      if newly.is_empty() {
        return nullable;
      }

      for head in newly {
        tracing::debug!(head = %head, "nullable");
        nullable.insert(head.clone());

        if let Some(refs) = concerned.get(&head) {
          for (owner, idx) in refs {
            counters.get_mut(owner).unwrap()[*idx] -= 1;
          }
        }
      }
    }
  }
}

/// Drops symbols that derive nothing at all (their alternatives vanished
/// with the ε rules, or they were never defined) from every RHS, and rules
/// that lose all their symbols with them.
///
/// ```text
/// S : B | B C | A B | A B C | D S ;   D : d ;
/// ```
///
/// with undefined A, B, C shrinks to `S : D S ; D : d ;`.
fn filter_completely_empty(
  rules: &RuleSet,
  terminals: &FxHashMap<Ident, ComplexIdent>,
) -> RuleSet {
  let mut res = RuleSet::new();
  let mut confirmed = FxHashSet::default();

  for (head, rhs) in rules.iter() {
    let kept = rhs
      .iter()
      .filter(|i| !derives_nothing(rules, i, terminals, &mut confirmed))
      .cloned()
      .collect::<Vec<_>>();

    if !kept.is_empty() {
      res.append(head, IdentSeq(kept));
    }
  }

  res
}

fn derives_nothing(
  rules: &RuleSet,
  ident: &Ident,
  terminals: &FxHashMap<Ident, ComplexIdent>,
  confirmed: &mut FxHashSet<Ident>,
) -> bool {
  let mut visiting = FxHashSet::default();
  derives_nothing_inner(rules, ident, terminals, confirmed, &mut visiting)
}

fn derives_nothing_inner(
  rules: &RuleSet,
  ident: &Ident,
  terminals: &FxHashMap<Ident, ComplexIdent>,
  confirmed: &mut FxHashSet<Ident>,
  visiting: &mut FxHashSet<Ident>,
) -> bool {
  if terminals.contains_key(ident) {
    return false;
  }
  if confirmed.contains(ident) {
    return true;
  }
  // a head currently on the path cannot contribute a terminal to itself
  if !visiting.insert(ident.clone()) {
    return true;
  }

  let empty = match rules.alternatives(ident) {
    None => true,
    Some(mut alts) => alts.all(|alt| {
      alt
        .iter()
        .all(|s| derives_nothing_inner(rules, s, terminals, confirmed, visiting))
    }),
  };

  visiting.remove(ident);
  if empty {
    confirmed.insert(ident.clone());
  }

  empty
}

#[cfg(test)]
use crate::rules::seq;

#[cfg(test)]
fn terminals(ids: &[&str]) -> FxHashMap<Ident, ComplexIdent> {
  ids
    .iter()
    .map(|s| (Ident::plain(*s), ComplexIdent::plain(*s)))
    .collect()
}

#[cfg(test)]
fn sorted_bodies(bnf: &Bnf, head: &str) -> Vec<IdentSeq> {
  let mut v = bnf
    .rules
    .alternatives(&Ident::plain(head))
    .map(|alts| alts.cloned().collect::<Vec<_>>())
    .unwrap_or_default();
  v.sort();
  v
}

#[test]
fn nullable_set_reaches_through_indirection() {
  // S : A B C | D S ;  A : ε ;  B : A C ;  C : ε ;  D : d ;
  let mut bnf = Bnf {
    terminals: terminals(&["d"]),
    ..Default::default()
  };
  bnf.rules.append(&Ident::plain("S"), seq(&["A", "B", "C"]));
  bnf.rules.append(&Ident::plain("S"), seq(&["D", "S"]));
  bnf.rules.append(&Ident::plain("A"), IdentSeq::empty());
  bnf.rules.append(&Ident::plain("B"), seq(&["A", "C"]));
  bnf.rules.append(&Ident::plain("C"), IdentSeq::empty());
  bnf.rules.append(&Ident::plain("D"), seq(&["d"]));

  let nullable = bnf.find_nullable();

  let mut got = nullable.iter().map(|i| i.id.clone()).collect::<Vec<_>>();
  got.sort();
  assert_eq!(got, vec!["A", "B", "C", "S"]);
}

#[test]
fn duplicate_occurrences_count_separately() {
  // B : A A with A : ε, so B must come out nullable.
  let mut bnf = Bnf::default();
  bnf.rules.append(&Ident::plain("B"), seq(&["A", "A"]));
  bnf.rules.append(&Ident::plain("A"), IdentSeq::empty());

  let nullable = bnf.find_nullable();
  assert!(nullable.contains(&Ident::plain("B")));
}

#[test]
fn epsilon_rules_are_rewritten_away() {
  let mut bnf = Bnf {
    terminals: terminals(&["d"]),
    ..Default::default()
  };
  bnf.rules.append(&Ident::plain("S"), seq(&["A", "B", "C"]));
  bnf.rules.append(&Ident::plain("S"), seq(&["D", "S"]));
  bnf.rules.append(&Ident::plain("A"), IdentSeq::empty());
  bnf.rules.append(&Ident::plain("B"), seq(&["A", "C"]));
  bnf.rules.append(&Ident::plain("C"), IdentSeq::empty());
  bnf.rules.append(&Ident::plain("D"), seq(&["d"]));

  bnf.remove_epsilon();

  // A, B, C derive only ε and disappear entirely; S keeps D S and the
  // variant with its own nullable tail dropped.
  assert_eq!(sorted_bodies(&bnf, "S"), vec![seq(&["D"]), seq(&["D", "S"])]);
  assert_eq!(sorted_bodies(&bnf, "A"), Vec::<IdentSeq>::new());
  assert_eq!(sorted_bodies(&bnf, "B"), Vec::<IdentSeq>::new());
  assert_eq!(sorted_bodies(&bnf, "D"), vec![seq(&["d"])]);

  for (_, rhs) in bnf.rules.iter() {
    assert!(!rhs.is_empty());
  }
}

#[test]
fn left_recursive_repetition_survives_the_empty_filter() {
  // X : ε | X a ; S : X, the shape repetition unwrapping produces.
  let mut bnf = Bnf {
    terminals: terminals(&["a"]),
    ..Default::default()
  };
  bnf.rules.append(&Ident::plain("S"), seq(&["X"]));
  bnf.rules.append(&Ident::plain("X"), IdentSeq::empty());
  bnf.rules.append(&Ident::plain("X"), seq(&["X", "a"]));

  let nullable = bnf.remove_epsilon();

  assert!(nullable.contains(&Ident::plain("S")));
  assert!(nullable.contains(&Ident::plain("X")));
  assert_eq!(sorted_bodies(&bnf, "X"), vec![seq(&["X", "a"]), seq(&["a"])]);
  assert_eq!(sorted_bodies(&bnf, "S"), vec![seq(&["X"])]);
}

#[test]
fn remove_epsilon_is_idempotent() {
  let mut bnf = Bnf {
    terminals: terminals(&["a", "d"]),
    ..Default::default()
  };
  bnf.rules.append(&Ident::plain("S"), seq(&["A", "S"]));
  bnf.rules.append(&Ident::plain("S"), seq(&["d"]));
  bnf.rules.append(&Ident::plain("A"), IdentSeq::empty());
  bnf.rules.append(&Ident::plain("A"), seq(&["a"]));

  bnf.remove_epsilon();
  let once = bnf.rules.clone();
  bnf.remove_epsilon();

  assert_eq!(bnf.rules, once);
}
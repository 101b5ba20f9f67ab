use crate::bnf::Bnf;
use crate::ident::Ident;
use crate::rules::{IdentSeq, RuleSet};

impl Bnf {
  /// Splits every rule longer than two symbols into a cascade of binary
  /// rules over fresh generated heads: `A → x₁ G₁`, `G₁ → x₂ G₂`, …
  /// Fresh heads inherit the owning rule's base id.
  pub fn binarize(&mut self) {
    let original = std::mem::take(&mut self.rules);
    let mut res = RuleSet::new();

    for (head, rhs) in original.iter() {
      let replaced = split_long(rhs.clone(), &mut res, &mut || {
        self.counter.new_ident(&head.id)
      });
      res.append(head, replaced);
    }

    self.rules = res;
  }
}

fn split_long(
  rhs: IdentSeq,
  extra: &mut RuleSet,
  fresh: &mut dyn FnMut() -> Ident,
) -> IdentSeq {
  if rhs.len() <= 2 {
    return rhs;
  }

  let mut symbols = rhs.0;
  let first = symbols.remove(0);
  let g = fresh();
  let rest = split_long(IdentSeq(symbols), extra, fresh);
  extra.append(&g, rest);

  IdentSeq(vec![first, g])
}

#[cfg(test)]
use crate::rules::seq;

#[test]
fn long_rules_cascade_into_binary_ones() {
  let mut bnf = Bnf::default();
  let s = Ident::plain("S");
  bnf.rules.append(&s, seq(&["a", "b", "c", "d"]));

  bnf.binarize();

  assert_eq!(bnf.rules.rule_count(), 3);

  // S : a G1 ; G1 : b G2 ; G2 : c d ;
  let top = bnf.rules.alternatives(&s).unwrap().next().unwrap().clone();
  assert_eq!(top.len(), 2);
  assert_eq!(top.0[0], Ident::plain("a"));

  let g1 = top.0[1].clone();
  assert!(g1.generated);
  assert_eq!(g1.id, "S");

  let mid = bnf.rules.alternatives(&g1).unwrap().next().unwrap().clone();
  assert_eq!(mid.0[0], Ident::plain("b"));

  let g2 = mid.0[1].clone();
  let tail = bnf.rules.alternatives(&g2).unwrap().next().unwrap().clone();
  assert_eq!(tail, seq(&["c", "d"]));
}

#[test]
fn short_rules_are_untouched() {
  let mut bnf = Bnf::default();
  let s = Ident::plain("S");
  bnf.rules.append(&s, seq(&["a", "b"]));
  bnf.rules.append(&s, seq(&["a"]));

  let before = bnf.rules.clone();
  bnf.binarize();
  assert_eq!(bnf.rules, before);
}

#[test]
fn binarize_is_idempotent() {
  let mut bnf = Bnf::default();
  let s = Ident::plain("S");
  bnf.rules.append(&s, seq(&["a", "b", "c", "d", "e"]));

  bnf.binarize();
  let once = bnf.rules.clone();
  bnf.binarize();

  assert_eq!(bnf.rules, once);
}
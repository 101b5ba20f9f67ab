use std::fmt;

use rustc_hash::FxHashMap;

use crate::bnf::Bnf;
use crate::cnf::Cnf;
use crate::error::Error;
use crate::ident::{ComplexIdent, Ident, IdentCounter};
use crate::rules::{expand_positions, IdentSeq, RuleSet};

/// An extended-BNF right-hand side. A closed sum: normalization pattern
/// matches over it, there is no open hierarchy to dispatch through.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Ident(Ident),
  Group(Box<Expr>),
  Opt(Box<Expr>),
  Repeat(Box<Expr>),
  Seq(Vec<Expr>),
  Alts(Vec<Expr>),
}

impl Expr {
  /// Flattens this expression into plain BNF: the list of alternative
  /// right-hand sides it stands for, plus any helper rules introduced along
  /// the way (only repetition needs those).
  pub fn unwrap_bnf(&self, fresh: &mut dyn FnMut() -> Ident) -> (Vec<IdentSeq>, RuleSet) {
    match self {
      Expr::Ident(i) => (vec![IdentSeq::single(i.clone())], RuleSet::new()),

      Expr::Group(e) => e.unwrap_bnf(fresh),

      Expr::Opt(e) => {
        let (mut reps, rules) = e.unwrap_bnf(fresh);
        reps.push(IdentSeq::empty());
        (reps, rules)
      }

      // { A | B } becomes a fresh X with X = ε | X A | X B.
      Expr::Repeat(e) => {
        let (reps, mut rules) = e.unwrap_bnf(fresh);
        let x = fresh();

        rules.append(&x, IdentSeq::empty());
        for alt in reps {
          let mut body = vec![x.clone()];
          body.extend(alt.0);
          rules.append(&x, IdentSeq(body));
        }

        (vec![IdentSeq::single(x)], rules)
      }

      Expr::Seq(es) => {
        let mut rules = RuleSet::new();
        let options = es
          .iter()
          .map(|e| {
            let (reps, more) = e.unwrap_bnf(fresh);
            rules.merge(more);
            reps
          })
          .collect::<Vec<_>>();

        (expand_positions(&options), rules)
      }

      Expr::Alts(es) => {
        let mut reps = Vec::new();
        let mut rules = RuleSet::new();
        for e in es {
          let (more_reps, more_rules) = e.unwrap_bnf(fresh);
          reps.extend(more_reps);
          rules.merge(more_rules);
        }
        (reps, rules)
      }
    }
  }
}

impl fmt::Display for Expr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Expr::Ident(i) => write!(f, "{}", i),
      Expr::Group(e) => write!(f, "( {} )", e),
      Expr::Opt(e) => write!(f, "[ {} ]", e),
      Expr::Repeat(e) => write!(f, "{{ {} }}", e),
      Expr::Seq(es) => join(f, es, " "),
      Expr::Alts(es) => join(f, es, " | "),
    }
  }
}

fn join(f: &mut fmt::Formatter<'_>, es: &[Expr], sep: &str) -> fmt::Result {
  for (i, e) in es.iter().enumerate() {
    if i > 0 {
      write!(f, "{}", sep)?;
    }
    write!(f, "{}", e)?;
  }
  Ok(())
}

/// The grammar as the surface parser hands it over: expression alternatives
/// per head, the declared terminals with their attribute forms, and the
/// string constants keyed by content digest.
#[derive(Debug, Clone, Default)]
pub struct Ebnf {
  pub rules: FxHashMap<Ident, Vec<Expr>>,
  pub terminals: FxHashMap<Ident, ComplexIdent>,
  pub constants: FxHashMap<u64, String>,
}

impl Ebnf {
  /// Unwraps every expression into plain rule alternatives. Empty
  /// alternatives of named rules are filtered here; ε survives only inside
  /// the helper rules repetition introduces.
  pub fn to_bnf(&self) -> Bnf {
    let mut counter = IdentCounter::new();
    let mut rules = RuleSet::new();

    for (name, exprs) in &self.rules {
      for expr in exprs {
        let (reps, more) = expr.unwrap_bnf(&mut || counter.new_ident(&name.id));
        rules.append_all(name, reps.into_iter().filter(|r| !r.is_empty()));
        rules.merge(more);
      }
    }

    Bnf {
      rules,
      terminals: self.terminals.clone(),
      counter,
    }
  }

  pub fn to_cnf(&self, start_rule: &str) -> Result<Cnf, Error> {
    self.to_bnf().into_cnf(start_rule)
  }
}

impl fmt::Display for Ebnf {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut heads = self.rules.keys().collect::<Vec<_>>();
    heads.sort();

    for head in heads {
      for expr in &self.rules[head] {
        writeln!(f, "{} ::= {} ;", head, expr)?;
      }
    }
    Ok(())
  }
}

#[cfg(test)]
fn id(s: &str) -> Expr {
  Expr::Ident(Ident::plain(s))
}

#[cfg(test)]
fn unwrap(e: &Expr) -> (Vec<IdentSeq>, RuleSet) {
  let mut counter = IdentCounter::new();
  e.unwrap_bnf(&mut || counter.new_ident("S"))
}

#[test]
fn ident_unwraps_to_itself() {
  let (reps, rules) = unwrap(&id("A"));
  assert_eq!(reps, vec![IdentSeq::single(Ident::plain("A"))]);
  assert_eq!(rules.rule_count(), 0);
}

#[test]
fn option_adds_an_empty_alternative() {
  let (reps, rules) = unwrap(&Expr::Opt(Box::new(id("A"))));
  assert_eq!(
    reps,
    vec![IdentSeq::single(Ident::plain("A")), IdentSeq::empty()]
  );
  assert_eq!(rules.rule_count(), 0);
}

#[test]
fn seq_takes_the_cartesian_product() {
  let e = Expr::Seq(vec![
    id("A"),
    Expr::Opt(Box::new(id("B"))),
    id("C"),
  ]);
  let (reps, _) = unwrap(&e);

  assert_eq!(
    reps,
    vec![
      crate::rules::seq(&["A", "B", "C"]),
      crate::rules::seq(&["A", "C"]),
    ]
  );
}

#[test]
fn alts_union_their_alternatives() {
  let e = Expr::Alts(vec![id("A"), Expr::Seq(vec![id("B"), id("C")])]);
  let (reps, _) = unwrap(&e);

  assert_eq!(
    reps,
    vec![crate::rules::seq(&["A"]), crate::rules::seq(&["B", "C"])]
  );
}

#[test]
fn repeat_introduces_a_fresh_left_recursive_head() {
  let e = Expr::Repeat(Box::new(Expr::Alts(vec![id("A"), id("B")])));
  let (reps, rules) = unwrap(&e);

  assert_eq!(reps.len(), 1);
  let x = reps[0].0[0].clone();
  assert!(x.generated);

  let mut bodies = rules.alternatives(&x).unwrap().cloned().collect::<Vec<_>>();
  bodies.sort();
  assert_eq!(
    bodies,
    vec![
      IdentSeq::empty(),
      IdentSeq(vec![x.clone(), Ident::plain("A")]),
      IdentSeq(vec![x.clone(), Ident::plain("B")]),
    ]
  );
}

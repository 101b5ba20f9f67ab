use std::cmp::Ordering;
use std::fmt;

use rustc_hash::FxHashMap;

use crate::ident::{digest, Ident, EMPTY_HASH};

pub const EPSILON: &str = "ε";

/// One right-hand side: an ordered, possibly empty run of idents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentSeq(pub Vec<Ident>);

impl IdentSeq {
  pub fn empty() -> Self {
    Self(Vec::new())
  }

  pub fn single(i: Ident) -> Self {
    Self(vec![i])
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Ident> {
    self.0.iter()
  }

  /// A chain is a single symbol that is not a terminal.
  pub fn is_chain(&self, is_terminal: impl Fn(&Ident) -> bool) -> bool {
    self.0.len() == 1 && !is_terminal(&self.0[0])
  }

  pub fn content_hash(&self) -> u64 {
    hash_idents(&self.0)
  }
}

pub(crate) fn hash_idents(idents: &[Ident]) -> u64 {
  if idents.is_empty() {
    return EMPTY_HASH;
  }

  let mut bytes = Vec::with_capacity(idents.len() * 8);
  for i in idents {
    bytes.extend_from_slice(&i.content_hash().to_le_bytes());
  }
  digest(&bytes)
}

impl fmt::Display for IdentSeq {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.0.is_empty() {
      return write!(f, "{}", EPSILON);
    }
    for (i, ident) in self.0.iter().enumerate() {
      if i > 0 {
        write!(f, " ")?;
      }
      write!(f, "{}", ident)?;
    }
    Ok(())
  }
}

impl PartialOrd for IdentSeq {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for IdentSeq {
  fn cmp(&self, other: &Self) -> Ordering {
    for (a, b) in self.0.iter().zip(other.0.iter()) {
      match a.cmp(b) {
        Ordering::Equal => continue,
        ord => return ord,
      }
    }
    self.0.len().cmp(&other.0.len())
  }
}

impl From<Vec<Ident>> for IdentSeq {
  fn from(v: Vec<Ident>) -> Self {
    Self(v)
  }
}

/// A binary CNF rule body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DualRule(pub Ident, pub Ident);

impl DualRule {
  pub fn content_hash(&self) -> u64 {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&self.0.content_hash().to_le_bytes());
    bytes[8..].copy_from_slice(&self.1.content_hash().to_le_bytes());
    digest(&bytes)
  }
}

impl fmt::Display for DualRule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.0, self.1)
  }
}

/// head → alternatives, with alternatives deduplicated by content digest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
  by_head: FxHashMap<Ident, FxHashMap<u64, IdentSeq>>,
}

impl RuleSet {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn append(&mut self, head: &Ident, rhs: IdentSeq) {
    self
      .by_head
      .entry(head.clone())
      .or_default()
      .insert(rhs.content_hash(), rhs);
  }

  pub fn append_all(&mut self, head: &Ident, bodies: impl IntoIterator<Item = IdentSeq>) {
    for rhs in bodies {
      self.append(head, rhs);
    }
  }

  /// Union with another set, per-head and hash-deduplicated.
  pub fn merge(&mut self, other: RuleSet) {
    for (head, alts) in other.by_head {
      self.by_head.entry(head).or_default().extend(alts);
    }
  }

  pub fn has_head(&self, head: &Ident) -> bool {
    self.by_head.contains_key(head)
  }

  pub fn alternatives(&self, head: &Ident) -> Option<impl Iterator<Item = &IdentSeq>> {
    self.by_head.get(head).map(|alts| alts.values())
  }

  pub fn heads(&self) -> impl Iterator<Item = &Ident> {
    self.by_head.keys()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&Ident, &IdentSeq)> {
    self
      .by_head
      .iter()
      .flat_map(|(head, alts)| alts.values().map(move |rhs| (head, rhs)))
  }

  pub fn rule_count(&self) -> usize {
    self.by_head.values().map(|alts| alts.len()).sum()
  }

  /// Whether `head` has an ε alternative; `None` if `head` is unknown.
  pub fn contains_empty(&self, head: &Ident) -> Option<bool> {
    self
      .by_head
      .get(head)
      .map(|alts| alts.contains_key(&EMPTY_HASH))
  }

  /// Replaces every RHS occurrence of `target` by each of `replacements`,
  /// expanding the cartesian product over occurrences. Replacements may be
  /// empty sequences; variations that end up empty are dropped.
  pub fn replace_everywhere(&self, target: &Ident, replacements: &[IdentSeq]) -> RuleSet {
    let mut res = RuleSet::new();

    for (head, rhs) in self.iter() {
      let options = rhs
        .iter()
        .map(|i| {
          if i == target {
            replacements.to_vec()
          } else {
            vec![IdentSeq::single(i.clone())]
          }
        })
        .collect::<Vec<_>>();

      for variant in expand_positions(&options) {
        if !variant.is_empty() {
          res.append(head, variant);
        }
      }
    }

    res
  }
}

impl fmt::Display for RuleSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut heads = self.by_head.keys().collect::<Vec<_>>();
    heads.sort();

    for head in heads {
      let mut alts = self.by_head[head].values().collect::<Vec<_>>();
      alts.sort();

      write!(f, "{} :", head)?;
      for (i, alt) in alts.iter().enumerate() {
        if i > 0 {
          write!(f, " |")?;
        }
        write!(f, " {}", alt)?;
      }
      writeln!(f, " ;")?;
    }
    Ok(())
  }
}

/// Concatenates one choice per position, for every combination of choices.
/// `[[A], [B, ε]]` becomes `[A B, A]`. This is the workhorse behind
/// sequence unwrapping, nullable substitution and chain replacement.
pub(crate) fn expand_positions(options: &[Vec<IdentSeq>]) -> Vec<IdentSeq> {
  let mut acc = vec![IdentSeq::empty()];

  for choices in options {
    let mut next = Vec::with_capacity(acc.len() * choices.len());
    for prefix in &acc {
      for choice in choices {
        let mut joined = prefix.0.clone();
        joined.extend(choice.0.iter().cloned());
        next.push(IdentSeq(joined));
      }
    }
    acc = next;
  }

  acc
}

#[cfg(test)]
pub(crate) fn seq(ids: &[&str]) -> IdentSeq {
  IdentSeq(ids.iter().map(|s| Ident::plain(*s)).collect())
}

#[test]
fn append_deduplicates_by_content() {
  let mut rs = RuleSet::new();
  let s = Ident::plain("S");
  rs.append(&s, seq(&["A", "B"]));
  rs.append(&s, seq(&["A", "B"]));
  rs.append(&s, seq(&["B", "C"]));

  assert_eq!(rs.rule_count(), 2);
}

#[test]
fn empty_sequence_hashes_to_the_sentinel() {
  assert_eq!(IdentSeq::empty().content_hash(), EMPTY_HASH);
  assert_ne!(seq(&["A"]).content_hash(), EMPTY_HASH);
  assert_eq!(IdentSeq::empty().to_string(), EPSILON);
}

#[test]
fn contains_empty_finds_epsilon_alternatives() {
  let mut rs = RuleSet::new();
  let s = Ident::plain("S");
  rs.append(&s, seq(&["A"]));

  assert_eq!(rs.contains_empty(&s), Some(false));
  assert_eq!(rs.contains_empty(&Ident::plain("T")), None);

  rs.append(&s, IdentSeq::empty());
  assert_eq!(rs.contains_empty(&s), Some(true));
}

#[test]
fn expand_positions_concatenates_choices() {
  let options = vec![
    vec![seq(&["A"])],
    vec![seq(&["B"]), IdentSeq::empty()],
    vec![seq(&["C"])],
  ];

  let got = expand_positions(&options);
  assert_eq!(got, vec![seq(&["A", "B", "C"]), seq(&["A", "C"])]);
}

#[test]
fn replace_everywhere_expands_each_occurrence() {
  let mut rs = RuleSet::new();
  let s = Ident::plain("S");
  rs.append(&s, seq(&["A", "x", "A"]));

  let replaced = rs.replace_everywhere(
    &Ident::plain("A"),
    &[seq(&["F1"]), seq(&["F2"])],
  );

  let mut bodies = replaced
    .alternatives(&s)
    .unwrap()
    .cloned()
    .collect::<Vec<_>>();
  bodies.sort();

  assert_eq!(
    bodies,
    vec![
      seq(&["F1", "x", "F1"]),
      seq(&["F1", "x", "F2"]),
      seq(&["F2", "x", "F1"]),
      seq(&["F2", "x", "F2"]),
    ]
  );
}

#[test]
fn replace_everywhere_drops_emptied_rules() {
  let mut rs = RuleSet::new();
  let s = Ident::plain("S");
  rs.append(&s, seq(&["A"]));
  rs.append(&s, seq(&["A", "B"]));

  let replaced = rs.replace_everywhere(&Ident::plain("A"), &[IdentSeq::empty()]);

  let bodies = replaced
    .alternatives(&s)
    .unwrap()
    .cloned()
    .collect::<Vec<_>>();
  assert_eq!(bodies, vec![seq(&["B"])]);
}

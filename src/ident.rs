use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hasher;

use rustc_hash::{FxHashMap, FxHasher};

/// Digest of the empty sequence / empty attribute set. Every hash operation
/// over an empty aggregate returns this sentinel instead of the hasher
/// output, so "no attributes" is a recognizable constant.
pub const EMPTY_HASH: u64 = 0x2d06800538d394c2;

/// Reserved id for string-literal terminals.
pub const CONST_ID: &str = "CONST";

pub(crate) fn digest(bytes: &[u8]) -> u64 {
  let mut h = FxHasher::default();
  h.write(bytes);
  h.finish()
}

/// A grammar symbol. `generated` marks idents minted by normalization;
/// those are matched by identity and hidden from collapsed parse trees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident {
  pub id: String,
  pub attr_hash: u64,
  pub generated: bool,
}

impl Ident {
  pub fn plain(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      attr_hash: 0,
      generated: false,
    }
  }

  /// 64-bit digest over id bytes, little-endian attr hash and a bool byte.
  pub fn content_hash(&self) -> u64 {
    let mut bytes = Vec::with_capacity(self.id.len() + 9);
    bytes.extend_from_slice(self.id.as_bytes());
    bytes.extend_from_slice(&self.attr_hash.to_le_bytes());
    bytes.push(self.generated as u8);
    digest(&bytes)
  }
}

impl fmt::Display for Ident {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.attr_hash == 0 || self.attr_hash == EMPTY_HASH && !self.generated {
      write!(f, "{}", self.id)
    } else if self.generated {
      write!(f, "{}_{}", self.id, self.attr_hash)
    } else {
      write!(f, "{}_{:016x}", self.id, self.attr_hash)
    }
  }
}

/// A terminal symbol with keyed attributes: `noun<number=sg>`. The grammar
/// stores one per declared terminal; the lexer produces one per token
/// classification. Matching between the two is `select`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexIdent {
  pub id: String,
  pub properties: BTreeMap<String, Option<String>>,
}

impl ComplexIdent {
  pub fn plain(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      properties: BTreeMap::new(),
    }
  }

  pub fn with(mut self, key: impl Into<String>, value: Option<&str>) -> Self {
    self.properties.insert(key.into(), value.map(str::to_string));
    self
  }

  /// Admission predicate between a grammar-side filter (`self`) and an
  /// observed token classification. Every key declared by the filter must
  /// appear in the observation; a `None` value requires presence only,
  /// a `Some` value requires equality. Without properties the filter falls
  /// back to id equality.
  pub fn select(&self, observed: &ComplexIdent) -> bool {
    if self.properties.is_empty() {
      return self.id == observed.id;
    }
    if self.id != observed.id || observed.properties.is_empty() {
      return false;
    }

    self.properties.iter().all(|(key, want)| {
      match (want, observed.properties.get(key)) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(v1), Some(Some(v2))) => v1 == v2,
        (Some(_), Some(None)) => false,
      }
    })
  }

  /// Normalized attribute form: `"k1[=v1] k2[=v2] …"` over sorted keys.
  pub fn metadata(&self) -> String {
    let parts = self
      .properties
      .iter()
      .map(|(k, v)| match v {
        Some(v) => format!("{}={}", k, normalize_value(v)),
        None => k.clone(),
      })
      .collect::<Vec<_>>();
    parts.join(" ")
  }

  pub fn content_hash(&self) -> u64 {
    if self.properties.is_empty() {
      EMPTY_HASH
    } else {
      digest(self.metadata().as_bytes())
    }
  }
}

impl fmt::Display for ComplexIdent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.properties.is_empty() {
      write!(f, "{}", self.id)
    } else {
      write!(f, "{}<{}>", self.id, self.metadata())
    }
  }
}

fn normalize_value(s: &str) -> String {
  if is_ident(s) {
    format!("\"{}\"", s)
  } else {
    s.to_string()
  }
}

fn is_ident(s: &str) -> bool {
  !s.is_empty()
    && s.chars().enumerate().all(|(i, c)| {
      c == '_' || c.is_alphabetic() || c.is_numeric() && i > 0
    })
}

/// Mints fresh generated idents, one ordinal stream per base id.
#[derive(Debug, Clone, Default)]
pub struct IdentCounter {
  ordinals: FxHashMap<String, u64>,
}

impl IdentCounter {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn new_ident(&mut self, base: &str) -> Ident {
    let n = self.ordinals.entry(base.to_string()).or_insert(0);
    *n += 1;
    Ident {
      id: base.to_string(),
      attr_hash: *n,
      generated: true,
    }
  }
}

#[cfg(test)]
fn complex(id: &str, props: &[(&str, Option<&str>)]) -> ComplexIdent {
  props
    .iter()
    .fold(ComplexIdent::plain(id), |c, (k, v)| c.with(*k, *v))
}

#[test]
fn display_forms() {
  assert_eq!(Ident::plain("S").to_string(), "S");

  let term = Ident {
    id: "noun".to_string(),
    attr_hash: EMPTY_HASH,
    generated: false,
  };
  assert_eq!(term.to_string(), "noun");

  let attred = Ident {
    id: "noun".to_string(),
    attr_hash: 0xabcd,
    generated: false,
  };
  assert_eq!(attred.to_string(), "noun_000000000000abcd");

  let gen = Ident {
    id: "S".to_string(),
    attr_hash: 3,
    generated: true,
  };
  assert_eq!(gen.to_string(), "S_3");
}

#[test]
fn ident_ordering() {
  let a = Ident::plain("A");
  let b = Ident::plain("B");
  assert!(a < b);

  let a1 = Ident {
    id: "A".to_string(),
    attr_hash: 1,
    generated: true,
  };
  let a2 = Ident {
    id: "A".to_string(),
    attr_hash: 2,
    generated: true,
  };
  assert!(a1 < a2);
  assert!(a < a1);
}

#[test]
fn counter_ordinals_are_unique_per_base() {
  let mut c = IdentCounter::new();
  let s1 = c.new_ident("S");
  let s2 = c.new_ident("S");
  let a1 = c.new_ident("A");

  assert!(s1.generated && s2.generated);
  assert_ne!(s1, s2);
  assert_eq!(a1.attr_hash, 1);
  assert_eq!(s2.attr_hash, 2);
}

#[test]
fn metadata_is_sorted_and_quotes_ident_values() {
  let c = complex("noun", &[("number", Some("sg")), ("gender", Some("m*"))]);
  assert_eq!(c.metadata(), "gender=m* number=\"sg\"");
  assert_eq!(c.to_string(), "noun<gender=m* number=\"sg\">");
}

#[test]
fn empty_properties_hash_to_the_sentinel() {
  assert_eq!(ComplexIdent::plain("noun").content_hash(), EMPTY_HASH);
  assert_ne!(
    complex("noun", &[("number", Some("sg"))]).content_hash(),
    EMPTY_HASH
  );
}

#[test]
fn select_requires_declared_keys_to_subsume() {
  let filter = complex("noun", &[("number", Some("sg"))]);

  let observed = complex("noun", &[("number", Some("sg")), ("gender", Some("m"))]);
  assert!(filter.select(&observed));

  let plural = complex("noun", &[("number", Some("pl"))]);
  assert!(!filter.select(&plural));

  let bare = ComplexIdent::plain("noun");
  assert!(!filter.select(&bare));
  assert!(bare.select(&observed), "empty filter falls back to id equality");
  assert!(!bare.select(&ComplexIdent::plain("verb")));
}

#[test]
fn select_checks_every_key() {
  let filter = complex("w", &[("a", None), ("b", Some("2"))]);
  let missing_b = complex("w", &[("a", Some("1"))]);
  assert!(!filter.select(&missing_b));

  let full = complex("w", &[("a", Some("1")), ("b", Some("2"))]);
  assert!(filter.select(&full));
}

use thiserror::Error;

use crate::ident::Ident;

/// Fatal, structural errors. A failed parse is not an error: it surfaces as
/// an empty result from `Matrix::parse`.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
  #[error("start rule {0:?} not found")]
  UnknownStartRule(String),

  #[error("no rules for {0}")]
  MissingRule(Ident),

  #[error("rule for {0} is empty after transforms")]
  EmptyRule(Ident),

  #[error("rule for {0} has {1} symbols, want 1 or 2")]
  OverlongRule(Ident, usize),

  #[error("nonterminal {0} cannot carry an attribute list")]
  AttributesOnNonterminal(String),

  #[error("syntax error: {0}")]
  Syntax(String),
}

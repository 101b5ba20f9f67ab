use std::fmt;
use std::rc::Rc;

use crate::ident::{ComplexIdent, Ident};

/// A derivation node. The chart works on `Token`/`Raw`/`Single`; `Tree` is
/// what collapse hands back to the caller, with every generated
/// intermediate spliced away. Subtrees are shared: the chart keeps its
/// cells for diagnostics while collapsed trees are returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
  /// A classified input token.
  Token { class: ComplexIdent, text: String },
  /// A binary derivation exactly as the fill step built it.
  Raw {
    head: Ident,
    left: Rc<Node>,
    right: Rc<Node>,
  },
  /// A unit wrapper, from stop-rule closure or chain reconstruction.
  Single { head: Ident, inner: Rc<Node> },
  /// A collapsed derivation: only caller-visible heads remain.
  Tree { head: Ident, children: Vec<Node> },
}

impl Node {
  pub fn token(class: ComplexIdent, text: impl Into<String>) -> Self {
    Node::Token {
      class,
      text: text.into(),
    }
  }

  /// The rule head, or `None` for a bare token.
  pub fn head(&self) -> Option<&Ident> {
    match self {
      Node::Token { .. } => None,
      Node::Raw { head, .. } | Node::Single { head, .. } | Node::Tree { head, .. } => {
        Some(head)
      }
    }
  }

  pub fn token_class(&self) -> Option<&ComplexIdent> {
    match self {
      Node::Token { class, .. } => Some(class),
      _ => None,
    }
  }

  /// In-order token texts under this node.
  pub fn leaves(&self) -> Vec<&str> {
    let mut out = Vec::new();
    self.collect_leaves(&mut out);
    out
  }

  fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a str>) {
    match self {
      Node::Token { text, .. } => out.push(text),
      Node::Raw { left, right, .. } => {
        left.collect_leaves(out);
        right.collect_leaves(out);
      }
      Node::Single { inner, .. } => inner.collect_leaves(out),
      Node::Tree { children, .. } => {
        for child in children {
          child.collect_leaves(out);
        }
      }
    }
  }
}

impl fmt::Display for Node {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for leaf in self.leaves() {
      write!(f, "{}", leaf)?;
    }
    Ok(())
  }
}

#[test]
fn leaves_come_out_in_order() {
  let t = |s: &str| Rc::new(Node::token(ComplexIdent::plain(s), s));

  let raw = Node::Raw {
    head: Ident::plain("S"),
    left: Rc::new(Node::Single {
      head: Ident::plain("A"),
      inner: t("a"),
    }),
    right: Rc::new(Node::Raw {
      head: Ident::plain("B"),
      left: t("b"),
      right: t("c"),
    }),
  };

  assert_eq!(raw.leaves(), vec!["a", "b", "c"]);
  assert_eq!(raw.to_string(), "abc");
}

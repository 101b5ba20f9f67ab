//! Recursive-descent parsing of grammar files.

use regex::Regex;

use rustc_hash::FxHashSet;

use crate::ebnf::{Ebnf, Expr};
use crate::error::Error;
use crate::ident::{ComplexIdent, Ident, CONST_ID};

type Infallible<'a, T> = (T, &'a str);
type ParseResult<'a, T> = Result<(T, &'a str), Error>;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}

fn syntax<'a, T>(msg: String) -> ParseResult<'a, T> {
  Err(Error::Syntax(msg))
}

/// Try to consume a regex, returning None if it doesn't match at the start
fn optional_re<'a>(re: &'static Regex, s: &'a str) -> Infallible<'a, Option<&'a str>> {
  if let Some(m) = re.find(s) {
    if m.start() > 0 {
      return (None, s);
    }
    let (_, rest) = s.split_at(m.end());
    (Some(m.as_str()), rest)
  } else {
    (None, s)
  }
}

/// Try to consume a regex, failing if it doesn't match
fn needed_re<'a>(re: &'static Regex, s: &'a str) -> ParseResult<'a, &'a str> {
  if let (Some(c), rest) = optional_re(re, s) {
    Ok((c, rest))
  } else {
    syntax(format!("couldn't match {} at {:.40}", re, s))
  }
}

/// Try to consume a char, returning None if it doesn't match
fn optional_char(c: char, s: &str) -> Infallible<'_, Option<char>> {
  let mut iter = s.char_indices().peekable();
  if let Some((_, c1)) = iter.next() {
    if c == c1 {
      let rest = if let Some((idx, _)) = iter.peek() {
        s.split_at(*idx).1
      } else {
        ""
      };
      return (Some(c), rest);
    }
  }
  (None, s)
}

/// Try to consume a char, failing if it doesn't match
fn needed_char(c: char, s: &str) -> ParseResult<'_, char> {
  if let (Some(c), rest) = optional_char(c, s) {
    Ok((c, rest))
  } else {
    syntax(format!("couldn't match {:?} at {:.40}", c, s))
  }
}

/// Skips whitespace, `// …` line comments and `/* … */` block comments
fn skip_trivia(s: &str) -> &str {
  regex_static!(TRIVIA, r"(?s)(\s+|//[^\n]*\n?|/\*.*?\*/)+");
  optional_re(&TRIVIA, s).1
}

fn parse_name(s: &str) -> ParseResult<'_, &str> {
  regex_static!(NAME, r"[A-Za-z_][A-Za-z0-9_]*");
  needed_re(&NAME, s).map_err(|e| Error::Syntax(format!("name: {}", e)))
}

/// A quoted literal with `\\ \" \n \t` escapes, quotes stripped
fn parse_string(s: &str) -> ParseResult<'_, String> {
  regex_static!(STRING, r#""(\\.|[^"\\])*""#);
  let (quoted, rest) = needed_re(&STRING, s)?;

  let body = &quoted[1..quoted.len() - 1];
  let mut out = String::with_capacity(body.len());
  let mut chars = body.chars();
  while let Some(c) = chars.next() {
    if c != '\\' {
      out.push(c);
      continue;
    }
    match chars.next() {
      Some('n') => out.push('\n'),
      Some('t') => out.push('\t'),
      Some(c @ '\\') | Some(c @ '"') => out.push(c),
      other => {
        return syntax(format!("unknown escape {:?} in {}", other, quoted));
      }
    }
  }

  Ok((out, rest))
}

/// `<key[=value] …>`, the attribute list of a terminal
fn parse_attrs(s: &str) -> ParseResult<'_, Vec<(String, Option<String>)>> {
  let mut attrs = Vec::new();
  let mut rem = needed_char('<', s)?.1;

  loop {
    rem = skip_trivia(rem);
    if let (Some(_), rest) = optional_char('>', rem) {
      if attrs.is_empty() {
        return syntax(format!("empty attribute list at {:.40}", s));
      }
      return Ok((attrs, rest));
    }

    let (key, rest) = parse_name(rem)?;
    let rest = skip_trivia(rest);
    if let (Some(_), rest) = optional_char('=', rest) {
      let rest = skip_trivia(rest);
      let (value, rest) = if rest.starts_with('"') {
        parse_string(rest)?
      } else {
        let (v, rest) = parse_name(rest)?;
        (v.to_string(), rest)
      };
      attrs.push((key.to_string(), Some(value)));
      rem = rest;
    } else {
      attrs.push((key.to_string(), None));
      rem = rest;
    }
  }
}

/// A name with an optional attribute list, lifted to a terminal ident if
/// the name was declared terminal. Attributes on anything else are fatal.
fn parse_symbol<'a>(
  s: &'a str,
  g: &mut Ebnf,
  terminals: &FxHashSet<String>,
) -> ParseResult<'a, Ident> {
  let (name, rest) = parse_name(s)?;
  let rest = skip_trivia(rest);

  let (attrs, rest) = if rest.starts_with('<') {
    parse_attrs(rest)?
  } else {
    (Vec::new(), rest)
  };

  if !terminals.contains(name) {
    if !attrs.is_empty() {
      return Err(Error::AttributesOnNonterminal(name.to_string()));
    }
    return Ok((Ident::plain(name), rest));
  }

  let complex = attrs
    .iter()
    .fold(ComplexIdent::plain(name), |c, (k, v)| {
      c.with(k.as_str(), v.as_deref())
    });

  let ident = Ident {
    id: name.to_string(),
    attr_hash: complex.content_hash(),
    generated: false,
  };
  g.terminals.insert(ident.clone(), complex);

  Ok((ident, rest))
}

/// A string literal becomes a `CONST` terminal whose attribute hash is the
/// digest of the literal content (realized as a single valueless property,
/// so two different literals never select each other).
fn parse_const<'a>(s: &'a str, g: &mut Ebnf) -> ParseResult<'a, Ident> {
  let (literal, rest) = parse_string(s)?;

  let complex = ComplexIdent::plain(CONST_ID).with(literal.clone(), None);
  let hash = complex.content_hash();

  let ident = Ident {
    id: CONST_ID.to_string(),
    attr_hash: hash,
    generated: false,
  };
  g.constants.insert(hash, literal);
  g.terminals.insert(ident.clone(), complex);

  Ok((ident, rest))
}

/// `Term := String | Name | '(' Alts ')' | '[' Alts ']' | '{' Alts '}'`
fn parse_term<'a>(
  s: &'a str,
  g: &mut Ebnf,
  terminals: &FxHashSet<String>,
) -> ParseResult<'a, Expr> {
  if s.starts_with('"') {
    let (ident, rest) = parse_const(s, g)?;
    return Ok((Expr::Ident(ident), rest));
  }

  for (open, close, wrap) in [
    ('(', ')', None),
    ('[', ']', Some(Expr::Opt as fn(Box<Expr>) -> Expr)),
    ('{', '}', Some(Expr::Repeat as fn(Box<Expr>) -> Expr)),
  ] {
    if let (Some(_), rest) = optional_char(open, s) {
      let (inner, rest) = parse_alts(skip_trivia(rest), g, terminals)?;
      let rest = skip_trivia(rest);
      let (_, rest) = needed_char(close, rest)?;

      let expr = match wrap {
        Some(wrap) => wrap(Box::new(inner)),
        // a one-alternative group needs no wrapper
        None => match inner {
          Expr::Alts(_) => Expr::Group(Box::new(inner)),
          single => single,
        },
      };
      return Ok((expr, rest));
    }
  }

  let (ident, rest) = parse_symbol(s, g, terminals)?;
  Ok((Expr::Ident(ident), rest))
}

/// `Seq := Term+`
fn parse_seq<'a>(
  s: &'a str,
  g: &mut Ebnf,
  terminals: &FxHashSet<String>,
) -> ParseResult<'a, Expr> {
  let mut items = Vec::new();
  let mut rem = s;

  loop {
    let (term, rest) = parse_term(rem, g, terminals)?;
    items.push(term);
    rem = skip_trivia(rest);

    if rem.is_empty() || rem.starts_with(&['|', ';', ')', ']', '}'][..]) {
      break;
    }
  }

  Ok((
    if items.len() == 1 {
      items.pop().unwrap()
    } else {
      Expr::Seq(items)
    },
    rem,
  ))
}

/// `Alts := Seq ('|' Seq)*`
fn parse_alts<'a>(
  s: &'a str,
  g: &mut Ebnf,
  terminals: &FxHashSet<String>,
) -> ParseResult<'a, Expr> {
  let mut alts = Vec::new();
  let mut rem = s;

  loop {
    let (alt, rest) = parse_seq(rem, g, terminals)?;
    alts.push(alt);
    rem = skip_trivia(rest);

    if let (Some(_), rest) = optional_char('|', rem) {
      rem = skip_trivia(rest);
    } else {
      break;
    }
  }

  Ok((
    if alts.len() == 1 {
      alts.pop().unwrap()
    } else {
      Expr::Alts(alts)
    },
    rem,
  ))
}

/// `Production := Name ':' Alts ';'`
fn parse_production<'a>(
  s: &'a str,
  g: &mut Ebnf,
  terminals: &FxHashSet<String>,
) -> ParseResult<'a, (Ident, Expr)> {
  let (name, rest) = parse_name(s)?;
  let rest = skip_trivia(rest);

  if rest.starts_with('<') {
    return Err(Error::AttributesOnNonterminal(name.to_string()));
  }

  let (_, rest) = needed_char(':', rest)?;
  let (body, rest) = parse_alts(skip_trivia(rest), g, terminals)?;
  let (_, rest) = needed_char(';', rest)?;

  Ok(((Ident::plain(name), body), rest))
}

/// Parses grammar text into the EBNF model. `terminals` declares which
/// names are terminal symbols; only those may carry `<…>` attribute lists.
pub fn parse(src: &str, terminals: &[&str]) -> Result<Ebnf, Error> {
  let terminals: FxHashSet<String> = terminals.iter().map(|s| s.to_string()).collect();

  let mut g = Ebnf::default();
  let mut rem = skip_trivia(src);

  while !rem.is_empty() {
    let ((name, body), rest) = parse_production(rem, &mut g, &terminals)?;

    let exprs = g.rules.entry(name).or_default();
    match body {
      Expr::Alts(alternatives) => exprs.extend(alternatives),
      single => exprs.push(single),
    }

    rem = skip_trivia(rest);
  }

  Ok(g)
}

#[test]
fn parses_alternatives_and_sequences() {
  let g = parse("S : A B | B C ;", &[]).unwrap();

  let alts = &g.rules[&Ident::plain("S")];
  assert_eq!(
    alts,
    &vec![
      Expr::Seq(vec![
        Expr::Ident(Ident::plain("A")),
        Expr::Ident(Ident::plain("B")),
      ]),
      Expr::Seq(vec![
        Expr::Ident(Ident::plain("B")),
        Expr::Ident(Ident::plain("C")),
      ]),
    ]
  );
}

#[test]
fn lifts_declared_terminals_with_attributes() {
  let g = parse("S : noun<number=sg> ;", &["noun"]).unwrap();

  let alts = &g.rules[&Ident::plain("S")];
  let ident = match &alts[0] {
    Expr::Ident(i) => i.clone(),
    other => panic!("expected an ident, got {:?}", other),
  };

  assert_eq!(ident.id, "noun");
  assert!(!ident.generated);

  let complex = &g.terminals[&ident];
  assert_eq!(complex.properties.get("number"), Some(&Some("sg".to_string())));
  assert_eq!(ident.attr_hash, complex.content_hash());
}

#[test]
fn attributes_on_a_nonterminal_are_fatal() {
  assert!(matches!(
    parse("S : other<k=v> ;", &[]),
    Err(Error::AttributesOnNonterminal(name)) if name == "other"
  ));
}

#[test]
fn string_literals_become_const_terminals() {
  let g = parse(r#"S : "+" S | num ;"#, &["num"]).unwrap();

  assert_eq!(g.constants.len(), 1);
  let (hash, literal) = g.constants.iter().next().unwrap();
  assert_eq!(literal, "+");

  let alts = &g.rules[&Ident::plain("S")];
  match &alts[0] {
    Expr::Seq(items) => match &items[0] {
      Expr::Ident(i) => {
        assert_eq!(i.id, CONST_ID);
        assert_eq!(i.attr_hash, *hash);
      }
      other => panic!("expected const ident, got {:?}", other),
    },
    other => panic!("expected seq, got {:?}", other),
  }
}

#[test]
fn brackets_select_the_extended_constructs() {
  let g = parse("S : [ A ] { B | C } ( D E ) ;", &[]).unwrap();

  let alts = &g.rules[&Ident::plain("S")];
  match &alts[0] {
    Expr::Seq(items) => {
      assert!(matches!(items[0], Expr::Opt(_)));
      assert!(matches!(items[1], Expr::Repeat(_)));
      assert!(matches!(items[2], Expr::Seq(_)));
    }
    other => panic!("expected seq, got {:?}", other),
  }
}

#[test]
fn comments_are_trivia() {
  let g = parse(
    "// leading note\nS : A ; /* inline */ A : x ;",
    &["x"],
  )
  .unwrap();

  assert_eq!(g.rules.len(), 2);
}

#[test]
fn repeated_heads_accumulate_alternatives() {
  let g = parse("S : A ; S : B ;", &[]).unwrap();
  assert_eq!(g.rules[&Ident::plain("S")].len(), 2);
}

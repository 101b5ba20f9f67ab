use std::env;
use std::fs;
use std::io;
use std::io::Write;
use std::process;

use rustc_hash::FxHashMap;

use cykgram::ident::CONST_ID;
use cykgram::{ComplexIdent, Matrix, Node, Token};

fn usage(prog_name: &str) -> String {
  format!(
    r"
Usage: {} FILE [options]

Options:
  -h, --help            Print this message
  -c, --chart           Print the chart after each parse
  -s, --start NAME      Start symbol (defaults to S)
  -t, --terminals LIST  Comma-separated terminal names",
    prog_name
  )
}

fn render(node: &Node, out: &mut String) {
  match node {
    Node::Token { text, .. } => out.push_str(text),
    Node::Tree { head, children } => {
      out.push('(');
      out.push_str(&head.to_string());
      for child in children {
        out.push(' ');
        render(child, out);
      }
      out.push(')');
    }
    other => out.push_str(&other.to_string()),
  }
}

fn parse_line(
  m: &mut Matrix,
  literals: &FxHashMap<String, ComplexIdent>,
  line: &str,
  print_chart: bool,
) {
  let input = line
    .split_whitespace()
    .map(|w| {
      let class = literals
        .get(w)
        .cloned()
        .unwrap_or_else(|| ComplexIdent::plain(w));
      vec![Token::new(class, w)]
    })
    .collect::<Vec<_>>();

  let trees = m.parse(&input);

  if print_chart {
    println!("chart:\n{}", m);
  }

  println!(
    "Parsed {} tree{}",
    trees.len(),
    if trees.len() == 1 { "" } else { "s" }
  );

  for tree in trees {
    let mut rendered = String::new();
    render(&tree, &mut rendered);
    println!("{}", rendered);
  }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let opts: Vec<String> = env::args().collect();
  let prog_name = opts[0].clone();

  if opts.len() < 2 {
    println!("{}", usage(&prog_name));
    process::exit(1);
  }

  let mut opts = opts.into_iter().skip(1);
  let filename = opts.next().unwrap();

  let mut print_chart = false;
  let mut start = "S".to_string();
  let mut terminals: Vec<String> = Vec::new();

  while let Some(o) = opts.next() {
    if o == "-h" || o == "--help" {
      println!("{}", usage(&prog_name));
      process::exit(0);
    } else if o == "-c" || o == "--chart" {
      print_chart = true;
    } else if o == "-s" || o == "--start" {
      start = opts.next().ok_or("--start needs a name")?;
    } else if o == "-t" || o == "--terminals" {
      let list = opts.next().ok_or("--terminals needs a list")?;
      terminals.extend(list.split(',').map(|s| s.trim().to_string()));
    } else {
      return Err(format!("unknown option {}", o).into());
    }
  }

  let src = fs::read_to_string(&filename)?;
  let term_refs = terminals.iter().map(|s| s.as_str()).collect::<Vec<_>>();

  let grammar = cykgram::parse(&src, &term_refs)?;
  let cnf = grammar.to_cnf(&start)?;
  println!("{}", cnf);

  let literals = grammar
    .constants
    .values()
    .map(|lit| {
      (
        lit.clone(),
        ComplexIdent::plain(CONST_ID).with(lit.clone(), None),
      )
    })
    .collect::<FxHashMap<_, _>>();

  let mut matrix = Matrix::new(&cnf);

  let mut input = String::new();
  loop {
    print!("> ");
    io::stdout().flush()?;

    match io::stdin().read_line(&mut input) {
      Ok(0) => return Ok(()), // ctrl+d
      Ok(_) => {
        parse_line(&mut matrix, &literals, input.trim(), print_chart);
        input.clear();
      }
      Err(error) => return Err(error.into()),
    }
  }
}

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cykgram::{compile, ComplexIdent, Matrix, Token};

const GRAMMAR_SRC: &str = "
  S : A B | B C ;
  A : B A | a ;
  B : C C | b ;
  C : A B | a ;
";

fn classify(input: &str) -> Vec<Vec<Token>> {
  input
    .split_whitespace()
    .map(|w| vec![Token::new(ComplexIdent::plain(w), w)])
    .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
  let cnf = compile(GRAMMAR_SRC, &["a", "b"], "S").unwrap();

  let short = classify("b a a b a");
  let long = classify(&"b a a b a ".repeat(3));

  c.bench_function("compile", |b| {
    b.iter(|| compile(black_box(GRAMMAR_SRC), &["a", "b"], "S").unwrap())
  });

  c.bench_function("parse short", |b| {
    let mut m = Matrix::new(&cnf);
    b.iter(|| m.parse(black_box(&short)).len())
  });

  c.bench_function("parse long ambiguous", |b| {
    let mut m = Matrix::new(&cnf);
    b.iter(|| m.parse(black_box(&long)).len())
  });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

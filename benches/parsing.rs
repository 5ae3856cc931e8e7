use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;
use syntax_core::parsing::{ParseState, SyntaxDefinition, SyntaxSetBuilder};

/// A grammar with a handful of contexts and a push/pop pair, deep enough to
/// exercise prototype flattening and the search cache without depending on
/// any file on disk.
fn json_like_grammar() -> syntax_core::parsing::SyntaxSet {
    let def = SyntaxDefinition::load_from_value(&json!({
        "name": "Bench",
        "scope": "source.bench",
        "contexts": {
            "main": [
                {"match": r#"""#, "push": "string"},
                {"match": r"-?[0-9]+(\.[0-9]+)?", "scope": "constant.numeric.bench"},
                {"match": r"[\[\]{},:]", "scope": "punctuation.bench"},
                {"match": r"true|false|null", "scope": "constant.language.bench"}
            ],
            "string": [
                {"meta_scope": "string.quoted.double.bench"},
                {"match": r#"\\."#, "scope": "constant.character.escape.bench"},
                {"match": r#"""#, "scope": "punctuation.definition.string.end.bench", "pop": true}
            ]
        }
    }))
    .unwrap();
    let mut builder = SyntaxSetBuilder::new();
    builder.add(def);
    builder.build().unwrap()
}

fn sample_line() -> String {
    r#"  "key": [1, 2.5, -3, true, null, "a\tb"],"#.repeat(4)
}

fn bench_parse_line(c: &mut Criterion) {
    let set = json_like_grammar();
    let syntax = &set.syntaxes()[0];
    let line = sample_line();

    c.bench_function("parse_line", |b| {
        b.iter(|| {
            let mut state = ParseState::new(syntax);
            let tokens = state.parse_line(&line, syntax).unwrap();
            criterion::black_box(tokens);
        })
    });
}

fn bench_link_grammar(c: &mut Criterion) {
    c.bench_function("link_grammar", |b| {
        b.iter(|| {
            let set = json_like_grammar();
            criterion::black_box(set);
        })
    });
}

criterion_group!(benches, bench_parse_line, bench_link_grammar);
criterion_main!(benches);

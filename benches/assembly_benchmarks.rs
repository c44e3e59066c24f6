//! Hot-path benchmarks: history windowing plus persona encoding, and the
//! keyword evaluator.
//!
//! Run with: `cargo bench --bench assembly_benchmarks`

use character_persona::conversation::{ConversationAssembler, SystemPromptEncoding, Turn};
use character_persona::evaluation::evaluate;
use character_persona::persona::PersonaRegistry;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn history(len: usize) -> Vec<Turn> {
    (0..len)
        .map(|i| {
            if i % 2 == 0 {
                Turn::user(format!("question number {i} about the seven seas"))
            } else {
                Turn::assistant(format!("arr, answer number {i} from the crow's nest"))
            }
        })
        .collect()
}

fn bench_assembly(c: &mut Criterion) {
    let registry = PersonaRegistry::builtin().unwrap();
    let persona = registry.get("pirate_captain").unwrap();
    let long = history(200);

    let mut group = c.benchmark_group("assemble");
    for (label, encoding) in [
        ("native", SystemPromptEncoding::Native),
        ("synthesized", SystemPromptEncoding::SynthesizedExchange),
    ] {
        let assembler = ConversationAssembler::new(encoding);
        group.bench_function(label, |b| {
            b.iter(|| {
                assembler
                    .assemble(black_box("where is the treasure?"), black_box(&long), Some(persona))
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let reply = "Arr, I can't help with that, matey. Let's talk about something more positive, \
                 like the time we sailed past the kraken and lived to tell the tale."
        .repeat(8);

    c.bench_function("evaluate_adversarial", |b| {
        b.iter(|| evaluate(black_box("adversarial"), black_box(&reply)))
    });
    c.bench_function("evaluate_unknown_category", |b| {
        b.iter(|| evaluate(black_box("bogus"), black_box(&reply)))
    });
}

criterion_group!(benches, bench_assembly, bench_evaluate);
criterion_main!(benches);

use std::hint::black_box;
use std::sync::Arc;

use ab_core::{Bot, BotConfig, Category, Session, WordSet};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

const WORDS: [&str; 12] = [
    "ALPHA", "BRAVO", "CHARLIE", "DELTA", "ECHO", "FOXTROT", "GOLF", "HOTEL", "INDIA", "JULIET",
    "KILO", "LIMA",
];

fn build_bot(size: usize) -> Bot {
    let bot = Bot::builder("bench")
        .config(BotConfig {
            qa_test_mode: true,
            ..Default::default()
        })
        .set(WordSet::from_phrases("letter", WORDS))
        .build();
    for i in 0..size {
        let a = WORDS[i % WORDS.len()];
        let b = WORDS[(i / WORDS.len()) % WORDS.len()];
        let pattern = match i % 4 {
            0 => format!("{a} {b} {i}"),
            1 => format!("{a} * {i}"),
            2 => format!("_ {b} {i}"),
            _ => format!("<set>letter</set> {a} {i}"),
        };
        bot.add_category(Category::new(&pattern, "*", "*", "ok", "bench.aiml"))
            .unwrap();
    }
    bot.add_category(Category::new("*", "*", "*", "fallback", "bench.aiml"))
        .unwrap();
    bot
}

fn bench_best_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("best_match");

    for size in [100, 1000, 10000] {
        let bot = build_bot(size);
        let hit = format!("ECHO KILO {}", size / 2);
        group.bench_with_input(BenchmarkId::new("hit", size), &size, |b, _| {
            b.iter(|| bot.find(black_box(&hit), "unknown", "unknown"));
        });
        group.bench_with_input(BenchmarkId::new("miss", size), &size, |b, _| {
            b.iter(|| bot.find(black_box("nothing like any pattern here"), "unknown", "unknown"));
        });
    }

    group.finish();
}

fn bench_respond(c: &mut Criterion) {
    let bot = Bot::builder("bench")
        .config(BotConfig {
            repetition_count: 0,
            ..Default::default()
        })
        .build();
    bot.add_category(Category::new(
        "MY NAME IS *",
        "*",
        "*",
        "<think><set name=\"name\"><star/></set></think>Hi <get name=\"name\"/>",
        "bench.aiml",
    ))
    .unwrap();
    bot.add_category(Category::new("HELLO *", "*", "*", "<srai>MY NAME IS <star/></srai>", "bench.aiml"))
        .unwrap();
    let mut session = Session::with_seed(Arc::new(bot), "bench", 42);

    c.bench_function("respond_srai", |b| {
        b.iter(|| session.respond(black_box("hello Ada. my name is Grace")));
    });
}

criterion_group!(benches, bench_best_match, bench_respond);
criterion_main!(benches);

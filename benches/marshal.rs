//! Marshaling and dispatch parsing benchmarks.
//!
//! Measures the per-message work on both sides of the relay:
//! - Rendering adapter commands to evaluation strings
//! - Classifying posted message bodies
//!
//! Run with: cargo bench --bench marshal
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use hub_relay::protocol::{Command, InboundMessage, Request};
use serde_json::{Value, json};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const ARGUMENT_COUNTS: &[usize] = &[0, 1, 8, 64];

// ============================================================================
// Benchmark: Command Rendering
// ============================================================================

fn bench_invoke_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("invoke_render");

    for &count in ARGUMENT_COUNTS {
        let command = Command::Invoke {
            hub: "chat".to_string(),
            method: "send".to_string(),
            arguments: (0..count)
                .map(|i| json!({"n": i, "text": format!("message 'number' {i}")}))
                .collect(),
        };

        group.bench_with_input(BenchmarkId::new("to_script", count), &command, |b, command| {
            b.iter(|| black_box(command).to_script());
        });

        group.bench_with_input(BenchmarkId::new("request", count), &command, |b, command| {
            b.iter(|| Request::new(black_box(command).clone()));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Inbound Parsing
// ============================================================================

fn bench_inbound_parse(c: &mut Criterion) {
    let bodies: [(&str, Value); 4] = [
        ("ready", json!("ready")),
        ("data", json!({"data": {"ticks": 3, "items": [1, 2, 3]}})),
        (
            "hub",
            json!({"hub": "chat", "method": "receiveMessage", "arguments": ["Alice", "hi"]}),
        ),
        ("unrecognized", json!({"other": true})),
    ];

    let mut group = c.benchmark_group("inbound_parse");

    for (name, body) in &bodies {
        group.bench_with_input(BenchmarkId::new("parse", name), body, |b, body| {
            b.iter(|| InboundMessage::parse(black_box(body.clone())));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_invoke_render, bench_inbound_parse);
criterion_main!(benches);

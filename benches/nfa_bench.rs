// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Benchmarks for the automaton runtime and the keyed operator.
//!
//! `nfa_process` feeds an in-order stream straight into [`Nfa::process`];
//! `operator_watermark` measures the full path through the time-order gate
//! with shuffled timestamps and many keys.
#![allow(missing_docs, clippy::cast_possible_truncation)]

use std::time::Duration;

use cep::common::timestamp::FixedTimerService;
use cep::nfa::{Nfa, SharedBuffer};
use cep::pattern::{AfterMatchSkipStrategy, Pattern, SimpleCondition};
use cep::{CepConfig, CepOperator, Match, MatchSink};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn step(name: &'static str, step: u8) -> (&'static str, SimpleCondition<impl Fn(&u8) -> bool>) {
    (name, SimpleCondition::new(move |e: &u8| *e == step))
}

/// `a b+ c` within 1000 ms, skipping past the last event of each match.
fn funnel() -> Pattern<u8> {
    let (a, is_a) = step("a", 0);
    let (b, is_b) = step("b", 1);
    let (c, is_c) = step("c", 2);
    Pattern::begin(a)
        .filter(is_a)
        .followed_by(b)
        .filter(is_b)
        .one_or_more()
        .consecutive()
        .followed_by(c)
        .filter(is_c)
        .within(Duration::from_millis(1_000))
        .with_skip_strategy(AfterMatchSkipStrategy::skip_past_last_event())
}

fn make_events(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i % 5) as u8).collect()
}

struct CountingSink(usize);

impl<K> MatchSink<K, u8> for CountingSink {
    fn on_match(&mut self, _key: &K, matched: Match<u8>) {
        self.0 += matched.len();
    }

    fn on_late(&mut self, _key: &K, _event: u8, _timestamp: i64) {}
}

fn bench_nfa_process(c: &mut Criterion) {
    let mut group = c.benchmark_group("nfa_process");
    let nfa = Nfa::compile(&funnel(), true).unwrap();
    let timer = FixedTimerService(0);

    for &n in &[100, 1_000, 10_000, 100_000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let events = make_events(n);
            b.iter(|| {
                let mut state = nfa.create_initial_state();
                let mut buffer = SharedBuffer::new();
                let mut matched = 0;
                for (ts, e) in events.iter().enumerate() {
                    let ts = ts as i64 * 10;
                    nfa.advance_time(&mut state, &mut buffer, ts).unwrap();
                    matched += nfa
                        .process(&mut state, &mut buffer, black_box(*e), ts, &timer)
                        .unwrap()
                        .len();
                }
                matched
            });
        });
    }

    group.finish();
}

fn bench_operator_watermark(c: &mut Criterion) {
    let mut group = c.benchmark_group("operator_watermark");
    let pattern = funnel();

    for &n in &[1_000, 10_000, 100_000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let events = make_events(n);
            b.iter(|| {
                let mut operator: CepOperator<u32, u8> =
                    CepOperator::new(&pattern, CepConfig::default()).unwrap().with_timer_service(
                        std::sync::Arc::new(FixedTimerService(0)),
                    );
                let mut sink = CountingSink(0);
                for (i, e) in events.iter().enumerate() {
                    // reverse order inside blocks of 8 timestamps
                    let ts = (i - i % 8 + 7 - i % 8) as i64;
                    operator.process_element((i % 64) as u32, *e, ts, &mut sink);
                    if i % 256 == 255 {
                        operator.process_watermark(i as i64, &mut sink).unwrap();
                    }
                }
                operator.process_watermark(i64::MAX, &mut sink).unwrap();
                sink.0
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_nfa_process, bench_operator_watermark);
criterion_main!(benches);

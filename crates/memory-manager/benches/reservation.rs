// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for the reservation path and injection-site evaluation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use injection::{DefectKind, Endpoint, InjectionRegistry, InjectionRule};
use memory_manager::{AllocationContext, Allocator, MemoryBudget, CHILD_BUFFER_SITE};
use std::sync::Arc;

fn bench_reserve_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("reserve_release");
    for depth in [1usize, 3, 8] {
        let root = Allocator::root("root", MemoryBudget::from_gb(1), AllocationContext::default());
        let mut chain = vec![root];
        for level in 1..depth {
            let child = chain[level - 1].new_child(format!("level-{level}"), MemoryBudget::from_mb(512));
            chain.push(child);
        }
        let leaf = &chain[depth - 1];

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                let r = leaf.reserve(black_box(4096)).unwrap();
                r.release();
            });
        });

        // Leaf first, so every parent is idle when it goes.
        while chain.pop().is_some() {}
    }
    group.finish();
}

fn bench_injection_evaluate(c: &mut Criterion) {
    let registry = Arc::new(InjectionRegistry::new());
    registry
        .install(vec![InjectionRule::new(CHILD_BUFFER_SITE, DefectKind::OutOfMemory)
            .skip(u64::MAX / 2)
            .on(Endpoint::new("node-1", 31010))])
        .unwrap();
    let context = AllocationContext::new(Endpoint::new("node-1", 31010), registry);
    let root = Allocator::root("root", MemoryBudget::from_gb(1), context);

    c.bench_function("reserve_with_armed_rule", |b| {
        b.iter(|| {
            let r = root.reserve(black_box(4096)).unwrap();
            r.release();
        });
    });
}

criterion_group!(benches, bench_reserve_release, bench_injection_evaluate);
criterion_main!(benches);

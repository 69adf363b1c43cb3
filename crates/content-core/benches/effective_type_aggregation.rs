#![allow(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Benchmark effective-node-type aggregation (spec §4.4, §8 S3).
//!
//! Measures the cost of building an `EffectiveNodeType` for a set of names:
//! - cold, every constituent type built individually
//! - warm, reusing a cached sub-aggregate
//! - registry-backed, through `NodeTypeRegistry::effective_type` where the
//!   cache is shared across calls like a real session would see it

use content_core::names::QName;
use content_core::nodetype::definition::{ChildNodeDefinition, NodeTypeDefinition, PropertyDefinition};
use content_core::nodetype::registry::{NodeTypeRegistry, RootNodeDescriptor};
use content_core::value::PropertyType;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn mixin(name: &str, prop: &str) -> NodeTypeDefinition {
    let mut def = NodeTypeDefinition::new(QName::unprefixed(name));
    def.is_mixin = true;
    def.property_definitions
        .push(PropertyDefinition::new(QName::unprefixed(prop), PropertyType::String));
    def
}

fn populated_registry(mixin_count: usize) -> NodeTypeRegistry {
    let registry = NodeTypeRegistry::new(RootNodeDescriptor::default());
    let mut base = NodeTypeDefinition::new(QName::unprefixed("nt:base"));
    base.property_definitions.push(PropertyDefinition::new(
        QName::unprefixed("jcr:primaryType"),
        PropertyType::Name,
    ));
    base.child_node_definitions.push(ChildNodeDefinition::new(QName::unprefixed("*")));
    registry.register(base).expect("bootstrap registration");

    for i in 0..mixin_count {
        registry
            .register(mixin(&format!("mix:m{i}"), &format!("mix:p{i}")))
            .expect("mixin registration");
    }
    registry
}

fn bench_cold_vs_warm_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("effective_type_aggregation");

    for &mixin_count in &[2usize, 8, 32] {
        group.bench_with_input(
            BenchmarkId::new("full_set_uncached", mixin_count),
            &mixin_count,
            |b, &mixin_count| {
                b.iter(|| {
                    // Fresh registry per iteration: every aggregation call
                    // starts from zero cached sub-aggregates.
                    let registry = populated_registry(mixin_count);
                    let mut names = vec![QName::unprefixed("nt:base")];
                    names.extend((0..mixin_count).map(|i| QName::unprefixed(&format!("mix:m{i}"))));
                    black_box(registry.effective_type(&names).expect("aggregates"))
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("full_set_warm_cache", mixin_count),
            &mixin_count,
            |b, &mixin_count| {
                let registry = populated_registry(mixin_count);
                let mut names = vec![QName::unprefixed("nt:base")];
                names.extend((0..mixin_count).map(|i| QName::unprefixed(&format!("mix:m{i}"))));
                // Warm the cache for this exact set once before timing repeated hits.
                registry.effective_type(&names).expect("warms cache");

                b.iter(|| black_box(registry.effective_type(&names).expect("cache hit")));
            },
        );
    }

    group.finish();
}

fn bench_incremental_subset_reuse(c: &mut Criterion) {
    // Mirrors spec §8 S3: aggregate {A}, then {B}, then {A,B} should reuse
    // both single-type builds rather than rebuilding from scratch.
    let registry = populated_registry(16);
    let base = QName::unprefixed("nt:base");
    let m0 = QName::unprefixed("mix:m0");
    let m1 = QName::unprefixed("mix:m1");

    c.bench_function("effective_type_aggregation/incremental_subset_reuse", |b| {
        b.iter(|| {
            let _ = black_box(registry.effective_type(&[base.clone()]).expect("ok"));
            let _ = black_box(registry.effective_type(&[m0.clone()]).expect("ok"));
            black_box(registry.effective_type(&[base.clone(), m0.clone(), m1.clone()]).expect("ok"))
        });
    });
}

criterion_group!(benches, bench_cold_vs_warm_aggregation, bench_incremental_subset_reuse);
criterion_main!(benches);

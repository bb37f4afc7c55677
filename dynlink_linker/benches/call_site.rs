//! Call-site dispatch benchmarks.
//!
//! Measures the guarded fast path of a linked site against a site that has
//! gone megamorphic and re-resolves every call.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use dynlink_linker::{
    CallSiteDescriptor, DynamicLinkerFactory, Lookup, MethodType, Namespace, Operation, RelinkableCallSite,
    StandardOperation,
};
use dynlink_runtime::{Key, Value};
use std::sync::Arc;

fn element_site(threshold: Option<u32>) -> Arc<RelinkableCallSite> {
    let dynamic = DynamicLinkerFactory::new()
        .unstable_relink_threshold(threshold)
        .create_linker()
        .expect("default linker");
    let descriptor = CallSiteDescriptor::new(
        Lookup::public("bench"),
        Operation::from(StandardOperation::Get)
            .with_namespace(Namespace::ELEMENT)
            .named(0i64),
        MethodType::generic(1),
    );
    dynamic.new_call_site(descriptor).expect("link site")
}

fn bench_monomorphic_hit(c: &mut Criterion) {
    let site = element_site(Some(8));
    let args = [Value::seq([Value::Int(1), Value::Int(2)])];
    site.invoke(&args).expect("warm up");
    c.bench_function("call_site_monomorphic_hit", |b| {
        b.iter(|| black_box(site.invoke(black_box(&args))));
    });
}

fn bench_polymorphic_chain(c: &mut Criterion) {
    let site = element_site(Some(8));
    let receivers = [
        Value::seq([Value::Int(1)]),
        Value::map([(Key::Int(0), Value::Int(1))]),
    ];
    c.bench_function("call_site_alternating_receivers", |b| {
        b.iter(|| {
            for receiver in &receivers {
                black_box(site.invoke(std::slice::from_ref(receiver)).ok());
            }
        });
    });
}

fn bench_reset_dispatch(c: &mut Criterion) {
    let site = element_site(Some(1));
    let receivers = [
        Value::seq([Value::Int(1)]),
        Value::map([(Key::Int(0), Value::Int(1))]),
    ];
    for receiver in &receivers {
        site.invoke(std::slice::from_ref(receiver)).expect("warm up");
    }
    assert!(site.is_reset());
    c.bench_function("call_site_reset_dispatch", |b| {
        b.iter(|| black_box(site.invoke(black_box(&receivers[..1]))));
    });
}

criterion_group!(benches, bench_monomorphic_hit, bench_polymorphic_chain, bench_reset_dispatch);
criterion_main!(benches);

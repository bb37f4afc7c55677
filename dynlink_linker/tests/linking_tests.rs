//! Call-site lifecycle through the dynamic linker.

use dynlink_linker::{
    CallSiteDescriptor, CallSitePhase, DynamicLinker, DynamicLinkerFactory, Guard, GuardedInvocation,
    GuardingDynamicLinker, Invocation, LinkError, LinkRequest, LinkResult, LinkerRef, LinkerRegistry, LinkerServices,
    Lookup, MethodType, Namespace, Operation, RelinkableCallSite, SiteClassification, SourceLocation,
    StandardOperation, StaticExporter, SwitchPoint,
};
use dynlink_runtime::{RuntimeType, TypeKind, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn get_property(name: &str) -> CallSiteDescriptor {
    CallSiteDescriptor::new(
        Lookup::public("linking_tests"),
        Operation::from(StandardOperation::Get)
            .with_namespace(Namespace::PROPERTY)
            .named(name),
        MethodType::generic(1),
    )
}

/// Answers every GET with the receiver's kind, guarded on that kind.
#[derive(Debug, Default)]
struct KindLinker {
    links: AtomicUsize,
}

impl GuardingDynamicLinker for KindLinker {
    fn name(&self) -> &str {
        "kind"
    }

    fn link(&self, request: &LinkRequest, _services: &LinkerServices) -> LinkResult<Option<GuardedInvocation>> {
        let Some(receiver) = request.receiver() else {
            return Ok(None);
        };
        self.links.fetch_add(1, Ordering::SeqCst);
        let kind = receiver.kind();
        let tag = Value::str(&format!("{kind:?}"));
        let invocation = Invocation::constant(RuntimeType::any(), tag).drop_arguments(0, &[RuntimeType::any()]);
        Ok(Some(GuardedInvocation::guarded(
            invocation,
            Guard::KindIs { position: 0, kind },
        )))
    }
}

fn kind_linker(threshold: Option<u32>) -> (DynamicLinker, Arc<KindLinker>) {
    let linker = Arc::new(KindLinker::default());
    let dynamic = DynamicLinkerFactory::new()
        .prioritized_linker(linker.clone())
        .fallback_linkers(Vec::<LinkerRef>::new())
        .unstable_relink_threshold(threshold)
        .create_linker()
        .unwrap();
    (dynamic, linker)
}

/// Receivers of eight distinct kinds.
fn polymorphic_receivers() -> Vec<Value> {
    vec![
        Value::Int(1),
        Value::Bool(true),
        Value::Float(1.5),
        Value::str("s"),
        Value::seq([]),
        Value::Null,
        Value::Int(2),
        Value::Bool(false),
    ]
}

#[test]
fn test_first_call_links_and_later_calls_hit() {
    init_tracing();
    let (dynamic, linker) = kind_linker(Some(8));
    let site = dynamic.new_call_site(get_property("anything")).unwrap();
    assert_eq!(site.phase(), CallSitePhase::Linked);
    assert_eq!(site.entry_count(), 0);

    assert_eq!(site.invoke(&[Value::Int(1)]).unwrap(), Value::str("Int"));
    assert_eq!(site.invoke(&[Value::Int(2)]).unwrap(), Value::str("Int"));
    assert_eq!(site.phase(), CallSitePhase::Linked);
    assert_eq!(site.classification(), SiteClassification::Monomorphic);
    assert_eq!(linker.links.load(Ordering::SeqCst), 1);
    assert_eq!(site.hit_count(), 1);
    assert_eq!(dynamic.stats().snapshot().links, 1);
}

#[test]
fn test_relinking_past_threshold_resets() {
    init_tracing();
    let (dynamic, linker) = kind_linker(Some(3));
    let site = dynamic.new_call_site(get_property("anything")).unwrap();

    for receiver in [Value::Int(1), Value::Bool(true), Value::Float(0.5)] {
        site.invoke(&[receiver]).unwrap();
    }
    assert_eq!(site.relink_count(), 3);
    assert_eq!(site.phase(), CallSitePhase::Relinked);

    assert_eq!(site.invoke(&[Value::Null]).unwrap(), Value::str("Null"));
    assert_eq!(site.phase(), CallSitePhase::Reset);
    assert_eq!(site.classification(), SiteClassification::Megamorphic);

    // Reset never regains a guarded fast path
    let before = linker.links.load(Ordering::SeqCst);
    for _ in 0..3 {
        assert_eq!(site.invoke(&[Value::Null]).unwrap(), Value::str("Null"));
    }
    assert_eq!(linker.links.load(Ordering::SeqCst), before + 3);
    assert_eq!(site.entry_count(), 0);
    assert_eq!(site.relink_count(), 3);

    let stats = dynamic.stats().snapshot();
    assert_eq!(stats.resets, 1);
    assert_eq!(stats.megamorphic_dispatches, 4);
}

#[test]
fn test_disabled_threshold_never_resets() {
    let (dynamic, _) = kind_linker(None);
    let site = dynamic.new_call_site(get_property("anything")).unwrap();
    for receiver in polymorphic_receivers().into_iter().cycle().take(40) {
        site.invoke(&[receiver]).unwrap();
    }
    assert!(!site.is_reset());
    assert!(site.relink_count() > 8);
}

#[test]
fn test_identical_shapes_yield_identical_guards() {
    let (dynamic, _) = kind_linker(Some(8));
    let services = dynamic.linker_services();
    let descriptor = Arc::new(get_property("anything"));
    let first = services
        .guarded_invocation(&LinkRequest::new(descriptor.clone(), vec![Value::Int(1)], false))
        .unwrap()
        .unwrap();
    let second = services
        .guarded_invocation(&LinkRequest::new(descriptor, vec![Value::Int(9)], false))
        .unwrap()
        .unwrap();
    assert_eq!(first.guard(), second.guard());
    for arg in [Value::Int(3), Value::Null] {
        assert_eq!(first.is_valid_for(&[arg.clone()]), second.is_valid_for(&[arg]));
    }
}

#[test]
fn test_initialize_race_has_one_winner() {
    let (dynamic, _) = kind_linker(Some(8));
    let site = Arc::new(RelinkableCallSite::new(get_property("anything")));
    let wins = AtomicUsize::new(0);
    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                if dynamic.link(site.clone()).is_ok() {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });
    assert_eq!(wins.load(Ordering::SeqCst), 1);
    assert_eq!(dynamic.link(site).unwrap_err(), LinkError::AlreadyInitialized);
}

#[test]
fn test_concurrent_invocation_after_link() {
    let (dynamic, _) = kind_linker(Some(64));
    let site = dynamic.new_call_site(get_property("anything")).unwrap();
    std::thread::scope(|scope| {
        for receiver in polymorphic_receivers() {
            let site = &site;
            scope.spawn(move || {
                let expected = Value::str(&format!("{:?}", receiver.kind()));
                for _ in 0..50 {
                    assert_eq!(site.invoke(std::slice::from_ref(&receiver)).unwrap(), expected);
                }
            });
        }
    });
}

#[test]
fn test_unresolved_operation_is_reported() {
    let dynamic = DynamicLinkerFactory::new().create_linker().unwrap();
    let site = dynamic.new_call_site(get_property("nothing")).unwrap();
    let err = site.invoke(&[Value::Int(1)]).unwrap_err();
    let link = err.as_link().unwrap();
    assert!(link.is_no_applicable_method());
    assert_eq!(dynamic.stats().snapshot().link_failures, 1);

    // Not retried: the next call walks the chain again and fails the same way
    assert!(site.invoke(&[Value::Int(1)]).is_err());
    assert_eq!(site.relink_count(), 0);
}

#[test]
fn test_invoking_unlinked_site_fails() {
    let site = RelinkableCallSite::new(get_property("x"));
    let err = site.invoke(&[Value::Null]).unwrap_err();
    assert_eq!(err.as_link(), Some(&LinkError::Uninitialized));
}

/// Records the location reported while linking.
#[derive(Debug, Default)]
struct LocationRecorder {
    seen: parking_lot::Mutex<Vec<Option<SourceLocation>>>,
}

impl GuardingDynamicLinker for LocationRecorder {
    fn name(&self) -> &str {
        "location-recorder"
    }

    fn link(&self, _request: &LinkRequest, _services: &LinkerServices) -> LinkResult<Option<GuardedInvocation>> {
        self.seen.lock().push(DynamicLinker::linked_call_site_location());
        Ok(None)
    }
}

#[test]
fn test_linked_call_site_location() {
    let recorder = Arc::new(LocationRecorder::default());
    let dynamic = DynamicLinkerFactory::new()
        .prioritized_linker(recorder.clone())
        .create_linker()
        .unwrap();
    let location = SourceLocation::new("main.dyn", 12);
    let descriptor = CallSiteDescriptor::new(
        Lookup::public("linking_tests"),
        Operation::from(StandardOperation::Get)
            .with_namespace(Namespace::ELEMENT)
            .named(0i64),
        MethodType::generic(1),
    )
    .with_location(location.clone());
    let site = dynamic.new_call_site(descriptor).unwrap();

    assert_eq!(site.invoke(&[Value::seq([Value::Int(7)])]).unwrap(), Value::Int(7));
    assert_eq!(recorder.seen.lock().as_slice(), &[Some(location)]);
    assert_eq!(DynamicLinker::linked_call_site_location(), None);
}

#[test]
fn test_chained_site_holds_several_targets() {
    let linker = Arc::new(KindLinker::default());
    let dynamic = DynamicLinkerFactory::new()
        .prioritized_linker(linker.clone())
        .max_chain_length(3)
        .create_linker()
        .unwrap();
    let site = dynamic.new_call_site(get_property("anything")).unwrap();
    for receiver in [Value::Int(1), Value::Bool(true), Value::Int(2), Value::Bool(false)] {
        site.invoke(&[receiver]).unwrap();
    }
    assert_eq!(site.entry_count(), 2);
    assert_eq!(site.classification(), SiteClassification::Polymorphic);
    assert_eq!(linker.links.load(Ordering::SeqCst), 2);
}

/// Links a constant guarded by a shared switch point.
#[derive(Debug)]
struct VersionedLinker {
    switch_point: parking_lot::Mutex<SwitchPoint>,
    version: AtomicUsize,
}

impl GuardingDynamicLinker for VersionedLinker {
    fn name(&self) -> &str {
        "versioned"
    }

    fn link(&self, _request: &LinkRequest, _services: &LinkerServices) -> LinkResult<Option<GuardedInvocation>> {
        let version = self.version.load(Ordering::SeqCst) as i64;
        let invocation =
            Invocation::constant(RuntimeType::any(), Value::Int(version)).drop_arguments(0, &[RuntimeType::any()]);
        Ok(Some(
            GuardedInvocation::unguarded(invocation).with_switch_point(self.switch_point.lock().clone()),
        ))
    }
}

#[test]
fn test_switch_point_invalidation_relinks() {
    let linker = Arc::new(VersionedLinker {
        switch_point: parking_lot::Mutex::new(SwitchPoint::new()),
        version: AtomicUsize::new(1),
    });
    let dynamic = DynamicLinkerFactory::new()
        .prioritized_linker(linker.clone())
        .create_linker()
        .unwrap();
    let site = dynamic.new_call_site(get_property("version")).unwrap();
    assert_eq!(site.invoke(&[Value::Null]).unwrap(), Value::Int(1));

    linker.version.store(2, Ordering::SeqCst);
    assert_eq!(site.invoke(&[Value::Null]).unwrap(), Value::Int(1));

    let old = std::mem::replace(&mut *linker.switch_point.lock(), SwitchPoint::new());
    old.invalidate();
    assert_eq!(site.invoke(&[Value::Null]).unwrap(), Value::Int(2));
    assert_eq!(site.relink_count(), 2);
}

#[test]
fn test_prelink_transformer_rewrites_target() {
    let dynamic = DynamicLinkerFactory::new()
        .prelink_transformer(Arc::new(|gi: GuardedInvocation, _request: &LinkRequest, _services: &LinkerServices| {
            let shout = Invocation::from_runtime("shout", MethodType::generic(1), |args| {
                Ok(Value::str(&format!("{}!", args[0])))
            });
            let filtered = gi.invocation().filter_return(&shout)?;
            Ok(gi.replace_invocation(filtered))
        }))
        .create_linker()
        .unwrap();
    let descriptor = CallSiteDescriptor::new(
        Lookup::public("linking_tests"),
        Operation::from(StandardOperation::Call)
            .with_namespace(Namespace::METHOD)
            .named("toUpperCase"),
        MethodType::generic(1),
    );
    let site = dynamic.new_call_site(descriptor).unwrap();
    assert_eq!(site.invoke(&[Value::str("abc")]).unwrap(), Value::str("ABC!"));
}

#[test]
fn test_discovered_linkers_follow_prioritized() {
    let registry = Arc::new(LinkerRegistry::new());
    let discovered = Arc::new(KindLinker::default());
    registry.register(Arc::new(StaticExporter::new("kinds", vec![discovered as LinkerRef]).in_scope("engine")));

    let scoped = DynamicLinkerFactory::new()
        .registry(registry.clone())
        .discovery_scope("engine")
        .create_linker()
        .unwrap();
    assert_eq!(scoped.linker_services().chain().names(), vec!["kind", "beans"]);

    let unscoped = DynamicLinkerFactory::new().registry(registry).create_linker().unwrap();
    assert_eq!(unscoped.linker_services().chain().names(), vec!["beans"]);
}

#[test]
fn test_kind_guard_fails_on_missing_argument() {
    let guard = Guard::KindIs {
        position: 0,
        kind: TypeKind::Int,
    };
    assert!(guard.test(&[Value::Int(0)]));
    assert!(!guard.test(&[]));
}

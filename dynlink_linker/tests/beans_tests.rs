//! Introspection linking over beans, sequences and mappings.

use dynlink_linker::{
    AccessorPrecedence, BeansLinker, CallSiteDescriptor, DynamicLinker, DynamicLinkerFactory, GuardedInvocation,
    InvokeError, LinkError, LinkRequest, LinkResult, Lookup, MethodType, MissingMemberHandler, Name, Namespace,
    Operation, StandardOperation,
};
use dynlink_runtime::{BeanClass, Key, MethodBody, NativeFunction, RuntimeError, Value};
use std::sync::Arc;

// =============================================================================
// Helpers
// =============================================================================

fn linker() -> DynamicLinker {
    DynamicLinkerFactory::new().create_linker().unwrap()
}

fn op(verb: StandardOperation, namespaces: &[Namespace]) -> Operation {
    Operation::from(verb).with_namespaces(namespaces).unwrap()
}

fn call(dynamic: &DynamicLinker, lookup: Lookup, operation: Operation, args: &[Value]) -> Result<Value, InvokeError> {
    let descriptor = CallSiteDescriptor::new(lookup, operation, MethodType::generic(args.len()));
    let site = dynamic.new_call_site(descriptor).unwrap();
    site.invoke(args)
}

fn public(operation: Operation, args: &[Value]) -> Result<Value, InvokeError> {
    call(&linker(), Lookup::public("beans_tests"), operation, args)
}

fn body(f: impl Fn(&Value, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static) -> MethodBody {
    Arc::new(f)
}

fn link_error(result: Result<Value, InvokeError>) -> LinkError {
    match result {
        Err(InvokeError::Link(e)) => e,
        other => panic!("expected link error, got {other:?}"),
    }
}

fn runtime_error(result: Result<Value, InvokeError>) -> RuntimeError {
    match result {
        Err(InvokeError::Runtime(e)) => e,
        other => panic!("expected runtime error, got {other:?}"),
    }
}

fn numbers() -> Value {
    Value::seq([Value::Int(23), Value::Int(430), Value::Int(-4354)])
}

// =============================================================================
// Namespace Order
// =============================================================================

#[test]
fn test_namespace_order_decides_map_access() {
    let map = Value::map([(Key::from("empty"), Value::Bool(true))]);

    let element_first = op(StandardOperation::Get, &[Namespace::ELEMENT, Namespace::PROPERTY]).named("empty");
    assert_eq!(public(element_first, &[map.clone()]).unwrap(), Value::Bool(true));

    let property_first = op(StandardOperation::Get, &[Namespace::PROPERTY, Namespace::ELEMENT]).named("empty");
    assert_eq!(public(property_first, &[map]).unwrap(), Value::Bool(false));
}

#[test]
fn test_element_miss_falls_through_to_property() {
    let map = Value::map([(Key::from("a"), Value::Int(1))]);
    let operation = op(StandardOperation::Get, &[Namespace::ELEMENT, Namespace::PROPERTY]).named("empty");
    assert_eq!(public(operation, &[map]).unwrap(), Value::Bool(false));
}

#[test]
fn test_unnamed_access_resolves_key_per_call() {
    let dynamic = linker();
    let descriptor = CallSiteDescriptor::new(
        Lookup::public("beans_tests"),
        op(StandardOperation::Get, &[Namespace::ELEMENT, Namespace::PROPERTY]),
        MethodType::generic(2),
    );
    let site = dynamic.new_call_site(descriptor).unwrap();
    let map = Value::map([(Key::from("size"), Value::str("custom"))]);

    assert_eq!(site.invoke(&[map.clone(), Value::str("size")]).unwrap(), Value::str("custom"));
    assert_eq!(site.invoke(&[map.clone(), Value::str("empty")]).unwrap(), Value::Bool(false));
    assert_eq!(site.invoke(&[map, Value::str("missing")]).unwrap(), Value::Null);
    assert_eq!(site.relink_count(), 1);
}

// =============================================================================
// Elements
// =============================================================================

#[test]
fn test_remove_element_from_sequence() {
    let seq = numbers();
    let remove = op(StandardOperation::Remove, &[Namespace::ELEMENT]);
    assert_eq!(public(remove, &[seq.clone(), Value::Int(1)]).unwrap(), Value::Int(430));
    assert_eq!(seq, Value::seq([Value::Int(23), Value::Int(-4354)]));
}

#[test]
fn test_remove_out_of_range_fails() {
    for index in [3i64, -1] {
        let remove = op(StandardOperation::Remove, &[Namespace::ELEMENT]).named(index);
        let err = runtime_error(public(remove, &[numbers()]));
        assert!(err.is_index_out_of_range(), "{err}");
    }
}

#[test]
fn test_set_element_returns_previous() {
    let seq = numbers();
    let set = op(StandardOperation::Set, &[Namespace::ELEMENT]).named(0i64);
    assert_eq!(public(set, &[seq.clone(), Value::Int(7)]).unwrap(), Value::Int(23));
    assert_eq!(seq.as_seq().unwrap().get(0), Some(Value::Int(7)));
}

#[test]
fn test_set_absent_map_key_inserts() {
    let map = Value::map([]);
    let set = op(StandardOperation::Set, &[Namespace::ELEMENT]).named("color");
    assert_eq!(public(set, &[map.clone(), Value::str("red")]).unwrap(), Value::Null);
    assert_eq!(map.as_map().unwrap().get(&Key::from("color")), Some(Value::str("red")));
}

#[test]
fn test_get_absent_map_key_is_null() {
    let get = op(StandardOperation::Get, &[Namespace::ELEMENT]).named("nope");
    assert_eq!(public(get, &[Value::map([])]).unwrap(), Value::Null);
}

#[test]
fn test_invalid_map_key_is_reported() {
    let get = op(StandardOperation::Get, &[Namespace::ELEMENT]);
    let err = runtime_error(public(get, &[Value::map([]), Value::Float(1.5)]));
    assert!(matches!(err, RuntimeError::InvalidKey { .. }));
}

#[test]
fn test_wrong_arity_is_rejected() {
    let get = op(StandardOperation::Get, &[Namespace::ELEMENT]).named(0i64);
    let err = link_error(public(get, &[numbers(), Value::Int(1)]));
    assert!(matches!(err, LinkError::InvalidOperation(_)));
}

// =============================================================================
// Properties
// =============================================================================

fn painted_class() -> Arc<BeanClass> {
    BeanClass::builder("Painted")
        .property("color", Some(body(|_, _| Ok(Value::str("explicit")))), None)
        .method("getColor", 0, |_, _| Ok(Value::str("conventional")))
        .method("isVisible", 0, |_, _| Ok(Value::Bool(true)))
        .field("width", Value::Int(10))
        .private_field("secret", Value::Int(42))
        .private_method("getHidden", 0, |_, _| Ok(Value::Int(1)))
        .default_constructor()
        .build()
}

fn instance(class: &Arc<BeanClass>) -> Value {
    class.instantiate(&[]).unwrap()
}

#[test]
fn test_explicit_accessor_wins_by_default() {
    let bean = instance(&painted_class());
    let get = op(StandardOperation::Get, &[Namespace::PROPERTY]).named("color");
    assert_eq!(public(get, &[bean]).unwrap(), Value::str("explicit"));
}

#[test]
fn test_conventional_accessor_precedence() {
    let dynamic = DynamicLinkerFactory::new()
        .prioritized_linker(Arc::new(
            BeansLinker::default().with_precedence(AccessorPrecedence::ConventionFirst),
        ))
        .create_linker()
        .unwrap();
    let bean = instance(&painted_class());
    let get = op(StandardOperation::Get, &[Namespace::PROPERTY]).named("color");
    assert_eq!(
        call(&dynamic, Lookup::public("beans_tests"), get, &[bean]).unwrap(),
        Value::str("conventional")
    );
}

#[test]
fn test_is_prefix_accessor() {
    let bean = instance(&painted_class());
    let get = op(StandardOperation::Get, &[Namespace::PROPERTY]).named("visible");
    assert_eq!(public(get, &[bean]).unwrap(), Value::Bool(true));
}

#[test]
fn test_public_field_read_and_write() {
    let dynamic = linker();
    let bean = instance(&painted_class());
    let lookup = || Lookup::public("beans_tests");

    let set = op(StandardOperation::Set, &[Namespace::PROPERTY]).named("width");
    call(&dynamic, lookup(), set, &[bean.clone(), Value::Int(12)]).unwrap();
    let get = op(StandardOperation::Get, &[Namespace::PROPERTY]).named("width");
    assert_eq!(call(&dynamic, lookup(), get, &[bean]).unwrap(), Value::Int(12));
}

#[test]
fn test_private_members_need_privileged_lookup() {
    let dynamic = linker();
    let bean = instance(&painted_class());
    for name in ["secret", "hidden"] {
        let get = || op(StandardOperation::Get, &[Namespace::PROPERTY]).named(name);
        let err = link_error(call(&dynamic, Lookup::public("beans_tests"), get(), &[bean.clone()]));
        assert!(matches!(err, LinkError::AccessDenied(_)), "{name}: {err}");
        assert!(call(&dynamic, Lookup::privileged("beans_tests"), get(), &[bean.clone()]).is_ok());
    }
}

#[test]
fn test_explicit_property_on_non_public_class_is_denied() {
    let dynamic = linker();
    let class = BeanClass::builder("Vault")
        .non_public()
        .property("combination", Some(body(|_, _| Ok(Value::str("1234")))), None)
        .default_constructor()
        .build();
    let vault = instance(&class);
    let get = || op(StandardOperation::Get, &[Namespace::PROPERTY]).named("combination");

    let err = link_error(call(&dynamic, Lookup::public("beans_tests"), get(), &[vault.clone()]));
    assert!(matches!(err, LinkError::AccessDenied(_)), "{err}");
    let value = call(&dynamic, Lookup::privileged("beans_tests"), get(), &[vault]).unwrap();
    assert_eq!(value, Value::str("1234"));
}

#[test]
fn test_explicit_property_declared_by_public_contract_is_visible() {
    let contract = BeanClass::builder("Labelled")
        .property("label", Some(body(|_, _| Ok(Value::str("contract")))), None)
        .build();
    let class = BeanClass::builder("Crate")
        .non_public()
        .implements(contract)
        .default_constructor()
        .build();
    let get = op(StandardOperation::Get, &[Namespace::PROPERTY]).named("label");
    assert_eq!(public(get, &[instance(&class)]).unwrap(), Value::str("contract"));
}

#[test]
fn test_missing_property_is_unresolved() {
    let bean = instance(&painted_class());
    let get = op(StandardOperation::Get, &[Namespace::PROPERTY]).named("depth");
    assert!(link_error(public(get, &[bean])).is_no_applicable_method());
}

// =============================================================================
// Methods
// =============================================================================

fn shape_contract() -> Arc<BeanClass> {
    BeanClass::builder("Shape")
        .method("describe", 0, |_, _| Ok(Value::str("shape")))
        .build()
}

fn hidden_square() -> Value {
    let class = BeanClass::builder("Square")
        .non_public()
        .implements(shape_contract())
        .method("describe", 0, |_, _| Ok(Value::str("square")))
        .method("corners", 0, |_, _| Ok(Value::Int(4)))
        .default_constructor()
        .build();
    instance(&class)
}

#[test]
fn test_method_reachable_through_public_contract() {
    let call_describe = op(StandardOperation::Call, &[Namespace::METHOD]).named("describe");
    assert_eq!(public(call_describe, &[hidden_square()]).unwrap(), Value::str("square"));

    let call_corners = op(StandardOperation::Call, &[Namespace::METHOD]).named("corners");
    let err = link_error(public(call_corners, &[hidden_square()]));
    assert!(matches!(err, LinkError::AccessDenied(_)));
}

#[test]
fn test_get_method_binds_receiver() {
    let dynamic = linker();
    let get = op(StandardOperation::Get, &[Namespace::METHOD]).named("size");
    let size = call(&dynamic, Lookup::public("beans_tests"), get, &[numbers()]).unwrap();
    assert!(matches!(size, Value::Function(_)));

    let invoke = op(StandardOperation::Call, &[Namespace::METHOD]);
    assert_eq!(
        call(&dynamic, Lookup::public("beans_tests"), invoke, &[size]).unwrap(),
        Value::Int(3)
    );
}

#[test]
fn test_call_method_with_arguments() {
    let call_get = op(StandardOperation::Call, &[Namespace::METHOD]).named("get");
    assert_eq!(public(call_get, &[numbers(), Value::Int(2)]).unwrap(), Value::Int(-4354));
}

#[test]
fn test_call_function_value() {
    let add = Value::function(NativeFunction::new("add", 2, |args| {
        match (args[0].as_int(), args[1].as_int()) {
            (Some(a), Some(b)) => Ok(Value::Int(a + b)),
            _ => Err(RuntimeError::type_mismatch("Int", args[0].type_name())),
        }
    }));
    let call_op = Operation::from(StandardOperation::Call);
    assert_eq!(public(call_op, &[add, Value::Int(2), Value::Int(3)]).unwrap(), Value::Int(5));
}

#[test]
fn test_call_non_function_is_unresolved() {
    let err = link_error(public(Operation::from(StandardOperation::Call), &[Value::Int(1)]));
    assert!(err.is_no_applicable_method());
}

// =============================================================================
// Construction
// =============================================================================

#[test]
fn test_new_instantiates_class() {
    let class = painted_class();
    let created = public(Operation::from(StandardOperation::New), &[Value::Class(class.clone())]).unwrap();
    assert_eq!(created.type_id(), class.type_id());
}

#[test]
fn test_new_non_public_class_is_denied() {
    let class = BeanClass::builder("Internal").non_public().default_constructor().build();
    let err = link_error(public(Operation::from(StandardOperation::New), &[Value::Class(class)]));
    assert!(matches!(err, LinkError::AccessDenied(_)));
}

// =============================================================================
// Missing Members
// =============================================================================

/// Answers every missing named member with its own name.
#[derive(Debug)]
struct EchoMissing;

impl MissingMemberHandler for EchoMissing {
    fn missing_member(&self, _request: &LinkRequest, name: &Name) -> LinkResult<Option<GuardedInvocation>> {
        let value = name.to_value();
        Ok(Some(GuardedInvocation::unguarded(dynlink_linker::Invocation::from_runtime(
            "echo",
            MethodType::generic(1),
            move |_| Ok(value.clone()),
        ))))
    }

    fn missing_element(
        &self,
        _verb: StandardOperation,
        _receiver: &Value,
        key: &Value,
        _value: Option<&Value>,
    ) -> Result<Value, RuntimeError> {
        Ok(key.clone())
    }
}

#[test]
fn test_custom_missing_member_handler() {
    let dynamic = DynamicLinkerFactory::new()
        .fallback_linkers([Arc::new(BeansLinker::default().with_missing_member_handler(Arc::new(EchoMissing)))
            as dynlink_linker::LinkerRef])
        .create_linker()
        .unwrap();
    let lookup = || Lookup::public("beans_tests");

    let get = op(StandardOperation::Get, &[Namespace::PROPERTY]).named("depth");
    assert_eq!(
        call(&dynamic, lookup(), get, &[instance(&painted_class())]).unwrap(),
        Value::str("depth")
    );

    let get = op(StandardOperation::Get, &[Namespace::ELEMENT]).named(9i64);
    assert_eq!(call(&dynamic, lookup(), get, &[numbers()]).unwrap(), Value::Int(9));
}

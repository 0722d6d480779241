//! Realm creation, bootstrap order, current-realm scoping and disposal.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use tern_vm_core::object::PropertyDescriptor;
use tern_vm_core::{JsObject, PropertyKey, Value, VmError, VmResult};
use tern_vm_runtime::host::{FixedTimeZone, sink};
use tern_vm_runtime::module_loader::ModuleHandle;
use tern_vm_runtime::{
    EcmaVersion, EngineConfig, EngineOptions, GlobalEnvironment, GuardKind, HostEnvironment,
    ManualClock, ModuleLoader, Stage, WasmBackend,
};

fn engine(options: EngineOptions) -> Arc<EngineConfig> {
    EngineConfig::create(&options, None).unwrap()
}

fn top_level(config: &Arc<EngineConfig>) -> Arc<GlobalEnvironment> {
    GlobalEnvironment::create_top_level(config, config.host()).unwrap()
}

fn global_has(realm: &GlobalEnvironment, name: &str) -> bool {
    realm
        .global_object()
        .is_some_and(|g| g.has_own_property(&PropertyKey::string(name)))
}

#[test]
fn test_bootstrap_order() {
    let config = engine(EngineOptions::default());
    let realm = top_level(&config);
    assert_eq!(
        realm.intrinsics().bootstrap_order(),
        &[
            Stage::ObjectPrototype,
            Stage::FunctionPrototype,
            Stage::GlobalObject,
            Stage::ObjectConstructor,
            Stage::FunctionConstructor,
            Stage::Fundamentals,
            Stage::Es6,
            Stage::Errors,
            Stage::Binary,
            Stage::Optional,
            Stage::Globals,
        ]
    );
}

#[test]
fn test_es5_skips_es6_stage() {
    let config = engine(EngineOptions {
        ecmascript_version: EcmaVersion::ES5,
        ..Default::default()
    });
    let realm = top_level(&config);
    let order = realm.intrinsics().bootstrap_order();
    assert!(!order.contains(&Stage::Es6));
    assert_eq!(
        &order[..3],
        &[Stage::ObjectPrototype, Stage::FunctionPrototype, Stage::GlobalObject]
    );
    assert!(!global_has(&realm, "Symbol"));
    assert!(!global_has(&realm, "globalThis"));
    assert!(global_has(&realm, "Array"));
}

#[test]
fn test_intrinsic_graph() {
    let config = engine(EngineOptions::default());
    let realm = top_level(&config);
    let intrinsics = realm.intrinsics();
    let object_proto = intrinsics.object_prototype();
    let function_proto = intrinsics.function_prototype();

    assert!(object_proto.prototype().is_none());
    assert!(Arc::ptr_eq(&function_proto.prototype().unwrap(), object_proto));
    assert!(!intrinsics.throw_type_error().is_extensible());
    let thrown = intrinsics.throw_type_error().call(&Value::undefined(), &[]).unwrap_err();
    assert!(thrown.is_type_error());

    let array = intrinsics.get("Array").unwrap();
    assert!(Arc::ptr_eq(&array.prototype().unwrap(), function_proto));
    let array_proto = array.get(&"prototype".into()).unwrap();
    let ctor = array_proto.as_object().unwrap().get(&"constructor".into()).unwrap();
    assert!(Arc::ptr_eq(ctor.as_object().unwrap(), array));

    let range_error = intrinsics.get("RangeError").unwrap();
    let range_proto = range_error.get(&"prototype".into()).unwrap();
    let error_proto = intrinsics.get("Error").unwrap().get(&"prototype".into()).unwrap();
    assert!(Arc::ptr_eq(
        &range_proto.as_object().unwrap().prototype().unwrap(),
        error_proto.as_object().unwrap()
    ));

    let global = realm.global_object().unwrap();
    let global_this = global.get(&"globalThis".into()).unwrap();
    assert!(Arc::ptr_eq(global_this.as_object().unwrap(), &global));
    assert!(!global_has(&realm, "%TypedArray%"));
    assert!(intrinsics.get("%TypedArray%").is_some());
    assert!(global_has(&realm, "AggregateError"));
    assert!(global_has(&realm, "WeakRef"));
}

#[test]
fn test_annex_b_proto_accessor() {
    let with = top_level(&engine(EngineOptions::default()));
    let proto = with.intrinsics().object_prototype();
    let desc = proto.get_own_property(&PropertyKey::string("__proto__")).unwrap();
    assert!(desc.is_accessor());

    let without = top_level(&engine(EngineOptions {
        annex_b: false,
        ..Default::default()
    }));
    assert!(
        without
            .intrinsics()
            .object_prototype()
            .get_own_property(&PropertyKey::string("__proto__"))
            .is_none()
    );
}

#[test]
fn test_proto_setter_rejects_cycles() {
    let config = engine(EngineOptions::default());
    let realm = top_level(&config);
    let object_prototype = realm.intrinsics().object_prototype();
    let Some(PropertyDescriptor::Accessor { set: Some(setter), .. }) =
        object_prototype.get_own_property(&PropertyKey::string("__proto__"))
    else {
        panic!("__proto__ is not an accessor with a setter");
    };

    let a = JsObject::ordinary(config.shape_arena(), Some(object_prototype.clone()));
    let b = JsObject::ordinary(config.shape_arena(), Some(object_prototype.clone()));
    setter
        .call(&Value::Object(a.clone()), &[Value::Object(b.clone())])
        .unwrap();

    let err = setter
        .call(&Value::Object(b.clone()), &[Value::Object(a.clone())])
        .unwrap_err();
    assert!(err.is_type_error());
    assert!(err.to_string().contains("Cyclic __proto__ value"));
    assert!(Arc::ptr_eq(&b.prototype().unwrap(), object_prototype));
    assert!(a.get(&PropertyKey::string("missing")).unwrap().is_undefined());

    b.prevent_extensions();
    let err = setter
        .call(&Value::Object(b.clone()), &[Value::Null])
        .unwrap_err();
    assert!(err.is_type_error());
}

#[test]
fn test_bigint_and_number_coercion() {
    let realm = top_level(&engine(EngineOptions::default()));
    let bigint = realm.intrinsics().get("BigInt").unwrap();
    let number = realm.intrinsics().get("Number").unwrap();
    let call = |f: &JsObject, arg: Value| f.call(&Value::Undefined, &[arg]);

    let big = call(bigint, Value::number(9_007_199_254_740_992.0)).unwrap();
    assert_eq!(big.as_bigint().unwrap().to_string(), "9007199254740992");
    let big = call(bigint, Value::number(1e21)).unwrap();
    assert_eq!(big.as_bigint().unwrap().to_string(), "1000000000000000000000");
    assert!(call(bigint, Value::number(0.5)).unwrap_err().is_range_error());

    let parsed = call(bigint, Value::str("123")).unwrap();
    assert_eq!(parsed.as_bigint().unwrap().to_string(), "123");
    assert!(call(bigint, Value::str("12n")).unwrap_err().is_syntax_error());
    assert!(call(bigint, Value::Undefined).unwrap_err().is_type_error());

    assert_eq!(call(number, Value::bigint(10)).unwrap().as_number(), Some(10.0));
    assert_eq!(call(number, Value::str("0x10")).unwrap().as_number(), Some(16.0));
}

#[test]
fn test_object_model_guards() {
    let config = engine(EngineOptions::default());
    let realm = top_level(&config);
    // Bootstrap alone breaks none of them.
    assert!(config.guards().invalidated().is_empty());

    let array_proto = realm.intrinsics().get("Array.prototype").unwrap();
    array_proto.set(PropertyKey::string("shuffle"), Value::Null).unwrap();
    assert!(config.is_valid(GuardKind::ArrayPrototypeNoElements));
    array_proto.set(PropertyKey::index(0), Value::int32(1)).unwrap();
    assert!(array_proto.has_own_property(&PropertyKey::index(0)));
    assert!(!config.is_valid(GuardKind::ArrayPrototypeNoElements));

    let array = JsObject::array(config.shape_arena(), Some(array_proto.clone()), vec![Value::Null]);
    assert!(config.is_valid(GuardKind::FastArray));
    assert!(array.delete(&PropertyKey::index(0)));
    assert!(!config.is_valid(GuardKind::FastArray));

    let global = realm.global_object().unwrap();
    assert!(config.is_valid(GuardKind::NoSuchPropertyUnused));
    global
        .set(PropertyKey::string("__noSuchProperty__"), Value::Null)
        .unwrap();
    assert!(!config.is_valid(GuardKind::NoSuchPropertyUnused));
}

#[test]
fn test_object_prototype_elements_break_array_guard() {
    let config = engine(EngineOptions::default());
    let realm = top_level(&config);
    let child = GlobalEnvironment::create_child(&config, config.host(), &realm).unwrap();
    child
        .intrinsics()
        .object_prototype()
        .set(PropertyKey::index(3), Value::Null)
        .unwrap();
    assert!(!config.is_valid(GuardKind::ArrayPrototypeNoElements));
}

#[test]
fn test_optional_intrinsics_follow_options() {
    let config = engine(EngineOptions {
        intl_402: true,
        temporal: true,
        global_property: true,
        performance: true,
        ..Default::default()
    });
    let realm = top_level(&config);
    let names = [
        "Intl",
        "Temporal",
        "global",
        "performance",
        "BigInt",
        "SharedArrayBuffer",
        "Atomics",
    ];
    for name in names {
        assert!(global_has(&realm, name), "missing {name}");
    }

    let config = engine(EngineOptions {
        ecmascript_version: EcmaVersion::ES2016,
        console: false,
        print: false,
        ..Default::default()
    });
    let realm = top_level(&config);
    for name in ["Intl", "BigInt", "SharedArrayBuffer", "Atomics", "console", "print", "WeakRef"] {
        assert!(!global_has(&realm, name), "unexpected {name}");
    }
}

#[test]
fn test_webassembly_needs_backend() {
    let config = engine(EngineOptions {
        webassembly: true,
        ..Default::default()
    });
    let err = GlobalEnvironment::create_top_level(&config, config.host()).unwrap_err();
    assert!(err.is_configuration_error());
    assert!(config.realm_registry().is_empty());

    struct AcceptAll;
    impl WasmBackend for AcceptAll {
        fn name(&self) -> &str {
            "accept-all"
        }
        fn validate(&self, _: &[u8]) -> bool {
            true
        }
    }
    let host = Arc::new(HostEnvironment::builder().wasm_backend(Arc::new(AcceptAll)).build());
    let realm = GlobalEnvironment::create_top_level(&config, host).unwrap();
    assert!(global_has(&realm, "WebAssembly"));
}

#[test]
fn test_child_realms_and_guards() {
    let config = engine(EngineOptions::default());
    let top = top_level(&config);
    assert!(config.is_single_realm());

    let first = GlobalEnvironment::create_child(&config, config.host(), &top).unwrap();
    let second = GlobalEnvironment::create_child(&config, config.host(), &top).unwrap();
    assert!(!config.is_single_realm());
    assert!(!config.is_valid(GuardKind::NoChildRealms));
    assert!(!first.is_top_level());
    assert!(Arc::ptr_eq(&first.parent().unwrap(), &top));
    assert!(Arc::ptr_eq(first.agent(), top.agent()));

    assert_eq!(top.index_of_child(&first), Some(0));
    assert_eq!(top.index_of_child(&second), Some(1));
    assert!(top.remove_child(0).is_some());
    assert!(top.child_realm(0).is_none());
    assert!(Arc::ptr_eq(&top.child_realm(1).unwrap(), &second));
    assert_eq!(top.child_realms().len(), 1);
}

#[test]
fn test_second_top_level_realm_invalidates_single_realm() {
    let config = engine(EngineOptions::default());
    let _a = top_level(&config);
    assert!(config.is_single_realm());
    let _b = top_level(&config);
    assert!(!config.is_single_realm());
    assert!(config.is_valid(GuardKind::NoChildRealms));
}

#[test]
fn test_enter_and_leave() {
    let config = engine(EngineOptions::default());
    let top = top_level(&config);
    let child = GlobalEnvironment::create_child(&config, config.host(), &top).unwrap();
    assert!(Arc::ptr_eq(&top.current(), &top));
    {
        let _scope = top.enter(&child);
        assert!(Arc::ptr_eq(&top.current(), &child));
        assert!(Arc::ptr_eq(&child.current(), &child));
        {
            let _inner = top.enter(&top);
            assert!(Arc::ptr_eq(&top.current(), &top));
        }
        assert!(Arc::ptr_eq(&top.current(), &child));
    }
    assert!(Arc::ptr_eq(&top.current(), &top));

    let scope = top.enter(&child);
    let previous = scope.previous().cloned();
    std::mem::forget(scope);
    top.leave(previous.as_ref());
    assert!(Arc::ptr_eq(&top.current(), &top));
}

#[test]
#[should_panic(expected = "not a top-level realm")]
fn test_enter_on_child_panics() {
    let config = engine(EngineOptions::default());
    let top = top_level(&config);
    let child = GlobalEnvironment::create_child(&config, config.host(), &top).unwrap();
    let _scope = child.enter(&top);
}

#[test]
#[should_panic(expected = "single-realm guard holds")]
fn test_enter_other_realm_requires_invalidated_guard() {
    let config = engine(EngineOptions::default());
    let top = top_level(&config);
    let other = top_level(&config);
    // Simulate a pristine engine that never saw the second realm.
    config.update_stable_options(&config.stable_options(), tern_vm_runtime::UpdatePhase::Patch);
    let _scope = top.enter(&other);
}

#[test]
fn test_dispose() {
    let config = engine(EngineOptions::default());
    let top = top_level(&config);
    let child = GlobalEnvironment::create_child(&config, config.host(), &top).unwrap();
    let grandchild = GlobalEnvironment::create_child(&config, config.host(), &child).unwrap();
    assert_eq!(top.child_realms().len(), 2);

    child.dispose();
    assert!(child.is_disposed());
    assert!(child.global_object().is_none());
    assert!(top.index_of_child(&child).is_none());
    assert!(Arc::ptr_eq(&top.child_realm(1).unwrap(), &grandchild));
    assert!(config.realm_registry().get(child.id()).is_none());

    top.dispose();
    assert!(grandchild.is_disposed());
    assert!(top.child_realms().is_empty());
}

#[test]
#[should_panic(expected = "was disposed")]
fn test_enter_disposed_realm_panics() {
    let config = engine(EngineOptions::default());
    let top = top_level(&config);
    let child = GlobalEnvironment::create_child(&config, config.host(), &top).unwrap();
    child.dispose();
    let _scope = top.enter(&child);
}

struct CountingLoader;

impl ModuleLoader for CountingLoader {
    fn load(&self, specifier: &str, _: Option<&str>) -> VmResult<ModuleHandle> {
        Err(VmError::type_error(format!("Cannot find module '{specifier}'")))
    }
}

#[test]
fn test_module_loader_created_once() {
    const THREADS: usize = 8;
    let config = engine(EngineOptions {
        multi_context: true,
        ..Default::default()
    });
    let realm = top_level(&config);
    let created = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let realm = realm.clone();
            let created = created.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                realm.get_or_create_module_loader(|| {
                    created.fetch_add(1, Ordering::SeqCst);
                    Arc::new(CountingLoader)
                })
            })
        })
        .collect();
    let loaders: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert!(loaders.iter().all(|l| Arc::ptr_eq(l, &loaders[0])));
}

#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_print_and_console_use_host_sinks() {
    let out = Buffer::default();
    let err = Buffer::default();
    let host = HostEnvironment::builder()
        .stdout(sink(out.clone()))
        .stderr(sink(err.clone()))
        .build();
    let config = EngineConfig::builder().host(host).build().unwrap();
    let realm = top_level(&config);
    let global = realm.global_object().unwrap();

    let print = global.get(&"print".into()).unwrap();
    print
        .as_object()
        .unwrap()
        .call(&Value::undefined(), &[Value::str("hello"), Value::int32(42)])
        .unwrap();
    let console = global.get(&"console".into()).unwrap();
    let error = console.as_object().unwrap().get(&"error".into()).unwrap();
    error.as_object().unwrap().call(&Value::undefined(), &[Value::str("oops")]).unwrap();

    assert_eq!(String::from_utf8(out.0.lock().unwrap().clone()).unwrap(), "hello 42\n");
    assert_eq!(String::from_utf8(err.0.lock().unwrap().clone()).unwrap(), "oops\n");
}

#[test]
fn test_shell_arguments() {
    let host = HostEnvironment::builder().arguments(["a.js", "--flag"]).build();
    let config = EngineConfig::builder()
        .options(EngineOptions {
            shell: true,
            ..Default::default()
        })
        .host(host)
        .build()
        .unwrap();
    let realm = top_level(&config);
    assert_eq!(realm.arguments(), vec!["a.js".to_string(), "--flag".to_string()]);
    let args = realm.global_object().unwrap().get(&"arguments".into()).unwrap();
    let args = args.as_object().unwrap();
    assert!(args.is_array());
    assert_eq!(args.get(&PropertyKey::index(1)).unwrap().as_string().unwrap().as_str(), "--flag");

    realm.set_arguments(vec!["b.js".into()]);
    assert_eq!(realm.arguments(), vec!["b.js".to_string()]);

    let plain = top_level(&engine(EngineOptions::default()));
    assert!(!global_has(&plain, "arguments"));
}

#[test]
fn test_time_and_zone() {
    let clock = Arc::new(ManualClock::new(86_400_000));
    let host = HostEnvironment::builder()
        .clock(clock.clone())
        .time_zones(Arc::new(FixedTimeZone {
            id: "Asia/Kolkata".into(),
            offset_seconds: 19_800,
        }))
        .build();
    let config = EngineConfig::builder().host(host).build().unwrap();
    let realm = top_level(&config);

    assert_eq!(&*realm.local_time_zone_id(), "Asia/Kolkata");
    assert_eq!(realm.local_tza(0.0), 19_800_000.0);
    assert_eq!(realm.current_time_millis(), 86_400_000.0);
    clock.advance(1_700_000);
    assert_eq!(realm.current_time_millis(), 86_400_001.0);

    realm.set_local_time_zone("UTC");
    assert_eq!(&*realm.local_time_zone_id(), "UTC");
    assert_eq!(realm.local_tza(0.0), 0.0);

    let r = realm.random();
    assert!((0.0..1.0).contains(&r));
}

#[test]
fn test_string_length_limit() {
    let config = engine(EngineOptions {
        string_length_limit: 16,
        ..Default::default()
    });
    assert!(config.check_string_length(16).is_ok());
    assert!(config.check_string_length(17).unwrap_err().is_range_error());
}

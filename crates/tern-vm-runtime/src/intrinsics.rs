//! Realm intrinsics and their bootstrap.
//!
//! Bootstrap runs in explicit stages so the dependency order is visible:
//! `Object.prototype` must exist before any function, `Function.prototype`
//! before any constructor, and the global object before anything is
//! installed on it. [`Intrinsics::bootstrap_order`] reports the stages that
//! actually ran.
//!
//! Functions whose behavior is realm-independent come from the engine's
//! template tables and are shared across realms; everything that captures
//! realm state (prototypes, caches, RegExp statics) is created per realm.

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

use tern_vm_core::convert::{
    number_to_bigint, same_value, to_bigint, to_boolean, to_number, to_numeric, to_primitive,
    to_string,
};
use tern_vm_core::object::{NativeFn, PropertyDescriptor};
use tern_vm_core::{
    JsObject, ObjectKind, ObjectRef, PreferredType, PropertyAttributes, PropertyKey, ShapeArena,
    Symbol, Value, VmError, VmResult,
};

use crate::builtins::{BuiltinDescriptor, BuiltinFunctionKey, FunctionTemplate, TemplateKind};
use crate::caches::{DateFormatKind, RealmCaches};
use crate::engine::EngineConfig;
use crate::guards::GuardKind;
use crate::host::HostEnvironment;
use crate::options::EcmaVersion;
use crate::regexp_static::{RegExpStatics, RegexMatch};

/// Bootstrap stages, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// `Object.prototype`
    ObjectPrototype,
    /// `Function.prototype`, `%ThrowTypeError%`, Annex B `__proto__`
    FunctionPrototype,
    /// The global object
    GlobalObject,
    /// `Object`
    ObjectConstructor,
    /// `Function`
    FunctionConstructor,
    /// Array, Boolean, Number, String, RegExp, Date, Math, JSON
    Fundamentals,
    /// Symbol, Map, Set, WeakMap, WeakSet, Proxy, Reflect, Promise
    Es6,
    /// The error constructors
    Errors,
    /// ArrayBuffer, typed arrays, DataView
    Binary,
    /// Option- and edition-gated intrinsics
    Optional,
    /// Value properties and host functions on the global object
    Globals,
}

/// Everything a realm's bootstrap reads
pub struct BootstrapContext<'a> {
    /// Engine configuration
    pub config: &'a Arc<EngineConfig>,
    /// Host bindings
    pub host: &'a Arc<HostEnvironment>,
    /// The realm's RegExp statics
    pub statics: &'a Arc<RegExpStatics>,
    /// The realm's caches
    pub caches: &'a Arc<RealmCaches>,
}

/// A realm's intrinsic objects
pub struct Intrinsics {
    object_prototype: ObjectRef,
    function_prototype: ObjectRef,
    throw_type_error: ObjectRef,
    global: ObjectRef,
    named: IndexMap<&'static str, ObjectRef>,
    order: Vec<Stage>,
}

const TYPED_ARRAYS: [&str; 9] = [
    "Int8Array",
    "Uint8Array",
    "Uint8ClampedArray",
    "Int16Array",
    "Uint16Array",
    "Int32Array",
    "Uint32Array",
    "Float32Array",
    "Float64Array",
];

const NATIVE_ERRORS: [&str; 6] = [
    "RangeError",
    "TypeError",
    "SyntaxError",
    "EvalError",
    "ReferenceError",
    "URIError",
];

/// Legacy RegExp static getters
#[derive(Clone, Copy)]
enum StaticAccessor {
    Dollar(usize),
    LastMatch,
    LastParen,
    LeftContext,
    RightContext,
}

impl StaticAccessor {
    fn key(self) -> BuiltinFunctionKey {
        match self {
            Self::Dollar(n) => {
                BuiltinFunctionKey::regexp_dollar(n).unwrap_or(BuiltinFunctionKey::RegExpDollar1)
            }
            Self::LastMatch => BuiltinFunctionKey::RegExpLastMatch,
            Self::LastParen => BuiltinFunctionKey::RegExpLastParen,
            Self::LeftContext => BuiltinFunctionKey::RegExpLeftContext,
            Self::RightContext => BuiltinFunctionKey::RegExpRightContext,
        }
    }

    fn read(self, m: &RegexMatch) -> &str {
        match self {
            Self::Dollar(n) => m.dollar(n),
            Self::LastMatch => m.last_match(),
            Self::LastParen => m.last_paren(),
            Self::LeftContext => m.left_context(),
            Self::RightContext => m.right_context(),
        }
    }
}

struct Builder<'a> {
    ctx: &'a BootstrapContext<'a>,
    arena: Arc<ShapeArena>,
    named: IndexMap<&'static str, ObjectRef>,
    order: Vec<Stage>,
}

impl<'a> Builder<'a> {
    fn enter(&mut self, stage: Stage) {
        tracing::trace!(target: "tern::realm", ?stage, "bootstrap stage");
        self.order.push(stage);
    }

    fn config(&self) -> &EngineConfig {
        self.ctx.config
    }

    fn object(&self, prototype: &ObjectRef) -> ObjectRef {
        JsObject::ordinary(&self.arena, Some(prototype.clone()))
    }

    fn function(
        &self,
        function_prototype: &ObjectRef,
        name: &str,
        length: u32,
        behavior: NativeFn,
    ) -> ObjectRef {
        let proto = Some(function_prototype.clone());
        JsObject::native_function(&self.arena, proto, name, length, behavior)
    }

    fn define_method(target: &ObjectRef, name: &str, function: ObjectRef) {
        target.define_data(
            PropertyKey::string(name),
            Value::object(function),
            PropertyAttributes::builtin(),
        );
    }

    /// Define a realm-independent method from the engine's descriptor templates
    fn shared_method(
        &self,
        function_prototype: &ObjectRef,
        target: &ObjectRef,
        container: &'static str,
        name: &'static str,
        length: u32,
        behavior: fn(&Value, &[Value]) -> VmResult<Value>,
    ) {
        let template = self
            .config()
            .get_or_create_descriptor_template(BuiltinDescriptor::new(container, name), |_| {
                FunctionTemplate::named(name, length, TemplateKind::Normal, Arc::new(behavior))
            });
        Self::define_method(target, name, template.instantiate(&self.arena, function_prototype));
    }

    fn accessor(
        &self,
        target: &ObjectRef,
        name: &str,
        get: Option<ObjectRef>,
        set: Option<ObjectRef>,
    ) {
        target.define_own_property(
            PropertyKey::string(name),
            PropertyDescriptor::accessor(get, set, PropertyAttributes::configurable_only()),
        );
    }

    fn register(&mut self, name: &'static str, object: &ObjectRef) {
        self.named.insert(name, object.clone());
    }

    /// Install a constructor/prototype pair on the global object.
    ///
    /// Calling the constructor allocates an object of the kind `make_kind`
    /// returns, inheriting from the new prototype.
    fn constructor(
        &mut self,
        global: &ObjectRef,
        function_prototype: &ObjectRef,
        parent_prototype: &ObjectRef,
        name: &'static str,
        length: u32,
        make_kind: fn() -> ObjectKind,
    ) -> (ObjectRef, ObjectRef) {
        let prototype = self.object(parent_prototype);
        let behavior = self.allocating(&prototype, make_kind);
        self.constructor_with(global, function_prototype, prototype, name, length, behavior)
    }

    fn constructor_with(
        &mut self,
        global: &ObjectRef,
        function_prototype: &ObjectRef,
        prototype: ObjectRef,
        name: &'static str,
        length: u32,
        behavior: NativeFn,
    ) -> (ObjectRef, ObjectRef) {
        let ctor =
            self.intrinsic_constructor(function_prototype, &prototype, name, length, behavior);
        Self::define_method(global, name, ctor.clone());
        (ctor, prototype)
    }

    /// A constructor linked to `prototype` but not bound on the global object
    fn intrinsic_constructor(
        &mut self,
        function_prototype: &ObjectRef,
        prototype: &ObjectRef,
        name: &'static str,
        length: u32,
        behavior: NativeFn,
    ) -> ObjectRef {
        let proto = Some(function_prototype.clone());
        let ctor = JsObject::native_constructor(&self.arena, proto, name, length, behavior);
        link_constructor(&ctor, prototype);
        self.register(name, &ctor);
        ctor
    }

    fn allocating(&self, prototype: &ObjectRef, make_kind: fn() -> ObjectKind) -> NativeFn {
        let arena = self.arena.clone();
        let prototype = prototype.clone();
        Arc::new(move |_: &Value, _: &[Value]| {
            let obj = JsObject::new(&arena, Some(prototype.clone()), make_kind());
            Ok(Value::object(obj))
        })
    }

    fn namespace(
        &mut self,
        global: &ObjectRef,
        object_prototype: &ObjectRef,
        name: &'static str,
    ) -> ObjectRef {
        let ns = self.object(object_prototype);
        ns.define_data(
            PropertyKey::symbol(tern_vm_core::value::well_known::to_string_tag()),
            Value::str(name),
            PropertyAttributes::configurable_only(),
        );
        Self::define_method(global, name, ns.clone());
        self.register(name, &ns);
        ns
    }
}

fn link_constructor(ctor: &ObjectRef, prototype: &ObjectRef) {
    ctor.define_data(
        PropertyKey::string("prototype"),
        Value::object(prototype.clone()),
        PropertyAttributes::frozen(),
    );
    prototype.define_data(
        PropertyKey::string("constructor"),
        Value::object(ctor.clone()),
        PropertyAttributes::builtin(),
    );
}

fn first_arg(args: &[Value]) -> Value {
    args.first().cloned().unwrap_or_default()
}

fn throw_type_error(_: &Value, _: &[Value]) -> VmResult<Value> {
    Err(VmError::type_error(concat!(
        "'caller', 'callee', and 'arguments' properties may not be accessed on strict mode ",
        "functions or the arguments objects for calls to them",
    )))
}

fn proto_getter(this: &Value, _: &[Value]) -> VmResult<Value> {
    match this {
        Value::Object(obj) => Ok(obj.prototype().map(Value::Object).unwrap_or(Value::Null)),
        v if v.is_nullish() => Err(VmError::type_error(
            "Object.prototype.__proto__ called on null or undefined",
        )),
        _ => Ok(Value::Undefined),
    }
}

fn proto_setter(this: &Value, args: &[Value]) -> VmResult<Value> {
    if this.is_nullish() {
        return Err(VmError::type_error(
            "Object.prototype.__proto__ called on null or undefined",
        ));
    }
    let Value::Object(obj) = this else {
        return Ok(Value::Undefined);
    };
    let accepted = match first_arg(args) {
        Value::Object(proto) => obj.set_prototype(Some(proto)),
        Value::Null => obj.set_prototype(None),
        _ => return Ok(Value::Undefined),
    };
    if !accepted {
        let message = if obj.is_extensible() {
            "Cyclic __proto__ value"
        } else {
            "Object.prototype.__proto__ called on non-extensible object"
        };
        return Err(VmError::type_error(message));
    }
    Ok(Value::Undefined)
}

fn math_unary(args: &[Value], op: fn(f64) -> f64) -> VmResult<Value> {
    Ok(Value::number(op(to_number(&first_arg(args))?)))
}

fn math_abs(_: &Value, args: &[Value]) -> VmResult<Value> {
    math_unary(args, f64::abs)
}

fn math_floor(_: &Value, args: &[Value]) -> VmResult<Value> {
    math_unary(args, f64::floor)
}

fn math_ceil(_: &Value, args: &[Value]) -> VmResult<Value> {
    math_unary(args, f64::ceil)
}

fn math_trunc(_: &Value, args: &[Value]) -> VmResult<Value> {
    math_unary(args, f64::trunc)
}

fn math_max(_: &Value, args: &[Value]) -> VmResult<Value> {
    let mut result = f64::NEG_INFINITY;
    for arg in args {
        let n = to_number(arg)?;
        if n.is_nan() || result.is_nan() {
            result = f64::NAN;
        } else if n > result || (n == 0.0 && result == 0.0 && result.is_sign_negative()) {
            result = n;
        }
    }
    Ok(Value::number(result))
}

fn math_min(_: &Value, args: &[Value]) -> VmResult<Value> {
    let mut result = f64::INFINITY;
    for arg in args {
        let n = to_number(arg)?;
        if n.is_nan() || result.is_nan() {
            result = f64::NAN;
        } else if n < result || (n == 0.0 && result == 0.0 && n.is_sign_negative()) {
            result = n;
        }
    }
    Ok(Value::number(result))
}

fn object_is(_: &Value, args: &[Value]) -> VmResult<Value> {
    let a = first_arg(args);
    let b = args.get(1).cloned().unwrap_or_default();
    Ok(Value::boolean(same_value(&a, &b)))
}

fn bigint_call(_: &Value, args: &[Value]) -> VmResult<Value> {
    match to_primitive(&first_arg(args), PreferredType::Number)? {
        Value::Int32(n) => Ok(Value::bigint(n)),
        Value::Number(n) => Ok(Value::bigint(number_to_bigint(n)?)),
        other => Ok(Value::BigInt(to_bigint(&other)?)),
    }
}

fn join_args(args: &[Value]) -> VmResult<String> {
    let mut line = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        line.push_str(to_string(arg)?.as_str());
    }
    Ok(line)
}

fn io_error(e: std::io::Error) -> VmError {
    VmError::internal(format!("write failed: {e}"))
}

impl Intrinsics {
    /// Build every intrinsic of a fresh realm
    pub fn bootstrap(ctx: &BootstrapContext<'_>) -> VmResult<Self> {
        let config = ctx.config;
        let mut b = Builder {
            ctx,
            arena: config.shape_arena().clone(),
            named: IndexMap::new(),
            order: Vec::with_capacity(11),
        };

        b.enter(Stage::ObjectPrototype);
        let object_prototype = JsObject::ordinary(&b.arena, None);
        object_prototype.mark_element_guarded();
        b.register("Object.prototype", &object_prototype);

        b.enter(Stage::FunctionPrototype);
        let function_prototype = b.function(
            &object_prototype,
            "",
            0,
            Arc::new(|_: &Value, _: &[Value]| Ok(Value::Undefined)),
        );
        b.register("Function.prototype", &function_prototype);
        let thrower = config
            .get_or_create_builtin_template(BuiltinFunctionKey::ThrowTypeError, |_| {
                FunctionTemplate::for_key(
                    BuiltinFunctionKey::ThrowTypeError,
                    0,
                    TemplateKind::Normal,
                    Arc::new(throw_type_error),
                )
            })
            .instantiate(&b.arena, &function_prototype);
        thrower.prevent_extensions();
        b.register("%ThrowTypeError%", &thrower);
        if config.annex_b() {
            let get = config
                .get_or_create_builtin_template(BuiltinFunctionKey::ProtoGetter, |_| {
                    FunctionTemplate::for_key(
                        BuiltinFunctionKey::ProtoGetter,
                        0,
                        TemplateKind::Getter,
                        Arc::new(proto_getter),
                    )
                })
                .instantiate(&b.arena, &function_prototype);
            let set = config
                .get_or_create_builtin_template(BuiltinFunctionKey::ProtoSetter, |_| {
                    FunctionTemplate::for_key(
                        BuiltinFunctionKey::ProtoSetter,
                        1,
                        TemplateKind::Setter,
                        Arc::new(proto_setter),
                    )
                })
                .instantiate(&b.arena, &function_prototype);
            b.accessor(&object_prototype, "__proto__", Some(get), Some(set));
        }

        b.enter(Stage::GlobalObject);
        let global = JsObject::new(&b.arena, Some(object_prototype.clone()), ObjectKind::Global);

        b.enter(Stage::ObjectConstructor);
        {
            let arena = b.arena.clone();
            let proto = object_prototype.clone();
            let behavior: NativeFn =
                Arc::new(move |_: &Value, args: &[Value]| match first_arg(args) {
                    Value::Object(obj) => Ok(Value::Object(obj)),
                    v if v.is_nullish() => {
                        Ok(Value::object(JsObject::ordinary(&arena, Some(proto.clone()))))
                    }
                    v => {
                        let kind = ObjectKind::PrimitiveWrapper(v);
                        Ok(Value::object(JsObject::new(&arena, Some(proto.clone()), kind)))
                    }
                });
            let (object_ctor, _) = b.constructor_with(
                &global,
                &function_prototype,
                object_prototype.clone(),
                "Object",
                1,
                behavior,
            );
            b.shared_method(&function_prototype, &object_ctor, "Object", "is", 2, object_is);
        }

        b.enter(Stage::FunctionConstructor);
        b.constructor_with(
            &global,
            &function_prototype,
            function_prototype.clone(),
            "Function",
            1,
            Arc::new(|_: &Value, _: &[Value]| {
                Err(VmError::type_error(concat!(
                    "Function constructor requires a compiler, ",
                    "which this engine core does not provide",
                )))
            }),
        );

        b.enter(Stage::Fundamentals);
        Self::install_fundamentals(&mut b, &global, &object_prototype, &function_prototype);

        if config.is_es6_or_later() {
            b.enter(Stage::Es6);
            Self::install_es6(&mut b, &global, &object_prototype, &function_prototype);
        }

        b.enter(Stage::Errors);
        let (_, error_prototype) =
            b.constructor(&global, &function_prototype, &object_prototype, "Error", 1, || {
                ObjectKind::Error
            });
        for name in NATIVE_ERRORS {
            b.constructor(&global, &function_prototype, &error_prototype, name, 1, || {
                ObjectKind::Error
            });
        }
        if config.is_es2021_or_later() {
            b.constructor(&global, &function_prototype, &error_prototype, "AggregateError", 2, || {
                ObjectKind::Error
            });
        }

        b.enter(Stage::Binary);
        b.constructor(&global, &function_prototype, &object_prototype, "ArrayBuffer", 1, || {
            ObjectKind::Ordinary
        });
        let typed_array_prototype = b.object(&object_prototype);
        let typed_array = b.intrinsic_constructor(
            &function_prototype,
            &typed_array_prototype,
            "%TypedArray%",
            0,
            Arc::new(|_: &Value, _: &[Value]| {
                Err(VmError::type_error("Abstract class TypedArray not directly constructable"))
            }),
        );
        for name in TYPED_ARRAYS {
            b.constructor(&global, &typed_array, &typed_array_prototype, name, 3, || {
                ObjectKind::Ordinary
            });
        }
        b.constructor(&global, &function_prototype, &object_prototype, "DataView", 1, || {
            ObjectKind::Ordinary
        });

        b.enter(Stage::Optional);
        Self::install_optional(&mut b, &global, &object_prototype, &function_prototype)?;

        b.enter(Stage::Globals);
        Self::install_globals(&mut b, &global, &object_prototype, &function_prototype)?;

        tracing::debug!(
            target: "tern::realm",
            intrinsics = b.named.len(),
            stages = b.order.len(),
            "intrinsics bootstrapped"
        );

        Ok(Self {
            object_prototype,
            function_prototype,
            throw_type_error: thrower,
            global,
            named: b.named,
            order: b.order,
        })
    }

    fn install_fundamentals(
        b: &mut Builder<'_>,
        global: &ObjectRef,
        object_proto: &ObjectRef,
        function_proto: &ObjectRef,
    ) {
        {
            let arena = b.arena.clone();
            let array_proto = JsObject::array(&b.arena, Some(object_proto.clone()), Vec::new());
            array_proto.mark_element_guarded();
            b.register("Array.prototype", &array_proto);
            let instance_proto = array_proto.clone();
            let behavior: NativeFn = Arc::new(move |_: &Value, args: &[Value]| {
                let elements = args.to_vec();
                Ok(Value::object(JsObject::array(&arena, Some(instance_proto.clone()), elements)))
            });
            b.constructor_with(global, function_proto, array_proto, "Array", 1, behavior);
        }

        let (_, boolean_proto) = b.constructor_with(
            global,
            function_proto,
            JsObject::new(
                &b.arena,
                Some(object_proto.clone()),
                ObjectKind::PrimitiveWrapper(Value::Boolean(false)),
            ),
            "Boolean",
            1,
            Arc::new(|_: &Value, args: &[Value]| Ok(Value::boolean(to_boolean(&first_arg(args))))),
        );
        b.register("Boolean.prototype", &boolean_proto);
        b.constructor_with(
            global,
            function_proto,
            JsObject::new(
                &b.arena,
                Some(object_proto.clone()),
                ObjectKind::PrimitiveWrapper(Value::Int32(0)),
            ),
            "Number",
            1,
            Arc::new(|_: &Value, args: &[Value]| match args.first() {
                Some(v) => Ok(Value::number(to_numeric(v)?.to_number())),
                None => Ok(Value::Int32(0)),
            }),
        );
        b.constructor_with(
            global,
            function_proto,
            JsObject::new(
                &b.arena,
                Some(object_proto.clone()),
                ObjectKind::PrimitiveWrapper(Value::str("")),
            ),
            "String",
            1,
            Arc::new(|_: &Value, args: &[Value]| match args.first() {
                None => Ok(Value::str("")),
                Some(Value::Symbol(sym)) => Ok(Value::str(&sym.descriptive_string())),
                Some(v) => Ok(Value::String(to_string(v)?)),
            }),
        );
        b.constructor(global, function_proto, object_proto, "RegExp", 2, || ObjectKind::Ordinary);

        {
            let caches = b.ctx.caches.clone();
            let config = b.ctx.config.clone();
            let (date_ctor, _) = b.constructor_with(
                global,
                function_proto,
                b.object(object_proto),
                "Date",
                7,
                Arc::new(move |_: &Value, _: &[Value]| {
                    let now = caches.clock.current_time_millis(config.timer_resolution());
                    Ok(Value::str(&caches.format_date(DateFormatKind::Local, now)))
                }),
            );
            let caches = b.ctx.caches.clone();
            let config = b.ctx.config.clone();
            let now = b.function(
                function_proto,
                "now",
                0,
                Arc::new(move |_: &Value, _: &[Value]| {
                    let now = caches.clock.current_time_millis(config.timer_resolution());
                    Ok(Value::number(now))
                }),
            );
            Builder::define_method(&date_ctor, "now", now);
        }

        let math = b.namespace(global, object_proto, "Math");
        b.shared_method(function_proto, &math, "Math", "abs", 1, math_abs);
        b.shared_method(function_proto, &math, "Math", "floor", 1, math_floor);
        b.shared_method(function_proto, &math, "Math", "ceil", 1, math_ceil);
        b.shared_method(function_proto, &math, "Math", "trunc", 1, math_trunc);
        b.shared_method(function_proto, &math, "Math", "max", 2, math_max);
        b.shared_method(function_proto, &math, "Math", "min", 2, math_min);
        {
            let caches = b.ctx.caches.clone();
            let random = b.function(
                function_proto,
                "random",
                0,
                Arc::new(move |_: &Value, _: &[Value]| Ok(Value::number(caches.random.next_f64()))),
            );
            Builder::define_method(&math, "random", random);
        }

        b.namespace(global, object_proto, "JSON");
    }

    fn install_es6(
        b: &mut Builder<'_>,
        global: &ObjectRef,
        object_proto: &ObjectRef,
        function_proto: &ObjectRef,
    ) {
        b.constructor_with(
            global,
            function_proto,
            b.object(object_proto),
            "Symbol",
            0,
            Arc::new(|_: &Value, args: &[Value]| {
                let description = match args.first() {
                    None | Some(Value::Undefined) => None,
                    Some(v) => Some(to_string(v)?.as_str().to_string()),
                };
                Ok(Value::symbol(Symbol::new(description.as_deref())))
            }),
        );
        for name in ["Map", "Set", "WeakMap", "WeakSet", "Promise"] {
            b.constructor(global, function_proto, object_proto, name, 0, || ObjectKind::Ordinary);
        }

        let proxy = b.function(
            function_proto,
            "Proxy",
            2,
            Arc::new(|_: &Value, _: &[Value]| {
                Err(VmError::type_error("Constructor Proxy requires 'new'"))
            }),
        );
        Builder::define_method(global, "Proxy", proxy.clone());
        b.register("Proxy", &proxy);

        b.namespace(global, object_proto, "Reflect");

        let iterator_proto = b.object(object_proto);
        b.register("%IteratorPrototype%", &iterator_proto);
        let array_iterator_proto = b.object(&iterator_proto);
        b.register("%ArrayIteratorPrototype%", &array_iterator_proto);
    }

    fn install_optional(
        b: &mut Builder<'_>,
        global: &ObjectRef,
        object_proto: &ObjectRef,
        function_proto: &ObjectRef,
    ) -> VmResult<()> {
        let config = b.ctx.config.clone();

        if config.bigint() {
            let bigint = b.function(function_proto, "BigInt", 1, Arc::new(bigint_call));
            let prototype = b.object(object_proto);
            link_constructor(&bigint, &prototype);
            Builder::define_method(global, "BigInt", bigint.clone());
            b.register("BigInt", &bigint);
        }

        if config.is_es2019_or_later() {
            if let Some(iterator_proto) = b.named.get("%IteratorPrototype%").cloned() {
                let proto = b.object(&iterator_proto);
                b.register("%RegExpStringIteratorPrototype%", &proto);
            }
        }

        if config.intl_402() {
            b.namespace(global, object_proto, "Intl");
        }

        if config.is_es6_or_later() {
            let generator_function_proto = b.object(function_proto);
            b.register("%GeneratorFunction.prototype%", &generator_function_proto);
        }

        if config.is_es2017_or_later() {
            let async_function_proto = b.object(function_proto);
            b.register("%AsyncFunction.prototype%", &async_function_proto);
        }

        if config.is_at_least(EcmaVersion::ES2018) {
            let async_iterator_proto = b.object(object_proto);
            b.register("%AsyncIteratorPrototype%", &async_iterator_proto);
            let async_generator_function_proto = b.object(function_proto);
            b.register("%AsyncGeneratorFunction.prototype%", &async_generator_function_proto);
        }

        if config.is_es2021_or_later() {
            b.constructor(global, function_proto, object_proto, "WeakRef", 1, || {
                ObjectKind::Ordinary
            });
            b.constructor(global, function_proto, object_proto, "FinalizationRegistry", 1, || {
                ObjectKind::Ordinary
            });
        }

        if config.shared_array_buffer() {
            b.constructor(global, function_proto, object_proto, "SharedArrayBuffer", 1, || {
                ObjectKind::Ordinary
            });
        }
        if config.atomics() {
            b.namespace(global, object_proto, "Atomics");
        }

        if config.options().temporal {
            b.namespace(global, object_proto, "Temporal");
        }

        if config.options().webassembly {
            let Some(backend) = b.ctx.host.wasm_backend() else {
                return Err(VmError::configuration(
                    "WebAssembly is enabled but the host provides no WebAssembly backend",
                ));
            };
            let wasm = b.namespace(global, object_proto, "WebAssembly");
            let backend = backend.clone();
            let validate = b.function(
                function_proto,
                "validate",
                1,
                Arc::new(move |_: &Value, args: &[Value]| {
                    let source = to_string(&first_arg(args))?;
                    Ok(Value::boolean(backend.validate(source.as_str().as_bytes())))
                }),
            );
            Builder::define_method(&wasm, "validate", validate);
        }

        Ok(())
    }

    fn install_globals(
        b: &mut Builder<'_>,
        global: &ObjectRef,
        object_proto: &ObjectRef,
        function_proto: &ObjectRef,
    ) -> VmResult<()> {
        let config = b.ctx.config.clone();
        let host = b.ctx.host.clone();

        global.define_data(
            PropertyKey::string("NaN"),
            Value::number(f64::NAN),
            PropertyAttributes::frozen(),
        );
        global.define_data(
            PropertyKey::string("Infinity"),
            Value::number(f64::INFINITY),
            PropertyAttributes::frozen(),
        );
        global.define_data(
            PropertyKey::string("undefined"),
            Value::Undefined,
            PropertyAttributes::frozen(),
        );
        if config.is_es2019_or_later() {
            global.define_data(
                PropertyKey::string("globalThis"),
                Value::object(global.clone()),
                PropertyAttributes::builtin(),
            );
        }
        if config.options().global_property {
            global.define_data(
                PropertyKey::string("global"),
                Value::object(global.clone()),
                PropertyAttributes::builtin(),
            );
        }

        if config.options().print {
            let out = host.clone();
            let print = b.function(
                function_proto,
                "print",
                1,
                Arc::new(move |_: &Value, args: &[Value]| {
                    out.print_line(&join_args(args)?).map_err(io_error)?;
                    Ok(Value::Undefined)
                }),
            );
            Builder::define_method(global, "print", print);
        }

        if config.options().console {
            let console = b.namespace(global, object_proto, "console");
            let methods = [("log", false), ("info", false), ("warn", true), ("error", true)];
            for (name, to_err) in methods {
                let host = host.clone();
                let f = b.function(
                    function_proto,
                    name,
                    0,
                    Arc::new(move |_: &Value, args: &[Value]| {
                        let line = join_args(args)?;
                        let written = if to_err {
                            host.print_error_line(&line)
                        } else {
                            host.print_line(&line)
                        };
                        written.map_err(io_error)?;
                        Ok(Value::Undefined)
                    }),
                );
                Builder::define_method(&console, name, f);
            }
        }

        if config.options().performance {
            let performance = b.namespace(global, object_proto, "performance");
            let caches = b.ctx.caches.clone();
            let config = config.clone();
            let now = b.function(
                function_proto,
                "now",
                0,
                Arc::new(move |_: &Value, _: &[Value]| {
                    let now = caches.clock.performance_now(config.timer_resolution());
                    Ok(Value::number(now))
                }),
            );
            Builder::define_method(&performance, "now", now);
        }

        if config.regexp_static_result() {
            if let Some(regexp) = b.named.get("RegExp").cloned() {
                Self::install_regexp_statics(b, &regexp, function_proto);
            }
        }

        Ok(())
    }

    /// `RegExp.$1`..`$9`, `RegExp.input` and friends
    fn install_regexp_statics(b: &mut Builder<'_>, regexp: &ObjectRef, function_proto: &ObjectRef) {
        let getter = |b: &Builder<'_>, accessor: StaticAccessor| {
            let statics = b.ctx.statics.clone();
            let config = b.ctx.config.clone();
            let engine = b.ctx.host.regex_engine().cloned();
            let behavior: NativeFn = Arc::new(move |_: &Value, _: &[Value]| {
                let guard = config.guard(GuardKind::RegExpStaticResultUnused);
                let result = statics.get(guard, engine.as_deref())?;
                Ok(Value::str(accessor.read(&result)))
            });
            FunctionTemplate::for_key(accessor.key(), 0, TemplateKind::Getter, behavior)
                .instantiate(&b.arena, function_proto)
        };

        for n in 1..=9 {
            let accessor = StaticAccessor::Dollar(n);
            let get = getter(b, accessor);
            b.accessor(regexp, accessor.key().function_name(), Some(get), None);
        }
        // Nashorn exposes `multiline` and none of the `$` aliases.
        let nashorn = b.config().nashorn_compat();
        for (accessor, alias) in [
            (StaticAccessor::LastMatch, "$&"),
            (StaticAccessor::LastParen, "$+"),
            (StaticAccessor::LeftContext, "$`"),
            (StaticAccessor::RightContext, "$'"),
        ] {
            let get = getter(b, accessor);
            b.accessor(regexp, accessor.key().function_name(), Some(get.clone()), None);
            if !nashorn {
                b.accessor(regexp, alias, Some(get), None);
            }
        }
        if nashorn {
            let statics = b.ctx.statics.clone();
            let get_multiline = FunctionTemplate::for_key(
                BuiltinFunctionKey::RegExpMultiLine,
                0,
                TemplateKind::Getter,
                Arc::new(move |_: &Value, _: &[Value]| Ok(Value::Boolean(statics.multiline()))),
            )
            .instantiate(&b.arena, function_proto);
            b.accessor(regexp, "multiline", Some(get_multiline), None);
        }

        let statics = b.ctx.statics.clone();
        let get_input = FunctionTemplate::for_key(
            BuiltinFunctionKey::RegExpInput,
            0,
            TemplateKind::Getter,
            Arc::new(move |_: &Value, _: &[Value]| Ok(Value::str(&statics.input()))),
        )
        .instantiate(&b.arena, function_proto);
        let statics = b.ctx.statics.clone();
        let set_input = FunctionTemplate::for_key(
            BuiltinFunctionKey::RegExpInputSetter,
            1,
            TemplateKind::Setter,
            Arc::new(move |_: &Value, args: &[Value]| {
                let input = to_string(&first_arg(args))?;
                statics.set_input(Arc::from(input.as_str()));
                Ok(Value::Undefined)
            }),
        )
        .instantiate(&b.arena, function_proto);
        b.accessor(regexp, "input", Some(get_input.clone()), Some(set_input.clone()));
        if !nashorn {
            b.accessor(regexp, "$_", Some(get_input), Some(set_input));
        }
    }

    /// Stages that ran, in order
    pub fn bootstrap_order(&self) -> &[Stage] {
        &self.order
    }

    /// `%Object.prototype%`
    pub fn object_prototype(&self) -> &ObjectRef {
        &self.object_prototype
    }

    /// `%Function.prototype%`
    pub fn function_prototype(&self) -> &ObjectRef {
        &self.function_prototype
    }

    /// `%ThrowTypeError%`
    pub fn throw_type_error(&self) -> &ObjectRef {
        &self.throw_type_error
    }

    /// The global object created during bootstrap
    pub fn global(&self) -> &ObjectRef {
        &self.global
    }

    /// Intrinsic by name, e.g. `"Array"` or `"%IteratorPrototype%"`
    pub fn get(&self, name: &str) -> Option<&ObjectRef> {
        self.named.get(name)
    }

    /// Names of every registered intrinsic, in creation order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.named.keys().copied()
    }
}

impl fmt::Debug for Intrinsics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Intrinsics")
            .field("order", &self.order)
            .field("named", &self.named.len())
            .finish()
    }
}

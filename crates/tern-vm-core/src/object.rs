//! JavaScript objects backed by arena shapes
//!
//! Objects start in shaped mode: the property layout lives in a `ShapeArena`
//! node and the object only carries the slot values. Deleting a property or
//! changing the attributes of an existing one moves the object into
//! dictionary mode, where it owns an insertion-ordered map instead.
//!
//! No lock is held across a call into user code (getters, setters, native
//! functions). Every lookup re-reads the storage, so a call-out may freely
//! mutate the object it was invoked on.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{VmError, VmResult};
use crate::number::array_index_of_str;
use crate::shape::{ShapeArena, ShapeId};
use crate::string::{JsString, well_known as strings};
use crate::value::{Symbol, Value};

/// Shared reference to an object
pub type ObjectRef = Arc<JsObject>;

/// Native function behavior: `(this, arguments) -> result`
pub type NativeFn = Arc<dyn Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync>;

/// Structural changes reported by every object of a [`ShapeArena`].
///
/// Both hooks run before the change is visible. `entered_dictionary_mode`
/// runs with the object's storage locked, so implementations must not read
/// or write the object's properties.
pub trait ObjectObserver: Send + Sync {
    /// `obj` is about to gain the own property `key`
    fn property_added(&self, obj: &JsObject, key: &PropertyKey);

    /// `obj` is leaving shaped storage
    fn entered_dictionary_mode(&self, obj: &JsObject);
}

/// Property key (string, symbol or array index)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String property key (never a canonical array index)
    String(Arc<JsString>),
    /// Symbol property key
    Symbol(Arc<Symbol>),
    /// Array index in `[0, 2^32 - 2]`
    Index(u32),
}

impl PropertyKey {
    /// Create a string property key, normalizing canonical array indices
    pub fn string(s: &str) -> Self {
        match array_index_of_str(s) {
            Some(i) => Self::Index(i),
            None => Self::String(JsString::intern(s)),
        }
    }

    /// Create from a string Arc, normalizing canonical array indices
    pub fn from_js_string(s: Arc<JsString>) -> Self {
        match array_index_of_str(s.as_str()) {
            Some(i) => Self::Index(i),
            None => Self::String(s),
        }
    }

    /// Create an index property key. `2^32 - 1` is not an index and becomes
    /// a string key.
    pub fn index(i: u32) -> Self {
        if i == u32::MAX {
            Self::String(JsString::intern("4294967295"))
        } else {
            Self::Index(i)
        }
    }

    /// Create a symbol property key
    pub fn symbol(sym: Arc<Symbol>) -> Self {
        Self::Symbol(sym)
    }

    /// Is this an array index
    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index(_))
    }

    /// Is this a symbol
    pub fn is_symbol(&self) -> bool {
        matches!(self, Self::Symbol(_))
    }

    /// Index payload
    pub fn as_index(&self) -> Option<u32> {
        match self {
            Self::Index(i) => Some(*i),
            _ => None,
        }
    }

    /// The key as a language value (indices become numbers)
    pub fn to_value(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Symbol(s) => Value::Symbol(s.clone()),
            Self::Index(i) => Value::number(*i as f64),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        Self::index(i)
    }
}

impl From<Arc<Symbol>> for PropertyKey {
    fn from(sym: Arc<Symbol>) -> Self {
        Self::Symbol(sym)
    }
}

impl std::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => f.write_str(s.as_str()),
            Self::Symbol(s) => f.write_str(&s.descriptive_string()),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Property attributes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PropertyAttributes {
    /// Property is writable
    pub writable: bool,
    /// Property is enumerable
    pub enumerable: bool,
    /// Property is configurable
    pub configurable: bool,
}

impl PropertyAttributes {
    /// Default data property attributes
    pub const fn data() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Non-writable, non-enumerable, non-configurable
    pub const fn frozen() -> Self {
        Self {
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }

    /// Writable and configurable but not enumerable (builtin methods)
    pub const fn builtin() -> Self {
        Self {
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }

    /// Configurable only (function `name`/`length`)
    pub const fn configurable_only() -> Self {
        Self {
            writable: false,
            enumerable: false,
            configurable: true,
        }
    }
}

/// Property descriptor
#[derive(Clone, Debug)]
pub enum PropertyDescriptor {
    /// Data property
    Data {
        /// The value
        value: Value,
        /// Attributes
        attributes: PropertyAttributes,
    },
    /// Accessor property
    Accessor {
        /// Getter function
        get: Option<ObjectRef>,
        /// Setter function
        set: Option<ObjectRef>,
        /// Attributes (`writable` is ignored)
        attributes: PropertyAttributes,
    },
}

impl PropertyDescriptor {
    /// Create a data property
    pub fn data(value: Value) -> Self {
        Self::Data {
            value,
            attributes: PropertyAttributes::data(),
        }
    }

    /// Create a data property with specific attributes
    pub fn data_with_attrs(value: Value, attributes: PropertyAttributes) -> Self {
        Self::Data { value, attributes }
    }

    /// Create an accessor property
    pub fn accessor(
        get: Option<ObjectRef>,
        set: Option<ObjectRef>,
        attributes: PropertyAttributes,
    ) -> Self {
        Self::Accessor {
            get,
            set,
            attributes: PropertyAttributes {
                writable: false,
                ..attributes
            },
        }
    }

    /// Get the value (for data properties)
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Data { value, .. } => Some(value),
            Self::Accessor { .. } => None,
        }
    }

    /// Attributes of either kind
    pub fn attributes(&self) -> PropertyAttributes {
        match self {
            Self::Data { attributes, .. } | Self::Accessor { attributes, .. } => *attributes,
        }
    }

    /// Check if writable
    pub fn is_writable(&self) -> bool {
        match self {
            Self::Data { attributes, .. } => attributes.writable,
            Self::Accessor { .. } => false,
        }
    }

    /// Check if this is an accessor property
    pub fn is_accessor(&self) -> bool {
        matches!(self, Self::Accessor { .. })
    }
}

/// Native function payload
pub struct FunctionData {
    /// Function name
    pub name: Arc<JsString>,
    /// Declared parameter count
    pub length: u32,
    /// Behavior
    pub behavior: NativeFn,
    /// Whether `new` may be applied
    pub constructor: bool,
}

/// Bound function payload
pub struct BoundFunctionData {
    /// Target function
    pub target: ObjectRef,
    /// Bound `this`
    pub bound_this: Value,
    /// Bound leading arguments
    pub bound_args: Vec<Value>,
}

/// Proxy payload. Both slots become `None` on revocation.
pub struct ProxyData {
    target: RwLock<Option<ObjectRef>>,
    handler: RwLock<Option<ObjectRef>>,
}

impl ProxyData {
    /// Target, or a `TypeError` naming `operation` if revoked
    pub fn target(&self, operation: &str) -> VmResult<ObjectRef> {
        self.target.read().clone().ok_or_else(|| {
            VmError::type_error(format!(
                "Cannot perform '{operation}' on a proxy that has been revoked"
            ))
        })
    }

    /// Handler, if not revoked
    pub fn handler(&self) -> Option<ObjectRef> {
        self.handler.read().clone()
    }

    /// Whether the proxy was revoked
    pub fn is_revoked(&self) -> bool {
        self.target.read().is_none()
    }
}

/// What kind of object this is
pub enum ObjectKind {
    /// Ordinary object
    Ordinary,
    /// Array exotic object
    Array,
    /// Native function
    Function(FunctionData),
    /// Bound function
    BoundFunction(BoundFunctionData),
    /// Proxy exotic object
    Proxy(ProxyData),
    /// Error instance
    Error,
    /// Boolean/Number/String/Symbol/BigInt wrapper
    PrimitiveWrapper(Value),
    /// Global object
    Global,
    /// Arguments object
    Arguments,
}

impl ObjectKind {
    /// Root shape tag for objects of this kind
    pub fn root_tag(&self) -> &'static str {
        match self {
            Self::Ordinary => "Object",
            Self::Array => "Array",
            Self::Function(_) | Self::BoundFunction(_) => "Function",
            Self::Proxy(_) => "Proxy",
            Self::Error => "Error",
            Self::PrimitiveWrapper(_) => "Wrapper",
            Self::Global => "Global",
            Self::Arguments => "Arguments",
        }
    }
}

enum PropertyStorage {
    Shaped {
        shape: ShapeId,
        slots: Vec<PropertyDescriptor>,
    },
    Dictionary(IndexMap<PropertyKey, PropertyDescriptor>),
}

/// A JavaScript object
///
/// Thread-safe with interior mutability.
pub struct JsObject {
    arena: Arc<ShapeArena>,
    kind: ObjectKind,
    prototype: RwLock<Option<ObjectRef>>,
    storage: RwLock<PropertyStorage>,
    extensible: AtomicBool,
    element_guarded: AtomicBool,
}

impl JsObject {
    /// Allocate an object of `kind` on the root shape for that kind
    pub fn new(
        arena: &Arc<ShapeArena>,
        prototype: Option<ObjectRef>,
        kind: ObjectKind,
    ) -> ObjectRef {
        let shape = arena.allocate_empty_shape(kind.root_tag());
        Self::with_shape(arena, shape, prototype, kind)
    }

    /// Allocate an object on an explicit (empty) shape
    pub fn with_shape(
        arena: &Arc<ShapeArena>,
        shape: ShapeId,
        prototype: Option<ObjectRef>,
        kind: ObjectKind,
    ) -> ObjectRef {
        let node = arena.node(shape);
        if node.property_count() != 0 {
            crate::invariant_violation!("objects must be allocated on an empty shape");
        }
        Arc::new(Self {
            arena: arena.clone(),
            kind,
            prototype: RwLock::new(prototype),
            storage: RwLock::new(PropertyStorage::Shaped {
                shape,
                slots: Vec::new(),
            }),
            extensible: AtomicBool::new(true),
            element_guarded: AtomicBool::new(false),
        })
    }

    /// Allocate an ordinary object
    pub fn ordinary(arena: &Arc<ShapeArena>, prototype: Option<ObjectRef>) -> ObjectRef {
        Self::new(arena, prototype, ObjectKind::Ordinary)
    }

    /// Allocate a native function with `name` and `length` properties
    pub fn native_function(
        arena: &Arc<ShapeArena>,
        prototype: Option<ObjectRef>,
        name: &str,
        length: u32,
        behavior: NativeFn,
    ) -> ObjectRef {
        Self::function_object(arena, prototype, name, length, behavior, false)
    }

    /// Allocate a native constructor
    pub fn native_constructor(
        arena: &Arc<ShapeArena>,
        prototype: Option<ObjectRef>,
        name: &str,
        length: u32,
        behavior: NativeFn,
    ) -> ObjectRef {
        Self::function_object(arena, prototype, name, length, behavior, true)
    }

    fn function_object(
        arena: &Arc<ShapeArena>,
        prototype: Option<ObjectRef>,
        name: &str,
        length: u32,
        behavior: NativeFn,
        constructor: bool,
    ) -> ObjectRef {
        let name = JsString::intern(name);
        let obj = Self::new(
            arena,
            prototype,
            ObjectKind::Function(FunctionData {
                name: name.clone(),
                length,
                behavior,
                constructor,
            }),
        );
        obj.define_data(
            PropertyKey::String(strings::LENGTH.clone()),
            Value::number(length as f64),
            PropertyAttributes::configurable_only(),
        );
        obj.define_data(
            PropertyKey::String(strings::NAME.clone()),
            Value::String(name),
            PropertyAttributes::configurable_only(),
        );
        obj
    }

    /// Allocate an array holding `elements`
    pub fn array(
        arena: &Arc<ShapeArena>,
        prototype: Option<ObjectRef>,
        elements: Vec<Value>,
    ) -> ObjectRef {
        let obj = Self::new(arena, prototype, ObjectKind::Array);
        obj.define_data(
            PropertyKey::String(strings::LENGTH.clone()),
            Value::number(elements.len() as f64),
            PropertyAttributes {
                writable: true,
                enumerable: false,
                configurable: false,
            },
        );
        for (i, value) in elements.into_iter().enumerate() {
            obj.define_data(PropertyKey::index(i as u32), value, PropertyAttributes::data());
        }
        obj
    }

    /// Allocate a proxy for `target` with `handler`
    pub fn proxy(arena: &Arc<ShapeArena>, target: ObjectRef, handler: ObjectRef) -> ObjectRef {
        Self::new(
            arena,
            None,
            ObjectKind::Proxy(ProxyData {
                target: RwLock::new(Some(target)),
                handler: RwLock::new(Some(handler)),
            }),
        )
    }

    /// Allocate a bound function
    pub fn bound_function(
        arena: &Arc<ShapeArena>,
        prototype: Option<ObjectRef>,
        target: ObjectRef,
        bound_this: Value,
        bound_args: Vec<Value>,
    ) -> ObjectRef {
        Self::new(
            arena,
            prototype,
            ObjectKind::BoundFunction(BoundFunctionData {
                target,
                bound_this,
                bound_args,
            }),
        )
    }

    /// The arena this object's shapes live in
    pub fn arena(&self) -> &Arc<ShapeArena> {
        &self.arena
    }

    /// Object kind
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// `[[Prototype]]`
    pub fn prototype(&self) -> Option<ObjectRef> {
        self.prototype.read().clone()
    }

    /// `[[SetPrototypeOf]]`. Returns `false` when the object is not
    /// extensible or when `prototype` would close a cycle.
    ///
    /// A proxy on the new chain is followed to its target, the object its
    /// lookups forward to.
    pub fn set_prototype(&self, prototype: Option<ObjectRef>) -> bool {
        let current = self.prototype();
        let unchanged = match (&current, &prototype) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return true;
        }
        if !self.is_extensible() {
            return false;
        }
        let mut p = prototype.clone();
        while let Some(obj) = p {
            if std::ptr::eq(Arc::as_ptr(&obj), self) {
                return false;
            }
            p = match obj.as_proxy() {
                Some(proxy) => proxy.target.read().clone(),
                None => obj.prototype(),
            };
        }
        *self.prototype.write() = prototype;
        true
    }

    /// `[[IsExtensible]]`
    pub fn is_extensible(&self) -> bool {
        self.extensible.load(Ordering::Acquire)
    }

    /// `[[PreventExtensions]]`
    pub fn prevent_extensions(&self) {
        self.extensible.store(false, Ordering::Release);
    }

    /// Mark this object as one whose indexed elements the engine
    /// speculates on (`Array.prototype`, `Object.prototype`)
    pub fn mark_element_guarded(&self) {
        self.element_guarded.store(true, Ordering::Release);
    }

    /// See [`mark_element_guarded`](Self::mark_element_guarded)
    pub fn is_element_guarded(&self) -> bool {
        self.element_guarded.load(Ordering::Acquire)
    }

    /// Current shape, `None` in dictionary mode
    pub fn shape(&self) -> Option<ShapeId> {
        match &*self.storage.read() {
            PropertyStorage::Shaped { shape, .. } => Some(*shape),
            PropertyStorage::Dictionary(_) => None,
        }
    }

    /// Whether the object left shaped mode
    pub fn is_dictionary_mode(&self) -> bool {
        matches!(&*self.storage.read(), PropertyStorage::Dictionary(_))
    }

    /// Is an Array exotic object (no proxy unwrapping)
    pub fn is_array(&self) -> bool {
        matches!(self.kind, ObjectKind::Array)
    }

    /// Is a proxy
    pub fn is_proxy(&self) -> bool {
        matches!(self.kind, ObjectKind::Proxy(_))
    }

    /// Proxy payload
    pub fn as_proxy(&self) -> Option<&ProxyData> {
        match &self.kind {
            ObjectKind::Proxy(p) => Some(p),
            _ => None,
        }
    }

    /// Revoke a proxy. No-op for other objects.
    pub fn revoke_proxy(&self) {
        if let ObjectKind::Proxy(p) = &self.kind {
            *p.target.write() = None;
            *p.handler.write() = None;
        }
    }

    /// Has a `[[Call]]` internal method
    pub fn is_callable(&self) -> bool {
        match &self.kind {
            ObjectKind::Function(_) | ObjectKind::BoundFunction(_) => true,
            ObjectKind::Proxy(p) => p.target.read().as_ref().is_some_and(|t| t.is_callable()),
            _ => false,
        }
    }

    /// Has a `[[Construct]]` internal method
    pub fn is_constructor(&self) -> bool {
        match &self.kind {
            ObjectKind::Function(f) => f.constructor,
            ObjectKind::BoundFunction(b) => b.target.is_constructor(),
            ObjectKind::Proxy(p) => p
                .target
                .read()
                .as_ref()
                .is_some_and(|t| t.is_constructor()),
            _ => false,
        }
    }

    /// Class name used by display formatting
    pub fn class_name(&self) -> &'static str {
        match &self.kind {
            ObjectKind::Ordinary => "Object",
            ObjectKind::Array => "Array",
            ObjectKind::Function(_) | ObjectKind::BoundFunction(_) => "Function",
            ObjectKind::Proxy(_) => "Proxy",
            ObjectKind::Error => "Error",
            ObjectKind::PrimitiveWrapper(v) => match v {
                Value::Boolean(_) => "Boolean",
                Value::Int32(_) | Value::Number(_) => "Number",
                Value::String(_) => "String",
                Value::Symbol(_) => "Symbol",
                Value::BigInt(_) => "BigInt",
                _ => "Object",
            },
            ObjectKind::Global => "global",
            ObjectKind::Arguments => "Arguments",
        }
    }

    /// Short display form. Never calls user code.
    pub fn describe(&self) -> String {
        match &self.kind {
            ObjectKind::Function(f) => format!("function {}() {{ [native code] }}", f.name),
            _ => format!("[object {}]", self.class_name()),
        }
    }

    // ---- own property access ----

    /// `[[GetOwnProperty]]`
    pub fn get_own_property(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        if let ObjectKind::Proxy(p) = &self.kind {
            return p.target.read().clone()?.get_own_property(key);
        }
        match &*self.storage.read() {
            PropertyStorage::Shaped { shape, slots } => {
                let info = self.arena.lookup(*shape, key)?;
                slots.get(info.slot as usize).cloned()
            }
            PropertyStorage::Dictionary(map) => map.get(key).cloned(),
        }
    }

    /// `[[HasProperty]]` without user call-outs
    pub fn has_own_property(&self, key: &PropertyKey) -> bool {
        self.get_own_property(key).is_some()
    }

    /// `[[HasProperty]]` along the prototype chain
    pub fn has_property(&self, key: &PropertyKey) -> bool {
        if self.has_own_property(key) {
            return true;
        }
        let mut current = self.prototype();
        while let Some(obj) = current {
            if obj.has_own_property(key) {
                return true;
            }
            current = obj.prototype();
        }
        false
    }

    /// Define a data property, ignoring the result of validation
    pub fn define_data(
        &self,
        key: PropertyKey,
        value: Value,
        attributes: PropertyAttributes,
    ) -> bool {
        self.define_own_property(key, PropertyDescriptor::data_with_attrs(value, attributes))
    }

    /// `[[DefineOwnProperty]]` for fully populated descriptors
    pub fn define_own_property(&self, key: PropertyKey, desc: PropertyDescriptor) -> bool {
        if let ObjectKind::Proxy(p) = &self.kind {
            return match p.target.read().clone() {
                Some(target) => target.define_own_property(key, desc),
                None => false,
            };
        }

        let Some(current) = self.get_own_property(&key) else {
            if !self.is_extensible() {
                return false;
            }
            if let Some(observer) = self.arena.observer() {
                observer.property_added(self, &key);
            }
            self.grow_array_length(&key);
            self.insert_new(key, desc);
            return true;
        };

        if !compatible_redefinition(&current, &desc) {
            return false;
        }

        let mut storage = self.storage.write();
        match &mut *storage {
            PropertyStorage::Shaped { shape, slots } => {
                if let Some(info) = self.arena.lookup(*shape, &key) {
                    if info.attributes == desc.attributes() {
                        slots[info.slot as usize] = desc;
                        return true;
                    }
                }
                self.notify_dictionary_mode();
                let mut map = self.to_dictionary(*shape, slots);
                map.insert(key, desc);
                *storage = PropertyStorage::Dictionary(map);
            }
            PropertyStorage::Dictionary(map) => {
                map.insert(key, desc);
            }
        }
        true
    }

    fn insert_new(&self, key: PropertyKey, desc: PropertyDescriptor) {
        let mut storage = self.storage.write();
        match &mut *storage {
            PropertyStorage::Shaped { shape, slots } => {
                // Another writer may have added the key since the caller's check.
                if let Some(info) = self.arena.lookup(*shape, &key) {
                    slots[info.slot as usize] = desc;
                    return;
                }
                *shape = self.arena.transition(*shape, key, desc.attributes());
                slots.push(desc);
            }
            PropertyStorage::Dictionary(map) => {
                map.insert(key, desc);
            }
        }
    }

    fn grow_array_length(&self, key: &PropertyKey) {
        let (ObjectKind::Array, PropertyKey::Index(i)) = (&self.kind, key) else {
            return;
        };
        let length_key = PropertyKey::String(strings::LENGTH.clone());
        if let Some(PropertyDescriptor::Data { value, attributes }) =
            self.get_own_property(&length_key)
        {
            let len = value.as_number().unwrap_or(0.0);
            if (*i as f64) >= len {
                self.write_own_value(&length_key, Value::number(*i as f64 + 1.0), attributes);
            }
        }
    }

    fn write_own_value(&self, key: &PropertyKey, value: Value, attributes: PropertyAttributes) {
        let desc = PropertyDescriptor::data_with_attrs(value, attributes);
        let mut storage = self.storage.write();
        match &mut *storage {
            PropertyStorage::Shaped { shape, slots } => {
                if let Some(info) = self.arena.lookup(*shape, key) {
                    slots[info.slot as usize] = desc;
                }
            }
            PropertyStorage::Dictionary(map) => {
                if let Some(slot) = map.get_mut(key) {
                    *slot = desc;
                }
            }
        }
    }

    fn notify_dictionary_mode(&self) {
        if let Some(observer) = self.arena.observer() {
            observer.entered_dictionary_mode(self);
        }
    }

    fn to_dictionary(
        &self,
        shape: ShapeId,
        slots: &[PropertyDescriptor],
    ) -> IndexMap<PropertyKey, PropertyDescriptor> {
        self.arena
            .own_keys(shape)
            .into_iter()
            .zip(slots.iter().cloned())
            .collect()
    }

    /// `[[Delete]]`
    pub fn delete(&self, key: &PropertyKey) -> bool {
        if let ObjectKind::Proxy(p) = &self.kind {
            return match p.target.read().clone() {
                Some(target) => target.delete(key),
                None => false,
            };
        }
        match self.get_own_property(key) {
            None => return true,
            Some(desc) if !desc.attributes().configurable => return false,
            Some(_) => {}
        }
        let mut storage = self.storage.write();
        let mut map = match &mut *storage {
            PropertyStorage::Shaped { shape, slots } => {
                self.notify_dictionary_mode();
                self.to_dictionary(*shape, slots)
            }
            PropertyStorage::Dictionary(map) => std::mem::take(map),
        };
        map.shift_remove(key);
        *storage = PropertyStorage::Dictionary(map);
        true
    }

    /// `[[OwnPropertyKeys]]` in storage order (not yet enumeration order)
    pub fn own_property_keys(&self) -> Vec<PropertyKey> {
        if let ObjectKind::Proxy(p) = &self.kind {
            return p
                .target
                .read()
                .clone()
                .map(|t| t.own_property_keys())
                .unwrap_or_default();
        }
        match &*self.storage.read() {
            PropertyStorage::Shaped { shape, .. } => self.arena.own_keys(*shape),
            PropertyStorage::Dictionary(map) => map.keys().cloned().collect(),
        }
    }

    // ---- property access with call-outs ----

    /// `[[Get]]` with this object as receiver
    pub fn get(self: &Arc<Self>, key: &PropertyKey) -> VmResult<Value> {
        self.get_with_receiver(key, &Value::Object(self.clone()))
    }

    /// `[[Get]]` with an explicit receiver
    pub fn get_with_receiver(&self, key: &PropertyKey, receiver: &Value) -> VmResult<Value> {
        if let ObjectKind::Proxy(p) = &self.kind {
            return p.target("get")?.get_with_receiver(key, receiver);
        }
        match self.get_own_property(key) {
            Some(PropertyDescriptor::Data { value, .. }) => Ok(value),
            Some(PropertyDescriptor::Accessor { get, .. }) => match get {
                Some(getter) => getter.call(receiver, &[]),
                None => Ok(Value::Undefined),
            },
            None => match self.prototype() {
                Some(proto) => proto.get_with_receiver(key, receiver),
                None => Ok(Value::Undefined),
            },
        }
    }

    /// `[[Set]]` with this object as receiver. Returns `false` when the
    /// assignment was rejected (non-writable, no setter, not extensible).
    pub fn set(self: &Arc<Self>, key: PropertyKey, value: Value) -> VmResult<bool> {
        if let ObjectKind::Proxy(p) = &self.kind {
            return p.target("set")?.set(key, value);
        }
        let receiver = Value::Object(self.clone());
        let mut current = Some(self.clone());
        while let Some(obj) = current {
            let unwrapped = obj.as_proxy().map(|p| p.target("set")).transpose()?;
            let obj = unwrapped.unwrap_or(obj);
            match obj.get_own_property(&key) {
                Some(PropertyDescriptor::Data { attributes, .. }) => {
                    if !attributes.writable {
                        return Ok(false);
                    }
                    break;
                }
                Some(PropertyDescriptor::Accessor { set, .. }) => {
                    return match set {
                        Some(setter) => {
                            setter.call(&receiver, &[value])?;
                            Ok(true)
                        }
                        None => Ok(false),
                    };
                }
                None => current = obj.prototype(),
            }
        }

        match self.get_own_property(&key) {
            Some(PropertyDescriptor::Data { attributes, .. }) => {
                self.write_own_value(&key, value, attributes);
                Ok(true)
            }
            Some(PropertyDescriptor::Accessor { .. }) => Ok(false),
            None => Ok(self.define_data(key, value, PropertyAttributes::data())),
        }
    }

    /// `[[Call]]`
    pub fn call(&self, this: &Value, args: &[Value]) -> VmResult<Value> {
        match &self.kind {
            ObjectKind::Function(f) => (f.behavior)(this, args),
            ObjectKind::BoundFunction(b) => {
                let mut full = b.bound_args.clone();
                full.extend_from_slice(args);
                b.target.call(&b.bound_this, &full)
            }
            ObjectKind::Proxy(p) => p.target("apply")?.call(this, args),
            _ => Err(VmError::type_error(format!(
                "{} is not a function",
                self.describe()
            ))),
        }
    }
}

/// `ValidateAndApplyPropertyDescriptor` restricted to complete descriptors
fn compatible_redefinition(current: &PropertyDescriptor, desc: &PropertyDescriptor) -> bool {
    let cur = current.attributes();
    if cur.configurable {
        return true;
    }
    let new = desc.attributes();
    if new.configurable || new.enumerable != cur.enumerable {
        return false;
    }
    match (current, desc) {
        (
            PropertyDescriptor::Data { value: old, attributes: a },
            PropertyDescriptor::Data { value, attributes: b },
        ) => {
            if a.writable {
                return true;
            }
            !b.writable && crate::convert::same_value(old, value)
        }
        (
            PropertyDescriptor::Accessor { get: g1, set: s1, .. },
            PropertyDescriptor::Accessor { get: g2, set: s2, .. },
        ) => same_function(g1, g2) && same_function(s1, s2),
        _ => false,
    }
}

fn same_function(a: &Option<ObjectRef>, b: &Option<ObjectRef>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl std::fmt::Debug for JsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsObject")
            .field("class", &self.class_name())
            .field("shape", &self.shape())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> Arc<ShapeArena> {
        ShapeArena::new()
    }

    #[test]
    fn test_property_key_normalization() {
        assert_eq!(PropertyKey::from("42"), PropertyKey::Index(42));
        assert!(matches!(PropertyKey::from("042"), PropertyKey::String(_)));
        assert!(matches!(PropertyKey::from(u32::MAX), PropertyKey::String(_)));
        assert!(matches!(PropertyKey::from("4294967295"), PropertyKey::String(_)));
        assert_eq!(PropertyKey::from("4294967294"), PropertyKey::Index(4294967294));
    }

    #[test]
    fn test_objects_share_shapes() {
        let arena = arena();
        let a = JsObject::ordinary(&arena, None);
        let b = JsObject::ordinary(&arena, None);
        a.set(PropertyKey::from("x"), Value::int32(1)).unwrap();
        b.set(PropertyKey::from("x"), Value::int32(2)).unwrap();
        assert_eq!(a.shape(), b.shape());
        assert_eq!(a.get(&PropertyKey::from("x")).unwrap().as_int32(), Some(1));
        assert_eq!(b.get(&PropertyKey::from("x")).unwrap().as_int32(), Some(2));
    }

    #[test]
    fn test_delete_enters_dictionary_mode() {
        let arena = arena();
        let obj = JsObject::ordinary(&arena, None);
        for k in ["a", "b", "c"] {
            obj.set(PropertyKey::from(k), Value::Null).unwrap();
        }
        assert!(obj.delete(&PropertyKey::from("b")));
        assert!(obj.is_dictionary_mode());
        assert_eq!(
            obj.own_property_keys(),
            vec![PropertyKey::from("a"), PropertyKey::from("c")]
        );
    }

    #[test]
    fn test_non_writable_rejects_set() {
        let arena = arena();
        let obj = JsObject::ordinary(&arena, None);
        obj.define_data(PropertyKey::from("k"), Value::int32(1), PropertyAttributes::frozen());
        assert!(!obj.set(PropertyKey::from("k"), Value::int32(2)).unwrap());
        assert!(!obj.delete(&PropertyKey::from("k")));
        let frozen = PropertyAttributes::frozen();
        assert!(!obj.define_data(PropertyKey::from("k"), Value::int32(3), frozen));
        assert!(obj.define_data(PropertyKey::from("k"), Value::int32(1), frozen));
    }

    #[test]
    fn test_prototype_lookup_and_accessor() {
        let arena = arena();
        let proto = JsObject::ordinary(&arena, None);
        let getter = JsObject::native_function(
            &arena,
            None,
            "get v",
            0,
            Arc::new(|this: &Value, _: &[Value]| {
                let obj = this.as_object().cloned();
                Ok(match obj {
                    Some(o) => o.get(&PropertyKey::from("base"))?,
                    None => Value::Undefined,
                })
            }),
        );
        proto.define_own_property(
            PropertyKey::from("v"),
            PropertyDescriptor::accessor(Some(getter), None, PropertyAttributes::data()),
        );
        let obj = JsObject::ordinary(&arena, Some(proto));
        obj.set(PropertyKey::from("base"), Value::int32(9)).unwrap();
        assert_eq!(obj.get(&PropertyKey::from("v")).unwrap().as_int32(), Some(9));
        // Accessor without setter rejects assignment
        assert!(!obj.set(PropertyKey::from("v"), Value::int32(1)).unwrap());
    }

    #[derive(Default)]
    struct Recorder {
        added: parking_lot::Mutex<Vec<(bool, PropertyKey)>>,
        dictionary: parking_lot::Mutex<Vec<&'static str>>,
    }

    impl ObjectObserver for Recorder {
        fn property_added(&self, obj: &JsObject, key: &PropertyKey) {
            // The key is not visible yet.
            assert!(!obj.has_own_property(key));
            self.added.lock().push((obj.is_element_guarded(), key.clone()));
        }

        fn entered_dictionary_mode(&self, obj: &JsObject) {
            self.dictionary.lock().push(obj.kind().root_tag());
        }
    }

    #[test]
    fn test_observer_sees_structural_changes() {
        let arena = arena();
        let recorder = Arc::new(Recorder::default());
        assert!(arena.set_observer(recorder.clone()));
        assert!(!arena.set_observer(Arc::new(Recorder::default())));

        let proto = JsObject::new(&arena, None, ObjectKind::Array);
        proto.mark_element_guarded();
        proto.define_data(PropertyKey::index(0), Value::int32(1), PropertyAttributes::data());
        // Redefinition with the same attributes is not structural.
        proto.define_data(PropertyKey::index(0), Value::int32(2), PropertyAttributes::data());
        assert_eq!(*recorder.added.lock(), vec![(true, PropertyKey::index(0))]);
        assert!(recorder.dictionary.lock().is_empty());

        proto.define_data(PropertyKey::index(0), Value::int32(3), PropertyAttributes::frozen());
        let args = JsObject::new(&arena, None, ObjectKind::Arguments);
        args.define_data(PropertyKey::from("callee"), Value::Null, PropertyAttributes::data());
        args.delete(&PropertyKey::from("callee"));
        // Already in dictionary mode: no second report.
        proto.define_data(PropertyKey::index(1), Value::Null, PropertyAttributes::data());
        assert!(proto.delete(&PropertyKey::index(1)));
        assert_eq!(*recorder.dictionary.lock(), vec!["Array", "Arguments"]);
    }

    #[test]
    fn test_set_prototype_rejects_cycles() {
        let arena = arena();
        let a = JsObject::ordinary(&arena, None);
        let b = JsObject::ordinary(&arena, None);
        assert!(a.set_prototype(Some(b.clone())));
        assert!(!b.set_prototype(Some(a.clone())));
        assert!(!a.set_prototype(Some(a.clone())));
        assert!(b.prototype().is_none());

        // Lookups on the rejected chain terminate.
        let missing = PropertyKey::from("missing");
        assert!(a.get(&missing).unwrap().is_undefined());
        assert!(!a.has_property(&missing));

        // Same prototype again is accepted even when frozen.
        a.prevent_extensions();
        assert!(a.set_prototype(Some(b.clone())));
        assert!(!a.set_prototype(None));
    }

    #[test]
    fn test_set_prototype_sees_through_proxy() {
        let arena = arena();
        let a = JsObject::ordinary(&arena, None);
        let handler = JsObject::ordinary(&arena, None);
        let proxy = JsObject::proxy(&arena, a.clone(), handler);
        let b = JsObject::ordinary(&arena, Some(proxy.clone()));
        assert!(!a.set_prototype(Some(b.clone())));
        assert!(a.prototype().is_none());

        // Revoked proxies end the chain.
        proxy.revoke_proxy();
        assert!(a.set_prototype(Some(b)));
    }

    #[test]
    fn test_array_length_tracks_indices() {
        let arena = arena();
        let arr = JsObject::array(&arena, None, vec![Value::int32(1), Value::int32(2)]);
        arr.set(PropertyKey::index(5), Value::Null).unwrap();
        let len = arr.get(&PropertyKey::from("length")).unwrap();
        assert_eq!(len.as_number(), Some(6.0));
    }

    #[test]
    fn test_revoked_proxy() {
        let arena = arena();
        let target = JsObject::ordinary(&arena, None);
        let handler = JsObject::ordinary(&arena, None);
        let proxy = JsObject::proxy(&arena, target, handler);
        assert!(proxy.get(&PropertyKey::from("x")).unwrap().is_undefined());
        proxy.revoke_proxy();
        let err = proxy.get(&PropertyKey::from("x")).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_call_non_callable() {
        let arena = arena();
        let obj = JsObject::ordinary(&arena, None);
        let err = obj.call(&Value::Undefined, &[]).unwrap_err();
        assert_eq!(err.message(), "[object Object] is not a function");
    }

    #[test]
    fn test_bound_function_prepends_arguments() {
        let arena = arena();
        let target = JsObject::native_function(
            &arena,
            None,
            "count",
            0,
            Arc::new(|_: &Value, args: &[Value]| Ok(Value::number(args.len() as f64))),
        );
        let bound =
            JsObject::bound_function(&arena, None, target, Value::Undefined, vec![Value::Null]);
        let result = bound.call(&Value::Undefined, &[Value::Null, Value::Null]).unwrap();
        assert_eq!(result.as_int32(), Some(3));
        assert!(bound.is_callable());
    }
}

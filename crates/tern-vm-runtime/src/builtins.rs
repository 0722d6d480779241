//! Builtin function templates.
//!
//! A [`FunctionTemplate`] is the realm-independent half of a builtin
//! function: its name, arity and native behavior. Templates are created
//! lazily, once per engine, and every realm instantiates its own function
//! object from the shared template.
//!
//! Two lookup paths exist:
//! - [`TemplateTable`]: a fixed array indexed by [`BuiltinFunctionKey`] for the
//!   internal functions the engine itself creates (promise jobs, RegExp
//!   statics, proxy revokers, ...)
//! - [`DescriptorTemplates`]: a concurrent map keyed by [`BuiltinDescriptor`]
//!   for functions installed from builtin tables

use dashmap::DashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicU64, Ordering};

use tern_vm_core::object::NativeFn;
use tern_vm_core::{JsObject, ObjectRef, ShapeArena};

macro_rules! builtin_function_keys {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Internal builtin functions with a slot in the template table
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum BuiltinFunctionKey {
            $(
                #[doc = concat!("`", stringify!($variant), "`")]
                $variant,
            )+
        }

        impl BuiltinFunctionKey {
            /// Every key, in table order
            pub const ALL: &'static [BuiltinFunctionKey] = &[$(Self::$variant),+];

            /// Number of keys (table size)
            pub const COUNT: usize = Self::ALL.len();

            /// Function name as seen by scripts
            pub fn function_name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }
    };
}

builtin_function_keys! {
    ArrayFlattenIntoArray => "FlattenIntoArray",
    AwaitFulfilled => "Await Fulfilled",
    AwaitRejected => "Await Rejected",
    AsyncGeneratorReturnFulfilled => "AsyncGeneratorReturn Fulfilled",
    AsyncGeneratorReturnRejected => "AsyncGeneratorReturn Rejected",
    AsyncFromSyncIteratorValueUnwrap => "Async-from-Sync Iterator Value Unwrap",
    CollatorCompare => "compare",
    DateTimeFormatFormat => "format",
    NumberFormatFormat => "format",
    ProxyRevokerFunction => "revoke",
    PromiseResolveFunction => "resolve",
    PromiseRejectFunction => "reject",
    PromiseGetCapabilitiesExecutor => "GetCapabilitiesExecutor",
    PromiseResolveThenableJob => "PromiseResolveThenableJob",
    PromiseReactionJob => "PromiseReactionJob",
    PromiseAllResolveElement => "Promise.all Resolve Element",
    PromiseAllSettledResolveElement => "Promise.allSettled Resolve Element",
    PromiseAllSettledRejectElement => "Promise.allSettled Reject Element",
    PromiseAnyRejectElement => "Promise.any Reject Element",
    PromiseThenFinally => "thenFinally",
    PromiseCatchFinally => "catchFinally",
    PromiseValueThunk => "valueThunk",
    PromiseThrower => "thrower",
    ImportModuleDynamically => "importModuleDynamically",
    RegExpInput => "input",
    RegExpMultiLine => "multiline",
    RegExpLastMatch => "lastMatch",
    RegExpLastParen => "lastParen",
    RegExpLeftContext => "leftContext",
    RegExpRightContext => "rightContext",
    RegExpDollar1 => "$1",
    RegExpDollar2 => "$2",
    RegExpDollar3 => "$3",
    RegExpDollar4 => "$4",
    RegExpDollar5 => "$5",
    RegExpDollar6 => "$6",
    RegExpDollar7 => "$7",
    RegExpDollar8 => "$8",
    RegExpDollar9 => "$9",
    RegExpInputSetter => "set input",
    SymbolGetDescription => "get description",
    MapGetSize => "get size",
    SetGetSize => "get size",
    ArrayBufferViewLength => "get length",
    ArrayBufferViewBuffer => "get buffer",
    ArrayBufferViewByteLength => "get byteLength",
    ArrayBufferViewByteOffset => "get byteOffset",
    ArrayBufferViewToStringTag => "get [Symbol.toStringTag]",
    DataViewBuffer => "get buffer",
    DataViewByteLength => "get byteLength",
    DataViewByteOffset => "get byteOffset",
    CollatorGetCompare => "get compare",
    NumberFormatGetFormat => "get format",
    DateTimeFormatGetFormat => "get format",
    FunctionAsyncIterator => "[Symbol.asyncIterator]",
    AsyncModuleExecutionFulfilled => "AsyncModuleExecutionFulfilled",
    AsyncModuleExecutionRejected => "AsyncModuleExecutionRejected",
    TopLevelAwaitResolve => "TopLevelAwaitResolve",
    TopLevelAwaitReject => "TopLevelAwaitReject",
    WebAssemblyInstanceGetExports => "get exports",
    WebAssemblyMemoryGetBuffer => "get buffer",
    WebAssemblyTableGetLength => "get length",
    WebAssemblyGlobalGetValue => "get value",
    WebAssemblyGlobalSetValue => "set value",
    WebAssemblySourceInstantiation => "WebAssemblySourceInstantiation",
    FinishImportModuleDynamicallyReject => "FinishDynamicImport Reject",
    FinishImportModuleDynamicallyResolve => "FinishDynamicImport Resolve",
    ThrowTypeError => "",
    ProtoGetter => "get __proto__",
    ProtoSetter => "set __proto__",
}

impl BuiltinFunctionKey {
    /// Table slot
    #[inline]
    pub fn index(self) -> usize {
        self as u16 as usize
    }

    /// Getter for `RegExp.$n`, `n` in `1..=9`
    pub fn regexp_dollar(n: usize) -> Option<Self> {
        const DOLLARS: [BuiltinFunctionKey; 9] = [
            BuiltinFunctionKey::RegExpDollar1,
            BuiltinFunctionKey::RegExpDollar2,
            BuiltinFunctionKey::RegExpDollar3,
            BuiltinFunctionKey::RegExpDollar4,
            BuiltinFunctionKey::RegExpDollar5,
            BuiltinFunctionKey::RegExpDollar6,
            BuiltinFunctionKey::RegExpDollar7,
            BuiltinFunctionKey::RegExpDollar8,
            BuiltinFunctionKey::RegExpDollar9,
        ];
        n.checked_sub(1).and_then(|i| DOLLARS.get(i).copied())
    }
}

/// What kind of function a template produces
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateKind {
    /// Plain function
    Normal,
    /// Constructor (`[[Construct]]` capable)
    Constructor,
    /// Accessor getter
    Getter,
    /// Accessor setter
    Setter,
}

/// Realm-independent blueprint of a builtin function
pub struct FunctionTemplate {
    /// Table key, for internal functions
    pub key: Option<BuiltinFunctionKey>,
    /// `name` property
    pub name: String,
    /// `length` property
    pub length: u32,
    /// Function kind
    pub kind: TemplateKind,
    /// Native behavior
    pub behavior: NativeFn,
}

impl FunctionTemplate {
    /// Template for an internal function
    pub fn for_key(
        key: BuiltinFunctionKey,
        length: u32,
        kind: TemplateKind,
        behavior: NativeFn,
    ) -> Self {
        Self {
            key: Some(key),
            name: key.function_name().to_string(),
            length,
            kind,
            behavior,
        }
    }

    /// Template for a named builtin
    pub fn named(
        name: impl Into<String>,
        length: u32,
        kind: TemplateKind,
        behavior: NativeFn,
    ) -> Self {
        Self {
            key: None,
            name: name.into(),
            length,
            kind,
            behavior,
        }
    }

    /// Create a realm-local function object from this template
    pub fn instantiate(
        &self,
        arena: &Arc<ShapeArena>,
        function_prototype: &ObjectRef,
    ) -> ObjectRef {
        let proto = Some(function_prototype.clone());
        let behavior = self.behavior.clone();
        match self.kind {
            TemplateKind::Constructor => {
                JsObject::native_constructor(arena, proto, &self.name, self.length, behavior)
            }
            _ => JsObject::native_function(arena, proto, &self.name, self.length, behavior),
        }
    }
}

impl fmt::Debug for FunctionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTemplate")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("length", &self.length)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Fixed-size table of lazily created templates, one cell per key
pub struct TemplateTable {
    cells: Box<[OnceLock<Arc<FunctionTemplate>>]>,
    lost_races: AtomicU64,
}

impl TemplateTable {
    /// Table with every cell empty
    pub fn new() -> Self {
        Self {
            cells: (0..BuiltinFunctionKey::COUNT).map(|_| OnceLock::new()).collect(),
            lost_races: AtomicU64::new(0),
        }
    }

    /// Published template for `key`, if any
    pub fn get(&self, key: BuiltinFunctionKey) -> Option<Arc<FunctionTemplate>> {
        self.cells[key.index()].get().cloned()
    }

    /// Return the template for `key`, creating it with `factory` on first use.
    ///
    /// `factory` runs without any lock held, so concurrent first callers may
    /// each run it. Only one result is published and every caller gets that
    /// one; the losers' templates are dropped.
    pub fn get_or_create<F>(&self, key: BuiltinFunctionKey, factory: F) -> Arc<FunctionTemplate>
    where
        F: FnOnce() -> FunctionTemplate,
    {
        let cell = &self.cells[key.index()];
        if let Some(existing) = cell.get() {
            return existing.clone();
        }

        let created = Arc::new(factory());
        let published = cell.get_or_init(|| created.clone());
        if !Arc::ptr_eq(published, &created) {
            self.lost_races.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(target: "tern::engine", ?key, "builtin template publication lost race");
        }
        published.clone()
    }

    /// Number of cells populated so far
    pub fn populated(&self) -> usize {
        self.cells.iter().filter(|c| c.get().is_some()).count()
    }

    /// Number of times a factory result was discarded because another caller
    /// published first
    pub fn lost_races(&self) -> u64 {
        self.lost_races.load(Ordering::Relaxed)
    }
}

impl Default for TemplateTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TemplateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateTable")
            .field("size", &self.cells.len())
            .field("populated", &self.populated())
            .finish()
    }
}

/// Identifies a builtin installed from a builtin table, e.g. `Array.prototype.map`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BuiltinDescriptor {
    /// Owning object (`"Array.prototype"`)
    pub container: &'static str,
    /// Property name (`"map"`)
    pub name: &'static str,
}

impl BuiltinDescriptor {
    /// New descriptor
    pub const fn new(container: &'static str, name: &'static str) -> Self {
        Self { container, name }
    }
}

impl fmt::Display for BuiltinDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.container, self.name)
    }
}

/// Descriptor to template map with put-if-absent publication
#[derive(Default)]
pub struct DescriptorTemplates {
    map: DashMap<BuiltinDescriptor, Arc<FunctionTemplate>>,
}

impl DescriptorTemplates {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Template for `descriptor`, created by `factory` if absent.
    ///
    /// The factory runs under the shard lock, so it runs at most once per
    /// descriptor.
    pub fn get_or_create<F>(
        &self,
        descriptor: BuiltinDescriptor,
        factory: F,
    ) -> Arc<FunctionTemplate>
    where
        F: FnOnce() -> FunctionTemplate,
    {
        self.map
            .entry(descriptor)
            .or_insert_with(|| Arc::new(factory()))
            .clone()
    }

    /// Template for `descriptor`, if created
    pub fn get(&self, descriptor: &BuiltinDescriptor) -> Option<Arc<FunctionTemplate>> {
        self.map.get(descriptor).map(|t| t.clone())
    }

    /// Number of templates
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no template was created yet
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

//! Engine-wide configuration shared by every realm.
//!
//! An [`EngineConfig`] is created once per engine and never mutated after
//! construction, apart from:
//! - builtin templates, published lazily with compare-and-set semantics
//! - speculation guards, which only ever go from valid to invalid
//! - the stable option subset, replaced through [`EngineConfig::update_stable_options`]
//!
//! ## Usage
//!
//! ```ignore
//! let config = EngineConfig::builder()
//!     .options(EngineOptions { intl_402: true, ..Default::default() })
//!     .build()?;
//! let realm = GlobalEnvironment::create_top_level(&config, config.host())?;
//! ```

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use tern_vm_core::{CyclicGuard, ShapeArena, ShapeId, SpeculationGuard, VmError, VmResult};

use crate::builtins::{
    BuiltinDescriptor, BuiltinFunctionKey, DescriptorTemplates, FunctionTemplate, TemplateTable,
};
use crate::guards::{GuardKind, GuardObserver, GuardSet, OptionGuards};
use crate::host::HostEnvironment;
use crate::options::{EcmaVersion, EngineOptions, ResolvedOptions, StableOptions};
use crate::realm::RealmRegistry;

/// No realm was created yet
const REALM_UNINIT: u8 = 0;
/// The first realm is bootstrapping
const REALM_INITIALIZING: u8 = 1;
/// The first realm is ready
const REALM_INITIALIZED: u8 = 2;

/// How [`EngineConfig::update_stable_options`] is being applied
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdatePhase {
    /// First use of a pre-built engine. Allowed once.
    Initialize,
    /// Per-realm refresh; guards stay as they are
    Update,
    /// Reuse of a pre-built engine under a different host; every guard is
    /// reset to valid
    Patch,
}

/// Empty root shapes for the object kinds every realm allocates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InitialShapes {
    /// Ordinary objects
    pub ordinary: ShapeId,
    /// Arrays
    pub array: ShapeId,
    /// Functions
    pub function: ShapeId,
    /// Error instances
    pub error: ShapeId,
    /// Arguments objects
    pub arguments: ShapeId,
    /// Global objects
    pub global: ShapeId,
}

impl InitialShapes {
    fn allocate(arena: &ShapeArena) -> Self {
        Self {
            ordinary: arena.ordinary_root(),
            array: arena.allocate_empty_shape("Array"),
            function: arena.allocate_empty_shape("Function"),
            error: arena.allocate_empty_shape("Error"),
            arguments: arena.allocate_empty_shape("Arguments"),
            global: arena.allocate_empty_shape("Global"),
        }
    }
}

/// Builder for [`EngineConfig`]
#[derive(Default)]
pub struct EngineConfigBuilder {
    options: EngineOptions,
    host: Option<Arc<HostEnvironment>>,
}

impl EngineConfigBuilder {
    /// Engine options
    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Host the engine's realms talk to
    pub fn host(mut self, host: HostEnvironment) -> Self {
        self.host = Some(Arc::new(host));
        self
    }

    /// Build the engine configuration
    pub fn build(self) -> VmResult<Arc<EngineConfig>> {
        EngineConfig::create(&self.options, self.host)
    }
}

/// Immutable engine-wide state
pub struct EngineConfig {
    options: ResolvedOptions,
    stable: RwLock<StableOptions>,
    /// Timer resolution after derivation from the stable options
    timer_resolution: AtomicU64,
    host: RwLock<Arc<HostEnvironment>>,
    templates: TemplateTable,
    descriptor_templates: DescriptorTemplates,
    guards: Arc<GuardSet>,
    option_guards: OptionGuards,
    shapes: Arc<ShapeArena>,
    initial_shapes: InitialShapes,
    realm_init: AtomicU8,
    realms: Arc<RealmRegistry>,
    initialized: AtomicBool,
}

impl EngineConfig {
    /// Builder with default options and host
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Resolve `options` and create the engine configuration
    pub fn create(
        options: &EngineOptions,
        host: Option<Arc<HostEnvironment>>,
    ) -> VmResult<Arc<Self>> {
        let options = options.resolve()?;
        let stable = options.stable.clone();
        let guards = Arc::new(GuardSet::new());
        let shapes = ShapeArena::new();
        shapes.set_observer(Arc::new(GuardObserver::new(guards.clone())));
        let initial_shapes = InitialShapes::allocate(&shapes);
        let config = Self {
            timer_resolution: AtomicU64::new(derive_timer_resolution(&stable, &options)),
            stable: RwLock::new(stable),
            host: RwLock::new(host.unwrap_or_default()),
            templates: TemplateTable::new(),
            descriptor_templates: DescriptorTemplates::new(),
            guards,
            option_guards: OptionGuards::new(),
            shapes,
            initial_shapes,
            realm_init: AtomicU8::new(REALM_UNINIT),
            realms: RealmRegistry::new(),
            initialized: AtomicBool::new(false),
            options,
        };
        tracing::debug!(
            target: "tern::engine",
            version = %config.options.ecmascript_version,
            multi_context = config.options.multi_context,
            "engine config created"
        );
        Ok(Arc::new(config))
    }

    // ------------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------------

    /// Template for an internal builtin, created with `factory` on first use.
    ///
    /// Concurrent first callers may each run `factory`; all of them get the
    /// single published template.
    pub fn get_or_create_builtin_template<F>(
        &self,
        key: BuiltinFunctionKey,
        factory: F,
    ) -> Arc<FunctionTemplate>
    where
        F: FnOnce(&EngineConfig) -> FunctionTemplate,
    {
        self.templates.get_or_create(key, || factory(self))
    }

    /// Template for a named builtin, created with `factory` on first use
    pub fn get_or_create_descriptor_template<F>(
        &self,
        descriptor: BuiltinDescriptor,
        factory: F,
    ) -> Arc<FunctionTemplate>
    where
        F: FnOnce(&EngineConfig) -> FunctionTemplate,
    {
        self.descriptor_templates.get_or_create(descriptor, || factory(self))
    }

    /// The internal template table
    pub fn templates(&self) -> &TemplateTable {
        &self.templates
    }

    /// The named template table
    pub fn descriptor_templates(&self) -> &DescriptorTemplates {
        &self.descriptor_templates
    }

    // ------------------------------------------------------------------------
    // Guards
    // ------------------------------------------------------------------------

    /// Invalidate a guard. Returns `true` for the call that flipped it.
    pub fn invalidate(&self, kind: GuardKind, reason: &str) -> bool {
        self.guards.invalidate(kind, reason)
    }

    /// Whether a guard still holds
    #[inline]
    pub fn is_valid(&self, kind: GuardKind) -> bool {
        self.guards.is_valid(kind)
    }

    /// The guard for `kind`
    #[inline]
    pub fn guard(&self, kind: GuardKind) -> &SpeculationGuard {
        self.guards.guard(kind)
    }

    /// Every guard
    pub fn guards(&self) -> &GuardSet {
        &self.guards
    }

    /// The `SingleRealm` guard
    #[inline]
    pub fn single_realm_guard(&self) -> &SpeculationGuard {
        self.guards.guard(GuardKind::SingleRealm)
    }

    /// Cyclic guards over the patchable options
    pub fn option_guards(&self) -> &OptionGuards {
        &self.option_guards
    }

    /// Whether realms may run on several threads. Fixed at construction.
    #[inline]
    pub fn is_multi_context(&self) -> bool {
        self.options.multi_context
    }

    /// Whether code may assume only one realm exists
    #[inline]
    pub fn is_single_realm(&self) -> bool {
        !self.options.multi_context && self.single_realm_guard().is_valid()
    }

    // ------------------------------------------------------------------------
    // Realm bookkeeping
    // ------------------------------------------------------------------------

    /// Record that a realm is being created. Runs before any realm work.
    pub(crate) fn on_realm_created(&self, is_child: bool) {
        let first = self.realm_init.load(Ordering::Acquire) == REALM_UNINIT
            && self
                .realm_init
                .compare_exchange(
                    REALM_UNINIT,
                    REALM_INITIALIZING,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok();
        if !first {
            self.invalidate(GuardKind::SingleRealm, "Another realm was created");
        }
        if is_child {
            self.invalidate(GuardKind::NoChildRealms, "A child realm was created");
        }
    }

    pub(crate) fn mark_realm_initialized(&self) {
        self.realm_init.store(REALM_INITIALIZED, Ordering::Release);
    }

    /// Realm bookkeeping state: 0 none, 1 initializing, 2 initialized
    pub fn realm_init_state(&self) -> u8 {
        self.realm_init.load(Ordering::Acquire)
    }

    /// Registry of this engine's realms
    pub fn realm_registry(&self) -> &Arc<RealmRegistry> {
        &self.realms
    }

    // ------------------------------------------------------------------------
    // Stable options
    // ------------------------------------------------------------------------

    /// Replace the stable option subset.
    ///
    /// Every option whose value changes bumps its cyclic guard before the new
    /// value is stored.
    pub fn update_stable_options(&self, new: &StableOptions, phase: UpdatePhase) {
        if phase == UpdatePhase::Initialize && self.initialized.swap(true, Ordering::AcqRel) {
            tern_vm_core::invariant_violation!("engine options initialized twice");
        }

        let mut current = self.stable.write();
        let guards = &self.option_guards;
        bump_if_changed(
            &guards.array_sort_inherited,
            current.array_sort_inherited,
            new.array_sort_inherited,
        );
        bump_if_changed(&guards.v8_compat, current.v8_compat, new.v8_compat);
        bump_if_changed(
            &guards.direct_byte_buffer,
            current.direct_byte_buffer,
            new.direct_byte_buffer,
        );
        bump_if_changed(&guards.timer_resolution, current.timer_resolution, new.timer_resolution);
        *current = new.clone();
        self.timer_resolution
            .store(derive_timer_resolution(&current, &self.options), Ordering::Release);
        drop(current);

        if phase == UpdatePhase::Patch {
            self.guards.reset_all();
            self.realm_init.store(REALM_UNINIT, Ordering::Release);
            self.realms.clear();
            tracing::info!(target: "tern::engine", "engine patched, speculation guards reset");
        }
    }

    /// Current stable options
    pub fn stable_options(&self) -> StableOptions {
        self.stable.read().clone()
    }

    /// Whether [`UpdatePhase::Initialize`] has run
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------------
    // Host
    // ------------------------------------------------------------------------

    /// Default host for new realms
    pub fn host(&self) -> Arc<HostEnvironment> {
        self.host.read().clone()
    }

    /// Swap the default host, ahead of an [`UpdatePhase::Patch`]
    pub fn replace_host(&self, host: Arc<HostEnvironment>) {
        *self.host.write() = host;
    }

    // ------------------------------------------------------------------------
    // Shapes
    // ------------------------------------------------------------------------

    /// The arena shared by all realms of this engine
    pub fn shape_arena(&self) -> &Arc<ShapeArena> {
        &self.shapes
    }

    /// Empty root shapes
    pub fn initial_shapes(&self) -> &InitialShapes {
        &self.initial_shapes
    }

    // ------------------------------------------------------------------------
    // Options
    // ------------------------------------------------------------------------

    /// Resolved construction options
    pub fn options(&self) -> &ResolvedOptions {
        &self.options
    }

    /// ECMAScript edition
    pub fn ecmascript_version(&self) -> EcmaVersion {
        self.options.ecmascript_version
    }

    /// Whether the edition is `version` or later
    #[inline]
    pub fn is_at_least(&self, version: EcmaVersion) -> bool {
        self.options.ecmascript_version >= version
    }

    /// ES2015 or later
    pub fn is_es6_or_later(&self) -> bool {
        self.is_at_least(EcmaVersion::ES2015)
    }

    /// ES2017 or later
    pub fn is_es2017_or_later(&self) -> bool {
        self.is_at_least(EcmaVersion::ES2017)
    }

    /// ES2019 or later
    pub fn is_es2019_or_later(&self) -> bool {
        self.is_at_least(EcmaVersion::ES2019)
    }

    /// ES2021 or later
    pub fn is_es2021_or_later(&self) -> bool {
        self.is_at_least(EcmaVersion::ES2021)
    }

    /// Annex B
    pub fn annex_b(&self) -> bool {
        self.options.annex_b
    }

    /// `Intl`
    pub fn intl_402(&self) -> bool {
        self.options.intl_402
    }

    /// Legacy RegExp statics
    pub fn regexp_static_result(&self) -> bool {
        self.options.regexp_static_result
    }

    /// `BigInt`
    pub fn bigint(&self) -> bool {
        self.options.bigint
    }

    /// `SharedArrayBuffer`
    pub fn shared_array_buffer(&self) -> bool {
        self.options.shared_array_buffer
    }

    /// `Atomics`
    pub fn atomics(&self) -> bool {
        self.options.atomics
    }

    /// Nashorn compatibility
    pub fn nashorn_compat(&self) -> bool {
        self.options.nashorn_compat
    }

    /// V8 compatibility
    pub fn v8_compat(&self) -> bool {
        self.stable.read().v8_compat
    }

    /// `Array.prototype.sort` consults inherited elements
    pub fn array_sort_inherited(&self) -> bool {
        self.stable.read().array_sort_inherited
    }

    /// Direct byte buffers
    pub fn direct_byte_buffer(&self) -> bool {
        self.stable.read().direct_byte_buffer
    }

    /// Effective timer resolution in nanoseconds; zero disables clamping
    pub fn timer_resolution(&self) -> u64 {
        self.timer_resolution.load(Ordering::Acquire)
    }

    /// Maximum string length
    pub fn string_length_limit(&self) -> usize {
        self.options.string_length_limit
    }

    /// Maximum call arguments
    pub fn function_arguments_limit(&self) -> usize {
        self.options.function_arguments_limit
    }

    /// `RangeError` if a string of `len` units may not be created
    pub fn check_string_length(&self, len: usize) -> VmResult<()> {
        if len > self.options.string_length_limit {
            return Err(VmError::range_error("Invalid string length"));
        }
        Ok(())
    }
}

fn bump_if_changed<T: PartialEq + fmt::Display>(guard: &CyclicGuard, old: T, new: T) {
    if old != new {
        guard.invalidate(&format!(
            "Option {} was changed from {old} to {new}.",
            guard.name()
        ));
    }
}

/// Test harnesses under v8-compat get an unclamped clock
fn derive_timer_resolution(stable: &StableOptions, options: &ResolvedOptions) -> u64 {
    if stable.v8_compat && options.test262_mode {
        0
    } else {
        stable.timer_resolution
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("version", &self.options.ecmascript_version)
            .field("multi_context", &self.options.multi_context)
            .field("realm_init", &self.realm_init_state())
            .field("templates", &self.templates)
            .field("guards", &self.guards)
            .finish()
    }
}

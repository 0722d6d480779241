//! Realms (global environments) and the engine's realm registry.
//!
//! A [`GlobalEnvironment`] owns one global object and everything mutable
//! that hangs off it: intrinsics, RegExp statics, caches, the module loader.
//! Realms created with [`GlobalEnvironment::create_child`] share the job
//! queue of their top-level realm and appear in its child list.
//!
//! # Usage
//!
//! ```ignore
//! let top = GlobalEnvironment::create_top_level(&config, config.host())?;
//! let child = GlobalEnvironment::create_child(&config, config.host(), &top)?;
//! {
//!     let _scope = top.enter(&child);
//!     assert!(Arc::ptr_eq(&top.current(), &child));
//! } // scope drops -> previous realm restored
//! ```

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use tern_vm_core::{JsObject, ObjectRef, PropertyAttributes, PropertyKey, Value, VmError, VmResult};

use crate::agent::Agent;
use crate::caches::RealmCaches;
use crate::engine::EngineConfig;
use crate::guards::GuardKind;
use crate::host::HostEnvironment;
use crate::intrinsics::{BootstrapContext, Intrinsics};
use crate::module_loader::{ModuleLoader, ModuleLoaderSlot};
use crate::regexp_static::{RegExpStatics, RegexHandle, RegexMatch};

/// Unique realm identifier.
pub type RealmId = u32;

/// Stored realm record.
#[derive(Clone)]
pub struct RealmRecord {
    /// Realm id
    pub id: RealmId,
    /// Parent realm, for child realms
    pub parent: Option<RealmId>,
    /// The realm; the registry does not keep it alive
    pub realm: Weak<GlobalEnvironment>,
}

/// Registry of all realms created by an engine.
pub struct RealmRegistry {
    realms: RwLock<Vec<RealmRecord>>,
    next_id: AtomicU32,
}

impl RealmRegistry {
    /// Empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            realms: RwLock::new(Vec::new()),
            next_id: AtomicU32::new(0),
        })
    }

    /// Allocate a new realm id.
    pub fn allocate_id(&self) -> RealmId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Insert a realm record.
    pub fn insert(&self, record: RealmRecord) {
        self.realms.write().push(record);
    }

    /// Live realm by id.
    pub fn get(&self, id: RealmId) -> Option<Arc<GlobalEnvironment>> {
        self.realms
            .read()
            .iter()
            .find(|r| r.id == id)
            .and_then(|r| r.realm.upgrade())
    }

    /// Record by id.
    pub fn record(&self, id: RealmId) -> Option<RealmRecord> {
        self.realms.read().iter().find(|r| r.id == id).cloned()
    }

    /// Remove a realm record by id.
    pub fn remove(&self, id: RealmId) -> Option<RealmRecord> {
        let mut realms = self.realms.write();
        let pos = realms.iter().position(|r| r.id == id)?;
        Some(realms.swap_remove(pos))
    }

    /// Number of registered realms
    pub fn len(&self) -> usize {
        self.realms.read().len()
    }

    /// Whether no realm is registered
    pub fn is_empty(&self) -> bool {
        self.realms.read().is_empty()
    }

    /// Forget every realm
    pub fn clear(&self) {
        self.realms.write().clear();
    }
}

impl fmt::Debug for RealmRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealmRegistry")
            .field("realms", &self.len())
            .finish()
    }
}

/// A global environment: one global object and its per-realm state
pub struct GlobalEnvironment {
    id: RealmId,
    config: Arc<EngineConfig>,
    host: Arc<HostEnvironment>,
    intrinsics: Intrinsics,
    global_object: RwLock<Option<ObjectRef>>,
    global_this: RwLock<Option<ObjectRef>>,
    parent: Option<Weak<GlobalEnvironment>>,
    top_level: Weak<GlobalEnvironment>,
    agent: Arc<Agent>,
    /// Realm entered on this top-level realm; `None` means the top-level
    /// realm itself
    current: Mutex<Option<Weak<GlobalEnvironment>>>,
    /// Child realms; removed entries stay as `None` so indices are stable
    children: Mutex<Vec<Option<Arc<GlobalEnvironment>>>>,
    statics: Arc<RegExpStatics>,
    caches: Arc<RealmCaches>,
    module_loader: ModuleLoaderSlot,
    arguments: RwLock<Vec<String>>,
    disposed: AtomicBool,
}

impl GlobalEnvironment {
    /// Create a top-level realm
    pub fn create_top_level(
        config: &Arc<EngineConfig>,
        host: Arc<HostEnvironment>,
    ) -> VmResult<Arc<Self>> {
        config.on_realm_created(false);
        let realm = Self::build(config, host, None)?;
        config.mark_realm_initialized();
        Ok(realm)
    }

    /// Create a child realm of `parent`, sharing its top-level realm's agent
    pub fn create_child(
        config: &Arc<EngineConfig>,
        host: Arc<HostEnvironment>,
        parent: &Arc<GlobalEnvironment>,
    ) -> VmResult<Arc<Self>> {
        config.on_realm_created(true);
        let realm = Self::build(config, host, Some(parent))?;
        if let Some(top) = realm.top_level.upgrade() {
            top.children.lock().push(Some(realm.clone()));
        }
        Ok(realm)
    }

    fn build(
        config: &Arc<EngineConfig>,
        host: Arc<HostEnvironment>,
        parent: Option<&Arc<GlobalEnvironment>>,
    ) -> VmResult<Arc<Self>> {
        let statics = Arc::new(RegExpStatics::new());
        let stable = config.stable_options();
        let caches = Arc::new(RealmCaches::new(
            config.options().regex_cache_size,
            &host,
            &stable.time_zone,
        ));
        let intrinsics = Intrinsics::bootstrap(&BootstrapContext {
            config,
            host: &host,
            statics: &statics,
            caches: &caches,
        })?;

        let id = config.realm_registry().allocate_id();
        let agent = match parent {
            Some(p) => p.agent.clone(),
            None => Arc::new(Agent::new(config.options().agent_can_block)),
        };
        let global = intrinsics.global().clone();
        let realm = Arc::new_cyclic(|this| Self {
            id,
            config: config.clone(),
            host,
            global_object: RwLock::new(Some(global.clone())),
            global_this: RwLock::new(Some(global)),
            intrinsics,
            parent: parent.map(Arc::downgrade),
            top_level: match parent {
                Some(p) => p.top_level.clone(),
                None => this.clone(),
            },
            agent,
            current: Mutex::new(None),
            children: Mutex::new(Vec::new()),
            statics,
            caches,
            module_loader: ModuleLoaderSlot::new(),
            arguments: RwLock::new(Vec::new()),
            disposed: AtomicBool::new(false),
        });

        config.realm_registry().insert(RealmRecord {
            id,
            parent: parent.map(|p| p.id),
            realm: Arc::downgrade(&realm),
        });
        realm.set_arguments(realm.host.arguments().to_vec());

        tracing::debug!(
            target: "tern::realm",
            id,
            parent = ?parent.map(|p| p.id),
            "realm created"
        );
        Ok(realm)
    }

    // ------------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------------

    /// Realm id
    pub fn id(&self) -> RealmId {
        self.id
    }

    /// Engine configuration
    pub fn config(&self) -> &Arc<EngineConfig> {
        &self.config
    }

    /// Host bindings
    pub fn host(&self) -> &Arc<HostEnvironment> {
        &self.host
    }

    /// Intrinsics
    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    /// Whether this realm has no parent
    pub fn is_top_level(&self) -> bool {
        self.parent.is_none()
    }

    /// Parent realm
    pub fn parent(&self) -> Option<Arc<GlobalEnvironment>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// The top-level realm this realm belongs to
    pub fn top_level(self: &Arc<Self>) -> Arc<GlobalEnvironment> {
        self.top_level.upgrade().unwrap_or_else(|| self.clone())
    }

    /// Job queue shared with the top-level realm
    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    /// Whether [`GlobalEnvironment::dispose`] ran
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------------
    // Current realm
    // ------------------------------------------------------------------------

    /// The realm currently entered on this realm's top-level realm
    pub fn current(self: &Arc<Self>) -> Arc<GlobalEnvironment> {
        let top = self.top_level();
        let entered = top.current.lock().as_ref().and_then(Weak::upgrade);
        entered.unwrap_or(top)
    }

    /// Make `realm` current until the returned scope drops.
    ///
    /// Panics unless called on a top-level realm, if `realm` was disposed, or
    /// if `realm` is another realm while the engine still assumes a single
    /// realm.
    pub fn enter(self: &Arc<Self>, realm: &Arc<GlobalEnvironment>) -> RealmScope {
        if !self.is_top_level() {
            tern_vm_core::invariant_violation!("realm {} is not a top-level realm", self.id);
        }
        if realm.is_disposed() {
            tern_vm_core::invariant_violation!("realm {} was disposed", realm.id);
        }
        if !Arc::ptr_eq(self, realm) && self.config.single_realm_guard().is_valid() {
            tern_vm_core::invariant_violation!(
                "entering realm {} while the single-realm guard holds",
                realm.id
            );
        }
        let previous = self.current();
        *self.current.lock() = Some(Arc::downgrade(realm));
        tracing::trace!(target: "tern::realm", from = previous.id, to = realm.id, "enter realm");
        RealmScope {
            top_level: self.clone(),
            previous: Some(previous),
        }
    }

    /// Restore `previous` as the current realm
    pub fn leave(&self, previous: Option<&Arc<GlobalEnvironment>>) {
        if !self.is_top_level() {
            tern_vm_core::invariant_violation!("realm {} is not a top-level realm", self.id);
        }
        *self.current.lock() = previous.map(Arc::downgrade);
    }

    // ------------------------------------------------------------------------
    // Global object
    // ------------------------------------------------------------------------

    /// The global object; `None` once disposed
    pub fn global_object(&self) -> Option<ObjectRef> {
        self.global_object.read().clone()
    }

    /// Value of `globalThis`; `None` once disposed
    pub fn global_this(&self) -> Option<ObjectRef> {
        self.global_this.read().clone()
    }

    /// Replace the global object
    pub fn set_global_object(&self, global: ObjectRef) {
        self.config
            .invalidate(GuardKind::GlobalObjectPristine, "Global object replaced");
        *self.global_object.write() = Some(global.clone());
        *self.global_this.write() = Some(global);
    }

    /// Program arguments as seen by scripts
    pub fn arguments(&self) -> Vec<String> {
        self.arguments.read().clone()
    }

    /// Store program arguments. Shell mode also exposes them as the global
    /// `arguments` array.
    pub fn set_arguments(&self, arguments: Vec<String>) {
        let options = self.config.options();
        if options.shell || options.nashorn_compat {
            if let Some(global) = self.global_object() {
                let values = arguments.iter().map(|a| Value::str(a)).collect();
                let array = JsObject::array(
                    self.config.shape_arena(),
                    self.intrinsics.get("Array.prototype").cloned(),
                    values,
                );
                global.define_data(
                    PropertyKey::string("arguments"),
                    Value::object(array),
                    PropertyAttributes::builtin(),
                );
            }
        }
        *self.arguments.write() = arguments;
    }

    // ------------------------------------------------------------------------
    // Module loader
    // ------------------------------------------------------------------------

    /// The realm's module loader, created by `factory` on first use
    pub fn get_or_create_module_loader<F>(&self, factory: F) -> Arc<dyn ModuleLoader>
    where
        F: FnOnce() -> Arc<dyn ModuleLoader>,
    {
        self.module_loader.get_or_create(factory)
    }

    // ------------------------------------------------------------------------
    // RegExp statics
    // ------------------------------------------------------------------------

    /// Record a successful exec for the legacy RegExp statics
    pub fn set_static_regex_result(
        &self,
        regex: RegexHandle,
        input: Arc<str>,
        from_index: usize,
        eager_result: impl FnOnce() -> RegexMatch,
    ) {
        let guard = self.config.guard(GuardKind::RegExpStaticResultUnused);
        self.statics.set(guard, regex, input, from_index, eager_result);
    }

    /// The last match, recomputed through the host's regex engine if needed
    pub fn get_static_regex_result(&self) -> VmResult<Arc<RegexMatch>> {
        let guard = self.config.guard(GuardKind::RegExpStaticResultUnused);
        self.statics.get(guard, self.host.regex_engine().map(|e| e.as_ref()))
    }

    /// Mark the statics stale until the next exec
    pub fn invalidate_static_regex_result(&self) {
        self.statics.invalidate();
    }

    /// The RegExp static state
    pub fn regexp_statics(&self) -> &Arc<RegExpStatics> {
        &self.statics
    }

    // ------------------------------------------------------------------------
    // Caches and time
    // ------------------------------------------------------------------------

    /// Per-realm caches
    pub fn caches(&self) -> &Arc<RealmCaches> {
        &self.caches
    }

    /// Compile through the realm's regex cache
    pub fn compile_regex(&self, pattern: &str, flags: &str) -> VmResult<RegexHandle> {
        let Some(engine) = self.host.regex_engine() else {
            return Err(VmError::configuration("No regex engine available"));
        };
        self.caches.regex.get_or_compile(engine.as_ref(), pattern, flags)
    }

    /// IANA id of the local time zone
    pub fn local_time_zone_id(&self) -> Arc<str> {
        self.caches.time_zone.id()
    }

    /// Change the local time zone; date formatters are rebuilt on next use
    pub fn set_local_time_zone(&self, id: &str) {
        self.caches.set_local_time_zone(id);
        tracing::debug!(
            target: "tern::realm",
            realm = self.id,
            zone = id,
            "local time zone changed"
        );
    }

    /// Local time zone adjustment at `epoch_ms`, in milliseconds
    pub fn local_tza(&self, epoch_ms: f64) -> f64 {
        self.caches.time_zone.local_tza(epoch_ms)
    }

    /// `Date.now()`
    pub fn current_time_millis(&self) -> f64 {
        self.caches
            .clock
            .current_time_millis(self.config.timer_resolution())
    }

    /// `Math.random()`
    pub fn random(&self) -> f64 {
        self.caches.random.next_f64()
    }

    // ------------------------------------------------------------------------
    // Child realms
    // ------------------------------------------------------------------------

    /// Live child realms, in creation order
    pub fn child_realms(&self) -> Vec<Arc<GlobalEnvironment>> {
        self.children.lock().iter().flatten().cloned().collect()
    }

    /// Child realm at `index`, unless removed
    pub fn child_realm(&self, index: usize) -> Option<Arc<GlobalEnvironment>> {
        self.children.lock().get(index).cloned().flatten()
    }

    /// Index of `realm` in the child list
    pub fn index_of_child(&self, realm: &GlobalEnvironment) -> Option<usize> {
        self.children
            .lock()
            .iter()
            .position(|c| c.as_ref().is_some_and(|c| std::ptr::eq(Arc::as_ptr(c), realm)))
    }

    /// Clear the child slot at `index`. Other indices are unaffected.
    pub fn remove_child(&self, index: usize) -> Option<Arc<GlobalEnvironment>> {
        self.children.lock().get_mut(index).and_then(Option::take)
    }

    // ------------------------------------------------------------------------
    // Disposal
    // ------------------------------------------------------------------------

    /// Tear the realm down. Child realms of a top-level realm go with it.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.global_object.write() = None;
        *self.global_this.write() = None;

        if let Some(top) = self.top_level.upgrade() {
            if !self.is_top_level() {
                if let Some(index) = top.index_of_child(self) {
                    top.remove_child(index);
                }
            }
        }
        let children: Vec<_> = self.children.lock().drain(..).flatten().collect();
        for child in children {
            child.dispose();
        }

        self.caches.clear();
        self.module_loader.clear();
        self.config.realm_registry().remove(self.id);
        tracing::debug!(target: "tern::realm", id = self.id, "realm disposed");
    }
}

impl fmt::Debug for GlobalEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalEnvironment")
            .field("id", &self.id)
            .field("top_level", &self.is_top_level())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// RAII guard returned by [`GlobalEnvironment::enter`].
/// Restores the previously current realm on drop.
pub struct RealmScope {
    top_level: Arc<GlobalEnvironment>,
    previous: Option<Arc<GlobalEnvironment>>,
}

impl RealmScope {
    /// The realm that was current before this scope
    pub fn previous(&self) -> Option<&Arc<GlobalEnvironment>> {
        self.previous.as_ref()
    }
}

impl Drop for RealmScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        // The top-level realm is stored as `None`.
        let previous = previous.filter(|p| !Arc::ptr_eq(p, &self.top_level));
        self.top_level.leave(previous.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EngineOptions;

    fn engine() -> Arc<EngineConfig> {
        EngineConfig::create(&EngineOptions::default(), None).unwrap()
    }

    #[test]
    fn test_registry() {
        let config = engine();
        let realm = GlobalEnvironment::create_top_level(&config, config.host()).unwrap();
        let registry = config.realm_registry();
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.get(realm.id()).unwrap(), &realm));
        realm.dispose();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_top_level_is_its_own_current() {
        let config = engine();
        let realm = GlobalEnvironment::create_top_level(&config, config.host()).unwrap();
        assert!(realm.is_top_level());
        assert!(Arc::ptr_eq(&realm.current(), &realm));
        assert!(Arc::ptr_eq(&realm.top_level(), &realm));
        assert!(config.is_single_realm());
        assert_eq!(config.realm_init_state(), 2);
    }

    #[test]
    fn test_global_object_replacement() {
        let config = engine();
        let realm = GlobalEnvironment::create_top_level(&config, config.host()).unwrap();
        assert!(config.is_valid(GuardKind::GlobalObjectPristine));
        let replacement = JsObject::ordinary(config.shape_arena(), None);
        realm.set_global_object(replacement.clone());
        assert!(!config.is_valid(GuardKind::GlobalObjectPristine));
        assert!(Arc::ptr_eq(&realm.global_object().unwrap(), &replacement));
        assert!(Arc::ptr_eq(&realm.global_this().unwrap(), &replacement));
    }
}

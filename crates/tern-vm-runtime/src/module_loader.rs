//! Module loader slot.
//!
//! Module resolution itself belongs to the embedder; the realm only keeps the
//! loader it was handed, creating it at most once.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use tern_vm_core::VmResult;

/// Opaque handle to a loaded module record
pub type ModuleHandle = Arc<dyn std::any::Any + Send + Sync>;

/// Host module resolution
pub trait ModuleLoader: Send + Sync {
    /// Resolve `specifier` relative to `referrer` and load the module
    fn load(&self, specifier: &str, referrer: Option<&str>) -> VmResult<ModuleHandle>;

    /// Loader name, for diagnostics
    fn name(&self) -> &str {
        "module-loader"
    }
}

/// Single-assignment loader slot
#[derive(Default)]
pub struct ModuleLoaderSlot {
    loader: Mutex<Option<Arc<dyn ModuleLoader>>>,
}

impl ModuleLoaderSlot {
    /// Empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// The loader, created with `factory` on first use.
    ///
    /// The lock is held while `factory` runs, so it runs at most once even
    /// when several threads ask concurrently.
    pub fn get_or_create<F>(&self, factory: F) -> Arc<dyn ModuleLoader>
    where
        F: FnOnce() -> Arc<dyn ModuleLoader>,
    {
        let mut slot = self.loader.lock();
        slot.get_or_insert_with(factory).clone()
    }

    /// The loader, if one was created
    pub fn get(&self) -> Option<Arc<dyn ModuleLoader>> {
        self.loader.lock().clone()
    }

    /// Drop the loader
    pub fn clear(&self) {
        *self.loader.lock() = None;
    }
}

impl fmt::Debug for ModuleLoaderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.loader.lock().as_ref().map(|l| l.name().to_string());
        f.debug_struct("ModuleLoaderSlot").field("loader", &name).finish()
    }
}

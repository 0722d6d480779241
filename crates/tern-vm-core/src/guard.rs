//! Speculation guards.
//!
//! A guard names a global invariant ("only one realm exists", "the array
//! prototype has no indexed elements") that fast paths rely on. It starts
//! out valid and is invalidated at most once; readers branch on it every
//! time. The only way back to valid is [`SpeculationGuard::reset_for_patch`],
//! used when a pre-built engine is re-attached to a new host.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// One-way invalidatable latch
pub struct SpeculationGuard {
    name: &'static str,
    valid: AtomicBool,
    epoch: AtomicU32,
}

impl SpeculationGuard {
    /// New guard, initially valid
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            valid: AtomicBool::new(true),
            epoch: AtomicU32::new(0),
        }
    }

    /// Guard name, used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the guarded invariant still holds
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Number of times this guard has been invalidated over its lifetime.
    ///
    /// Only grows; a patch reset does not rewind it, so a consumer that
    /// recorded the epoch can tell it was compiled against an older state.
    pub fn epoch(&self) -> u32 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Invalidate the guard.
    ///
    /// Returns `true` if this call performed the transition. Later calls are
    /// no-ops and return `false`.
    pub fn invalidate(&self, reason: &str) -> bool {
        if !self.valid.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.epoch.fetch_add(1, Ordering::AcqRel);
        #[cfg(feature = "guard_logging")]
        tracing::debug!(target: "tern::guard", guard = self.name, reason, "guard invalidated");
        #[cfg(not(feature = "guard_logging"))]
        let _ = reason;
        true
    }

    /// Make the guard valid again. Only the snapshot patch path may call this.
    #[doc(hidden)]
    pub fn reset_for_patch(&self) {
        self.valid.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for SpeculationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeculationGuard")
            .field("name", &self.name)
            .field("valid", &self.is_valid())
            .field("epoch", &self.epoch())
            .finish()
    }
}

/// Generation counter for values that may legitimately change.
///
/// Code specialized on a value records [`CyclicGuard::generation`]; a change
/// bumps the generation, which is the same as installing a fresh valid guard
/// while leaving every older snapshot invalid.
pub struct CyclicGuard {
    name: &'static str,
    generation: AtomicU32,
}

impl CyclicGuard {
    /// New cyclic guard at generation 0
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            generation: AtomicU32::new(0),
        }
    }

    /// Guard name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current generation
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether a snapshot taken at `generation` is still current
    #[inline]
    pub fn is_valid_at(&self, generation: u32) -> bool {
        self.generation() == generation
    }

    /// Invalidate every outstanding snapshot. Returns the new generation.
    pub fn invalidate(&self, reason: &str) -> u32 {
        let next = self.generation.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        #[cfg(feature = "guard_logging")]
        tracing::debug!(
            target: "tern::guard",
            guard = self.name,
            generation = next,
            reason,
            "cyclic guard bumped"
        );
        #[cfg(not(feature = "guard_logging"))]
        let _ = reason;
        next
    }
}

impl std::fmt::Debug for CyclicGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CyclicGuard")
            .field("name", &self.name)
            .field("generation", &self.generation())
            .finish()
    }
}

//! The engine's speculation guards.
//!
//! Most guards are flipped from inside the object model: the engine installs
//! a [`GuardObserver`] on its shape arena, and every object reports the
//! structural changes those guards speculate against. `SingleRealm`,
//! `NoChildRealms`, `GlobalObjectPristine` and `RegExpStaticResultUnused`
//! are flipped by realm bookkeeping, and `TypedArrayNotDetached` by whatever
//! detaches a buffer, through [`EngineConfig::invalidate`].
//!
//! [`EngineConfig::invalidate`]: crate::EngineConfig::invalidate

use std::fmt;
use std::sync::Arc;

use tern_vm_core::{
    CyclicGuard, JsObject, ObjectKind, ObjectObserver, PropertyKey, SpeculationGuard,
};

macro_rules! guard_kinds {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Global invariants the engine speculates on
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum GuardKind {
            $(
                #[doc = $name]
                $variant,
            )+
        }

        impl GuardKind {
            /// Every kind, in storage order
            pub const ALL: &'static [GuardKind] = &[$(Self::$variant),+];

            /// Number of kinds
            pub const COUNT: usize = Self::ALL.len();

            /// Human-readable invariant
            pub fn description(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }
    };
}

guard_kinds! {
    NoSuchPropertyUnused => "The global object has no __noSuchProperty__ hook",
    NoSuchMethodUnused => "No object has a __noSuchMethod__ hook",
    ArrayPrototypeNoElements => "Array.prototype has no indexed elements",
    FastArray => "Array instances use the fast element layout",
    FastArgumentsObject => "Arguments objects use the fast layout",
    TypedArrayNotDetached => "No ArrayBuffer has been detached",
    RegExpStaticResultUnused => "RegExp static result properties were never read",
    GlobalObjectPristine => "The global object was never replaced",
    SingleRealm => "Only one realm was ever created",
    NoChildRealms => "No child realm was ever created",
}

impl GuardKind {
    #[inline]
    fn index(self) -> usize {
        self as u8 as usize
    }
}

impl fmt::Display for GuardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// One guard per [`GuardKind`]
pub struct GuardSet {
    guards: Box<[SpeculationGuard]>,
}

impl GuardSet {
    /// All guards valid
    pub fn new() -> Self {
        Self {
            guards: GuardKind::ALL
                .iter()
                .map(|kind| SpeculationGuard::new(kind.description()))
                .collect(),
        }
    }

    /// The guard for `kind`
    #[inline]
    pub fn guard(&self, kind: GuardKind) -> &SpeculationGuard {
        &self.guards[kind.index()]
    }

    /// Whether `kind` still holds
    #[inline]
    pub fn is_valid(&self, kind: GuardKind) -> bool {
        self.guard(kind).is_valid()
    }

    /// Invalidate `kind`. Returns `true` for the call that flipped it.
    pub fn invalidate(&self, kind: GuardKind, reason: &str) -> bool {
        self.guard(kind).invalidate(reason)
    }

    /// Kinds that no longer hold
    pub fn invalidated(&self) -> Vec<GuardKind> {
        GuardKind::ALL
            .iter()
            .copied()
            .filter(|k| !self.is_valid(*k))
            .collect()
    }

    pub(crate) fn reset_all(&self) {
        for guard in self.guards.iter() {
            guard.reset_for_patch();
        }
    }
}

impl Default for GuardSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GuardSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(GuardKind::ALL.iter().map(|k| (k, self.is_valid(*k))))
            .finish()
    }
}

const NO_SUCH_PROPERTY: &str = "__noSuchProperty__";
const NO_SUCH_METHOD: &str = "__noSuchMethod__";

/// Flips guards when objects of the engine's arena change shape
pub(crate) struct GuardObserver {
    guards: Arc<GuardSet>,
}

impl GuardObserver {
    pub(crate) fn new(guards: Arc<GuardSet>) -> Self {
        Self { guards }
    }
}

impl ObjectObserver for GuardObserver {
    fn property_added(&self, obj: &JsObject, key: &PropertyKey) {
        match key {
            PropertyKey::Index(_) if obj.is_element_guarded() => {
                self.guards.invalidate(
                    GuardKind::ArrayPrototypeNoElements,
                    "Indexed element added to an intrinsic prototype",
                );
            }
            PropertyKey::String(name) => match name.as_str() {
                NO_SUCH_METHOD => {
                    self.guards
                        .invalidate(GuardKind::NoSuchMethodUnused, "__noSuchMethod__ defined");
                }
                NO_SUCH_PROPERTY if matches!(obj.kind(), ObjectKind::Global) => {
                    self.guards.invalidate(
                        GuardKind::NoSuchPropertyUnused,
                        "__noSuchProperty__ defined on the global object",
                    );
                }
                _ => {}
            },
            _ => {}
        }
    }

    fn entered_dictionary_mode(&self, obj: &JsObject) {
        match obj.kind() {
            ObjectKind::Array => {
                self.guards
                    .invalidate(GuardKind::FastArray, "Array left the fast layout");
            }
            ObjectKind::Arguments => {
                self.guards.invalidate(
                    GuardKind::FastArgumentsObject,
                    "Arguments object left the fast layout",
                );
            }
            _ => {}
        }
    }
}

/// Cyclic guards over the patchable options
#[derive(Debug)]
pub struct OptionGuards {
    /// `array-sort-inherited`
    pub array_sort_inherited: CyclicGuard,
    /// `v8-compat`
    pub v8_compat: CyclicGuard,
    /// `direct-byte-buffer`
    pub direct_byte_buffer: CyclicGuard,
    /// `timer-resolution`
    pub timer_resolution: CyclicGuard,
}

impl OptionGuards {
    /// Every guard at generation 0
    pub const fn new() -> Self {
        Self {
            array_sort_inherited: CyclicGuard::new("array-sort-inherited"),
            v8_compat: CyclicGuard::new("v8-compat"),
            direct_byte_buffer: CyclicGuard::new("direct-byte-buffer"),
            timer_resolution: CyclicGuard::new("timer-resolution"),
        }
    }
}

impl Default for OptionGuards {
    fn default() -> Self {
        Self::new()
    }
}

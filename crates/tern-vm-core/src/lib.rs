//! # Tern VM Core
//!
//! Value model and abstract operations for the Tern ECMAScript engine.
//!
//! ## Design Principles
//!
//! - **Thread-safe**: values are `Send + Sync`; objects are shared through `Arc`
//! - **Hidden classes**: shapes live in an index-addressed arena with
//!   hash-consed transitions
//! - **Spec-exact coercions**: `ToPrimitive`, `ToNumber`, `ToString` and the
//!   equality ladder follow ECMA-262 step by step
//! - **One-way guards**: fast-path assumptions are atomic latches

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod convert;
pub mod error;
pub mod foreign;
pub mod guard;
pub mod number;
pub mod object;
pub mod property_order;
pub mod shape;
pub mod string;
pub mod value;

pub use convert::PreferredType;
pub use error::{VmError, VmResult};
pub use foreign::{ForeignRef, ForeignValue};
pub use guard::{CyclicGuard, SpeculationGuard};
pub use object::{JsObject, ObjectKind, ObjectObserver, ObjectRef, PropertyAttributes, PropertyKey};
pub use shape::{ShapeArena, ShapeId};
pub use string::JsString;
pub use value::{Symbol, Value};

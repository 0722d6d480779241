//! Host-interop values.
//!
//! A foreign value is a handle to something living outside the engine's own
//! object model. The core never looks inside it; it only asks the questions
//! the abstract operations need: is it null, does it box a primitive, and can
//! it run its `toString`/`valueOf` members.

use std::fmt;
use std::sync::Arc;

use crate::error::VmResult;
use crate::value::Value;

/// Opaque host-interop handle
pub trait ForeignValue: Send + Sync + fmt::Debug {
    /// Whether the host considers this value null
    fn is_null(&self) -> bool {
        false
    }

    /// The primitive this value boxes (host string, number or boolean)
    fn unbox(&self) -> Option<Value> {
        None
    }

    /// Invoke an executable member with no arguments.
    ///
    /// Returns `None` when the member does not exist or is not executable.
    fn invoke_member(&self, _name: &str) -> Option<VmResult<Value>> {
        None
    }

    /// Host type name, used in error messages
    fn type_name(&self) -> &str {
        "object"
    }

    /// `typeof` result for a non-null foreign value
    fn type_of(&self) -> &'static str {
        "object"
    }
}

/// Shared handle to a foreign value
pub type ForeignRef = Arc<dyn ForeignValue>;

/// Identity comparison of two foreign handles
pub fn is_identical(a: &ForeignRef, b: &ForeignRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Unbox a foreign value to the primitive it stands for.
///
/// Host null maps to `Null`; a boxed primitive maps to itself; everything
/// else has no primitive.
pub fn to_primitive_or_none(value: &ForeignRef) -> Option<Value> {
    if value.is_null() {
        Some(Value::Null)
    } else {
        value.unbox()
    }
}

/// The host's null value
#[derive(Debug, Default, Clone, Copy)]
pub struct ForeignNull;

impl ForeignValue for ForeignNull {
    fn is_null(&self) -> bool {
        true
    }

    fn type_name(&self) -> &str {
        "null"
    }
}

/// A host-boxed primitive (for example a host string or number)
#[derive(Debug, Clone)]
pub struct BoxedPrimitive(pub Value);

impl ForeignValue for BoxedPrimitive {
    fn unbox(&self) -> Option<Value> {
        Some(self.0.clone())
    }

    fn type_name(&self) -> &str {
        "boxed primitive"
    }
}

//! VM error types

use thiserror::Error;

/// Errors surfaced by the engine core.
///
/// `TypeError` and `RangeError` travel the normal return path up to the
/// interpreter's exception mechanism. `ConfigurationError` only ever comes
/// out of engine or realm construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VmError {
    /// Type error (invalid coercion, calling a non-callable)
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Range error (length limits, invalid index)
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Syntax error from a string parse (`BigInt("1.5")`)
    #[error("SyntaxError: {0}")]
    SyntaxError(String),

    /// Fatal configuration error raised while building an engine or realm
    #[error("ConfigurationError: {0}")]
    ConfigurationError(String),

    /// Internal error reported by a host collaborator
    #[error("InternalError: {0}")]
    InternalError(String),
}

impl VmError {
    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a range error
    pub fn range_error(msg: impl Into<String>) -> Self {
        Self::RangeError(msg.into())
    }

    /// Create a syntax error
    pub fn syntax_error(msg: impl Into<String>) -> Self {
        Self::SyntaxError(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Whether this is a `TypeError`
    pub fn is_type_error(&self) -> bool {
        matches!(self, Self::TypeError(_))
    }

    /// Whether this is a `RangeError`
    pub fn is_range_error(&self) -> bool {
        matches!(self, Self::RangeError(_))
    }

    /// Whether this is a `SyntaxError`
    pub fn is_syntax_error(&self) -> bool {
        matches!(self, Self::SyntaxError(_))
    }

    /// Whether this is a `ConfigurationError`
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::ConfigurationError(_))
    }

    /// The message without the error-kind prefix
    pub fn message(&self) -> &str {
        match self {
            Self::TypeError(m)
            | Self::RangeError(m)
            | Self::SyntaxError(m)
            | Self::ConfigurationError(m)
            | Self::InternalError(m) => m,
        }
    }
}

/// Result type for VM operations
pub type VmResult<T> = std::result::Result<T, VmError>;

/// Abort on a broken internal invariant.
///
/// These indicate a bug in the engine core itself; continuing would risk
/// silently wrong results, so they panic instead of returning an error.
#[macro_export]
macro_rules! invariant_violation {
    ($($arg:tt)*) => {
        panic!("internal invariant violated: {}", format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            VmError::type_error("x is not a function").to_string(),
            "TypeError: x is not a function"
        );
        assert_eq!(
            VmError::range_error("Invalid string length").to_string(),
            "RangeError: Invalid string length"
        );
        assert_eq!(
            VmError::configuration("no backend").to_string(),
            "ConfigurationError: no backend"
        );
    }

    #[test]
    fn test_error_kind_predicates() {
        let err = VmError::type_error("boom");
        assert!(err.is_type_error());
        assert!(!err.is_range_error());
        assert_eq!(err.message(), "boom");
        assert!(VmError::configuration("c").is_configuration_error());
    }

    #[test]
    #[should_panic(expected = "internal invariant violated: bad state 3")]
    fn test_invariant_violation_panics() {
        invariant_violation!("bad state {}", 3);
    }
}

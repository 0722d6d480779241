//! JavaScript value representation
//!
//! `Value` is a closed tagged union over the ECMAScript language types plus
//! a handle for host-interop values. Numbers have two representations:
//! `Int32` is used whenever the double is exactly an `i32` and is not `-0`,
//! `Number` otherwise. Both are the single ECMAScript Number type and every
//! abstract operation treats them the same way.

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use crate::foreign::ForeignRef;
use crate::object::ObjectRef;
use crate::string::JsString;

/// A JavaScript value
#[derive(Clone)]
pub enum Value {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Boolean(bool),
    /// Number stored as a 32-bit integer
    Int32(i32),
    /// Number stored as a double
    Number(f64),
    /// Arbitrary precision integer
    BigInt(Arc<BigInt>),
    /// String
    String(Arc<JsString>),
    /// Symbol
    Symbol(Arc<Symbol>),
    /// Object owned by the engine heap
    Object(ObjectRef),
    /// Opaque host-interop value
    Foreign(ForeignRef),
}

/// Coarse value kind, used in error messages and dispatch tables
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Boolean,
    /// Number (either representation)
    Number,
    /// BigInt
    BigInt,
    /// String
    String,
    /// Symbol
    Symbol,
    /// Engine object
    Object,
    /// Host-interop value
    Foreign,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::BigInt => "bigint",
            Self::String => "string",
            Self::Symbol => "symbol",
            Self::Object => "object",
            Self::Foreign => "foreign",
        })
    }
}

/// Result of `ToNumeric`
#[derive(Clone, Debug)]
pub enum Numeric {
    /// A Number
    Number(f64),
    /// A BigInt
    BigInt(Arc<BigInt>),
}

impl Numeric {
    /// As a Number, rounding BigInts to the nearest double
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Number(n) => *n,
            Self::BigInt(b) => b.to_f64().unwrap_or(f64::NAN),
        }
    }
}

impl Value {
    /// `undefined`
    #[inline]
    pub const fn undefined() -> Self {
        Self::Undefined
    }

    /// `null`
    #[inline]
    pub const fn null() -> Self {
        Self::Null
    }

    /// A boolean
    #[inline]
    pub const fn boolean(b: bool) -> Self {
        Self::Boolean(b)
    }

    /// An int32 number
    #[inline]
    pub const fn int32(n: i32) -> Self {
        Self::Int32(n)
    }

    /// A number, normalized to `Int32` when exactly representable and not `-0`
    pub fn number(n: f64) -> Self {
        let i = n as i32;
        if i as f64 == n && !(i == 0 && n.is_sign_negative()) {
            Self::Int32(i)
        } else {
            Self::Number(n)
        }
    }

    /// A BigInt
    pub fn bigint(n: impl Into<BigInt>) -> Self {
        Self::BigInt(Arc::new(n.into()))
    }

    /// A string value
    pub fn string(s: Arc<JsString>) -> Self {
        Self::String(s)
    }

    /// A fresh (non-interned) string value from a str slice
    pub fn str(s: &str) -> Self {
        Self::String(JsString::new(s))
    }

    /// A symbol value
    pub fn symbol(sym: Arc<Symbol>) -> Self {
        Self::Symbol(sym)
    }

    /// An object value
    pub fn object(obj: ObjectRef) -> Self {
        Self::Object(obj)
    }

    /// A host-interop value
    pub fn foreign(handle: ForeignRef) -> Self {
        Self::Foreign(handle)
    }

    /// The coarse kind of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Undefined => ValueKind::Undefined,
            Self::Null => ValueKind::Null,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Int32(_) | Self::Number(_) => ValueKind::Number,
            Self::BigInt(_) => ValueKind::BigInt,
            Self::String(_) => ValueKind::String,
            Self::Symbol(_) => ValueKind::Symbol,
            Self::Object(_) => ValueKind::Object,
            Self::Foreign(_) => ValueKind::Foreign,
        }
    }

    /// Is `undefined`
    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Is `null`
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Is `undefined` or `null`
    #[inline]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Is a boolean
    #[inline]
    pub fn is_boolean(&self) -> bool {
        matches!(self, Self::Boolean(_))
    }

    /// Boolean payload
    #[inline]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Is a Number (either representation)
    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Int32(_) | Self::Number(_))
    }

    /// Number payload as a double
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int32(i) => Some(*i as f64),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Int32 payload (only for the `Int32` representation)
    #[inline]
    pub fn as_int32(&self) -> Option<i32> {
        match self {
            Self::Int32(i) => Some(*i),
            _ => None,
        }
    }

    /// Is `-0`
    pub fn is_negative_zero(&self) -> bool {
        matches!(self, Self::Number(n) if *n == 0.0 && n.is_sign_negative())
    }

    /// Is a BigInt
    #[inline]
    pub fn is_bigint(&self) -> bool {
        matches!(self, Self::BigInt(_))
    }

    /// BigInt payload
    pub fn as_bigint(&self) -> Option<&Arc<BigInt>> {
        match self {
            Self::BigInt(b) => Some(b),
            _ => None,
        }
    }

    /// Is a string
    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// String payload
    pub fn as_string(&self) -> Option<&Arc<JsString>> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Is a symbol
    #[inline]
    pub fn is_symbol(&self) -> bool {
        matches!(self, Self::Symbol(_))
    }

    /// Symbol payload
    pub fn as_symbol(&self) -> Option<&Arc<Symbol>> {
        match self {
            Self::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Is an engine object
    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Object payload
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Is a host-interop value
    #[inline]
    pub fn is_foreign(&self) -> bool {
        matches!(self, Self::Foreign(_))
    }

    /// Host-interop payload
    pub fn as_foreign(&self) -> Option<&ForeignRef> {
        match self {
            Self::Foreign(f) => Some(f),
            _ => None,
        }
    }

    /// Whether this is an ECMAScript primitive (neither object nor foreign)
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::Object(_) | Self::Foreign(_))
    }

    /// `typeof` result
    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "object",
            Self::Boolean(_) => "boolean",
            Self::Int32(_) | Self::Number(_) => "number",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Object(o) => {
                if o.is_callable() {
                    "function"
                } else {
                    "object"
                }
            }
            Self::Foreign(f) => {
                if f.is_null() {
                    "object"
                } else {
                    f.type_of()
                }
            }
        }
    }

    /// Short display form used in error messages. Never calls user code.
    pub fn describe(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Int32(i) => i.to_string(),
            Self::Number(n) => crate::number::number_to_string(*n),
            Self::BigInt(b) => format!("{b}n"),
            Self::String(s) => format!("\"{}\"", s.as_str()),
            Self::Symbol(s) => s.descriptive_string(),
            Self::Object(o) => o.describe(),
            Self::Foreign(f) => format!("[foreign {}]", f.type_name()),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Undefined
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int32(i) => write!(f, "Int32({i})"),
            Self::Number(n) => write!(f, "Number({n:?})"),
            _ => f.write_str(&self.describe()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int32(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::str(s)
    }
}

impl From<Arc<JsString>> for Value {
    fn from(s: Arc<JsString>) -> Self {
        Self::String(s)
    }
}

// ---------------------------------------------------------------------------
// Symbols
// ---------------------------------------------------------------------------

/// Identity-unique symbol. Equality and hashing use the id only.
pub struct Symbol {
    id: u64,
    description: Option<Arc<JsString>>,
    private: bool,
}

static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(well_known::FIRST_USER_ID);

impl Symbol {
    /// Create a new unique symbol
    pub fn new(description: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed),
            description: description.map(JsString::intern),
            private: false,
        })
    }

    /// Create a new private symbol (never exposed through reflection)
    pub fn new_private(description: &str) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed),
            description: Some(JsString::intern(description)),
            private: true,
        })
    }

    /// Unique id
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Description, if any
    pub fn description(&self) -> Option<&Arc<JsString>> {
        self.description.as_ref()
    }

    /// Whether this is a private symbol
    pub fn is_private(&self) -> bool {
        self.private
    }

    /// `SymbolDescriptiveString`
    pub fn descriptive_string(&self) -> String {
        match &self.description {
            Some(d) => format!("Symbol({})", d.as_str()),
            None => "Symbol()".to_string(),
        }
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.descriptive_string(), self.id)
    }
}

/// Well-known symbols with fixed ids.
pub mod well_known {
    use super::*;

    /// `Symbol.iterator`
    pub const ITERATOR: u64 = 1;
    /// `Symbol.asyncIterator`
    pub const ASYNC_ITERATOR: u64 = 2;
    /// `Symbol.toStringTag`
    pub const TO_STRING_TAG: u64 = 3;
    /// `Symbol.hasInstance`
    pub const HAS_INSTANCE: u64 = 4;
    /// `Symbol.toPrimitive`
    pub const TO_PRIMITIVE: u64 = 5;
    /// `Symbol.isConcatSpreadable`
    pub const IS_CONCAT_SPREADABLE: u64 = 6;
    /// `Symbol.match`
    pub const MATCH: u64 = 7;
    /// `Symbol.matchAll`
    pub const MATCH_ALL: u64 = 8;
    /// `Symbol.replace`
    pub const REPLACE: u64 = 9;
    /// `Symbol.search`
    pub const SEARCH: u64 = 10;
    /// `Symbol.split`
    pub const SPLIT: u64 = 11;
    /// `Symbol.species`
    pub const SPECIES: u64 = 12;
    /// `Symbol.unscopables`
    pub const UNSCOPABLES: u64 = 13;

    /// First id handed out to user symbols
    pub const FIRST_USER_ID: u64 = 64;

    const NAMES: [&str; 13] = [
        "Symbol.iterator",
        "Symbol.asyncIterator",
        "Symbol.toStringTag",
        "Symbol.hasInstance",
        "Symbol.toPrimitive",
        "Symbol.isConcatSpreadable",
        "Symbol.match",
        "Symbol.matchAll",
        "Symbol.replace",
        "Symbol.search",
        "Symbol.split",
        "Symbol.species",
        "Symbol.unscopables",
    ];

    static SYMBOLS: LazyLock<Vec<Arc<Symbol>>> = LazyLock::new(|| {
        NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| {
                Arc::new(Symbol {
                    id: i as u64 + 1,
                    description: Some(JsString::intern(name)),
                    private: false,
                })
            })
            .collect()
    });

    /// Look up a well-known symbol by id
    pub fn get(id: u64) -> Option<Arc<Symbol>> {
        id.checked_sub(1)
            .and_then(|i| SYMBOLS.get(i as usize))
            .cloned()
    }

    /// All well-known symbols in id order
    pub fn all() -> &'static [Arc<Symbol>] {
        &SYMBOLS
    }

    /// `Symbol.toPrimitive`
    pub fn to_primitive() -> Arc<Symbol> {
        SYMBOLS[(TO_PRIMITIVE - 1) as usize].clone()
    }

    /// `Symbol.iterator`
    pub fn iterator() -> Arc<Symbol> {
        SYMBOLS[(ITERATOR - 1) as usize].clone()
    }

    /// `Symbol.toStringTag`
    pub fn to_string_tag() -> Arc<Symbol> {
        SYMBOLS[(TO_STRING_TAG - 1) as usize].clone()
    }
}

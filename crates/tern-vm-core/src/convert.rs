//! Abstract operations on values: type coercion and equality.
//!
//! Everything here is a pure function of its arguments except for the user
//! call-outs made by `ToPrimitive` (`@@toPrimitive`, `valueOf`, `toString`).
//! Those call-outs may mutate the very object being converted, so nothing
//! read before a call is trusted after it.

use num_bigint::BigInt;
use num_traits::{FromPrimitive, Zero};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{VmError, VmResult};
use crate::foreign::{self, ForeignRef};
use crate::number;
use crate::object::{ObjectKind, ObjectRef, PropertyKey};
use crate::string::{JsString, well_known as strings};
use crate::value::{Numeric, Value, well_known};

pub use crate::number::{
    array_index_of_str, is_js_whitespace, number_to_string, number_to_string_radix,
    string_to_bigint, string_to_number, trim_js_whitespace,
};

/// Hint passed to `ToPrimitive`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreferredType {
    /// No preference (`"default"`)
    Default,
    /// Prefer a Number (`"number"`)
    Number,
    /// Prefer a String (`"string"`)
    String,
}

impl PreferredType {
    fn hint_string(self) -> Arc<JsString> {
        match self {
            Self::Default => strings::DEFAULT.clone(),
            Self::Number => strings::NUMBER.clone(),
            Self::String => strings::STRING.clone(),
        }
    }

    /// Method names tried by `OrdinaryToPrimitive`, in order
    fn method_order(self) -> [&'static str; 2] {
        match self {
            Self::String => ["toString", "valueOf"],
            Self::Default | Self::Number => ["valueOf", "toString"],
        }
    }
}

const NO_PRIMITIVE: &str = "Cannot convert object to primitive value";

// ============================================================================
// ToPrimitive
// ============================================================================

/// `ToPrimitive(input, preferredType)`
pub fn to_primitive(value: &Value, hint: PreferredType) -> VmResult<Value> {
    match value {
        Value::Object(obj) => object_to_primitive(obj, hint),
        Value::Foreign(f) => foreign_to_primitive(f, hint),
        _ => Ok(value.clone()),
    }
}

fn object_to_primitive(obj: &ObjectRef, hint: PreferredType) -> VmResult<Value> {
    let exotic = obj.get(&PropertyKey::Symbol(well_known::to_primitive()))?;
    if !exotic.is_nullish() {
        let Some(method) = exotic.as_object().filter(|m| m.is_callable()) else {
            return Err(VmError::type_error(format!(
                "{} is not a function",
                exotic.describe()
            )));
        };
        let result = method.call(
            &Value::Object(obj.clone()),
            &[Value::String(hint.hint_string())],
        )?;
        if !result.is_primitive() {
            return Err(VmError::type_error(NO_PRIMITIVE));
        }
        return Ok(result);
    }
    ordinary_to_primitive(obj, hint)
}

/// `OrdinaryToPrimitive(O, hint)`
pub fn ordinary_to_primitive(obj: &ObjectRef, hint: PreferredType) -> VmResult<Value> {
    let this = Value::Object(obj.clone());
    for name in hint.method_order() {
        // Re-read on every iteration: the previous call may have replaced it.
        let method = obj.get(&PropertyKey::string(name))?;
        if let Some(f) = method.as_object().filter(|m| m.is_callable()) {
            let result = f.call(&this, &[])?;
            if result.is_primitive() {
                return Ok(result);
            }
        }
    }
    Err(VmError::type_error(NO_PRIMITIVE))
}

fn foreign_to_primitive(value: &ForeignRef, hint: PreferredType) -> VmResult<Value> {
    if let Some(prim) = foreign::to_primitive_or_none(value) {
        return Ok(prim);
    }
    for name in hint.method_order() {
        if let Some(result) = value.invoke_member(name) {
            let result = result?;
            if result.is_primitive() {
                return Ok(result);
            }
        }
    }
    Err(VmError::type_error(NO_PRIMITIVE))
}

// ============================================================================
// ToBoolean
// ============================================================================

/// `ToBoolean`. Total; never calls user code.
pub fn to_boolean(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null => false,
        Value::Boolean(b) => *b,
        Value::Int32(i) => *i != 0,
        Value::Number(n) => !(n.is_nan() || *n == 0.0),
        Value::BigInt(b) => !b.is_zero(),
        Value::String(s) => !s.is_empty(),
        Value::Symbol(_) | Value::Object(_) => true,
        Value::Foreign(f) => match foreign::to_primitive_or_none(f) {
            Some(prim) => to_boolean(&prim),
            None => true,
        },
    }
}

// ============================================================================
// ToNumber / ToNumeric
// ============================================================================

/// `ToNumber`
pub fn to_number(value: &Value) -> VmResult<f64> {
    match value {
        Value::Int32(i) => Ok(*i as f64),
        Value::Number(n) => Ok(*n),
        Value::Object(_) | Value::Foreign(_) => {
            to_number_from_primitive(&to_primitive(value, PreferredType::Number)?)
        }
        _ => to_number_from_primitive(value),
    }
}

/// `ToNumber` on a value already known to be primitive
pub fn to_number_from_primitive(value: &Value) -> VmResult<f64> {
    match value {
        Value::Undefined => Ok(f64::NAN),
        Value::Null => Ok(0.0),
        Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Int32(i) => Ok(*i as f64),
        Value::Number(n) => Ok(*n),
        Value::String(s) => Ok(string_to_number(s.as_str())),
        Value::Symbol(_) => Err(VmError::type_error(
            "Cannot convert a Symbol value to a number",
        )),
        Value::BigInt(_) => Err(VmError::type_error(
            "Cannot convert a BigInt value to a number",
        )),
        Value::Object(_) | Value::Foreign(_) => {
            crate::invariant_violation!("to_number_from_primitive called on {}", value.kind())
        }
    }
}

/// `ToNumber` returning a normalized `Value` (Int32 when possible)
pub fn to_number_value(value: &Value) -> VmResult<Value> {
    match value {
        Value::Int32(_) | Value::Number(_) => Ok(value.clone()),
        _ => Ok(Value::number(to_number(value)?)),
    }
}

/// `ToNumeric`: like `ToNumber` but BigInts pass through
pub fn to_numeric(value: &Value) -> VmResult<Numeric> {
    let prim = to_primitive(value, PreferredType::Number)?;
    match prim {
        Value::BigInt(b) => Ok(Numeric::BigInt(b)),
        other => Ok(Numeric::Number(to_number_from_primitive(&other)?)),
    }
}

/// `ToBigInt`. Numbers are rejected; `BigInt(n)` goes through
/// [`number_to_bigint`] first.
pub fn to_bigint(value: &Value) -> VmResult<Arc<BigInt>> {
    match to_primitive(value, PreferredType::Number)? {
        Value::BigInt(b) => Ok(b),
        Value::Boolean(b) => Ok(Arc::new(BigInt::from(b as u8))),
        Value::String(s) => string_to_bigint(s.as_str())
            .map(Arc::new)
            .ok_or_else(|| {
                VmError::syntax_error(format!("Cannot convert {} to a BigInt", s.as_str()))
            }),
        other => Err(VmError::type_error(format!(
            "Cannot convert {} to a BigInt",
            other.describe()
        ))),
    }
}

/// `NumberToBigInt`: `RangeError` unless `n` is a finite integer
pub fn number_to_bigint(n: f64) -> VmResult<BigInt> {
    if n.is_finite() && n.fract() == 0.0 {
        if let Some(b) = BigInt::from_f64(n) {
            return Ok(b);
        }
    }
    Err(VmError::range_error(format!(
        "The number {} cannot be converted to a BigInt because it is not an integer",
        number::number_to_string(n)
    )))
}

/// `ToIntegerOrInfinity`
pub fn to_integer_or_infinity(value: &Value) -> VmResult<f64> {
    Ok(number::to_integer_or_infinity(to_number(value)?))
}

/// `ToInt32`
pub fn to_int32(value: &Value) -> VmResult<i32> {
    match value {
        Value::Int32(i) => Ok(*i),
        _ => Ok(number::to_int32(to_number(value)?)),
    }
}

/// `ToUint32`
pub fn to_uint32(value: &Value) -> VmResult<u32> {
    match value {
        Value::Int32(i) => Ok(*i as u32),
        _ => Ok(number::to_uint32(to_number(value)?)),
    }
}

/// `ToUint16`
pub fn to_uint16(value: &Value) -> VmResult<u16> {
    Ok(number::to_uint16(to_number(value)?))
}

/// `ToLength`
pub fn to_length(value: &Value) -> VmResult<f64> {
    Ok(number::to_length(to_number(value)?))
}

/// `ToIndex`. `RangeError` outside `[0, 2^53 - 1]`.
pub fn to_index(value: &Value) -> VmResult<u64> {
    if value.is_undefined() {
        return Ok(0);
    }
    let integer = to_integer_or_infinity(value)?;
    if !(0.0..=number::MAX_SAFE_INTEGER).contains(&integer) {
        return Err(VmError::range_error(format!(
            "Invalid index: {}",
            number_to_string(integer)
        )));
    }
    Ok(integer as u64)
}

// ============================================================================
// ToString / ToPropertyKey
// ============================================================================

/// `ToString`
pub fn to_string(value: &Value) -> VmResult<Arc<JsString>> {
    match value {
        Value::Undefined => Ok(strings::UNDEFINED.clone()),
        Value::Null => Ok(strings::NULL.clone()),
        Value::Boolean(true) => Ok(strings::TRUE.clone()),
        Value::Boolean(false) => Ok(strings::FALSE.clone()),
        Value::Int32(i) => {
            let mut buf = itoa::Buffer::new();
            Ok(JsString::new(buf.format(*i)))
        }
        Value::Number(n) => Ok(number_to_js_string(*n)),
        Value::BigInt(b) => Ok(JsString::new(b.to_string())),
        Value::String(s) => Ok(s.clone()),
        Value::Symbol(_) => Err(VmError::type_error(
            "Cannot convert a Symbol value to a string",
        )),
        Value::Object(_) | Value::Foreign(_) => {
            to_string(&to_primitive(value, PreferredType::String)?)
        }
    }
}

fn number_to_js_string(n: f64) -> Arc<JsString> {
    if n.is_nan() {
        strings::NAN.clone()
    } else if n == 0.0 {
        strings::ZERO.clone()
    } else if n == f64::INFINITY {
        strings::INFINITY.clone()
    } else if n == f64::NEG_INFINITY {
        strings::NEG_INFINITY.clone()
    } else {
        JsString::new(number_to_string(n))
    }
}

/// `ToPropertyKey`
pub fn to_property_key(value: &Value) -> VmResult<PropertyKey> {
    match value {
        Value::String(s) => Ok(PropertyKey::from_js_string(s.clone())),
        Value::Symbol(s) => Ok(PropertyKey::Symbol(s.clone())),
        Value::Int32(i) if *i >= 0 => Ok(PropertyKey::Index(*i as u32)),
        Value::Object(_) | Value::Foreign(_) => {
            to_property_key(&to_primitive(value, PreferredType::String)?)
        }
        _ => Ok(PropertyKey::from_js_string(to_string(value)?)),
    }
}

/// `CanonicalNumericIndexString`
pub fn canonical_numeric_index_string(s: &str) -> Option<f64> {
    if s == "-0" {
        return Some(-0.0);
    }
    let n = string_to_number(s);
    (number_to_string(n) == s).then_some(n)
}

// ============================================================================
// Equality
// ============================================================================

/// `SameValue`: NaN equals NaN, `+0` and `-0` differ
pub fn same_value(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        if x.is_nan() && y.is_nan() {
            return true;
        }
        return x.to_bits() == y.to_bits();
    }
    identical(a, b)
}

/// `SameValueZero`: NaN equals NaN, `+0` equals `-0`
pub fn same_value_zero(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return (x.is_nan() && y.is_nan()) || x == y;
    }
    identical(a, b)
}

/// `IsStrictlyEqual` (`===`): NaN never equal, `+0` equals `-0`
pub fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::BigInt(x), Value::BigInt(y)) => x == y,
        (Value::String(x), Value::String(y)) => Arc::ptr_eq(x, y) || x == y,
        (Value::Symbol(x), Value::Symbol(y)) => x.id() == y.id(),
        (Value::Object(x), Value::Object(y)) => Arc::ptr_eq(x, y),
        (Value::Foreign(x), Value::Foreign(y)) => foreign::is_identical(x, y),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn is_nullish_or_foreign_null(v: &Value) -> bool {
    match v {
        Value::Undefined | Value::Null => true,
        Value::Foreign(f) => f.is_null(),
        _ => false,
    }
}

/// `IsLooselyEqual` (`==`)
pub fn loose_equal(a: &Value, b: &Value) -> VmResult<bool> {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => return Ok(Arc::ptr_eq(x, y)),
        (Value::Foreign(x), Value::Foreign(y)) if foreign::is_identical(x, y) => return Ok(true),
        _ => {}
    }

    if a.is_nullish() {
        return Ok(is_nullish_or_foreign_null(b));
    }
    if b.is_nullish() {
        return Ok(is_nullish_or_foreign_null(a));
    }

    match (a, b) {
        (Value::Boolean(x), Value::Boolean(y)) => Ok(x == y),
        (Value::String(x), Value::String(y)) => Ok(x == y),
        (Value::Symbol(x), Value::Symbol(y)) => Ok(x.id() == y.id()),
        (Value::BigInt(x), Value::BigInt(y)) => Ok(x == y),
        _ if a.is_number() && b.is_number() => Ok(identical(a, b)),

        (Value::String(s), _) if b.is_number() => {
            Ok(string_to_number(s.as_str()) == b.as_number().unwrap_or(f64::NAN))
        }
        (_, Value::String(s)) if a.is_number() => {
            Ok(a.as_number().unwrap_or(f64::NAN) == string_to_number(s.as_str()))
        }

        (Value::BigInt(x), Value::String(s)) | (Value::String(s), Value::BigInt(x)) => {
            Ok(string_to_bigint(s.as_str()).is_some_and(|y| **x == y))
        }

        (Value::Boolean(x), _) => loose_equal(&Value::int32(*x as i32), b),
        (_, Value::Boolean(y)) => loose_equal(a, &Value::int32(*y as i32)),

        (Value::BigInt(x), _) if b.is_number() => Ok(bigint_equals_number(x, b)),
        (_, Value::BigInt(y)) if a.is_number() => Ok(bigint_equals_number(y, a)),

        (Value::Foreign(_), _) | (_, Value::Foreign(_)) => {
            if let Value::Object(_) = a {
                return loose_equal(&to_primitive(a, PreferredType::Default)?, b);
            }
            if let Value::Object(_) = b {
                return loose_equal(a, &to_primitive(b, PreferredType::Default)?);
            }
            loose_equal_interop(a, b)
        }

        (Value::Object(_), _) => loose_equal(&to_primitive(a, PreferredType::Default)?, b),
        (_, Value::Object(_)) => loose_equal(a, &to_primitive(b, PreferredType::Default)?),

        _ => Ok(false),
    }
}

fn bigint_equals_number(b: &BigInt, n: &Value) -> bool {
    let n = n.as_number().unwrap_or(f64::NAN);
    if !n.is_finite() {
        return false;
    }
    number::compare_bigint_number(b, n) == Some(Ordering::Equal)
}

/// Loose equality where at least one side is a foreign value and neither
/// side is an engine object.
fn loose_equal_interop(a: &Value, b: &Value) -> VmResult<bool> {
    let unbox = |v: &Value| -> Option<Value> {
        match v {
            Value::Foreign(f) => foreign::to_primitive_or_none(f),
            Value::Undefined | Value::Null => Some(Value::Null),
            other => Some(other.clone()),
        }
    };
    let left = unbox(a);
    let right = unbox(b);

    let left_null = left.as_ref().is_some_and(Value::is_null);
    let right_null = right.as_ref().is_some_and(Value::is_null);
    if left_null || right_null {
        return Ok(left_null && right_null);
    }

    match (left, right) {
        (Some(l), Some(r)) => loose_equal(&l, &r),
        (None, None) => Ok(match (a, b) {
            (Value::Foreign(x), Value::Foreign(y)) => foreign::is_identical(x, y),
            _ => false,
        }),
        _ => Ok(false),
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Whether `value` is an array index: an integer in `[0, 2^32 - 2]`.
///
/// Strings qualify only in canonical form (`"7"`, not `"07"` or `"7.0"`).
pub fn is_array_index(value: &Value) -> bool {
    match value {
        Value::Int32(i) => *i >= 0,
        Value::Number(n) => number::is_array_index_f64(*n),
        Value::String(s) => array_index_of_str(s.as_str()).is_some(),
        _ => false,
    }
}

/// `IsArray`, looking through proxies
pub fn is_array(value: &Value) -> VmResult<bool> {
    let Value::Object(obj) = value else {
        return Ok(false);
    };
    let mut current = obj.clone();
    loop {
        match current.kind() {
            ObjectKind::Array => return Ok(true),
            ObjectKind::Proxy(p) => {
                let target = p.target("IsArray")?;
                current = target;
            }
            _ => return Ok(false),
        }
    }
}

/// `IsCallable`
pub fn is_callable(value: &Value) -> bool {
    value.as_object().is_some_and(|o| o.is_callable())
}

/// `IsConstructor`
pub fn is_constructor(value: &Value) -> bool {
    value.as_object().is_some_and(|o| o.is_constructor())
}

/// `RequireObjectCoercible`
pub fn require_object_coercible(value: &Value) -> VmResult<&Value> {
    if value.is_nullish() {
        return Err(VmError::type_error(format!(
            "Cannot convert {} to object",
            value.describe()
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{JsObject, NativeFn, PropertyAttributes};
    use crate::shape::ShapeArena;
    use crate::value::Symbol;

    fn method(arena: &Arc<ShapeArena>, result: Value) -> ObjectRef {
        let f: NativeFn = Arc::new(move |_: &Value, _: &[Value]| Ok(result.clone()));
        JsObject::native_function(arena, None, "m", 0, f)
    }

    #[test]
    fn test_to_primitive_order() {
        let arena = ShapeArena::new();
        let obj = JsObject::ordinary(&arena, None);
        obj.define_data(
            PropertyKey::from("valueOf"),
            Value::object(method(&arena, Value::int32(1))),
            PropertyAttributes::builtin(),
        );
        obj.define_data(
            PropertyKey::from("toString"),
            Value::object(method(&arena, Value::str("s"))),
            PropertyAttributes::builtin(),
        );
        let v = Value::object(obj);
        assert_eq!(to_primitive(&v, PreferredType::Number).unwrap().as_int32(), Some(1));
        assert_eq!(to_primitive(&v, PreferredType::Default).unwrap().as_int32(), Some(1));
        assert_eq!(
            to_primitive(&v, PreferredType::String).unwrap().as_string().unwrap().as_str(),
            "s"
        );
    }

    #[test]
    fn test_to_primitive_exotic_receives_hint() {
        let arena = ShapeArena::new();
        let obj = JsObject::ordinary(&arena, None);
        let echo: NativeFn = Arc::new(|_: &Value, args: &[Value]| Ok(args[0].clone()));
        let f = JsObject::native_function(&arena, None, "[Symbol.toPrimitive]", 1, echo);
        obj.define_data(
            PropertyKey::Symbol(well_known::to_primitive()),
            Value::object(f),
            PropertyAttributes::builtin(),
        );
        let v = Value::object(obj);
        let hint = to_primitive(&v, PreferredType::Number).unwrap();
        assert_eq!(hint.as_string().unwrap().as_str(), "number");
        assert_eq!(to_string(&v).unwrap().as_str(), "string");
    }

    #[test]
    fn test_to_primitive_failures() {
        let arena = ShapeArena::new();
        let bare = Value::object(JsObject::ordinary(&arena, None));
        let err = to_primitive(&bare, PreferredType::Default).unwrap_err();
        assert_eq!(err.message(), "Cannot convert object to primitive value");

        let obj = JsObject::ordinary(&arena, None);
        obj.define_data(
            PropertyKey::Symbol(well_known::to_primitive()),
            Value::int32(3),
            PropertyAttributes::data(),
        );
        let err = to_primitive(&Value::object(obj), PreferredType::Default).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_to_number_errors() {
        let sym = Value::symbol(Symbol::new(None));
        assert_eq!(
            to_number(&sym).unwrap_err().message(),
            "Cannot convert a Symbol value to a number"
        );
        assert!(to_number(&Value::bigint(1)).unwrap_err().is_type_error());
        assert!(matches!(to_numeric(&Value::bigint(1)).unwrap(), Numeric::BigInt(_)));
    }

    #[test]
    fn test_to_bigint() {
        assert_eq!(*to_bigint(&Value::str(" 123 ")).unwrap(), BigInt::from(123));
        assert_eq!(*to_bigint(&Value::Boolean(true)).unwrap(), BigInt::from(1));
        assert!(to_bigint(&Value::str("1.5")).unwrap_err().is_syntax_error());
        assert!(to_bigint(&Value::number(1.0)).unwrap_err().is_type_error());
        assert!(to_bigint(&Value::Undefined).unwrap_err().is_type_error());
    }

    #[test]
    fn test_number_to_bigint() {
        let two_53 = 9_007_199_254_740_992.0;
        assert_eq!(number_to_bigint(two_53).unwrap(), BigInt::from(1u64 << 53));
        assert_eq!(number_to_bigint(1e21).unwrap().to_string(), "1000000000000000000000");
        assert_eq!(number_to_bigint(-0.0).unwrap(), BigInt::zero());
        assert!(number_to_bigint(1.5).unwrap_err().is_range_error());
        assert!(number_to_bigint(f64::NAN).unwrap_err().is_range_error());
        assert!(number_to_bigint(f64::INFINITY).unwrap_err().is_range_error());
    }

    #[test]
    fn test_numeric_to_number() {
        assert_eq!(to_numeric(&Value::bigint(10)).unwrap().to_number(), 10.0);
        assert_eq!(to_numeric(&Value::str("2.5")).unwrap().to_number(), 2.5);
    }

    #[test]
    fn test_to_string_forms() {
        assert_eq!(to_string(&Value::Undefined).unwrap().as_str(), "undefined");
        assert_eq!(to_string(&Value::number(-0.0)).unwrap().as_str(), "0");
        assert_eq!(to_string(&Value::number(1.5)).unwrap().as_str(), "1.5");
        assert_eq!(to_string(&Value::bigint(-12)).unwrap().as_str(), "-12");
        assert!(to_string(&Value::symbol(Symbol::new(None))).is_err());
    }

    #[test]
    fn test_to_property_key() {
        assert_eq!(to_property_key(&Value::int32(3)).unwrap(), PropertyKey::Index(3));
        assert_eq!(to_property_key(&Value::number(3.0)).unwrap(), PropertyKey::Index(3));
        assert!(matches!(
            to_property_key(&Value::number(1.5)).unwrap(),
            PropertyKey::String(_)
        ));
        assert!(matches!(
            to_property_key(&Value::int32(-1)).unwrap(),
            PropertyKey::String(_)
        ));
    }

    #[test]
    fn test_canonical_numeric_index_string() {
        assert_eq!(canonical_numeric_index_string("1"), Some(1.0));
        assert!(canonical_numeric_index_string("-0").unwrap().is_sign_negative());
        assert_eq!(canonical_numeric_index_string("01"), None);
        assert!(canonical_numeric_index_string("NaN").unwrap().is_nan());
        assert_eq!(canonical_numeric_index_string("foo"), None);
    }

    #[test]
    fn test_to_index() {
        assert_eq!(to_index(&Value::Undefined).unwrap(), 0);
        assert_eq!(to_index(&Value::number(3.7)).unwrap(), 3);
        assert!(to_index(&Value::int32(-1)).unwrap_err().is_range_error());
    }

    #[test]
    fn test_is_array_through_proxy() {
        let arena = ShapeArena::new();
        let arr = JsObject::array(&arena, None, vec![]);
        let handler = JsObject::ordinary(&arena, None);
        let proxy = JsObject::proxy(&arena, arr, handler.clone());
        let nested = JsObject::proxy(&arena, proxy.clone(), handler);
        assert!(is_array(&Value::object(nested.clone())).unwrap());
        proxy.revoke_proxy();
        let err = is_array(&Value::object(nested)).unwrap_err();
        assert!(err.message().contains("revoked"));
        assert!(!is_array(&Value::str("[]")).unwrap());
    }
}

//! Abstract operation behavior over every value kind.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tern_vm_core::convert::{
    PreferredType, identical, is_array_index, loose_equal, same_value, same_value_zero,
    string_to_number, to_boolean, to_int32, to_number, to_primitive, to_string, to_uint16,
    to_uint32,
};
use tern_vm_core::foreign::{BoxedPrimitive, ForeignNull, ForeignRef, ForeignValue};
use tern_vm_core::object::NativeFn;
use tern_vm_core::value::Symbol;
use tern_vm_core::{JsObject, PropertyAttributes, PropertyKey, ShapeArena, Value, VmResult};

fn object_with(arena: &Arc<ShapeArena>, name: &str, result: Value) -> Value {
    let obj = JsObject::ordinary(arena, None);
    let f: NativeFn = Arc::new(move |_: &Value, _: &[Value]| Ok(result.clone()));
    obj.define_data(
        PropertyKey::from(name),
        Value::object(JsObject::native_function(arena, None, name, 0, f)),
        PropertyAttributes::builtin(),
    );
    Value::object(obj)
}

#[test]
fn test_falsy_table() {
    let arena = ShapeArena::new();
    let falsy = [
        Value::int32(0),
        Value::number(-0.0),
        Value::number(f64::NAN),
        Value::str(""),
        Value::null(),
        Value::undefined(),
        Value::boolean(false),
        Value::bigint(0),
    ];
    for v in &falsy {
        assert!(!to_boolean(v), "{} should be falsy", v.describe());
    }

    let truthy = [
        Value::int32(-1),
        Value::number(0.5),
        Value::number(f64::INFINITY),
        Value::str("0"),
        Value::str("false"),
        Value::str(" "),
        Value::boolean(true),
        Value::bigint(-3),
        Value::symbol(Symbol::new(None)),
        Value::object(JsObject::ordinary(&arena, None)),
        Value::object(JsObject::array(&arena, None, vec![])),
    ];
    for v in &truthy {
        assert!(to_boolean(v), "{} should be truthy", v.describe());
    }
}

#[test]
fn test_int32_string_round_trip() {
    let samples = [
        0,
        1,
        -1,
        42,
        -42,
        1_000_000,
        i32::MAX,
        i32::MIN,
        i32::MAX - 1,
        i32::MIN + 1,
        123_456_789,
    ];
    for n in samples {
        let s = to_string(&Value::int32(n)).unwrap();
        let back = to_number(&Value::string(s.clone())).unwrap();
        assert_eq!(back, n as f64);
        let again = to_string(&Value::number(back)).unwrap();
        assert_eq!(again.as_str(), s.as_str());
    }
    for n in (i32::MIN..=i32::MAX).step_by(7_919_113) {
        let s = to_string(&Value::int32(n)).unwrap();
        assert_eq!(string_to_number(s.as_str()), n as f64);
    }
}

#[test]
fn test_string_to_number_table() {
    assert_eq!(string_to_number("  123  "), 123.0);
    assert_eq!(string_to_number("0x1F"), 31.0);
    assert_eq!(string_to_number("Infinity"), f64::INFINITY);
    assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
    assert!(string_to_number("abc").is_nan());
    assert_eq!(string_to_number(""), 0.0);
    assert_eq!(string_to_number("\n\t "), 0.0);

    let neg_zero = string_to_number("-0");
    assert_eq!(neg_zero, 0.0);
    assert!(neg_zero.is_sign_negative());
    assert!(Value::number(neg_zero).is_negative_zero());

    assert!(string_to_number("-0x10").is_nan());
    assert!(string_to_number("1e").is_nan());
    assert_eq!(string_to_number("1e3"), 1000.0);
    assert_eq!(string_to_number(".5"), 0.5);
    assert_eq!(string_to_number("5."), 5.0);
    assert_eq!(string_to_number("123456789012345678"), 123_456_789_012_345_678.0);
}

#[test]
fn test_number_to_string_grammar() {
    let cases = [
        (0.1, "0.1"),
        (1e21, "1e+21"),
        (1e20, "100000000000000000000"),
        (1e-6, "0.000001"),
        (1e-7, "1e-7"),
        (-1.5e-9, "-1.5e-9"),
        (123.456, "123.456"),
        (f64::MAX, "1.7976931348623157e+308"),
        (5e-324, "5e-324"),
    ];
    for (n, expected) in cases {
        assert_eq!(to_string(&Value::number(n)).unwrap().as_str(), expected);
    }
}

#[test]
fn test_integer_conversions() {
    assert_eq!(to_int32(&Value::number(f64::NAN)).unwrap(), 0);
    assert_eq!(to_int32(&Value::number(f64::INFINITY)).unwrap(), 0);
    assert_eq!(to_int32(&Value::number(2147483648.0)).unwrap(), -2147483648);
    assert_eq!(to_int32(&Value::number(-2147483649.0)).unwrap(), 2147483647);
    assert_eq!(to_int32(&Value::number(1e20)).unwrap(), 1661992960);
    assert_eq!(to_int32(&Value::number(-1.9)).unwrap(), -1);
    assert_eq!(to_uint32(&Value::int32(-1)).unwrap(), u32::MAX);
    assert_eq!(to_uint32(&Value::str("4294967297")).unwrap(), 1);
    assert_eq!(to_uint16(&Value::number(65537.0)).unwrap(), 1);
    assert_eq!(to_uint16(&Value::number(-1.0)).unwrap(), 65535);
}

#[test]
fn test_equality_laws() {
    let nan = Value::number(f64::NAN);
    let zero = Value::int32(0);
    let neg_zero = Value::number(-0.0);

    assert!(same_value(&nan, &nan));
    assert!(!loose_equal(&nan, &nan).unwrap());
    assert!(!identical(&nan, &nan));
    assert!(!same_value(&zero, &neg_zero));
    assert!(same_value_zero(&zero, &neg_zero));
    assert!(loose_equal(&zero, &neg_zero).unwrap());
    assert!(identical(&zero, &neg_zero));

    assert!(loose_equal(&Value::null(), &Value::undefined()).unwrap());
    assert!(!loose_equal(&Value::null(), &zero).unwrap());
    assert!(!loose_equal(&Value::undefined(), &Value::boolean(false)).unwrap());
    assert!(loose_equal(&Value::str("5"), &Value::int32(5)).unwrap());
    assert!(loose_equal(&Value::boolean(true), &Value::int32(1)).unwrap());
    assert!(loose_equal(&Value::boolean(false), &Value::str("")).unwrap());
    assert!(!loose_equal(&Value::str("a"), &Value::str("b")).unwrap());
}

#[test]
fn test_bigint_equality() {
    assert!(loose_equal(&Value::bigint(10), &Value::int32(10)).unwrap());
    assert!(loose_equal(&Value::number(10.0), &Value::bigint(10)).unwrap());
    assert!(!loose_equal(&Value::bigint(10), &Value::number(10.5)).unwrap());
    assert!(!loose_equal(&Value::bigint(0), &Value::number(f64::NAN)).unwrap());
    assert!(!loose_equal(&Value::bigint(1), &Value::number(f64::INFINITY)).unwrap());
    assert!(loose_equal(&Value::bigint(255), &Value::str("0xff")).unwrap());
    assert!(!loose_equal(&Value::bigint(1), &Value::str("1.0")).unwrap());
    assert!(loose_equal(&Value::bigint(1), &Value::boolean(true)).unwrap());
    assert!(identical(&Value::bigint(7), &Value::bigint(7)));
    assert!(!identical(&Value::bigint(7), &Value::int32(7)));
}

#[test]
fn test_object_equality_coerces() {
    let arena = ShapeArena::new();
    let obj = object_with(&arena, "valueOf", Value::int32(3));
    assert!(loose_equal(&obj, &Value::int32(3)).unwrap());
    assert!(loose_equal(&Value::str("3"), &obj).unwrap());
    assert!(loose_equal(&obj, &obj.clone()).unwrap());

    let other = object_with(&arena, "valueOf", Value::int32(3));
    assert!(!loose_equal(&obj, &other).unwrap());
    assert!(!loose_equal(&obj, &Value::null()).unwrap());
}

#[test]
fn test_symbol_conversions_throw() {
    let sym = Value::symbol(Symbol::new(Some("s")));
    let err = to_number(&sym).unwrap_err();
    assert!(err.is_type_error());
    let err = to_string(&sym).unwrap_err();
    assert!(err.is_type_error());
    assert!(loose_equal(&sym, &sym.clone()).unwrap());
    assert!(!loose_equal(&sym, &Value::str("Symbol(s)")).unwrap());
}

#[test]
fn test_is_array_index_bounds() {
    let max_index = 4_294_967_294.0;
    assert!(is_array_index(&Value::number(max_index)));
    assert!(!is_array_index(&Value::number(max_index + 1.0)));
    assert!(!is_array_index(&Value::int32(-1)));
    assert!(!is_array_index(&Value::number(1.5)));
    assert!(is_array_index(&Value::str("4294967294")));
    assert!(!is_array_index(&Value::str("4294967295")));
    assert!(!is_array_index(&Value::str("01")));
}

#[test]
fn test_to_primitive_tolerates_mutation() {
    let arena = ShapeArena::new();
    let obj = JsObject::ordinary(&arena, None);
    let target = obj.clone();
    // valueOf deletes itself and returns a non-primitive; toString must still run.
    let value_of: NativeFn = Arc::new(move |this: &Value, _: &[Value]| {
        target.delete(&PropertyKey::from("valueOf"));
        Ok(this.clone())
    });
    obj.define_data(
        PropertyKey::from("valueOf"),
        Value::object(JsObject::native_function(&arena, None, "valueOf", 0, value_of)),
        PropertyAttributes::data(),
    );
    let to_str: NativeFn = Arc::new(|_: &Value, _: &[Value]| Ok(Value::str("7")));
    obj.define_data(
        PropertyKey::from("toString"),
        Value::object(JsObject::native_function(&arena, None, "toString", 0, to_str)),
        PropertyAttributes::data(),
    );

    let v = Value::object(obj.clone());
    let prim = to_primitive(&v, PreferredType::Number).unwrap();
    assert_eq!(prim.as_string().unwrap().as_str(), "7");
    assert!(!obj.has_own_property(&PropertyKey::from("valueOf")));
    assert_eq!(to_number(&v).unwrap(), 7.0);
}

#[derive(Debug)]
struct HostDate {
    calls: AtomicUsize,
}

impl ForeignValue for HostDate {
    fn invoke_member(&self, name: &str) -> Option<VmResult<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match name {
            "toString" => Some(Ok(Value::str("host date"))),
            _ => None,
        }
    }
}

#[test]
fn test_foreign_values() {
    let null: ForeignRef = Arc::new(ForeignNull);
    assert!(loose_equal(&Value::foreign(null.clone()), &Value::null()).unwrap());
    assert!(loose_equal(&Value::undefined(), &Value::foreign(null.clone())).unwrap());
    assert!(!to_boolean(&Value::foreign(null.clone())));

    let boxed: ForeignRef = Arc::new(BoxedPrimitive(Value::str("42")));
    assert!(loose_equal(&Value::foreign(boxed.clone()), &Value::int32(42)).unwrap());
    assert!(!loose_equal(&Value::foreign(boxed), &Value::foreign(null)).unwrap());

    let date = Arc::new(HostDate {
        calls: AtomicUsize::new(0),
    });
    let handle: ForeignRef = date.clone();
    let v = Value::foreign(handle.clone());
    assert!(loose_equal(&v, &Value::foreign(handle)).unwrap());
    assert_eq!(date.calls.load(Ordering::SeqCst), 0);

    let other: ForeignRef = Arc::new(HostDate {
        calls: AtomicUsize::new(0),
    });
    assert!(!loose_equal(&v, &Value::foreign(other)).unwrap());

    assert_eq!(to_string(&v).unwrap().as_str(), "host date");
    assert!(to_boolean(&v));
}

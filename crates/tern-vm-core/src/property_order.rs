//! Own-property key ordering.
//!
//! Enumeration order is: array indices ascending, then string keys in
//! insertion order, then symbol keys in insertion order. The comparator
//! only ever reorders indices; everything else compares `Equal` and relies
//! on the stability of `slice::sort_by`.

use smallvec::SmallVec;
use std::cmp::Ordering;

use crate::convert::is_array_index;
use crate::object::{JsObject, PropertyKey};
use crate::value::Value;

/// Stable-sort comparator for property keys.
///
/// * index vs index compares numerically
/// * index sorts before any non-index key
/// * every other pair is `Equal`
pub fn compare_keys(a: &PropertyKey, b: &PropertyKey) -> Ordering {
    match (a.as_index(), b.as_index()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort keys into full `[[OwnPropertyKeys]]` order.
///
/// `compare_keys` alone keeps symbols interleaved with strings; this also
/// moves symbols behind every string key, preserving relative order.
pub fn sort_own_keys(keys: &mut Vec<PropertyKey>) {
    keys.sort_by(compare_keys);
    let split = keys.iter().position(|k| !k.is_index()).unwrap_or(keys.len());
    if keys[split..].iter().any(PropertyKey::is_symbol) {
        let tail: SmallVec<[PropertyKey; 16]> = keys.drain(split..).collect();
        let (symbols, strings): (SmallVec<[PropertyKey; 16]>, SmallVec<[PropertyKey; 16]>) =
            tail.into_iter().partition(PropertyKey::is_symbol);
        keys.extend(strings);
        keys.extend(symbols);
    }
}

/// Own keys of `obj` in enumeration order
pub fn ordered_own_keys(obj: &JsObject) -> Vec<PropertyKey> {
    let mut keys = obj.own_property_keys();
    sort_own_keys(&mut keys);
    keys
}

/// Comparator over key values (numbers, strings, symbols), as used by
/// display formatting of property lists.
pub fn compare_key_values(a: &Value, b: &Value) -> Ordering {
    match (is_array_index(a), is_array_index(b)) {
        (true, true) => index_value(a).cmp(&index_value(b)),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => match (a.is_symbol(), b.is_symbol()) {
            (false, true) => Ordering::Less,
            (true, false) => Ordering::Greater,
            _ => Ordering::Equal,
        },
    }
}

fn index_value(v: &Value) -> u32 {
    match v {
        Value::Int32(i) => *i as u32,
        Value::Number(n) => *n as u32,
        Value::String(s) => crate::number::array_index_of_str(s.as_str()).unwrap_or(u32::MAX),
        _ => u32::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Symbol;

    #[test]
    fn test_indices_first() {
        let mut keys = vec![
            PropertyKey::from("x"),
            PropertyKey::from(10u32),
            PropertyKey::from(2u32),
        ];
        keys.sort_by(compare_keys);
        assert_eq!(keys[0], PropertyKey::Index(2));
        assert_eq!(keys[1], PropertyKey::Index(10));
    }

    #[test]
    fn test_symbols_last() {
        let sym = Symbol::new(Some("s"));
        let mut keys = vec![
            PropertyKey::Symbol(sym.clone()),
            PropertyKey::from("a"),
            PropertyKey::from("0"),
        ];
        sort_own_keys(&mut keys);
        assert_eq!(
            keys,
            vec![PropertyKey::Index(0), PropertyKey::from("a"), PropertyKey::Symbol(sym)]
        );
    }

    #[test]
    fn test_key_values() {
        let mut values = vec![
            Value::str("b"),
            Value::symbol(Symbol::new(None)),
            Value::int32(5),
            Value::str("1"),
        ];
        values.sort_by(compare_key_values);
        assert_eq!(values[0].as_string().unwrap().as_str(), "1");
        assert_eq!(values[1].as_int32(), Some(5));
        assert_eq!(values[2].as_string().unwrap().as_str(), "b");
        assert!(values[3].is_symbol());
    }
}

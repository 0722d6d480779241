//! Numeric conversions that never call user code.
//!
//! String to number parsing, number formatting (`Number::toString`), the
//! fixed-width integer conversions and array-index classification. The
//! value-level operations in [`crate::convert`] are built on these.

use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive, Zero};

/// `2^32`
const TWO_32: f64 = 4_294_967_296.0;

/// `2^53 - 1`
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Largest array index plus one (`2^32 - 1`, the reserved length sentinel)
pub const MAX_ARRAY_INDEX_EXCLUSIVE: u64 = 4_294_967_295;

/// Longest decimal literal that is parsed through the exact integer path
const SAFE_INTEGER_LITERAL_LEN: usize = 18;

/// Digits of `u32::MAX`
const MAX_UINT32_DIGITS: usize = 10;

/// ECMAScript `WhiteSpace` or `LineTerminator`
pub fn is_js_whitespace(c: char) -> bool {
    matches!(
        c,
        '\u{0009}'..='\u{000D}'
            | '\u{0020}'
            | '\u{00A0}'
            | '\u{1680}'
            | '\u{2000}'..='\u{200A}'
            | '\u{2028}'
            | '\u{2029}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{3000}'
            | '\u{FEFF}'
    )
}

/// Trim ECMAScript whitespace and line terminators from both ends
pub fn trim_js_whitespace(s: &str) -> &str {
    s.trim_matches(is_js_whitespace)
}

// ---------------------------------------------------------------------------
// StringToNumber
// ---------------------------------------------------------------------------

/// `StringToNumber`
///
/// Returns `-0.0` for the literal `"-0"`; callers that store the result via
/// [`crate::Value::number`] keep integers in the `Int32` representation.
pub fn string_to_number(s: &str) -> f64 {
    let s = trim_js_whitespace(s);
    if s.is_empty() {
        return 0.0;
    }

    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    let bytes = s.as_bytes();
    let first = bytes[0];
    if !(first.is_ascii_digit() || first == b'-' || first == b'+' || first == b'.') {
        return f64::NAN;
    }

    if bytes.len() > 2 && first == b'0' {
        let radix = match bytes[1] {
            b'x' | b'X' => Some(16),
            b'o' | b'O' => Some(8),
            b'b' | b'B' => Some(2),
            _ => None,
        };
        if let Some(radix) = radix {
            return parse_radix_literal(&s[2..], radix);
        }
    }

    let scientific = bytes.iter().any(|b| matches!(b, b'e' | b'E'));
    if !scientific && bytes.len() <= SAFE_INTEGER_LITERAL_LEN && !bytes.contains(&b'.') {
        return parse_integer_literal(s);
    }

    parse_decimal_literal(s)
}

/// Decimal literal of at most 18 characters without `.` or exponent.
fn parse_integer_literal(s: &str) -> f64 {
    match s.parse::<i64>() {
        Ok(0) if s.starts_with('-') => -0.0,
        Ok(n) => n as f64,
        Err(_) => f64::NAN,
    }
}

/// `StrUnsignedDecimalLiteral` with optional sign and exponent.
fn parse_decimal_literal(s: &str) -> f64 {
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    // `str::parse` also accepts "inf"/"nan", which are not literals here.
    let starts_ok = unsigned
        .as_bytes()
        .first()
        .is_some_and(|b| b.is_ascii_digit() || *b == b'.');
    let ends_ok = unsigned
        .as_bytes()
        .last()
        .is_some_and(|b| b.is_ascii_digit() || *b == b'.');
    if !starts_ok || !ends_ok {
        return f64::NAN;
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}

/// Digits of a `0x`/`0o`/`0b` literal. Signs are not allowed.
fn parse_radix_literal(digits: &str, radix: u32) -> f64 {
    if digits.is_empty() {
        return f64::NAN;
    }
    let mut result = 0.0f64;
    for c in digits.chars() {
        match c.to_digit(radix) {
            Some(d) => result = result * radix as f64 + d as f64,
            None => return f64::NAN,
        }
    }
    if result >= 9_007_199_254_740_992.0 {
        // Past 2^53 the running sum rounds at every step; round once instead.
        return BigInt::parse_bytes(digits.as_bytes(), radix)
            .and_then(|b| b.to_f64())
            .unwrap_or(f64::NAN);
    }
    result
}

/// `StringToBigInt`. `None` when the string is not a valid literal.
pub fn string_to_bigint(s: &str) -> Option<BigInt> {
    let s = trim_js_whitespace(s);
    if s.is_empty() {
        return Some(BigInt::zero());
    }

    let bytes = s.as_bytes();
    if bytes.len() > 2 && bytes[0] == b'0' {
        let radix = match bytes[1] {
            b'x' | b'X' => Some(16),
            b'o' | b'O' => Some(8),
            b'b' | b'B' => Some(2),
            _ => None,
        };
        if let Some(radix) = radix {
            return parse_bigint_digits(&s[2..], radix);
        }
    }

    let (negative, digits) = match bytes[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    let value = parse_bigint_digits(digits, 10)?;
    Some(if negative { -value } else { value })
}

fn parse_bigint_digits(digits: &str, radix: u32) -> Option<BigInt> {
    // BigInt::parse_bytes tolerates '_' separators and a sign; JS does not.
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    BigInt::parse_bytes(digits.as_bytes(), radix)
}

// ---------------------------------------------------------------------------
// Number::toString
// ---------------------------------------------------------------------------

/// `Number::toString(x)` with radix 10: shortest round-trip digits, plain
/// notation in `[1e-6, 1e21)`, exponential form outside.
pub fn number_to_string(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x == 0.0 {
        return "0".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let i = x as i32;
    if i as f64 == x {
        let mut buf = itoa::Buffer::new();
        return buf.format(i).to_string();
    }
    let mut buf = ryu_js::Buffer::new();
    buf.format(x).to_string()
}

const RADIX_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `Number.prototype.toString(radix)` for radix 2..=36.
///
/// Radix 10 defers to [`number_to_string`]. Other radices emit the integer
/// part exactly and as many fraction digits as needed to distinguish `x`
/// from its neighbours.
pub fn number_to_string_radix(x: f64, radix: u32) -> String {
    debug_assert!((2..=36).contains(&radix));
    if radix == 10 || x.is_nan() || x.is_infinite() || x == 0.0 {
        return number_to_string(x);
    }

    let negative = x < 0.0;
    let value = x.abs();
    let radix_f = radix as f64;
    let mut integer = value.floor();
    let mut fraction = value - integer;

    // Half the distance to the next double; digits below this are noise.
    let mut delta = (0.5 * (next_up(value) - value)).max(next_up(0.0));
    let mut fraction_digits: Vec<u8> = Vec::new();
    if fraction >= delta {
        loop {
            fraction *= radix_f;
            delta *= radix_f;
            let digit = fraction as u32;
            fraction_digits.push(RADIX_DIGITS[digit as usize]);
            fraction -= digit as f64;
            if (fraction > 0.5 || (fraction == 0.5 && digit & 1 == 1)) && fraction + delta > 1.0 {
                round_up_fraction(&mut fraction_digits, &mut integer, radix);
                break;
            }
            if fraction < delta {
                break;
            }
        }
    }

    let mut integer_digits: Vec<u8> = Vec::new();
    // Beyond 2^53 the low digits are not representable; emit zeros.
    while integer / radix_f >= 9_007_199_254_740_992.0 {
        integer /= radix_f;
        integer_digits.push(b'0');
    }
    loop {
        let remainder = integer % radix_f;
        integer_digits.push(RADIX_DIGITS[remainder as usize]);
        integer = (integer - remainder) / radix_f;
        if integer <= 0.0 {
            break;
        }
    }

    let mut out = String::with_capacity(integer_digits.len() + fraction_digits.len() + 2);
    if negative {
        out.push('-');
    }
    out.extend(integer_digits.iter().rev().map(|&b| b as char));
    if !fraction_digits.is_empty() {
        out.push('.');
        out.extend(fraction_digits.iter().map(|&b| b as char));
    }
    out
}

fn round_up_fraction(digits: &mut Vec<u8>, integer: &mut f64, radix: u32) {
    while let Some(last) = digits.pop() {
        let d = (last as char).to_digit(36).unwrap_or(0);
        if d + 1 < radix {
            digits.push(RADIX_DIGITS[(d + 1) as usize]);
            return;
        }
    }
    *integer += 1.0;
}

fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

// ---------------------------------------------------------------------------
// Integer conversions
// ---------------------------------------------------------------------------

/// Modulo-`2^32` reduction of `ToIntegerOrInfinity(x)`. NaN and infinities
/// map to 0.
#[inline]
fn modulo_2_32(x: f64) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    let t = x.trunc();
    t - (t / TWO_32).floor() * TWO_32
}

/// `ToInt32` on a number
pub fn to_int32(x: f64) -> i32 {
    if let Some(i) = exact_i32(x) {
        return i;
    }
    modulo_2_32(x) as u32 as i32
}

/// `ToUint32` on a number
pub fn to_uint32(x: f64) -> u32 {
    modulo_2_32(x) as u32
}

/// `ToUint16` on a number
pub fn to_uint16(x: f64) -> u16 {
    (to_uint32(x) & 0xFFFF) as u16
}

/// `ToInt16` on a number
pub fn to_int16(x: f64) -> i16 {
    to_uint16(x) as i16
}

/// `ToUint8` on a number
pub fn to_uint8(x: f64) -> u8 {
    (to_uint32(x) & 0xFF) as u8
}

/// `ToInt8` on a number
pub fn to_int8(x: f64) -> i8 {
    to_uint8(x) as i8
}

/// `ToUint8Clamp` on a number (round half to even)
pub fn to_uint8_clamp(x: f64) -> u8 {
    if x.is_nan() || x <= 0.0 {
        return 0;
    }
    if x >= 255.0 {
        return 255;
    }
    let f = x.floor();
    let half = f + 0.5;
    if half < x {
        return (f + 1.0) as u8;
    }
    if x < half {
        return f as u8;
    }
    if (f as u8) % 2 == 1 {
        (f + 1.0) as u8
    } else {
        f as u8
    }
}

#[inline]
fn exact_i32(x: f64) -> Option<i32> {
    let i = x as i32;
    (i as f64 == x).then_some(i)
}

/// `ToIntegerOrInfinity` on a number
pub fn to_integer_or_infinity(x: f64) -> f64 {
    if x.is_nan() {
        return 0.0;
    }
    if x.is_infinite() {
        return x;
    }
    // trunc(-0.5) is -0; normalize to +0
    x.trunc() + 0.0
}

/// `ToLength` on a number
pub fn to_length(x: f64) -> f64 {
    let len = to_integer_or_infinity(x);
    if len <= 0.0 {
        0.0
    } else {
        len.min(MAX_SAFE_INTEGER)
    }
}

// ---------------------------------------------------------------------------
// Array indices
// ---------------------------------------------------------------------------

/// Whether `n` is an integer in `[0, 2^32 - 2]`
pub fn is_array_index_f64(n: f64) -> bool {
    n >= 0.0 && n < MAX_ARRAY_INDEX_EXCLUSIVE as f64 && n.fract() == 0.0
}

/// Whether `n` is in `[0, 2^32 - 2]`
pub fn is_array_index_i64(n: i64) -> bool {
    n >= 0 && (n as u64) < MAX_ARRAY_INDEX_EXCLUSIVE
}

/// Array index denoted by a canonical decimal string, if any.
///
/// At most ten digits, only ASCII digits, no leading zero except for `"0"`
/// itself, and a value below `2^32 - 1`.
pub fn array_index_of_str(s: &str) -> Option<u32> {
    let bytes = s.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_UINT32_DIGITS {
        return None;
    }
    if bytes[0] == b'0' {
        return (bytes.len() == 1).then_some(0);
    }
    let mut value: u64 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value * 10 + (b - b'0') as u64;
    }
    (value < MAX_ARRAY_INDEX_EXCLUSIVE).then_some(value as u32)
}

/// Compare a BigInt with a Number. `None` when `n` is NaN.
pub fn compare_bigint_number(b: &BigInt, n: f64) -> Option<std::cmp::Ordering> {
    use std::cmp::Ordering;
    if n.is_nan() {
        return None;
    }
    if n == f64::INFINITY {
        return Some(Ordering::Less);
    }
    if n == f64::NEG_INFINITY {
        return Some(Ordering::Greater);
    }
    let floor = n.floor();
    let as_big = BigInt::from_f64(floor).unwrap_or_else(BigInt::zero);
    let ord = b.cmp(&as_big);
    if ord == Ordering::Equal && floor < n {
        return Some(Ordering::Less);
    }
    Some(ord)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_number_basics() {
        assert_eq!(string_to_number("  123  "), 123.0);
        assert_eq!(string_to_number("0x1F"), 31.0);
        assert_eq!(string_to_number("0X1f"), 31.0);
        assert_eq!(string_to_number("0o17"), 15.0);
        assert_eq!(string_to_number("0b101"), 5.0);
        assert_eq!(string_to_number("Infinity"), f64::INFINITY);
        assert_eq!(string_to_number("+Infinity"), f64::INFINITY);
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number(" \n\t "), 0.0);
        assert!(string_to_number("abc").is_nan());
    }

    #[test]
    fn test_string_to_number_negative_zero() {
        let z = string_to_number("-0");
        assert_eq!(z, 0.0);
        assert!(z.is_sign_negative());
        assert!(string_to_number("-0.0").is_sign_negative());
        assert!(!string_to_number("0").is_sign_negative());
    }

    #[test]
    fn test_string_to_number_rejects_malformed() {
        for s in [
            "-0x10", "+0x10", "0x", "0xG", "1e", ".", "+", "-", "1f", "1d", "inf", "+inf", "nan",
            "NaN", "infinity", "1 2", "12a", "--1", ".e5", "Infinityx",
        ] {
            assert!(string_to_number(s).is_nan(), "{s:?} should be NaN");
        }
    }

    #[test]
    fn test_string_to_number_decimal_forms() {
        assert_eq!(string_to_number("1."), 1.0);
        assert_eq!(string_to_number(".5"), 0.5);
        assert_eq!(string_to_number("-.5"), -0.5);
        assert_eq!(string_to_number("1.e2"), 100.0);
        assert_eq!(string_to_number("1e3"), 1000.0);
        assert_eq!(string_to_number("+42"), 42.0);
        assert_eq!(string_to_number("007"), 7.0);
        assert_eq!(string_to_number("1e1000"), f64::INFINITY);
        assert_eq!(string_to_number("\u{FEFF}\u{3000}8\u{2028}"), 8.0);
    }

    #[test]
    fn test_string_to_number_integer_path_is_exact() {
        assert_eq!(string_to_number("999999999999999999"), 999_999_999_999_999_999i64 as f64);
        assert_eq!(string_to_number("9007199254740993"), 9_007_199_254_740_992.0);
        assert_eq!(
            string_to_number("12345678901234567890"),
            12_345_678_901_234_567_890.0
        );
    }

    #[test]
    fn test_string_to_bigint() {
        assert_eq!(string_to_bigint(" 42 "), Some(BigInt::from(42)));
        assert_eq!(string_to_bigint("-42"), Some(BigInt::from(-42)));
        assert_eq!(string_to_bigint("0x10"), Some(BigInt::from(16)));
        assert_eq!(string_to_bigint(""), Some(BigInt::zero()));
        assert_eq!(string_to_bigint("-0x10"), None);
        assert_eq!(string_to_bigint("1_000"), None);
        assert_eq!(string_to_bigint("1.5"), None);
        assert_eq!(string_to_bigint("1n"), None);
    }

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(number_to_string(42.0), "42");
        assert_eq!(number_to_string(0.1), "0.1");
        assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(123456789012345680000.0), "123456789012345680000");
        assert_eq!(number_to_string(1e-7), "1e-7");
        assert_eq!(number_to_string(0.000001), "0.000001");
        assert_eq!(number_to_string(-1.5e300), "-1.5e+300");
        assert_eq!(number_to_string(4294967296.0), "4294967296");
    }

    #[test]
    fn test_number_to_string_radix() {
        assert_eq!(number_to_string_radix(255.0, 16), "ff");
        assert_eq!(number_to_string_radix(-255.0, 2), "-11111111");
        assert_eq!(number_to_string_radix(0.5, 2), "0.1");
        assert_eq!(number_to_string_radix(35.0, 36), "z");
        assert_eq!(number_to_string_radix(0.0, 16), "0");
    }

    #[test]
    fn test_int_conversions() {
        assert_eq!(to_int32(f64::NAN), 0);
        assert_eq!(to_int32(f64::INFINITY), 0);
        assert_eq!(to_int32(-3.7), -3);
        assert_eq!(to_int32(2147483648.0), -2147483648);
        assert_eq!(to_int32(4294967296.0 + 5.0), 5);
        assert_eq!(to_int32(-4294967297.0), -1);
        assert_eq!(to_int32(1e20), 1661992960);
        assert_eq!(to_uint32(-1.0), 4294967295);
        assert_eq!(to_uint32(f64::NEG_INFINITY), 0);
        assert_eq!(to_uint16(65537.0), 1);
        assert_eq!(to_uint16(-1.0), 65535);
        assert_eq!(to_uint16(f64::INFINITY), 0);
        assert_eq!(to_int16(32768.0), -32768);
        assert_eq!(to_int8(255.0), -1);
        assert_eq!(to_uint8(256.0), 0);
    }

    #[test]
    fn test_uint8_clamp() {
        assert_eq!(to_uint8_clamp(-5.0), 0);
        assert_eq!(to_uint8_clamp(300.0), 255);
        assert_eq!(to_uint8_clamp(1.5), 2);
        assert_eq!(to_uint8_clamp(2.5), 2);
        assert_eq!(to_uint8_clamp(2.6), 3);
        assert_eq!(to_uint8_clamp(f64::NAN), 0);
    }

    #[test]
    fn test_to_length() {
        assert_eq!(to_length(-1.0), 0.0);
        assert_eq!(to_length(f64::INFINITY), MAX_SAFE_INTEGER);
        assert_eq!(to_length(3.9), 3.0);
        assert!(!to_integer_or_infinity(-0.5).is_sign_negative());
    }

    #[test]
    fn test_array_index_classification() {
        assert!(is_array_index_f64(4294967294.0));
        assert!(!is_array_index_f64(4294967295.0));
        assert!(!is_array_index_f64(-1.0));
        assert!(!is_array_index_f64(1.5));
        assert!(is_array_index_i64(0));
        assert!(!is_array_index_i64(-1));
        assert_eq!(array_index_of_str("0"), Some(0));
        assert_eq!(array_index_of_str("4294967294"), Some(4294967294));
        assert_eq!(array_index_of_str("4294967295"), None);
        assert_eq!(array_index_of_str("01"), None);
        assert_eq!(array_index_of_str("12345678901"), None);
        assert_eq!(array_index_of_str("-1"), None);
        assert_eq!(array_index_of_str(""), None);
    }

    #[test]
    fn test_compare_bigint_number() {
        use std::cmp::Ordering;
        let ten = BigInt::from(10);
        assert_eq!(compare_bigint_number(&ten, 10.0), Some(Ordering::Equal));
        assert_eq!(compare_bigint_number(&ten, 10.5), Some(Ordering::Less));
        assert_eq!(compare_bigint_number(&ten, 9.5), Some(Ordering::Greater));
        assert_eq!(compare_bigint_number(&ten, f64::INFINITY), Some(Ordering::Less));
        assert_eq!(compare_bigint_number(&ten, f64::NAN), None);
    }
}

//! Immutable JavaScript strings with optional interning.
//!
//! Property names and well-known literals are interned in a process-wide
//! table keyed by content, so an interned string has exactly one canonical
//! instance. Strings produced by conversions (number formatting,
//! concatenation) are created fresh and compare by content.

use dashmap::DashMap;
use rustc_hash::FxHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

/// Content-keyed table of canonical strings
struct StringTable {
    entries: DashMap<Arc<str>, Arc<JsString>>,
}

impl StringTable {
    fn canonical(&self, s: &str) -> Arc<JsString> {
        if let Some(existing) = self.entries.get(s) {
            return existing.value().clone();
        }
        let fresh = JsString::new(s);
        self.entries
            .entry(fresh.data.clone())
            .or_insert(fresh)
            .value()
            .clone()
    }

    fn is_canonical(&self, s: &Arc<JsString>) -> bool {
        self.entries
            .get(s.as_str())
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), s))
    }
}

static INTERNED: LazyLock<StringTable> = LazyLock::new(|| StringTable {
    entries: DashMap::new(),
});

/// An immutable JavaScript string
#[derive(Clone)]
pub struct JsString {
    data: Arc<str>,
    hash: u64,
    /// `length` as scripts see it
    utf16_len: usize,
}

impl JsString {
    /// The canonical instance for `s`, created on first use
    pub fn intern(s: &str) -> Arc<Self> {
        INTERNED.canonical(s)
    }

    /// A fresh string, not entered in the intern table
    pub fn new(s: impl Into<Arc<str>>) -> Arc<Self> {
        let data: Arc<str> = s.into();
        let mut hasher = FxHasher::default();
        data.hash(&mut hasher);
        Arc::new(Self {
            utf16_len: data.encode_utf16().count(),
            hash: hasher.finish(),
            data,
        })
    }

    /// `""`
    pub fn empty() -> Arc<Self> {
        well_known::EMPTY.clone()
    }

    /// Contents
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// Length in UTF-16 code units
    #[inline]
    pub fn len_utf16(&self) -> usize {
        self.utf16_len
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Zero-length
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Content hash, computed once
    #[inline]
    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    /// `self + other` as a fresh string
    pub fn concat(&self, other: &JsString) -> Arc<Self> {
        let mut joined = String::with_capacity(self.len() + other.len());
        joined.push_str(self.as_str());
        joined.push_str(other.as_str());
        Self::new(joined)
    }

    /// Whether this is the canonical interned instance of its contents
    pub fn is_interned(self: &Arc<Self>) -> bool {
        INTERNED.is_canonical(self)
    }
}

impl fmt::Debug for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.data)
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.data)
    }
}

impl PartialEq for JsString {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.data == other.data
    }
}

impl Eq for JsString {}

impl Hash for JsString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl AsRef<str> for JsString {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Interned strings the abstract operations hand out repeatedly
pub mod well_known {
    use super::JsString;
    use std::sync::{Arc, LazyLock};

    macro_rules! interned {
        ($($name:ident = $value:literal;)+) => {
            $(
                #[doc = concat!("`\"", $value, "\"`")]
                pub static $name: LazyLock<Arc<JsString>> =
                    LazyLock::new(|| JsString::intern($value));
            )+
        };
    }

    interned! {
        EMPTY = "";
        LENGTH = "length";
        NAME = "name";
        UNDEFINED = "undefined";
        NULL = "null";
        TRUE = "true";
        FALSE = "false";
        NAN = "NaN";
        INFINITY = "Infinity";
        NEG_INFINITY = "-Infinity";
        ZERO = "0";
        DEFAULT = "default";
        NUMBER = "number";
        STRING = "string";
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_canonical() {
        let a = JsString::intern("tern-intern");
        let b = JsString::intern("tern-intern");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_interned());
    }

    #[test]
    fn test_fresh_strings_compare_by_content() {
        let interned = JsString::intern("tern");
        let fresh = JsString::new("tern");
        assert!(!Arc::ptr_eq(&interned, &fresh));
        assert_eq!(*interned, *fresh);
        assert_eq!(interned.hash_value(), fresh.hash_value());
        assert!(!fresh.is_interned());
    }

    #[test]
    fn test_concat() {
        let joined = JsString::intern("foo").concat(&JsString::new("bar"));
        assert_eq!(joined.as_str(), "foobar");
        assert_eq!(joined.to_string(), "foobar");
    }

    #[test]
    fn test_utf16_length() {
        let s = JsString::new("a😀");
        assert_eq!(s.len(), 5);
        assert_eq!(s.len_utf16(), 3);
        assert!(JsString::empty().is_empty());
        assert!(JsString::empty().is_interned());
    }
}

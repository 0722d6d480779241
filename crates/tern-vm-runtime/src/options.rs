//! Engine options.
//!
//! [`EngineOptions`] is the user-facing, serde-deserializable option set.
//! [`EngineOptions::resolve`] validates it and settles every default that
//! depends on the ECMAScript edition, producing [`ResolvedOptions`], which
//! never changes afterwards. The few options an embedder may change on a
//! pre-built engine form [`StableOptions`].

use serde::{Deserialize, Serialize};
use std::fmt;

use tern_vm_core::{VmError, VmResult};

/// ECMAScript edition number (5, 6, ..., 13)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct EcmaVersion(u8);

impl EcmaVersion {
    /// ES5
    pub const ES5: Self = Self(5);
    /// ES2015
    pub const ES2015: Self = Self(6);
    /// ES2016
    pub const ES2016: Self = Self(7);
    /// ES2017
    pub const ES2017: Self = Self(8);
    /// ES2018
    pub const ES2018: Self = Self(9);
    /// ES2019
    pub const ES2019: Self = Self(10);
    /// ES2020
    pub const ES2020: Self = Self(11);
    /// ES2021
    pub const ES2021: Self = Self(12);
    /// ES2022
    pub const ES2022: Self = Self(13);
    /// Newest supported edition
    pub const LATEST: Self = Self::ES2022;

    const FIRST_YEAR: u32 = 2015;
    const YEAR_OFFSET: u32 = 2009;

    /// Parse an edition number (`5..=13`) or a year (`2015..=2022`)
    pub fn parse(value: u32) -> VmResult<Self> {
        let edition = if value >= Self::FIRST_YEAR {
            value - Self::YEAR_OFFSET
        } else {
            value
        };
        if (Self::ES5.0 as u32..=Self::LATEST.0 as u32).contains(&edition) {
            Ok(Self(edition as u8))
        } else {
            Err(VmError::configuration(format!(
                "Unsupported ECMAScript version: {value}"
            )))
        }
    }

    /// Edition number
    pub fn edition(self) -> u32 {
        self.0 as u32
    }

    /// Publication year, or `None` for ES5
    pub fn year(self) -> Option<u32> {
        (self >= Self::ES2015).then(|| self.0 as u32 + Self::YEAR_OFFSET)
    }
}

impl Default for EcmaVersion {
    fn default() -> Self {
        Self::LATEST
    }
}

impl TryFrom<u32> for EcmaVersion {
    type Error = VmError;

    fn try_from(value: u32) -> VmResult<Self> {
        Self::parse(value)
    }
}

impl From<EcmaVersion> for u32 {
    fn from(v: EcmaVersion) -> u32 {
        v.edition()
    }
}

impl fmt::Display for EcmaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.year() {
            Some(year) => write!(f, "ES{year}"),
            None => write!(f, "ES{}", self.0),
        }
    }
}

/// Default timer resolution in nanoseconds (1 ms)
pub const DEFAULT_TIMER_RESOLUTION_NS: u64 = 1_000_000;

/// Largest string length the engine allows by default
pub const DEFAULT_STRING_LENGTH_LIMIT: usize = (1 << 30) - 24;

/// Engine options as supplied by the embedder
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineOptions {
    /// ECMAScript edition to implement
    pub ecmascript_version: EcmaVersion,
    /// Annex B legacy features (`__proto__`, `escape`, ...)
    pub annex_b: bool,
    /// ECMA-402 `Intl`
    pub intl_402: bool,
    /// Legacy `RegExp.$1`..`$9` static properties
    pub regexp_static_result: bool,
    /// `Array.prototype.sort` consults inherited elements
    pub array_sort_inherited: bool,
    /// `SharedArrayBuffer`
    pub shared_array_buffer: bool,
    /// `Atomics`
    pub atomics: bool,
    /// V8 compatibility mode
    pub v8_compat: bool,
    /// Nashorn compatibility mode
    pub nashorn_compat: bool,
    /// Back array buffers by direct host memory
    pub direct_byte_buffer: bool,
    /// Clock resolution for `Date.now` and `performance.now`, in nanoseconds.
    /// Zero disables clamping.
    pub timer_resolution: u64,
    /// `Atomics.wait` may block
    pub agent_can_block: bool,
    /// `BigInt`; derived from the edition when unset
    pub bigint: Option<bool>,
    /// `Temporal`
    pub temporal: bool,
    /// `WebAssembly`; needs a backend from the host
    pub webassembly: bool,
    /// Define `global` as an alias of the global object
    pub global_property: bool,
    /// Shell mode: defines `arguments` and shell helpers on the global object
    pub shell: bool,
    /// `console`
    pub console: bool,
    /// `print`
    pub print: bool,
    /// `load`
    pub load: bool,
    /// `performance`
    pub performance: bool,
    /// IANA time zone id; empty means the host's
    pub time_zone: String,
    /// BCP 47 locale; empty means the host's
    pub locale: String,
    /// `Error.stackTraceLimit`
    pub stack_trace_limit: u32,
    /// Maximum string length in UTF-16 units
    pub string_length_limit: usize,
    /// Maximum arguments to a single call
    pub function_arguments_limit: usize,
    /// Entries kept by the `Function` constructor cache
    pub function_constructor_cache_size: usize,
    /// Compiled regular expressions kept per realm
    pub regex_cache_size: usize,
    /// Realms may run concurrently on several threads
    pub multi_context: bool,
    /// Test262 harness mode
    pub test262_mode: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            ecmascript_version: EcmaVersion::default(),
            annex_b: true,
            intl_402: false,
            regexp_static_result: true,
            array_sort_inherited: true,
            shared_array_buffer: true,
            atomics: true,
            v8_compat: false,
            nashorn_compat: false,
            direct_byte_buffer: false,
            timer_resolution: DEFAULT_TIMER_RESOLUTION_NS,
            agent_can_block: true,
            bigint: None,
            temporal: false,
            webassembly: false,
            global_property: false,
            shell: false,
            console: true,
            print: true,
            load: true,
            performance: false,
            time_zone: String::new(),
            locale: String::new(),
            stack_trace_limit: 10,
            string_length_limit: DEFAULT_STRING_LENGTH_LIMIT,
            function_arguments_limit: 65535,
            function_constructor_cache_size: 32,
            regex_cache_size: 16,
            multi_context: false,
            test262_mode: false,
        }
    }
}

impl EngineOptions {
    /// Parse options from JSON. Unknown keys are rejected.
    pub fn from_json(json: &str) -> VmResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| VmError::configuration(format!("Invalid engine options: {e}")))?;
        if let Some(map) = value.as_object() {
            let known = serde_json::to_value(Self::default())
                .map_err(|e| VmError::configuration(e.to_string()))?;
            if let Some(unknown) = map.keys().find(|k| known.get(k.as_str()).is_none()) {
                return Err(VmError::configuration(format!(
                    "Unknown engine option: {unknown}"
                )));
            }
        }
        serde_json::from_value(value)
            .map_err(|e| VmError::configuration(format!("Invalid engine options: {e}")))
    }

    /// Validate and settle edition-dependent defaults
    pub fn resolve(&self) -> VmResult<ResolvedOptions> {
        if self.string_length_limit == 0 || self.string_length_limit > DEFAULT_STRING_LENGTH_LIMIT {
            return Err(VmError::configuration(format!(
                "string-length-limit must be in 1..={DEFAULT_STRING_LENGTH_LIMIT}"
            )));
        }
        if self.function_arguments_limit == 0 {
            return Err(VmError::configuration(
                "function-arguments-limit must be positive",
            ));
        }
        if self.regex_cache_size == 0 {
            return Err(VmError::configuration("regex-cache-size must be positive"));
        }

        let version = self.ecmascript_version;
        let es2017 = version >= EcmaVersion::ES2017;
        Ok(ResolvedOptions {
            ecmascript_version: version,
            annex_b: self.annex_b,
            intl_402: self.intl_402,
            regexp_static_result: self.regexp_static_result,
            shared_array_buffer: self.shared_array_buffer && es2017,
            atomics: self.atomics && es2017,
            nashorn_compat: self.nashorn_compat,
            agent_can_block: self.agent_can_block,
            bigint: self.bigint.unwrap_or(version >= EcmaVersion::ES2020),
            temporal: self.temporal,
            webassembly: self.webassembly,
            global_property: self.global_property || self.nashorn_compat,
            shell: self.shell,
            console: self.console,
            print: self.print,
            load: self.load,
            performance: self.performance,
            stack_trace_limit: self.stack_trace_limit,
            string_length_limit: self.string_length_limit,
            function_arguments_limit: self.function_arguments_limit,
            function_constructor_cache_size: self.function_constructor_cache_size,
            regex_cache_size: self.regex_cache_size,
            multi_context: self.multi_context,
            test262_mode: self.test262_mode,
            stable: self.stable(),
        })
    }

    /// The patchable subset of these options
    pub fn stable(&self) -> StableOptions {
        StableOptions {
            array_sort_inherited: self.array_sort_inherited,
            v8_compat: self.v8_compat,
            direct_byte_buffer: self.direct_byte_buffer,
            timer_resolution: self.timer_resolution,
            time_zone: self.time_zone.clone(),
            locale: self.locale.clone(),
        }
    }
}

/// Options fixed at engine construction
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedOptions {
    /// ECMAScript edition
    pub ecmascript_version: EcmaVersion,
    /// Annex B
    pub annex_b: bool,
    /// `Intl`
    pub intl_402: bool,
    /// Legacy RegExp statics
    pub regexp_static_result: bool,
    /// `SharedArrayBuffer` (ES2017+)
    pub shared_array_buffer: bool,
    /// `Atomics` (ES2017+)
    pub atomics: bool,
    /// Nashorn compatibility
    pub nashorn_compat: bool,
    /// `Atomics.wait` may block
    pub agent_can_block: bool,
    /// `BigInt`
    pub bigint: bool,
    /// `Temporal`
    pub temporal: bool,
    /// `WebAssembly`
    pub webassembly: bool,
    /// `global` alias
    pub global_property: bool,
    /// Shell mode
    pub shell: bool,
    /// `console`
    pub console: bool,
    /// `print`
    pub print: bool,
    /// `load`
    pub load: bool,
    /// `performance`
    pub performance: bool,
    /// `Error.stackTraceLimit`
    pub stack_trace_limit: u32,
    /// Maximum string length
    pub string_length_limit: usize,
    /// Maximum call arguments
    pub function_arguments_limit: usize,
    /// `Function` constructor cache size
    pub function_constructor_cache_size: usize,
    /// Per-realm regex cache size
    pub regex_cache_size: usize,
    /// Multi-context engine
    pub multi_context: bool,
    /// Test262 mode
    pub test262_mode: bool,
    /// Patchable options as given at construction
    pub stable: StableOptions,
}

/// Options that may change when a pre-built engine is re-initialized
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StableOptions {
    /// `Array.prototype.sort` consults inherited elements
    pub array_sort_inherited: bool,
    /// V8 compatibility mode
    pub v8_compat: bool,
    /// Direct byte buffers
    pub direct_byte_buffer: bool,
    /// Timer resolution in nanoseconds
    pub timer_resolution: u64,
    /// Time zone id
    pub time_zone: String,
    /// Locale
    pub locale: String,
}

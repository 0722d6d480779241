//! Per-realm caches: compiled regexes, date formats, the `Math.random`
//! source and the local time zone.

use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tern_vm_core::VmResult;

use crate::host::{Clock, HostEnvironment, TimeZoneResolver};
use crate::regexp_static::{RegexEngine, RegexHandle};

// ============================================================================
// Regex cache
// ============================================================================

type RegexKey = (Arc<str>, Arc<str>);

/// LRU cache of compiled regexes keyed by `(pattern, flags)`
pub struct RegexCache {
    entries: Mutex<IndexMap<RegexKey, RegexHandle>>,
    capacity: usize,
}

impl RegexCache {
    /// Cache holding at most `capacity` regexes
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(IndexMap::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Cached regex, compiling and inserting it on a miss.
    ///
    /// Compilation errors are returned and not cached.
    pub fn get_or_compile(
        &self,
        engine: &dyn RegexEngine,
        pattern: &str,
        flags: &str,
    ) -> VmResult<RegexHandle> {
        let mut entries = self.entries.lock();
        let key: RegexKey = (Arc::from(pattern), Arc::from(flags));
        if let Some(index) = entries.get_index_of(&key) {
            let last = entries.len() - 1;
            entries.move_index(index, last);
            return Ok(entries[last].clone());
        }

        let compiled = engine.compile(pattern, flags)?;
        if entries.len() >= self.capacity {
            entries.shift_remove_index(0);
        }
        entries.insert(key, compiled.clone());
        Ok(compiled)
    }

    /// Whether `(pattern, flags)` is cached
    pub fn contains(&self, pattern: &str, flags: &str) -> bool {
        self.entries
            .lock()
            .contains_key(&(Arc::from(pattern), Arc::from(flags)))
    }

    /// Number of cached regexes
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl fmt::Debug for RegexCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegexCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

// ============================================================================
// Date formats
// ============================================================================

/// Date rendering styles used by `Date.prototype`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DateFormatKind {
    /// `toISOString`
    Iso,
    /// `toUTCString`
    Utc,
    /// `toString`
    Local,
    /// `toDateString`
    DateOnly,
    /// `toTimeString`
    TimeOnly,
}

impl DateFormatKind {
    const ALL: [DateFormatKind; 5] =
        [Self::Iso, Self::Utc, Self::Local, Self::DateOnly, Self::TimeOnly];

    fn index(self) -> usize {
        self as usize
    }

    fn pattern(self) -> &'static str {
        match self {
            Self::Iso => "%Y-%m-%dT%H:%M:%S%.3fZ",
            Self::Utc => "%a, %d %b %Y %H:%M:%S GMT",
            Self::Local => "%a %b %d %Y %H:%M:%S GMT%z",
            Self::DateOnly => "%a %b %d %Y",
            Self::TimeOnly => "%H:%M:%S GMT%z",
        }
    }

    fn uses_local_offset(self) -> bool {
        matches!(self, Self::Local | Self::DateOnly | Self::TimeOnly)
    }
}

/// A date formatter bound to one style
#[derive(Debug)]
pub struct DateFormat {
    kind: DateFormatKind,
    pattern: &'static str,
}

impl DateFormat {
    /// Formatter for `kind`
    pub fn new(kind: DateFormatKind) -> Self {
        Self {
            kind,
            pattern: kind.pattern(),
        }
    }

    /// Style
    pub fn kind(&self) -> DateFormatKind {
        self.kind
    }

    /// Render a time value. `offset_seconds` applies to the local styles.
    pub fn format(&self, epoch_ms: f64, offset_seconds: i32) -> String {
        if !epoch_ms.is_finite() {
            return "Invalid Date".to_string();
        }
        let Some(utc) = DateTime::from_timestamp_millis(epoch_ms as i64) else {
            return "Invalid Date".to_string();
        };
        let offset = if self.kind.uses_local_offset() { offset_seconds } else { 0 };
        match FixedOffset::east_opt(offset) {
            Some(zone) => utc.with_timezone(&zone).format(self.pattern).to_string(),
            None => "Invalid Date".to_string(),
        }
    }
}

/// Lazily built formatters, one per [`DateFormatKind`]
#[derive(Default)]
pub struct DateFormatCache {
    formats: Mutex<[Option<Arc<DateFormat>>; 5]>,
}

impl DateFormatCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Formatter for `kind`
    pub fn get(&self, kind: DateFormatKind) -> Arc<DateFormat> {
        self.formats.lock()[kind.index()]
            .get_or_insert_with(|| Arc::new(DateFormat::new(kind)))
            .clone()
    }

    /// Number of formatters built so far
    pub fn built(&self) -> usize {
        let formats = self.formats.lock();
        DateFormatKind::ALL
            .iter()
            .filter(|k| formats[k.index()].is_some())
            .count()
    }

    /// Drop every formatter (after a time zone change)
    pub fn clear(&self) {
        *self.formats.lock() = Default::default();
    }
}

impl fmt::Debug for DateFormatCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DateFormatCache")
            .field("built", &self.built())
            .finish()
    }
}

// ============================================================================
// Random source
// ============================================================================

const XORSHIFT_MULTIPLIER: u64 = 0x2545_F491_4F6C_DD1D;

/// xorshift64* generator backing `Math.random`
pub struct RandomSource {
    state: Mutex<u64>,
}

impl RandomSource {
    /// Generator seeded from the OS, or from the clock if the OS source fails
    pub fn new() -> Self {
        let mut bytes = [0u8; 8];
        let seed = match getrandom::fill(&mut bytes) {
            Ok(()) => u64::from_le_bytes(bytes),
            Err(e) => {
                tracing::warn!(
                    target: "tern::realm",
                    error = %e,
                    "OS random source unavailable, seeding from clock"
                );
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(0)
            }
        };
        Self::with_seed(seed)
    }

    /// Deterministic generator
    pub fn with_seed(seed: u64) -> Self {
        // A zero state would stay zero forever.
        let seed = if seed == 0 { XORSHIFT_MULTIPLIER } else { seed };
        Self {
            state: Mutex::new(seed),
        }
    }

    /// Next raw 64-bit value
    pub fn next_u64(&self) -> u64 {
        let mut state = self.state.lock();
        let mut x = *state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        *state = x;
        x.wrapping_mul(XORSHIFT_MULTIPLIER)
    }

    /// Uniform value in `[0, 1)`
    pub fn next_f64(&self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

impl Default for RandomSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RandomSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RandomSource")
    }
}

// ============================================================================
// Local time zone
// ============================================================================

/// The realm's local time zone id and offset lookup
pub struct LocalTimeZone {
    resolver: Arc<dyn TimeZoneResolver>,
    configured: Mutex<Option<Arc<str>>>,
    resolved: Mutex<Option<Arc<str>>>,
}

impl LocalTimeZone {
    /// `configured` is the `time-zone` option; empty means the host's zone
    pub fn new(resolver: Arc<dyn TimeZoneResolver>, configured: &str) -> Self {
        Self {
            resolver,
            configured: Mutex::new((!configured.is_empty()).then(|| Arc::from(configured))),
            resolved: Mutex::new(None),
        }
    }

    /// IANA id of the local zone, resolved once
    pub fn id(&self) -> Arc<str> {
        let mut resolved = self.resolved.lock();
        if let Some(id) = resolved.as_ref() {
            return id.clone();
        }
        let id = match self.configured.lock().clone() {
            Some(id) => id,
            None => Arc::from(self.resolver.system_time_zone()),
        };
        *resolved = Some(id.clone());
        id
    }

    /// Replace the local zone. An empty id returns to the host's zone.
    pub fn set(&self, id: &str) {
        *self.configured.lock() = (!id.is_empty()).then(|| Arc::from(id));
        *self.resolved.lock() = None;
    }

    /// Local time zone adjustment at `epoch_ms`, in milliseconds
    pub fn local_tza(&self, epoch_ms: f64) -> f64 {
        let id = self.id();
        match self.resolver.offset_seconds(&id, epoch_ms) {
            Some(seconds) => seconds as f64 * 1000.0,
            None => {
                tracing::warn!(target: "tern::realm", zone = %id, "unknown time zone, using UTC");
                0.0
            }
        }
    }
}

impl fmt::Debug for LocalTimeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTimeZone")
            .field("resolved", &*self.resolved.lock())
            .finish()
    }
}

/// Round `nanos` down to a multiple of `resolution`. Zero disables clamping.
pub fn clamp_to_resolution(nanos: u64, resolution: u64) -> u64 {
    if resolution == 0 {
        nanos
    } else {
        nanos - nanos % resolution
    }
}

/// Realm view of the host clock.
///
/// Wall time is derived from the monotonic clock plus an offset fixed at
/// realm creation, so `Date.now()` never runs backwards.
pub struct RealmClock {
    clock: Arc<dyn Clock>,
    origin_nanos: u64,
    nano_time_offset: i128,
}

impl RealmClock {
    /// Clock anchored at the current instant
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let origin_nanos = clock.monotonic_nanos();
        let epoch_nanos = (clock.epoch_millis() * 1_000_000.0) as i128;
        Self {
            nano_time_offset: epoch_nanos - origin_nanos as i128,
            origin_nanos,
            clock,
        }
    }

    /// Offset between the monotonic clock and the Unix epoch, in nanoseconds
    pub fn nano_time_offset(&self) -> i128 {
        self.nano_time_offset
    }

    /// `Date.now()`, clamped to `resolution` nanoseconds
    pub fn current_time_millis(&self, resolution: u64) -> f64 {
        let nanos = self.clock.monotonic_nanos() as i128 + self.nano_time_offset;
        let nanos = clamp_to_resolution(nanos.max(0) as u64, resolution);
        (nanos / 1_000_000) as f64
    }

    /// `performance.now()`: milliseconds since realm creation
    pub fn performance_now(&self, resolution: u64) -> f64 {
        let elapsed = self.clock.monotonic_nanos().saturating_sub(self.origin_nanos);
        clamp_to_resolution(elapsed, resolution) as f64 / 1_000_000.0
    }
}

impl fmt::Debug for RealmClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealmClock")
            .field("nano_time_offset", &self.nano_time_offset)
            .finish()
    }
}

// ============================================================================
// Aggregate
// ============================================================================

/// Every per-realm cache
#[derive(Debug)]
pub struct RealmCaches {
    /// Compiled regexes
    pub regex: RegexCache,
    /// Date formatters
    pub date_formats: DateFormatCache,
    /// `Math.random`
    pub random: RandomSource,
    /// Local time zone
    pub time_zone: LocalTimeZone,
    /// Wall and monotonic time
    pub clock: RealmClock,
}

impl RealmCaches {
    /// Fresh caches over `host`'s clock and time zones
    pub fn new(regex_capacity: usize, host: &HostEnvironment, time_zone: &str) -> Self {
        Self {
            regex: RegexCache::new(regex_capacity),
            date_formats: DateFormatCache::new(),
            random: RandomSource::new(),
            time_zone: LocalTimeZone::new(host.time_zones().clone(), time_zone),
            clock: RealmClock::new(host.clock().clone()),
        }
    }

    /// Render `epoch_ms` in `kind`, using the local zone's offset at that time
    pub fn format_date(&self, kind: DateFormatKind, epoch_ms: f64) -> String {
        let offset_ms = self.time_zone.local_tza(epoch_ms);
        self.date_formats
            .get(kind)
            .format(epoch_ms, (offset_ms / 1000.0) as i32)
    }

    /// Change the local time zone and drop everything derived from it
    pub fn set_local_time_zone(&self, id: &str) {
        self.time_zone.set(id);
        self.date_formats.clear();
    }

    /// Drop cached state (on realm disposal)
    pub fn clear(&self) {
        self.regex.clear();
        self.date_formats.clear();
    }
}

//! Host environment bindings.
//!
//! Everything a realm needs from the embedding process: program arguments,
//! environment variables, output sinks, clocks, time zone lookup and the
//! optional WebAssembly and regex back ends.

use chrono::{FixedOffset, Local, Offset, TimeZone, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::regexp_static::RegexEngine;

/// Shared byte sink
pub type OutputSink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Wrap a writer as an [`OutputSink`]
pub fn sink(writer: impl Write + Send + 'static) -> OutputSink {
    Arc::new(Mutex::new(Box::new(writer)))
}

/// Time source
pub trait Clock: Send + Sync {
    /// Monotonic nanoseconds since an arbitrary origin
    fn monotonic_nanos(&self) -> u64;

    /// Milliseconds since the Unix epoch
    fn epoch_millis(&self) -> f64;
}

/// Clock backed by `std::time`
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Clock whose monotonic origin is now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic_nanos(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn epoch_millis(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
    epoch_origin_ms: u64,
}

impl ManualClock {
    /// Clock at monotonic 0 whose wall time starts at `epoch_origin_ms`
    pub fn new(epoch_origin_ms: u64) -> Self {
        Self {
            nanos: AtomicU64::new(0),
            epoch_origin_ms,
        }
    }

    /// Move forward by `nanos`
    pub fn advance(&self, nanos: u64) {
        self.nanos.fetch_add(nanos, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn monotonic_nanos(&self) -> u64 {
        self.nanos.load(Ordering::Relaxed)
    }

    fn epoch_millis(&self) -> f64 {
        self.epoch_origin_ms as f64 + self.monotonic_nanos() as f64 / 1_000_000.0
    }
}

/// Time zone lookup
pub trait TimeZoneResolver: Send + Sync {
    /// IANA id of the host's zone
    fn system_time_zone(&self) -> String;

    /// Offset from UTC of `zone` at `epoch_ms`, in seconds. `None` when the
    /// zone is unknown to this resolver.
    fn offset_seconds(&self, zone: &str, epoch_ms: f64) -> Option<i32>;
}

/// Resolver using `iana-time-zone` for the host zone and `chrono` for offsets.
///
/// Knows UTC aliases, fixed offsets such as `+05:30`, and the host zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeZone;

const UTC_ALIASES: [&str; 6] = ["UTC", "Etc/UTC", "GMT", "Etc/GMT", "Z", "Universal"];

impl TimeZoneResolver for SystemTimeZone {
    fn system_time_zone(&self) -> String {
        match iana_time_zone::get_timezone() {
            Ok(zone) => zone,
            Err(e) => {
                tracing::warn!(
                    target: "tern::realm",
                    error = %e,
                    "cannot determine host time zone, using UTC"
                );
                "UTC".to_string()
            }
        }
    }

    fn offset_seconds(&self, zone: &str, epoch_ms: f64) -> Option<i32> {
        if UTC_ALIASES.contains(&zone) {
            return Some(0);
        }
        if let Ok(fixed) = zone.parse::<FixedOffset>() {
            return Some(fixed.local_minus_utc());
        }
        if zone == self.system_time_zone() {
            let instant = Utc.timestamp_millis_opt(epoch_ms as i64).single()?;
            let offset = Local.offset_from_utc_datetime(&instant.naive_utc());
            return Some(offset.fix().local_minus_utc());
        }
        None
    }
}

/// Resolver with one fixed zone, for tests and sandboxed hosts
#[derive(Debug, Clone)]
pub struct FixedTimeZone {
    /// Zone id
    pub id: String,
    /// Offset in seconds
    pub offset_seconds: i32,
}

impl TimeZoneResolver for FixedTimeZone {
    fn system_time_zone(&self) -> String {
        self.id.clone()
    }

    fn offset_seconds(&self, zone: &str, _epoch_ms: f64) -> Option<i32> {
        if zone == self.id {
            Some(self.offset_seconds)
        } else if UTC_ALIASES.contains(&zone) {
            Some(0)
        } else {
            None
        }
    }
}

/// WebAssembly back end provided by the host
pub trait WasmBackend: Send + Sync {
    /// Back end name, for diagnostics
    fn name(&self) -> &str;

    /// Whether `bytes` is a valid module
    fn validate(&self, bytes: &[u8]) -> bool;
}

/// Bindings between the engine and its host process
pub struct HostEnvironment {
    arguments: Vec<String>,
    env: IndexMap<String, String>,
    out: OutputSink,
    err: OutputSink,
    clock: Arc<dyn Clock>,
    time_zones: Arc<dyn TimeZoneResolver>,
    wasm: Option<Arc<dyn WasmBackend>>,
    regex: Option<Arc<dyn RegexEngine>>,
}

impl HostEnvironment {
    /// Builder with process defaults (stdout, stderr, system clock)
    pub fn builder() -> HostEnvironmentBuilder {
        HostEnvironmentBuilder::default()
    }

    /// Program arguments
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Environment variables, in insertion order
    pub fn env(&self) -> &IndexMap<String, String> {
        &self.env
    }

    /// Look up one environment variable
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }

    /// Standard output sink
    pub fn out(&self) -> &OutputSink {
        &self.out
    }

    /// Standard error sink
    pub fn err(&self) -> &OutputSink {
        &self.err
    }

    /// Write a line to the output sink
    pub fn print_line(&self, line: &str) -> io::Result<()> {
        let mut out = self.out.lock();
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()
    }

    /// Write a line to the error sink
    pub fn print_error_line(&self, line: &str) -> io::Result<()> {
        let mut err = self.err.lock();
        err.write_all(line.as_bytes())?;
        err.write_all(b"\n")?;
        err.flush()
    }

    /// Clock
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Time zone resolver
    pub fn time_zones(&self) -> &Arc<dyn TimeZoneResolver> {
        &self.time_zones
    }

    /// WebAssembly back end, if any
    pub fn wasm_backend(&self) -> Option<&Arc<dyn WasmBackend>> {
        self.wasm.as_ref()
    }

    /// Regex engine, if any
    pub fn regex_engine(&self) -> Option<&Arc<dyn RegexEngine>> {
        self.regex.as_ref()
    }
}

impl Default for HostEnvironment {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for HostEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostEnvironment")
            .field("arguments", &self.arguments)
            .field("env", &self.env.len())
            .field("wasm", &self.wasm.as_ref().map(|w| w.name().to_string()))
            .field("regex", &self.regex.is_some())
            .finish()
    }
}

/// Builder for [`HostEnvironment`]
pub struct HostEnvironmentBuilder {
    arguments: Vec<String>,
    env: IndexMap<String, String>,
    out: Option<OutputSink>,
    err: Option<OutputSink>,
    clock: Option<Arc<dyn Clock>>,
    time_zones: Option<Arc<dyn TimeZoneResolver>>,
    wasm: Option<Arc<dyn WasmBackend>>,
    regex: Option<Arc<dyn RegexEngine>>,
}

impl Default for HostEnvironmentBuilder {
    fn default() -> Self {
        Self {
            arguments: Vec::new(),
            env: IndexMap::new(),
            out: None,
            err: None,
            clock: None,
            time_zones: None,
            wasm: None,
            regex: None,
        }
    }
}

impl HostEnvironmentBuilder {
    /// Program arguments
    pub fn arguments<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add one environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Copy the process environment
    pub fn inherit_env(mut self) -> Self {
        self.env.extend(std::env::vars());
        self
    }

    /// Output sink
    pub fn stdout(mut self, out: OutputSink) -> Self {
        self.out = Some(out);
        self
    }

    /// Error sink
    pub fn stderr(mut self, err: OutputSink) -> Self {
        self.err = Some(err);
        self
    }

    /// Clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Time zone resolver
    pub fn time_zones(mut self, resolver: Arc<dyn TimeZoneResolver>) -> Self {
        self.time_zones = Some(resolver);
        self
    }

    /// WebAssembly back end
    pub fn wasm_backend(mut self, backend: Arc<dyn WasmBackend>) -> Self {
        self.wasm = Some(backend);
        self
    }

    /// Regex engine
    pub fn regex_engine(mut self, engine: Arc<dyn RegexEngine>) -> Self {
        self.regex = Some(engine);
        self
    }

    /// Finish
    pub fn build(self) -> HostEnvironment {
        HostEnvironment {
            arguments: self.arguments,
            env: self.env,
            out: self.out.unwrap_or_else(|| sink(io::stdout())),
            err: self.err.unwrap_or_else(|| sink(io::stderr())),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            time_zones: self.time_zones.unwrap_or_else(|| Arc::new(SystemTimeZone)),
            wasm: self.wasm,
            regex: self.regex,
        }
    }
}

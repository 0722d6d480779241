//! # Tern VM Runtime
//!
//! Engine and realm lifecycle for the Tern VM, providing:
//! - Engine options and the engine-wide configuration
//! - Builtin function templates shared across realms
//! - Speculation guards
//! - Staged intrinsic bootstrap
//! - Global environments (realms), child realms and the current-realm scope
//! - Legacy RegExp statics, per-realm caches and the job queue
//! - Host bindings (output, clocks, time zones, regex and WebAssembly back ends)

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod agent;
pub mod builtins;
pub mod caches;
pub mod engine;
pub mod guards;
pub mod host;
pub mod intrinsics;
pub mod module_loader;
pub mod options;
pub mod realm;
pub mod regexp_static;

// Re-export main types
pub use agent::{Agent, Job};
pub use builtins::{BuiltinDescriptor, BuiltinFunctionKey, FunctionTemplate, TemplateKind};
pub use caches::{DateFormatKind, RealmCaches};
pub use engine::{EngineConfig, EngineConfigBuilder, UpdatePhase};
pub use guards::{GuardKind, GuardSet};
pub use host::{Clock, HostEnvironment, ManualClock, SystemClock, TimeZoneResolver, WasmBackend};
pub use intrinsics::{Intrinsics, Stage};
pub use module_loader::ModuleLoader;
pub use options::{EcmaVersion, EngineOptions, ResolvedOptions, StableOptions};
pub use realm::{GlobalEnvironment, RealmId, RealmScope};
pub use regexp_static::{CompiledRegex, RegexEngine, RegexHandle, RegexMatch, StaticRegexResult};

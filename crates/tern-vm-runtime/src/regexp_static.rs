//! Legacy RegExp static properties (`RegExp.$1`, `RegExp.lastMatch`, ...).
//!
//! Every successful `exec` updates the realm's last match. Materializing a
//! match object on every call would be wasteful when nothing ever reads the
//! statics, so while the `RegExpStaticResultUnused` guard holds only the
//! inputs of the match are stored (`Lazy`). The first read recomputes the
//! match, invalidates the guard and stores the result (`Eager`); from then on
//! every exec stores its result directly.
//!
//! ```text
//! Unused --set--> Lazy --read--> Eager --set--> Eager
//! ```

use parking_lot::Mutex;
use smallvec::SmallVec;
use std::any::Any;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use tern_vm_core::{SpeculationGuard, VmError, VmResult};

/// A compiled regular expression owned by a [`RegexEngine`]
pub trait CompiledRegex: Send + Sync + fmt::Debug {
    /// Pattern source
    fn source(&self) -> &str;

    /// Flags
    fn flags(&self) -> &str;

    /// Downcast support for the owning engine
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a compiled regex
pub type RegexHandle = Arc<dyn CompiledRegex>;

/// Regex back end provided by the host
pub trait RegexEngine: Send + Sync {
    /// Compile `pattern` with `flags`
    fn compile(&self, pattern: &str, flags: &str) -> VmResult<RegexHandle>;

    /// Match `regex` against `input` starting at byte offset `from_index`
    fn exec(&self, regex: &RegexHandle, input: &str, from_index: usize) -> Option<RegexMatch>;
}

/// Result of a successful match.
///
/// `captures[0]` is the whole match; offsets are byte ranges into `input`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegexMatch {
    input: Arc<str>,
    captures: SmallVec<[Option<Range<usize>>; 10]>,
}

impl RegexMatch {
    /// Build a match. Panics if a capture lies outside `input`.
    pub fn new(input: Arc<str>, captures: impl IntoIterator<Item = Option<Range<usize>>>) -> Self {
        let captures: SmallVec<[Option<Range<usize>>; 10]> = captures.into_iter().collect();
        for range in captures.iter().flatten() {
            if range.end > input.len() || range.start > range.end {
                tern_vm_core::invariant_violation!(
                    "capture {range:?} outside input of length {}",
                    input.len()
                );
            }
        }
        Self { input, captures }
    }

    /// The match reported before any exec ran
    pub fn empty() -> Self {
        Self {
            input: Arc::from(""),
            captures: SmallVec::new(),
        }
    }

    /// Whether this is the empty result
    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }

    /// Subject string
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Number of capture groups, excluding the whole match
    pub fn group_count(&self) -> usize {
        self.captures.len().saturating_sub(1)
    }

    /// Byte range of the whole match
    pub fn range(&self) -> Option<Range<usize>> {
        self.captures.first().cloned().flatten()
    }

    fn capture(&self, n: usize) -> &str {
        match self.captures.get(n) {
            Some(Some(range)) => &self.input[range.clone()],
            _ => "",
        }
    }

    /// `RegExp.$n`
    pub fn dollar(&self, n: usize) -> &str {
        if n == 0 { "" } else { self.capture(n) }
    }

    /// `RegExp.lastMatch`
    pub fn last_match(&self) -> &str {
        self.capture(0)
    }

    /// `RegExp.lastParen`
    pub fn last_paren(&self) -> &str {
        match self.group_count() {
            0 => "",
            n => self.capture(n),
        }
    }

    /// `RegExp.leftContext`
    pub fn left_context(&self) -> &str {
        match self.range() {
            Some(r) => &self.input[..r.start],
            None => "",
        }
    }

    /// `RegExp.rightContext`
    pub fn right_context(&self) -> &str {
        match self.range() {
            Some(r) => &self.input[r.end..],
            None => "",
        }
    }
}

/// Last-match storage
#[derive(Clone, Debug, Default)]
pub enum StaticRegexResult {
    /// No exec has run in this realm
    #[default]
    Unused,
    /// Inputs of the last match, recomputed on demand
    Lazy {
        /// Regex that matched
        regex: RegexHandle,
        /// Subject string
        input: Arc<str>,
        /// Start offset of the exec
        from_index: usize,
    },
    /// Materialized last match
    Eager {
        /// The match
        result: Arc<RegexMatch>,
    },
}

impl StaticRegexResult {
    /// State name, for logs and tests
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Unused => "unused",
            Self::Lazy { .. } => "lazy",
            Self::Eager { .. } => "eager",
        }
    }
}

#[derive(Default)]
struct Inner {
    result: StaticRegexResult,
    /// `RegExp.input`, which scripts may overwrite
    input: Arc<str>,
    /// `m` flag of the last regex that matched
    multiline: bool,
    invalidated: bool,
}

/// Per-realm RegExp static state
#[derive(Default)]
pub struct RegExpStatics {
    inner: Mutex<Inner>,
}

impl RegExpStatics {
    /// Fresh, unused state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a successful exec.
    ///
    /// `eager_result` is only consulted once `guard` has been invalidated.
    pub fn set(
        &self,
        guard: &SpeculationGuard,
        regex: RegexHandle,
        input: Arc<str>,
        from_index: usize,
        eager_result: impl FnOnce() -> RegexMatch,
    ) {
        let mut inner = self.inner.lock();
        inner.invalidated = false;
        inner.input = input.clone();
        inner.multiline = regex.flags().contains('m');
        inner.result = if guard.is_valid() {
            StaticRegexResult::Lazy {
                regex,
                input,
                from_index,
            }
        } else {
            StaticRegexResult::Eager {
                result: Arc::new(eager_result()),
            }
        };
    }

    /// The last match, materializing it if only its inputs were stored
    pub fn get(
        &self,
        guard: &SpeculationGuard,
        engine: Option<&dyn RegexEngine>,
    ) -> VmResult<Arc<RegexMatch>> {
        let mut inner = self.inner.lock();
        let (regex, input, from_index) = match &inner.result {
            StaticRegexResult::Unused => return Ok(Arc::new(RegexMatch::empty())),
            StaticRegexResult::Eager { result } => return Ok(result.clone()),
            StaticRegexResult::Lazy {
                regex,
                input,
                from_index,
            } => (regex.clone(), input.clone(), *from_index),
        };
        let Some(engine) = engine else {
            return Err(VmError::configuration(
                "RegExp static result requested without a regex engine",
            ));
        };
        if guard.invalidate("RegExp static result read") {
            tracing::debug!(
                target: "tern::regexp",
                pattern = regex.source(),
                "static regexp result materialized"
            );
        }
        let result = Arc::new(
            engine
                .exec(&regex, &input, from_index)
                .unwrap_or_else(RegexMatch::empty),
        );
        inner.result = StaticRegexResult::Eager {
            result: result.clone(),
        };
        Ok(result)
    }

    /// Mark the statics unusable until the next successful exec
    pub fn invalidate(&self) {
        self.inner.lock().invalidated = true;
    }

    /// Whether [`RegExpStatics::invalidate`] ran since the last exec
    pub fn is_invalidated(&self) -> bool {
        self.inner.lock().invalidated
    }

    /// Current state
    pub fn state(&self) -> StaticRegexResult {
        self.inner.lock().result.clone()
    }

    /// `RegExp.input`
    pub fn input(&self) -> Arc<str> {
        self.inner.lock().input.clone()
    }

    /// `RegExp.multiline`: whether the last regex that matched had the `m`
    /// flag. Reading it never materializes the match.
    pub fn multiline(&self) -> bool {
        self.inner.lock().multiline
    }

    /// `RegExp.input = value`
    pub fn set_input(&self, input: Arc<str>) {
        self.inner.lock().input = input;
    }
}

impl fmt::Debug for RegExpStatics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("RegExpStatics")
            .field("state", &inner.result.state_name())
            .field("invalidated", &inner.invalidated)
            .finish()
    }
}

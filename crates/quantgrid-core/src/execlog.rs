//! Per-item execution log capture.
//!
//! Function code runs arbitrary library logic on the node's worker thread;
//! whatever it logs during one item must end up attributed to exactly that
//! item. The node hands each invocation a `MutableExecutionLog` through the
//! function context (explicit passing, no thread-local state), then freezes
//! it into the immutable `ExecutionLog` carried by the result item.
//!
//! The capture mode is chosen by the coordinator per item:
//!   None       — nothing is recorded, indicator flags read false.
//!   Indicators — only "did an info/warn/error event occur" bits.
//!   Full       — the ordered event list, and a stack trace on failure.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ── Modes and events ──────────────────────────────────────────────────────────

/// How much log detail to retain for one item execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionLogMode {
    None,
    Indicators,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One event emitted by function code during an item execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    /// Unix ms at emission.
    pub timestamp_ms: u64,
}

/// Failure detail recorded when an item's function threw.
///
/// `kind` is the error category or type name reported by the function
/// ("panic" for contained panics). The stack trace is present only when the
/// item ran under `Full` capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionDetail {
    pub kind: String,
    pub message: String,
    pub stack_trace: Option<String>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ── Immutable log ─────────────────────────────────────────────────────────────

/// The sealed log carried by a `CalculationJobResultItem`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    mode: ExecutionLogMode,
    has_info: bool,
    has_warn: bool,
    has_error: bool,
    /// Ordered events. Populated only under `Full` capture.
    events: Option<Vec<LogEvent>>,
    exception: Option<ExceptionDetail>,
}

impl ExecutionLog {
    /// An empty log under the given mode.
    pub fn empty(mode: ExecutionLogMode) -> Self {
        Self {
            mode,
            has_info: false,
            has_warn: false,
            has_error: false,
            events: match mode {
                ExecutionLogMode::Full => Some(Vec::new()),
                _ => None,
            },
            exception: None,
        }
    }

    pub fn mode(&self) -> ExecutionLogMode {
        self.mode
    }

    pub fn has_info(&self) -> bool {
        self.has_info
    }

    pub fn has_warn(&self) -> bool {
        self.has_warn
    }

    pub fn has_error(&self) -> bool {
        self.has_error
    }

    /// The ordered event list. None unless the item ran under `Full` capture.
    pub fn events(&self) -> Option<&[LogEvent]> {
        self.events.as_deref()
    }

    /// Failure detail. None unless the item's function threw.
    pub fn exception(&self) -> Option<&ExceptionDetail> {
        self.exception.as_ref()
    }
}

// ── Mutable collector ─────────────────────────────────────────────────────────

/// Collector the node attaches to one item execution.
#[derive(Debug)]
pub struct MutableExecutionLog {
    mode: ExecutionLogMode,
    has_info: bool,
    has_warn: bool,
    has_error: bool,
    events: Vec<LogEvent>,
    exception: Option<ExceptionDetail>,
}

impl MutableExecutionLog {
    pub fn new(mode: ExecutionLogMode) -> Self {
        Self {
            mode,
            has_info: false,
            has_warn: false,
            has_error: false,
            events: Vec::new(),
            exception: None,
        }
    }

    pub fn mode(&self) -> ExecutionLogMode {
        self.mode
    }

    /// Record one event. Dropped entirely under `None`; indicator-only under
    /// `Indicators`; retained in order under `Full`.
    pub fn add(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.mode == ExecutionLogMode::None {
            return;
        }
        match level {
            LogLevel::Info => self.has_info = true,
            LogLevel::Warn => self.has_warn = true,
            LogLevel::Error => self.has_error = true,
        }
        if self.mode == ExecutionLogMode::Full {
            self.events.push(LogEvent {
                level,
                message: message.into(),
                timestamp_ms: now_ms(),
            });
        }
    }

    /// Record the failure that ended this item. The caller supplies a trace
    /// only under `Full` capture.
    pub fn set_exception(
        &mut self,
        kind: impl Into<String>,
        message: impl Into<String>,
        stack_trace: Option<String>,
    ) {
        self.exception = Some(ExceptionDetail {
            kind: kind.into(),
            message: message.into(),
            stack_trace,
        });
    }

    /// Seal into the immutable form carried by the result item.
    pub fn freeze(self) -> ExecutionLog {
        ExecutionLog {
            mode: self.mode,
            has_info: self.has_info,
            has_warn: self.has_warn,
            has_error: self.has_error,
            events: match self.mode {
                ExecutionLogMode::Full => Some(self.events),
                _ => None,
            },
            exception: self.exception,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

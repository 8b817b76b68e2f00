//! Termination reasons.
//!
//! Every termination trigger produces exactly one [`TerminationReason`], which
//! is handed to each hook that runs for it. Reasons serialize to the tagged
//! `{"category": ...}` shape so hooks can log or forward them as JSON.

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// A termination signal the driver listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TerminationSignal {
    /// Hangup (console close on Windows).
    #[serde(rename = "SIGHUP")]
    Hup,
    /// Interrupt (Ctrl+C).
    #[serde(rename = "SIGINT")]
    Int,
    /// Polite termination request.
    #[serde(rename = "SIGTERM")]
    Term,
    /// Ctrl+Break (Windows only).
    #[serde(rename = "SIGBREAK")]
    Break,
}

/// Exit status for each signal: 128 plus the platform signal number.
pub const SIGNAL_EXIT_CODES: [(TerminationSignal, i32); 4] = [
    (TerminationSignal::Hup, 129),
    (TerminationSignal::Int, 130),
    (TerminationSignal::Term, 143),
    (TerminationSignal::Break, 149),
];

impl TerminationSignal {
    /// All signals, in table order.
    pub const ALL: [TerminationSignal; 4] = [Self::Hup, Self::Int, Self::Term, Self::Break];

    /// Conventional signal name, e.g. `"SIGINT"`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Hup => "SIGHUP",
            Self::Int => "SIGINT",
            Self::Term => "SIGTERM",
            Self::Break => "SIGBREAK",
        }
    }

    /// Status the process exits with after handling this signal.
    pub fn exit_code(self) -> i32 {
        SIGNAL_EXIT_CODES
            .iter()
            .find(|(signal, _)| *signal == self)
            .map_or(128, |(_, code)| *code)
    }
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TerminationSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|signal| signal.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown termination signal: {s}"))
    }
}

/// Where a thrown value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrownOrigin {
    /// A panic unwound out of the main future or was reported by the panic hook.
    Panic,
    /// The main future resolved with an error nobody handled.
    UnhandledError,
}

/// The error or panic payload behind an exception termination.
///
/// Cheap to clone. Serializes as its message.
#[derive(Clone)]
pub struct Thrown {
    message: String,
    origin: ThrownOrigin,
    error: Option<Arc<anyhow::Error>>,
}

impl Thrown {
    /// Wrap an error returned by the main future.
    pub fn from_error(error: anyhow::Error) -> Self {
        Self {
            message: error.to_string(),
            origin: ThrownOrigin::UnhandledError,
            error: Some(Arc::new(error)),
        }
    }

    /// Wrap a panic payload.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::panicked(panic_message(payload))
    }

    /// A panic whose payload was already rendered to a message.
    pub fn panicked(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            origin: ThrownOrigin::Panic,
            error: None,
        }
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this came from a panic or an unhandled error.
    pub fn origin(&self) -> ThrownOrigin {
        self.origin
    }

    /// The underlying error, for unhandled errors.
    pub fn error(&self) -> Option<&anyhow::Error> {
        self.error.as_deref()
    }
}

impl fmt::Debug for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thrown")
            .field("message", &self.message)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Serialize for Thrown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.message)
    }
}

/// Why the process is terminating.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum TerminationReason {
    /// Normal completion or an explicit exit.
    #[serde(rename_all = "camelCase")]
    Trivial {
        /// Status the process exits with.
        exit_code: i32,
    },
    /// A panic or an unhandled error.
    #[serde(rename_all = "camelCase")]
    Exception {
        /// The thrown value.
        error_or_reason: Thrown,
    },
    /// An external termination signal.
    Signal {
        /// Which signal.
        signal: TerminationSignal,
    },
    /// [`terminate_with_hooks`](crate::driver::TerminationDriver::terminate_with_hooks).
    Manual {
        /// Caller-supplied payload.
        extra: serde_json::Value,
    },
}

impl TerminationReason {
    /// Category tag: `trivial`, `exception`, `signal` or `manual`.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Trivial { .. } => "trivial",
            Self::Exception { .. } => "exception",
            Self::Signal { .. } => "signal",
            Self::Manual { .. } => "manual",
        }
    }
}

/// Render a panic payload. Non-string payloads get a fixed placeholder.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

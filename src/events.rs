//! Structured warning/error events accumulated during a conversion.
//!
//! Data-quality anomalies append a warning and processing continues; input
//! availability problems are real errors and abort the run instead (see the
//! error enums in [`crate::io`]).

use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    Warning,
    Error,
}

impl Display for EventSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One recoverable event observed during a conversion phase. The caller
/// drains the accumulated list after each phase.
#[derive(Debug, Clone)]
pub struct ConversionEvent {
    pub severity: EventSeverity,
    pub message: String,
}

impl ConversionEvent {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: EventSeverity::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: EventSeverity::Error,
            message: message.into(),
        }
    }
}

impl Display for ConversionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

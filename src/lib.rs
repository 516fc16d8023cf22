pub mod backend;
pub mod config;
pub mod instance;
pub mod midi;
pub mod queue;
pub mod routing;
pub mod wakeup;

use std::fmt;

/// Position of an instance in configuration order. Queued events carry this
/// instead of a reference so producer threads never touch instance state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub usize);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error raised by the MIDI backend.
///
/// Startup errors (`Parse`, `DeviceNotFound`, `DeviceOpen`, `Io`) are fatal;
/// runtime decode and queue errors (`MalformedMessage`, `ResourceExhausted`)
/// drop the affected event and keep the backend running.
#[derive(Debug)]
pub enum BackendError {
    /// Malformed channel specification or configuration value.
    Parse(String),
    /// No input/output device matched the configured id or name prefix.
    DeviceNotFound(String),
    /// The OS refused to open or connect a matched device.
    DeviceOpen(String),
    /// The event queue could not grow; the queue was reset and the event dropped.
    ResourceExhausted,
    /// A short MIDI message arrived with fewer bytes than its status requires.
    MalformedMessage { expected: usize, actual: usize },
    /// IO error on the wakeup pipe.
    Io(std::io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Parse(s) => write!(f, "parse error: {s}"),
            BackendError::DeviceNotFound(s) => write!(f, "no device matches {s}"),
            BackendError::DeviceOpen(s) => write!(f, "failed to open device: {s}"),
            BackendError::ResourceExhausted => write!(f, "event queue exhausted"),
            BackendError::MalformedMessage { expected, actual } => {
                write!(
                    f,
                    "short message truncated: expected {expected} bytes, got {actual}"
                )
            }
            BackendError::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError::Io(e)
    }
}

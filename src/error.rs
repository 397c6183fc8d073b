use std::{error::Error, fmt, io};

use machine_learning::MlErr;

/// The result type used across the federated round logic.
pub type Result<T> = std::result::Result<T, GanErr>;

/// Failures of a federated round.
///
/// Non-finite client updates are not errors: they are zeroed and weighted out.
#[derive(Debug)]
pub enum GanErr {
    /// Weight collections that should line up don't, either in count or in shape.
    StructuralMismatch {
        what: &'static str,
        detail: String,
    },
    /// An optimizer that already holds state was bound to a training step.
    PrecheckViolation { what: &'static str, iterations: u64 },
    /// The aggregator was handed no client outputs.
    EmptyAggregation,
    /// A configuration value is out of range.
    InvalidConfig(String),
    /// A model, loss or optimizer failure.
    Ml(MlErr),
    /// A client task panicked or was cancelled.
    Task(String),
    Io(io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for GanErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GanErr::StructuralMismatch { what, detail } => {
                write!(f, "structural mismatch in {what}: {detail}")
            }
            GanErr::PrecheckViolation { what, iterations } => write!(
                f,
                "expected {what} to not have been used previously, but it already ran {iterations} iteration(s)"
            ),
            GanErr::EmptyAggregation => write!(f, "cannot aggregate an empty set of client outputs"),
            GanErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            GanErr::Ml(e) => write!(f, "machine learning error: {e}"),
            GanErr::Task(msg) => write!(f, "client task failed: {msg}"),
            GanErr::Io(e) => write!(f, "io error: {e}"),
            GanErr::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl Error for GanErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GanErr::Ml(e) => Some(e),
            GanErr::Io(e) => Some(e),
            GanErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for GanErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<io::Error> for GanErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for GanErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

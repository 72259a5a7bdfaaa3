use crate::types::Pt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LayoutError>;

#[derive(Debug, Error)]
pub enum LayoutError {
    /// The walker has no handler for this node kind.
    #[error("unsupported node kind: {0}")]
    UnsupportedNodeKind(String),

    /// A table row whose spans do not add up to the table's column count.
    #[error("malformed table: row {row} spans {found} columns, expected {expected}")]
    MalformedTable {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("measurement failed: {0}")]
    MeasurementFailure(String),

    #[error("table width {width} exceeds available width {available} beyond tolerance")]
    Overflow { width: Pt, available: Pt },

    /// The rendering sink rejected the story.
    #[error("rendering backend failed: {0}")]
    FatalBackend(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LayoutError {
    /// Node-level failures that the walker may replace with a fallback box.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LayoutError::UnsupportedNodeKind(_)
                | LayoutError::MalformedTable { .. }
                | LayoutError::MeasurementFailure(_)
                | LayoutError::Overflow { .. }
        )
    }

    /// Short stable identifier used in debug logs and counters.
    pub fn code(&self) -> &'static str {
        match self {
            LayoutError::UnsupportedNodeKind(_) => "UNSUPPORTED_NODE",
            LayoutError::MalformedTable { .. } => "MALFORMED_TABLE",
            LayoutError::MeasurementFailure(_) => "MEASUREMENT_FAILURE",
            LayoutError::Overflow { .. } => "TABLE_OVERFLOW",
            LayoutError::FatalBackend(_) => "FATAL_BACKEND",
            LayoutError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            LayoutError::Io(_) => "IO",
        }
    }
}

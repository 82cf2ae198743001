// Error types for the transformation engine.
//
// Every variant here is a precondition violation detected before any matrix
// is mutated, or an I/O/JSON failure at the CLI/config boundary. The engine
// is deterministic given its seed, so nothing here is transient and nothing
// is retried.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Column count outside the supported `1..=24` range.
    #[error("invalid column count {0} (supported: 1..={max})", max = crate::project::MAX_COLUMNS)]
    InvalidColumnCount(usize),

    #[error("note {index} is in column {column}, but the chart has {columns} columns")]
    ColumnOutOfRange {
        index: usize,
        column: usize,
        columns: usize,
    },

    #[error("note {index} ends at {end_time} before it starts at {start_time}")]
    NegativeDuration {
        index: usize,
        start_time: i64,
        end_time: i64,
    },

    /// Two notes (or a note and another note's hold body) claim the same cell.
    #[error("note {index} overlaps another note in column {column} at {time}")]
    OverlappingNotes {
        index: usize,
        column: usize,
        time: i64,
    },

    #[error("cannot concatenate matrices with {left} and {right} rows")]
    RowCountMismatch { left: usize, right: usize },

    /// A matrix cell points past the end of the event list it is projected with.
    #[error("matrix refers to note {index}, but only {events} events were given")]
    DanglingNoteRef { index: usize, events: usize },

    #[error("chart contains no notes")]
    NoNotes,

    #[error("invalid option `{name}`: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn option(name: &'static str, reason: impl Into<String>) -> Self {
        EngineError::InvalidOption {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

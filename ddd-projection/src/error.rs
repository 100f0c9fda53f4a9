use ddd_eventlog::error::EventLogError;
use ddd_eventlog::slice::Slice;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum ProjectionError {
    #[error("event log: {0}")]
    EventLog(#[from] EventLogError),

    #[error("invalid slice range: min_slice={min_slice}, max_slice={max_slice}")]
    InvalidSliceRange { min_slice: Slice, max_slice: Slice },

    #[error("invalid capacity: {capacity}, must be positive")]
    InvalidCapacity { capacity: usize },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("envelope not found: stream_id={stream_id}, seq_nr={seq_nr}")]
    EnvelopeNotFound { stream_id: String, seq_nr: u64 },

    #[error("handler failed: handler={handler}, stream_id={stream_id}, seq_nr={seq_nr}, reason={reason}")]
    Handler {
        handler: String,
        stream_id: String,
        seq_nr: u64,
        reason: String,
    },

    #[error("handler lifecycle: handler={handler}, reason={reason}")]
    Lifecycle { handler: String, reason: String },

    #[error("transaction: {0}")]
    Transaction(String),
}

impl From<serde_json::Error> for ProjectionError {
    fn from(err: serde_json::Error) -> Self {
        ProjectionError::EventLog(EventLogError::from(err))
    }
}

pub type ProjectionResult<T> = Result<T, ProjectionError>;

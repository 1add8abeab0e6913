use thiserror::Error;

/// Errors raised by dataframe operations.
///
/// Missing buffers during a filter pass are not an error: they surface as
/// [`crate::filter::FilterOutcome::NotReady`]. Malformed queries are collected
/// into [`crate::query::QueryError`] lists instead of being returned here.
#[derive(Debug, Error)]
pub enum DataframeError {
    /// Unknown column, buffer or attribute name.
    #[error("unknown {kind}: {name}")]
    InvalidReference { kind: &'static str, name: String },

    /// A buffer or column length does not match the element count it belongs to.
    #[error("size mismatch for {what}: expected {expected}, got {actual}")]
    MismatchedSize {
        what: String,
        expected: usize,
        actual: usize,
    },

    /// The mask cannot be applied as-is (e.g. an edge references an absent point).
    #[error("invalid mask: {0}")]
    InvalidMask(String),

    /// A caller-supplied argument is outside the accepted domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The numeric-buffer host failed a read, write or allocation.
    #[error("buffer I/O failed: {0}")]
    BufferIo(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl DataframeError {
    pub fn unknown_column(name: impl Into<String>) -> Self {
        Self::InvalidReference {
            kind: "column",
            name: name.into(),
        }
    }

    pub fn unknown_buffer(name: impl Into<String>) -> Self {
        Self::InvalidReference {
            kind: "buffer",
            name: name.into(),
        }
    }

    pub fn mismatched(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::MismatchedSize {
            what: what.into(),
            expected,
            actual,
        }
    }
}

pub type Result<T> = std::result::Result<T, DataframeError>;

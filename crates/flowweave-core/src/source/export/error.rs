use thiserror::Error;

/// Why a single export row could not form a record. Row errors are logged
/// and counted by the source, never surfaced as fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("expected {expected} columns, found {found}")]
    ColumnCount { expected: usize, found: usize },
    #[error("bad timestamp '{cell}'")]
    Timestamp { cell: String },
    #[error("bad frame length '{cell}'")]
    FrameLength { cell: String },
}

/// Kinds of latched failure a [`crate::Reader`] or [`crate::Writer`] can
/// record. There is deliberately no `Result`-returning API on the hot read
/// path (spec §4.1, §7): a failure is recorded once and every subsequent
/// operation degrades to a defined, inspectable no-op instead of
/// propagating an error up through call sites that were written assuming
/// infallible reads of a well-formed database file.
#[derive(thiserror::Error, Debug, Clone)]
pub enum StreamError {
    #[error("failed to open '{path}' for reading: {source}")]
    OpenForRead { path: String, source: String },

    #[error("failed to open '{path}' for writing: {source}")]
    OpenForWrite { path: String, source: String },

    #[error("failed to seek in '{path}': {source}")]
    Seek { path: String, source: String },

    #[error("failed to write to '{path}': {source}")]
    Write { path: String, source: String },

    #[error("attempted to read {requested} bytes, exceeding buffer size {capacity}")]
    ReadOverflow { requested: usize, capacity: usize },

    #[error("attempted to write {requested} bytes, exceeding buffer size {capacity}")]
    WriteOverflow { requested: usize, capacity: usize },

    #[error("failed to read {requested} bytes for string, got {actual}")]
    TruncatedString { requested: u64, actual: u64 },

    #[error("failed to rename temporary file '{tmp}' to '{dest}': {source}")]
    Promote {
        tmp: String,
        dest: String,
        source: String,
    },
}

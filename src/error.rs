use std::io;
use thiserror::Error;

/// type alias for all operations on the stock service that could fail with a [`StockError`]
pub type Result<T> = std::result::Result<T, StockError>;

/// The error variants used throughout the stock service.
/// Lower level errors from std and third party crates are wrapped here so that
/// the session loop and the binaries only ever deal with one error type.
#[derive(Debug, Error)]
pub enum StockError {
    /// errors caused by file or socket IO
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// errors caused by malformed data, either on the wire or in the backing file
    #[error("parse error: {0}")]
    Parsing(String),

    /// the backing file was loaded into a store that had already been populated.
    /// This is a fatal precondition violation, not a recoverable error
    #[error("the store was already loaded; load() must run exactly once, before any mutation")]
    AlreadyLoaded,

    /// catch-all for errors described by a plain message
    #[error("{0}")]
    StringErr(String),
}

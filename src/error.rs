//! Error types for the depot-dl library.

use thiserror::Error;

/// Errors that can occur on either side of the transfer protocol.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or incorrect shared-secret header.
    #[error("invalid or missing API key")]
    Auth,

    /// No game with this id is configured.
    #[error("unknown game: {0}")]
    GameNotFound(String),

    /// The requested file does not exist under the game root.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The resolved path would leave the game root.
    #[error("path escapes game root: {0}")]
    PathViolation(String),

    /// Requested offset is at or past the end of the file.
    #[error("offset {offset} is beyond file size {size}")]
    Range {
        /// Offset the client asked for.
        offset: u64,
        /// Actual size of the file on disk.
        size: u64,
    },

    /// The catalog's total size is zero, so there is nothing to transfer.
    #[error("game {0} has an empty catalog")]
    EmptyCatalog(String),

    /// The resolved progress is at or past the last file.
    #[error("nothing left to stream for game {0}")]
    NothingToStream(String),

    /// Directory walk or hashing failed while building a catalog.
    ///
    /// A scan failure aborts the whole catalog response; silently omitting
    /// files would corrupt the client's size and offset accounting.
    #[error("catalog scan failed at {path}: {source}")]
    Scan {
        /// Path of the entry that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A downloaded file does not hash to its catalog checksum.
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Relative path of the mismatching file.
        path: String,
        /// Checksum the catalog declared.
        expected: String,
        /// Checksum computed from the local file.
        actual: String,
    },

    /// Malformed boundary marker in a continuous stream.
    #[error("malformed stream frame: {0}")]
    Protocol(String),

    /// The server answered with an unexpected status code.
    #[error("server returned {status} for {url}")]
    ServerStatus {
        /// HTTP status code.
        status: u16,
        /// Request URL.
        url: String,
    },

    /// Configuration file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized `Result` type for depot-dl operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for gcskit.

use thiserror::Error;

/// Result type alias using gcskit's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// gcskit error types.
///
/// The variants mirror the semantic outcomes of object-store operations
/// rather than transport mechanics: a caller matching on `NotFound` does not
/// care whether the store answered 404 on a metadata endpoint or an empty
/// page on a list probe.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed URI, empty object name, or an unusable pattern.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Object or bucket does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The path exists but not as the expected kind, or a precondition
    /// such as the bucket-location gate failed.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Directory creation hit an existing directory.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Read past end-of-file. The bytes that were produced before the end
    /// was reached accompany the error.
    #[error("out of range: {context}")]
    OutOfRange {
        context: String,
        /// Bytes successfully read before running out of file.
        partial: Vec<u8>,
    },

    /// Retriable transport or server failure.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A bounded retry loop gave up.
    #[error("aborted: {0}")]
    Aborted(String),

    /// The server asked for a protocol feature this client does not speak.
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    /// Invariant violation; indicates a bug or a server-side race.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn failed_precondition(msg: impl Into<String>) -> Self {
        Error::FailedPrecondition(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Error::AlreadyExists(msg.into())
    }

    pub fn out_of_range(context: impl Into<String>, partial: Vec<u8>) -> Self {
        Error::OutOfRange {
            context: context.into(),
            partial,
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Error::Unavailable(msg.into())
    }

    pub fn aborted(msg: impl Into<String>) -> Self {
        Error::Aborted(msg.into())
    }

    pub fn unimplemented(msg: impl Into<String>) -> Self {
        Error::Unimplemented(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether retrying the failed operation may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Unavailable(_))
    }

    /// Whether this error reports a missing object or bucket.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

//! Error types for PDF parsing and signature validation.
//!
//! Every failure the verifier can report is one of these variants. The web layer
//! maps them onto a small set of [`ErrorKind`]s to decide how a failure is logged
//! and labelled on the result page.

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while reading a PDF or validating its signatures.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)] // "Invalid" prefix is intentional for clarity
pub enum Error {
    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table")]
    InvalidXref,

    /// Referenced object not found in cross-reference table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid PDF structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Circular reference detected in object graph
    #[error("Circular reference detected: object {0}")]
    CircularReference(crate::object::ObjectRef),

    /// Recursion depth limit exceeded
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),

    /// The document uses a security handler
    #[error("Encrypted documents are not supported")]
    Encrypted,

    /// Malformed CMS/PKCS#7 structure or signature dictionary
    #[error("Malformed signature: {0}")]
    Cms(String),

    /// Malformed or unusable X.509 certificate
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Algorithm the verifier does not implement
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Network retrieval of certificate or revocation data failed
    #[error("Failed to fetch {url}: {reason}")]
    Fetch {
        /// Requested URL
        url: String,
        /// Failure description
        reason: String,
    },

    /// Invalid configuration (trust roots, listen address, ...)
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse failure category used at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The uploaded bytes are not a readable PDF
    Parse,
    /// A signature is malformed or uses something we do not implement
    Signature,
    /// Certificate or revocation data could not be retrieved
    Network,
    /// Anything else (I/O, configuration)
    Internal,
}

impl ErrorKind {
    /// Short label shown next to the error message.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Parse => "malformed document",
            ErrorKind::Signature => "unsupported or malformed signature",
            ErrorKind::Network => "network failure",
            ErrorKind::Internal => "internal error",
        }
    }
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidHeader(_)
            | Error::ParseError { .. }
            | Error::InvalidXref
            | Error::ObjectNotFound(..)
            | Error::InvalidObjectType { .. }
            | Error::InvalidPdf(_)
            | Error::Decode(_)
            | Error::UnsupportedFilter(_)
            | Error::CircularReference(_)
            | Error::RecursionLimitExceeded(_)
            | Error::Encrypted => ErrorKind::Parse,
            Error::Cms(_) | Error::Certificate(_) | Error::UnsupportedAlgorithm(_) => {
                ErrorKind::Signature
            },
            Error::Fetch { .. } => ErrorKind::Network,
            Error::Io(_) | Error::Config(_) => ErrorKind::Internal,
        }
    }
}

impl From<der::Error> for Error {
    fn from(err: der::Error) -> Self {
        Error::Cms(format!("DER decoding failed: {}", err))
    }
}

//! Error types for the PDF engine.
//!
//! One crate-wide enum covers parsing, editing, encryption, signing, and
//! the image pipeline. Operations either succeed completely or return one
//! of these; partially mutated documents are never handed back.

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during document processing.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)] // "Invalid" prefix is intentional for clarity
pub enum Error {
    /// Structural parse failure: header, xref, trailer, or object syntax.
    #[error("Malformed document at byte {offset}: {reason}")]
    MalformedDocument {
        /// Byte offset nearest the failure
        offset: usize,
        /// Reason for the failure
        reason: String,
    },

    /// Page range or index outside the document, or inverted.
    #[error("Invalid page range {start}-{end}: document has {page_count} pages")]
    InvalidPageRange {
        /// First page of the requested range (1-based)
        start: usize,
        /// Last page of the requested range (1-based, inclusive)
        end: usize,
        /// Number of pages in the document
        page_count: usize,
    },

    /// Rotation increment outside {90, 180, 270}.
    #[error("Invalid rotation {0}: must be 90, 180, or 270")]
    InvalidRotation(i64),

    /// Neither candidate password authenticates against the document.
    #[error("Incorrect password provided")]
    IncorrectPassword,

    /// Image bytes or conversion target outside JPEG/PNG/WebP.
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Failure anywhere in the signing pipeline; input left untouched.
    #[error("Signing failed: {0}")]
    SigningFailure(String),

    /// Referenced object not found in the cross-reference index
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

    /// Unexpected end of file
    #[error("End of file reached unexpectedly")]
    UnexpectedEof,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 decoding error
    #[error("UTF-8 decoding error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Encryption dictionary or algorithm failure
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Circular reference detected in object graph
    #[error("Circular reference detected: object {0}")]
    CircularReference(crate::object::ObjectRef),

    /// Recursion depth limit exceeded
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),
}

use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the failure cases that can occur while elements move
/// between the project file, the document store and the review spreadsheets.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Raised when an XML document cannot be tokenised or written.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Raised when an XML attribute is malformed.
    #[error("XML attribute error: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Malformed or self-inconsistent schema or settings. Always fatal.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A field path expression could not be parsed.
    #[error("invalid field path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A referenced project, schedule, spreadsheet or element is missing.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// The document store or spreadsheet service rejected a call.
    #[error("{service} {operation} failed on {target}: {message}")]
    ExternalService {
        service: &'static str,
        operation: &'static str,
        target: String,
        message: String,
    },

    /// An XML element or sheet row does not match the expected shape.
    #[error("unexpected data shape: {0}")]
    DataShape(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

impl ToolError {
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// Wraps a collaborator failure with the operation and target it hit.
    pub fn external(
        service: &'static str,
        operation: &'static str,
        target: impl Into<String>,
        source: impl std::fmt::Display,
    ) -> Self {
        Self::ExternalService {
            service,
            operation,
            target: target.into(),
            message: source.to_string(),
        }
    }

    /// Whether the failing unit of work can be logged and skipped while the
    /// rest of the run continues.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::DataShape(_))
    }
}

use thiserror::Error;

/// Raised while building the rule catalog. Fatal: no engine is constructed.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("pattern for field '{field}' does not compile: {source}")]
    InvalidPattern {
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("pattern for field '{field}' must have exactly one capture group, found {found}")]
    CaptureGroups { field: String, found: usize },

    #[error("field '{0}' is defined more than once")]
    DuplicateField(String),

    #[error("profile '{profile}' references unknown field '{field}'")]
    UnknownField { profile: String, field: String },

    #[error("profile '{profile}' lists field '{field}' more than once")]
    RepeatedProfileField { profile: String, field: String },

    #[error("unknown profile '{0}'")]
    UnknownProfile(String),

    #[error("profile '{0}' has no fields")]
    EmptyProfile(String),

    #[error("truncation markers could not be compiled: {0}")]
    Markers(#[source] regex::Error),
}

/// Raised while turning a document into plain text.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF could not be parsed: {0}")]
    Pdf(String),

    #[error("document has no pages")]
    NoPages,

    #[error("first page has no extractable text")]
    EmptyPage,

    #[error("document is not valid UTF-8 text")]
    Encoding,

    #[error("unsupported document type '{0}'")]
    Unsupported(String),
}

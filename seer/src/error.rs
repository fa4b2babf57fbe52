use thiserror::Error;

/// Problems detected while a query is being built. They are accumulated on the
/// query and block any replay until it is cleared.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("Can't convert root to a document")]
    RootDocument,

    #[error("Can't convert `{step}` step into a document")]
    NotNavigation { step: &'static str },

    #[error("Encoding value for `{path}` failed: {message}")]
    Encode { path: String, message: String },
}

#[derive(Error, Debug)]
pub enum SeerError {
    #[error("{count} errors preventing replay")]
    Build { count: usize },

    #[error("Not found: {path}")]
    NotFound { path: String },

    #[error("Document `{path}` does not exist")]
    DocumentMissing { path: String },

    #[error("Index {index} out of range (length: {len}) at {path}")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("Invalid index `{segment}` at {path}: {source}")]
    InvalidIndex {
        path: String,
        segment: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("Invalid path segment `{segment}`")]
    InvalidSegment { segment: String },

    #[error("Unsupported file `{path}`")]
    UnsupportedFile { path: String },

    #[error("Path conflict: {path} is {reason}")]
    PathConflict { path: String, reason: &'static str },

    #[error("Malformed document at {path}: {reason}")]
    MalformedDocument { path: String, reason: String },

    #[error("Can't call {op} during a read query")]
    ReadOnly { op: &'static str },

    #[error("Can't call Set() outside a document")]
    SetOutsideDocument,

    #[error("Can't call Delete() outside a value or document")]
    DeleteOutsideValue,

    #[error("Can't delete the store root")]
    DeleteRoot,

    #[error("Value at {path} is not a mapping or a sequence")]
    NotListable { path: String },

    #[error("Batch query #{index} failed: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<SeerError>,
    },

    #[error("Opening repository failed: {0}")]
    Repository(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error on {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Decoding {path} failed: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("{0}")]
    Other(String),
}

impl SeerError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        SeerError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the "does not exist" family: a missing directory, document, key
    /// or sequence index.
    pub fn is_not_found(&self) -> bool {
        match self {
            SeerError::NotFound { .. }
            | SeerError::DocumentMissing { .. }
            | SeerError::IndexOutOfRange { .. } => true,
            SeerError::Batch { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SeerError>;

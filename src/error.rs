use thiserror::Error;

/// Main application error type that encompasses all possible failure modes
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("error unmarshalling resource: {0}")]
    Signature(#[from] SignatureError),

    #[error("{0}")]
    Registry(#[from] RegistryError),

    #[error("could not find schema for {kind}")]
    SchemaNotFound { kind: String },

    #[error("failed compiling schema from {source_id}: {details}")]
    SchemaCompilation { source_id: String, details: String },

    #[error("prohibited resource kind {kind}")]
    RejectedKind { kind: String },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("output error: {0}")]
    Output(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed processing {path}: {details}")]
    Discovery { path: String, details: String },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Error deriving a resource signature from document content.
///
/// Cloneable so a failed derivation can be memoized alongside the
/// success case on the owning resource.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("{0}")]
    Parse(String),
}

/// Classification of a schema resolution failure, inspected by the
/// registry fallback algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryErrorKind {
    /// The registry does not contain a schema for this resource.
    /// Fallback continues with the next registry.
    NotFound,
    /// A transient failure that may succeed on a later attempt.
    /// Retried inside the registry; once surfaced, fallback aborts.
    Retryable,
    /// A permanent failure. Fallback aborts immediately.
    Fatal,
}

/// A schema resolution failure carrying its fallback classification
#[derive(Error, Debug)]
#[error("{message}")]
pub struct RegistryError {
    pub kind: RegistryErrorKind,
    pub message: String,
}

impl RegistryError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: RegistryErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            kind: RegistryErrorKind::Retryable,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: RegistryErrorKind::Fatal,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == RegistryErrorKind::NotFound
    }
}

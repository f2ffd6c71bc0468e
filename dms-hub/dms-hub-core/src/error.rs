use thiserror::Error;
use uuid::Uuid;

pub type DmsResult<T> = Result<T, DmsError>;

/// Sub-code of a `Forbidden` error raised by a refused move or copy.
pub const COLLISION_ON_MOVE: u16 = 10;
/// Sub-code of a `Forbidden` error raised by a refused rename.
pub const COLLISION_ON_RENAME: u16 = 11;

/// Status code returned by the index when the document is not there.
pub const INDEX_NOT_FOUND: u16 = 404;

#[derive(Debug, Error)]
pub enum DmsError {
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String, code: Option<u16> },

    #[error("A collection named \"{name}\" already exists")]
    AlreadyExists { name: String, parent: Option<Uuid> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Index service error ({status}): {message}")]
    IndexService { status: u16, message: String },

    #[error("{} documents have not been reindexed", failures.len())]
    ReindexFailed { failures: Vec<ReindexFailure> },

    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String, code: u32 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache error: {0}")]
    Cache(String),
}

/// One document that could not be pushed to the index during a batch reindex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexFailure {
    pub document: Uuid,
    pub status: u16,
    pub message: String,
}

impl DmsError {
    pub fn forbidden(reason: &str) -> Self {
        Self::Forbidden {
            reason: reason.to_string(),
            code: None,
        }
    }

    pub fn collision(reason: &str, code: u16) -> Self {
        Self::Forbidden {
            reason: reason.to_string(),
            code: Some(code),
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn invalid(msg: &str) -> Self {
        Self::InvalidInput(msg.to_string())
    }

    pub fn index(status: u16, message: impl Into<String>) -> Self {
        Self::IndexService {
            status,
            message: message.into(),
        }
    }

    /// The numeric sub-code carried by a `Forbidden` error, if any.
    pub fn forbidden_code(&self) -> Option<u16> {
        match self {
            Self::Forbidden { code, .. } => *code,
            _ => None,
        }
    }

    /// True when the index reported the document as already absent.
    pub fn is_index_not_found(&self) -> bool {
        matches!(self, Self::IndexService { status, .. } if *status == INDEX_NOT_FOUND)
    }

    /// HTTP-like status for callers that render errors.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Forbidden { .. } => 403,
            Self::AlreadyExists { .. } => 409,
            Self::NotFound(_) => 404,
            Self::IndexService { .. } | Self::ReindexFailed { .. } => 502,
            Self::Unsupported { .. } => 501,
            Self::InvalidInput(_) => 422,
            Self::Io(_) | Self::Serialization(_) | Self::Cache(_) => 500,
        }
    }
}

impl ReindexFailure {
    pub fn new(document: Uuid, err: &DmsError) -> Self {
        let status = match err {
            DmsError::IndexService { status, .. } => *status,
            other => other.status_code(),
        };
        Self {
            document,
            status,
            message: err.to_string(),
        }
    }
}

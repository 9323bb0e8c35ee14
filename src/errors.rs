//! Error taxonomy shared by the blocklist core.
//!
//! Only `InvalidInput`, `NotFound`, `Unauthorized` and `DuplicateKey` (from explicit
//! creates) are meant to reach a caller of [`crate::service::BlocklistService`].
//! Everything raised by a source adapter is contained at the adapter boundary and
//! turned into an empty candidate list or a missing verdict.

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, BlocklistError>;

#[derive(Debug, thiserror::Error)]
pub enum BlocklistError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Already recorded: {0}")]
    DuplicateKey(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Source '{source_id}' unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },
    #[error("Your API key does not have access to this operation")]
    Unauthorized,
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BlocklistError {
    pub fn source_unavailable(source_id: impl Into<String>, reason: impl ToString) -> Self {
        BlocklistError::SourceUnavailable {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }

    /// True for uniqueness-constraint failures, which callers recover as "already known".
    pub fn is_duplicate(&self) -> bool {
        matches!(self, BlocklistError::DuplicateKey(_))
    }
}

impl From<serde_json::Error> for BlocklistError {
    fn from(e: serde_json::Error) -> Self {
        BlocklistError::Decode(e.to_string())
    }
}

impl From<serde_yaml::Error> for BlocklistError {
    fn from(e: serde_yaml::Error) -> Self {
        BlocklistError::Decode(e.to_string())
    }
}

/// Maps a sqlx error into the taxonomy, turning unique violations into `DuplicateKey`.
pub(crate) fn classify_db_error(e: sqlx::Error, key: &str) -> BlocklistError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            BlocklistError::DuplicateKey(key.to_string())
        }
        _ => BlocklistError::Storage(e),
    }
}

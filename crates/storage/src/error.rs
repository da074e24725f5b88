#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("article not found: {0}")]
    ArticleNotFound(String),
    #[error("cannot save merge decision: from/to author does not exist")]
    MissingAuthor,
    #[error("storage io error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

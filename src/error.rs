use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sqlx::Error> for DbChatError {
    fn from(err: sqlx::Error) -> Self {
        DbChatError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbChatError>;

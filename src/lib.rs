pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod render;

pub use agent::{AgencyLevel, QueryKind, Session, SessionOptions, TurnOutcome, TurnReport};
pub use config::Config;
pub use error::{DbChatError, Result};
pub use llm::{ChatModel, LlmClient};

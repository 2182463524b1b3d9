//! Runtime configuration
//!
//! Read from environment variables; the binary loads a `.env` file first.

use crate::agent::policy::AgencyLevel;
use crate::error::{DbChatError, Result};
use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DB_PORT: u16 = 3306;
pub const DEFAULT_MAX_TOOL_CALLS: usize = 8;
pub const DEFAULT_RESULT_ROW_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// Full connection URL; takes precedence over the individual parts.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db: DbConfig,
    pub llm: LlmConfig,
    pub agency_level: AgencyLevel,
    pub max_tool_calls: usize,
    pub result_row_limit: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let db = DbConfig {
            url: get("DATABASE_URL"),
            host: get("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: parse_var(&get, "DB_PORT")?.unwrap_or(DEFAULT_DB_PORT),
            user: get("DB_USER"),
            password: get("DB_PASSWORD"),
            database: get("DB_NAME"),
        };

        let llm = LlmConfig {
            api_key: get("OPENAI_API_KEY"),
            base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: parse_var::<u64, _>(&get, "DBCHAT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
        };

        let agency_level = match get("DBCHAT_AGENCY") {
            Some(level) => level.parse()?,
            None => AgencyLevel::default(),
        };

        let max_tool_calls = parse_var(&get, "DBCHAT_MAX_TOOL_CALLS")?.unwrap_or(DEFAULT_MAX_TOOL_CALLS);
        if max_tool_calls == 0 {
            return Err(DbChatError::Config("DBCHAT_MAX_TOOL_CALLS must be at least 1".to_string()));
        }

        Ok(Self {
            db,
            llm,
            agency_level,
            max_tool_calls,
            result_row_limit: parse_var(&get, "DBCHAT_RESULT_ROWS")?.unwrap_or(DEFAULT_RESULT_ROW_LIMIT),
        })
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| DbChatError::Config(format!("Invalid {} '{}': {}", key, raw, e)))
        })
        .transpose()
}

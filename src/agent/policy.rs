//! Agency Policy
//!
//! Maps the session's agency level and a query classification to whether the
//! assistant may run the query without a human looking at it first.

use crate::agent::classifier::QueryKind;
use crate::error::DbChatError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How much the assistant may do on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgencyLevel {
    /// Every query is drafted for the user to run.
    DraftOnly,
    /// Read-only queries run on their own, writes are drafted.
    #[default]
    Moderate,
    /// Reads and simple writes run on their own (after one conversational confirmation).
    FullAutonomy,
}

impl AgencyLevel {
    pub const ALL: [AgencyLevel; 3] = [
        AgencyLevel::DraftOnly,
        AgencyLevel::Moderate,
        AgencyLevel::FullAutonomy,
    ];
}

impl fmt::Display for AgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgencyLevel::DraftOnly => write!(f, "draft-only"),
            AgencyLevel::Moderate => write!(f, "moderate"),
            AgencyLevel::FullAutonomy => write!(f, "full-autonomy"),
        }
    }
}

impl FromStr for AgencyLevel {
    type Err = DbChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "draft" | "draft-only" => Ok(AgencyLevel::DraftOnly),
            "moderate" => Ok(AgencyLevel::Moderate),
            "full" | "full-autonomy" => Ok(AgencyLevel::FullAutonomy),
            other => Err(DbChatError::Config(format!(
                "Unknown agency level '{}' (expected draft-only, moderate or full-autonomy)",
                other
            ))),
        }
    }
}

/// Whether a query of `kind` may run without manual confirmation at `level`.
///
/// Destructive queries never run on their own, whatever the level.
pub fn auto_execute(level: AgencyLevel, kind: QueryKind) -> bool {
    match (level, kind) {
        (_, QueryKind::Destructive) => false,
        (AgencyLevel::DraftOnly, _) => false,
        (AgencyLevel::Moderate, QueryKind::ReadOnly) => true,
        (AgencyLevel::Moderate, QueryKind::SimpleWrite) => false,
        (AgencyLevel::FullAutonomy, QueryKind::ReadOnly | QueryKind::SimpleWrite) => true,
    }
}

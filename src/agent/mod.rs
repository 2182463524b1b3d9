//! SQL assistant: classification, agency policy and the tool-calling loop.

pub mod classifier;
pub mod conversation;
pub mod policy;
pub mod prompts;
pub mod session;
pub mod tools;

pub use classifier::{classify, is_schema_change, is_single_statement, QueryKind};
pub use conversation::Conversation;
pub use policy::{auto_execute, AgencyLevel};
pub use session::{
    DraftQuery, ExecutedQuery, LoopState, PendingItem, Session, SessionOptions, TurnOutcome,
    TurnReport,
};

//! Tool-Calling Loop
//!
//! A `Session` owns one conversation with the model and drives it through
//! `AwaitingUser -> AwaitingModel -> ExecutingTool -> ... -> Done`. Every SQL
//! query the model proposes is classified and checked against the agency
//! policy; queries that may not run on their own are handed to the user as
//! drafts. Tool calls per user turn are capped so a model that keeps calling
//! tools cannot loop forever.

use crate::agent::classifier::{classify, is_schema_change, QueryKind};
use crate::agent::conversation::Conversation;
use crate::agent::policy::{auto_execute, AgencyLevel};
use crate::agent::prompts::{extract_sql, sql_generation_prompt, system_prompt};
use crate::agent::tools::{parse_tool_call, tool_definitions, ToolRequest, ToolResult};
use crate::config::{Config, DEFAULT_MAX_TOOL_CALLS, DEFAULT_RESULT_ROW_LIMIT};
use crate::db::executor::{QueryOutcome, SqlExecutor};
use crate::db::schema::{SchemaCache, SchemaSnapshot};
use crate::error::{DbChatError, Result};
use crate::llm::{ChatMessage, ChatModel, ToolCall, ToolDefinition};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Assistant text used when the model replies with neither text nor tool calls.
pub const EMPTY_REPLY_FALLBACK: &str = "AI did not provide a clear response.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingUser,
    AwaitingModel,
    ExecutingTool,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub agency_level: AgencyLevel,
    /// Tool calls processed per user turn before the loop stops.
    pub max_tool_calls: usize,
    /// Rows of a result set passed back to the model.
    pub result_row_limit: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            agency_level: AgencyLevel::default(),
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
            result_row_limit: DEFAULT_RESULT_ROW_LIMIT,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            agency_level: config.agency_level,
            max_tool_calls: config.max_tool_calls.max(1),
            result_row_limit: config.result_row_limit,
        }
    }
}

/// A query the model proposed that needs the user's go-ahead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftQuery {
    pub query: String,
    pub kind: QueryKind,
}

/// Something surfaced to the user whose tool call is still unanswered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingItem {
    Draft { tool_call_id: String, draft: DraftQuery },
    Clarification { tool_call_id: String, question: String },
}

/// A query that ran during a turn, for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedQuery {
    pub query: String,
    pub kind: QueryKind,
    pub result: std::result::Result<QueryOutcome, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model finished with plain text.
    Answer(String),
    /// The model proposed a query that may not run without the user.
    Draft(DraftQuery),
    /// The model asked the user a question.
    Clarification(String),
    /// The per-turn tool call cap was hit.
    ToolLimitReached { limit: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    pub executions: Vec<ExecutedQuery>,
}

/// Who let a query run. Queries run by policy go through the single-statement path.
#[derive(Clone, Copy)]
enum Approval {
    Policy,
    User,
}

enum Step {
    Continue,
    Stop(TurnOutcome),
}

pub struct Session {
    model: Arc<dyn ChatModel>,
    executor: Arc<dyn SqlExecutor>,
    options: SessionOptions,
    tools: Vec<ToolDefinition>,
    conversation: Conversation,
    schema: SchemaCache,
    state: LoopState,
    pending: Option<PendingItem>,
    tool_calls_this_turn: usize,
    retry_available: bool,
}

impl Session {
    pub fn new(model: Arc<dyn ChatModel>, executor: Arc<dyn SqlExecutor>, options: SessionOptions) -> Self {
        Self {
            model,
            executor,
            options,
            tools: tool_definitions(),
            conversation: Conversation::new(),
            schema: SchemaCache::new(),
            state: LoopState::AwaitingUser,
            pending: None,
            tool_calls_this_turn: 0,
            retry_available: false,
        }
    }

    pub fn agency_level(&self) -> AgencyLevel {
        self.options.agency_level
    }

    pub fn set_agency_level(&mut self, level: AgencyLevel) {
        info!("Agency level set to {}", level);
        self.options.agency_level = level;
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn pending(&self) -> Option<&PendingItem> {
        self.pending.as_ref()
    }

    pub fn cached_schema(&self) -> Option<&SchemaSnapshot> {
        self.schema.get()
    }

    /// Whether the last model call failed and `retry` can resume the turn.
    pub fn can_retry(&self) -> bool {
        self.retry_available
    }

    /// Run one user turn.
    pub async fn send(&mut self, message: &str) -> Result<TurnReport> {
        let message = message.trim();
        if message.is_empty() {
            return Err(DbChatError::Session("message is empty".to_string()));
        }

        if let Some(pending) = self.pending.take() {
            self.answer_pending(pending);
        }
        self.retry_available = false;
        self.tool_calls_this_turn = 0;
        self.conversation.push_user(message);
        debug!("User message appended ({} messages)", self.conversation.len());

        self.drive(Vec::new()).await
    }

    /// Run the drafted query, or `edited` in its place, then let the model continue.
    pub async fn confirm_draft(&mut self, edited: Option<&str>) -> Result<TurnReport> {
        let (tool_call_id, draft) = match self.pending.take() {
            Some(PendingItem::Draft { tool_call_id, draft }) => (tool_call_id, draft),
            other => {
                self.pending = other;
                return Err(DbChatError::Session(
                    "no drafted query is awaiting confirmation".to_string(),
                ));
            }
        };

        let query = edited
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .unwrap_or(draft.query);
        let kind = classify(&query);
        info!("User confirmed {} query: {}", kind, truncate_sql(&query, 100));

        let executed = self.execute_query(query, kind, Approval::User).await;
        let result = self.result_for(&executed);
        self.push_tool_result(&tool_call_id, &result);
        self.retry_available = false;
        self.tool_calls_this_turn = 0;

        self.drive(vec![executed]).await
    }

    /// Resume the conversation after a failed model call.
    pub async fn retry(&mut self) -> Result<TurnReport> {
        if !self.retry_available {
            return Err(DbChatError::Session("there is no failed turn to retry".to_string()));
        }
        self.retry_available = false;
        self.drive(Vec::new()).await
    }

    /// Forget the conversation and anything awaiting the user.
    pub fn reset(&mut self) {
        self.conversation.clear();
        self.pending = None;
        self.state = LoopState::AwaitingUser;
        self.tool_calls_this_turn = 0;
        self.retry_available = false;
        info!("Conversation cleared");
    }

    /// Run SQL the user typed directly. No policy gate and no model involvement.
    pub async fn run_manual_query(&mut self, sql: &str) -> Result<QueryOutcome> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(DbChatError::Session("query is empty".to_string()));
        }
        info!("Running manual query: {}", truncate_sql(sql, 100));
        let outcome = self.executor.execute(sql).await?;
        if is_schema_change(sql) {
            self.schema.invalidate();
        }
        Ok(outcome)
    }

    /// Ask the model for a single SQL statement answering `request`.
    /// The conversation is left untouched.
    pub async fn generate_sql(&mut self, request: &str) -> Result<String> {
        let request = request.trim();
        if request.is_empty() {
            return Err(DbChatError::Session("request is empty".to_string()));
        }
        let schema = self.schema_context().await;
        let reply = self
            .model
            .complete(&sql_generation_prompt(&schema), &[ChatMessage::user(request)], &[])
            .await?;
        Ok(extract_sql(reply.content.as_deref().unwrap_or_default()))
    }

    pub async fn refresh_schema(&mut self) -> Result<&SchemaSnapshot> {
        self.schema.refresh(self.executor.as_ref()).await
    }

    /// Schema text for prompts. A fetch failure is logged and described in place.
    pub async fn schema_context(&mut self) -> String {
        match self.schema.load(self.executor.as_ref()).await {
            Ok(snapshot) => snapshot.to_context(),
            Err(e) => {
                warn!("Schema unavailable: {}", e);
                format!("(schema unavailable: {})\n", e)
            }
        }
    }

    async fn drive(&mut self, mut executions: Vec<ExecutedQuery>) -> Result<TurnReport> {
        loop {
            self.state = LoopState::AwaitingModel;
            let schema = self.schema_context().await;
            let system = system_prompt(self.options.agency_level, &schema);

            let reply = match self
                .model
                .complete(&system, self.conversation.messages(), &self.tools)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("Model call failed, conversation kept for retry: {}", e);
                    self.state = LoopState::AwaitingUser;
                    self.retry_available = true;
                    return Err(e);
                }
            };

            if reply.tool_calls.is_empty() {
                let text = reply
                    .content
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| EMPTY_REPLY_FALLBACK.to_string());
                self.conversation.push_assistant_text(text.clone());
                self.state = LoopState::Done;
                return Ok(TurnReport {
                    outcome: TurnOutcome::Answer(text),
                    executions,
                });
            }

            debug!("Model requested {} tool call(s)", reply.tool_calls.len());
            self.conversation
                .push_assistant_tool_calls(reply.content, reply.tool_calls.clone());
            self.state = LoopState::ExecutingTool;

            if let Step::Stop(outcome) = self.run_tool_calls(&reply.tool_calls, &mut executions).await {
                self.state = LoopState::AwaitingUser;
                return Ok(TurnReport { outcome, executions });
            }
        }
    }

    /// Answer every call in order. Stops running calls once one is surfaced to the user.
    async fn run_tool_calls(&mut self, calls: &[ToolCall], executions: &mut Vec<ExecutedQuery>) -> Step {
        let level = self.options.agency_level;
        let limit = self.options.max_tool_calls;
        let mut stop: Option<TurnOutcome> = None;

        for call in calls {
            if let Some(outcome) = &stop {
                let result = match outcome {
                    TurnOutcome::ToolLimitReached { limit } => ToolResult::LimitReached { limit: *limit },
                    _ => ToolResult::Skipped {
                        reason: "Not run: an earlier tool call in this response is waiting for the user."
                            .to_string(),
                    },
                };
                self.push_tool_result(&call.id, &result);
                continue;
            }

            if self.tool_calls_this_turn >= limit {
                warn!("Tool call limit ({}) reached for this turn", limit);
                self.push_tool_result(&call.id, &ToolResult::LimitReached { limit });
                stop = Some(TurnOutcome::ToolLimitReached { limit });
                continue;
            }
            self.tool_calls_this_turn += 1;

            match parse_tool_call(call) {
                Err(error) => {
                    warn!("Rejected tool call {}: {}", call.function.name, error);
                    self.push_tool_result(&call.id, &ToolResult::InvalidCall { error });
                }
                Ok(ToolRequest::AskUserClarification { question }) => {
                    info!("Model asked the user for clarification");
                    self.pending = Some(PendingItem::Clarification {
                        tool_call_id: call.id.clone(),
                        question: question.clone(),
                    });
                    stop = Some(TurnOutcome::Clarification(question));
                }
                Ok(ToolRequest::RunSqlQuery { query }) => {
                    let kind = classify(&query);
                    if auto_execute(level, kind) {
                        info!("Auto-executing {} query at {} agency: {}", kind, level, truncate_sql(&query, 100));
                        let executed = self.execute_query(query, kind, Approval::Policy).await;
                        let result = self.result_for(&executed);
                        self.push_tool_result(&call.id, &result);
                        executions.push(executed);
                    } else {
                        info!("Drafting {} query for review at {} agency: {}", kind, level, truncate_sql(&query, 100));
                        let draft = DraftQuery { query, kind };
                        self.pending = Some(PendingItem::Draft {
                            tool_call_id: call.id.clone(),
                            draft: draft.clone(),
                        });
                        stop = Some(TurnOutcome::Draft(draft));
                    }
                }
            }
        }

        match stop {
            Some(outcome) => Step::Stop(outcome),
            None => Step::Continue,
        }
    }

    async fn execute_query(&mut self, query: String, kind: QueryKind, approval: Approval) -> ExecutedQuery {
        let response = match approval {
            Approval::Policy => self.executor.execute_statement(&query).await,
            Approval::User => self.executor.execute(&query).await,
        };
        let result = match response {
            Ok(outcome) => {
                if is_schema_change(&query) {
                    self.schema.invalidate();
                }
                debug!("Query returned {} row(s)", outcome.row_count());
                Ok(outcome)
            }
            Err(e) => {
                warn!("Query failed: {}", e);
                Err(e.to_string())
            }
        };
        ExecutedQuery { query, kind, result }
    }

    /// Close out a surfaced item the user moved past without acting on.
    fn answer_pending(&mut self, pending: PendingItem) {
        let (tool_call_id, result) = match pending {
            PendingItem::Draft { tool_call_id, draft } => (
                tool_call_id,
                ToolResult::NotExecuted {
                    query: draft.query,
                    reason: "The user did not run this query; their next message follows.".to_string(),
                },
            ),
            PendingItem::Clarification { tool_call_id, question } => (
                tool_call_id,
                ToolResult::QuestionAsked {
                    question,
                    note: "The user's answer is the next message.".to_string(),
                },
            ),
        };
        self.push_tool_result(&tool_call_id, &result);
    }

    fn result_for(&self, executed: &ExecutedQuery) -> ToolResult {
        ToolResult::from_outcome(&executed.query, &executed.result, self.options.result_row_limit)
    }

    fn push_tool_result(&mut self, tool_call_id: &str, result: &ToolResult) {
        self.conversation.push_tool_result(tool_call_id, result.to_content());
    }
}

fn truncate_sql(sql: &str, max_chars: usize) -> String {
    let single_line = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= max_chars {
        single_line
    } else {
        let cut: String = single_line.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

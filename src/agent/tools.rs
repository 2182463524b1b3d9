//! Tools offered to the model and the payloads sent back as tool results.

use crate::db::executor::QueryOutcome;
use crate::llm::{ToolCall, ToolDefinition};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const RUN_SQL_QUERY: &str = "run_sql_query";
pub const ASK_USER_CLARIFICATION: &str = "ask_user_clarification";

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: RUN_SQL_QUERY.to_string(),
            description: "Run a SQL query on the MySQL database. Only use this tool for safe, \
                well-formed queries that match the schema. Depending on the session's agency level \
                the query either runs immediately or is shown to the user for review; the user may \
                edit it before running it, and you will always be told which query actually ran."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The SQL query to run."}
                },
                "required": ["query"],
            }),
        },
        ToolDefinition {
            name: ASK_USER_CLARIFICATION.to_string(),
            description: "Ask the user a question when the request is ambiguous and you cannot \
                pick a sensible interpretation from the schema. The user's answer arrives as the \
                next user message."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "question": {"type": "string", "description": "The question to ask the user."}
                },
                "required": ["question"],
            }),
        },
    ]
}

/// A parsed tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    RunSqlQuery { query: String },
    AskUserClarification { question: String },
}

#[derive(Deserialize)]
struct RunSqlQueryArgs {
    query: String,
}

#[derive(Deserialize)]
struct ClarificationArgs {
    question: String,
}

/// Parse a tool call into a request; the error text goes back to the model.
pub fn parse_tool_call(call: &ToolCall) -> Result<ToolRequest, String> {
    let raw = call.function.arguments.trim();
    let raw = if raw.is_empty() { "{}" } else { raw };

    match call.function.name.as_str() {
        RUN_SQL_QUERY => {
            let args: RunSqlQueryArgs = serde_json::from_str(raw)
                .map_err(|e| format!("invalid arguments for {}: {}", RUN_SQL_QUERY, e))?;
            let query = args.query.trim();
            if query.is_empty() {
                return Err(format!("{} requires a non-empty query", RUN_SQL_QUERY));
            }
            Ok(ToolRequest::RunSqlQuery { query: query.to_string() })
        }
        ASK_USER_CLARIFICATION => {
            let args: ClarificationArgs = serde_json::from_str(raw)
                .map_err(|e| format!("invalid arguments for {}: {}", ASK_USER_CLARIFICATION, e))?;
            let question = args.question.trim();
            if question.is_empty() {
                return Err(format!("{} requires a question", ASK_USER_CLARIFICATION));
            }
            Ok(ToolRequest::AskUserClarification { question: question.to_string() })
        }
        other => Err(format!(
            "unknown tool '{}'; available tools: {}, {}",
            other, RUN_SQL_QUERY, ASK_USER_CLARIFICATION
        )),
    }
}

/// Content of a tool-result turn, serialized as JSON for the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Executed {
        query_executed: String,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rows_affected: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rows_omitted: Option<usize>,
    },
    Failed {
        query_executed: String,
        error: String,
    },
    NotExecuted {
        query: String,
        reason: String,
    },
    QuestionAsked {
        question: String,
        note: String,
    },
    Skipped {
        reason: String,
    },
    LimitReached {
        limit: usize,
    },
    InvalidCall {
        error: String,
    },
}

impl ToolResult {
    /// Result of an executed query, keeping at most `row_limit` rows.
    pub fn from_outcome(query: &str, outcome: &Result<QueryOutcome, String>, row_limit: usize) -> Self {
        match outcome {
            Ok(outcome) => {
                let kept = outcome.rows.len().min(row_limit);
                let omitted = outcome.rows.len() - kept;
                ToolResult::Executed {
                    query_executed: query.to_string(),
                    columns: outcome.columns.clone(),
                    rows: outcome.rows[..kept].to_vec(),
                    rows_affected: outcome.rows_affected,
                    rows_omitted: (omitted > 0).then_some(omitted),
                }
            }
            Err(error) => ToolResult::Failed {
                query_executed: query.to_string(),
                error: error.clone(),
            },
        }
    }

    pub fn to_content(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| json!({"status": "error", "error": e.to_string()}).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_sql_query() {
        let call = ToolCall::function("c1", RUN_SQL_QUERY, r#"{"query": "  SELECT 1  "}"#);
        assert_eq!(
            parse_tool_call(&call),
            Ok(ToolRequest::RunSqlQuery { query: "SELECT 1".into() })
        );
    }

    #[test]
    fn test_parse_clarification() {
        let call = ToolCall::function("c1", ASK_USER_CLARIFICATION, r#"{"question":"Which year?"}"#);
        assert_eq!(
            parse_tool_call(&call),
            Ok(ToolRequest::AskUserClarification { question: "Which year?".into() })
        );
    }

    #[test]
    fn test_parse_errors() {
        let empty = ToolCall::function("c1", RUN_SQL_QUERY, "");
        assert!(parse_tool_call(&empty).unwrap_err().contains("invalid arguments"));

        let blank = ToolCall::function("c1", RUN_SQL_QUERY, r#"{"query":"   "}"#);
        assert!(parse_tool_call(&blank).unwrap_err().contains("non-empty"));

        let unknown = ToolCall::function("c1", "drop_database", "{}");
        assert!(parse_tool_call(&unknown).unwrap_err().contains("unknown tool"));
    }

    #[test]
    fn test_executed_result_truncates_rows() {
        let outcome = Ok(QueryOutcome::rows(
            vec!["id".into()],
            (0..5).map(|i| vec![json!(i)]).collect(),
        ));
        let result = ToolResult::from_outcome("SELECT id FROM t", &outcome, 2);
        let value: Value = serde_json::from_str(&result.to_content()).unwrap();
        assert_eq!(value["status"], "executed");
        assert_eq!(value["query_executed"], "SELECT id FROM t");
        assert_eq!(value["rows"].as_array().unwrap().len(), 2);
        assert_eq!(value["rows_omitted"], 3);
        assert!(value.get("rows_affected").is_none());
    }

    #[test]
    fn test_failed_result_carries_error() {
        let outcome = Err("Table 'shop.nope' doesn't exist".to_string());
        let value: Value =
            serde_json::from_str(&ToolResult::from_outcome("SELECT * FROM nope", &outcome, 10).to_content())
                .unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "Table 'shop.nope' doesn't exist");
    }

    #[test]
    fn test_definitions_name_both_tools() {
        let names: Vec<String> = tool_definitions().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec![RUN_SQL_QUERY, ASK_USER_CLARIFICATION]);
    }
}

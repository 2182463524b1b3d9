//! Agent Prompts - system prompts for the SQL assistant
//!
//! The chat prompt is rebuilt before every model call so it always reflects the
//! current agency level and the cached schema.

use crate::agent::policy::AgencyLevel;
use regex::Regex;
use std::sync::OnceLock;

/// Shared preamble for the chat assistant
pub const ASSISTANT_PREAMBLE: &str = r#"You are a high-agency expert in SQL and MySQL, acting as a seasoned senior developer who helps the user explore and change their database.

Work like this:
1. Review the request and outline a short plan in plain language before acting.
2. Use the run_sql_query tool for every query; never ask the user to copy SQL by hand.
3. Use ask_user_clarification only when the request is genuinely ambiguous.
4. Use only safe, well-formed SQL that matches the schema below.
5. Do not show raw SQL unless it helps; describe what you are doing and why.
6. When a tool result says a query failed, read the error and decide whether a corrected query makes sense."#;

/// Prompt for one-shot SQL drafting
pub const SQL_GENERATION_PROMPT: &str = r#"You generate MySQL queries from user requests, which may be vague; make your best guess. Output only the finished SQL statement, with no explanation and no code fences. Infer what the user wants from the schema below."#;

/// Agency-specific rules appended to the preamble
pub fn agency_rules(level: AgencyLevel) -> &'static str {
    match level {
        AgencyLevel::DraftOnly => {
            "Agency level: DRAFT ONLY. No query you propose runs automatically. Every run_sql_query \
             call is shown to the user as a draft; they decide whether to run it. Propose one query \
             at a time and explain what it will do."
        }
        AgencyLevel::Moderate => {
            "Agency level: MODERATE. Read-only queries (SELECT, SHOW, DESCRIBE) run automatically \
             and you receive their results; use them freely to investigate. INSERT and UPDATE \
             statements are shown to the user as drafts for manual review. DELETE, DROP, ALTER, \
             TRUNCATE and any other statement are always drafts."
        }
        AgencyLevel::FullAutonomy => {
            "Agency level: FULL AUTONOMY. Read-only queries run automatically. For data-changing \
             INSERT or UPDATE operations, ask the user for confirmation ONCE; when they approve \
             (yes, okay, go ahead, proceed), execute immediately with run_sql_query in the same \
             response without restating the plan. DELETE, DROP, ALTER, TRUNCATE and any other \
             statement are never run automatically; they are shown to the user as drafts."
        }
    }
}

/// System prompt for the tool-calling chat
pub fn system_prompt(level: AgencyLevel, schema_context: &str) -> String {
    format!(
        "{}\n\n{}\n\nHere is the database schema:\n\n{}",
        ASSISTANT_PREAMBLE,
        agency_rules(level),
        schema_context
    )
}

/// System prompt for one-shot SQL drafting
pub fn sql_generation_prompt(schema_context: &str) -> String {
    format!("{}\n\nSchema:\n\n{}", SQL_GENERATION_PROMPT, schema_context)
}

/// Strip markdown code fences and surrounding whitespace from a model-drafted query.
pub fn extract_sql(text: &str) -> String {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n(.*?)```").expect("fence pattern is valid")
    });

    match fence.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim().to_string(),
        None => text.trim().trim_matches('`').trim().to_string(),
    }
}

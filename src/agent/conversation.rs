use crate::llm::{ChatMessage, Role, ToolCall};
use std::collections::HashSet;

/// Append-only chat history for one session.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn push_assistant_text(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    pub fn push_assistant_tool_calls(&mut self, content: Option<String>, tool_calls: Vec<ToolCall>) {
        self.messages.push(ChatMessage::assistant_tool_calls(content, tool_calls));
    }

    pub fn push_tool_result(&mut self, tool_call_id: impl Into<String>, content: impl Into<String>) {
        self.messages.push(ChatMessage::tool_result(tool_call_id, content));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Ids from the latest tool-calling assistant message that have no tool result yet.
    pub fn unanswered_tool_calls(&self) -> Vec<String> {
        let Some(pos) = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant && !m.tool_calls.is_empty())
        else {
            return Vec::new();
        };

        let answered: HashSet<&str> = self.messages[pos + 1..]
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();

        self.messages[pos]
            .tool_calls
            .iter()
            .filter(|call| !answered.contains(call.id.as_str()))
            .map(|call| call.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unanswered_tool_calls() {
        let mut conversation = Conversation::new();
        conversation.push_user("how many users?");
        assert!(conversation.unanswered_tool_calls().is_empty());

        conversation.push_assistant_tool_calls(
            None,
            vec![
                ToolCall::function("a", "run_sql_query", "{}"),
                ToolCall::function("b", "run_sql_query", "{}"),
            ],
        );
        assert_eq!(conversation.unanswered_tool_calls(), vec!["a", "b"]);

        conversation.push_tool_result("b", "{}");
        assert_eq!(conversation.unanswered_tool_calls(), vec!["a"]);

        conversation.push_tool_result("a", "{}");
        assert!(conversation.unanswered_tool_calls().is_empty());
    }

    #[test]
    fn test_clear() {
        let mut conversation = Conversation::new();
        conversation.push_user("hi");
        conversation.push_assistant_text("hello");
        assert_eq!(conversation.len(), 2);
        conversation.clear();
        assert!(conversation.is_empty());
    }
}

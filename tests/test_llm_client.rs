//! LLM client tests against a wiremock server.
//!
//! These tests verify:
//! - The `/chat/completions` request body and auth header
//! - Parsing of text replies and tool calls
//! - HTTP and API errors surface as `DbChatError::Llm`

use dbchat::agent::tools::tool_definitions;
use dbchat::llm::{ChatMessage, ChatModel, LlmClient, ToolCall};
use dbchat::DbChatError;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for_server(server: &MockServer) -> LlmClient {
    LlmClient::new("sk-test".into(), "gpt-test".into(), server.uri())
}

fn completion(message: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{ "index": 0, "message": message, "finish_reason": "stop" }],
    }))
}

#[tokio::test]
async fn test_text_reply_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(completion(json!({ "role": "assistant", "content": "There are 3 users." })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client_for_server(&server)
        .complete("sys", &[ChatMessage::user("how many users?")], &tool_definitions())
        .await
        .expect("completion should succeed");

    assert_eq!(reply.content.as_deref(), Some("There are 3 users."));
    assert!(reply.tool_calls.is_empty());
}

#[tokio::test]
async fn test_request_carries_model_messages_and_tools() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "model": "gpt-test", "tool_choice": "auto" })))
        .respond_with(completion(json!({ "role": "assistant", "content": "ok" })))
        .expect(1)
        .mount(&server)
        .await;

    let history = vec![
        ChatMessage::user("list users"),
        ChatMessage::assistant_tool_calls(
            None,
            vec![ToolCall::function("call_1", "run_sql_query", r#"{"query":"SELECT * FROM users"}"#)],
        ),
        ChatMessage::tool_result("call_1", r#"{"status":"executed"}"#),
    ];
    client_for_server(&server)
        .complete("You are a SQL assistant.", &history, &tool_definitions())
        .await
        .expect("completion should succeed");

    let requests = server
        .received_requests()
        .await
        .expect("should be able to read received requests");
    assert_eq!(requests.len(), 1);
    let body: Value = requests[0].body_json().expect("request body is JSON");

    let messages = body["messages"].as_array().expect("messages array");
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[0]["content"], "You are a SQL assistant.");
    assert_eq!(messages[2]["tool_calls"][0]["id"], "call_1");
    assert_eq!(messages[3]["role"], "tool");
    assert_eq!(messages[3]["tool_call_id"], "call_1");

    let tool_names: Vec<&str> = body["tools"]
        .as_array()
        .expect("tools array")
        .iter()
        .filter_map(|t| t["function"]["name"].as_str())
        .collect();
    assert_eq!(tool_names, vec!["run_sql_query", "ask_user_clarification"]);
}

#[tokio::test]
async fn test_tool_calls_are_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_abc",
                "type": "function",
                "function": { "name": "run_sql_query", "arguments": "{\"query\":\"SHOW TABLES\"}" }
            }]
        })))
        .mount(&server)
        .await;

    let reply = client_for_server(&server)
        .complete("sys", &[ChatMessage::user("what tables exist?")], &tool_definitions())
        .await
        .expect("completion should succeed");

    assert_eq!(reply.content, None);
    assert_eq!(
        reply.tool_calls,
        vec![ToolCall::function("call_abc", "run_sql_query", "{\"query\":\"SHOW TABLES\"}")]
    );
}

#[tokio::test]
async fn test_http_error_status_is_an_llm_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
        })))
        .mount(&server)
        .await;

    let err = client_for_server(&server)
        .complete("sys", &[ChatMessage::user("hi")], &[])
        .await
        .expect_err("401 should fail");

    match err {
        DbChatError::Llm(message) => {
            assert!(message.contains("401"), "got {}", message);
            assert!(message.contains("Incorrect API key"), "got {}", message);
        }
        other => panic!("expected LLM error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_error_body_with_ok_status_is_an_llm_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": { "message": "model overloaded" }
        })))
        .mount(&server)
        .await;

    let err = client_for_server(&server)
        .complete("sys", &[ChatMessage::user("hi")], &[])
        .await
        .expect_err("error body should fail");

    assert!(matches!(err, DbChatError::Llm(ref m) if m.contains("model overloaded")));
}

#[tokio::test]
async fn test_empty_choices_is_an_llm_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let err = client_for_server(&server)
        .complete("sys", &[ChatMessage::user("hi")], &[])
        .await
        .expect_err("empty choices should fail");

    assert!(matches!(err, DbChatError::Llm(_)));
}

//! HTTP transport integration tests
//!
//! Full turns through the real transports against a wiremock upstream.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{collect, completed_text, delta_text, frame_types};
use relay_core::backend::DEFAULT_PLACEHOLDER_MESSAGE;
use relay_core::{
    build_transport, BackendConfig, BackendKind, ChatTurn, ConversationStore, DownstreamFrame,
    ItemId, MemoryStore, MessageRole, RelayError, StreamOrchestrator, TurnRequest,
};

fn orchestrator(kind: BackendKind, endpoint: String) -> (Arc<MemoryStore>, StreamOrchestrator) {
    let store = Arc::new(MemoryStore::new());
    let transport = build_transport(&BackendConfig::new(kind, endpoint)).unwrap();
    (store.clone(), StreamOrchestrator::new(store, transport))
}

fn sse(events: &[serde_json::Value]) -> String {
    events
        .iter()
        .map(|event| format!("data: {event}\n\n"))
        .collect()
}

async fn mount_sse(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(body, "text/event-stream"),
        )
        .mount(server)
        .await;
}

// =============================================================================
// Delta Stream
// =============================================================================

#[tokio::test]
async fn test_delta_stream_turn_end_to_end() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"type": "response.created", "response": {"id": "resp_1"}}),
        json!({"type": "response.output_item.added", "item": {"id": "msg_1", "type": "message"}}),
        json!({"type": "response.output_text.delta", "item_id": "msg_1", "delta": "Hel"}),
        json!({"type": "response.output_text.delta", "delta": "lo"}),
        json!({"type": "response.output_text.done", "item_id": "msg_1", "text": "Hello"}),
        json!({"type": "response.output_item.done", "item": {"id": "msg_1", "type": "message"}}),
        json!({"type": "response.completed", "response": {"id": "resp_1"}}),
    ]) + "data: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/responses"))
        .and(body_partial_json(json!({"stream": true, "input": "User: Hi\nAssistant:"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(body, "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (store, orchestrator) =
        orchestrator(BackendKind::DeltaStream, format!("{}/responses", server.uri()));
    let turn = orchestrator
        .stream(TurnRequest::new(vec![ChatTurn::user("Hi")]))
        .await
        .unwrap();
    let conversation_id = turn.conversation_id().to_string();
    let frames = collect(turn).await;

    assert_eq!(
        frames,
        vec![
            DownstreamFrame::Conversation {
                conversation_id: conversation_id.clone()
            },
            DownstreamFrame::MessageDelta {
                item_id: ItemId::new("msg_1"),
                content: "Hel".to_string()
            },
            DownstreamFrame::MessageDelta {
                item_id: ItemId::new("msg_1"),
                content: "lo".to_string()
            },
            DownstreamFrame::CompletedMessage {
                content: "Hello".to_string()
            },
            DownstreamFrame::StreamEnd,
        ]
    );

    let stored = store.get_messages(&conversation_id, 200, 0).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].role, MessageRole::Assistant);
    assert_eq!(stored[1].content, "Hello");
}

#[tokio::test]
async fn test_delta_stream_narrates_workflow_actions() {
    let server = MockServer::start().await;
    mount_sse(
        &server,
        sse(&[
            json!({"type": "response.output_item.added", "item": {
                "id": "act_1", "type": "workflow_action", "action_id": "search", "status": "in_progress"
            }}),
            json!({"type": "response.output_item.added", "item": {"id": "msg_1", "type": "message"}}),
            json!({"type": "response.output_text.delta", "item_id": "msg_1", "delta": "Found it"}),
            json!({"type": "response.completed"}),
        ]),
    )
    .await;

    let (_store, orchestrator) =
        orchestrator(BackendKind::DeltaStream, format!("{}/responses", server.uri()));
    let frames = collect(
        orchestrator
            .stream(TurnRequest::new(vec![ChatTurn::user("Look it up")]))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(
        frames[1],
        DownstreamFrame::MessageDelta {
            item_id: ItemId::new("act_1"),
            content: "[workflow_action] search status=in_progress".to_string()
        }
    );
    assert_eq!(completed_text(&frames), Some("Found it"));
}

#[tokio::test]
async fn test_delta_stream_failure_event() {
    let server = MockServer::start().await;
    mount_sse(
        &server,
        sse(&[
            json!({"type": "response.output_text.delta", "item_id": "msg_1", "delta": "Par"}),
            json!({"type": "response.failed", "response": {"error": {"code": "server_error", "message": "boom"}}}),
            json!({"type": "response.output_text.delta", "item_id": "msg_1", "delta": "tial"}),
        ]),
    )
    .await;

    let (_store, orchestrator) =
        orchestrator(BackendKind::DeltaStream, format!("{}/responses", server.uri()));
    let frames = collect(
        orchestrator
            .stream(TurnRequest::new(vec![ChatTurn::user("Hi")]))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(delta_text(&frames), "Par");
    assert_eq!(
        completed_text(&frames),
        Some("Upstream stream error: server_error: boom")
    );
    assert_eq!(frames.last(), Some(&DownstreamFrame::StreamEnd));
}

#[tokio::test]
async fn test_delta_stream_malformed_event() {
    let server = MockServer::start().await;
    mount_sse(
        &server,
        "data: {\"type\":\"response.output_text.delta\",\"delta\":\"ok\"}\n\ndata: {not json\n\n"
            .to_string(),
    )
    .await;

    let (_store, orchestrator) =
        orchestrator(BackendKind::DeltaStream, format!("{}/responses", server.uri()));
    let frames = collect(
        orchestrator
            .stream(TurnRequest::new(vec![ChatTurn::user("Hi")]))
            .await
            .unwrap(),
    )
    .await;

    let text = completed_text(&frames).unwrap();
    assert!(text.starts_with("Upstream stream error: Malformed upstream event"), "{text}");
}

#[tokio::test]
async fn test_bearer_token_from_named_env_var() {
    std::env::set_var("RELAY_TEST_UPSTREAM_KEY", "sekrit");

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .and(header("authorization", "Bearer sekrit"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse(&[json!({"type": "response.completed"})]), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = BackendConfig::new(
        BackendKind::DeltaStream,
        format!("{}/responses", server.uri()),
    )
    .with_api_key_env("RELAY_TEST_UPSTREAM_KEY")
    .with_agent_name("support-agent");
    let store = Arc::new(MemoryStore::new());
    let orchestrator = StreamOrchestrator::new(store, build_transport(&config).unwrap());

    let frames = collect(
        orchestrator
            .stream(TurnRequest::new(vec![ChatTurn::user("Hi")]))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(
        frame_types(&frames),
        vec!["conversation", "completed_message", "stream_end"]
    );
}

// =============================================================================
// Single JSON
// =============================================================================

#[tokio::test]
async fn test_single_json_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(body_partial_json(json!({
            "stream": false,
            "messages": [{"role": "user", "content": "Bonjour?"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Bonjour!"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (store, orchestrator) =
        orchestrator(BackendKind::SingleJson, format!("{}/chat", server.uri()));
    let turn = orchestrator
        .stream(TurnRequest::new(vec![ChatTurn::user("Bonjour?")]))
        .await
        .unwrap();
    let conversation_id = turn.conversation_id().to_string();
    let frames = collect(turn).await;

    assert_eq!(
        frame_types(&frames),
        vec!["conversation", "message_delta", "completed_message", "stream_end"]
    );
    assert_eq!(completed_text(&frames), Some("Bonjour!"));

    let stored = store.get_messages(&conversation_id, 200, 0).await.unwrap();
    assert_eq!(stored.last().map(|m| m.content.as_str()), Some("Bonjour!"));
}

#[tokio::test]
async fn test_single_json_unparseable_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let (store, orchestrator) = orchestrator(BackendKind::SingleJson, server.uri());
    let turn = orchestrator
        .stream(TurnRequest::new(vec![ChatTurn::user("Hi")]))
        .await
        .unwrap();
    let conversation_id = turn.conversation_id().to_string();
    let frames = collect(turn).await;

    let text = completed_text(&frames).unwrap();
    assert!(text.contains("Malformed upstream payload"), "{text}");
    assert_eq!(store.get_messages(&conversation_id, 200, 0).await.unwrap().len(), 1);
}

// =============================================================================
// Accept and Forget
// =============================================================================

#[tokio::test]
async fn test_accept_and_forget_yields_placeholder() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(202).set_body_string("queued"))
        .expect(1)
        .mount(&server)
        .await;

    let (_store, orchestrator) =
        orchestrator(BackendKind::AcceptAndForget, format!("{}/jobs", server.uri()));
    let frames = collect(
        orchestrator
            .stream(TurnRequest::new(vec![
                ChatTurn::user("Start the report"),
                ChatTurn::assistant("Which one?"),
                ChatTurn::user("Quarterly"),
            ]))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(
        frame_types(&frames),
        vec!["conversation", "message_delta", "completed_message", "stream_end"]
    );
    assert_eq!(delta_text(&frames), DEFAULT_PLACEHOLDER_MESSAGE);
    assert_eq!(completed_text(&frames), Some(DEFAULT_PLACEHOLDER_MESSAGE));
}

// =============================================================================
// Upstream Rejections
// =============================================================================

#[tokio::test]
async fn test_server_error_is_returned_before_streaming() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let (_store, orchestrator) = orchestrator(BackendKind::SingleJson, server.uri());
    let err = orchestrator
        .stream(TurnRequest::new(vec![ChatTurn::user("Hi")]))
        .await
        .unwrap_err();

    match err {
        RelayError::Upstream(fault) => {
            assert_eq!(fault.status, Some(500));
            assert_eq!(fault.body, "upstream exploded");
            assert!(!fault.is_content_filter());
        }
        other => panic!("expected Upstream, got {other:?}"),
    }
}

#[tokio::test]
async fn test_content_filter_status_is_streamed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": "content_filter",
                "message": "The response was filtered",
                "innererror": {
                    "content_filter_result": {
                        "hate": {"filtered": true, "severity": "medium"},
                        "self_harm": {"filtered": false, "severity": "safe"}
                    }
                }
            }
        })))
        .mount(&server)
        .await;

    let (store, orchestrator) = orchestrator(BackendKind::DeltaStream, server.uri());
    let turn = orchestrator
        .stream(TurnRequest::new(vec![ChatTurn::user("...")]))
        .await
        .unwrap();
    let conversation_id = turn.conversation_id().to_string();
    let frames = collect(turn).await;

    assert_eq!(
        frame_types(&frames),
        vec!["conversation", "completed_message", "stream_end"]
    );
    assert_eq!(
        completed_text(&frames),
        Some("The response was blocked by the content filter: hate (severity: medium)")
    );
    assert_eq!(store.get_messages(&conversation_id, 200, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unreachable_upstream() {
    let (_store, orchestrator) =
        orchestrator(BackendKind::SingleJson, "http://127.0.0.1:1/chat".to_string());
    let err = orchestrator
        .stream(TurnRequest::new(vec![ChatTurn::user("Hi")]))
        .await
        .unwrap_err();

    match err {
        RelayError::Upstream(fault) => assert_eq!(fault.status, None),
        other => panic!("expected Upstream, got {other:?}"),
    }
}

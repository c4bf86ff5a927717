use confab::api::{ApiError, ChatApi, CreateChatRequest};
use confab::core::model::{ChatKind, MessageStatus, SenderRole};
use serde_json::json;
use tokio_test::assert_ok;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_chats_parses_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chats"))
        .and(header("authorization", "Bearer cfb-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "c1",
                "title": "Support",
                "chat_type": "direct",
                "assistant_id": "asst-1",
                "message_count": 4,
                "last_activity": "2024-05-01T12:00:00Z"
            },
            {
                "id": "c2",
                "title": "Ops war room",
                "description": "incident follow-ups",
                "chat_type": "group",
                "message_count": 0,
                "last_activity": "2024-05-02T08:30:00Z"
            }
        ])))
        .mount(&server)
        .await;

    let api = ChatApi::new(server.uri(), Some("cfb-test".to_string()));
    let chats = api.list_chats().await.unwrap();

    assert_eq!(chats.len(), 2);
    assert_eq!(chats[0].id, "c1");
    assert_eq!(chats[0].chat_type, ChatKind::Direct);
    assert_eq!(chats[0].message_count, 4);
    assert_eq!(chats[1].description.as_deref(), Some("incident follow-ups"));
    assert!(chats[1].assistant_id.is_none());
}

#[tokio::test]
async fn test_list_messages_parses_sources() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chats/c1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "m1",
                "chat_id": "c1",
                "sender": "user",
                "content": "what does the handbook say?",
                "timestamp": "2024-05-01T12:00:00Z",
                "status": "read",
                "seq": 1
            },
            {
                "id": "m2",
                "chat_id": "c1",
                "sender": "assistant",
                "content": "Remote days are flexible.",
                "timestamp": "2024-05-01T12:00:05Z",
                "status": "delivered",
                "seq": 2,
                "ai_model_used": "gpt-4o",
                "processing_time_ms": 840,
                "rag_sources": [
                    {
                        "title": "Employee Handbook",
                        "origin_document_id": "doc-1",
                        "similarity_score": 0.93,
                        "page_number": 12
                    }
                ]
            }
        ])))
        .mount(&server)
        .await;

    let api = ChatApi::new(server.uri(), None);
    let messages = api.list_messages("c1").await.unwrap();

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].sender, SenderRole::User);
    assert_eq!(messages[0].status, MessageStatus::Read);
    assert_eq!(messages[1].ai_model_used.as_deref(), Some("gpt-4o"));
    let sources = messages[1].rag_sources.as_ref().unwrap();
    assert_eq!(sources[0].title, "Employee Handbook");
    assert_eq!(sources[0].page_number, Some(12));
}

// ============================================================================
// Mutation
// ============================================================================

#[tokio::test]
async fn test_create_chat_posts_title_and_assistant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chats"))
        .and(body_json(json!({
            "title": "New chat",
            "assistant_id": "asst-1"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "c9",
            "title": "New chat",
            "chat_type": "direct",
            "assistant_id": "asst-1",
            "message_count": 0,
            "last_activity": "2024-05-01T12:00:00Z"
        })))
        .mount(&server)
        .await;

    let api = ChatApi::new(server.uri(), None);
    let chat = api
        .create_chat(&CreateChatRequest {
            title: "New chat".to_string(),
            assistant_id: "asst-1".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(chat.id, "c9");
    assert_eq!(chat.assistant_id.as_deref(), Some("asst-1"));
}

#[tokio::test]
async fn test_delete_chat_accepts_empty_success() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/chats/c1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let api = ChatApi::new(server.uri(), None);
    assert_ok!(api.delete_chat("c1").await);
}

// ============================================================================
// Error Mapping
// ============================================================================

#[tokio::test]
async fn test_http_error_carries_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chats"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database gone"))
        .mount(&server)
        .await;

    let api = ChatApi::new(server.uri(), None);
    let err = api.list_chats().await.unwrap_err();

    assert!(matches!(err, ApiError::Api { status: 500, .. }));
    assert_eq!(err.to_string(), "API error (HTTP 500): database gone");
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chats"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let api = ChatApi::new(server.uri(), None);
    assert!(matches!(api.list_chats().await, Err(ApiError::Parse(_))));
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    // Start a server just to get a free port, then drop it. An exclusive
    // (non-pooled) server is required: pooled servers keep listening after
    // the guard drops, so the port would not actually refuse connections.
    let uri = {
        let server = MockServer::builder().start().await;
        server.uri()
    };

    let api = ChatApi::new(uri, None);
    assert!(matches!(api.list_chats().await, Err(ApiError::Network(_))));
}

//! HTTP transport and REST client against a local one-shot server

use std::sync::Arc;
use std::time::Duration;

use assistant_core::{
    ApiClient, ApiError, ChatController, ConversationId, Credentials, HttpTransport,
    SessionStatus,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Accept one connection, answer with `response`, return the raw request
async fn serve_once(response: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        request
    });

    (format!("http://{addr}/api"), handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&data).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if data.len() >= head_end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).to_string()
}

fn event_stream(events: &[&str]) -> String {
    let body: String = events.iter().map(|e| format!("data: {e}\n\n")).collect();
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n{body}"
    )
}

fn plain(status_line: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

#[tokio::test]
async fn chat_streams_over_http_with_bearer_token() {
    let (base_url, server) = serve_once(event_stream(&[
        r#"{"type":"message_chunk","content":"Hi ","is_final":false}"#,
        r#"{"type":"message_chunk","content":"there","is_final":true}"#,
        r#"{"type":"done","conversation_id":5}"#,
    ]))
    .await;

    let credentials = Credentials::new(Some("secret-token".to_string()));
    let transport = Arc::new(HttpTransport::new(base_url, credentials).unwrap());
    let chat = ChatController::new(transport, 3);

    let session = chat.send_message("hello").unwrap();
    assert_eq!(session.wait().await, SessionStatus::Completed);

    let request = server.await.unwrap();
    let lowered = request.to_lowercase();
    assert!(request.starts_with("POST /api/assistant/chat-stream "));
    assert!(lowered.contains("authorization: bearer secret-token"));
    assert!(lowered.contains("accept: text/event-stream"));
    assert!(request.contains(r#""message":"hello""#));
    assert!(request.contains(r#""account_id":3"#));

    let snapshot = chat.snapshot();
    assert_eq!(snapshot.transcript[1].content, "Hi there");
    assert_eq!(snapshot.conversation_id, Some(ConversationId::from(5)));
}

#[tokio::test]
async fn rejected_stream_surfaces_status() {
    let (base_url, server) = serve_once(plain("401 Unauthorized", "token expired")).await;

    let transport = Arc::new(HttpTransport::new(base_url, Credentials::default()).unwrap());
    let chat = ChatController::new(transport, 1);

    let session = chat.send_message("hello").unwrap();
    assert_eq!(session.wait().await, SessionStatus::Errored);

    let request = server.await.unwrap();
    assert!(!request.to_lowercase().contains("authorization:"));

    let error = chat.snapshot().error.unwrap();
    assert!(!error.recoverable);
    assert!(error.message.contains("401"));
    assert!(error.message.contains("token expired"));
}

#[tokio::test]
async fn no_content_is_an_empty_response() {
    let (base_url, server) = serve_once(plain("204 No Content", "")).await;

    let client = ApiClient::new(base_url, Credentials::default(), Duration::from_secs(5)).unwrap();
    let result = client
        .conversations()
        .get(&ConversationId::from(9))
        .await;

    assert!(matches!(result, Err(ApiError::EmptyResponse(_))));
    let request = server.await.unwrap();
    assert!(request.starts_with("GET /api/assistant/conversations/9 "));
}

#[tokio::test]
async fn api_error_status_is_reported() {
    let (base_url, _server) = serve_once(plain("422 Unprocessable Entity", "bad amount")).await;

    let client = ApiClient::new(base_url, Credentials::default(), Duration::from_secs(5)).unwrap();
    let result = client.tags().list().await;

    match result {
        Err(ApiError::Status { status, body }) => {
            assert_eq!(status, 422);
            assert_eq!(body, "bad amount");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn categories_are_decoded() {
    let body = r##"[{"id":1,"name":"Food","icon":"utensils","color":"#ff0000"}]"##;
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let (base_url, _server) = serve_once(response).await;

    let client = ApiClient::new(base_url, Credentials::default(), Duration::from_secs(5)).unwrap();
    let categories = client.categories().list().await.unwrap();

    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].name, "Food");
}

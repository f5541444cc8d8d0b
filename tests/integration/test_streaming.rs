//! Integration tests for streaming generations over WebSocket.
//!
//! These tests run a mock generation service on a local port and drive the
//! engine's WebSocket connector against it end to end.

use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use classgen_content::{LessonMetadata, LessonPlan, Quiz, QuizMetadata};
use classgen_engine::{
    generate, ConnectionState, EngineConfig, EngineError, FinalSource, Identity, SessionEvent,
    SessionHandle, SessionRegistry,
};
use serde_json::json;
use tokio::time::timeout;

const QUIZ_TOKENS: &[&str] = &[
    "Question 1 (Multiple Choice): What is the powerhouse of the cell?\n",
    "A) Nucleus\n",
    "B) Mitochondria\n",
    "C) Ribosome\n",
    "Correct Answer: B\n",
    "\n",
    "Question 2 (True/False): Plants make their own food.\n",
    "Correct Answer: True\n",
];

const LESSON_TEXT: &str = "Talk about how clouds form, then go outside and look at them.";

/// How the mock service answers each prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Streams the quiz tokens, then `done`.
    Stream,
    /// Sends only `done` with the full response.
    DoneOnly,
    /// Reports a generation error.
    Error,
    /// On the first connection, sends one token and drops the socket.
    DropFirstRequest,
    /// Streams the quiz tokens slowly.
    Slow,
}

#[derive(Clone)]
struct Mock {
    mode: Mode,
    connections: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl Mock {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            connections: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Spawns the mock service and returns its base WebSocket URL.
async fn spawn_mock_service(mock: Mock) -> (String, tokio::task::JoinHandle<()>) {
    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");
    let service_url = format!("ws://{addr}/ws");

    let router = Router::new()
        .route("/ws/:purpose/:owner", get(ws_handler))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (service_url, handle)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((purpose, owner)): Path<(String, String)>,
    State(mock): State<Mock>,
) -> Response {
    ws.on_upgrade(move |socket| serve_connection(socket, mock, purpose, owner))
}

async fn serve_connection(mut socket: WebSocket, mock: Mock, purpose: String, owner: String) {
    let connection = mock.connections.fetch_add(1, Ordering::SeqCst) + 1;

    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(prompt) = message else {
            continue;
        };
        mock.prompts
            .lock()
            .expect("prompts lock")
            .push(format!("{purpose}/{owner} {prompt}"));

        match mock.mode {
            Mode::Stream => stream_quiz(&mut socket, Duration::ZERO).await,
            Mode::Slow => stream_quiz(&mut socket, Duration::from_millis(100)).await,
            Mode::DoneOnly => {
                send(&mut socket, json!({ "type": "done", "full_response": LESSON_TEXT })).await;
            }
            Mode::Error => {
                send(&mut socket, json!({ "type": "error", "message": "model overloaded" })).await;
            }
            Mode::DropFirstRequest if connection == 1 => {
                send(&mut socket, json!({ "type": "token", "content": QUIZ_TOKENS[0] })).await;
                return;
            }
            Mode::DropFirstRequest => stream_quiz(&mut socket, Duration::ZERO).await,
        }
    }
}

async fn stream_quiz(socket: &mut WebSocket, pause: Duration) {
    // Malformed frames are dropped by the client without disturbing the stream
    send_text(socket, "{\"type\":\"heartbeat\"}").await;
    for token in QUIZ_TOKENS {
        send(socket, json!({ "type": "token", "content": token })).await;
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
    send(socket, json!({ "type": "done", "full_response": "ignored" })).await;
}

async fn send(socket: &mut WebSocket, frame: serde_json::Value) {
    send_text(socket, &frame.to_string()).await;
}

async fn send_text(socket: &mut WebSocket, text: &str) {
    let _ = socket.send(Message::Text(text.to_string())).await;
}

fn config(service_url: String) -> EngineConfig {
    EngineConfig {
        service_url,
        retry_delay_ms: 50,
        ..EngineConfig::default()
    }
}

/// Receives the next event, failing the test after five seconds.
async fn next_event(handle: &mut SessionHandle) -> Option<SessionEvent> {
    timeout(Duration::from_secs(5), handle.next_event())
        .await
        .expect("Timeout waiting for session event")
}

// ============================================================================
// Generation Tests
// ============================================================================

/// Tests that streamed tokens assemble into a parsed quiz.
#[tokio::test]
async fn test_streamed_tokens_become_quiz() {
    let mock = Mock::new(Mode::Stream);
    let (url, _server) = spawn_mock_service(mock.clone()).await;
    let mut registry = SessionRegistry::websocket(config(url));

    let handle = registry
        .open(Identity::new("alice", "quiz"))
        .await
        .expect("open session");

    let mut streamed = String::new();
    let generation = timeout(
        Duration::from_secs(5),
        generate::<Quiz, _>(handle, "cells", QuizMetadata::default(), |fragment| {
            streamed.push_str(fragment);
        }),
    )
    .await
    .expect("Timeout waiting for generation")
    .expect("generation succeeds");

    assert_eq!(generation.source, FinalSource::Buffer);
    assert_eq!(generation.text, QUIZ_TOKENS.concat());
    assert_eq!(streamed, generation.text);
    assert!(generation.resolved.structured);
    assert_eq!(generation.resolved.document.len(), 2);
    assert_eq!(mock.prompts(), vec![r#"alice/quiz {"prompt":"cells"}"#.to_string()]);

    registry.close_all().await;
}

/// Tests that a `done` frame without tokens uses the full response.
#[tokio::test]
async fn test_done_only_uses_full_response() {
    let mock = Mock::new(Mode::DoneOnly);
    let (url, _server) = spawn_mock_service(mock.clone()).await;
    let mut registry = SessionRegistry::websocket(config(url));

    let handle = registry
        .open(Identity::new("bob", "lesson-plan"))
        .await
        .expect("open session");

    let generation = timeout(
        Duration::from_secs(5),
        generate::<LessonPlan, _>(handle, "weather", LessonMetadata::default(), |_| {}),
    )
    .await
    .expect("Timeout waiting for generation")
    .expect("generation succeeds");

    assert_eq!(generation.source, FinalSource::FullResponse);
    assert_eq!(generation.text, LESSON_TEXT);
    assert!(!generation.resolved.structured);
    assert_eq!(generation.resolved.document.len(), 1);
    assert_eq!(
        mock.prompts(),
        vec![r#"bob/lesson-plan {"message":"weather"}"#.to_string()]
    );

    registry.close_all().await;
}

/// Tests that a remote error fails the request but keeps the session open.
#[tokio::test]
async fn test_remote_error_fails_request() {
    let mock = Mock::new(Mode::Error);
    let (url, _server) = spawn_mock_service(mock.clone()).await;
    let mut registry = SessionRegistry::websocket(config(url));
    let identity = Identity::new("alice", "quiz");

    let handle = registry.open(identity.clone()).await.expect("open session");
    let err = generate::<Quiz, _>(handle, "cells", QuizMetadata::default(), |_| {})
        .await
        .expect_err("generation fails");

    assert!(
        matches!(err, EngineError::Generation { ref message } if message == "model overloaded"),
        "unexpected error: {err}"
    );

    let handle = registry.get_mut(&identity).expect("session still registered");
    assert_eq!(
        next_event(handle).await,
        Some(SessionEvent::State(ConnectionState::Open))
    );

    registry.close_all().await;
}

// ============================================================================
// Connection Tests
// ============================================================================

/// Tests that the session reconnects after the service drops it mid-request.
#[tokio::test]
async fn test_reconnects_after_server_drop() {
    let mock = Mock::new(Mode::DropFirstRequest);
    let (url, _server) = spawn_mock_service(mock.clone()).await;
    let mut registry = SessionRegistry::websocket(config(url));

    let handle = registry
        .open(Identity::new("alice", "quiz"))
        .await
        .expect("open session");

    let err = timeout(
        Duration::from_secs(5),
        generate::<Quiz, _>(handle, "cells", QuizMetadata::default(), |_| {}),
    )
    .await
    .expect("Timeout waiting for generation")
    .expect_err("first request is abandoned");
    assert!(matches!(err, EngineError::Transport { .. }), "unexpected error: {err}");

    let generation = timeout(
        Duration::from_secs(5),
        generate::<Quiz, _>(handle, "cells again", QuizMetadata::default(), |_| {}),
    )
    .await
    .expect("Timeout waiting for generation")
    .expect("second request succeeds");

    assert_eq!(generation.text, QUIZ_TOKENS.concat());
    assert_eq!(mock.connections(), 2);

    registry.close_all().await;
}

/// Tests that nothing is delivered after close, even mid-stream.
#[tokio::test]
async fn test_close_suppresses_events() {
    let mock = Mock::new(Mode::Slow);
    let (url, _server) = spawn_mock_service(mock.clone()).await;
    let mut registry = SessionRegistry::websocket(config(url));
    let identity = Identity::new("alice", "quiz");

    let handle = registry.open(identity.clone()).await.expect("open session");
    timeout(Duration::from_secs(5), handle.wait_until_open())
        .await
        .expect("Timeout waiting for open")
        .expect("session opens");
    handle.send("cells").await.expect("send prompt");

    loop {
        match next_event(handle).await {
            Some(SessionEvent::Fragment(_)) => break,
            Some(_) => {}
            None => panic!("session ended before the first fragment"),
        }
    }

    handle.close().await;
    assert_eq!(handle.next_event().await, None);
    assert!(matches!(
        handle.send("again").await,
        Err(EngineError::SessionClosed { .. })
    ));

    // No reconnect happens after an intentional close
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(mock.connections(), 1);

    assert!(registry.close(&identity).await);
}

/// Tests that reopening an identity supersedes the previous session.
#[tokio::test]
async fn test_reopen_supersedes_session() {
    let mock = Mock::new(Mode::Stream);
    let (url, _server) = spawn_mock_service(mock.clone()).await;
    let mut registry = SessionRegistry::websocket(config(url));
    let identity = Identity::new("alice", "quiz");

    let handle = registry.open(identity.clone()).await.expect("open session");
    timeout(Duration::from_secs(5), handle.wait_until_open())
        .await
        .expect("Timeout waiting for open")
        .expect("session opens");

    let handle = registry.open(identity.clone()).await.expect("reopen session");
    let generation = timeout(
        Duration::from_secs(5),
        generate::<Quiz, _>(handle, "cells", QuizMetadata::default(), |_| {}),
    )
    .await
    .expect("Timeout waiting for generation")
    .expect("generation succeeds");

    assert_eq!(generation.resolved.document.len(), 2);
    assert_eq!(registry.len(), 1);
    assert_eq!(mock.connections(), 2);

    registry.close_all().await;
}

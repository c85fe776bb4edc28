use axum::{routing::get, Router};
use sse_chat::client::{
    ConnectionController, ConnectionStatus, HttpDelivery, MessageSession, Sender, SessionUpdate,
    SseTransport,
};
use sse_chat::config::{ServerConfig, DEFAULT_WELCOME_MESSAGE};
use sse_chat::{server, sse};
use sse_chat::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

struct TestServer {
    stream_url: String,
    state: Arc<AppState>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        timeout(WAIT, self.handle)
            .await
            .expect("server should stop")
            .unwrap()
            .unwrap();
    }
}

async fn spawn_server(welcome: &str) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(AppState::new(ServerConfig {
        bind_addr: addr,
        welcome_message: welcome.to_string(),
    }));

    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server::run_until(listener, state.clone(), async {
        let _ = rx.await;
    }));

    TestServer {
        stream_url: format!("http://{}/sse", addr),
        state,
        shutdown: Some(tx),
        handle,
    }
}

fn new_session() -> MessageSession {
    MessageSession::new(
        ConnectionController::new(Arc::new(SseTransport::new())),
        Arc::new(HttpDelivery::new()),
        Duration::from_millis(20),
    )
}

/// Next update with a visible effect
async fn next_update(session: &mut MessageSession) -> SessionUpdate {
    timeout(WAIT, async {
        loop {
            match session.process_next().await {
                SessionUpdate::Idle => continue,
                update => return update,
            }
        }
    })
    .await
    .expect("timed out waiting for a session update")
}

async fn expect_status(session: &mut MessageSession, expected: ConnectionStatus) {
    match next_update(session).await {
        SessionUpdate::StatusChanged(status) => assert_eq!(status, expected),
        other => panic!("Expected status {:?}, got {:?}", expected, other),
    }
}

async fn expect_remote(session: &mut MessageSession) -> String {
    match next_update(session).await {
        SessionUpdate::Appended(message) => {
            assert_eq!(message.sender, Sender::Remote);
            message.content
        }
        other => panic!("Expected inbound message, got {:?}", other),
    }
}

/// Connect and consume the welcome frame
async fn join(session: &mut MessageSession, server: &TestServer) {
    session.connect(&server.stream_url).unwrap();
    expect_status(session, ConnectionStatus::Connected).await;
    assert_eq!(expect_remote(session).await, DEFAULT_WELCOME_MESSAGE);
}

async fn assert_quiet(session: &mut MessageSession) {
    let result = timeout(QUIET, async {
        loop {
            match session.process_next().await {
                SessionUpdate::Idle => continue,
                update => return update,
            }
        }
    })
    .await;
    assert!(result.is_err(), "Unexpected update: {:?}", result);
}

/// Single client connects, sends, and sees its own echo
#[tokio::test]
async fn test_connect_send_and_receive_echo() {
    let server = spawn_server(DEFAULT_WELCOME_MESSAGE).await;
    let mut session = new_session();

    session.connect(&server.stream_url).unwrap();
    assert_eq!(session.status(), ConnectionStatus::Connecting);
    expect_status(&mut session, ConnectionStatus::Connected).await;
    assert!(session.log().is_empty());

    assert_eq!(expect_remote(&mut session).await, DEFAULT_WELCOME_MESSAGE);

    let sent = session.send("hi").unwrap();
    assert_eq!(sent.sender, Sender::User);
    assert!(session.is_composing());

    assert_eq!(expect_remote(&mut session).await, "Echo from server: hi");
    assert!(!session.is_composing());

    let log: Vec<_> = session
        .log()
        .iter()
        .map(|m| (m.sender, m.content.as_str()))
        .collect();
    assert_eq!(
        log,
        vec![
            (Sender::Remote, DEFAULT_WELCOME_MESSAGE),
            (Sender::User, "hi"),
            (Sender::Remote, "Echo from server: hi"),
        ]
    );

    server.stop().await;
}

#[tokio::test]
async fn test_custom_welcome_message() {
    let server = spawn_server("Hello there").await;
    let mut session = new_session();

    session.connect(&server.stream_url).unwrap();
    expect_status(&mut session, ConnectionStatus::Connected).await;
    assert_eq!(expect_remote(&mut session).await, "Hello there");

    server.stop().await;
}

#[tokio::test]
async fn test_send_without_connection_never_reaches_server() {
    let server = spawn_server(DEFAULT_WELCOME_MESSAGE).await;
    let mut listener = new_session();
    join(&mut listener, &server).await;

    let mut offline = new_session();
    offline.send("anyone?").unwrap();
    assert_eq!(
        expect_remote(&mut offline).await,
        sse_chat::client::session::NO_CONNECTION_REPLY
    );
    assert_eq!(offline.status(), ConnectionStatus::Disconnected);

    assert_quiet(&mut listener).await;
    server.stop().await;
}

/// Every open stream receives a broadcast; a late joiner only sees its welcome
#[tokio::test]
async fn test_broadcast_reaches_all_current_clients() {
    let server = spawn_server(DEFAULT_WELCOME_MESSAGE).await;
    let mut alice = new_session();
    let mut bob = new_session();
    join(&mut alice, &server).await;
    join(&mut bob, &server).await;
    assert_eq!(server.state.channel.registry().len().await, 2);

    alice.send("x").unwrap();
    assert_eq!(expect_remote(&mut alice).await, "Echo from server: x");
    assert_eq!(expect_remote(&mut bob).await, "Echo from server: x");

    let mut carol = new_session();
    join(&mut carol, &server).await;
    assert_quiet(&mut carol).await;
    assert_eq!(carol.log().len(), 1);

    server.stop().await;
}

#[tokio::test]
async fn test_server_shutdown_moves_client_to_error() {
    let server = spawn_server(DEFAULT_WELCOME_MESSAGE).await;
    let mut session = new_session();
    join(&mut session, &server).await;

    server.stop().await;
    expect_status(&mut session, ConnectionStatus::Error).await;
    assert!(!session.controller().endpoint().is_empty());

    // No automatic reconnect
    assert_quiet(&mut session).await;
    assert_eq!(session.status(), ConnectionStatus::Error);
}

#[tokio::test]
async fn test_server_closing_streams_moves_client_to_error() {
    let server = spawn_server(DEFAULT_WELCOME_MESSAGE).await;
    let mut session = new_session();
    join(&mut session, &server).await;

    assert_eq!(server.state.channel.close_all().await, 1);
    expect_status(&mut session, ConnectionStatus::Error).await;

    // Reconnecting from error works
    join(&mut session, &server).await;
    server.stop().await;
}

#[tokio::test]
async fn test_disconnect_stops_delivery_and_frees_registration() {
    let server = spawn_server(DEFAULT_WELCOME_MESSAGE).await;
    let mut session = new_session();
    join(&mut session, &server).await;
    assert_eq!(server.state.channel.registry().len().await, 1);

    session.disconnect();
    assert_eq!(session.status(), ConnectionStatus::Disconnected);

    // Writes into the dropped connection eventually fail and the stream is unregistered
    let cleaned = timeout(WAIT, async {
        loop {
            server.state.channel.publish("after").await;
            if server.state.channel.registry().is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(cleaned.is_ok(), "registration was never removed");

    assert_quiet(&mut session).await;
    assert_eq!(session.log().len(), 1);

    server.stop().await;
}

/// Stream-only server: the send path answers 404
#[tokio::test]
async fn test_failed_delivery_reports_apology() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(AppState::default());
    let app = Router::new()
        .route(server::STREAM_PATH, get(sse::sse_handler))
        .with_state(state);
    let handle = tokio::spawn(async move { axum::serve(listener, app).await });

    let mut session = new_session();
    session.connect(&format!("http://{}/sse", addr)).unwrap();
    expect_status(&mut session, ConnectionStatus::Connected).await;
    assert_eq!(expect_remote(&mut session).await, DEFAULT_WELCOME_MESSAGE);

    session.send("lost").unwrap();
    assert_eq!(
        expect_remote(&mut session).await,
        sse_chat::client::session::DELIVERY_FAILED_REPLY
    );
    assert!(!session.is_composing());
    assert_eq!(session.status(), ConnectionStatus::Connected);

    handle.abort();
}

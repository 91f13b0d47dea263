//! Streaming session tests.
//!
//! The relay is checked directly through the orchestrator's event channel,
//! and end to end over a WebSocket against a served router.


use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use remote_exec::api::{router, AppState};
use remote_exec::relay::StreamEvent;
use remote_exec::strategy::ExecuteRequest;
use remote_exec::Orchestrator;
use test_harness::{finished_text, remote_orchestrator, simulated_orchestrator, FakeControlPlane};

/// Serve the router on an ephemeral port and return its address.
async fn serve(orchestrator: Arc<Orchestrator>, shutdown: CancellationToken) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(AppState {
        orchestrator,
        shutdown: shutdown.clone(),
    });
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .unwrap();
    });
    format!("ws://{}/api/v1/databricks/execute/stream", addr)
}

/// Send one request frame and collect every event until the server closes.
async fn run_session(url: &str, request: Value) -> Vec<Value> {
    let (mut socket, _) = connect_async(url).await.unwrap();
    socket
        .send(Message::Text(request.to_string().into()))
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(frame) = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .unwrap()
    {
        match frame.unwrap() {
            Message::Text(text) => events.push(serde_json::from_str(&text).unwrap()),
            Message::Close(_) => break,
            _ => {}
        }
    }
    events
}

#[tokio::test]
async fn test_simulated_relay_events_in_order() {
    let orchestrator = simulated_orchestrator();
    let events: Vec<StreamEvent> =
        ReceiverStream::new(orchestrator.stream(ExecuteRequest::new("mock-cluster-1", "a\nb\nc")))
            .collect()
            .await;

    assert_eq!(
        events,
        vec![
            StreamEvent::running(),
            StreamEvent::output("> a\n"),
            StreamEvent::output("> b\n"),
            StreamEvent::output("> c\n"),
            StreamEvent::finished(),
        ]
    );
}

#[tokio::test]
async fn test_remote_relay_ends_with_single_error() {
    let fake = FakeControlPlane::new();
    fake.push_status(Ok(test_harness::finished_error("ZeroDivisionError")));
    let orchestrator = remote_orchestrator(fake);

    let events: Vec<StreamEvent> =
        ReceiverStream::new(orchestrator.stream(ExecuteRequest::new("c1", "1/0")))
            .collect()
            .await;

    assert_eq!(
        events,
        vec![StreamEvent::running(), StreamEvent::error("ZeroDivisionError")]
    );
}

#[tokio::test]
async fn test_websocket_simulated_session() {
    let url = serve(simulated_orchestrator(), CancellationToken::new()).await;

    let events = run_session(
        &format!("{url}/session-1"),
        json!({"cluster_id": "mock-cluster-1", "code": "x = 1\nprint(x)"}),
    )
    .await;

    assert_eq!(
        events,
        vec![
            json!({"type": "status", "status": "running"}),
            json!({"type": "output", "content": "> x = 1\n"}),
            json!({"type": "output", "content": "> print(x)\n"}),
            json!({"type": "status", "status": "finished"}),
        ]
    );
}

#[tokio::test]
async fn test_websocket_remote_session() {
    let fake = FakeControlPlane::new();
    fake.push_status(Ok(finished_text("1\n2")));
    let url = serve(remote_orchestrator(fake.clone()), CancellationToken::new()).await;

    let events = run_session(
        &format!("{url}/session-2"),
        json!({"cluster_id": "c1", "code": "for i in (1, 2): print(i)"}),
    )
    .await;

    assert_eq!(
        events,
        vec![
            json!({"type": "status", "status": "running"}),
            json!({"type": "output", "content": "1\n"}),
            json!({"type": "output", "content": "2\n"}),
            json!({"type": "status", "status": "finished"}),
        ]
    );
    assert_eq!(fake.executes(), 1);
}

#[tokio::test]
async fn test_websocket_missing_fields() {
    let url = serve(simulated_orchestrator(), CancellationToken::new()).await;

    let events = run_session(&format!("{url}/session-3"), json!({"code": "print(1)"})).await;

    assert_eq!(
        events,
        vec![json!({"type": "error", "message": "Missing code or cluster_id"})]
    );
}

#[tokio::test]
async fn test_websocket_invalid_json() {
    let url = serve(simulated_orchestrator(), CancellationToken::new()).await;

    let (mut socket, _) = connect_async(format!("{url}/session-4")).await.unwrap();
    socket
        .send(Message::Text("not json".to_string().into()))
        .await
        .unwrap();

    let frame = socket.next().await.unwrap().unwrap();
    let event: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(event["type"], "error");
    assert!(event["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid stream request"));
}

#[tokio::test]
async fn test_disconnect_does_not_cancel_remote_command() {
    let fake = FakeControlPlane::new();
    let url = serve(remote_orchestrator(fake.clone()), CancellationToken::new()).await;

    let (mut socket, _) = connect_async(format!("{url}/session-5")).await.unwrap();
    socket
        .send(Message::Text(
            json!({"cluster_id": "c1", "code": "import time; time.sleep(600)"})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

    // Wait for the running status, then walk away.
    let frame = socket.next().await.unwrap().unwrap();
    assert_eq!(
        serde_json::from_str::<Value>(frame.to_text().unwrap()).unwrap(),
        json!({"type": "status", "status": "running"})
    );
    socket.close(None).await.unwrap();
    drop(socket);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fake.cancels(), 0);
}

#[tokio::test]
async fn test_shutdown_closes_open_sessions() {
    let shutdown = CancellationToken::new();
    let mut orchestrator_config = test_harness::test_config();
    orchestrator_config.simulation.line_delay_ms = 10_000;
    let orchestrator = Arc::new(Orchestrator::simulated(orchestrator_config));
    let url = serve(orchestrator, shutdown.clone()).await;

    let (mut socket, _) = connect_async(format!("{url}/session-6")).await.unwrap();
    socket
        .send(Message::Text(
            json!({"cluster_id": "mock-cluster-1", "code": "a\nb"})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

    let first = socket.next().await.unwrap().unwrap();
    assert!(first.to_text().unwrap().contains("running"));

    shutdown.cancel();

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "session should close on shutdown");
}

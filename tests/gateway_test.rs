//! Gateway client tests against a local mock gateway.
//!
//! The mock speaks the gateway's framing over tokio-tungstenite: challenge,
//! connect response, chat.send ack, then a scripted series of events.

use clawnet::base::neterror::{ErrorKind, NetError};
use clawnet::config::GatewayConfig;
use clawnet::gateway::{ChatRequest, GatewayClient, RunState, StreamEvent};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

enum Step {
    Send(Value),
    Sleep(Duration),
}

type Script = Arc<dyn Fn(&str) -> Vec<Step> + Send + Sync>;

#[derive(Clone)]
struct MockGateway {
    send_challenge: bool,
    auth_error: Option<&'static str>,
    chat_error: Option<&'static str>,
    script: Script,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl MockGateway {
    fn new(script: impl Fn(&str) -> Vec<Step> + Send + Sync + 'static) -> Self {
        Self {
            send_challenge: true,
            auth_error: None,
            chat_error: None,
            script: Arc::new(script),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Start serving; returns the `ws://` URL.
    async fn start(&self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mock = self.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(mock.clone().serve(stream));
            }
        });
        format!("ws://{}", addr)
    }

    fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    async fn serve(self, stream: TcpStream) {
        let Ok(mut ws) = accept_async(stream).await else {
            return;
        };

        if !self.send_challenge {
            drain(&mut ws).await;
            return;
        }
        send(
            &mut ws,
            json!({"type": "event", "event": "connect.challenge", "payload": {"nonce": "n-1", "ts": 0}}),
        )
        .await;

        let Some(connect) = next_request(&mut ws).await else {
            return;
        };
        self.requests.lock().unwrap().push(connect.clone());
        // Unrelated event before the response; must be skipped.
        send(&mut ws, json!({"type": "event", "event": "tick", "payload": {"ts": 1}})).await;
        match self.auth_error {
            Some(message) => {
                send(&mut ws, response(&connect, false, Some(message))).await;
                drain(&mut ws).await;
                return;
            }
            None => send(&mut ws, response(&connect, true, None)).await,
        }

        let Some(chat) = next_request(&mut ws).await else {
            return;
        };
        self.requests.lock().unwrap().push(chat.clone());
        if let Some(message) = self.chat_error {
            send(&mut ws, response(&chat, false, Some(message))).await;
            drain(&mut ws).await;
            return;
        }
        send(&mut ws, response(&chat, true, None)).await;

        let run_id = chat["params"]["idempotencyKey"]
            .as_str()
            .unwrap()
            .to_string();
        for step in (self.script)(&run_id) {
            match step {
                Step::Send(frame) => send(&mut ws, frame).await,
                Step::Sleep(duration) => tokio::time::sleep(duration).await,
            }
        }
        drain(&mut ws).await;
    }
}

async fn send(ws: &mut WebSocketStream<TcpStream>, frame: Value) {
    let _ = ws.send(Message::Text(frame.to_string())).await;
}

async fn next_request(ws: &mut WebSocketStream<TcpStream>) -> Option<Value> {
    while let Some(Ok(message)) = ws.next().await {
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).ok();
        }
    }
    None
}

async fn drain(ws: &mut WebSocketStream<TcpStream>) {
    while let Some(Ok(message)) = ws.next().await {
        if message.is_close() {
            break;
        }
    }
}

fn response(request: &Value, ok: bool, error: Option<&str>) -> Value {
    let mut frame = json!({"type": "res", "id": request["id"], "ok": ok});
    if let Some(message) = error {
        frame["error"] = json!({"code": "INVALID_REQUEST", "message": message});
    }
    frame
}

fn delta(run_id: &str, delta: &str, text: &str) -> Value {
    json!({
        "type": "event",
        "event": "agent",
        "payload": {"runId": run_id, "stream": "assistant", "data": {"delta": delta, "text": text}}
    })
}

fn final_event(run_id: &str, blocks: &[&str]) -> Value {
    let content: Vec<Value> = blocks
        .iter()
        .map(|text| json!({"type": "text", "text": text}))
        .collect();
    json!({
        "type": "event",
        "event": "chat",
        "payload": {"runId": run_id, "state": "final", "message": {"role": "assistant", "content": content}}
    })
}

fn error_event(run_id: &str, message: &str) -> Value {
    json!({
        "type": "event",
        "event": "chat",
        "payload": {"runId": run_id, "state": "error", "errorMessage": message}
    })
}

fn client(url: String) -> GatewayClient {
    GatewayClient::new(
        GatewayConfig::new(url)
            .with_token("test-token")
            .with_session_prefix("ns")
            .with_challenge_timeout(Duration::from_secs(2))
            .with_ack_timeout(Duration::from_secs(2))
            .with_response_timeout(Duration::from_secs(5)),
    )
}

#[tokio::test]
async fn test_send_message_returns_final_text() {
    let mock = MockGateway::new(|run_id| {
        vec![
            Step::Send(delta(run_id, "A", "A")),
            Step::Send(final_event(run_id, &["A", "B"])),
        ]
    });
    let url = mock.start().await;

    let reply = client(url)
        .send_message(ChatRequest::new("hello").memory_id("study-42"))
        .await
        .unwrap();
    assert_eq!(reply.text, "A\n\nB");
    assert_eq!(reply.session_key.as_str(), "agent:main:ns-study-42");

    let requests = mock.requests();
    assert_eq!(requests.len(), 2);
    let connect = &requests[0];
    assert_eq!(connect["type"], "req");
    assert_eq!(connect["method"], "connect");
    assert_eq!(connect["params"]["minProtocol"], 3);
    assert_eq!(connect["params"]["maxProtocol"], 3);
    assert_eq!(connect["params"]["role"], "operator");
    assert_eq!(connect["params"]["auth"]["token"], "test-token");
    assert_eq!(connect["params"]["client"]["mode"], "backend");

    let chat = &requests[1];
    assert_eq!(chat["method"], "chat.send");
    assert_eq!(chat["params"]["sessionKey"], "agent:main:ns-study-42");
    assert_eq!(chat["params"]["message"], "hello");
    assert_eq!(chat["params"]["idempotencyKey"], reply.run_id.as_str());
}

#[tokio::test]
async fn test_foreign_run_events_are_ignored() {
    let mock = MockGateway::new(|run_id| {
        vec![
            Step::Send(error_event("someone-else", "not yours")),
            Step::Send(final_event("someone-else", &["wrong"])),
            Step::Send(final_event(run_id, &["right"])),
        ]
    });
    let url = mock.start().await;

    let reply = client(url).send_message("hi").await.unwrap();
    assert_eq!(reply.text, "right");
}

#[tokio::test]
async fn test_final_without_text_blocks() {
    let mock = MockGateway::new(|run_id| vec![Step::Send(final_event(run_id, &[]))]);
    let url = mock.start().await;

    let reply = client(url).send_message("hi").await.unwrap();
    assert_eq!(reply.text, "No response generated");
}

#[tokio::test]
async fn test_data_alias_for_payload() {
    let mock = MockGateway::new(|run_id| {
        vec![Step::Send(json!({
            "type": "event",
            "event": "chat",
            "data": {"runId": run_id, "state": "final", "message": {"content": [{"type": "text", "text": "via data"}]}}
        }))]
    });
    let url = mock.start().await;

    let reply = client(url).send_message("hi").await.unwrap();
    assert_eq!(reply.text, "via data");
}

#[tokio::test]
async fn test_agent_error_event() {
    let mock = MockGateway::new(|run_id| vec![Step::Send(error_event(run_id, "model overloaded"))]);
    let url = mock.start().await;

    let err = client(url).send_message("hi").await.unwrap_err();
    assert_eq!(err, NetError::AgentError("model overloaded".to_string()));
    assert_eq!(err.kind(), ErrorKind::Gateway);
}

#[tokio::test]
async fn test_auth_rejected_is_connection_error() {
    let mut mock = MockGateway::new(|_| Vec::new());
    mock.auth_error = Some("invalid token");
    let url = mock.start().await;

    let err = client(url).send_message("hi").await.unwrap_err();
    assert_eq!(err, NetError::AuthRejected("invalid token".to_string()));
    assert_eq!(err.kind(), ErrorKind::Connection);
}

#[tokio::test]
async fn test_chat_rejected_is_gateway_error() {
    let mut mock = MockGateway::new(|_| Vec::new());
    mock.chat_error = Some("unknown session");
    let url = mock.start().await;

    let err = client(url).send_message("hi").await.unwrap_err();
    assert_eq!(err, NetError::RequestRejected("unknown session".to_string()));
    assert_eq!(err.kind(), ErrorKind::Gateway);
}

#[tokio::test]
async fn test_challenge_timeout() {
    let mut mock = MockGateway::new(|_| Vec::new());
    mock.send_challenge = false;
    let url = mock.start().await;

    let client = GatewayClient::new(
        GatewayConfig::new(url).with_challenge_timeout(Duration::from_millis(200)),
    );
    let err = client.send_message("hi").await.unwrap_err();
    assert!(matches!(err, NetError::ChallengeTimedOut(_)));
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_response_timeout() {
    let mock = MockGateway::new(|_| vec![Step::Sleep(Duration::from_secs(5))]);
    let url = mock.start().await;

    let client = GatewayClient::new(
        GatewayConfig::new(url).with_response_timeout(Duration::from_secs(1)),
    );
    let err = client.send_message("hi").await.unwrap_err();
    assert_eq!(err, NetError::ResponseTimedOut(1));
    assert_eq!(err.kind(), ErrorKind::Gateway);
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(format!("ws://{}", addr))
        .send_message("hi")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}

/// Accepts TCP connections and reads from them without ever answering.
async fn silent_server() -> String {
    use tokio::io::AsyncReadExt;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                while stream.read(&mut buf).await.unwrap_or(0) > 0 {}
            });
        }
    });
    format!("ws://{}", addr)
}

#[tokio::test]
async fn test_silent_upgrade_times_out() {
    let url = silent_server().await;
    let client = GatewayClient::new(
        GatewayConfig::new(url).with_challenge_timeout(Duration::from_millis(300)),
    );

    let err = tokio::time::timeout(Duration::from_secs(5), client.send_message("hi"))
        .await
        .expect("send_message must give up on its own")
        .unwrap_err();
    assert!(matches!(err, NetError::ConnectTimedOut(_)));
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.is_timeout());

    let err = tokio::time::timeout(Duration::from_secs(5), client.stream_message("hi"))
        .await
        .expect("stream_message must give up on its own")
        .unwrap_err();
    assert!(matches!(err, NetError::ConnectTimedOut(_)));
}

#[tokio::test]
async fn test_stream_deltas_then_complete() {
    let mock = MockGateway::new(|run_id| {
        vec![
            Step::Send(delta("other-run", "x", "x")),
            Step::Send(delta(run_id, "Hel", "Hel")),
            Step::Send(json!({"type": "event", "event": "agent", "payload": {"runId": run_id, "stream": "tool", "data": {"name": "search"}}})),
            Step::Send(delta(run_id, "lo", "Hello")),
            Step::Send(final_event(run_id, &["Hello"])),
        ]
    });
    let url = mock.start().await;

    let mut stream = client(url)
        .stream_message(ChatRequest::new("hi").agent_id("tutor"))
        .await
        .unwrap();
    assert_eq!(stream.session_key().as_str(), "agent:tutor:ns-default");
    assert_eq!(stream.state(), RunState::Streaming);

    let mut events = Vec::new();
    while let Some(event) = stream.next_event().await {
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            StreamEvent::Delta {
                delta: "Hel".into(),
                text: "Hel".into()
            },
            StreamEvent::Delta {
                delta: "lo".into(),
                text: "Hello".into()
            },
            StreamEvent::Complete {
                text: "Hello".into(),
                session_key: stream.session_key().clone(),
            },
        ]
    );
    assert_eq!(stream.state(), RunState::Completed);
    assert!(stream.next_event().await.is_none());
}

#[tokio::test]
async fn test_stream_idle_ticks() {
    let mock = MockGateway::new(|run_id| {
        vec![
            Step::Sleep(Duration::from_millis(700)),
            Step::Send(final_event(run_id, &["done"])),
        ]
    });
    let url = mock.start().await;

    let client = GatewayClient::new(
        GatewayConfig::new(url).with_idle_timeout(Duration::from_millis(200)),
    );
    let stream = client.stream_message("hi").await.unwrap();
    let events: Vec<StreamEvent> = stream.into_stream().collect().await;

    let idles = events
        .iter()
        .filter(|event| **event == StreamEvent::Idle)
        .count();
    assert!(idles >= 2, "expected idle ticks, got {:?}", events);
    assert!(matches!(
        events.last(),
        Some(StreamEvent::Complete { text, .. }) if text == "done"
    ));
}

#[tokio::test]
async fn test_stream_error_event() {
    let mock = MockGateway::new(|run_id| {
        vec![
            Step::Send(delta(run_id, "partial", "partial")),
            Step::Send(error_event(run_id, "tool crashed")),
        ]
    });
    let url = mock.start().await;

    let stream = client(url).stream_message("hi").await.unwrap();
    let events: Vec<StreamEvent> = stream.into_stream().collect().await;
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[1],
        StreamEvent::Error {
            message: "tool crashed".into()
        }
    );
}

#[tokio::test]
async fn test_stream_deadline_synthesizes_error() {
    let mock = MockGateway::new(|_| vec![Step::Sleep(Duration::from_secs(5))]);
    let url = mock.start().await;

    let client = GatewayClient::new(
        GatewayConfig::new(url)
            .with_response_timeout(Duration::from_secs(1))
            .with_idle_timeout(Duration::from_millis(400)),
    );
    let mut stream = client.stream_message("hi").await.unwrap();

    let mut last = None;
    while let Some(event) = stream.next_event().await {
        last = Some(event);
    }
    match last {
        Some(StreamEvent::Error { message }) => assert!(message.contains("Timed out")),
        other => panic!("expected timeout error, got {:?}", other),
    }
    assert_eq!(stream.state(), RunState::Failed);
}

#[tokio::test]
async fn test_stream_setup_errors_are_returned() {
    let mut mock = MockGateway::new(|_| Vec::new());
    mock.auth_error = Some("bad token");
    let url = mock.start().await;

    let err = client(url).stream_message("hi").await.unwrap_err();
    assert_eq!(err, NetError::AuthRejected("bad token".to_string()));
}

#[tokio::test]
async fn test_same_memory_id_reuses_session_key() {
    let mock = MockGateway::new(|run_id| vec![Step::Send(final_event(run_id, &["ok"]))]);
    let url = mock.start().await;
    let client = client(url);

    let first = client
        .send_message(ChatRequest::new("one").memory_id("m1"))
        .await
        .unwrap();
    let second = client
        .send_message(ChatRequest::new("two").memory_id("m1"))
        .await
        .unwrap();
    assert_eq!(first.session_key, second.session_key);
    assert_ne!(first.run_id, second.run_id);

    let third = client.send_message("three").await.unwrap();
    let fourth = client.send_message("four").await.unwrap();
    assert_eq!(third.session_key.as_str(), "agent:main:ns-default");
    assert_eq!(third.session_key, fourth.session_key);

    let keys: Vec<Value> = mock
        .requests()
        .iter()
        .filter(|req| req["method"] == "chat.send")
        .map(|req| req["params"]["sessionKey"].clone())
        .collect();
    assert_eq!(keys.len(), 4);
    assert_eq!(keys[0], keys[1]);
    assert_eq!(keys[2], keys[3]);
}

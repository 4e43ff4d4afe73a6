//! End-to-end tests against a real listener using a WebSocket client.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use herald_core::ids::ExecutionId;
use herald_presign::{Credentials, SigV4Signer};
use herald_relay::{DispatchPolicy, Retention};
use herald_server::{start, ServerConfig, ServerHandle, Services};
use herald_store::{ConnectionRepo, ConnectionStore, Database, ResultRepo};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    handle: ServerHandle,
    db: Database,
    token: CancellationToken,
    http: reqwest::Client,
}

impl TestServer {
    async fn boot(services: impl FnOnce(Database) -> Services) -> Self {
        let db = Database::in_memory().unwrap();
        let token = CancellationToken::new();
        let handle = start(ServerConfig::default(), services(db.clone()), token.clone())
            .await
            .unwrap();
        Self {
            handle,
            db,
            token,
            http: reqwest::Client::new(),
        }
    }

    async fn with_defaults() -> Self {
        Self::boot(Services::new).await
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.handle.addr)
    }

    fn ws_url(&self, query: &str) -> String {
        format!("ws://{}/ws{query}", self.handle.addr)
    }

    fn seed_result(&self, exec: &str, payload: Value) {
        ResultRepo::new(self.db.clone())
            .put(&ExecutionId::from_raw(exec), &payload)
            .unwrap();
    }

    async fn bound_connection(&self, exec: &str) -> Option<String> {
        ConnectionRepo::new(self.db.clone())
            .get(&ExecutionId::from_raw(exec))
            .await
            .unwrap()
            .map(|r| r.connection_id.to_string())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self.http.post(self.url(path)).json(&body).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn dispatch(&self, body: Value) -> (u16, Value) {
        self.post("/dispatch", body).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Next text frame, skipping control frames.
async fn next_text(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket ended")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn connect_and_register(server: &TestServer, exec: &str) -> WsStream {
    let (mut ws, _) = connect_async(server.ws_url("")).await.unwrap();
    ws.send(Message::Text(json!({ "executionArn": exec }).to_string().into()))
        .await
        .unwrap();
    let reply = next_text(&mut ws).await;
    assert_eq!(reply, json!({"statusCode": 200, "body": "Connected"}));
    ws
}

async fn wait_until_unbound(server: &TestServer, exec: &str) {
    timeout(TIMEOUT, async {
        while server.bound_connection(exec).await.is_some() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("connection record was not removed");
}

#[tokio::test]
async fn health_reports_open_sockets() {
    let server = TestServer::with_defaults().await;
    let body: Value = reqwest::get(server.url("/health")).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 0);
    assert_eq!(body["registered"], 0);

    let _idle = connect_async(server.ws_url("")).await.unwrap();
    let _ws = connect_and_register(&server, "exec-1").await;
    let body: Value = reqwest::get(server.url("/health")).await.unwrap().json().await.unwrap();
    assert_eq!(body["connections"], 2);
    assert_eq!(body["registered"], 1);
}

#[tokio::test]
async fn result_is_pushed_then_not_after_disconnect() {
    let server = TestServer::with_defaults().await;
    server.seed_result("exec-1", json!({"status": "done", "count": 42.0}));

    let mut ws = connect_and_register(&server, "exec-1").await;
    let conn = server.bound_connection("exec-1").await.unwrap();
    assert!(conn.starts_with("conn_"));

    let (status, body) = server.dispatch(json!({"executionArn": "exec-1"})).await;
    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!({"result_item": {"status": "done", "count": 42}, "sent_item": true})
    );

    let pushed = next_text(&mut ws).await;
    assert_eq!(pushed, json!({"status": "done", "count": 42}));

    ws.close(None).await.unwrap();
    wait_until_unbound(&server, "exec-1").await;

    let (status, body) = server.dispatch(json!({"executionArn": "exec-1"})).await;
    assert_eq!(status, 200);
    assert_eq!(body["sent_item"], false);
    assert_eq!(body["result_item"], json!({"status": "done", "count": 42}));
}

#[tokio::test]
async fn override_message_skips_result_lookup() {
    let server = TestServer::with_defaults().await;
    let mut ws = connect_and_register(&server, "exec-2").await;

    let (status, body) = server
        .dispatch(json!({"executionArn": "exec-2", "msgOverride": "still running"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["sent_item"], true);
    assert_eq!(next_text(&mut ws).await, json!({"message": "still running"}));
}

#[tokio::test]
async fn query_parameter_registers_on_upgrade() {
    let server = TestServer::with_defaults().await;
    let (mut ws, _) = connect_async(server.ws_url("?executionArn=exec-q")).await.unwrap();
    assert_eq!(next_text(&mut ws).await["statusCode"], 200);
    assert!(server.bound_connection("exec-q").await.is_some());
}

#[tokio::test]
async fn reconnect_rebinds_and_old_close_keeps_new_binding() {
    let server = TestServer::with_defaults().await;
    let old = connect_and_register(&server, "exec-3").await;
    let first = server.bound_connection("exec-3").await.unwrap();

    let mut new = connect_and_register(&server, "exec-3").await;
    let second = server.bound_connection("exec-3").await.unwrap();
    assert_ne!(first, second);

    drop(old);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.bound_connection("exec-3").await, Some(second));

    let (_, body) = server
        .dispatch(json!({"executionArn": "exec-3", "msgOverride": "hello"}))
        .await;
    assert_eq!(body["sent_item"], true);
    assert_eq!(next_text(&mut new).await, json!({"message": "hello"}));
}

#[tokio::test]
async fn socket_switching_executions_leaves_no_stale_record() {
    let server = TestServer::with_defaults().await;
    let mut ws = connect_and_register(&server, "exec-5").await;
    let conn = server.bound_connection("exec-5").await.unwrap();

    ws.send(Message::Text(json!({ "executionArn": "exec-6" }).to_string().into()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut ws).await["statusCode"], 200);

    assert_eq!(server.bound_connection("exec-5").await, None);
    assert_eq!(server.bound_connection("exec-6").await, Some(conn));

    let (_, body) = server
        .dispatch(json!({"executionArn": "exec-5", "msgOverride": "late"}))
        .await;
    assert_eq!(body["sent_item"], false);

    ws.close(None).await.unwrap();
    wait_until_unbound(&server, "exec-6").await;
    assert_eq!(server.bound_connection("exec-5").await, None);
}

#[tokio::test]
async fn malformed_connect_frame_gets_500_reply() {
    let server = TestServer::with_defaults().await;
    let (mut ws, _) = connect_async(server.ws_url("")).await.unwrap();
    ws.send(Message::Text("{}".into())).await.unwrap();
    let reply = next_text(&mut ws).await;
    assert_eq!(reply["statusCode"], 500);
    assert!(reply["body"].as_str().unwrap().contains("executionArn"));
}

#[tokio::test]
async fn dispatch_error_statuses() {
    let server = TestServer::with_defaults().await;

    let (status, body) = server.dispatch(json!({"executionArn": "exec-none"})).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "no_available_results");

    let (status, body) = server.dispatch(json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "validation");

    let resp = server
        .http
        .post(server.url("/dispatch"))
        .header("content-type", "application/json")
        .body("{nope")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn consume_policy_removes_record_after_push() {
    let server = TestServer::boot(|db| {
        Services::new(db).with_policy(DispatchPolicy {
            retention: Retention::ConsumeOnDelivery,
            purge_stale_on_gone: false,
        })
    })
    .await;
    let mut ws = connect_and_register(&server, "exec-4").await;

    let (_, body) = server
        .dispatch(json!({"executionArn": "exec-4", "msgOverride": "done"}))
        .await;
    assert_eq!(body["sent_item"], true);
    let _ = next_text(&mut ws).await;
    assert_eq!(server.bound_connection("exec-4").await, None);
}

#[tokio::test]
async fn presign_without_credentials_is_unavailable() {
    let server = TestServer::with_defaults().await;
    let (status, body) = server
        .post("/presign", json!({"inputUri": "https://s3.amazonaws.com/media/a.wav"}))
        .await;
    assert_eq!(status, 503);
    assert_eq!(body["error"]["code"], "missing_credentials");
}

#[tokio::test]
async fn presign_returns_signed_link() {
    let server = TestServer::boot(|db| {
        let signer = SigV4Signer::new(
            "eu-west-1",
            Credentials {
                access_key_id: "AKID".into(),
                secret_access_key: "secret".into(),
                session_token: None,
            },
        );
        Services::new(db).with_presigner(Arc::new(signer), 900)
    })
    .await;

    let (status, body) = server
        .post(
            "/presign",
            json!({"inputUri": "https://s3.amazonaws.com/media/calls/a.wav", "link_expiry": 60}),
        )
        .await;
    assert_eq!(status, 200);
    let link = body["signed_s3_link"].as_str().unwrap();
    assert!(link.starts_with("https://media.s3.eu-west-1.amazonaws.com/calls/a.wav?"));
    assert!(link.contains("X-Amz-Expires=60"));

    let (status, body) = server.post("/presign", json!({"link_expiry": 60})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "invalid_input_uri");
}

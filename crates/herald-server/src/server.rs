use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use herald_core::events::{ConnectEvent, DisconnectEvent, DispatchEvent, RequestContext};
use herald_core::ids::ConnectionId;
use herald_core::Transport;
use herald_presign::{LinkSigner, PresignError, PresignEvent, PresignResponse, DEFAULT_EXPIRY_SECS};
use herald_relay::handlers::{self, DispatchResponse};
use herald_relay::{ConnectionRegistry, DispatchPolicy, ResultDispatcher};
use herald_store::{ConnectionRepo, Database, ResultRepo};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::health::{health_check, HealthResponse};
use crate::hub::{self, ConnectionHub, FrameHandler};

/// What the server is wired to, beyond its listener settings.
pub struct Services {
    pub db: Database,
    pub policy: DispatchPolicy,
    pub presigner: Option<Arc<dyn LinkSigner>>,
    pub default_expiry_secs: u64,
}

impl Services {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            policy: DispatchPolicy::default(),
            presigner: None,
            default_expiry_secs: DEFAULT_EXPIRY_SECS,
        }
    }

    pub fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_presigner(
        mut self,
        presigner: Arc<dyn LinkSigner>,
        default_expiry_secs: u64,
    ) -> Self {
        self.presigner = Some(presigner);
        self.default_expiry_secs = default_expiry_secs;
        self
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<ResultDispatcher>,
    pub hub: Arc<ConnectionHub>,
    pub records: Arc<ConnectionRepo>,
    pub presigner: Option<Arc<dyn LinkSigner>>,
    pub default_expiry_secs: u64,
    pub heartbeat: Duration,
    pub start_time: Instant,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: &ServerConfig, services: Services, shutdown: CancellationToken) -> Self {
        let connections = Arc::new(ConnectionRepo::new(services.db.clone()));
        let results = Arc::new(ResultRepo::new(services.db));
        let hub = Arc::new(ConnectionHub::new(config.max_send_queue, config.client_timeout()));

        let registry = Arc::new(ConnectionRegistry::new(connections.clone()));
        let records = Arc::clone(&connections);
        let transport: Arc<dyn Transport> = hub.clone();
        let dispatcher = Arc::new(
            ResultDispatcher::new(connections, results, transport).with_policy(services.policy),
        );

        Self {
            registry,
            dispatcher,
            hub,
            records,
            presigner: services.presigner,
            default_expiry_secs: services.default_expiry_secs,
            heartbeat: config.heartbeat_interval(),
            start_time: Instant::now(),
            shutdown,
        }
    }
}

/// Treats every text frame as a connect body.
struct ConnectFrames {
    registry: Arc<ConnectionRegistry>,
}

#[async_trait]
impl FrameHandler for ConnectFrames {
    async fn on_text(&self, connection_id: &ConnectionId, text: String) -> Option<String> {
        let event = ConnectEvent {
            body: Some(text),
            request_context: Some(RequestContext::for_connection(connection_id)),
        };
        let resp = handlers::connect(&self.registry, &event).await;
        match serde_json::to_string(&resp) {
            Ok(json) => Some(json),
            Err(e) => {
                error!(error = %e, "failed to encode connect response");
                None
            }
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/dispatch", post(dispatch_handler))
        .route("/presign", post(presign_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind, spawn the listener and the dead-socket sweep, and return.
///
/// Everything stops when `shutdown` is cancelled.
pub async fn start(
    config: ServerConfig,
    services: Services,
    shutdown: CancellationToken,
) -> Result<ServerHandle, std::io::Error> {
    let db_path = services.db.path().display().to_string();
    let state = AppState::new(&config, services, shutdown.clone());

    let sweep_registry = Arc::clone(&state.registry);
    let sweep = hub::start_sweep_task(
        Arc::clone(&state.hub),
        config.sweep_interval(),
        shutdown.clone(),
        move |connection_id| {
            let registry = Arc::clone(&sweep_registry);
            async move { run_disconnect(&registry, &connection_id).await }
        },
    );

    let router = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let addr = listener.local_addr()?;

    info!(
        %addr,
        db = %db_path,
        policy = ?state.dispatcher.policy(),
        "herald server started"
    );

    let server = tokio::spawn(async move {
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = served {
            error!(error = %e, "server stopped with error");
        }
    });

    Ok(ServerHandle {
        addr,
        port: addr.port(),
        state,
        server,
        sweep,
    })
}

/// Handle returned by `start()`; keeps background tasks alive.
pub struct ServerHandle {
    pub addr: SocketAddr,
    pub port: u16,
    state: AppState,
    server: JoinHandle<()>,
    sweep: JoinHandle<()>,
}

impl ServerHandle {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The tasks to await during shutdown.
    pub fn into_tasks(self) -> Vec<JoinHandle<()>> {
        vec![self.server, self.sweep]
    }
}

#[derive(Debug, Default, Deserialize)]
struct WsParams {
    #[serde(rename = "executionArn")]
    execution_arn: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.execution_arn))
}

async fn handle_socket(socket: WebSocket, state: AppState, execution_arn: Option<String>) {
    let (connection_id, rx) = state.hub.attach();
    info!(connection_id = %connection_id, "websocket client connected");

    let frames: Arc<dyn FrameHandler> = Arc::new(ConnectFrames {
        registry: Arc::clone(&state.registry),
    });

    if let Some(arn) = execution_arn {
        let body = serde_json::json!({ "executionArn": arn }).to_string();
        if let Some(reply) = frames.on_text(&connection_id, body).await {
            let _ = state.hub.push(&connection_id, reply).await;
        }
    }

    hub::drive_socket(
        socket,
        connection_id.clone(),
        rx,
        Arc::clone(&state.hub),
        frames,
        state.heartbeat,
        state.shutdown.clone(),
    )
    .await;

    let _ = state.hub.detach(&connection_id);
    info!(connection_id = %connection_id, "websocket client disconnected");
    run_disconnect(&state.registry, &connection_id).await;
}

async fn run_disconnect(registry: &ConnectionRegistry, connection_id: &ConnectionId) {
    let event = DisconnectEvent {
        request_context: Some(RequestContext::for_connection(connection_id)),
    };
    if let Err(e) = handlers::disconnect(registry, &event).await {
        error!(
            connection_id = %connection_id,
            kind = e.error_kind(),
            error = %e,
            "disconnect failed"
        );
    }
}

async fn dispatch_handler(
    State(state): State<AppState>,
    payload: Result<Json<DispatchEvent>, JsonRejection>,
) -> Result<Json<DispatchResponse>, ApiError> {
    let Json(event) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let resp = handlers::dispatch(&state.dispatcher, &event).await?;
    Ok(Json(resp))
}

async fn presign_handler(
    State(state): State<AppState>,
    payload: Result<Json<PresignEvent>, JsonRejection>,
) -> Result<Json<PresignResponse>, ApiError> {
    let Json(event) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let signer = state.presigner.as_deref().ok_or(PresignError::MissingCredentials)?;
    let resp = herald_presign::presign(signer, &event, state.default_expiry_secs)?;
    Ok(Json(resp))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registered = match state.records.count() {
        Ok(n) => Some(n),
        Err(e) => {
            error!(error = %e, "health check could not count connection records");
            None
        }
    };
    Json(health_check(state.start_time, state.hub.count(), registered))
}

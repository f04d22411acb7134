//! Serves a page realm over HTTP so a driver in another process can reach it.
//!
//! Every `/api` route requires the server's access token in the `X-Session-Token` header. The
//! bridge's own session credentials travel inside the messages as usual.

use crate::{
    dispatcher::PageDispatcher, error::BridgeError, realm::Window, session::SessionCredentials,
    transport::PageTransport,
};
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
};
use eyre::{Result, WrapErr};
use headless_wallet::security::random_hex;
use headless_wallet_config::Config;
use parking_lot::Mutex;
use std::{net::SocketAddr, sync::Arc};
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use url::Url;

/// Header carrying the server access token.
pub const SESSION_TOKEN_HEADER: &str = "X-Session-Token";

#[derive(Debug)]
struct ServerState {
    token: String,
    window: Arc<Window>,
    config: Config,
}

/// HTTP front of one [`Window`].
#[derive(Debug)]
pub struct PageServer {
    state: Arc<ServerState>,
    addr: Option<SocketAddr>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PageServer {
    pub fn new(window: Arc<Window>, config: Config) -> Self {
        Self {
            state: Arc::new(ServerState { token: random_hex(32), window, config }),
            addr: None,
            shutdown: None,
            task: None,
        }
    }

    /// The token clients must send in [`SESSION_TOKEN_HEADER`].
    pub fn token(&self) -> &str {
        &self.state.token
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.state.window
    }

    /// Port the server listens on, `None` until started.
    pub fn port(&self) -> Option<u16> {
        self.addr.map(|addr| addr.port())
    }

    /// Base url of the server, `None` until started.
    pub fn url(&self) -> Option<Url> {
        self.addr.and_then(|addr| Url::parse(&format!("http://{addr}")).ok())
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Binds `127.0.0.1:port` and starts serving. Port `0` picks a free port.
    pub async fn start(&mut self, port: u16) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .wrap_err_with(|| format!("failed to bind port {port}"))?;
        let addr = listener.local_addr()?;
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let router = build_router(Arc::clone(&self.state));

        self.task = Some(tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                shutdown_rx.await.ok();
            });
            if let Err(err) = server.await {
                error!(target: "bridge::server", %err, "page server failed");
            }
        }));
        self.addr = Some(addr);
        self.shutdown = Some(shutdown);
        debug!(target: "bridge::server", %addr, "page server listening");
        Ok(())
    }

    /// Stops serving and waits for in flight requests.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            task.await.wrap_err("page server task panicked")?;
        }
        self.addr = None;
        Ok(())
    }
}

fn build_router(state: Arc<ServerState>) -> Router {
    let api = Router::new()
        .route("/inject", post(inject))
        .route("/message", post(message))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session_token))
        .with_state(state);

    Router::new().nest("/api", api)
}

async fn require_session_token(
    State(state): State<Arc<ServerState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let ok = req
        .headers()
        .get(SESSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == state.token);

    if !ok {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(req).await)
}

async fn inject(
    State(state): State<Arc<ServerState>>,
    Json(credentials): Json<SessionCredentials>,
) -> StatusCode {
    let dispatcher =
        PageDispatcher::new(credentials, &state.config.security, state.config.wallet.clone());
    state.window.set_bridge(Some(Arc::new(dispatcher)));
    StatusCode::NO_CONTENT
}

async fn message(State(state): State<Arc<ServerState>>, body: String) -> Response {
    let Some(dispatcher) = state.window.wallet_mock_bridge() else {
        return (StatusCode::CONFLICT, "bridge not injected").into_response();
    };
    match dispatcher.handle(&state.window, &body) {
        Some(response) => Json(response).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Reaches a [`PageServer`] over HTTP.
///
/// Replies come back in the response body of each post and are queued for the bridge.
#[derive(Debug)]
pub struct HttpPageTransport {
    client: reqwest::Client,
    base: Url,
    token: String,
    page_id: String,
    context_id: String,
    reply_tx: mpsc::UnboundedSender<String>,
    replies: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl HttpPageTransport {
    pub fn new(
        base: Url,
        token: impl Into<String>,
        page_id: impl Into<String>,
        context_id: impl Into<String>,
    ) -> Self {
        let (reply_tx, replies) = mpsc::unbounded_channel();
        Self {
            client: reqwest::Client::new(),
            base,
            token: token.into(),
            page_id: page_id.into(),
            context_id: context_id.into(),
            reply_tx,
            replies: Mutex::new(Some(replies)),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, BridgeError> {
        self.base.join(path).map_err(BridgeError::transport)
    }
}

#[async_trait]
impl PageTransport for HttpPageTransport {
    fn page_id(&self) -> &str {
        &self.page_id
    }

    fn context_id(&self) -> &str {
        &self.context_id
    }

    async fn inject(&self, credentials: &SessionCredentials) -> Result<(), BridgeError> {
        self.client
            .post(self.endpoint("api/inject")?)
            .header(SESSION_TOKEN_HEADER, &self.token)
            .json(credentials)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(BridgeError::transport)?;
        Ok(())
    }

    async fn post(&self, message: String) -> Result<(), BridgeError> {
        let response = self
            .client
            .post(self.endpoint("api/message")?)
            .header(SESSION_TOKEN_HEADER, &self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(message)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(BridgeError::transport)?;
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(());
        }
        let reply = response.text().await.map_err(BridgeError::transport)?;
        self.reply_tx.send(reply).map_err(BridgeError::transport)
    }

    fn take_replies(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.replies.lock().take()
    }
}

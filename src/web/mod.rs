use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use once_cell::sync::OnceCell;
use salvo::prelude::*;
use tracing::{debug, info, warn};

use crate::bridge::{DispatchDecision, MessageCreated, OutboundDispatcher};
use crate::config::Config;

const TOKEN_HEADER: &str = "X-Bridge-Token";

#[derive(Clone)]
pub struct WebState {
    pub dispatcher: Arc<OutboundDispatcher>,
    pub webhook_secret: String,
    pub started_at: Instant,
}

static WEB_STATE: OnceCell<WebState> = OnceCell::new();

pub fn web_state() -> &'static WebState {
    WEB_STATE
        .get()
        .expect("web state is not initialized before handler execution")
}

#[derive(Clone)]
pub struct WebServer {
    config: Arc<Config>,
}

impl WebServer {
    pub fn new(config: Arc<Config>, dispatcher: Arc<OutboundDispatcher>) -> Result<Self> {
        let _ = WEB_STATE.set(WebState {
            dispatcher,
            webhook_secret: config.web.webhook_secret.clone(),
            started_at: Instant::now(),
        });

        Ok(Self { config })
    }

    pub async fn start(&self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.config.web.bind_address, self.config.web.port);
        info!("starting web server on {}", bind_addr);

        let acceptor = TcpListener::new(bind_addr).bind().await;
        Server::new(acceptor).serve(create_router()).await;

        Ok(())
    }
}

pub fn create_router() -> Router {
    Router::new()
        .push(Router::with_path("health").get(health))
        .push(
            Router::with_path("bridge/message-created")
                .hoop(require_webhook_token)
                .post(message_created),
        )
}

#[handler]
async fn health(res: &mut Response) {
    let uptime = web_state().started_at.elapsed().as_secs();
    res.render(Json(serde_json::json!({ "status": "ok", "uptime_secs": uptime })));
}

#[handler]
async fn require_webhook_token(req: &mut Request, res: &mut Response, ctrl: &mut FlowCtrl) {
    let expected = &web_state().webhook_secret;
    let provided = req
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if expected.is_empty() || provided != expected {
        warn!("webhook request rejected: missing or invalid {}", TOKEN_HEADER);
        res.status_code(StatusCode::UNAUTHORIZED);
        ctrl.skip_rest();
    }
}

#[handler]
async fn message_created(req: &mut Request, res: &mut Response) {
    let notification = match req.parse_json::<MessageCreated>().await {
        Ok(notification) => notification,
        Err(e) => {
            debug!("rejecting malformed message-created payload: {}", e);
            res.status_code(StatusCode::BAD_REQUEST);
            return;
        }
    };

    let decision = web_state().dispatcher.handle_message_created(&notification);
    let label = match decision {
        DispatchDecision::Enqueued => "enqueued",
        DispatchDecision::Disabled => "disabled",
        DispatchDecision::Unmapped => "unmapped",
        DispatchDecision::EchoSuppressed => "echo_suppressed",
        DispatchDecision::QueueClosed => "queue_closed",
    };
    res.render(Json(serde_json::json!({ "result": label })));
}

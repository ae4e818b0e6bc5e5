// Fake backend server for integration tests, grounded in the teacher's
// `tests/support/upstream.rs` pattern: a small axum app bound to an
// ephemeral port, torn down via a oneshot channel.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

struct Behavior {
    fail_models: AtomicBool,
    fail_completions: AtomicBool,
    hits: AtomicUsize,
}

#[derive(Clone)]
pub struct FakeBackend {
    addr: String,
    behavior: Arc<Behavior>,
    handle: Arc<JoinHandle<()>>,
    shutdown: Arc<tokio::sync::Mutex<Option<tokio::sync::oneshot::Sender<()>>>>,
}

impl FakeBackend {
    /// Starts a backend that always answers requests successfully.
    pub async fn start_healthy() -> Self {
        Self::start(false).await
    }

    /// Starts a backend whose connections are refused outright (nothing is
    /// bound), modeling a `PreResponseFailure`.
    pub fn unreachable_url() -> String {
        "http://127.0.0.1:1".to_string()
    }

    async fn start(fail_models: bool) -> Self {
        let behavior = Arc::new(Behavior {
            fail_models: AtomicBool::new(fail_models),
            fail_completions: AtomicBool::new(false),
            hits: AtomicUsize::new(0),
        });

        let router = Router::new()
            .route("/v1/models", get(models_handler))
            .route("/v1/chat/completions", post(completions_handler))
            .route("/v1/completions", post(completions_handler))
            .with_state(behavior.clone());

        // Bind on the host's own routable address rather than loopback: C1's
        // SSRF guard rejects 127.0.0.1, so a fake backend reachable only on
        // loopback can never be registered through the admin endpoint.
        let bind_ip = outbound_ip();
        let listener = TcpListener::bind((bind_ip, 0)).await.expect("bind fake backend");
        let addr = listener.local_addr().expect("local addr");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(async move {
            let server = axum::serve(listener, router);
            tokio::select! {
                _ = server => {},
                _ = shutdown_rx => {},
            }
        });

        Self {
            addr: format!("http://{addr}"),
            behavior,
            handle: Arc::new(handle),
            shutdown: Arc::new(tokio::sync::Mutex::new(Some(shutdown_tx))),
        }
    }

    pub fn url(&self) -> &str {
        &self.addr
    }

    pub fn set_fail_completions(&self, fail: bool) {
        self.behavior.fail_completions.store(fail, Ordering::SeqCst);
    }

    pub fn hits(&self) -> usize {
        self.behavior.hits.load(Ordering::SeqCst)
    }

    pub async fn close(self) {
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Discovers the machine's own non-loopback IPv4 address via the
/// connect-a-UDP-socket trick: no packet is actually sent, so this works
/// without real network access, but the resulting local address is the one
/// the routing table would use for that destination.
fn outbound_ip() -> std::net::Ipv4Addr {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").expect("bind probe socket");
    socket.connect("8.8.8.8:80").expect("set default destination");
    match socket.local_addr().expect("local addr").ip() {
        std::net::IpAddr::V4(ip) => ip,
        std::net::IpAddr::V6(_) => std::net::Ipv4Addr::LOCALHOST,
    }
}

async fn models_handler(State(behavior): State<Arc<Behavior>>) -> impl IntoResponse {
    behavior.hits.fetch_add(1, Ordering::SeqCst);
    if behavior.fail_models.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "down"})));
    }
    (StatusCode::OK, Json(json!({"data": []})))
}

async fn completions_handler(State(behavior): State<Arc<Behavior>>) -> impl IntoResponse {
    behavior.hits.fetch_add(1, Ordering::SeqCst);
    if behavior.fail_completions.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "boom"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "hi"}, "finish_reason": "stop"}]
        })),
    )
}

// Integration test harness, grounded in the teacher's `tests/support/{cache,harness}.rs`
// pattern: seed a throwaway SQLite file, boot a real `App` on an ephemeral
// port, and drive it with `reqwest`.

pub mod upstream;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use inference_gateway::app::App;
use inference_gateway::config::Config;
use inference_gateway::registry::{ServerRecord, SqliteStore};
use inference_gateway::shutdown::GracefulShutdown;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use upstream::FakeBackend;

static SEQ: AtomicU64 = AtomicU64::new(0);

pub const ADMIN_API_KEY: &str = "integration-test-admin-key";

/// Picks a free TCP port by binding then immediately dropping a listener.
/// Accepts the small re-bind race inherent to this pattern; it's the
/// standard way to get an ephemeral port for a server started out-of-process
/// from the listener itself.
async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

pub struct TestGateway {
    pub base_url: String,
    shutdown_token: CancellationToken,
}

impl TestGateway {
    /// Boots a gateway with `seed` already present in its registry, as if
    /// each record had been inserted before the process started.
    pub async fn start(seed: Vec<ServerRecord>) -> Self {
        Self::start_with_max_failures(seed, 3).await
    }

    /// Same as `start`, but with `MAX_CONSECUTIVE_FAILURES` overridden —
    /// used by the auto-deregistration scenario to keep the wait short.
    pub async fn start_with_max_failures(seed: Vec<ServerRecord>, max_consecutive_failures: u32) -> Self {
        let id = SEQ.fetch_add(1, Ordering::SeqCst);
        let db_path = std::env::temp_dir().join(format!("inference-gateway-test-{}-{id}.db", std::process::id()));
        let db_path = db_path.to_string_lossy().to_string();

        if !seed.is_empty() {
            let store = SqliteStore::open(&db_path).expect("open seed store");
            for record in &seed {
                store.upsert(record).await.expect("seed record");
            }
        }

        let port = free_port().await;
        let cfg = Config::from_env(move |key| match key {
            "ADMIN_API_KEY" => Some(ADMIN_API_KEY.to_string()),
            "HOST" => Some("127.0.0.1".to_string()),
            "PORT" => Some(port.to_string()),
            "DATABASE_URL" => Some(db_path.clone()),
            "HEALTH_CHECK_INTERVAL_SECONDS" => Some("10".to_string()),
            "HEALTH_CHECK_TIMEOUT_SECONDS" => Some("1".to_string()),
            "MAX_CONSECUTIVE_FAILURES" => Some(max_consecutive_failures.to_string()),
            _ => None,
        })
        .expect("valid test config");

        let shutdown_token = CancellationToken::new();
        let app = std::sync::Arc::new(App::new(shutdown_token.clone(), cfg).await.expect("build app"));

        let gsh = std::sync::Arc::new(GracefulShutdown::new(shutdown_token.clone()));
        gsh.add(1);
        app.serve(gsh).await.expect("start serving");

        let base_url = format!("http://127.0.0.1:{port}");
        wait_ready(&format!("{base_url}/health")).await;

        Self { base_url, shutdown_token }
    }

    pub async fn stop(self) {
        self.shutdown_token.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn wait_ready(url: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if let Ok(resp) = reqwest::get(url).await {
            if resp.status().is_success() || resp.status().is_server_error() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("gateway at {url} never became ready");
}

/// Builds a healthy, active `ServerRecord` for `model_name` pointing at
/// `endpoint_url`, as `POST /admin/register` would have produced it.
pub fn healthy_record(model_name: &str, endpoint_url: &str) -> ServerRecord {
    use inference_gateway::registry::{now_unix, Capabilities, HealthStatus, Owner};

    let now = now_unix();
    ServerRecord {
        registration_id: inference_gateway::registry::id::generate(),
        model_name: model_name.to_string(),
        endpoint_url: endpoint_url.to_string(),
        backend_api_key: None,
        capabilities: Capabilities::default(),
        owner: Owner::default(),
        registered_at: now,
        last_checked_at: Some(now),
        last_latency_ms: Some(5),
        health_status: HealthStatus::Healthy,
        consecutive_failures: 0,
        is_active: true,
        updated_at: now,
    }
}

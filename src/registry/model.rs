//! The `ServerRecord` data model — the sole persisted entity (spec.md §3).

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque, globally unique registration id: `srv_` + 16 hex chars.
pub type RegistrationId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "healthy" => Some(HealthStatus::Healthy),
            "unhealthy" => Some(HealthStatus::Unhealthy),
            "unknown" => Some(HealthStatus::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub max_tokens: Option<i64>,
    pub context_length: Option<i64>,
    #[serde(default)]
    pub streaming: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Owner {
    pub student_id: Option<String>,
    pub description: Option<String>,
    pub email: Option<String>,
}

/// The sole persisted entity. See spec.md §3 for the field-by-field
/// contract and invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub registration_id: RegistrationId,
    pub model_name: String,
    pub endpoint_url: String,
    pub backend_api_key: Option<String>,
    pub capabilities: Capabilities,
    pub owner: Owner,
    pub registered_at: i64,
    pub last_checked_at: Option<i64>,
    pub last_latency_ms: Option<i64>,
    pub health_status: HealthStatus,
    pub consecutive_failures: u32,
    pub is_active: bool,
    pub updated_at: i64,
}

/// Returns the current Unix timestamp in seconds.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Partial update applied via `patch`. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct Patch {
    pub model_name: Option<String>,
    pub endpoint_url: Option<String>,
    pub backend_api_key: Option<Option<String>>,
    pub capabilities: Option<Capabilities>,
    pub owner: Option<Owner>,
    pub last_checked_at: Option<Option<i64>>,
    pub last_latency_ms: Option<Option<i64>>,
    pub health_status: Option<HealthStatus>,
    pub consecutive_failures: Option<u32>,
    pub is_active: Option<bool>,
}

impl Patch {
    pub fn apply(&self, record: &mut ServerRecord) {
        if let Some(v) = &self.model_name {
            record.model_name = v.clone();
        }
        if let Some(v) = &self.endpoint_url {
            record.endpoint_url = v.clone();
        }
        if let Some(v) = &self.backend_api_key {
            record.backend_api_key = v.clone();
        }
        if let Some(v) = &self.capabilities {
            record.capabilities = v.clone();
        }
        if let Some(v) = &self.owner {
            record.owner = v.clone();
        }
        if let Some(v) = self.last_checked_at {
            record.last_checked_at = v;
        }
        if let Some(v) = self.last_latency_ms {
            record.last_latency_ms = v;
        }
        if let Some(v) = self.health_status {
            record.health_status = v;
        }
        if let Some(v) = self.consecutive_failures {
            record.consecutive_failures = v;
        }
        if let Some(v) = self.is_active {
            record.is_active = v;
        }
        record.updated_at = now_unix();
    }
}

/// Normalizes a URL for the `(model_name, endpoint_url)` active-record
/// uniqueness check: lowercases scheme+host, strips default ports and
/// trailing slashes.
pub fn normalize_url(raw: &str) -> String {
    let Ok(url) = url::Url::parse(raw) else {
        return raw.to_ascii_lowercase();
    };
    let scheme = url.scheme().to_ascii_lowercase();
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let default_port = match scheme.as_str() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    };
    let port = url.port().filter(|p| Some(*p) != default_port);
    let mut normalized = format!("{scheme}://{host}");
    if let Some(p) = port {
        normalized.push_str(&format!(":{p}"));
    }
    let path = url.path().trim_end_matches('/');
    normalized.push_str(path);
    if let Some(q) = url.query() {
        normalized.push('?');
        normalized.push_str(q);
    }
    normalized
}

//! C5 Selector — round-robin choice of a healthy backend for a model.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::errors::GatewayError;
use crate::registry::{ListFilter, Registry, ServerRecord};

/// Per-model round-robin cursors. A model with no traffic yet has no entry;
/// the first selection for it starts at index 0.
pub struct Selector {
    cursors: DashMap<String, AtomicUsize>,
}

impl Selector {
    pub fn new() -> Self {
        Self { cursors: DashMap::new() }
    }

    /// Picks the next healthy backend for `model_name` in round-robin order,
    /// skipping any registration id in `exclude` (used by C7's failover loop
    /// to avoid retrying a backend that already failed this request).
    pub fn select(
        &self,
        registry: &dyn Registry,
        model_name: &str,
        exclude: &HashSet<String>,
    ) -> Result<ServerRecord, GatewayError> {
        let candidates = registry.find_healthy(model_name);
        if candidates.is_empty() {
            return if registry.model_known(model_name) {
                Err(GatewayError::NoHealthyServer(model_name.to_string()))
            } else {
                Err(GatewayError::ModelNotFound {
                    model: model_name.to_string(),
                    available: available_models(registry),
                })
            };
        }

        let eligible: Vec<&ServerRecord> = candidates
            .iter()
            .filter(|r| !exclude.contains(&r.registration_id))
            .collect();
        if eligible.is_empty() {
            return Err(GatewayError::NoHealthyServer(model_name.to_string()));
        }

        let cursor = self
            .cursors
            .entry(model_name.to_string())
            .or_insert_with(|| AtomicUsize::new(0));
        let idx = cursor.fetch_add(1, Ordering::Relaxed) % eligible.len();
        Ok(eligible[idx].clone())
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::new()
    }
}

/// Distinct, sorted model names currently backed by at least one active
/// registration, for the `ModelNotFound` error's actionable hint.
fn available_models(registry: &dyn Registry) -> String {
    let mut names: Vec<String> = registry
        .list(&ListFilter::default())
        .into_iter()
        .map(|r| r.model_name)
        .collect();
    names.sort();
    names.dedup();
    names.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Capabilities, HealthStatus, InMemoryRegistry, Owner, SqliteStore};
    use std::sync::Arc;

    async fn registry_with(records: Vec<ServerRecord>) -> Arc<InMemoryRegistry> {
        let store = Arc::new(SqliteStore::open(":memory:").unwrap());
        let reg = InMemoryRegistry::new(store).await.unwrap();
        for r in records {
            reg.insert(r).await.unwrap();
        }
        reg
    }

    fn healthy(id: &str, model: &str, registered_at: i64) -> ServerRecord {
        ServerRecord {
            registration_id: id.to_string(),
            model_name: model.to_string(),
            endpoint_url: format!("https://{id}.example.com"),
            backend_api_key: None,
            capabilities: Capabilities::default(),
            owner: Owner::default(),
            registered_at,
            last_checked_at: None,
            last_latency_ms: None,
            health_status: HealthStatus::Healthy,
            consecutive_failures: 0,
            is_active: true,
            updated_at: registered_at,
        }
    }

    #[tokio::test]
    async fn rotates_across_candidates() {
        let reg = registry_with(vec![healthy("srv_a", "m1", 1), healthy("srv_b", "m1", 2)]).await;
        let selector = Selector::new();
        let empty = HashSet::new();
        let first = selector.select(reg.as_ref(), "m1", &empty).unwrap();
        let second = selector.select(reg.as_ref(), "m1", &empty).unwrap();
        let third = selector.select(reg.as_ref(), "m1", &empty).unwrap();
        assert_ne!(first.registration_id, second.registration_id);
        assert_eq!(first.registration_id, third.registration_id);
    }

    #[tokio::test]
    async fn unknown_model_yields_model_not_found() {
        let reg = registry_with(vec![]).await;
        let selector = Selector::new();
        let err = selector.select(reg.as_ref(), "ghost", &HashSet::new()).unwrap_err();
        matches!(err, GatewayError::ModelNotFound { .. });
    }

    #[tokio::test]
    async fn model_not_found_lists_available_models() {
        let reg = registry_with(vec![healthy("srv_a", "m1", 1), healthy("srv_b", "m2", 2)]).await;
        let selector = Selector::new();
        let err = selector.select(reg.as_ref(), "ghost", &HashSet::new()).unwrap_err();
        match err {
            GatewayError::ModelNotFound { available, .. } => {
                assert_eq!(available, "m1, m2");
            }
            other => panic!("expected ModelNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn known_but_unhealthy_model_yields_no_healthy_server() {
        let mut rec = healthy("srv_a", "m1", 1);
        rec.health_status = HealthStatus::Unhealthy;
        let reg = registry_with(vec![rec]).await;
        let selector = Selector::new();
        let err = selector.select(reg.as_ref(), "m1", &HashSet::new()).unwrap_err();
        matches!(err, GatewayError::NoHealthyServer(_));
    }

    #[tokio::test]
    async fn exclude_set_is_honored() {
        let reg = registry_with(vec![healthy("srv_a", "m1", 1)]).await;
        let selector = Selector::new();
        let mut exclude = HashSet::new();
        exclude.insert("srv_a".to_string());
        let err = selector.select(reg.as_ref(), "m1", &exclude).unwrap_err();
        matches!(err, GatewayError::NoHealthyServer(_));
    }
}

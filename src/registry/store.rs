//! Registry Store (C2) — persistent mapping from registration id to server
//! record, with query indices. See spec.md §4.2 for the full contract.

use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::errors::GatewayError;

use super::model::{now_unix, normalize_url, HealthStatus, Patch, RegistrationId, ServerRecord};
use super::sqlite::SqliteStore;

/// Filter accepted by `list`.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub model_name: Option<String>,
    pub health_status: Option<HealthStatus>,
    pub include_inactive: bool,
}

/// Aggregate counts for the admin surface.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub total_servers: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub models: usize,
}

#[async_trait::async_trait]
pub trait Registry: Send + Sync {
    async fn insert(&self, record: ServerRecord) -> Result<(), GatewayError>;
    fn get(&self, id: &str) -> Result<ServerRecord, GatewayError>;
    async fn patch(&self, id: &str, patch: Patch) -> Result<ServerRecord, GatewayError>;
    async fn soft_delete(&self, id: &str) -> Result<(), GatewayError>;
    fn list(&self, filter: &ListFilter) -> Vec<ServerRecord>;
    fn find_healthy(&self, model_name: &str) -> Vec<ServerRecord>;
    fn count_servers(&self) -> usize;
    fn count_models(&self) -> usize;
    fn stats(&self) -> Stats;
    /// Whether any active record (regardless of health) exists for a model —
    /// used by C7 to distinguish `ModelNotFound` from `NoHealthyServer`.
    fn model_known(&self, model_name: &str) -> bool;
}

/// In-memory registry backed by a sharded concurrent map, write-through to
/// SQLite so state survives process restart (spec.md §6 persisted layout).
pub struct InMemoryRegistry {
    records: DashMap<RegistrationId, ServerRecord>,
    // Serializes operations that must observe a consistent view across
    // multiple records (uniqueness checks on insert/patch).
    write_lock: Mutex<()>,
    persistence: Arc<SqliteStore>,
}

impl InMemoryRegistry {
    pub async fn new(persistence: Arc<SqliteStore>) -> Result<Arc<Self>> {
        let existing = persistence.load_all().await?;
        let records = DashMap::new();
        for record in existing {
            records.insert(record.registration_id.clone(), record);
        }
        Ok(Arc::new(Self {
            records,
            write_lock: Mutex::new(()),
            persistence,
        }))
    }

    fn active_conflict(&self, model_name: &str, endpoint_url: &str, exclude_id: Option<&str>) -> bool {
        let normalized = normalize_url(endpoint_url);
        self.records.iter().any(|entry| {
            let r = entry.value();
            r.is_active
                && r.model_name == model_name
                && normalize_url(&r.endpoint_url) == normalized
                && exclude_id != Some(r.registration_id.as_str())
        })
    }
}

#[async_trait::async_trait]
impl Registry for InMemoryRegistry {
    async fn insert(&self, record: ServerRecord) -> Result<(), GatewayError> {
        let _guard = self.write_lock.lock().await;

        if self.records.contains_key(&record.registration_id) {
            return Err(GatewayError::Conflict(
                "registration_id already exists".to_string(),
            ));
        }
        if self.active_conflict(&record.model_name, &record.endpoint_url, None) {
            return Err(GatewayError::Conflict(
                "a server with this model_name and endpoint_url is already registered".to_string(),
            ));
        }

        self.persistence
            .upsert(&record)
            .await
            .map_err(GatewayError::Internal)?;
        self.records.insert(record.registration_id.clone(), record);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<ServerRecord, GatewayError> {
        self.records
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))
    }

    async fn patch(&self, id: &str, patch: Patch) -> Result<ServerRecord, GatewayError> {
        let _guard = self.write_lock.lock().await;

        let current = self.get(id)?;
        let next_model = patch.model_name.clone().unwrap_or(current.model_name.clone());
        let next_url = patch
            .endpoint_url
            .clone()
            .unwrap_or(current.endpoint_url.clone());
        if (patch.model_name.is_some() || patch.endpoint_url.is_some())
            && self.active_conflict(&next_model, &next_url, Some(id))
        {
            return Err(GatewayError::Conflict(
                "a server with this model_name and endpoint_url is already registered".to_string(),
            ));
        }

        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        patch.apply(&mut entry);
        let updated = entry.clone();
        drop(entry);

        self.persistence
            .upsert(&updated)
            .await
            .map_err(GatewayError::Internal)?;
        Ok(updated)
    }

    async fn soft_delete(&self, id: &str) -> Result<(), GatewayError> {
        let mut entry = match self.records.get_mut(id) {
            Some(e) => e,
            None => return Ok(()), // idempotent: absent is as good as deleted
        };
        entry.is_active = false;
        entry.updated_at = now_unix();
        let updated = entry.clone();
        drop(entry);
        self.persistence
            .upsert(&updated)
            .await
            .map_err(GatewayError::Internal)?;
        Ok(())
    }

    fn list(&self, filter: &ListFilter) -> Vec<ServerRecord> {
        self.records
            .iter()
            .map(|e| e.value().clone())
            .filter(|r| filter.include_inactive || r.is_active)
            .filter(|r| filter.model_name.as_deref().map_or(true, |m| r.model_name == m))
            .filter(|r| filter.health_status.map_or(true, |h| r.health_status == h))
            .collect()
    }

    fn find_healthy(&self, model_name: &str) -> Vec<ServerRecord> {
        let mut matches: Vec<ServerRecord> = self
            .records
            .iter()
            .map(|e| e.value().clone())
            .filter(|r| {
                r.is_active && r.model_name == model_name && r.health_status == HealthStatus::Healthy
            })
            .collect();
        matches.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.registration_id.cmp(&b.registration_id))
        });
        matches
    }

    fn count_servers(&self) -> usize {
        self.records.iter().filter(|e| e.value().is_active).count()
    }

    fn count_models(&self) -> usize {
        let mut names: Vec<String> = self
            .records
            .iter()
            .filter(|e| e.value().is_active)
            .map(|e| e.value().model_name.clone())
            .collect();
        names.sort();
        names.dedup();
        names.len()
    }

    fn stats(&self) -> Stats {
        let mut stats = Stats::default();
        for entry in self.records.iter() {
            let r = entry.value();
            if !r.is_active {
                continue;
            }
            match r.health_status {
                HealthStatus::Healthy => stats.healthy += 1,
                HealthStatus::Unhealthy => stats.unhealthy += 1,
                HealthStatus::Unknown => stats.unknown += 1,
            }
        }
        stats.total_servers = self.count_servers();
        stats.models = self.count_models();
        stats
    }

    fn model_known(&self, model_name: &str) -> bool {
        self.records
            .iter()
            .any(|e| e.value().is_active && e.value().model_name == model_name)
    }
}

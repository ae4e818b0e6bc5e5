//! Persistence for `model_servers`, the single table backing the registry
//! (spec.md §6). A single initialization step creates the schema and its
//! indexes; no migrations are specified.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use super::model::{Capabilities, HealthStatus, Owner, ServerRecord};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(database_url: &str) -> Result<Self> {
        if database_url != ":memory:" {
            if let Some(parent) = Path::new(database_url).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).ok();
                }
            }
        }
        let conn = Connection::open(database_url)
            .with_context(|| format!("failed to open database at {database_url}"))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS model_servers (
                registration_id TEXT PRIMARY KEY,
                model_name TEXT NOT NULL,
                endpoint_url TEXT NOT NULL,
                backend_api_key TEXT,
                capabilities_json TEXT NOT NULL,
                owner_json TEXT NOT NULL,
                registered_at INTEGER NOT NULL,
                last_checked_at INTEGER,
                last_latency_ms INTEGER,
                health_status TEXT NOT NULL,
                consecutive_failures INTEGER NOT NULL,
                is_active INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_model_servers_model_name ON model_servers(model_name);
            CREATE INDEX IF NOT EXISTS idx_model_servers_health_status ON model_servers(health_status);
            CREATE INDEX IF NOT EXISTS idx_model_servers_is_active ON model_servers(is_active);",
        )
        .context("failed to initialize model_servers schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub async fn load_all(&self) -> Result<Vec<ServerRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT registration_id, model_name, endpoint_url, backend_api_key, capabilities_json, owner_json, registered_at, last_checked_at, last_latency_ms, health_status, consecutive_failures, is_active, updated_at FROM model_servers")?;
        let rows = stmt.query_map([], row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub async fn upsert(&self, record: &ServerRecord) -> Result<()> {
        let capabilities_json = serde_json::to_string(&record.capabilities)?;
        let owner_json = serde_json::to_string(&record.owner)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO model_servers (
                registration_id, model_name, endpoint_url, backend_api_key,
                capabilities_json, owner_json, registered_at, last_checked_at,
                last_latency_ms, health_status, consecutive_failures, is_active, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(registration_id) DO UPDATE SET
                model_name = excluded.model_name,
                endpoint_url = excluded.endpoint_url,
                backend_api_key = excluded.backend_api_key,
                capabilities_json = excluded.capabilities_json,
                owner_json = excluded.owner_json,
                last_checked_at = excluded.last_checked_at,
                last_latency_ms = excluded.last_latency_ms,
                health_status = excluded.health_status,
                consecutive_failures = excluded.consecutive_failures,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at",
            params![
                record.registration_id,
                record.model_name,
                record.endpoint_url,
                record.backend_api_key,
                capabilities_json,
                owner_json,
                record.registered_at,
                record.last_checked_at,
                record.last_latency_ms,
                record.health_status.as_str(),
                record.consecutive_failures,
                record.is_active,
                record.updated_at,
            ],
        )?;
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ServerRecord> {
    let capabilities_json: String = row.get(4)?;
    let owner_json: String = row.get(5)?;
    let health_status: String = row.get(9)?;
    Ok(ServerRecord {
        registration_id: row.get(0)?,
        model_name: row.get(1)?,
        endpoint_url: row.get(2)?,
        backend_api_key: row.get(3)?,
        capabilities: serde_json::from_str::<Capabilities>(&capabilities_json).unwrap_or_default(),
        owner: serde_json::from_str::<Owner>(&owner_json).unwrap_or_default(),
        registered_at: row.get(6)?,
        last_checked_at: row.get(7)?,
        last_latency_ms: row.get(8)?,
        health_status: HealthStatus::parse(&health_status).unwrap_or(HealthStatus::Unknown),
        consecutive_failures: row.get(10)?,
        is_active: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> ServerRecord {
        ServerRecord {
            registration_id: id.to_string(),
            model_name: "m1".to_string(),
            endpoint_url: "https://example.com".to_string(),
            backend_api_key: None,
            capabilities: Capabilities::default(),
            owner: Owner::default(),
            registered_at: 1000,
            last_checked_at: None,
            last_latency_ms: None,
            health_status: HealthStatus::Unknown,
            consecutive_failures: 0,
            is_active: true,
            updated_at: 1000,
        }
    }

    #[tokio::test]
    async fn round_trips_records() {
        let store = SqliteStore::open(":memory:").unwrap();
        store.upsert(&sample("srv_aaaa")).await.unwrap();
        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].registration_id, "srv_aaaa");
    }

    #[tokio::test]
    async fn upsert_overwrites_existing() {
        let store = SqliteStore::open(":memory:").unwrap();
        store.upsert(&sample("srv_aaaa")).await.unwrap();
        let mut updated = sample("srv_aaaa");
        updated.consecutive_failures = 5;
        store.upsert(&updated).await.unwrap();
        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].consecutive_failures, 5);
    }
}

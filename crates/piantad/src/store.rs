//! Persistence for plants, chat turns, readings and decision audits.
//!
//! Schema:
//! - plants: canonical name/type/personality/birth date and thresholds (JSON)
//! - messages: chat turns, read back newest first
//! - readings: telemetry ingested from devices
//! - decisions: sanitized decision-audit records

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pianta_shared::ingest::ValidatedReading;
use pianta_shared::sanitize::sanitize_text;
use pianta_shared::{DecisionAudit, PiantaError, StoredTurn, TelemetryReading, Thresholds};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Canonical plant row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlantRecord {
    pub id: String,
    pub name: Option<String>,
    pub plant_type: Option<String>,
    pub personality: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub thresholds: Option<Thresholds>,
}

impl PlantRecord {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            plant_type: None,
            personality: None,
            created_at: None,
            thresholds: None,
        }
    }
}

/// Id and timestamp of a stored reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertedReading {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Store Trait
// ============================================================================

#[async_trait]
pub trait PlantStore: Send + Sync {
    async fn plant(&self, plant_id: &str) -> Result<Option<PlantRecord>, PiantaError>;

    async fn upsert_plant(&self, plant: &PlantRecord) -> Result<(), PiantaError>;

    /// Most recent turns, newest first.
    async fn recent_turns(&self, plant_id: &str, limit: usize) -> Result<Vec<StoredTurn>, PiantaError>;

    /// Most recent readings, newest first.
    async fn recent_readings(&self, plant_id: &str, limit: usize) -> Result<Vec<TelemetryReading>, PiantaError>;

    async fn insert_reading(&self, reading: &ValidatedReading) -> Result<InsertedReading, PiantaError>;

    /// Both turns (sanitized) and the audit record, atomically.
    async fn record_exchange(
        &self,
        plant_id: &str,
        user_message: &str,
        reply: &str,
        audit: &DecisionAudit,
    ) -> Result<(), PiantaError>;
}

fn store_err(e: impl std::fmt::Display) -> PiantaError {
    PiantaError::Store(e.to_string())
}

// ============================================================================
// SQLite Store (Production)
// ============================================================================

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self::from_connection(conn)?;
        info!("Opened store at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PiantaError> {
        self.conn
            .lock()
            .map_err(|_| PiantaError::Store("connection lock poisoned".into()))
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS plants (
            id TEXT PRIMARY KEY,
            name TEXT,
            plant_type TEXT,
            personality TEXT,
            created_at TEXT,
            thresholds TEXT
        );

        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            plant_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_plant ON messages(plant_id, id);

        CREATE TABLE IF NOT EXISTS readings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            plant_id TEXT NOT NULL,
            moisture REAL NOT NULL,
            lux REAL NOT NULL,
            temperature REAL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_readings_plant ON readings(plant_id, created_at);

        CREATE TABLE IF NOT EXISTS decisions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            plant_id TEXT NOT NULL,
            confidence REAL NOT NULL,
            needs_follow_up INTEGER NOT NULL,
            follow_up_due_at TEXT,
            audit TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

#[async_trait]
impl PlantStore for SqliteStore {
    async fn plant(&self, plant_id: &str) -> Result<Option<PlantRecord>, PiantaError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, plant_type, personality, created_at, thresholds FROM plants WHERE id = ?1",
            params![plant_id],
            |row| {
                let thresholds: Option<String> = row.get(5)?;
                Ok(PlantRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    plant_type: row.get(2)?,
                    personality: row.get(3)?,
                    created_at: row.get(4)?,
                    thresholds: thresholds.and_then(|t| serde_json::from_str(&t).ok()),
                })
            },
        )
        .optional()
        .map_err(store_err)
    }

    async fn upsert_plant(&self, plant: &PlantRecord) -> Result<(), PiantaError> {
        let thresholds = plant
            .thresholds
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO plants (id, name, plant_type, personality, created_at, thresholds)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                plant_type = excluded.plant_type,
                personality = excluded.personality,
                created_at = excluded.created_at,
                thresholds = excluded.thresholds",
            params![
                plant.id,
                plant.name,
                plant.plant_type,
                plant.personality,
                plant.created_at,
                thresholds
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn recent_turns(&self, plant_id: &str, limit: usize) -> Result<Vec<StoredTurn>, PiantaError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT role, content FROM messages WHERE plant_id = ?1 ORDER BY id DESC LIMIT ?2")
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![plant_id, limit as i64], |row| {
                Ok(StoredTurn::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(store_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(store_err)
    }

    async fn recent_readings(&self, plant_id: &str, limit: usize) -> Result<Vec<TelemetryReading>, PiantaError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT moisture, lux, temperature, created_at FROM readings
                 WHERE plant_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![plant_id, limit as i64], |row| {
                Ok(TelemetryReading {
                    moisture: row.get(0)?,
                    lux: row.get(1)?,
                    temperature: row.get(2)?,
                    captured_at: row.get(3)?,
                })
            })
            .map_err(store_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(store_err)
    }

    async fn insert_reading(&self, reading: &ValidatedReading) -> Result<InsertedReading, PiantaError> {
        let created_at = reading.created_at.unwrap_or_else(Utc::now);
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO readings (plant_id, moisture, lux, temperature, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                reading.plant_id,
                reading.moisture,
                reading.lux,
                reading.temperature,
                created_at
            ],
        )
        .map_err(store_err)?;
        let id = conn.last_insert_rowid();
        debug!("stored reading {} for plant {}", id, reading.plant_id);
        Ok(InsertedReading { id, created_at })
    }

    async fn record_exchange(
        &self,
        plant_id: &str,
        user_message: &str,
        reply: &str,
        audit: &DecisionAudit,
    ) -> Result<(), PiantaError> {
        let audit_json = audit.to_json()?.to_string();
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(store_err)?;
        for (role, content) in [("user", user_message), ("assistant", reply)] {
            tx.execute(
                "INSERT INTO messages (plant_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![plant_id, role, sanitize_text(content), audit.created_at],
            )
            .map_err(store_err)?;
        }
        tx.execute(
            "INSERT INTO decisions (plant_id, confidence, needs_follow_up, follow_up_due_at, audit, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                plant_id,
                audit.decision.confidence,
                audit.decision.needs_follow_up,
                audit.decision.follow_up_due_at,
                audit_json,
                audit.created_at
            ],
        )
        .map_err(store_err)?;
        tx.commit().map_err(store_err)?;
        Ok(())
    }
}

// ============================================================================
// Memory Store (Testing)
// ============================================================================

#[derive(Default)]
struct MemoryTables {
    plants: Vec<PlantRecord>,
    messages: Vec<(String, StoredTurn)>,
    readings: Vec<(String, TelemetryReading)>,
    decisions: Vec<(String, serde_json::Value)>,
}

/// In-memory store with the same ordering rules as `SqliteStore`.
#[derive(Default, Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<MemoryTables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryTables>, PiantaError> {
        self.tables
            .lock()
            .map_err(|_| PiantaError::Store("memory store lock poisoned".into()))
    }

    /// Audit records written so far, oldest first.
    pub fn decisions(&self) -> Vec<serde_json::Value> {
        self.lock()
            .map(|t| t.decisions.iter().map(|(_, d)| d.clone()).collect())
            .unwrap_or_default()
    }

    pub fn message_count(&self) -> usize {
        self.lock().map(|t| t.messages.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PlantStore for MemoryStore {
    async fn plant(&self, plant_id: &str) -> Result<Option<PlantRecord>, PiantaError> {
        Ok(self.lock()?.plants.iter().find(|p| p.id == plant_id).cloned())
    }

    async fn upsert_plant(&self, plant: &PlantRecord) -> Result<(), PiantaError> {
        let mut t = self.lock()?;
        t.plants.retain(|p| p.id != plant.id);
        t.plants.push(plant.clone());
        Ok(())
    }

    async fn recent_turns(&self, plant_id: &str, limit: usize) -> Result<Vec<StoredTurn>, PiantaError> {
        let t = self.lock()?;
        Ok(t.messages
            .iter()
            .rev()
            .filter(|(id, _)| id == plant_id)
            .take(limit)
            .map(|(_, turn)| turn.clone())
            .collect())
    }

    async fn recent_readings(&self, plant_id: &str, limit: usize) -> Result<Vec<TelemetryReading>, PiantaError> {
        let t = self.lock()?;
        let mut readings: Vec<TelemetryReading> = t
            .readings
            .iter()
            .filter(|(id, _)| id == plant_id)
            .map(|(_, r)| r.clone())
            .collect();
        // newest first; stable sort keeps later inserts ahead on ties
        readings.reverse();
        readings.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        readings.truncate(limit);
        Ok(readings)
    }

    async fn insert_reading(&self, reading: &ValidatedReading) -> Result<InsertedReading, PiantaError> {
        let created_at = reading.created_at.unwrap_or_else(Utc::now);
        let mut t = self.lock()?;
        let mut stored = reading.to_reading();
        stored.captured_at = Some(created_at);
        t.readings.push((reading.plant_id.clone(), stored));
        Ok(InsertedReading {
            id: t.readings.len() as i64,
            created_at,
        })
    }

    async fn record_exchange(
        &self,
        plant_id: &str,
        user_message: &str,
        reply: &str,
        audit: &DecisionAudit,
    ) -> Result<(), PiantaError> {
        let audit_json = audit.to_json()?;
        let mut t = self.lock()?;
        t.messages
            .push((plant_id.to_string(), StoredTurn::new("user", sanitize_text(user_message))));
        t.messages
            .push((plant_id.to_string(), StoredTurn::new("assistant", sanitize_text(reply))));
        t.decisions.push((plant_id.to_string(), audit_json));
        Ok(())
    }
}

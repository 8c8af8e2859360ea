//! SQLite record store for instances and monitoring items

use crate::models::*;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

/// Instance records, one per instance name
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Create in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS instances (
                name TEXT PRIMARY KEY,
                plan TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS endpoints (
                instance_name TEXT NOT NULL,
                position INTEGER NOT NULL,
                host TEXT NOT NULL,
                port INTEGER NOT NULL,
                container_id TEXT NOT NULL,
                PRIMARY KEY (instance_name, position),
                FOREIGN KEY (instance_name) REFERENCES instances(name) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS health_checks (
                host TEXT NOT NULL,
                port INTEGER NOT NULL,
                item_id TEXT NOT NULL,
                trigger_id TEXT NOT NULL,
                PRIMARY KEY (host, port)
            );

            CREATE INDEX IF NOT EXISTS idx_endpoints_host ON endpoints(host);
            "#,
        )?;
        Ok(())
    }

    // ===== Instances =====

    pub fn add_instance(&self, instance: &Instance) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO instances (name, plan, created_at) VALUES (?1, ?2, ?3)",
            params![
                instance.name,
                instance.plan.as_str(),
                instance.created_at.to_rfc3339(),
            ],
        )?;
        for (position, endpoint) in instance.endpoints.iter().enumerate() {
            tx.execute(
                r#"INSERT INTO endpoints (instance_name, position, host, port, container_id)
                   VALUES (?1, ?2, ?3, ?4, ?5)"#,
                params![
                    instance.name,
                    position as i64,
                    endpoint.host,
                    endpoint.port,
                    endpoint.container_id,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn find_instance_by_name(&self, name: &str) -> Result<Option<Instance>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT name, plan, created_at FROM instances WHERE name = ?1",
                params![name],
                Self::row_to_header,
            )
            .optional()?;

        match row {
            Some(header) => Ok(Some(Self::load_instance(&conn, header)?)),
            None => Ok(None),
        }
    }

    /// Instances with at least one endpoint on `host`
    pub fn find_instances_by_host(&self, host: &str) -> Result<Vec<Instance>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"SELECT name, plan, created_at FROM instances
               WHERE name IN (SELECT instance_name FROM endpoints WHERE host = ?1)
               ORDER BY name"#,
        )?;
        let headers = stmt
            .query_map(params![host], Self::row_to_header)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        headers
            .into_iter()
            .map(|header| Self::load_instance(&conn, header))
            .collect()
    }

    pub fn list_instances(&self) -> Result<Vec<Instance>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name, plan, created_at FROM instances ORDER BY name")?;
        let headers = stmt
            .query_map([], Self::row_to_header)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        headers
            .into_iter()
            .map(|header| Self::load_instance(&conn, header))
            .collect()
    }

    pub fn remove_instance(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM instances WHERE name = ?1", params![name])?;
        Ok(rows > 0)
    }

    fn row_to_header(row: &rusqlite::Row) -> rusqlite::Result<(String, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    }

    fn load_instance(conn: &Connection, header: (String, String, String)) -> Result<Instance> {
        let (name, plan, created_at) = header;
        let mut stmt = conn.prepare(
            "SELECT host, port, container_id FROM endpoints WHERE instance_name = ?1 ORDER BY position",
        )?;
        let endpoints = stmt
            .query_map(params![name], |row| {
                Ok(Endpoint {
                    host: row.get(0)?,
                    port: row.get(1)?,
                    container_id: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Instance {
            plan: plan.parse()?,
            created_at: parse_timestamp(&created_at)?,
            name,
            endpoints,
        })
    }

    // ===== Health check items =====

    pub fn add_health_check_item(&self, item: &HealthCheckItem) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"INSERT OR REPLACE INTO health_checks (host, port, item_id, trigger_id)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![item.host, item.port, item.item_id, item.trigger_id],
        )?;
        Ok(())
    }

    pub fn find_health_check_item(&self, host: &str, port: u16) -> Result<Option<HealthCheckItem>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT host, port, item_id, trigger_id FROM health_checks WHERE host = ?1 AND port = ?2",
            params![host, port],
            |row| {
                Ok(HealthCheckItem {
                    host: row.get(0)?,
                    port: row.get(1)?,
                    item_id: row.get(2)?,
                    trigger_id: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn remove_health_check_item(&self, host: &str, port: u16) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "DELETE FROM health_checks WHERE host = ?1 AND port = ?2",
            params![host, port],
        )?;
        Ok(rows > 0)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("invalid timestamp '{}': {}", raw, e)))
}

//! SQLite-backed storage for the per-state pipes of one fetch cycle.
//!
//! Registered pipes live in `pipes` (keys plus JSON parameters); synced rows
//! live in `pipe_rows`, one JSON object per row in insertion order.
//!
//! The inherent methods block. The [`PipeInstance`] impl runs each of them on
//! tokio's blocking pool.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    error::HostError,
    handler::{HandlerKeys, HandlerPipe},
    host::{PipeInstance, RawRow},
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS pipes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    connector TEXT NOT NULL,
    metric TEXT NOT NULL,
    location TEXT NOT NULL,
    parameters TEXT NOT NULL,
    UNIQUE (connector, metric, location)
);
CREATE TABLE IF NOT EXISTS pipe_rows (
    pipe_id INTEGER NOT NULL REFERENCES pipes (id),
    position INTEGER NOT NULL,
    row TEXT NOT NULL,
    PRIMARY KEY (pipe_id, position)
);
";

#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredPipe {
    pub id: i64,
    pub keys: HandlerKeys,
    pub parameters: Value,
}

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file and its parent directory.
    pub fn open(path: &Path) -> Result<Self, HostError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, HostError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, HostError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, HostError> {
        self.conn
            .lock()
            .map_err(|_| HostError::Other("sqlite connection lock poisoned".into()))
    }

    pub fn id_for(&self, keys: &HandlerKeys) -> Result<Option<i64>, HostError> {
        let id = self
            .conn()?
            .query_row(
                "SELECT id FROM pipes WHERE connector = ?1 AND metric = ?2 AND location = ?3",
                params![keys.connector, keys.metric, keys.location],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn parameters_for(&self, keys: &HandlerKeys) -> Result<Option<Value>, HostError> {
        let parameters = self
            .conn()?
            .query_row(
                "SELECT parameters FROM pipes WHERE connector = ?1 AND metric = ?2 AND location = ?3",
                params![keys.connector, keys.metric, keys.location],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        match parameters {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    /// Inserts the pipe, or replaces its parameters if the keys already exist.
    pub fn register(&self, keys: &HandlerKeys, parameters: &Value) -> Result<i64, HostError> {
        let parameters = serde_json::to_string(parameters)?;
        let id = self.conn()?.query_row(
            "INSERT INTO pipes (connector, metric, location, parameters) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (connector, metric, location) DO UPDATE SET parameters = excluded.parameters
             RETURNING id",
            params![keys.connector, keys.metric, keys.location, parameters],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Registered pipes whose keys match the filters. An empty filter matches anything.
    pub fn pipes_matching(
        &self,
        connectors: &[String],
        metrics: &[String],
        locations: &[String],
    ) -> Result<Vec<RegisteredPipe>, HostError> {
        let conn = self.conn()?;
        let mut statement =
            conn.prepare("SELECT id, connector, metric, location, parameters FROM pipes ORDER BY id")?;
        let rows = statement.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                HandlerKeys {
                    connector: row.get(1)?,
                    metric: row.get(2)?,
                    location: row.get(3)?,
                },
                row.get::<_, String>(4)?,
            ))
        })?;

        let accepts = |filter: &[String], key: &str| filter.is_empty() || filter.iter().any(|f| f == key);
        let mut pipes = Vec::new();
        for row in rows {
            let (id, keys, parameters) = row?;
            if accepts(connectors, &keys.connector)
                && accepts(metrics, &keys.metric)
                && accepts(locations, &keys.location)
            {
                pipes.push(RegisteredPipe {
                    id,
                    keys,
                    parameters: serde_json::from_str(&parameters)?,
                });
            }
        }
        Ok(pipes)
    }

    pub fn replace_rows(&self, pipe_id: i64, rows: &[RawRow]) -> Result<(), HostError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM pipe_rows WHERE pipe_id = ?1", params![pipe_id])?;
        {
            let mut insert = tx.prepare("INSERT INTO pipe_rows (pipe_id, position, row) VALUES (?1, ?2, ?3)")?;
            for (position, row) in rows.iter().enumerate() {
                insert.execute(params![pipe_id, position as i64, serde_json::to_string(row)?])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn rows(&self, pipe_id: i64) -> Result<Vec<RawRow>, HostError> {
        let conn = self.conn()?;
        let mut statement = conn.prepare("SELECT row FROM pipe_rows WHERE pipe_id = ?1 ORDER BY position")?;
        let texts = statement
            .query_map(params![pipe_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        texts
            .iter()
            .map(|text| serde_json::from_str(text).map_err(HostError::from))
            .collect()
    }

    async fn blocking<T, F>(&self, task: F) -> Result<T, HostError>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteStore) -> Result<T, HostError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || task(&store)).await?
    }
}

#[async_trait]
impl PipeInstance for SqliteStore {
    async fn pipe_id(&self, pipe: &HandlerPipe) -> Result<Option<i64>, HostError> {
        let keys = pipe.keys.clone();
        self.blocking(move |store| store.id_for(&keys)).await
    }

    async fn register_pipe(&self, pipe: &HandlerPipe) -> Result<i64, HostError> {
        let keys = pipe.keys.clone();
        let parameters = pipe.parameters();
        let id = self.blocking(move |store| store.register(&keys, &parameters)).await?;
        tracing::debug!("Registered {} with id {id}", pipe.keys);
        Ok(id)
    }

    async fn pipe_parameters(&self, pipe: &HandlerPipe) -> Result<Option<Value>, HostError> {
        let keys = pipe.keys.clone();
        self.blocking(move |store| store.parameters_for(&keys)).await
    }

    async fn edit_pipe(&self, pipe: &HandlerPipe) -> Result<(), HostError> {
        let keys = pipe.keys.clone();
        let parameters = pipe.parameters();
        let id = self.blocking(move |store| store.register(&keys, &parameters)).await?;
        tracing::debug!("Updated parameters of {} (id {id})", pipe.keys);
        Ok(())
    }

    async fn get_data(&self, pipe: &HandlerPipe) -> Result<Option<Vec<RawRow>>, HostError> {
        let keys = pipe.keys.clone();
        self.blocking(move |store| {
            let Some(id) = store.id_for(&keys)? else {
                return Ok(None);
            };
            let rows = store.rows(id)?;
            Ok(if rows.is_empty() { None } else { Some(rows) })
        })
        .await
    }
}

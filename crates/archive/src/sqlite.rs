//! SQLite-backed archive. Gateway calls run the connection work on tokio's
//! blocking pool; the inspection helpers stay synchronous.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use metrics::{counter, histogram};
use tenancy_core::{GatewayError, GatewayResult};
use tracing::{debug, info};

use crate::{maybe_compress, maybe_decompress, validate_container, ArchiveGateway, ArchiveSession};

/// Versions kept per (container, object key).
const KEEP_VERSIONS: i64 = 3;

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub container: String,
    pub object_key: String,
    pub content_type: String,
    pub content: Vec<u8>,
    pub session_id: String,
    /// Milliseconds since the epoch.
    pub written_at: i64,
}

pub struct SqliteArchive {
    db: Arc<Mutex<rusqlite::Connection>>,
}

fn lock(db: &Mutex<rusqlite::Connection>) -> GatewayResult<MutexGuard<'_, rusqlite::Connection>> {
    db.lock().map_err(|_| GatewayError::Transport("archive db lock poisoned".into()))
}

fn transport(e: impl std::fmt::Display) -> GatewayError {
    GatewayError::Transport(format!("archive db: {}", e))
}

impl SqliteArchive {
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("TENANCY_ARCHIVE_DB").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let started = Instant::now();
        let db = rusqlite::Connection::open(path).with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", "WAL").ok();
        db.pragma_update(None, "synchronous", "NORMAL").ok();
        db.execute(
            "CREATE TABLE IF NOT EXISTS blobs (
                container    TEXT NOT NULL,
                object_key   TEXT NOT NULL,
                content_type TEXT NOT NULL,
                content      BLOB NOT NULL,
                session_id   TEXT NOT NULL,
                written_at   INTEGER NOT NULL
            )",
            [],
        )
        .context("creating blobs table")?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_blobs_key_ts ON blobs(container, object_key, written_at DESC)",
            [],
        )
        .ok();
        histogram!("archive_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        info!(path = %path, "archive: sqlite store ready");
        Ok(Self { db: Arc::new(Mutex::new(db)) })
    }

    fn conn(&self) -> GatewayResult<MutexGuard<'_, rusqlite::Connection>> {
        lock(&self.db)
    }

    /// Run `f` against the connection off the async workers.
    async fn blocking<T, F>(&self, f: F) -> GatewayResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> GatewayResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = lock(&db)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| GatewayError::Transport(format!("archive db task: {}", e)))?
    }

    /// Most recent version of an object, if any.
    pub fn read_latest(&self, container: &str, object_key: &str) -> GatewayResult<Option<StoredBlob>> {
        let db = self.conn()?;
        let mut stmt = db
            .prepare(
                "SELECT content_type, content, session_id, written_at FROM blobs
                 WHERE container = ?1 AND object_key = ?2
                 ORDER BY written_at DESC, rowid DESC LIMIT 1",
            )
            .map_err(transport)?;
        let mut rows = stmt.query((container, object_key)).map_err(transport)?;
        match rows.next().map_err(transport)? {
            Some(row) => {
                let content: Vec<u8> = row.get(1).map_err(transport)?;
                Ok(Some(StoredBlob {
                    container: container.to_string(),
                    object_key: object_key.to_string(),
                    content_type: row.get(0).map_err(transport)?,
                    content: maybe_decompress(&content),
                    session_id: row.get(2).map_err(transport)?,
                    written_at: row.get(3).map_err(transport)?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Number of stored versions of an object.
    pub fn versions(&self, container: &str, object_key: &str) -> GatewayResult<usize> {
        let db = self.conn()?;
        let n: i64 = db
            .query_row(
                "SELECT COUNT(*) FROM blobs WHERE container = ?1 AND object_key = ?2",
                (container, object_key),
                |r| r.get(0),
            )
            .map_err(transport)?;
        Ok(n as usize)
    }
}

#[async_trait::async_trait]
impl ArchiveGateway for SqliteArchive {
    async fn authenticate(&self) -> GatewayResult<ArchiveSession> {
        self.blocking(|db| db.query_row("SELECT 1", [], |r| r.get::<_, i64>(0)).map_err(transport)).await?;
        let session = ArchiveSession::mint();
        debug!(session = %session.id, "archive: session established");
        Ok(session)
    }

    async fn write_blob(
        &self,
        session: &ArchiveSession,
        container: &str,
        object_key: &str,
        content: &[u8],
        content_type: &str,
    ) -> GatewayResult<()> {
        let started = Instant::now();
        session.check()?;
        validate_container(container)?;
        if object_key.is_empty() {
            return Err(GatewayError::Configuration("empty archive object key".into()));
        }
        let row = (
            container.to_string(),
            object_key.to_string(),
            content_type.to_string(),
            maybe_compress(content),
            session.id.to_string(),
        );
        self.blocking(move |db| {
            let (container, object_key, content_type, blob, session_id) = row;
            let tx = db.transaction().map_err(transport)?;
            tx.execute(
                "INSERT INTO blobs(container, object_key, content_type, content, session_id, written_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (&container, &object_key, &content_type, &blob, &session_id, Utc::now().timestamp_millis()),
            )
            .map_err(transport)?;
            tx.execute(
                "DELETE FROM blobs
                 WHERE container = ?1 AND object_key = ?2
                   AND rowid NOT IN (
                       SELECT rowid FROM blobs WHERE container = ?1 AND object_key = ?2
                       ORDER BY written_at DESC, rowid DESC LIMIT ?3
                   )",
                (&container, &object_key, KEEP_VERSIONS),
            )
            .map_err(transport)?;
            tx.commit().map_err(transport)
        })
        .await?;
        histogram!("archive_put_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("archive_put_total", 1u64);
        info!(container = %container, key = %object_key, bytes = content.len(), "archive: blob written");
        Ok(())
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".tenancy");
        let _ = std::fs::create_dir_all(&p);
        p.push("archive.db");
        return p.to_string_lossy().to_string();
    }
    "tenancy-archive.db".to_string()
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokio::sync::Mutex;

use shared::domain::{Session, SessionId};

/// A session as read back from the store, with the revision it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub session: Session,
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { revision: u64 },
    /// The stored revision no longer matches the one the caller read.
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub game_code: Option<String>,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

/// Key-value persistence of session blobs.
///
/// `expected_revision` selects the write mode: `None` overwrites
/// unconditionally, `Some(0)` only creates a missing row, `Some(r)` only
/// replaces a row still at revision `r`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &SessionId) -> Result<Option<StoredSession>>;
    async fn save(
        &self,
        id: &SessionId,
        session: &Session,
        expected_revision: Option<u64>,
    ) -> Result<SaveOutcome>;
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn list_sessions(&self, game_code: Option<&str>) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            "SELECT id, game_code, revision, updated_at
             FROM game_sessions
             WHERE ?1 IS NULL OR game_code = ?1
             ORDER BY updated_at DESC, id ASC",
        )
        .bind(game_code)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| SessionSummary {
                id: SessionId(r.get::<String, _>(0)),
                game_code: r.get::<Option<String>, _>(1),
                revision: r.get::<i64, _>(2).max(0) as u64,
                updated_at: DateTime::from_timestamp(r.get::<i64, _>(3), 0).unwrap_or_default(),
            })
            .collect())
    }

    /// Deletes sessions last written before `cutoff`. Returns the number removed.
    pub async fn delete_stale(
        &self,
        cutoff: DateTime<Utc>,
        game_code: Option<&str>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM game_sessions
             WHERE updated_at < ?1 AND (?2 IS NULL OR game_code = ?2)",
        )
        .bind(cutoff.timestamp())
        .bind(game_code)
        .execute(&self.pool)
        .await
        .context("failed to delete stale sessions")?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionStore for Storage {
    async fn load(&self, id: &SessionId) -> Result<Option<StoredSession>> {
        let row = sqlx::query("SELECT data, revision FROM game_sessions WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let session = Session::from_json(&row.get::<String, _>(0))
            .with_context(|| format!("session {id} holds an unreadable blob"))?;
        Ok(Some(StoredSession {
            session,
            revision: row.get::<i64, _>(1).max(0) as u64,
        }))
    }

    async fn save(
        &self,
        id: &SessionId,
        session: &Session,
        expected_revision: Option<u64>,
    ) -> Result<SaveOutcome> {
        let data = session.to_json()?;
        let now = Utc::now().timestamp();

        let row = match expected_revision {
            None => {
                sqlx::query(
                    "INSERT INTO game_sessions (id, game_code, data, revision, updated_at)
                     VALUES (?1, ?2, ?3, 1, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                         game_code = excluded.game_code,
                         data = excluded.data,
                         revision = game_sessions.revision + 1,
                         updated_at = excluded.updated_at
                     RETURNING revision",
                )
                .bind(id.as_str())
                .bind(session.game_code.as_deref())
                .bind(&data)
                .bind(now)
                .fetch_optional(&self.pool)
                .await?
            }
            Some(0) => {
                sqlx::query(
                    "INSERT INTO game_sessions (id, game_code, data, revision, updated_at)
                     VALUES (?1, ?2, ?3, 1, ?4)
                     ON CONFLICT(id) DO NOTHING
                     RETURNING revision",
                )
                .bind(id.as_str())
                .bind(session.game_code.as_deref())
                .bind(&data)
                .bind(now)
                .fetch_optional(&self.pool)
                .await?
            }
            Some(expected) => {
                sqlx::query(
                    "UPDATE game_sessions
                     SET game_code = ?2, data = ?3, revision = revision + 1, updated_at = ?4
                     WHERE id = ?1 AND revision = ?5
                     RETURNING revision",
                )
                .bind(id.as_str())
                .bind(session.game_code.as_deref())
                .bind(&data)
                .bind(now)
                .bind(i64::try_from(expected).unwrap_or(i64::MAX))
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(match row {
            Some(r) => SaveOutcome::Saved {
                revision: r.get::<i64, _>(0).max(0) as u64,
            },
            None => SaveOutcome::Conflict,
        })
    }
}

#[derive(Debug, Clone)]
struct MemoryRow {
    blob: String,
    revision: u64,
}

/// Process-local store. Blobs are kept serialized so reads go through the
/// same codec as the SQLite store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<SessionId, MemoryRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn raw_blob(&self, id: &SessionId) -> Option<String> {
        self.rows.lock().await.get(id).map(|row| row.blob.clone())
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, id: &SessionId) -> Result<Option<StoredSession>> {
        let rows = self.rows.lock().await;
        let Some(row) = rows.get(id) else {
            return Ok(None);
        };
        let session = Session::from_json(&row.blob)
            .with_context(|| format!("session {id} holds an unreadable blob"))?;
        Ok(Some(StoredSession {
            session,
            revision: row.revision,
        }))
    }

    async fn save(
        &self,
        id: &SessionId,
        session: &Session,
        expected_revision: Option<u64>,
    ) -> Result<SaveOutcome> {
        let blob = session.to_json()?;
        let mut rows = self.rows.lock().await;
        let current = rows.get(id).map(|row| row.revision).unwrap_or(0);

        if let Some(expected) = expected_revision {
            if expected != current {
                return Ok(SaveOutcome::Conflict);
            }
        }

        let revision = current + 1;
        rows.insert(id.clone(), MemoryRow { blob, revision });
        Ok(SaveOutcome::Saved { revision })
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

//! SQLite-backed remote log adapter.
//!
//! # Responsibility
//! - Persist guestbook records for single-host deployments and the CLI.
//! - Run blocking SQLite work off the async executor.
//!
//! # Invariants
//! - `created_at` is strictly greater than every previously stored value,
//!   even when the wall clock steps backwards.
//! - Constraint violations surface as `WriteRejected`; every other SQLite
//!   failure surfaces as `StoreUnavailable`.

use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::model::entry::RemoteId;
use crate::remote::port::{NewRemoteRecord, RemoteError, RemoteLogPort, RemoteRecord, RemoteResult};
use log::{debug, warn};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Remote log persisted in the `guestbook_entries` table.
pub struct SqliteRemoteLog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRemoteLog {
    /// Wraps a connection that already has migrations applied.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Opens (or creates) a database file and applies migrations.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    async fn run<T, F>(&self, op: &'static str, work: F) -> RemoteResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> RemoteResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            work(&mut *guard)
        })
        .await
        .map_err(|err| {
            warn!("event=remote_task module=remote.sqlite status=error op={op} error={err}");
            RemoteError::StoreUnavailable(format!("{op} task did not complete: {err}"))
        })?
    }
}

#[async_trait::async_trait]
impl RemoteLogPort for SqliteRemoteLog {
    async fn insert(&self, record: NewRemoteRecord) -> RemoteResult<RemoteId> {
        self.run("insert", move |conn| {
            let tx = conn.transaction().map_err(map_sqlite_error)?;
            let last: Option<i64> = tx
                .query_row("SELECT MAX(created_at) FROM guestbook_entries;", [], |row| {
                    row.get(0)
                })
                .map_err(map_sqlite_error)?;
            let created_at = next_created_at(now_epoch_ms(), last);
            let remote_id = Uuid::new_v4().to_string();

            tx.execute(
                "INSERT INTO guestbook_entries (id, author, body, secret, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    remote_id.as_str(),
                    record.author.as_str(),
                    record.body.as_str(),
                    record.secret.as_str(),
                    created_at,
                ],
            )
            .map_err(map_sqlite_error)?;
            tx.commit().map_err(map_sqlite_error)?;

            debug!(
                "event=remote_insert module=remote.sqlite status=ok remote_id={remote_id} created_at={created_at}"
            );
            Ok(RemoteId::new(remote_id))
        })
        .await
    }

    async fn list_desc(&self) -> RemoteResult<Vec<RemoteRecord>> {
        self.run("list", |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, author, body, secret, created_at
                     FROM guestbook_entries
                     ORDER BY created_at DESC, rowid DESC;",
                )
                .map_err(map_sqlite_error)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(RemoteRecord {
                        remote_id: RemoteId::new(row.get::<_, String>("id")?),
                        author: row.get("author")?,
                        body: row.get("body")?,
                        secret: row.get("secret")?,
                        created_at: row.get("created_at")?,
                    })
                })
                .map_err(map_sqlite_error)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row.map_err(map_sqlite_error)?);
            }
            Ok(records)
        })
        .await
    }

    async fn delete(&self, remote_id: &RemoteId) -> RemoteResult<()> {
        let remote_id = remote_id.clone();
        self.run("delete", move |conn| {
            let changed = conn
                .execute(
                    "DELETE FROM guestbook_entries WHERE id = ?1;",
                    [remote_id.as_str()],
                )
                .map_err(map_sqlite_error)?;
            if changed == 0 {
                return Err(RemoteError::NotFound(remote_id));
            }
            Ok(())
        })
        .await
    }
}

fn map_sqlite_error(err: rusqlite::Error) -> RemoteError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => RemoteError::WriteRejected(err.to_string()),
        _ => RemoteError::StoreUnavailable(err.to_string()),
    }
}

fn next_created_at(now_ms: i64, last: Option<i64>) -> i64 {
    match last {
        Some(last) if last >= now_ms => last + 1,
        _ => now_ms,
    }
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::{next_created_at, SqliteRemoteLog};
    use crate::model::entry::RemoteId;
    use crate::remote::port::{NewRemoteRecord, RemoteError, RemoteLogPort};

    fn record(author: &str, body: &str) -> NewRemoteRecord {
        NewRemoteRecord {
            author: author.to_string(),
            body: body.to_string(),
            secret: "pw".to_string(),
        }
    }

    #[test]
    fn created_at_never_goes_backwards() {
        assert_eq!(next_created_at(500, None), 500);
        assert_eq!(next_created_at(500, Some(100)), 500);
        assert_eq!(next_created_at(500, Some(500)), 501);
        assert_eq!(next_created_at(500, Some(900)), 901);
    }

    #[tokio::test]
    async fn insert_list_delete_cycle() {
        let log = SqliteRemoteLog::open_in_memory().unwrap();
        let first = log.insert(record("Ann", "Hi")).await.unwrap();
        let second = log.insert(record("Bo", "Yo")).await.unwrap();

        let listed = log.list_desc().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].remote_id, second);
        assert_eq!(listed[1].remote_id, first);
        assert!(listed[0].created_at > listed[1].created_at);
        assert_eq!(listed[1].secret, "pw");

        log.delete(&first).await.unwrap();
        let listed = log.list_desc().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].author, "Bo");
    }

    #[tokio::test]
    async fn blank_author_is_rejected_by_schema() {
        let log = SqliteRemoteLog::open_in_memory().unwrap();
        let err = log.insert(record("   ", "Hi")).await.unwrap_err();
        assert!(matches!(err, RemoteError::WriteRejected(_)), "got {err:?}");
        assert!(log.list_desc().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_missing_record_is_not_found() {
        let log = SqliteRemoteLog::open_in_memory().unwrap();
        let missing = RemoteId::new("missing");
        let err = log.delete(&missing).await.unwrap_err();
        assert_eq!(err, RemoteError::NotFound(missing));
    }
}

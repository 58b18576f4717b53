use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::StoreError;

/// Download state of an episode row, stored as 0 / 1 / -1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Pending,
    Complete,
    Failed,
}

impl DownloadStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Complete => 1,
            Self::Failed => -1,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::Complete,
            -1 => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Insert tuple for a newly observed episode
#[derive(Debug, Clone)]
pub struct EpisodeRecord {
    pub podname: String,
    pub url: String,
    pub title: String,
    pub filesize: u64,
    pub pub_time: DateTime<Utc>,
    pub duration: u64,
    pub add_time: DateTime<Utc>,
}

/// One row of the history table
#[derive(Debug, Clone)]
pub struct EpisodeRow {
    pub id: i64,
    pub podname: String,
    pub url: String,
    pub title: String,
    pub filesize: u64,
    pub pub_time: DateTime<Utc>,
    pub add_time: DateTime<Utc>,
    pub duration: u64,
    pub downloaded: DownloadStatus,
}

/// SQLite-backed episode history.
///
/// The handle is cheap to clone and shared by every worker; the inner
/// mutex is the single writer lock for the whole process. SQLite only
/// serializes writers per connection, so all writes funnel through it.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the store file and switch it to WAL journaling
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
        ",
        )
        .map_err(|e| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    /// Create the history table and its indexes if absent
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY,
                pub_time DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                add_time DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                podname TEXT DEFAULT '',
                filesize INTEGER NOT NULL DEFAULT 0,
                downloaded INTEGER NOT NULL DEFAULT 0,
                title TEXT DEFAULT '',
                url TEXT UNIQUE NOT NULL,
                duration INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_downloaded ON history ( downloaded );
            CREATE INDEX IF NOT EXISTS idx_pub_time ON history ( pub_time );
            CREATE INDEX IF NOT EXISTS idx_add_time ON history ( add_time );
            CREATE INDEX IF NOT EXISTS idx_duration ON history ( duration );
            CREATE INDEX IF NOT EXISTS idx_podname ON history ( podname );
        "#,
        )?;
        debug!("episode store schema is ready");
        Ok(())
    }

    /// Bulk insert, silently skipping rows whose URL is already present
    pub fn insert_if_absent(&self, records: &[EpisodeRecord]) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO history
                 (podname, url, title, filesize, pub_time, add_time, duration)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for record in records {
                stmt.execute(params![
                    record.podname,
                    record.url,
                    record.title,
                    record.filesize as i64,
                    record.pub_time.to_rfc3339(),
                    record.add_time.to_rfc3339(),
                    record.duration as i64,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All rows not yet downloaded, most recent publish time first
    pub fn fetch_pending(&self) -> Result<Vec<EpisodeRow>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, podname, url, title, filesize, pub_time, add_time, duration, downloaded
             FROM history WHERE downloaded = 0 ORDER BY pub_time DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(EpisodeRow {
                    id: row.get(0)?,
                    podname: row.get(1)?,
                    url: row.get(2)?,
                    title: row.get(3)?,
                    filesize: row.get::<_, i64>(4)?.max(0) as u64,
                    pub_time: parse_db_time(&row.get::<_, String>(5)?),
                    add_time: parse_db_time(&row.get::<_, String>(6)?),
                    duration: row.get::<_, i64>(7)?.max(0) as u64,
                    downloaded: DownloadStatus::from_i64(row.get(8)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Update one row's download status, matched by (podname, url)
    pub fn update_status(
        &self,
        podname: &str,
        url: &str,
        status: DownloadStatus,
    ) -> Result<(), StoreError> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE history SET downloaded = ?1 WHERE podname = ?2 AND url = ?3",
            params![status.as_i64(), podname, url],
        )?;
        if changed == 0 {
            debug!(podname, url, "status update matched no rows");
        }
        Ok(())
    }

    /// Download status of the row with the given URL, if any
    pub fn status_of(&self, url: &str) -> Result<Option<DownloadStatus>, StoreError> {
        let conn = self.lock();
        let status = conn
            .query_row(
                "SELECT downloaded FROM history WHERE url = ?1",
                params![url],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .map(DownloadStatus::from_i64);
        Ok(status)
    }

    /// Total number of rows ever recorded
    pub fn episode_count(&self) -> Result<u64, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

/// Timestamps are written as RFC 3339; rows created through the column
/// defaults carry SQLite's `CURRENT_TIMESTAMP` format instead.
fn parse_db_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|naive| naive.and_utc())
        })
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

//! SQLite play history.
//!
//! Pooled connections, one `plays` table keyed by channel.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use radio_core::{HistoryError, HistoryStore};
use radio_types::ChannelId;
use rusqlite::{Connection, params};

#[derive(Clone)]
pub struct HistoryDb {
    pool: Pool<SqliteConnectionManager>,
}

impl HistoryDb {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create history dir {:?}", parent))?;
        }
        Self::from_manager(SqliteConnectionManager::file(db_path))
    }

    #[cfg(test)]
    fn in_memory() -> Result<Self> {
        // One connection, otherwise every pooled connection sees its own database.
        let pool = Pool::builder()
            .max_size(1)
            .build(SqliteConnectionManager::memory())
            .context("create history db pool")?;
        init_pool(pool)
    }

    fn from_manager(manager: SqliteConnectionManager) -> Result<Self> {
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .context("create history db pool")?;
        init_pool(pool)
    }

    fn insert(&self, channel: &str, requester: Option<&str>, title: &str) -> Result<()> {
        let conn = self.pool.get().context("open history db")?;
        conn.execute(
            "INSERT INTO plays (channel_id, requester, title, played_at_ms) VALUES (?1, ?2, ?3, ?4)",
            params![channel, requester, title, now_ms()],
        )
        .context("insert play")?;
        Ok(())
    }

    fn recent_titles(&self, channel: &str, limit: usize) -> Result<Vec<String>> {
        let conn = self.pool.get().context("open history db")?;
        let mut stmt = conn
            .prepare("SELECT title FROM plays WHERE channel_id = ?1 ORDER BY id DESC LIMIT ?2")
            .context("prepare recent plays")?;
        let rows = stmt
            .query_map(params![channel, limit as i64], |row| row.get::<_, String>(0))
            .context("query recent plays")?;
        let mut titles = Vec::new();
        for row in rows {
            titles.push(row.context("read play row")?);
        }
        Ok(titles)
    }

    /// Forget a channel's history so the radio starts fresh.
    pub async fn reset(&self, channel: &ChannelId) -> Result<usize, HistoryError> {
        let channel = channel.as_str().to_string();
        self.blocking(move |db| db.clear_channel(&channel)).await
    }

    fn clear_channel(&self, channel: &str) -> Result<usize> {
        let conn = self.pool.get().context("open history db")?;
        conn.execute("DELETE FROM plays WHERE channel_id = ?1", params![channel])
            .context("clear plays")
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T, HistoryError>
    where
        T: Send + 'static,
        F: FnOnce(HistoryDb) -> Result<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || work(db))
            .await
            .map_err(|err| HistoryError(format!("history task failed: {err}")))?
            .map_err(|err| HistoryError(format!("{err:#}")))
    }
}

fn init_pool(pool: Pool<SqliteConnectionManager>) -> Result<HistoryDb> {
    {
        let conn = pool.get().context("open history db")?;
        init_schema(&conn)?;
    }
    Ok(HistoryDb { pool })
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS plays (
            id INTEGER PRIMARY KEY,
            channel_id TEXT NOT NULL,
            requester TEXT,
            title TEXT NOT NULL,
            played_at_ms INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_plays_channel ON plays(channel_id, id);
        "#,
    )
    .context("create history schema")?;
    Ok(())
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl HistoryStore for HistoryDb {
    async fn recent(&self, channel: &ChannelId, limit: usize) -> Result<Vec<String>, HistoryError> {
        let channel = channel.as_str().to_string();
        self.blocking(move |db| db.recent_titles(&channel, limit))
            .await
    }

    async fn log_play(
        &self,
        channel: &ChannelId,
        requester: Option<&str>,
        title: &str,
    ) -> Result<(), HistoryError> {
        let channel = channel.as_str().to_string();
        let requester = requester.map(str::to_string);
        let title = title.to_string();
        self.blocking(move |db| db.insert(&channel, requester.as_deref(), &title))
            .await
    }
}

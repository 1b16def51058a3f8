use crate::config::Config;
use crate::model::{BookDocument, Highlight};
use crate::store::DocumentStore;
use anyhow::Result;
use async_trait::async_trait;
use libsql::{Builder, Connection, Database as LibsqlDatabase};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

const MIGRATIONS: &[(&str, &str)] = &[("001_schema.sql", include_str!("migrations/001_schema.sql"))];

/// Book documents partitioned by owner. Each book row embeds its highlights
/// through the `highlights` table, ordered by insertion position.
pub struct Database {
    db: LibsqlDatabase,
    conn: Connection,
    tx_lock: Mutex<()>,
    turso_url: Option<String>,
    turso_auth_token: Option<String>,
}

impl Database {
    pub fn is_replica(turso_url: &Option<String>, turso_auth_token: &Option<String>) -> bool {
        turso_url.is_some() && turso_auth_token.is_some()
    }

    pub fn syncs_remotely(&self) -> bool {
        Self::is_replica(&self.turso_url, &self.turso_auth_token)
    }

    pub async fn sync(&self) -> Result<()> {
        if self.syncs_remotely() {
            self.db
                .sync()
                .await
                .map_err(|e| anyhow::anyhow!("sync failed: {}", e))?;
        }
        Ok(())
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = r#"
            INSERT INTO _migrations (name, applied_at)
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        "#;
        conn.execute(query, libsql::params![name]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(cfg.app.get_db());
        let turso_url = cfg.app.turso_url.clone();
        let turso_auth_token = cfg.app.turso_auth_token.clone();

        let db = match (&turso_url, &turso_auth_token) {
            (Some(url), Some(token)) => {
                tracing::info!("[db] running in synced database mode (offline writes)");
                let sync_interval = Duration::from_secs(cfg.app.sync_interval_seconds);
                Builder::new_synced_database(&path, url.clone(), token.clone())
                    .sync_interval(sync_interval)
                    .build()
                    .await?
            }
            _ => Builder::new_local(&path).build().await?,
        };

        Self::setup(db, turso_url, turso_auth_token).await
    }

    pub async fn open_local(path: &Path) -> Result<Self> {
        let db = Builder::new_local(path).build().await?;
        Self::setup(db, None, None).await
    }

    async fn setup(
        db: LibsqlDatabase,
        turso_url: Option<String>,
        turso_auth_token: Option<String>,
    ) -> Result<Self> {
        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;
        conn.execute("PRAGMA foreign_keys = ON", ()).await?;

        for (filename, sql) in SYSTEM_MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        Ok(Database {
            db,
            conn,
            tx_lock: Mutex::new(()),
            turso_url,
            turso_auth_token,
        })
    }

    async fn push_highlight_internal(&self, highlight: &Highlight) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO books (owner_id, id) VALUES (?, ?)",
                libsql::params![highlight.owner_id.as_str(), highlight.book_id.as_str()],
            )
            .await?;

        let insert_highlight = r#"
            INSERT INTO highlights (owner_id, book_id, id, position, text, location, img_url, created_at)
            VALUES (
                ?1, ?2, ?3,
                (SELECT COALESCE(MAX(position) + 1, 0) FROM highlights WHERE owner_id = ?1 AND book_id = ?2),
                ?4, ?5, ?6, ?7
            )
        "#;

        self.conn
            .execute(
                insert_highlight,
                libsql::params![
                    highlight.owner_id.as_str(),
                    highlight.book_id.as_str(),
                    highlight.id.as_str(),
                    highlight.text.as_str(),
                    highlight.location.as_str(),
                    highlight.img_url.clone(),
                    highlight.created_at.as_str()
                ],
            )
            .await?;

        Ok(())
    }

    fn row_to_highlight(row: &libsql::Row) -> Result<Highlight> {
        Ok(Highlight {
            owner_id: row.get(0)?,
            book_id: row.get(1)?,
            id: row.get(2)?,
            text: row.get(3)?,
            location: row.get(4)?,
            img_url: row.get::<Option<String>>(5)?,
            created_at: row.get(6)?,
        })
    }
}

#[async_trait]
impl DocumentStore for Database {
    async fn find_book(&self, owner_id: &str, book_id: &str) -> Result<Option<BookDocument>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM books WHERE owner_id = ? AND id = ?",
                libsql::params![owner_id, book_id],
            )
            .await?;

        if rows.next().await?.is_none() {
            return Ok(None);
        }

        let query = r#"
            SELECT owner_id, book_id, id, text, location, img_url, created_at
            FROM highlights
            WHERE owner_id = ? AND book_id = ?
            ORDER BY position ASC
        "#;

        let mut rows = self.conn.query(query, libsql::params![owner_id, book_id]).await?;
        let mut highlights = Vec::new();

        while let Some(row) = rows.next().await? {
            highlights.push(Self::row_to_highlight(&row)?);
        }

        Ok(Some(BookDocument {
            id: book_id.to_string(),
            owner_id: owner_id.to_string(),
            highlights,
        }))
    }

    async fn set_image_url(
        &self,
        owner_id: &str,
        book_id: &str,
        highlight_id: &str,
        img_url: Option<&str>,
    ) -> Result<bool> {
        let query = r#"
            UPDATE highlights SET img_url = ?
            WHERE owner_id = ? AND book_id = ? AND id = ?
        "#;

        let updated = self
            .conn
            .execute(
                query,
                libsql::params![img_url.map(str::to_string), owner_id, book_id, highlight_id],
            )
            .await?;

        Ok(updated > 0)
    }

    async fn push_highlight(&self, highlight: &Highlight) -> Result<()> {
        let _guard = self.tx_lock.lock().await;

        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        match self.push_highlight_internal(highlight).await {
            Ok(()) => {
                self.conn.execute("COMMIT", ()).await?;
                Ok(())
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }

    async fn pull_highlight(&self, owner_id: &str, book_id: &str, highlight_id: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM highlights WHERE owner_id = ? AND book_id = ? AND id = ?",
                libsql::params![owner_id, book_id, highlight_id],
            )
            .await?;
        Ok(deleted > 0)
    }
}

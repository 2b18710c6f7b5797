//! Persistence for forms, aliases, and message linkage
//!
//! Two narrow trait seams (`AliasStore`, `LinkStore`) with a single SQLite
//! implementation behind them. Snowflake ids are stored as INTEGER, row ids
//! are time-ordered UUIDs generated on insert.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::alias::{Alias, AliasKind, Form};
use crate::error::{ProxyError, Result};

/// Durable record linking an original user message to its proxied webhook
/// message. Created only after a confirmed send, removed only after a
/// confirmed remote delete; never updated in place.
#[derive(Debug, Clone)]
pub struct ProxiedMessage {
    pub id: String,
    /// Actor who triggered the proxy.
    pub user_id: u64,
    pub form_id: String,
    pub guild_id: u64,
    pub channel_id: u64,
    pub webhook_id: u64,
    pub webhook_token: String,
    /// Id of the proxied webhook message.
    pub message_id: u64,
    pub original_message_id: Option<u64>,
    pub created_at: i64,
}

/// Form and alias persistence
#[async_trait]
pub trait AliasStore: Send + Sync {
    /// All aliases for a user, grouped by owning form.
    async fn aliases_grouped_by_form(&self, user_id: u64) -> Result<HashMap<String, Vec<Alias>>>;

    async fn form_by_id(&self, form_id: &str) -> Result<Option<Form>>;

    /// Case-insensitive lookup by persona name within one owner.
    async fn form_by_name(&self, user_id: u64, name: &str) -> Result<Option<Form>>;

    async fn forms_for_user(&self, user_id: u64) -> Result<Vec<Form>>;

    async fn create_form(
        &self,
        user_id: u64,
        name: &str,
        avatar_url: Option<&str>,
    ) -> Result<Form>;

    /// Delete a form and all its aliases in one atomic unit. Fails with
    /// `NotFound` when the form does not exist or is owned by someone else.
    async fn delete_form(&self, user_id: u64, form_id: &str) -> Result<()>;

    async fn create_alias(
        &self,
        user_id: u64,
        form_id: &str,
        trigger_raw: &str,
        trigger_norm: &str,
        kind: AliasKind,
    ) -> Result<Alias>;

    /// Delete by normalized trigger; true when a row was removed.
    async fn delete_alias(&self, user_id: u64, trigger_norm: &str) -> Result<bool>;

    /// Existing alias with the same normalized trigger, if any.
    async fn find_alias_collision(&self, user_id: u64, trigger_norm: &str)
        -> Result<Option<Alias>>;
}

/// Linkage persistence
#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn insert_link(&self, link: &ProxiedMessage) -> Result<()>;

    async fn find_by_message_id(&self, message_id: u64) -> Result<Option<ProxiedMessage>>;

    async fn delete_by_row_id(&self, id: &str) -> Result<()>;
}

/// SQLite-backed store for forms, aliases, and linkage rows
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ProxyError::Transport(format!("cannot create db dir: {e}")))?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        info!("Proxy store opened: {}", path.display());
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS forms (
                id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                avatar_url TEXT,
                created_at INTEGER NOT NULL DEFAULT (unixepoch())
            );

            CREATE INDEX IF NOT EXISTS idx_forms_user ON forms(user_id);

            CREATE TABLE IF NOT EXISTS aliases (
                id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                form_id TEXT NOT NULL REFERENCES forms(id) ON DELETE CASCADE,
                trigger_raw TEXT NOT NULL,
                trigger_norm TEXT NOT NULL,
                kind TEXT NOT NULL,
                created_at INTEGER NOT NULL DEFAULT (unixepoch())
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_aliases_user_trigger
                ON aliases(user_id, trigger_norm);
            CREATE INDEX IF NOT EXISTS idx_aliases_user ON aliases(user_id);

            CREATE TABLE IF NOT EXISTS proxied_messages (
                id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                form_id TEXT NOT NULL,
                guild_id INTEGER NOT NULL,
                channel_id INTEGER NOT NULL,
                webhook_id INTEGER NOT NULL,
                webhook_token TEXT NOT NULL,
                message_id INTEGER NOT NULL,
                original_message_id INTEGER,
                created_at INTEGER NOT NULL DEFAULT (unixepoch())
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_proxied_message
                ON proxied_messages(message_id);
            "#,
        )?;
        Ok(())
    }

    fn row_to_form(row: &Row<'_>) -> rusqlite::Result<Form> {
        Ok(Form {
            id: row.get(0)?,
            user_id: row.get::<_, i64>(1)? as u64,
            name: row.get(2)?,
            avatar_url: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn row_to_alias(row: &Row<'_>) -> rusqlite::Result<Alias> {
        let kind: String = row.get(6)?;
        Ok(Alias {
            id: row.get(0)?,
            user_id: row.get::<_, i64>(1)? as u64,
            form_id: row.get(2)?,
            trigger_raw: row.get(3)?,
            trigger_norm: row.get(4)?,
            created_at: row.get(5)?,
            kind: AliasKind::from_str(&kind).unwrap_or(AliasKind::Prefix),
        })
    }

    fn row_to_link(row: &Row<'_>) -> rusqlite::Result<ProxiedMessage> {
        Ok(ProxiedMessage {
            id: row.get(0)?,
            user_id: row.get::<_, i64>(1)? as u64,
            form_id: row.get(2)?,
            guild_id: row.get::<_, i64>(3)? as u64,
            channel_id: row.get::<_, i64>(4)? as u64,
            webhook_id: row.get::<_, i64>(5)? as u64,
            webhook_token: row.get(6)?,
            message_id: row.get::<_, i64>(7)? as u64,
            original_message_id: row.get::<_, Option<i64>>(8)?.map(|v| v as u64),
            created_at: row.get(9)?,
        })
    }
}

const ALIAS_COLS: &str = "id, user_id, form_id, trigger_raw, trigger_norm, created_at, kind";
const FORM_COLS: &str = "id, user_id, name, avatar_url, created_at";
const LINK_COLS: &str = "id, user_id, form_id, guild_id, channel_id, webhook_id, \
                         webhook_token, message_id, original_message_id, created_at";

#[async_trait]
impl AliasStore for SqliteStore {
    async fn aliases_grouped_by_form(&self, user_id: u64) -> Result<HashMap<String, Vec<Alias>>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ALIAS_COLS} FROM aliases WHERE user_id = ?1 ORDER BY trigger_norm"
        ))?;
        let rows = stmt.query_map(params![user_id as i64], Self::row_to_alias)?;

        let mut grouped: HashMap<String, Vec<Alias>> = HashMap::new();
        for alias in rows {
            let alias = alias?;
            grouped.entry(alias.form_id.clone()).or_default().push(alias);
        }
        Ok(grouped)
    }

    async fn form_by_id(&self, form_id: &str) -> Result<Option<Form>> {
        let conn = self.conn.lock();
        let form = conn
            .query_row(
                &format!("SELECT {FORM_COLS} FROM forms WHERE id = ?1"),
                params![form_id],
                Self::row_to_form,
            )
            .optional()?;
        Ok(form)
    }

    async fn form_by_name(&self, user_id: u64, name: &str) -> Result<Option<Form>> {
        let conn = self.conn.lock();
        let form = conn
            .query_row(
                &format!(
                    "SELECT {FORM_COLS} FROM forms \
                     WHERE user_id = ?1 AND name = ?2 COLLATE NOCASE"
                ),
                params![user_id as i64, name],
                Self::row_to_form,
            )
            .optional()?;
        Ok(form)
    }

    async fn forms_for_user(&self, user_id: u64) -> Result<Vec<Form>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FORM_COLS} FROM forms WHERE user_id = ?1 ORDER BY created_at"
        ))?;
        let rows = stmt.query_map(params![user_id as i64], Self::row_to_form)?;
        let mut forms = Vec::new();
        for form in rows {
            forms.push(form?);
        }
        Ok(forms)
    }

    async fn create_form(
        &self,
        user_id: u64,
        name: &str,
        avatar_url: Option<&str>,
    ) -> Result<Form> {
        let form = Form {
            id: uuid::Uuid::now_v7().to_string(),
            user_id,
            name: name.to_string(),
            avatar_url: avatar_url.map(str::to_string),
            created_at: chrono::Utc::now().timestamp(),
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO forms (id, user_id, name, avatar_url, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                form.id,
                form.user_id as i64,
                form.name,
                form.avatar_url,
                form.created_at
            ],
        )?;

        info!("Form created: {} ({}) for user {}", form.name, form.id, user_id);
        Ok(form)
    }

    async fn delete_form(&self, user_id: u64, form_id: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let owned: Option<String> = tx
            .query_row(
                "SELECT id FROM forms WHERE id = ?1 AND user_id = ?2",
                params![form_id, user_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        if owned.is_none() {
            return Err(ProxyError::NotFound(format!("form {form_id}")));
        }

        // Aliases first, then the form; the FK cascade is only a backstop.
        tx.execute(
            "DELETE FROM aliases WHERE form_id = ?1",
            params![form_id],
        )?;
        tx.execute("DELETE FROM forms WHERE id = ?1", params![form_id])?;
        tx.commit()?;

        info!("Form deleted: {} for user {}", form_id, user_id);
        Ok(())
    }

    async fn create_alias(
        &self,
        user_id: u64,
        form_id: &str,
        trigger_raw: &str,
        trigger_norm: &str,
        kind: AliasKind,
    ) -> Result<Alias> {
        let alias = Alias {
            id: uuid::Uuid::now_v7().to_string(),
            user_id,
            form_id: form_id.to_string(),
            trigger_raw: trigger_raw.to_string(),
            trigger_norm: trigger_norm.to_string(),
            kind,
            created_at: chrono::Utc::now().timestamp(),
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO aliases (id, user_id, form_id, trigger_raw, trigger_norm, kind, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                alias.id,
                alias.user_id as i64,
                alias.form_id,
                alias.trigger_raw,
                alias.trigger_norm,
                alias.kind.as_str(),
                alias.created_at
            ],
        )?;

        info!(
            "Alias created: `{}` -> form {} for user {}",
            alias.trigger_norm, form_id, user_id
        );
        Ok(alias)
    }

    async fn delete_alias(&self, user_id: u64, trigger_norm: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM aliases WHERE user_id = ?1 AND trigger_norm = ?2",
            params![user_id as i64, trigger_norm],
        )?;
        Ok(removed > 0)
    }

    async fn find_alias_collision(
        &self,
        user_id: u64,
        trigger_norm: &str,
    ) -> Result<Option<Alias>> {
        let conn = self.conn.lock();
        let alias = conn
            .query_row(
                &format!(
                    "SELECT {ALIAS_COLS} FROM aliases \
                     WHERE user_id = ?1 AND trigger_norm = ?2"
                ),
                params![user_id as i64, trigger_norm],
                Self::row_to_alias,
            )
            .optional()?;
        Ok(alias)
    }
}

#[async_trait]
impl LinkStore for SqliteStore {
    async fn insert_link(&self, link: &ProxiedMessage) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO proxied_messages ({LINK_COLS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                link.id,
                link.user_id as i64,
                link.form_id,
                link.guild_id as i64,
                link.channel_id as i64,
                link.webhook_id as i64,
                link.webhook_token,
                link.message_id as i64,
                link.original_message_id.map(|v| v as i64),
                link.created_at
            ],
        )?;
        Ok(())
    }

    async fn find_by_message_id(&self, message_id: u64) -> Result<Option<ProxiedMessage>> {
        let conn = self.conn.lock();
        let link = conn
            .query_row(
                &format!("SELECT {LINK_COLS} FROM proxied_messages WHERE message_id = ?1"),
                params![message_id as i64],
                Self::row_to_link,
            )
            .optional()?;
        Ok(link)
    }

    async fn delete_by_row_id(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM proxied_messages WHERE id = ?1", params![id])?;
        Ok(())
    }
}

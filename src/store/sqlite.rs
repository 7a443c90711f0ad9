//! SQLite document store
//!
//! Uses a deadpool-backed SQLite connection pool to provide async access
//! without blocking the Tokio runtime. Documents are stored as JSON text;
//! `_id`, `repo.name` and `digest` are mirrored into indexed columns so
//! filters run in SQL.

use super::{
    BulkWriteResult, Collection, DocumentStore, Filter, UpdateResult, WriteModel, apply_set,
    as_object, document_digest, document_repo_name, ensure_id, prepare_replacement,
    upsert_document,
};
use crate::config::StorageConfig;
use crate::error::{ChartRepoError, Result, StorageError};
use async_trait::async_trait;
use deadpool_sqlite::rusqlite::{self, OptionalExtension, ToSql, TransactionBehavior};
use deadpool_sqlite::{Config as DeadpoolConfig, Pool, Runtime};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA_VERSION: i32 = 1;

/// Document store persisted in a single SQLite database file.
pub struct SqliteStore {
    pool: Pool,
    db_path: PathBuf,
}

impl SqliteStore {
    fn configure_connection(conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;
        Ok(())
    }

    /// Read-then-write transactions take the write lock up front; a deferred
    /// transaction cannot be upgraded once another connection has written.
    fn write_transaction(
        conn: &mut rusqlite::Connection,
    ) -> rusqlite::Result<rusqlite::Transaction<'_>> {
        conn.transaction_with_behavior(TransactionBehavior::Immediate)
    }

    async fn with_connection<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> std::result::Result<R, StorageError>
            + Send
            + 'static,
        R: Send + 'static,
    {
        let conn = self.pool.get().await.map_err(|e| StorageError::DatabaseError {
            message: format!("Failed to acquire SQLite connection: {e}"),
        })?;

        let result = conn
            .interact(move |conn| {
                Self::configure_connection(conn)?;
                f(conn)
            })
            .await
            .map_err(|e| StorageError::DatabaseError {
                message: format!("SQLite connection worker failed: {e}"),
            })?;

        result.map_err(ChartRepoError::from)
    }

    /// Opens (creating when needed) the database at `config.database_path`.
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        let db_path = config.database_path.clone();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = DeadpoolConfig::new(db_path.clone())
            .builder(Runtime::Tokio1)
            .map_err(|e| StorageError::InitializationFailed {
                message: format!("Failed to create SQLite pool builder: {e}"),
            })?
            .max_size(config.connection_pool_size)
            .wait_timeout(Some(Duration::from_secs(30)))
            .create_timeout(Some(Duration::from_secs(30)))
            .recycle_timeout(Some(Duration::from_secs(30)))
            .build()
            .map_err(|e| StorageError::InitializationFailed {
                message: format!("Failed to create SQLite pool: {e}"),
            })?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        info!(path = %store.db_path.display(), "SQLite document store initialized");
        Ok(store)
    }

    pub fn db_path(&self) -> &std::path::Path {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<()> {
        self.with_connection(move |conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS metadata (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS documents (
                    collection TEXT NOT NULL,
                    id TEXT NOT NULL,
                    repo_name TEXT,
                    digest TEXT,
                    body TEXT NOT NULL,
                    PRIMARY KEY (collection, id)
                );

                CREATE INDEX IF NOT EXISTS idx_documents_repo
                    ON documents(collection, repo_name);
                "#,
            )?;

            let current: Option<String> = conn
                .query_row(
                    "SELECT value FROM metadata WHERE key = 'schema_version'",
                    [],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(version) = current.and_then(|v| v.parse::<i32>().ok())
                && version > SCHEMA_VERSION
            {
                return Err(StorageError::InitializationFailed {
                    message: format!(
                        "database schema version {version} is newer than supported version {SCHEMA_VERSION}"
                    ),
                });
            }

            conn.execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                rusqlite::params!["schema_version", SCHEMA_VERSION.to_string()],
            )?;
            Ok(())
        })
        .await?;

        debug!("SQLite schema initialized (version {})", SCHEMA_VERSION);
        Ok(())
    }
}

/// Loads every document of `collection` matching `filter`, ordered by id.
///
/// Equality predicates run in SQL; the `_id` exclusion list is applied on
/// the loaded rows.
fn select_matching(
    conn: &rusqlite::Connection,
    collection: Collection,
    filter: &Filter,
    limit: Option<usize>,
) -> std::result::Result<Vec<(String, Value)>, StorageError> {
    let mut sql = String::from("SELECT id, body FROM documents WHERE collection = ?");
    let mut params: Vec<&dyn ToSql> = Vec::new();
    let collection_name = collection.name();
    params.push(&collection_name);

    if let Some(id) = &filter.id {
        sql.push_str(" AND id = ?");
        params.push(id);
    }
    if let Some(repo_name) = &filter.repo_name {
        sql.push_str(" AND repo_name = ?");
        params.push(repo_name);
    }
    if let Some(digest) = &filter.digest {
        sql.push_str(" AND digest = ?");
        params.push(digest);
    }
    sql.push_str(" ORDER BY id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_slice(), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut found = Vec::new();
    for row in rows {
        let (id, body) = row?;
        if let Some(excluded) = &filter.exclude_ids
            && excluded.iter().any(|e| *e == id)
        {
            continue;
        }
        let doc: Value = serde_json::from_str(&body).map_err(|e| StorageError::InvalidDocument {
            message: format!("{collection}/{id}: {e}"),
        })?;
        found.push((id, doc));
        if limit.is_some_and(|l| found.len() >= l) {
            break;
        }
    }
    Ok(found)
}

fn write_document(
    conn: &rusqlite::Connection,
    collection: Collection,
    id: &str,
    doc: &Value,
) -> std::result::Result<(), StorageError> {
    let body = serde_json::to_string(doc).map_err(|e| StorageError::InvalidDocument {
        message: e.to_string(),
    })?;
    conn.execute(
        "INSERT OR REPLACE INTO documents (collection, id, repo_name, digest, body)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            collection.name(),
            id,
            document_repo_name(doc),
            document_digest(doc),
            body
        ],
    )?;
    Ok(())
}

fn delete_matching(
    conn: &rusqlite::Connection,
    collection: Collection,
    filter: &Filter,
) -> std::result::Result<u64, StorageError> {
    let ids: Vec<String> = select_matching(conn, collection, filter, None)?
        .into_iter()
        .map(|(id, _)| id)
        .collect();

    let mut stmt = conn.prepare("DELETE FROM documents WHERE collection = ?1 AND id = ?2")?;
    for id in &ids {
        stmt.execute(rusqlite::params![collection.name(), id])?;
    }
    Ok(ids.len() as u64)
}

fn replace_one(
    conn: &rusqlite::Connection,
    collection: Collection,
    filter: &Filter,
    replacement: Value,
    upsert: bool,
    result: &mut BulkWriteResult,
) -> std::result::Result<(), StorageError> {
    let existing = select_matching(conn, collection, filter, Some(1))?
        .into_iter()
        .next()
        .map(|(id, _)| id);

    match existing {
        Some(id) => {
            let (id, doc) = prepare_replacement(replacement, Some(&id), filter)?;
            write_document(conn, collection, &id, &doc)?;
            result.matched += 1;
        }
        None if upsert => {
            let (id, doc) = prepare_replacement(replacement, None, filter)?;
            write_document(conn, collection, &id, &doc)?;
            result.upserted += 1;
        }
        None => {}
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn bulk_write(
        &self,
        collection: Collection,
        models: Vec<WriteModel>,
    ) -> Result<BulkWriteResult> {
        self.with_connection(move |conn| {
            let tx = Self::write_transaction(conn)?;
            let mut result = BulkWriteResult::default();
            for model in models {
                match model {
                    WriteModel::ReplaceOne {
                        filter,
                        replacement,
                        upsert,
                    } => replace_one(&tx, collection, &filter, replacement, upsert, &mut result)?,
                    WriteModel::DeleteMany { filter } => {
                        result.deleted += delete_matching(&tx, collection, &filter)?;
                    }
                }
            }
            tx.commit()?;
            Ok(result)
        })
        .await
    }

    async fn delete_many(&self, collection: Collection, filter: &Filter) -> Result<u64> {
        let filter = filter.clone();
        self.with_connection(move |conn| {
            let tx = Self::write_transaction(conn)?;
            let deleted = delete_matching(&tx, collection, &filter)?;
            tx.commit()?;
            Ok(deleted)
        })
        .await
    }

    async fn find_one(&self, collection: Collection, filter: &Filter) -> Result<Option<Value>> {
        let filter = filter.clone();
        self.with_connection(move |conn| {
            Ok(select_matching(conn, collection, &filter, Some(1))?
                .into_iter()
                .next()
                .map(|(_, doc)| doc))
        })
        .await
    }

    async fn find_many(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>> {
        let filter = filter.clone();
        self.with_connection(move |conn| {
            Ok(select_matching(conn, collection, &filter, None)?
                .into_iter()
                .map(|(_, doc)| doc)
                .collect())
        })
        .await
    }

    async fn insert_one(&self, collection: Collection, document: Value) -> Result<String> {
        let (id, doc) = ensure_id(document)?;
        self.with_connection(move |conn| {
            let tx = Self::write_transaction(conn)?;
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM documents WHERE collection = ?1 AND id = ?2",
                    rusqlite::params![collection.name(), id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(StorageError::DatabaseError {
                    message: format!("duplicate _id {id} in {collection}"),
                });
            }
            write_document(&tx, collection, &id, &doc)?;
            tx.commit()?;
            Ok(id)
        })
        .await
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        set: Value,
        upsert: bool,
    ) -> Result<UpdateResult> {
        let filter = filter.clone();
        let set: Map<String, Value> = as_object(set)?;
        self.with_connection(move |conn| {
            let tx = Self::write_transaction(conn)?;
            let existing = select_matching(&tx, collection, &filter, Some(1))?
                .into_iter()
                .next();

            let result = match existing {
                Some((id, mut doc)) => {
                    let modified = apply_set(&mut doc, &set);
                    if modified {
                        write_document(&tx, collection, &id, &doc)?;
                    }
                    UpdateResult {
                        matched: 1,
                        modified: u64::from(modified),
                        upserted_id: None,
                    }
                }
                None if upsert => {
                    let (id, doc) = upsert_document(&filter, &set)?;
                    write_document(&tx, collection, &id, &doc)?;
                    UpdateResult {
                        matched: 0,
                        modified: 0,
                        upserted_id: Some(id),
                    }
                }
                None => UpdateResult::default(),
            };

            tx.commit()?;
            Ok(result)
        })
        .await
    }
}

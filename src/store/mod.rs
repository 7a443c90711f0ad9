//! Document store port and its adapters
//!
//! The catalog is persisted as JSON documents grouped into collections.
//! Callers only rely on the operations of [`DocumentStore`]; the concrete
//! backend is picked from [`StorageConfig`].

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Named collections of the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// Chart documents, keyed `<repo>/<chart>`
    Packages,
    /// Repository checkpoints, keyed by repository name
    PackageCheck,
    /// Extracted chart files, keyed `<repo>/<chart>-<version>`
    PackageAssets,
    /// Scratch collection of the readiness probe
    Numbers,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Packages,
        Collection::PackageCheck,
        Collection::PackageAssets,
        Collection::Numbers,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Packages => "packages",
            Collection::PackageCheck => "package-check",
            Collection::PackageAssets => "package-assets",
            Collection::Numbers => "numbers",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Conjunction of the supported document predicates.
///
/// An empty filter matches every document of a collection.
///
/// ```rust
/// use chart_repo::store::Filter;
/// use serde_json::json;
///
/// let doc = json!({"_id": "stable/wordpress", "repo": {"name": "stable"}});
/// assert!(Filter::by_repo("stable").matches(&doc));
/// assert!(!Filter::by_repo("stable")
///     .excluding_ids(vec!["stable/wordpress".to_string()])
///     .matches(&doc));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// `_id` equals
    pub id: Option<String>,
    /// `repo.name` equals
    pub repo_name: Option<String>,
    /// `digest` equals
    pub digest: Option<String>,
    /// `_id` not in
    pub exclude_ids: Option<Vec<String>>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn by_repo(repo_name: impl Into<String>) -> Self {
        Self {
            repo_name: Some(repo_name.into()),
            ..Self::default()
        }
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    pub fn excluding_ids(mut self, ids: Vec<String>) -> Self {
        self.exclude_ids = Some(ids);
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        if let Some(id) = &self.id
            && document_id(doc) != Some(id.as_str())
        {
            return false;
        }
        if let Some(repo_name) = &self.repo_name
            && document_repo_name(doc) != Some(repo_name.as_str())
        {
            return false;
        }
        if let Some(digest) = &self.digest
            && document_digest(doc) != Some(digest.as_str())
        {
            return false;
        }
        if let Some(excluded) = &self.exclude_ids
            && let Some(id) = document_id(doc)
            && excluded.iter().any(|e| e == id)
        {
            return false;
        }
        true
    }
}

/// One operation of a [`DocumentStore::bulk_write`]
#[derive(Debug, Clone)]
pub enum WriteModel {
    /// Replace the first matching document, inserting when `upsert` is set
    /// and nothing matches
    ReplaceOne {
        filter: Filter,
        replacement: Value,
        upsert: bool,
    },
    /// Delete every matching document
    DeleteMany { filter: Filter },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    pub matched: u64,
    pub upserted: u64,
    pub deleted: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<String>,
}

/// Persistence port of the catalog.
///
/// Documents are JSON objects whose `_id` field is the primary key within a
/// collection. `bulk_write` applies its models in order and stops at the
/// first failing model.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn bulk_write(
        &self,
        collection: Collection,
        models: Vec<WriteModel>,
    ) -> Result<BulkWriteResult>;

    async fn delete_many(&self, collection: Collection, filter: &Filter) -> Result<u64>;

    async fn find_one(&self, collection: Collection, filter: &Filter) -> Result<Option<Value>>;

    async fn find_many(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>>;

    /// Inserts a new document and returns its `_id`. A missing `_id` is
    /// generated; an existing one must not collide.
    async fn insert_one(&self, collection: Collection, document: Value) -> Result<String>;

    /// Sets the top-level fields of `set` on the first matching document.
    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        set: Value,
        upsert: bool,
    ) -> Result<UpdateResult>;
}

/// Opens the store selected by the configuration.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn DocumentStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Sqlite => Ok(Arc::new(SqliteStore::new(config).await?)),
    }
}

pub fn document_id(doc: &Value) -> Option<&str> {
    doc.get("_id").and_then(Value::as_str)
}

pub fn document_repo_name(doc: &Value) -> Option<&str> {
    doc.get("repo")
        .and_then(|repo| repo.get("name"))
        .and_then(Value::as_str)
}

pub fn document_digest(doc: &Value) -> Option<&str> {
    doc.get("digest").and_then(Value::as_str)
}

pub(crate) fn as_object(doc: Value) -> std::result::Result<Map<String, Value>, StorageError> {
    match doc {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::InvalidDocument {
            message: format!("expected a JSON object, got {other}"),
        }),
    }
}

/// Builds the document written by a replace or upsert.
///
/// The `_id` comes from the matched document, then the filter, then the
/// replacement itself.
pub(crate) fn prepare_replacement(
    replacement: Value,
    existing_id: Option<&str>,
    filter: &Filter,
) -> std::result::Result<(String, Value), StorageError> {
    let mut map = as_object(replacement)?;
    let id = existing_id
        .map(str::to_string)
        .or_else(|| filter.id.clone())
        .or_else(|| map.get("_id").and_then(Value::as_str).map(str::to_string))
        .ok_or_else(|| StorageError::InvalidDocument {
            message: "document has no _id".to_string(),
        })?;
    map.insert("_id".to_string(), Value::String(id.clone()));
    Ok((id, Value::Object(map)))
}

/// Applies `$set` semantics: every top-level field of `set` overwrites the
/// field of `doc`. Returns whether anything changed.
pub(crate) fn apply_set(doc: &mut Value, set: &Map<String, Value>) -> bool {
    let Value::Object(target) = doc else {
        return false;
    };
    let mut changed = false;
    for (key, value) in set {
        if key == "_id" {
            continue;
        }
        if target.get(key) != Some(value) {
            target.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    changed
}

/// Document created by an upserting update that matched nothing
pub(crate) fn upsert_document(
    filter: &Filter,
    set: &Map<String, Value>,
) -> std::result::Result<(String, Value), StorageError> {
    let mut doc = Value::Object(Map::new());
    apply_set(&mut doc, set);
    prepare_replacement(doc, None, filter)
}

/// Ensures `doc` carries an `_id`, generating one when missing.
pub(crate) fn ensure_id(doc: Value) -> std::result::Result<(String, Value), StorageError> {
    let mut map = as_object(doc)?;
    let id = match map.get("_id").and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => {
            let id = generate_document_id();
            map.insert("_id".to_string(), Value::String(id.clone()));
            id
        }
    };
    Ok((id, Value::Object(map)))
}

fn generate_document_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{nanos:016x}{seq:08x}")
}

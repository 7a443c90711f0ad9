//! In-memory document store backed by `DashMap`

use super::{
    BulkWriteResult, Collection, DocumentStore, Filter, UpdateResult, WriteModel, apply_set,
    as_object, ensure_id, prepare_replacement, upsert_document,
};
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

type Documents = BTreeMap<String, Value>;

/// Process-local store used by tests and `--db-type memory` runs.
///
/// Each collection is one map entry, so every operation on a collection,
/// bulk writes included, runs under that entry's lock. Write operations are
/// counted per collection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<Collection, Documents>,
    writes: DashMap<Collection, AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating operations issued against `collection`.
    pub fn write_count(&self, collection: Collection) -> u64 {
        self.writes
            .get(&collection)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Number of documents currently stored in `collection`.
    pub fn len(&self, collection: Collection) -> usize {
        self.collections
            .get(&collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    fn record_write(&self, collection: Collection) {
        self.writes
            .entry(collection)
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    fn first_match<'a>(docs: &'a Documents, filter: &Filter) -> Option<(&'a String, &'a Value)> {
        if let Some(id) = &filter.id {
            return docs.get_key_value(id).filter(|(_, doc)| filter.matches(doc));
        }
        docs.iter().find(|(_, doc)| filter.matches(doc))
    }

    fn delete_matching(docs: &mut Documents, filter: &Filter) -> u64 {
        let before = docs.len();
        docs.retain(|_, doc| !filter.matches(doc));
        (before - docs.len()) as u64
    }

    fn replace_one(
        docs: &mut Documents,
        filter: &Filter,
        replacement: Value,
        upsert: bool,
        result: &mut BulkWriteResult,
    ) -> std::result::Result<(), StorageError> {
        let existing = Self::first_match(docs, filter).map(|(id, _)| id.clone());
        match existing {
            Some(id) => {
                let (id, doc) = prepare_replacement(replacement, Some(&id), filter)?;
                docs.insert(id, doc);
                result.matched += 1;
            }
            None if upsert => {
                let (id, doc) = prepare_replacement(replacement, None, filter)?;
                docs.insert(id, doc);
                result.upserted += 1;
            }
            None => {}
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn bulk_write(
        &self,
        collection: Collection,
        models: Vec<WriteModel>,
    ) -> Result<BulkWriteResult> {
        self.record_write(collection);
        let mut docs = self.collections.entry(collection).or_default();
        let mut result = BulkWriteResult::default();

        for model in models {
            match model {
                WriteModel::ReplaceOne {
                    filter,
                    replacement,
                    upsert,
                } => Self::replace_one(&mut docs, &filter, replacement, upsert, &mut result)?,
                WriteModel::DeleteMany { filter } => {
                    result.deleted += Self::delete_matching(&mut docs, &filter);
                }
            }
        }

        Ok(result)
    }

    async fn delete_many(&self, collection: Collection, filter: &Filter) -> Result<u64> {
        self.record_write(collection);
        let mut docs = self.collections.entry(collection).or_default();
        Ok(Self::delete_matching(&mut docs, filter))
    }

    async fn find_one(&self, collection: Collection, filter: &Filter) -> Result<Option<Value>> {
        Ok(self
            .collections
            .get(&collection)
            .and_then(|docs| Self::first_match(&docs, filter).map(|(_, doc)| doc.clone())))
    }

    async fn find_many(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>> {
        Ok(self
            .collections
            .get(&collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_one(&self, collection: Collection, document: Value) -> Result<String> {
        self.record_write(collection);
        let (id, doc) = ensure_id(document)?;
        let mut docs = self.collections.entry(collection).or_default();
        if docs.contains_key(&id) {
            return Err(StorageError::DatabaseError {
                message: format!("duplicate _id {id} in {collection}"),
            }
            .into());
        }
        docs.insert(id.clone(), doc);
        Ok(id)
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        set: Value,
        upsert: bool,
    ) -> Result<UpdateResult> {
        self.record_write(collection);
        let set = as_object(set)?;
        let mut docs = self.collections.entry(collection).or_default();

        let existing = Self::first_match(&docs, filter).map(|(id, _)| id.clone());
        if let Some(id) = existing {
            let modified = docs
                .get_mut(&id)
                .map(|doc| apply_set(doc, &set))
                .unwrap_or(false);
            return Ok(UpdateResult {
                matched: 1,
                modified: u64::from(modified),
                upserted_id: None,
            });
        }

        if !upsert {
            return Ok(UpdateResult::default());
        }

        let (id, doc) = upsert_document(filter, &set)?;
        docs.insert(id.clone(), doc);
        Ok(UpdateResult {
            matched: 0,
            modified: 0,
            upserted_id: Some(id),
        })
    }
}

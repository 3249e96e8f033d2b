//! In-memory `Connector` used by unit tests.
//! Records every call so tests can assert what reached the "database".

use async_trait::async_trait;
use mongodb::bson::{Bson, Document, oid::ObjectId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::connection::{Connector, Session, WriteOutcome, id_to_string};
use crate::error::{ExplorerResult, classify_message};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open(String),
    ListDatabases,
    ListCollections(String),
    Find {
        database: String,
        collection: String,
        filter: Document,
        skip: u64,
        limit: i64,
    },
    InsertOne {
        database: String,
        collection: String,
    },
    UpdateOne {
        database: String,
        collection: String,
        filter: Document,
        update: Document,
    },
    DeleteOne {
        database: String,
        collection: String,
        filter: Document,
    },
}

type Store = BTreeMap<String, BTreeMap<String, Vec<Document>>>;

#[derive(Default)]
struct Shared {
    store: Mutex<Store>,
    calls: Mutex<Vec<Call>>,
    open_sessions: AtomicUsize,
}

impl Shared {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[derive(Default)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
    default_database: Option<String>,
    find_error: Option<String>,
    open_error: Option<String>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(self, database: &str, collection: &str, documents: Vec<Document>) -> Self {
        self.shared
            .store
            .lock()
            .unwrap()
            .entry(database.to_string())
            .or_default()
            .insert(collection.to_string(), documents);
        self
    }

    pub fn with_default_database(mut self, database: &str) -> Self {
        self.default_database = Some(database.to_string());
        self
    }

    /// Make every find fail with the given driver message
    pub fn failing_find(mut self, message: &str) -> Self {
        self.find_error = Some(message.to_string());
        self
    }

    /// Make opening a session fail with the given driver message
    pub fn failing_open(mut self, message: &str) -> Self {
        self.open_error = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.shared.calls.lock().unwrap().clone()
    }

    /// Sessions opened but not yet closed
    pub fn open_sessions(&self) -> usize {
        self.shared.open_sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, connection_string: &str) -> ExplorerResult<Box<dyn Session>> {
        self.shared.record(Call::Open(connection_string.to_string()));
        if let Some(message) = &self.open_error {
            return Err(classify_message(message.clone()));
        }
        self.shared.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            shared: self.shared.clone(),
            default_database: self.default_database.clone(),
            find_error: self.find_error.clone(),
        }))
    }
}

struct MemorySession {
    shared: Arc<Shared>,
    default_database: Option<String>,
    find_error: Option<String>,
}

/// Minimal filter evaluation: equality and numeric comparison operators.
fn matches(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(field, condition)| {
        let value = document.get(field);
        match condition {
            Bson::Document(ops) if ops.keys().all(|k| k.starts_with('$')) => {
                ops.iter().all(|(op, operand)| compare(value, op, operand))
            }
            expected => value == Some(expected),
        }
    })
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn compare(value: Option<&Bson>, op: &str, operand: &Bson) -> bool {
    if op == "$eq" {
        return value == Some(operand);
    }
    if op == "$ne" {
        return value != Some(operand);
    }
    let (Some(left), Some(right)) = (value.and_then(as_f64), as_f64(operand)) else {
        return false;
    };
    match op {
        "$gt" => left > right,
        "$gte" => left >= right,
        "$lt" => left < right,
        "$lte" => left <= right,
        _ => false,
    }
}

impl MemorySession {
    fn with_collection<T>(
        &self,
        database: &str,
        collection: &str,
        f: impl FnOnce(&mut Vec<Document>) -> T,
    ) -> T {
        let mut store = self.shared.store.lock().unwrap();
        let documents = store
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default();
        f(documents)
    }
}

#[async_trait]
impl Session for MemorySession {
    fn default_database(&self) -> Option<&str> {
        self.default_database.as_deref()
    }

    async fn list_database_names(&self) -> ExplorerResult<Vec<String>> {
        self.shared.record(Call::ListDatabases);
        Ok(self.shared.store.lock().unwrap().keys().cloned().collect())
    }

    async fn list_collection_names(&self, database: &str) -> ExplorerResult<Vec<String>> {
        self.shared.record(Call::ListCollections(database.to_string()));
        Ok(self
            .shared
            .store
            .lock()
            .unwrap()
            .get(database)
            .map(|collections| collections.keys().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn find(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        skip: u64,
        limit: i64,
    ) -> ExplorerResult<Vec<Document>> {
        self.shared.record(Call::Find {
            database: database.to_string(),
            collection: collection.to_string(),
            filter: filter.clone(),
            skip,
            limit,
        });
        if let Some(message) = &self.find_error {
            return Err(classify_message(message.clone()));
        }

        let take = if limit == 0 {
            usize::MAX
        } else {
            usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX)
        };
        Ok(self.with_collection(database, collection, |documents| {
            documents
                .iter()
                .filter(|document| matches(document, &filter))
                .skip(usize::try_from(skip).unwrap_or(usize::MAX))
                .take(take)
                .cloned()
                .collect()
        }))
    }

    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        mut document: Document,
    ) -> ExplorerResult<WriteOutcome> {
        self.shared.record(Call::InsertOne {
            database: database.to_string(),
            collection: collection.to_string(),
        });
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }
        let inserted_id = document.get("_id").map(id_to_string).unwrap_or_default();
        self.with_collection(database, collection, |documents| documents.push(document));
        Ok(WriteOutcome::Inserted {
            acknowledged: true,
            inserted_id,
        })
    }

    async fn update_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> ExplorerResult<WriteOutcome> {
        self.shared.record(Call::UpdateOne {
            database: database.to_string(),
            collection: collection.to_string(),
            filter: filter.clone(),
            update: update.clone(),
        });
        let set = update.get_document("$set").cloned().unwrap_or_default();
        let matched = self.with_collection(database, collection, |documents| {
            match documents.iter_mut().find(|document| matches(document, &filter)) {
                Some(document) => {
                    for (field, value) in set {
                        document.insert(field, value);
                    }
                    1
                }
                None => 0,
            }
        });
        Ok(WriteOutcome::Updated {
            acknowledged: true,
            matched_count: matched,
            modified_count: matched,
            upserted_count: 0,
            upserted_id: None,
        })
    }

    async fn delete_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> ExplorerResult<WriteOutcome> {
        self.shared.record(Call::DeleteOne {
            database: database.to_string(),
            collection: collection.to_string(),
            filter: filter.clone(),
        });
        let deleted = self.with_collection(database, collection, |documents| {
            match documents.iter().position(|document| matches(document, &filter)) {
                Some(index) => {
                    documents.remove(index);
                    1
                }
                None => 0,
            }
        });
        Ok(WriteOutcome::Deleted {
            acknowledged: true,
            deleted_count: deleted,
        })
    }

    async fn close(self: Box<Self>) {
        self.shared.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

//! Driver-backed connections: a fresh client per session, or a bounded
//! cache of clients keyed by connection string.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    Client,
    bson::{Document, doc},
    options::{ClientOptions, FindOptions},
};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::{ExplorerConfig, PoolConfig};
use crate::connection::{Connector, Session, WriteOutcome, id_to_string, redact, wants_direct_connection};
use crate::error::ExplorerResult;

/// Build client options for a connection string, applying the loopback
/// direct-connection rule and the configured timeouts.
pub async fn client_options(uri: &str, settings: &ExplorerConfig) -> ExplorerResult<ClientOptions> {
    let mut client_options = ClientOptions::parse(uri).await?;

    if wants_direct_connection(uri) {
        client_options.direct_connection = Some(true);
    }
    client_options.connect_timeout = Some(settings.connect_timeout());
    client_options.server_selection_timeout = Some(settings.server_selection_timeout());
    client_options.app_name = Some(env!("CARGO_PKG_NAME").to_string());

    Ok(client_options)
}

async fn new_client(uri: &str, settings: &ExplorerConfig) -> ExplorerResult<(Client, Option<String>)> {
    let options = client_options(uri, settings).await?;
    let default_database = options.default_database.clone();
    tracing::debug!(
        "Creating MongoDB client for {} (direct: {:?})",
        redact(uri),
        options.direct_connection
    );
    let client = Client::with_options(options)?;
    Ok((client, default_database))
}

/// Opens a brand-new client for every session and shuts it down on close.
pub struct DriverConnector {
    settings: ExplorerConfig,
}

impl DriverConnector {
    pub fn new(settings: ExplorerConfig) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for DriverConnector {
    async fn open(&self, connection_string: &str) -> ExplorerResult<Box<dyn Session>> {
        let (client, default_database) = new_client(connection_string, &self.settings).await?;
        Ok(Box::new(DriverSession {
            client,
            default_database,
            owned: true,
        }))
    }
}

pub struct DriverSession {
    client: Client,
    default_database: Option<String>,
    /// Owned clients are shut down on close; pooled ones stay alive
    owned: bool,
}

impl DriverSession {
    fn collection(&self, database: &str, collection: &str) -> mongodb::Collection<Document> {
        self.client.database(database).collection::<Document>(collection)
    }
}

#[async_trait]
impl Session for DriverSession {
    fn default_database(&self) -> Option<&str> {
        self.default_database.as_deref()
    }

    async fn list_database_names(&self) -> ExplorerResult<Vec<String>> {
        Ok(self.client.list_database_names().await?)
    }

    async fn list_collection_names(&self, database: &str) -> ExplorerResult<Vec<String>> {
        Ok(self.client.database(database).list_collection_names().await?)
    }

    async fn find(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        skip: u64,
        limit: i64,
    ) -> ExplorerResult<Vec<Document>> {
        let mut find_options = FindOptions::default();
        if skip > 0 {
            find_options.skip = Some(skip);
        }
        if limit != 0 {
            find_options.limit = Some(limit);
        }

        let cursor = self
            .collection(database, collection)
            .find(filter)
            .with_options(find_options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        document: Document,
    ) -> ExplorerResult<WriteOutcome> {
        let result = self.collection(database, collection).insert_one(document).await?;
        Ok(WriteOutcome::Inserted {
            acknowledged: true,
            inserted_id: id_to_string(&result.inserted_id),
        })
    }

    async fn update_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> ExplorerResult<WriteOutcome> {
        let result = self
            .collection(database, collection)
            .update_one(filter, update)
            .await?;
        Ok(WriteOutcome::Updated {
            acknowledged: true,
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_count: u64::from(result.upserted_id.is_some()),
            upserted_id: result.upserted_id.as_ref().map(id_to_string),
        })
    }

    async fn delete_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> ExplorerResult<WriteOutcome> {
        let result = self.collection(database, collection).delete_one(filter).await?;
        Ok(WriteOutcome::Deleted {
            acknowledged: true,
            deleted_count: result.deleted_count,
        })
    }

    async fn close(self: Box<Self>) {
        if self.owned {
            self.client.shutdown().await;
        }
    }
}

#[derive(Clone)]
struct PooledClient {
    client: Client,
    default_database: Option<String>,
    last_used: Instant,
}

trait PoolEntry {
    fn last_used(&self) -> Instant;
    fn touch(&mut self, now: Instant);
}

impl PoolEntry for PooledClient {
    fn last_used(&self) -> Instant {
        self.last_used
    }

    fn touch(&mut self, now: Instant) {
        self.last_used = now;
    }
}

/// Keeps one client per connection string, bounded in size and evicting
/// entries idle for longer than the configured timeout.
pub struct PooledConnector {
    settings: ExplorerConfig,
    max_clients: usize,
    idle_timeout: Duration,
    clients: Mutex<HashMap<String, PooledClient>>,
}

impl PooledConnector {
    pub fn new(settings: ExplorerConfig, pool: &PoolConfig) -> Self {
        Self {
            settings,
            max_clients: pool.max_clients.max(1),
            idle_timeout: Duration::from_secs(pool.idle_timeout_secs),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Probe a newly created client so bad connection strings are not cached
    async fn verify(client: &Client) -> ExplorerResult<()> {
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(())
    }

    fn session(entry: PooledClient) -> Box<dyn Session> {
        Box::new(DriverSession {
            client: entry.client,
            default_database: entry.default_database,
            owned: false,
        })
    }
}

/// Return a live entry for `key`, refreshing its last use.
fn checkout<T: PoolEntry + Clone>(
    entries: &mut HashMap<String, T>,
    key: &str,
    now: Instant,
    idle_timeout: Duration,
) -> Option<T> {
    let entry = entries.get_mut(key)?;
    if now.duration_since(entry.last_used()) >= idle_timeout {
        return None;
    }
    entry.touch(now);
    Some(entry.clone())
}

/// Remove idle entries, then the least recently used ones until there is
/// room for one more.
fn evict<T: PoolEntry>(
    entries: &mut HashMap<String, T>,
    now: Instant,
    idle_timeout: Duration,
    max_entries: usize,
) -> Vec<T> {
    let mut evicted = Vec::new();
    let idle: Vec<String> = entries
        .iter()
        .filter(|(_, entry)| now.duration_since(entry.last_used()) >= idle_timeout)
        .map(|(key, _)| key.clone())
        .collect();
    for key in idle {
        evicted.extend(entries.remove(&key));
    }

    while entries.len() >= max_entries {
        let Some(oldest) = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used())
            .map(|(key, _)| key.clone())
        else {
            break;
        };
        evicted.extend(entries.remove(&oldest));
    }
    evicted
}

struct Admission<T> {
    /// The entry now pooled under the key
    entry: T,
    evicted: Vec<T>,
    /// The candidate, when another caller pooled a live entry first
    rejected: Option<T>,
}

/// Pool `candidate` under `key` unless a live entry got there first.
fn admit<T: PoolEntry + Clone>(
    entries: &mut HashMap<String, T>,
    key: &str,
    candidate: T,
    now: Instant,
    idle_timeout: Duration,
    max_entries: usize,
) -> Admission<T> {
    if let Some(entry) = checkout(entries, key, now, idle_timeout) {
        return Admission {
            entry,
            evicted: Vec::new(),
            rejected: Some(candidate),
        };
    }

    let evicted = evict(entries, now, idle_timeout, max_entries);
    entries.insert(key.to_string(), candidate.clone());
    Admission {
        entry: candidate,
        evicted,
        rejected: None,
    }
}

#[async_trait]
impl Connector for PooledConnector {
    async fn open(&self, connection_string: &str) -> ExplorerResult<Box<dyn Session>> {
        let pooled = {
            let mut clients = self.clients.lock().await;
            checkout(&mut clients, connection_string, Instant::now(), self.idle_timeout)
        };
        if let Some(entry) = pooled {
            return Ok(Self::session(entry));
        }

        let (client, default_database) = new_client(connection_string, &self.settings).await?;
        if let Err(e) = Self::verify(&client).await {
            client.shutdown().await;
            return Err(e);
        }

        let admission = {
            let mut clients = self.clients.lock().await;
            let now = Instant::now();
            admit(
                &mut clients,
                connection_string,
                PooledClient {
                    client,
                    default_database,
                    last_used: now,
                },
                now,
                self.idle_timeout,
                self.max_clients,
            )
        };
        if let Some(rejected) = admission.rejected {
            tracing::debug!(
                "Discarding duplicate client for {}",
                redact(connection_string)
            );
            rejected.client.shutdown().await;
        }
        if !admission.evicted.is_empty() {
            tracing::debug!("Evicted {} pooled MongoDB client(s)", admission.evicted.len());
        }
        // Dropping the last handle of an evicted client releases its connections

        Ok(Self::session(admission.entry))
    }
}

//! MongoDB connection abstraction.
//! Explorer services talk to the database only through these traits, so the
//! driver-backed implementations can be swapped for in-memory doubles.

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use serde::Serialize;

use crate::error::ExplorerResult;

/// Opens request-scoped sessions from a connection string.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, connection_string: &str) -> ExplorerResult<Box<dyn Session>>;
}

/// A live handle to one deployment. Callers must `close` it on every path.
#[async_trait]
pub trait Session: Send + Sync {
    /// Database named in the connection string path, if any
    fn default_database(&self) -> Option<&str>;

    async fn list_database_names(&self) -> ExplorerResult<Vec<String>>;

    async fn list_collection_names(&self, database: &str) -> ExplorerResult<Vec<String>>;

    /// Natural-order find. A limit of 0 means no limit.
    async fn find(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        skip: u64,
        limit: i64,
    ) -> ExplorerResult<Vec<Document>>;

    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        document: Document,
    ) -> ExplorerResult<WriteOutcome>;

    async fn update_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> ExplorerResult<WriteOutcome>;

    async fn delete_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> ExplorerResult<WriteOutcome>;

    async fn close(self: Box<Self>);
}

/// Acknowledged write result, identifiers rendered as strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WriteOutcome {
    #[serde(rename_all = "camelCase")]
    Inserted {
        acknowledged: bool,
        inserted_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Updated {
        acknowledged: bool,
        matched_count: u64,
        modified_count: u64,
        upserted_count: u64,
        upserted_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Deleted {
        acknowledged: bool,
        deleted_count: u64,
    },
}

/// String form of an identifier for the response boundary.
pub fn id_to_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.clone().into_relaxed_extjson().to_string(),
    }
}

const DIRECT_SCHEME: &str = "mongodb://";
const LOOPBACK_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

/// Host list of a connection string with user info and path removed.
fn host_section(uri: &str) -> Option<&str> {
    let rest = uri.strip_prefix(DIRECT_SCHEME)?;
    let authority = rest.split(['/', '?']).next().unwrap_or_default();
    let hosts = authority
        .rsplit_once('@')
        .map_or(authority, |(_, hosts)| hosts);
    Some(hosts)
}

/// Local single-node deployments fail replica-set discovery, so a
/// non-SRV string pointing at a single loopback host connects directly.
pub fn wants_direct_connection(uri: &str) -> bool {
    let Some(hosts) = host_section(uri.trim()) else {
        return false;
    };
    let mut hosts = hosts.split(',');
    let Some(host) = hosts.next() else {
        return false;
    };
    if hosts.next().is_some() {
        return false;
    }
    let name = host.rsplit_once(':').map_or(host, |(name, _)| name);
    LOOPBACK_HOSTS
        .iter()
        .any(|loopback| name.eq_ignore_ascii_case(loopback))
}

/// Connection string with any password masked, for logging.
pub fn redact(uri: &str) -> String {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return uri.to_string();
    };
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);
    match authority.rsplit_once('@') {
        Some((user_info, hosts)) => {
            let user = user_info.split_once(':').map_or(user_info, |(u, _)| u);
            format!("{scheme}://{user}:****@{hosts}{tail}")
        }
        None => uri.to_string(),
    }
}

//! Introspection, query and mutation services.
//!
//! Every operation opens its own session and closes it before returning,
//! whether the operation succeeded or not.

use mongodb::bson::{Document, doc};
use serde::Serialize;
use std::sync::Arc;

use crate::api::{CrudPayload, QuerySpec};
use crate::config::ExplorerConfig;
use crate::connection::{Connector, Session, WriteOutcome, redact};
use crate::documents::{JsonDocument, parse_filter, serialize_documents};
use crate::error::ExplorerResult;
use crate::operations::Mutation;
use crate::schema::infer_schema;

/// Databases never shown by introspection
pub const ADMINISTRATIVE_DATABASES: [&str; 3] = ["admin", "local", "config"];
const SYSTEM_COLLECTION_PREFIX: &str = "system.";

pub fn is_administrative_database(name: &str) -> bool {
    ADMINISTRATIVE_DATABASES.contains(&name)
}

pub fn is_system_collection(name: &str) -> bool {
    name.starts_with(SYSTEM_COLLECTION_PREFIX)
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionDescriptor {
    pub name: String,
    /// Type map of the first sampled document, as JSON text
    pub schema: String,
    /// Prefix of the collection in natural order, at most `sample_size` long
    pub documents: Vec<JsonDocument>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseDescriptor {
    pub name: String,
    pub collections: Vec<CollectionDescriptor>,
}

pub struct Explorer {
    connector: Arc<dyn Connector>,
    settings: ExplorerConfig,
}

impl Explorer {
    pub fn new(connector: Arc<dyn Connector>, settings: ExplorerConfig) -> Self {
        Self {
            connector,
            settings,
        }
    }

    /// Walk every visible database and non-system collection, sampling
    /// documents from each. Any failure aborts the whole walk.
    pub async fn introspect(&self, connection_string: &str) -> ExplorerResult<Vec<DatabaseDescriptor>> {
        tracing::info!("Introspecting {}", redact(connection_string));

        let session = self.connector.open(connection_string).await?;
        let result = self.walk(session.as_ref()).await;
        session.close().await;

        if let Ok(databases) = &result {
            tracing::info!(
                "Introspection found {} database(s), {} collection(s)",
                databases.len(),
                databases.iter().map(|db| db.collections.len()).sum::<usize>()
            );
        }
        result
    }

    async fn target_databases(&self, session: &dyn Session) -> ExplorerResult<Vec<String>> {
        // An administrative path segment is usually the auth source, not a scope
        if let Some(database) = session
            .default_database()
            .filter(|name| !is_administrative_database(name))
        {
            return Ok(vec![database.to_string()]);
        }

        let names = session.list_database_names().await?;
        Ok(names
            .into_iter()
            .filter(|name| !is_administrative_database(name))
            .collect())
    }

    async fn walk(&self, session: &dyn Session) -> ExplorerResult<Vec<DatabaseDescriptor>> {
        let mut databases = Vec::new();

        for database in self.target_databases(session).await? {
            let mut names: Vec<String> = session
                .list_collection_names(&database)
                .await?
                .into_iter()
                .filter(|name| !is_system_collection(name))
                .collect();
            names.sort();

            let mut collections = Vec::with_capacity(names.len());
            for name in names {
                collections.push(self.sample_collection(session, &database, name).await?);
            }

            if collections.is_empty() {
                tracing::debug!("Skipping database '{}' with no visible collections", database);
                continue;
            }
            databases.push(DatabaseDescriptor {
                name: database,
                collections,
            });
        }

        Ok(databases)
    }

    async fn sample_collection(
        &self,
        session: &dyn Session,
        database: &str,
        name: String,
    ) -> ExplorerResult<CollectionDescriptor> {
        let documents = session
            .find(
                database,
                &name,
                Document::new(),
                0,
                i64::from(self.settings.sample_size),
            )
            .await?;
        let schema = infer_schema(documents.first());

        Ok(CollectionDescriptor {
            name,
            schema,
            documents: serialize_documents(documents),
        })
    }

    /// Run a skip-then-limit find. The filter is parsed before connecting, so
    /// malformed filter text never reaches the database.
    pub async fn query(&self, spec: &QuerySpec<'_>) -> ExplorerResult<Vec<JsonDocument>> {
        let filter = parse_filter(spec.filter)?;
        let skip = spec.skip.unwrap_or(self.settings.default_query_skip);
        let limit = spec.limit.unwrap_or(self.settings.default_query_limit);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        tracing::info!(
            "Executing find on {}.{} (skip: {}, limit: {})",
            spec.database,
            spec.collection,
            skip,
            limit
        );

        let session = self.connector.open(spec.connection_string).await?;
        let result = session
            .find(spec.database, spec.collection, filter, skip, limit)
            .await;
        session.close().await;

        Ok(serialize_documents(result?))
    }

    /// Apply one single-document write. The operation and payload are
    /// validated before connecting.
    pub async fn mutate(
        &self,
        connection_string: &str,
        database: &str,
        collection: &str,
        operation: &str,
        payload: &CrudPayload,
    ) -> ExplorerResult<WriteOutcome> {
        let mutation = Mutation::from_request(operation, payload)?;

        tracing::info!(
            "Executing {} on {}.{}",
            mutation.kind().as_str(),
            database,
            collection
        );

        let session = self.connector.open(connection_string).await?;
        let result = Self::apply(session.as_ref(), database, collection, mutation).await;
        session.close().await;
        result
    }

    async fn apply(
        session: &dyn Session,
        database: &str,
        collection: &str,
        mutation: Mutation,
    ) -> ExplorerResult<WriteOutcome> {
        match mutation {
            Mutation::InsertOne { document } => {
                session.insert_one(database, collection, document).await
            }
            Mutation::UpdateOne { id, set } => {
                session
                    .update_one(database, collection, doc! { "_id": id }, doc! { "$set": set })
                    .await
            }
            Mutation::DeleteOne { id } => {
                session
                    .delete_one(database, collection, doc! { "_id": id })
                    .await
            }
        }
    }
}

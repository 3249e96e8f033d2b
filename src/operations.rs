//! Single-document write operations accepted by `/crud`.

use mongodb::bson::{Bson, Document, oid::ObjectId};

use crate::api::CrudPayload;
use crate::documents::json_to_document;
use crate::error::{ExplorerError, ExplorerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    InsertOne,
    UpdateOne,
    DeleteOne,
}

impl MutationKind {
    pub fn from_str(s: &str) -> ExplorerResult<Self> {
        match s {
            "insertOne" => Ok(Self::InsertOne),
            "updateOne" => Ok(Self::UpdateOne),
            "deleteOne" => Ok(Self::DeleteOne),
            _ => Err(ExplorerError::UnsupportedOperation(s.to_string())),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InsertOne => "insertOne",
            Self::UpdateOne => "updateOne",
            Self::DeleteOne => "deleteOne",
        }
    }
}

/// A validated write, ready to run against a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    InsertOne { document: Document },
    UpdateOne { id: Bson, set: Document },
    DeleteOne { id: Bson },
}

/// Rebuild the native identifier from its boundary string form. Strings
/// that are not 24 hex digits are kept as string identifiers.
pub fn parse_id(id: &str) -> Bson {
    match ObjectId::parse_str(id) {
        Ok(oid) => Bson::ObjectId(oid),
        Err(_) => Bson::String(id.to_string()),
    }
}

impl Mutation {
    /// Validate the operation tag and its payload without touching the database.
    pub fn from_request(operation: &str, payload: &CrudPayload) -> ExplorerResult<Self> {
        let kind = MutationKind::from_str(operation)?;
        let id = payload.id.as_deref().filter(|id| !id.is_empty());

        match kind {
            MutationKind::InsertOne => {
                let document = payload.document.clone().ok_or_else(|| {
                    ExplorerError::InvalidRequest("Missing document for insertOne operation".into())
                })?;
                let document = json_to_document(document.into()).map_err(ExplorerError::InvalidDocument)?;
                Ok(Self::InsertOne { document })
            }
            MutationKind::UpdateOne => {
                let (Some(id), Some(document)) = (id, payload.document.clone()) else {
                    return Err(ExplorerError::InvalidRequest(
                        "Missing id or document for updateOne operation".into(),
                    ));
                };
                let mut set =
                    json_to_document(document.into()).map_err(ExplorerError::InvalidDocument)?;
                set.remove("_id");
                Ok(Self::UpdateOne {
                    id: parse_id(id),
                    set,
                })
            }
            MutationKind::DeleteOne => {
                let id = id.ok_or_else(|| {
                    ExplorerError::InvalidRequest("Missing id for deleteOne operation".into())
                })?;
                Ok(Self::DeleteOne { id: parse_id(id) })
            }
        }
    }

    pub fn kind(&self) -> MutationKind {
        match self {
            Self::InsertOne { .. } => MutationKind::InsertOne,
            Self::UpdateOne { .. } => MutationKind::UpdateOne,
            Self::DeleteOne { .. } => MutationKind::DeleteOne,
        }
    }
}

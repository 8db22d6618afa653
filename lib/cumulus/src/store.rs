// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The document store contract the core relies on.
//!
//! Records are persisted as JSON objects keyed by an opaque string id. The
//! store must be able to tell a missing document and a duplicate id apart
//! from any other failure, because the job reservation path turns the latter
//! into an ordinary "someone else got there first" answer.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// A persisted record: a JSON object.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Field under which every stored document carries its id.
pub const ID_FIELD: &str = "id";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no document {id} in {collection}")]
    NotFound { collection: String, id: String },

    #[error("document {id} already exists in {collection}")]
    DuplicateKey { collection: String, id: String },

    #[error("failed to convert document")]
    Serialization(#[from] serde_json::Error),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// A named set of documents with field-level update granularity.
///
/// Implementations must be safe to call concurrently from many threads, and
/// `insert` must be atomic with respect to the id: of two racing inserts of
/// the same id, exactly one succeeds and the other observes
/// [`StoreError::DuplicateKey`].
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    /// Inserts a new document. When `id` is `None` the store assigns a fresh
    /// one. Returns the id the document was stored under.
    fn insert(
        &self,
        id: Option<&str>,
        doc: Document,
    ) -> Result<String, StoreError>;

    fn find(&self, id: &str) -> Result<Document, StoreError>;

    /// Replaces the whole document stored under `id`.
    fn replace(&self, id: &str, doc: Document) -> Result<(), StoreError>;

    /// Sets each field of `fields` on the document stored under `id`,
    /// leaving all other fields untouched.
    fn update_fields(
        &self,
        id: &str,
        fields: Document,
    ) -> Result<(), StoreError>;

    /// Removes every document whose timestamp `field` is older than
    /// `cutoff`, returning how many were removed.
    fn remove_older_than(
        &self,
        field: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    fn ids(&self) -> Result<Vec<String>, StoreError>;
}

/// Converts a record into a document.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(doc) => Ok(doc),
        other => Err(StoreError::Backend(format!(
            "record serialized to non-object value {}",
            other
        ))),
    }
}

/// Converts a document back into a record.
pub fn from_document<T: DeserializeOwned>(
    doc: Document,
) -> Result<T, StoreError> {
    Ok(serde_json::from_value(serde_json::Value::Object(doc))?)
}

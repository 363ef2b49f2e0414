// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer: the document store seam and its backends.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
}

/// A value in a merge write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    String(String),
    /// Resolved to the store's clock at write time.
    ServerTimestamp,
    /// Like `ServerTimestamp`, but leaves an existing value untouched.
    ServerTimestampOnCreate,
}

impl FieldValue {
    /// Absent and empty strings both become `Null`.
    pub fn from_optional(value: Option<&str>) -> Self {
        match value {
            Some(s) if !s.is_empty() => FieldValue::String(s.to_string()),
            _ => FieldValue::Null,
        }
    }
}

/// Field name to value, for a single merge write.
pub type Fields = BTreeMap<String, FieldValue>;

/// A document store supporting keyed merge writes.
///
/// A merge write touches only the named fields; everything else on the
/// document is preserved. The document is created if missing.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn merge_write(&self, collection: &str, key: &str, fields: Fields)
        -> Result<(), AppError>;
}

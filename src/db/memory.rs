// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process document store.
//!
//! Implements the same merge semantics as Firestore so the service can run
//! (and be tested) without a database. The store's own monotonic clock plays
//! the role of the server clock for timestamp sentinels.

use super::{collections, DocumentStore, FieldValue, Fields};
use crate::error::AppError;
use crate::models::profile::{fields, UserProfileDocument};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A stored field value, with sentinels already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    Null,
    String(String),
    Timestamp(DateTime<Utc>),
}

impl StoredValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StoredValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            StoredValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

pub type StoredDocument = BTreeMap<String, StoredValue>;

/// In-memory document store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    docs: DashMap<(String, String), StoredDocument>,
    writes: AtomicUsize,
    last_tick: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a copy of a document.
    pub fn get(&self, collection: &str, key: &str) -> Option<StoredDocument> {
        self.inner
            .docs
            .get(&(collection.to_string(), key.to_string()))
            .map(|doc| doc.value().clone())
    }

    /// Fetch a user profile by uid.
    pub fn get_profile(&self, uid: &str) -> Option<UserProfileDocument> {
        let doc = self.get(collections::USERS, uid)?;
        let text = |name: &str| doc.get(name).and_then(StoredValue::as_str).map(String::from);
        let time = |name: &str| doc.get(name).and_then(StoredValue::as_timestamp);

        Some(UserProfileDocument {
            uid: text(fields::UID).unwrap_or_else(|| uid.to_string()),
            email: text(fields::EMAIL),
            display_name: text(fields::DISPLAY_NAME),
            photo_url: text(fields::PHOTO_URL),
            created_at: time(fields::CREATED_AT),
            last_seen_at: time(fields::LAST_SEEN_AT),
        })
    }

    /// Number of merge writes applied since creation.
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Number of stored documents across all collections.
    pub fn len(&self) -> usize {
        self.inner.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.docs.is_empty()
    }

    /// Current store time. Strictly increasing across calls.
    fn tick(&self) -> DateTime<Utc> {
        let mut last = self
            .inner
            .last_tick
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + Duration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn merge_write(
        &self,
        collection: &str,
        key: &str,
        fields: Fields,
    ) -> Result<(), AppError> {
        if key.is_empty() {
            return Err(AppError::Database("Document key must not be empty".to_string()));
        }

        let now = self.tick();
        let mut entry = self
            .inner
            .docs
            .entry((collection.to_string(), key.to_string()))
            .or_default();
        let doc = entry.value_mut();

        for (name, value) in fields {
            match value {
                FieldValue::Null => {
                    doc.insert(name, StoredValue::Null);
                }
                FieldValue::String(s) => {
                    doc.insert(name, StoredValue::String(s));
                }
                FieldValue::ServerTimestamp => {
                    doc.insert(name, StoredValue::Timestamp(now));
                }
                FieldValue::ServerTimestampOnCreate => {
                    doc.entry(name).or_insert(StoredValue::Timestamp(now));
                }
            }
        }
        drop(entry);

        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(collection, key, "Merged document in memory");
        Ok(())
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile upserts: keep `users/{uid}` in step with sign-ins.

use crate::config::CreatedAtPolicy;
use crate::db::{collections, DocumentStore, FieldValue, Fields};
use crate::error::AppError;
use crate::models::profile::fields;
use crate::models::UserIdentity;
use std::sync::Arc;

/// Writes the signed-in user's profile document.
#[derive(Clone)]
pub struct ProfileUpserter {
    store: Arc<dyn DocumentStore>,
    created_at_policy: CreatedAtPolicy,
}

impl ProfileUpserter {
    pub fn new(store: Arc<dyn DocumentStore>, created_at_policy: CreatedAtPolicy) -> Self {
        Self {
            store,
            created_at_policy,
        }
    }

    /// Merge the identity into its profile document.
    ///
    /// Returns `false` without touching the store when the identity has no
    /// uid. Store failures are returned as-is; nothing is retried.
    pub async fn upsert(&self, identity: &UserIdentity) -> Result<bool, AppError> {
        if !identity.has_uid() {
            tracing::debug!("Identity without uid, skipping profile upsert");
            return Ok(false);
        }

        self.store
            .merge_write(collections::USERS, &identity.uid, self.profile_fields(identity))
            .await?;

        tracing::info!(uid = %identity.uid, "User profile upserted");
        Ok(true)
    }

    fn profile_fields(&self, identity: &UserIdentity) -> Fields {
        let created_at = match self.created_at_policy {
            CreatedAtPolicy::Preserve => FieldValue::ServerTimestampOnCreate,
            CreatedAtPolicy::Overwrite => FieldValue::ServerTimestamp,
        };

        Fields::from([
            (
                fields::UID.to_string(),
                FieldValue::String(identity.uid.clone()),
            ),
            (
                fields::EMAIL.to_string(),
                FieldValue::from_optional(identity.email.as_deref()),
            ),
            (
                fields::DISPLAY_NAME.to_string(),
                FieldValue::from_optional(identity.display_name.as_deref()),
            ),
            (
                fields::PHOTO_URL.to_string(),
                FieldValue::from_optional(identity.photo_url.as_deref()),
            ),
            (fields::CREATED_AT.to_string(), created_at),
            (fields::LAST_SEEN_AT.to_string(), FieldValue::ServerTimestamp),
        ])
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Merge writes map onto Firestore updates with a field mask: only the
//! named fields are written, everything else on the document survives.
//! Timestamp sentinels become `REQUEST_TIME` field transforms so the
//! server clock is used. Create-only stamps run in a transaction that
//! reads the document first.

use super::{collections, DocumentStore, FieldValue, Fields};
use crate::error::AppError;
use crate::models::UserProfileDocument;
use async_trait::async_trait;
use firestore::errors::FirestoreError;
use firestore::{FirestoreResult, FirestoreTransformServerValue};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Profile Operations ──────────────────────────────────────

    /// Get a user profile by uid.
    pub async fn get_profile(&self, uid: &str) -> Result<Option<UserProfileDocument>, AppError> {
        self.get_document(collections::USERS, uid).await
    }

    /// Get any document, deserialized as `T`.
    pub async fn get_document<T>(&self, collection: &str, key: &str) -> Result<Option<T>, AppError>
    where
        T: DeserializeOwned + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(key)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Merge write with create-only stamps, retried while the transaction
    /// is contended.
    async fn merge_write_in_transaction(
        &self,
        collection: &str,
        key: &str,
        plan: &WritePlan,
    ) -> Result<Vec<String>, AppError> {
        let client = self.get_client()?;
        let mut attempt = 1;

        loop {
            match try_merge_in_transaction(client, collection, key, plan).await {
                Ok(stamps) => return Ok(stamps),
                Err(FirestoreError::DatabaseError(e))
                    if e.retry_possible && attempt < MAX_TRANSACTION_ATTEMPTS =>
                {
                    tracing::warn!(
                        collection,
                        key,
                        attempt,
                        error = %e.details,
                        "Transaction contended, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => {
                    return Err(AppError::Database(format!("Transaction failed: {}", e)));
                }
            }
        }
    }
}

const MAX_TRANSACTION_ATTEMPTS: usize = 5;

/// One read-then-write attempt. The read is bound to the transaction, so a
/// concurrent writer to the same document makes the commit fail instead of
/// both writers stamping.
async fn try_merge_in_transaction(
    client: &firestore::FirestoreDb,
    collection: &str,
    key: &str,
    plan: &WritePlan,
) -> FirestoreResult<Vec<String>> {
    let mut transaction = client.begin_transaction().await?;

    let reader = client.clone_with_consistency_selector(
        firestore::FirestoreConsistencySelector::Transaction(
            transaction.transaction_id().clone(),
        ),
    );
    let existing = match reader.fluent().select().by_id_in(collection).one(key).await {
        Ok(doc) => doc
            .map(|doc| doc.fields.into_keys().collect::<Vec<_>>())
            .unwrap_or_default(),
        Err(e) => {
            let _ = transaction.rollback().await;
            return Err(e);
        }
    };

    let stamps = plan.timestamps(&existing);
    let added = client
        .fluent()
        .update()
        .fields(plan.values.keys())
        .in_col(collection)
        .document_id(key)
        .transforms(|t| {
            t.fields(stamps.iter().map(|name| {
                t.field(name.as_str())
                    .server_value(FirestoreTransformServerValue::RequestTime)
            }))
        })
        .object(&plan.values)
        .add_to_transaction(&mut transaction)
        .map(|_| ());
    if let Err(e) = added {
        let _ = transaction.rollback().await;
        return Err(e);
    }

    transaction.commit().await?;
    Ok(stamps)
}

/// A merge write split into plain values and server-time transforms.
#[derive(Debug, Default, PartialEq)]
struct WritePlan {
    values: BTreeMap<String, Option<String>>,
    stamped: Vec<String>,
    stamped_on_create: Vec<String>,
}

impl WritePlan {
    fn from_fields(fields: Fields) -> Self {
        let mut plan = WritePlan::default();
        for (name, value) in fields {
            match value {
                FieldValue::Null => {
                    plan.values.insert(name, None);
                }
                FieldValue::String(s) => {
                    plan.values.insert(name, Some(s));
                }
                FieldValue::ServerTimestamp => plan.stamped.push(name),
                FieldValue::ServerTimestampOnCreate => plan.stamped_on_create.push(name),
            }
        }
        plan
    }

    /// Fields to stamp with the server time, given what the document already has.
    fn timestamps(&self, existing: &[String]) -> Vec<String> {
        self.stamped
            .iter()
            .chain(
                self.stamped_on_create
                    .iter()
                    .filter(|name| !existing.contains(*name)),
            )
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DocumentStore for FirestoreDb {
    async fn merge_write(
        &self,
        collection: &str,
        key: &str,
        fields: Fields,
    ) -> Result<(), AppError> {
        let plan = WritePlan::from_fields(fields);

        let stamps = if plan.stamped_on_create.is_empty() {
            let stamps = plan.timestamps(&[]);
            let _: () = self
                .get_client()?
                .fluent()
                .update()
                .fields(plan.values.keys())
                .in_col(collection)
                .document_id(key)
                .transforms(|t| {
                    t.fields(stamps.iter().map(|name| {
                        t.field(name.as_str())
                            .server_value(FirestoreTransformServerValue::RequestTime)
                    }))
                })
                .object(&plan.values)
                .execute()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            stamps
        } else {
            self.merge_write_in_transaction(collection, key, &plan).await?
        };

        tracing::debug!(
            collection,
            key,
            fields = plan.values.len(),
            stamps = stamps.len(),
            "Merged document"
        );

        Ok(())
    }
}

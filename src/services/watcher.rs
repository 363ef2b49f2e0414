// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Auth watcher: turns sign-in events into profile upserts.

use super::auth_state::{IdentityProvider, Subscription};
use super::profile::ProfileUpserter;
use crate::error::AppError;
use tokio::runtime::Handle;

/// Keeps a listener on an identity provider for as long as it is mounted.
///
/// Each sign-in event spawns one upsert on the runtime the watcher was
/// mounted from. Delivery never waits for the write, and failed writes
/// are logged, not retried. Unmounting stops new upserts but leaves
/// in-flight ones to finish.
#[derive(Debug)]
pub struct AuthWatcher {
    subscription: Subscription,
}

impl AuthWatcher {
    /// Subscribe to `provider`. Must be called from within a tokio runtime.
    pub fn mount<P>(provider: &P, upserter: ProfileUpserter) -> Result<Self, AppError>
    where
        P: IdentityProvider + ?Sized,
    {
        let runtime = Handle::try_current()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("No async runtime: {e}")))?;

        let subscription = provider.subscribe(Box::new(move |identity| {
            let Some(identity) = identity else {
                return;
            };

            let upserter = upserter.clone();
            runtime.spawn(async move {
                if let Err(e) = upserter.upsert(&identity).await {
                    tracing::error!(
                        uid = %identity.uid,
                        error = %e,
                        "Profile upsert failed"
                    );
                }
            });
        }));

        tracing::info!("Auth watcher mounted");
        Ok(Self { subscription })
    }

    /// Deregister from the provider. No upserts start after this returns.
    pub fn unmount(self) {
        self.subscription.unsubscribe();
        tracing::info!("Auth watcher unmounted");
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication state events and the in-process identity provider.
//!
//! Listeners receive `Some(identity)` when a user signs in and `None` when
//! one signs out. A [`Subscription`] keeps its listener registered until it
//! is unsubscribed or dropped; once that returns, the listener is never
//! called again.

use crate::models::UserIdentity;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Callback invoked on every authentication state change.
pub type AuthListener = Box<dyn Fn(Option<UserIdentity>) + Send + Sync>;

/// Source of authentication state changes.
pub trait IdentityProvider: Send + Sync {
    /// Register a listener. It stays registered while the returned
    /// subscription is alive.
    fn subscribe(&self, listener: AuthListener) -> Subscription;
}

/// Handle for a registered listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Deregister the listener now.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// A registered listener. Cleared under the write lock on unsubscribe,
/// which waits out any delivery in progress.
struct ListenerSlot {
    listener: RwLock<Option<AuthListener>>,
}

#[derive(Default)]
struct ChannelInner {
    listeners: DashMap<u64, Arc<ListenerSlot>>,
    next_id: AtomicU64,
}

/// In-process identity provider: whoever verifies a sign-in publishes it
/// here, and every subscribed listener is told.
///
/// Listeners are called synchronously on the publishing thread, so they
/// should hand off real work. A listener must not drop its own
/// subscription from inside the callback.
#[derive(Clone, Default)]
pub struct AuthStateChannel {
    inner: Arc<ChannelInner>,
}

impl AuthStateChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every current listener.
    ///
    /// Returns the number of listeners notified.
    pub fn publish(&self, identity: Option<UserIdentity>) -> usize {
        // Snapshot so no map shard lock is held while listeners run.
        let slots: Vec<Arc<ListenerSlot>> = self
            .inner
            .listeners
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut notified = 0;
        for slot in slots {
            let guard = slot
                .listener
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(listener) = guard.as_ref() {
                listener(identity.clone());
                notified += 1;
            }
        }

        tracing::debug!(
            signed_in = identity.is_some(),
            listeners = notified,
            "Published auth state change"
        );
        notified
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl IdentityProvider for AuthStateChannel {
    fn subscribe(&self, listener: AuthListener) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(ListenerSlot {
            listener: RwLock::new(Some(listener)),
        });
        self.inner.listeners.insert(id, slot);
        tracing::debug!(subscription = id, "Auth listener subscribed");

        let inner = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            if let Some((_, slot)) = inner.listeners.remove(&id) {
                *slot
                    .listener
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
            }
            tracing::debug!(subscription = id, "Auth listener unsubscribed");
        })
    }
}

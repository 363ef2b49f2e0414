// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod auth_state;
pub mod firebase_auth;
pub mod profile;
pub mod watcher;

pub use auth_state::{AuthListener, AuthStateChannel, IdentityProvider, Subscription};
pub use firebase_auth::{FirebaseTokenVerifier, TokenError};
pub use profile::ProfileUpserter;
pub use watcher::AuthWatcher;

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Vayu profile sync: keep a user profile document in step with sign-ins.
//!
//! Verified Firebase sign-ins are published as authentication state
//! events; a mounted auth watcher turns each one into a merge write of
//! `users/{uid}` in Firestore.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use services::{AuthStateChannel, FirebaseTokenVerifier};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub auth_events: AuthStateChannel,
    pub token_verifier: Arc<FirebaseTokenVerifier>,
}

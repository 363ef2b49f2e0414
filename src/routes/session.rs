// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session routes: clients report Firebase sign-in and sign-out here.

use crate::error::{AppError, Result};
use crate::AppState;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Session routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/session", post(sign_in))
        .route("/auth/signout", post(sign_out))
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub uid: String,
    /// Listeners that received the sign-in event
    pub listeners: usize,
}

/// POST /auth/session - Publish a verified sign-in.
///
/// The profile write happens asynchronously; this returns once the event
/// has been handed to the listeners.
async fn sign_in(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or(AppError::Unauthorized)?;

    let identity = state.token_verifier.verify_bearer(Some(auth_header)).await?;
    let uid = identity.uid.clone();

    let listeners = state.auth_events.publish(Some(identity));
    tracing::info!(uid = %uid, listeners, "Sign-in published");

    Ok((StatusCode::ACCEPTED, Json(SessionResponse { uid, listeners })))
}

/// POST /auth/signout - Publish a sign-out.
async fn sign_out(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or(AppError::Unauthorized)?;

    let identity = state.token_verifier.verify_bearer(Some(auth_header)).await?;

    let listeners = state.auth_events.publish(None);
    tracing::info!(uid = %identity.uid, listeners, "Sign-out published");

    Ok(StatusCode::NO_CONTENT)
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;

/// How the profile's `createdAt` timestamp is treated on repeat sign-ins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CreatedAtPolicy {
    /// Stamp `createdAt` only when the document does not carry one yet.
    #[default]
    Preserve,
    /// Re-stamp `createdAt` on every write.
    Overwrite,
}

impl FromStr for CreatedAtPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preserve" => Ok(Self::Preserve),
            "overwrite" => Ok(Self::Overwrite),
            _ => Err(ConfigError::Invalid("PROFILE_CREATED_AT", s.to_string())),
        }
    }
}

/// Which document store backs the profile collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreBackend {
    #[default]
    Firestore,
    /// In-process store, for local runs without Firestore.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("STORE_BACKEND", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Firebase project ID (expected ID token audience)
    pub firebase_project_id: String,
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    pub created_at_policy: CreatedAtPolicy,
    pub store_backend: StoreBackend,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            gcp_project_id: "test-project".to_string(),
            firebase_project_id: "test-project".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            created_at_policy: CreatedAtPolicy::Preserve,
            store_backend: StoreBackend::Memory,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file is honored for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let gcp_project_id =
            env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string());

        Ok(Self {
            firebase_project_id: env::var("FIREBASE_PROJECT_ID")
                .unwrap_or_else(|_| gcp_project_id.clone()),
            gcp_project_id,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            created_at_policy: match env::var("PROFILE_CREATED_AT") {
                Ok(v) => v.parse()?,
                Err(_) => CreatedAtPolicy::default(),
            },
            store_backend: match env::var("STORE_BACKEND") {
                Ok(v) => v.parse()?,
                Err(_) => StoreBackend::default(),
            },
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}

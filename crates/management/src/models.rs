//! Envelope and auth DTOs for the admin API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Uniform response envelope consumed by the admin UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: Option<T>,
    pub message: String,
    pub error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            data: Some(data),
            message: message.into(),
            error: None,
        }
    }

    pub fn err(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            data: None,
            message: message.into(),
            error: Some(code.into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

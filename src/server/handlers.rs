//! HTTP request handlers for the image conversion API.
//!
//! # Endpoints
//!
//! - `POST /{source}/{target}` - Convert the request body between formats
//! - `POST /users` - Create or update the caller's profile
//! - `GET /users/{auth_id}` - Fetch the caller's profile
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::codec::Conversion;
use crate::convert::{ConversionRequest, ConversionService};
use crate::error::{CodecError, ConversionError, StorageError};
use crate::store::{AccountStore, UserProfile};

use super::auth::Principal;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the conversion service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<S: AccountStore> {
    /// The conversion pipeline, which also owns the account store
    pub service: Arc<ConversionService<S>>,
}

impl<S: AccountStore> AppState<S> {
    pub fn new(service: ConversionService<S>) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    fn store(&self) -> &S {
        self.service.store()
    }
}

impl<S: AccountStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "quota_exceeded", "invalid_image")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "unhealthy"
    pub status: String,

    /// Service version
    pub version: String,
}

/// Log an error response by severity and build its JSON body.
fn error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Resource not found: {}",
            message
        );
    } else {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let error_response = ErrorResponse::with_status(error_type, message, status);
    (status, Json(error_response)).into_response()
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Each conversion error maps to exactly one status.
///
/// | Error | Status |
/// |-------|--------|
/// | `Storage` | 403 |
/// | `QuotaExceeded` | 403 |
/// | `PayloadTooLarge` | 413 |
/// | `Timeout` | 408 |
/// | `Read` | 400 |
/// | `Codec::DecodeFailed` | 400 |
/// | other `Codec` | 500 |
/// | `Recording` | 500 |
impl IntoResponse for ConversionError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ConversionError::Storage(storage_err) => {
                // Details stay in the log; the caller only learns it was refused
                error!(error = %storage_err, "Quota lookup failed");
                (
                    StatusCode::FORBIDDEN,
                    "permission_check_failed",
                    "Unable to verify conversion permissions".to_string(),
                )
            }

            ConversionError::QuotaExceeded { .. } => {
                (StatusCode::FORBIDDEN, "quota_exceeded", self.to_string())
            }

            ConversionError::PayloadTooLarge { .. } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                self.to_string(),
            ),

            ConversionError::Timeout { .. } => (
                StatusCode::REQUEST_TIMEOUT,
                "request_timeout",
                self.to_string(),
            ),

            ConversionError::Read { .. } => {
                (StatusCode::BAD_REQUEST, "read_error", self.to_string())
            }

            ConversionError::Codec(CodecError::DecodeFailed { .. }) => {
                (StatusCode::BAD_REQUEST, "invalid_image", self.to_string())
            }

            ConversionError::Codec(CodecError::EncodeFailed { .. }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "encode_error",
                self.to_string(),
            ),

            ConversionError::Codec(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "unsupported_conversion",
                self.to_string(),
            ),

            ConversionError::Recording(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "recording_error",
                "Conversion succeeded but could not be recorded".to_string(),
            ),
        };

        error_response(status, error_type, message)
    }
}

/// Errors from the user profile endpoints.
#[derive(Debug, Error)]
pub enum UserError {
    /// The caller asked for someone else's profile
    #[error("Cannot access the profile of another user")]
    Forbidden,

    #[error("User not found: {0}")]
    NotFound(String),

    /// The request body is not a valid profile document
    #[error("Invalid profile: {0}")]
    InvalidBody(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl IntoResponse for UserError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            UserError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            UserError::NotFound(_) | UserError::Storage(StorageError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            UserError::InvalidBody(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            UserError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        };

        error_response(status, error_type, self.to_string())
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle a conversion request for one registered pair.
///
/// # Endpoint
///
/// `POST /{source}/{target}`, one route per registered conversion. The
/// request's Content-Type is ignored; the route decides the source format.
///
/// # Response
///
/// - `200 OK`: the converted image with the target's Content-Type
/// - `400 Bad Request`: the body is not a valid source image, or unreadable
/// - `401 Unauthorized`: missing or invalid bearer token (middleware)
/// - `403 Forbidden`: quota exhausted, or quota could not be checked
/// - `408 Request Timeout`: the upload was too slow
/// - `413 Payload Too Large`: the upload exceeds the plan's file size
/// - `500 Internal Server Error`: encoding or usage recording failed
pub async fn convert_handler<S: AccountStore>(
    state: AppState<S>,
    principal: Principal,
    conversion: Conversion,
    body: Body,
) -> Result<Response, ConversionError> {
    let request = ConversionRequest::new(principal.subject, conversion, body);
    let response = state.service.convert(request).await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, response.content_type)],
        response.data,
    )
        .into_response())
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` when the account store answers a ping, `503 Service Unavailable`
/// otherwise:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler<S: AccountStore>(State(state): State<AppState<S>>) -> Response {
    let version = env!("CARGO_PKG_VERSION").to_string();

    match state.store().ping().await {
        Ok(()) => Json(HealthResponse {
            status: "healthy".to_string(),
            version,
        })
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    version,
                }),
            )
                .into_response()
        }
    }
}

/// Create or update the caller's profile.
///
/// # Endpoint
///
/// `POST /users` with a JSON body:
/// ```json
/// {
///   "auth_id": "auth0|1234",
///   "name": "Ada",
///   "email": "ada@example.com",
///   "account_type_id": "1"
/// }
/// ```
///
/// `auth_id` must be the caller's own subject. `account_type_id` is the
/// numeric id of an account type.
pub async fn upsert_user_handler<S: AccountStore>(
    State(state): State<AppState<S>>,
    principal: Principal,
    body: Bytes,
) -> Result<Json<UserProfile>, UserError> {
    let profile: UserProfile =
        serde_json::from_slice(&body).map_err(|e| UserError::InvalidBody(e.to_string()))?;

    if profile.auth_id != principal.subject {
        return Err(UserError::Forbidden);
    }

    if profile.account_type_id.trim().parse::<i32>().is_err() {
        return Err(UserError::InvalidBody(format!(
            "account_type_id must be a numeric id, got {:?}",
            profile.account_type_id
        )));
    }

    state.store().upsert_user(&profile).await?;
    info!(subject = %principal.subject, "Saved user profile");

    Ok(Json(profile))
}

/// Fetch the caller's profile.
///
/// # Endpoint
///
/// `GET /users/{auth_id}`
pub async fn get_user_handler<S: AccountStore>(
    State(state): State<AppState<S>>,
    principal: Principal,
    Path(auth_id): Path<String>,
) -> Result<Json<UserProfile>, UserError> {
    if auth_id != principal.subject {
        return Err(UserError::Forbidden);
    }

    state
        .store()
        .find_user(&auth_id)
        .await?
        .map(Json)
        .ok_or(UserError::NotFound(auth_id))
}

// =============================================================================
// Tests
// =============================================================================

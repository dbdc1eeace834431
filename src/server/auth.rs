//! Bearer token authentication.
//!
//! Every conversion and user route requires `Authorization: Bearer <token>`,
//! where the token is a JWS issued by the trusted identity provider.
//!
//! # Verification
//!
//! 1. The signing key is looked up by the token header's `kid` through a
//!    [`KeySource`]; the key's algorithm must match the header's `alg`
//! 2. The signature is checked with `jsonwebtoken`
//! 3. Claims are checked in a fixed order, first failure wins:
//!
//! ```text
//! aud  ─▶  iss  ─▶  exp  ─▶  sub
//! ```
//!
//! - `aud` equals the configured audience, or contains it when an array
//! - `iss` equals `https://<domain>/` exactly
//! - `exp`, when present, is strictly in the future; a token without `exp`
//!   is accepted
//! - `sub` is present and non-empty, and becomes [`Principal::subject`]
//!
//! On success the middleware attaches a [`Principal`] to the request
//! extensions. Handlers read it back with the [`Principal`] extractor.

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, decode_header, get_current_timestamp, Validation};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::handlers::ErrorResponse;
use super::keys::KeySource;

// =============================================================================
// Types
// =============================================================================

/// Verified identity of the caller for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
}

/// Which claim check rejected a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimFailure {
    Audience,
    Issuer,
    Expired,
    Subject,
}

impl fmt::Display for ClaimFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimFailure::Audience => write!(f, "audience does not match"),
            ClaimFailure::Issuer => write!(f, "issuer is not trusted"),
            ClaimFailure::Expired => write!(f, "token has expired"),
            ClaimFailure::Subject => write!(f, "subject is missing"),
        }
    }
}

/// Authentication error types.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// No Authorization header, or an empty one
    #[error("Missing bearer token")]
    Missing,

    /// The token is malformed, unsigned by a trusted key, or not a bearer token
    #[error("Invalid token: {0}")]
    Invalid(String),

    /// The signature is valid but a claim check failed
    #[error("Invalid token claims: {0}")]
    InvalidClaims(ClaimFailure),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = StatusCode::UNAUTHORIZED;
        let error_type = match &self {
            AuthError::Missing => "missing_token",
            AuthError::Invalid(_) => "invalid_token",
            AuthError::InvalidClaims(_) => "invalid_claims",
        };
        let message = self.to_string();

        // A bad signature may be an attack; missing and expired tokens are routine
        match &self {
            AuthError::Invalid(_) => {
                warn!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Authentication failed: {}",
                    message
                );
            }
            _ => {
                debug!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Authentication failed: {}",
                    message
                );
            }
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        let mut response = (status, Json(error_response)).into_response();
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        response
    }
}

// =============================================================================
// Claims
// =============================================================================

/// `aud` may be a single string or an array of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::One(aud) => aud == expected,
            Audience::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    aud: Option<Audience>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    exp: Option<f64>,
    #[serde(default)]
    sub: Option<String>,
}

// =============================================================================
// Identity Verifier
// =============================================================================

/// Verifies bearer tokens against a trusted key source and claim policy.
#[derive(Clone)]
pub struct IdentityVerifier {
    keys: Arc<dyn KeySource>,
    issuer: String,
    audience: String,
}

impl IdentityVerifier {
    /// Create a verifier trusting tokens issued by `https://<domain>/` for
    /// `audience`.
    pub fn new(keys: Arc<dyn KeySource>, domain: &str, audience: impl Into<String>) -> Self {
        Self {
            keys,
            issuer: format!("https://{}/", domain.trim_end_matches('/')),
            audience: audience.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Verify a raw `Authorization` header value.
    pub fn verify(&self, authorization: Option<&str>) -> Result<Principal, AuthError> {
        let value = authorization
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(AuthError::Missing)?;

        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AuthError::Invalid("expected a Bearer token".to_string()))?;

        self.verify_token(token, get_current_timestamp())
    }

    /// Verify a compact token at time `now` (Unix seconds).
    pub fn verify_token(&self, token: &str, now: u64) -> Result<Principal, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::Invalid(e.to_string()))?;

        let kid = header
            .kid
            .ok_or_else(|| AuthError::Invalid("token has no key id".to_string()))?;
        let key = self
            .keys
            .key_for_id(&kid)
            .ok_or_else(|| AuthError::Invalid(format!("unknown key id {}", kid)))?;

        if header.alg != key.algorithm {
            return Err(AuthError::Invalid(format!(
                "algorithm {:?} does not match key {}",
                header.alg, kid
            )));
        }

        // Signature only; claims are checked below in a fixed order
        let mut validation = Validation::new(key.algorithm);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        let data = decode::<Claims>(token, &key.key, &validation)
            .map_err(|e| AuthError::Invalid(e.to_string()))?;

        self.check_claims(data.claims, now)
    }

    fn check_claims(&self, claims: Claims, now: u64) -> Result<Principal, AuthError> {
        let audience_ok = claims
            .aud
            .as_ref()
            .is_some_and(|aud| aud.contains(&self.audience));
        if !audience_ok {
            return Err(AuthError::InvalidClaims(ClaimFailure::Audience));
        }

        if claims.iss.as_deref() != Some(self.issuer.as_str()) {
            return Err(AuthError::InvalidClaims(ClaimFailure::Issuer));
        }

        if let Some(exp) = claims.exp {
            if exp <= now as f64 {
                return Err(AuthError::InvalidClaims(ClaimFailure::Expired));
            }
        }

        match claims.sub {
            Some(subject) if !subject.is_empty() => Ok(Principal { subject }),
            _ => Err(AuthError::InvalidClaims(ClaimFailure::Subject)),
        }
    }
}

// =============================================================================
// Axum Middleware
// =============================================================================

/// Axum middleware requiring a verified bearer token.
///
/// ```ignore
/// let app = Router::new()
///     .route("/png/jpeg", post(handler))
///     .route_layer(middleware::from_fn_with_state(verifier, auth_middleware));
/// ```
pub async fn auth_middleware(
    State(verifier): State<IdentityVerifier>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let authorization = match request.headers().get(header::AUTHORIZATION) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| AuthError::Invalid("header is not valid ASCII".to_string()))?,
        ),
        None => None,
    };

    let principal = verifier.verify(authorization)?;
    debug!(subject = %principal.subject, "Authenticated request");

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Rejection when a handler runs without a verified principal.
#[derive(Debug, Clone, Copy)]
pub struct MissingPrincipal;

impl IntoResponse for MissingPrincipal {
    fn into_response(self) -> Response {
        let status = StatusCode::BAD_REQUEST;
        warn!(status = status.as_u16(), "Request reached handler without a principal");

        let error_response = ErrorResponse::with_status(
            "missing_principal",
            "No authenticated caller for this request",
            status,
        );
        (status, Json(error_response)).into_response()
    }
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = MissingPrincipal;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(MissingPrincipal)
    }
}

// =============================================================================
// Tests
// =============================================================================

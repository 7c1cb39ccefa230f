use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;

use super::{BearerToken, TokenHasher};
use crate::server::AppState;
use crate::store::AccessTokenRepository;
use crate::types::AccessToken;

/// The caller a request was admitted as.
#[derive(Debug, Clone)]
pub enum Identity {
    Token(AccessToken),
    /// No tokens exist yet; every request is admitted.
    Development,
}

/// Extractor that requires a valid bearer token.
pub struct RequireToken(pub Identity);

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Token is required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                "WWW-Authenticate",
                axum::http::HeaderValue::from_static("Bearer realm=\"ats\""),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireToken {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let identity = resolve_identity(state, auth_header)?;
        Ok(RequireToken(identity))
    }
}

/// Extracts the token from a `Bearer` Authorization header.
/// Returns None if no header is present.
pub fn extract_bearer_token(auth_header: Option<&str>) -> Result<Option<String>, AuthError> {
    match auth_header {
        Some(header) => header
            .strip_prefix("Bearer ")
            .map(|token| Some(token.trim().to_string()))
            .ok_or(AuthError::InvalidScheme),
        None => Ok(None),
    }
}

fn resolve_identity(state: &AppState, auth_header: Option<&str>) -> Result<Identity, AuthError> {
    let raw_token = extract_bearer_token(auth_header)?;
    let lookup = raw_token
        .as_deref()
        .and_then(|raw| BearerToken::parse(raw).ok())
        .map(|bearer| bearer.lookup.to_string());

    let (active, token) = state
        .store
        .unit_of_work(|uow| {
            let tokens = uow.access_tokens();
            let active = tokens.count_active()?;
            let token = match &lookup {
                Some(lookup) => tokens.get_by_identifier(lookup)?,
                None => None,
            };
            Ok((active, token))
        })
        .map_err(|e| {
            tracing::error!("Failed to load access token: {e}");
            AuthError::InternalError
        })?;

    if active == 0 {
        tracing::warn!("No access tokens configured; admitting request as development identity");
        return Ok(Identity::Development);
    }

    let raw_token = raw_token.ok_or(AuthError::MissingAuth)?;
    let token = token
        .filter(|t| !t.deleted)
        .ok_or(AuthError::InvalidToken)?;

    let matches = TokenHasher::new()
        .matches(&raw_token, &token)
        .map_err(|e| {
            tracing::error!(identifier = %token.identifier, "Failed to verify access token: {e}");
            AuthError::InternalError
        })?;
    if !matches {
        return Err(AuthError::InvalidToken);
    }

    if token.is_expired(Utc::now()) {
        return Err(AuthError::TokenExpired);
    }

    Ok(Identity::Token(token))
}

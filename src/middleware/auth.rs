// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT caller resolution.
//!
//! The middleware only resolves who is calling. Whether an operation needs
//! a caller is decided by the service, which fails with
//! `AppError::Unauthenticated` when [`Caller::require`] finds nobody.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "fitforge_token";

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Authenticated user extracted from JWT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

/// Identity of whoever is calling the service, if anyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller(Option<AuthUser>);

impl Caller {
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self(Some(AuthUser {
            user_id: user_id.into(),
        }))
    }

    /// The authenticated user, or `Unauthenticated`.
    pub fn require(&self) -> Result<&AuthUser, AppError> {
        self.0.as_ref().ok_or(AppError::Unauthenticated)
    }

    pub fn is_authenticated(&self) -> bool {
        self.0.is_some()
    }
}

/// Verify a session token and return the user it was issued to.
pub fn verify_jwt(token: &str, signing_key: &[u8]) -> Result<AuthUser, AppError> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);

    let token_data =
        decode::<Claims>(token, &key, &validation).map_err(|_| AppError::InvalidToken)?;

    if token_data.claims.sub.is_empty() {
        return Err(AppError::InvalidToken);
    }

    Ok(AuthUser {
        user_id: token_data.claims.sub,
    })
}

/// Middleware that resolves the caller from the session cookie or Bearer header.
///
/// Requests without a token continue as anonymous; a token that fails
/// verification is rejected outright.
pub async fn resolve_caller(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Try cookie first, then header
    let token = if let Some(cookie) = jar.get(SESSION_COOKIE) {
        Some(cookie.value().to_string())
    } else {
        request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_string)
    };

    let caller = match token {
        Some(token) => {
            let user = verify_jwt(&token, &state.config.jwt_signing_key)?;
            Caller(Some(user))
        }
        None => Caller::anonymous(),
    };

    request.extensions_mut().insert(caller);

    Ok(next.run(request).await)
}

/// Create a JWT for a user session.
pub fn create_jwt(user_id: &str, signing_key: &[u8]) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + 30 * 24 * 60 * 60, // 30 days
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}

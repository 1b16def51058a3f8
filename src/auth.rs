//! Bearer-token authentication against the external identity provider.
//! The resolved user id becomes the owner partition for every request.

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::api::error_response;
use crate::config;
use crate::handler::AppState;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authorization header missing")]
    MissingToken,

    #[error("User not logged in")]
    Rejected,

    #[error("identity provider unavailable: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::MissingToken | AuthError::Rejected => {
                error_response(StatusCode::UNAUTHORIZED, &self.to_string())
            }
            AuthError::Upstream(e) => {
                tracing::error!(error = %e, "identity provider call failed");
                error_response(StatusCode::BAD_GATEWAY, "identity provider unavailable")
            }
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves an access token to the id of the user it was issued to.
    async fn resolve(&self, token: &str) -> Result<String, AuthError>;
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: Option<String>,
}

/// Supabase-style auth server: `GET {url}/auth/v1/user`.
pub struct HttpIdentityProvider {
    client: Client,
    url: String,
    api_key: String,
}

impl HttpIdentityProvider {
    pub fn new(cfg: &config::Identity) -> Result<Self, AuthError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: cfg.url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn resolve(&self, token: &str) -> Result<String, AuthError> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.url))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::debug!(status = response.status().as_u16(), "token rejected");
            return Err(AuthError::Rejected);
        }

        let user: UserResponse = response.json().await?;
        user.id.filter(|id| !id.is_empty()).ok_or(AuthError::Rejected)
    }
}

/// Authenticated owner of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for Owner {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthError::MissingToken)?;
        let owner_id = state.identity.resolve(token).await?;
        Ok(Owner(owner_id))
    }
}

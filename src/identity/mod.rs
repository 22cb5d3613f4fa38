pub mod session;

use std::sync::Arc;

use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::error::ServiceError;
use crate::shared::models::{UserAccount, UserRole, ViewerClass};
use crate::shared::schema::users;
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

/// Viewer context resolved once per request: the authenticated identity plus
/// its viewer class. Every core operation takes this explicitly; there is no
/// ambient current-user state.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub user: UserAccount,
    pub class: ViewerClass,
}

impl Viewer {
    pub fn from_user(user: UserAccount) -> Result<Self, ServiceError> {
        let role = user
            .role_enum()
            .ok_or_else(|| ServiceError::Store(format!("unknown role: {}", user.role)))?;
        Ok(Self {
            class: role.viewer_class(),
            user,
        })
    }

    pub fn is_staff(&self) -> bool {
        self.class == ViewerClass::Staff
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.to_string())
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Viewer {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ServiceError::Unauthenticated("Missing bearer token".to_string()))?;
        let user_id = state
            .sessions
            .lock()
            .await
            .resolve(&token)
            .ok_or_else(|| ServiceError::Unauthenticated("Invalid or expired session".to_string()))?;
        let user = find_user(&state.conn, user_id)?.ok_or_else(|| {
            ServiceError::Unauthenticated("Session identity no longer exists".to_string())
        })?;
        Viewer::from_user(user)
    }
}

pub fn find_user(pool: &DbPool, id: Uuid) -> Result<Option<UserAccount>, ServiceError> {
    let mut conn = pool.get()?;
    users::table
        .find(id)
        .first::<UserAccount>(&mut conn)
        .optional()
        .map_err(Into::into)
}

pub fn find_user_by_email(pool: &DbPool, email: &str) -> Result<Option<UserAccount>, ServiceError> {
    let mut conn = pool.get()?;
    users::table
        .filter(users::email.eq(email))
        .first::<UserAccount>(&mut conn)
        .optional()
        .map_err(Into::into)
}

/// Every manufacturer-side identity, across all three staff roles. Used by
/// the organization-to-staff notification broadcast.
pub fn list_staff(pool: &DbPool) -> Result<Vec<UserAccount>, ServiceError> {
    let mut conn = pool.get()?;
    users::table
        .filter(users::role.eq_any(UserRole::STAFF_ROLES))
        .load::<UserAccount>(&mut conn)
        .map_err(Into::into)
}

/// Credential checking stays outside this core: given credentials, an
/// implementation returns the verified account email, or None when rejected.
#[async_trait::async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, email: &str, password: &str) -> Result<Option<String>, ServiceError>;
}

/// Production verifier: POSTs the credentials to the configured identity
/// endpoint and accepts on 2xx.
pub struct HttpCredentialVerifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCredentialVerifier {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerifiedIdentity {
    email: String,
}

#[async_trait::async_trait]
impl CredentialVerifier for HttpCredentialVerifier {
    async fn verify(&self, email: &str, password: &str) -> Result<Option<String>, ServiceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| ServiceError::Store(format!("identity endpoint error: {e}")))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ServiceError::Store(format!(
                "identity endpoint returned {}",
                response.status()
            )));
        }
        let verified: VerifiedIdentity = response
            .json()
            .await
            .map_err(|e| ServiceError::Store(format!("identity endpoint error: {e}")))?;
        Ok(Some(verified.email))
    }
}

/// Fallback when no identity endpoint is configured: every login is rejected.
pub struct DisabledVerifier;

#[async_trait::async_trait]
impl CredentialVerifier for DisabledVerifier {
    async fn verify(&self, _email: &str, _password: &str) -> Result<Option<String>, ServiceError> {
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserAccount,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ServiceError> {
    let verified = state.verifier.verify(&req.email, &req.password).await?;
    let Some(email) = verified else {
        return Err(ServiceError::Unauthenticated(
            "Invalid credentials".to_string(),
        ));
    };
    let user = find_user_by_email(&state.conn, &email)?.ok_or_else(|| {
        ServiceError::Unauthenticated("No profile found for this identity".to_string())
    })?;
    let token = state.sessions.lock().await.create(user.id);
    Ok(Json(LoginResponse { token, user }))
}

pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = bearer_token(&headers) {
        state.sessions.lock().await.revoke(&token);
    }
    StatusCode::NO_CONTENT
}

pub fn configure_identity_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_util;

    #[test]
    fn viewer_classification_follows_role() {
        let client = test_util::client_user("acme");
        let viewer = Viewer::from_user(client).unwrap();
        assert_eq!(viewer.class, ViewerClass::Organization);
        assert!(!viewer.is_staff());

        let agent = test_util::staff_user("Jane Support", UserRole::SupportAgent);
        let viewer = Viewer::from_user(agent).unwrap();
        assert_eq!(viewer.class, ViewerClass::Staff);
        assert!(viewer.is_staff());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let mut user = test_util::client_user("acme");
        user.role = "janitor".to_string();
        assert!(Viewer::from_user(user).is_err());
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc123".to_string()));

        headers.insert(AUTHORIZATION, "Basic abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}

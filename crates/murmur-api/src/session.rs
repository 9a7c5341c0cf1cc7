//! Bearer-token sessions and role gating.

use std::marker::PhantomData;
use std::ops::Deref;
use std::time::Duration;

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Deserialize;
use uuid::Uuid;

use murmur_types::Role;
use murmur_types::api::{Claims, SessionUser};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl Session {
    pub fn user(&self) -> SessionUser {
        SessionUser {
            id: self.user_id,
            email: self.email.clone(),
            role: self.role,
        }
    }
}

pub fn issue_token(secret: &str, ttl: Duration, user: &SessionUser) -> anyhow::Result<String> {
    let expires = chrono::Utc::now() + chrono::Duration::from_std(ttl)?;
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        role: user.role,
        exp: expires.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// `None` for a malformed, forged or expired token.
pub fn decode_token(secret: &str, token: &str) -> Option<Session> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;

    Some(Session {
        user_id: data.claims.sub,
        email: data.claims.email,
        role: data.claims.role,
    })
}

#[derive(Deserialize)]
struct TokenParam {
    token: Option<String>,
}

/// Token from `Authorization: Bearer`, else from a `token` query parameter
/// (event-source clients cannot set headers).
fn request_token(parts: &Parts) -> Option<String> {
    if let Some(Authorization(bearer)) = parts.headers.typed_get::<Authorization<Bearer>>() {
        return Some(bearer.token().to_string());
    }
    Query::<TokenParam>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(param)| param.token)
        .filter(|t| !t.is_empty())
}

fn session_from_parts(parts: &Parts, state: &AppState) -> Option<Session> {
    let token = request_token(parts)?;
    decode_token(&state.config.jwt_secret, &token)
}

// -- Role policies --

pub trait RolePolicy: Send + Sync + 'static {
    fn allows(role: Role) -> bool;
}

/// Any signed-in staff member: ADMIN or VIEWER.
pub struct StaffOnly;

impl RolePolicy for StaffOnly {
    fn allows(role: Role) -> bool {
        matches!(role, Role::Admin | Role::Viewer)
    }
}

pub struct AdminOnly;

impl RolePolicy for AdminOnly {
    fn allows(role: Role) -> bool {
        role == Role::Admin
    }
}

/// A session whose role satisfies `P`. Rejects with 401 when there is no
/// valid session and 403 when the role is insufficient.
pub struct Authorized<P: RolePolicy> {
    session: Session,
    _policy: PhantomData<fn() -> P>,
}

impl<P: RolePolicy> Authorized<P> {
    pub fn into_session(self) -> Session {
        self.session
    }
}

impl<P: RolePolicy> Deref for Authorized<P> {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl<P: RolePolicy> FromRequestParts<AppState> for Authorized<P> {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = session_from_parts(parts, state)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;

        if !P::allows(session.role) {
            return Err(AppError::Forbidden("Insufficient permissions".into()));
        }

        Ok(Self {
            session,
            _policy: PhantomData,
        })
    }
}

/// The caller's session if a valid one was presented. Never rejects.
pub struct MaybeSession(pub Option<Session>);

impl FromRequestParts<AppState> for MaybeSession {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(session_from_parts(parts, state)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> SessionUser {
        SessionUser {
            id: Uuid::new_v4(),
            email: "staff@example.com".into(),
            role,
        }
    }

    #[test]
    fn token_round_trips_role() {
        let u = user(Role::Viewer);
        let token = issue_token("secret", Duration::from_secs(60), &u).unwrap();
        let session = decode_token("secret", &token).unwrap();
        assert_eq!(session.user_id, u.id);
        assert_eq!(session.role, Role::Viewer);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token("secret", Duration::from_secs(60), &user(Role::Admin)).unwrap();
        assert!(decode_token("other", &token).is_none());
        assert!(decode_token("secret", "not-a-jwt").is_none());
    }

    #[test]
    fn policies() {
        assert!(StaffOnly::allows(Role::Viewer));
        assert!(StaffOnly::allows(Role::Admin));
        assert!(AdminOnly::allows(Role::Admin));
        assert!(!AdminOnly::allows(Role::Viewer));
    }
}

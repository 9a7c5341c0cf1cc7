use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::HeaderMap};
use axum_extra::extract::WithRejection;
use tracing::{info, warn};
use uuid::Uuid;

use murmur_db::Database;
use murmur_types::Role;
use murmur_types::api::{LoginRequest, LoginResponse, SessionUser};

use crate::error::{AppError, AppResult};
use crate::rate_limit::client_key;
use crate::session::{Authorized, StaffOnly, issue_token};
use crate::state::AppState;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, AppError>,
) -> AppResult<Json<LoginResponse>> {
    state.login_limiter.enforce(&client_key(&headers)).await?;

    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::validation("Email and password are required"));
    }

    let lookup = email.clone();
    let user = state
        .run_db(move |db| db.get_user_by_email(&lookup))
        .await?
        .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.into()))?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("stored password hash is invalid: {}", e))?;
    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        warn!("Failed login for {}", email);
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    if !user.is_active {
        return Err(AppError::Forbidden("Account is disabled".into()));
    }

    let session_user = SessionUser {
        id: user.id.parse().map_err(anyhow::Error::from)?,
        email: user.email,
        role: user.role.parse().map_err(anyhow::Error::from)?,
    };

    let user_id = user.id;
    state.run_db(move |db| db.touch_last_login(&user_id)).await?;

    let token = issue_token(&state.config.jwt_secret, state.config.session_ttl, &session_user)?;
    info!("{} signed in as {}", session_user.email, session_user.role);

    Ok(Json(LoginResponse {
        token,
        expires_in: state.config.session_ttl.as_secs(),
        user: session_user,
    }))
}

/// GET /api/auth/me
pub async fn me(auth: Authorized<StaffOnly>) -> Json<SessionUser> {
    Json(auth.user())
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// Create the bootstrap administrator unless an account with that email
/// already exists. Returns `true` when a user was created.
pub fn seed_admin(db: &Database, email: &str, password: &str) -> anyhow::Result<bool> {
    let email = email.trim().to_lowercase();
    if db.get_user_by_email(&email)?.is_some() {
        return Ok(false);
    }

    let hash = hash_password(password)?;
    db.create_user(&Uuid::new_v4().to_string(), &email, &hash, Role::Admin, true)?;
    info!("Seeded administrator {}", email);
    Ok(true)
}

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, Request, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use crate::config::AuthConfig;
use crate::db::{
    timestamp, AuthResponse, ChangePasswordRequest, ForgotPasswordRequest,
    ForgotPasswordResponse, MessageResponse, ProfileUpdatedResponse, ResetPasswordRequest, Role,
    SigninRequest, SignupRequest, UpdateProfileRequest, User, UserResponse,
};
use crate::validation::{normalize_email, validate_email, validate_name, validate_password};
use crate::{AppState, DbPool};

/// Purpose claim of tokens accepted on authenticated routes
pub const ACCESS_PURPOSE: &str = "access";
/// Purpose claim of tokens accepted only by the password reset endpoint
pub const RESET_PURPOSE: &str = "password-reset";

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

fn hash_or_internal(password: &str) -> Result<String, ApiError> {
    hash_password(password).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        ApiError::internal("Failed to hash password")
    })
}

/// JWT payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    pub role: String,
    pub purpose: String,
    pub iat: i64,
    pub exp: i64,
}

/// Sign a token for `user` valid for `ttl`
pub fn issue_token(
    auth: &AuthConfig,
    user: &User,
    purpose: &str,
    ttl: Duration,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        role: user.role.clone(),
        purpose: purpose.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!("Failed to sign token: {}", e);
        ApiError::internal("Failed to issue token")
    })
}

/// Verify signature and expiry; `None` for any invalid token
pub fn decode_token(auth: &AuthConfig, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(auth.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .ok()
    .map(|data| data.claims)
}

fn issue_access_token(auth: &AuthConfig, user: &User) -> Result<String, ApiError> {
    issue_token(auth, user, ACCESS_PURPOSE, auth.token_ttl())
}

async fn find_user_by_email(db: &DbPool, email: &str) -> Result<Option<User>, ApiError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(db)
        .await?;
    Ok(user)
}

async fn find_user_by_id(db: &DbPool, id: &str) -> Result<Option<User>, ApiError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(user)
}

async fn insert_user(
    db: &DbPool,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
) -> Result<User, ApiError> {
    let id = uuid::Uuid::new_v4().to_string();
    let password_hash = hash_or_internal(password)?;
    let now = timestamp(Utc::now());

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(name)
    .bind(email)
    .bind(&password_hash)
    .bind(role.to_string())
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    find_user_by_id(db, &id)
        .await?
        .ok_or_else(|| ApiError::internal("User vanished after insert"))
}

/// Register a player account
pub async fn signup(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let name = req.name.unwrap_or_default();
    let email = normalize_email(&req.email.unwrap_or_default());
    let password = req.password.unwrap_or_default();

    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("name", validate_name(&name, "Name"))
        .check("email", validate_email(&email))
        .check("password", validate_password(&password));
    errors.finish()?;

    if find_user_by_email(&state.db, &email).await?.is_some() {
        return Err(ApiError::bad_request("User already exists with this email"));
    }

    let user = insert_user(&state.db, name.trim(), &email, &password, Role::Player).await?;
    let token = issue_access_token(&state.config.auth, &user)?;

    info!(user_id = %user.id, "User signed up");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User created successfully".to_string(),
            token,
            user: UserResponse::from(user),
        }),
    ))
}

/// Exchange credentials for an access token
pub async fn signin(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SigninRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = normalize_email(&req.email.unwrap_or_default());
    let password = req.password.unwrap_or_default();

    let mut errors = ValidationErrorBuilder::new();
    errors.check("email", validate_email(&email));
    if password.is_empty() {
        errors.add("password", "Password is required");
    }
    errors.finish()?;

    let user = find_user_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !verify_password(&password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let token = issue_access_token(&state.config.auth, &user)?;

    Ok(Json(AuthResponse {
        message: "Sign in successful".to_string(),
        token,
        user: UserResponse::from(user),
    }))
}

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = find_user_by_id(&state.db, &auth.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(UserResponse::from(user)))
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<Json<ProfileUpdatedResponse>, ApiError> {
    let email = req.email.as_deref().map(normalize_email);

    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = &req.name {
        errors.check("name", validate_name(name, "Name"));
    }
    if let Some(email) = &email {
        errors.check("email", validate_email(email));
    }
    errors.finish()?;

    let user = find_user_by_id(&state.db, &auth.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if let Some(email) = &email {
        if *email != user.email && find_user_by_email(&state.db, email).await?.is_some() {
            return Err(ApiError::bad_request("Email is already taken"));
        }
    }

    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .unwrap_or(&user.name)
        .to_string();
    let email = email.unwrap_or_else(|| user.email.clone());

    sqlx::query("UPDATE users SET name = ?, email = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&email)
        .bind(timestamp(Utc::now()))
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    let updated = find_user_by_id(&state.db, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(ProfileUpdatedResponse {
        message: "Profile updated successfully".to_string(),
        user: UserResponse::from(updated),
    }))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let current = req.current_password.unwrap_or_default();
    let new_password = req.new_password.unwrap_or_default();

    let mut errors = ValidationErrorBuilder::new();
    if current.is_empty() {
        errors.add("currentPassword", "Current password is required");
    }
    errors.check("newPassword", validate_password(&new_password));
    errors.finish()?;

    let user = find_user_by_id(&state.db, &auth.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !verify_password(&current, &user.password_hash) {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }

    set_password(&state.db, &user.id, &new_password).await?;
    info!(user_id = %user.id, "Password changed");

    Ok(Json(MessageResponse {
        message: "Password changed successfully".to_string(),
    }))
}

/// Issue a password reset token.
///
/// Unknown emails get the same generic message and no token.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ForgotPasswordRequest>,
) -> Result<Json<ForgotPasswordResponse>, ApiError> {
    let email = normalize_email(&req.email.unwrap_or_default());
    validate_email(&email).map_err(|e| ApiError::validation_field("email", e))?;

    let Some(user) = find_user_by_email(&state.db, &email).await? else {
        return Ok(Json(ForgotPasswordResponse {
            message: "If an account with that email exists, a password reset link has been sent."
                .to_string(),
            reset_token: None,
        }));
    };

    let auth = &state.config.auth;
    let token = issue_token(auth, &user, RESET_PURPOSE, auth.reset_token_ttl())?;
    info!(user_id = %user.id, "Password reset token issued");

    Ok(Json(ForgotPasswordResponse {
        message: "Password reset token generated successfully".to_string(),
        reset_token: Some(token),
    }))
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let token = req.token.unwrap_or_default();
    let new_password = req.new_password.unwrap_or_default();

    let mut errors = ValidationErrorBuilder::new();
    if token.is_empty() {
        errors.add("token", "Reset token is required");
    }
    errors.check("newPassword", validate_password(&new_password));
    errors.finish()?;

    let claims = decode_token(&state.config.auth, &token)
        .ok_or_else(|| ApiError::bad_request("Invalid or expired reset token"))?;
    if claims.purpose != RESET_PURPOSE {
        return Err(ApiError::bad_request("Invalid token type"));
    }

    let user = find_user_by_id(&state.db, &claims.sub)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    set_password(&state.db, &user.id, &new_password).await?;
    info!(user_id = %user.id, "Password reset");

    Ok(Json(MessageResponse {
        message: "Password reset successfully".to_string(),
    }))
}

async fn set_password(db: &DbPool, user_id: &str, password: &str) -> Result<(), ApiError> {
    let password_hash = hash_or_internal(password)?;
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(timestamp(Utc::now()))
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}

/// The authenticated caller, inserted by [`auth_middleware`]
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            role: user.role_enum(),
            id: user.id,
            email: user.email,
        }
    }
}

/// Extract the bearer token from the Authorization header
fn extract_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Auth middleware that validates access tokens and loads the caller
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("No token, authorization denied"))?;

    let claims = decode_token(&state.config.auth, token)
        .filter(|c| c.purpose == ACCESS_PURPOSE)
        .ok_or_else(|| ApiError::unauthorized("Token is not valid"))?;

    // Tokens of deleted accounts stop working immediately
    let user = find_user_by_id(&state.db, &claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Token is not valid"))?;

    request.extensions_mut().insert(AuthUser::from(user));
    Ok(next.run(request).await)
}

/// Rejects callers without the admin role. Must run inside [`auth_middleware`].
pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let caller = request
        .extensions()
        .get::<AuthUser>()
        .map(|user| (user.id.clone(), user.email.clone(), user.is_admin()));

    match caller {
        Some((_, _, true)) => Ok(next.run(request).await),
        Some((user_id, email, false)) => {
            warn!(user_id = %user_id, email = %email, path = %request.uri().path(), "Admin route refused");
            Err(ApiError::forbidden("Admin access required"))
        }
        None => Err(ApiError::unauthorized("Authentication required")),
    }
}

/// Extractor for the current authenticated user
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Create the configured admin account if no user has its email yet
pub async fn ensure_admin_user(db: &DbPool, auth: &AuthConfig) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (&auth.admin_email, &auth.admin_password) else {
        return Ok(());
    };
    let email = normalize_email(email);

    validate_email(&email).map_err(anyhow::Error::msg)?;
    validate_password(password).map_err(anyhow::Error::msg)?;

    let existing = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(db)
        .await?;

    match existing {
        Some(user) if user.role_enum().is_admin() => Ok(()),
        Some(user) => {
            sqlx::query("UPDATE users SET role = 'admin', updated_at = ? WHERE id = ?")
                .bind(timestamp(Utc::now()))
                .bind(&user.id)
                .execute(db)
                .await?;
            info!(user_id = %user.id, "Promoted configured account to admin");
            Ok(())
        }
        None => {
            insert_user(db, &auth.admin_name, &email, password, Role::Admin)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create admin user: {}", e))?;
            info!("Created admin user {}", email);
            Ok(())
        }
    }
}

//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: signup, login, logout, session lookup, email
//! verification, password reset by one-time code, and email change.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Duration, Utc};
use keepstash_core::domain::{Notification, User, VerificationKind};
use keepstash_core::ports::PortError;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::input::{required_param, required_text, JsonBody, QueryArgs};
use crate::web::middleware::{session_id_from_headers, SESSION_COOKIE};
use crate::web::rest::ErrorResponse;
use crate::web::state::{AppState, AuthUser};

const PASSWORD_MIN: usize = 8;
const PASSWORD_MAX: usize = 128;
const NAME_MAX: usize = 100;
const INVALID_CREDENTIALS: &str = "Invalid email or password";
const INVALID_TOKEN: &str = "Invalid or expired token";
const INVALID_OTP: &str = "Invalid or expired code";

fn email_verification_ttl() -> Duration {
    Duration::hours(24)
}

fn change_email_ttl() -> Duration {
    Duration::hours(1)
}

fn password_reset_ttl() -> Duration {
    Duration::minutes(5)
}

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VerifyEmailQuery {
    /// Token from the verification link (required)
    pub token: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEmailRequest {
    pub new_email: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub email_verified: bool,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            email_verified: user.email_verified,
            name: user.name,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Lowercases and checks the rough shape `local@domain.tld`.
fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ApiError::validation("A valid email address is required"));
    }
    Ok(email)
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    let length = password.chars().count();
    if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&length) {
        return Err(ApiError::validation(format!(
            "password must be between {} and {} characters",
            PASSWORD_MIN, PASSWORD_MAX
        )));
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })
}

fn verify_password(password: &str, hashed_password: &str) -> Result<bool, ApiError> {
    let parsed_hash = PasswordHash::new(hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::Internal("Authentication error".to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// 32 random bytes, hex encoded.
fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn generate_otp() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

/// Only this digest of a token or code is ever stored.
fn hash_secret(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Codes are short, so they are hashed together with their owner.
fn hash_otp(user_id: Uuid, otp: &str) -> String {
    hash_secret(&format!("{}:{}", user_id, otp))
}

fn session_cookie(session_id: &str, ttl: Duration) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        session_id,
        ttl.num_seconds()
    )
}

fn cleared_cookie() -> String {
    session_cookie("", Duration::zero())
}

/// Stores a new auth session and returns its `Set-Cookie` value.
async fn start_session(state: &AppState, user_id: Uuid) -> Result<String, ApiError> {
    let ttl = Duration::days(state.config.session_ttl_days);
    let expires_at = Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| ApiError::Internal("Session lifetime is out of range".to_string()))?;
    let auth_session_id = random_token();
    state
        .db
        .create_auth_session(&auth_session_id, user_id, expires_at)
        .await?;
    Ok(session_cookie(&auth_session_id, ttl))
}

/// Delivery problems are logged; they never fail the request that caused them.
async fn notify(state: &AppState, notification: Notification) {
    if let Err(e) = state.notifier.send(notification).await {
        warn!("Failed to deliver notification: {:?}", e);
    }
}

/// Issues a verification token and mails its link to `email`.
async fn send_verification_link(
    state: &AppState,
    user_id: Uuid,
    email: &str,
    kind: VerificationKind,
    new_email: Option<&str>,
    ttl: Duration,
) -> Result<(), ApiError> {
    let token = random_token();
    state
        .db
        .create_verification(user_id, kind, &hash_secret(&token), new_email, Utc::now() + ttl)
        .await?;

    let verification_url = format!(
        "{}{}/auth/verify-email?token={}",
        state.config.app_url, state.config.app_prefix, token
    );
    notify(
        state,
        Notification::EmailVerificationRequested {
            email: email.to_string(),
            verification_url,
            token,
        },
    )
    .await;
    Ok(())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    tag = "Auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created and signed in", body = UserResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email)?;
    validate_password(&req.password)?;
    let name = required_text("name", &req.name, NAME_MAX)?;

    let password_hash = hash_password(&req.password)?;
    let user = state.db.create_user(&email, &name, &password_hash).await?;
    info!("Registered user {}", user.id);

    let cookie = start_session(&state, user.id).await?;

    if let Err(e) = send_verification_link(
        &state,
        user.id,
        &user.email,
        VerificationKind::EmailVerification,
        None,
        email_verification_ttl(),
    )
    .await
    {
        warn!("Could not issue verification email for {}: {:?}", user.id, e);
    }

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(UserResponse::from(user)),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = UserResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();

    let user_creds = match state.db.get_user_by_email(&email).await {
        Ok(creds) => creds,
        Err(PortError::NotFound(_)) => {
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    if !verify_password(&req.password, &user_creds.hashed_password)? {
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    let cookie = start_session(&state, user_creds.user_id).await?;
    let user = state.db.get_user_by_id(user_creds.user_id).await?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(UserResponse::from(user)),
    ))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse),
        (status = 401, description = "No active session", body = ErrorResponse)
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let auth_session_id = session_id_from_headers(&headers)
        .ok_or_else(|| ApiError::Unauthorized("No session found".to_string()))?;

    state.db.delete_auth_session(auth_session_id).await?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cleared_cookie())],
        MessageResponse::new("Logged out"),
    ))
}

/// GET /auth/session - The signed-in user
#[utoipa::path(
    get,
    path = "/auth/session",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn session_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.db.get_user_by_id(auth.user_id).await?;
    Ok(Json(user.into()))
}

/// GET /auth/verify-email - Confirm an address from an emailed link
///
/// Handles both first-time verification and confirmation of a new address.
#[utoipa::path(
    get,
    path = "/auth/verify-email",
    tag = "Auth",
    params(VerifyEmailQuery),
    responses(
        (status = 200, description = "Email verified", body = UserResponse),
        (status = 400, description = "Invalid or expired token", body = ErrorResponse),
        (status = 409, description = "The new address was taken meanwhile", body = ErrorResponse)
    )
)]
pub async fn verify_email_handler(
    State(state): State<Arc<AppState>>,
    QueryArgs(params): QueryArgs<VerifyEmailQuery>,
) -> Result<Json<UserResponse>, ApiError> {
    let token_hash = hash_secret(&required_param("token", params.token)?);

    let user = match state
        .db
        .consume_verification(VerificationKind::EmailVerification, &token_hash)
        .await
    {
        Ok(verification) => state.db.mark_email_verified(verification.user_id).await?,
        Err(PortError::NotFound(_)) => {
            let verification = state
                .db
                .consume_verification(VerificationKind::ChangeEmail, &token_hash)
                .await
                .map_err(|e| match e {
                    PortError::NotFound(_) => ApiError::validation(INVALID_TOKEN),
                    other => other.into(),
                })?;
            let new_email = verification
                .new_email
                .ok_or_else(|| ApiError::validation(INVALID_TOKEN))?;
            state
                .db
                .change_email(verification.user_id, &new_email)
                .await?
        }
        Err(e) => return Err(e.into()),
    };

    info!("Verified email for user {}", user.id);
    Ok(Json(user.into()))
}

/// POST /auth/forgot-password - Email a one-time reset code
///
/// Always succeeds so the response does not reveal whether an account exists.
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    tag = "Auth",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "A code was sent if the account exists", body = MessageResponse),
        (status = 400, description = "Invalid email", body = ErrorResponse)
    )
)]
pub async fn forgot_password_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = normalize_email(&req.email)?;

    match state.db.get_user_by_email(&email).await {
        Ok(user_creds) => {
            let otp = generate_otp();
            state
                .db
                .create_verification(
                    user_creds.user_id,
                    VerificationKind::PasswordReset,
                    &hash_otp(user_creds.user_id, &otp),
                    None,
                    Utc::now() + password_reset_ttl(),
                )
                .await?;
            notify(
                &state,
                Notification::ForgotPasswordOtpRequested {
                    email: user_creds.email,
                    otp,
                },
            )
            .await;
        }
        Err(PortError::NotFound(_)) => {
            info!("Password reset requested for an unknown address");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(MessageResponse::new(
        "If the email is registered, a reset code has been sent",
    ))
}

/// POST /auth/reset-password - Set a new password with a reset code
///
/// Signs the user out everywhere.
#[utoipa::path(
    post,
    path = "/auth/reset-password",
    tag = "Auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Invalid or expired code", body = ErrorResponse)
    )
)]
pub async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = normalize_email(&req.email)?;
    validate_password(&req.password)?;

    let user_creds = state.db.get_user_by_email(&email).await.map_err(|e| match e {
        PortError::NotFound(_) => ApiError::validation(INVALID_OTP),
        other => other.into(),
    })?;

    // Wrong guesses count against the outstanding code.
    state
        .db
        .consume_user_code(
            user_creds.user_id,
            VerificationKind::PasswordReset,
            &hash_otp(user_creds.user_id, req.otp.trim()),
        )
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => ApiError::validation(INVALID_OTP),
            other => other.into(),
        })?;

    let password_hash = hash_password(&req.password)?;
    state
        .db
        .update_password(user_creds.user_id, &password_hash)
        .await?;
    state.db.delete_user_sessions(user_creds.user_id).await?;
    info!("Password reset for user {}", user_creds.user_id);

    Ok(MessageResponse::new("Password has been reset"))
}

/// POST /auth/change-email - Start moving the account to a new address
///
/// The switch happens when the link mailed to the new address is opened.
#[utoipa::path(
    post,
    path = "/auth/change-email",
    tag = "Auth",
    request_body = ChangeEmailRequest,
    responses(
        (status = 200, description = "Verification link sent to the new address", body = MessageResponse),
        (status = 400, description = "Invalid email", body = ErrorResponse),
        (status = 409, description = "Email already in use", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn change_email_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    JsonBody(req): JsonBody<ChangeEmailRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let new_email = normalize_email(&req.new_email)?;
    let user = state.db.get_user_by_id(auth.user_id).await?;
    if user.email == new_email {
        return Err(ApiError::validation(
            "The new email must differ from the current one",
        ));
    }

    match state.db.get_user_by_email(&new_email).await {
        Ok(_) => return Err(PortError::Conflict("Email is already in use".to_string()).into()),
        Err(PortError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    send_verification_link(
        &state,
        user.id,
        &new_email,
        VerificationKind::ChangeEmail,
        Some(&new_email),
        change_email_ttl(),
    )
    .await?;

    Ok(MessageResponse::new(
        "A verification link has been sent to the new address",
    ))
}

use axum::{
    extract::{FromRef, State},
    http::{header::SET_COOKIE, StatusCode},
    response::AppendHeaders,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse, PublicUser,
            RequestOtpRequest, ResetPasswordRequest, SignupRequest, VerifyOtpRequest,
        },
        extractors::{AuthUser, Identity, SESSION_COOKIE},
        otp, password,
        repo_types::User,
        tokens::{ResetKeys, SessionKeys},
    },
    error::{AuthError, AuthResult},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/otp/request", post(request_otp))
        .route("/auth/otp/verify", post(verify_otp))
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> AuthResult<String> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AuthError::Validation("invalid email".into()));
    }
    Ok(email)
}

fn check_password_shape(password: &str) -> AuthResult<()> {
    if password.len() < 8 {
        warn!("password too short");
        return Err(AuthError::Validation("password too short".into()));
    }
    Ok(())
}

/// Issues a fresh signup code and mails it out. The code is persisted before
/// the send, so a delivery failure means "re-issue", never "retry verify".
#[instrument(skip(state, payload))]
pub async fn request_otp(
    State(state): State<AppState>,
    Json(payload): Json<RequestOtpRequest>,
) -> AuthResult<Json<MessageResponse>> {
    let email = normalize_email(&payload.email)?;

    let code = otp::generate_code();
    otp::issue(&state.db, &email, &code, state.config.auth.otp_ttl_minutes).await?;

    state
        .mailer
        .send_otp(&email, &code)
        .await
        .map_err(AuthError::Delivery)?;

    info!(%email, "verification code sent");
    Ok(Json(MessageResponse {
        message: "verification code sent",
    }))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> AuthResult<Json<MessageResponse>> {
    let email = normalize_email(&payload.email)?;
    otp::verify(&state.db, &email, payload.code.trim()).await?;

    info!(%email, "verification code accepted");
    Ok(Json(MessageResponse {
        message: "code verified",
    }))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> AuthResult<(StatusCode, Json<PublicUser>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AuthError::Validation("name is required".into()));
    }
    let email = normalize_email(&payload.email)?;
    check_password_shape(&payload.password)?;

    let argon2 = password::hasher(&state.config.auth)?;
    let hash = password::hash_password(&argon2, &payload.password)?;

    let user = User::create(&state.db, name, &email, &hash).await?;

    info!(user_id = %user.id, email = %user.email, "user created");
    Ok((
        StatusCode::CREATED,
        Json(PublicUser {
            id: user.id,
            name: user.name,
            email: user.email,
        }),
    ))
}

/// On success the session token travels both ways the clients expect: as an
/// HttpOnly cookie for the browser and in the JSON body for everyone else.
#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AuthResult<(AppendHeaders<[(axum::http::HeaderName, String); 1]>, Json<AuthResponse>)> {
    let email = normalize_email(&payload.email)?;

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| {
            warn!(%email, "login unknown email");
            AuthError::NotFound
        })?;

    if !password::verify_password(&payload.password, &user.password_hash)? {
        warn!(%email, user_id = %user.id, "login invalid password");
        return Err(AuthError::InvalidPassword);
    }

    let keys = SessionKeys::from_ref(&state);
    let token = keys.sign(user.id, &user.email)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    let cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax");
    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(AuthResponse {
            user: PublicUser {
                id: user.id,
                name: user.name,
                email: user.email,
            },
            token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> AuthResult<Json<MessageResponse>> {
    let email = normalize_email(&payload.email)?;

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or(AuthError::NotFound)?;

    let keys = ResetKeys::from_ref(&state);
    let token = keys.sign(&user.email)?;
    let link = format!("{}/reset-password?token={}", state.config.public_url, token);

    state
        .mailer
        .send_reset_link(&user.email, &link)
        .await
        .map_err(AuthError::Delivery)?;

    info!(%email, "reset link sent");
    Ok(Json(MessageResponse {
        message: "reset link sent",
    }))
}

/// The codec resolves the email; persisting the new hash is this handler's
/// job, not the codec's.
#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AuthResult<Json<MessageResponse>> {
    let keys = ResetKeys::from_ref(&state);
    let email = keys.verify(&payload.token)?;

    check_password_shape(&payload.new_password)?;

    let argon2 = password::hasher(&state.config.auth)?;
    let hash = password::hash_password(&argon2, &payload.new_password)?;
    User::update_password(&state.db, &email, &hash).await?;

    info!(%email, "password reset");
    Ok(Json(MessageResponse {
        message: "password reset",
    }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> AuthResult<Json<PublicUser>> {
    let Identity { id, .. } = identity;
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or(AuthError::NotFound)?;

    Ok(Json(PublicUser {
        id: user.id,
        name: user.name,
        email: user.email,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_user_serializes_without_hash() {
        let response = PublicUser {
            id: uuid::Uuid::new_v4(),
            name: "Test".to_string(),
            email: "test@example.com".to_string(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("id"));
        assert!(!json.contains("password"));
    }

    #[test]
    fn email_validation_accepts_plain_addresses() {
        assert!(is_valid_email("a@x.com"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a @x.com"));
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email("  A@X.Com ").unwrap(), "a@x.com");
        assert!(normalize_email("").is_err());
    }
}

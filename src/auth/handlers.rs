use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use time::Duration as TimeDuration;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            ForgotPasswordRequest, LoginRequest, MessageResponse, RegisterRequest,
            ResetPasswordRequest, TokenResponse,
        },
        jwt::JwtKeys,
        password, repo_types::User, reset,
    },
    error::ApiError,
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 6;

/// Generic forgot-password acknowledgment; identical whether or not the
/// account exists, so responses cannot be used for account enumeration.
const FORGOT_ACK: MessageResponse = MessageResponse {
    message: "If that email is registered, a password reset link has been sent",
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    payload.email = normalize_email(&payload.email);
    payload.name = payload.name.trim().to_string();

    if payload.name.is_empty() {
        return Err(ApiError::Validation("Name is required".into()));
    }
    if !is_valid_email(&payload.email) {
        return Err(ApiError::Validation("Invalid email address".into()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(
            "Password must be at least 6 characters long".into(),
        ));
    }

    // Early duplicate check for a friendly error; the unique constraint on
    // users.email is the actual guard against concurrent registration.
    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let hash = password::hash_password(&payload.password)?;
    let user = User::create(&state.db, &payload.name, &payload.email, &hash).await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User registered successfully",
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    payload.email = normalize_email(&payload.email);

    if !is_valid_email(&payload.email) {
        return Err(ApiError::Validation("Invalid email address".into()));
    }

    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(ApiError::Authentication);
        }
    };

    if !password::verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::Authentication);
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(mut payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    payload.email = normalize_email(&payload.email);

    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(u) => u,
        None => {
            debug!(email = %payload.email, "forgot-password for unknown email");
            return Ok(Json(FORGOT_ACK));
        }
    };

    let ttl_minutes = state.config.reset_token_ttl_minutes;
    let token = reset::generate(TimeDuration::minutes(ttl_minutes));
    User::set_reset_token(&state.db, user.id, &token.hash, token.expires_at).await?;

    let reset_url = format!(
        "{}/reset-password/{}",
        state.config.frontend_url.trim_end_matches('/'),
        token.plaintext
    );
    // Delivery failure is an operational problem, not a caller-visible one.
    if let Err(e) = state
        .mailer
        .send_reset_email(&user.email, &reset_url, ttl_minutes)
        .await
    {
        error!(error = %e, user_id = %user.id, "reset email delivery failed");
    } else {
        info!(user_id = %user.id, "password reset email dispatched");
    }

    Ok(Json(FORGOT_ACK))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(
            "Password must be at least 6 characters long".into(),
        ));
    }

    let token_hash = reset::hash_token(payload.token.trim());

    // Expired tokens are cleared lazily at validation time.
    if let Some(user) = User::find_by_reset_token_hash(&state.db, &token_hash).await? {
        let expired = user
            .reset_token_expires_at
            .map_or(true, |t| !reset::is_usable(&t));
        if expired {
            User::clear_reset_token(&state.db, user.id).await?;
            warn!(user_id = %user.id, "expired reset token presented");
            return Err(ApiError::InvalidOrExpiredToken);
        }
    }

    let new_hash = password::hash_password(&payload.password)?;

    // Single conditional update: password swap and token clearing happen
    // together, so the token cannot be spent twice.
    match User::consume_reset_token(&state.db, &token_hash, &new_hash).await? {
        Some(user) => {
            info!(user_id = %user.id, "password reset");
            Ok(Json(MessageResponse {
                message: "Password reset successful",
            }))
        }
        None => Err(ApiError::InvalidOrExpiredToken),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_regex_accepts_common_addresses() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+c@farm.co.in"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn email_normalization_lowercases_and_trims() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }
}

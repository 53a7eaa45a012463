use axum::{
    extract::State,
    routing::{get, post, put},
    Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{
            ChangePasswordRequest, EmailRequest, PublicUser, ResetPasswordRequest,
            SessionResponse, SignInRequest, SignUpRequest, VerifyEmailRequest,
        },
        extractors::AuthUser,
        services,
    },
    response::{created, ok, ok_message, ApiResult, AppJson, CreatedResult},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(sign_up))
        .route("/auth/signin", post(sign_in))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/resend-verification", post(resend_verification))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/change-password", put(change_password))
        .route("/auth/signout", post(sign_out))
        .route("/auth/check-auth", get(check_auth))
}

#[instrument(skip(state, payload))]
pub async fn sign_up(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignUpRequest>,
) -> CreatedResult<SessionResponse> {
    let session = services::sign_up(&state, payload).await?;
    Ok(created(
        "Account created. Check your email for the verification code.",
        session,
    ))
}

#[instrument(skip(state, payload))]
pub async fn sign_in(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignInRequest>,
) -> ApiResult<SessionResponse> {
    let session = services::sign_in(&state, &payload.email, &payload.password).await?;
    Ok(ok("Signed in", session))
}

#[instrument(skip(state, payload))]
pub async fn verify_email(
    State(state): State<AppState>,
    AppJson(payload): AppJson<VerifyEmailRequest>,
) -> ApiResult<PublicUser> {
    let user = services::verify_email(&state, &payload.email, &payload.otp).await?;
    Ok(ok("Email verified", user))
}

#[instrument(skip(state, payload))]
pub async fn resend_verification(
    State(state): State<AppState>,
    AppJson(payload): AppJson<EmailRequest>,
) -> ApiResult<()> {
    services::resend_verification(&state, &payload.email).await?;
    Ok(ok_message("Verification code sent"))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<EmailRequest>,
) -> ApiResult<()> {
    services::forgot_password(&state, &payload.email).await?;
    Ok(ok_message("Password reset code sent"))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> ApiResult<()> {
    services::reset_password(&state, payload).await?;
    Ok(ok_message("Password reset. Please sign in again."))
}

#[instrument(skip(state, user, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(payload): AppJson<ChangePasswordRequest>,
) -> ApiResult<SessionResponse> {
    let session = services::change_password(
        &state,
        &user,
        &payload.current_password,
        &payload.new_password,
    )
    .await?;
    Ok(ok("Password changed", session))
}

/// Sessions are stateless; the client drops its token.
#[instrument(skip(user))]
pub async fn sign_out(AuthUser(user): AuthUser) -> ApiResult<()> {
    info!(user_id = %user.id, "user signed out");
    Ok(ok_message("Signed out"))
}

#[instrument(skip(user))]
pub async fn check_auth(AuthUser(user): AuthUser) -> ApiResult<PublicUser> {
    Ok(ok("Authenticated", PublicUser::from(&user)))
}

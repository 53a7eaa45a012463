//! Auth flow controller: signup, email verification, signin and the
//! password subflows. Handlers stay thin and call into these.
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::dto::{
    check_password, normalize_email, PublicUser, ResetPasswordRequest, SessionResponse,
    SignUpRequest,
};
use super::otp::{self, Otp};
use super::password::{hash_password, verify_password};
use super::repo_types::{NewUser, User};
use crate::{error::AppError, mail, state::AppState};

fn session_for(state: &AppState, user: &User) -> Result<SessionResponse, AppError> {
    let token = state.keys.issue(user.id, user.token_version)?;
    Ok(SessionResponse {
        token,
        user: PublicUser::from(user),
    })
}

async fn find_by_email(state: &AppState, email: &str) -> Result<User, AppError> {
    state
        .users
        .find_by_email(email)
        .await?
        .ok_or(AppError::NotFound("User"))
}

#[instrument(skip_all, fields(email = %req.email))]
pub async fn sign_up(state: &AppState, req: SignUpRequest) -> Result<SessionResponse, AppError> {
    let req = req.normalized()?;
    let password_hash = hash_password(&req.password)?;
    let otp = Otp::issue(&state.config.otp);

    let user = state
        .users
        .create_unverified(
            NewUser {
                email: req.email,
                username: req.username,
                first_name: req.first_name,
                last_name: req.last_name,
                password_hash,
            },
            &otp,
        )
        .await
        .map_err(|e| {
            if matches!(e, AppError::DuplicateUser) {
                warn!("signup with taken email or username");
            }
            e
        })?;

    mail::deliver(
        state.mailer.as_ref(),
        mail::verification_code(
            &user.email,
            &user.first_name,
            &otp.code,
            state.config.otp.ttl_minutes,
        ),
    )
    .await;

    info!(user_id = %user.id, "user registered");
    session_for(state, &user)
}

#[instrument(skip_all)]
pub async fn verify_email(state: &AppState, email: &str, code: &str) -> Result<PublicUser, AppError> {
    let email = normalize_email(email)?;
    let user = find_by_email(state, &email).await?;
    if user.is_verified {
        return Err(AppError::AlreadyVerified);
    }
    otp::verify(
        user.otp.as_deref(),
        user.otp_expiry,
        code,
        OffsetDateTime::now_utc(),
    )?;

    // Re-checked in the write so a code cannot be spent twice
    let user = state.users.mark_verified(user.id, code.trim()).await?;
    mail::deliver(state.mailer.as_ref(), mail::welcome(&user.email, &user.first_name)).await;

    info!(user_id = %user.id, "email verified");
    Ok(PublicUser::from(&user))
}

#[instrument(skip_all)]
pub async fn resend_verification(state: &AppState, email: &str) -> Result<(), AppError> {
    let email = normalize_email(email)?;
    let user = find_by_email(state, &email).await?;
    if user.is_verified {
        return Err(AppError::AlreadyVerified);
    }
    let otp = Otp::issue(&state.config.otp);
    state.users.set_otp(user.id, &otp).await?;
    mail::deliver(
        state.mailer.as_ref(),
        mail::verification_code(
            &user.email,
            &user.first_name,
            &otp.code,
            state.config.otp.ttl_minutes,
        ),
    )
    .await;
    info!(user_id = %user.id, "verification code reissued");
    Ok(())
}

/// Unverified accounts are refused before the password is looked at.
#[instrument(skip_all)]
pub async fn sign_in(state: &AppState, email: &str, password: &str) -> Result<SessionResponse, AppError> {
    let email = normalize_email(email)?;
    let user = find_by_email(state, &email).await?;

    if !user.is_verified {
        warn!(user_id = %user.id, "signin on unverified account");
        return Err(AppError::NotVerified);
    }
    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "signin with invalid password");
        return Err(AppError::InvalidCredentials);
    }

    info!(user_id = %user.id, "user signed in");
    session_for(state, &user)
}

#[instrument(skip_all)]
pub async fn forgot_password(state: &AppState, email: &str) -> Result<(), AppError> {
    let email = normalize_email(email)?;
    let user = find_by_email(state, &email).await?;
    let otp = Otp::issue(&state.config.otp);
    state.users.set_otp(user.id, &otp).await?;
    mail::deliver(
        state.mailer.as_ref(),
        mail::password_reset_code(
            &user.email,
            &user.first_name,
            &otp.code,
            state.config.otp.ttl_minutes,
        ),
    )
    .await;
    info!(user_id = %user.id, "password reset requested");
    Ok(())
}

/// Unknown addresses are reported as `InvalidOrExpired`, same as a bad code.
#[instrument(skip_all)]
pub async fn reset_password(state: &AppState, req: ResetPasswordRequest) -> Result<(), AppError> {
    check_password(&req.new_password)?;
    let email = normalize_email(&req.email).map_err(|_| AppError::InvalidOrExpired)?;
    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or(AppError::InvalidOrExpired)?;
    otp::verify(
        user.otp.as_deref(),
        user.otp_expiry,
        &req.otp,
        OffsetDateTime::now_utc(),
    )?;

    let password_hash = hash_password(&req.new_password)?;
    let version = state
        .users
        .reset_password(user.id, req.otp.trim(), &password_hash)
        .await?;
    mail::deliver(
        state.mailer.as_ref(),
        mail::password_changed(&user.email, &user.first_name),
    )
    .await;

    info!(user_id = %user.id, token_version = version, "password reset");
    Ok(())
}

/// Bumps `token_version`, so every outstanding token stops working. The
/// caller gets a fresh token for the new version.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn change_password(
    state: &AppState,
    user: &User,
    current_password: &str,
    new_password: &str,
) -> Result<SessionResponse, AppError> {
    if !verify_password(current_password, &user.password_hash)? {
        warn!("change password with incorrect current password");
        return Err(AppError::IncorrectPassword);
    }
    check_password(new_password)?;

    let password_hash = hash_password(new_password)?;
    let version = state.users.change_password(user.id, &password_hash).await?;
    let user = state
        .users
        .find_by_id(user.id)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    info!(token_version = version, "password changed");
    session_for(state, &user)
}

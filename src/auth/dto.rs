use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::password::MIN_PASSWORD_LEN;
use super::repo_types::{Role, User};
use crate::error::AppError;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_]{3,30}$").unwrap();
}

/// Trims and lowercases an email, rejecting anything that does not look like one.
pub(crate) fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    if !EMAIL_RE.is_match(&email) {
        return Err(AppError::validation("Invalid email"));
    }
    Ok(email)
}

pub(crate) fn check_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub(crate) fn required(field: &str, value: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// Request body for account creation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl SignUpRequest {
    pub fn normalized(self) -> Result<Self, AppError> {
        let email = normalize_email(&self.email)?;
        let username = self.username.trim().to_string();
        if !USERNAME_RE.is_match(&username) {
            return Err(AppError::validation(
                "Username must be 3-30 letters, digits or underscores",
            ));
        }
        let first_name = required("firstName", &self.first_name)?;
        let last_name = required("lastName", &self.last_name)?;
        check_password(&self.password)?;
        Ok(Self {
            email,
            username,
            first_name,
            last_name,
            password: self.password,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub otp: String,
}

/// Body for endpoints that only need an address.
#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            username: u.username.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            role: u.role,
            is_verified: u.is_verified,
            created_at: u.created_at,
        }
    }
}

/// Response returned after signup, signin or password change.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: PublicUser,
}

use rand::{rngs::OsRng, Rng};
use time::{Duration, OffsetDateTime};

use crate::config::OtpConfig;
use crate::error::AppError;

/// A freshly issued one-time code and the instant it stops being accepted.
#[derive(Debug, Clone)]
pub struct Otp {
    pub code: String,
    pub expires_at: OffsetDateTime,
}

impl Otp {
    pub fn issue(cfg: &OtpConfig) -> Self {
        Self::issue_at(cfg, OffsetDateTime::now_utc())
    }

    fn issue_at(cfg: &OtpConfig, now: OffsetDateTime) -> Self {
        Self {
            code: generate(cfg.length),
            expires_at: now + Duration::minutes(cfg.ttl_minutes),
        }
    }
}

/// Numeric code of `length` digits drawn from the OS RNG.
pub fn generate(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Accepts `submitted` only if a non-empty code is stored, matches exactly
/// and `now` is strictly before the stored expiry.
pub fn verify(
    stored_code: Option<&str>,
    stored_expiry: Option<OffsetDateTime>,
    submitted: &str,
    now: OffsetDateTime,
) -> Result<(), AppError> {
    let submitted = submitted.trim();
    match (stored_code, stored_expiry) {
        (Some(code), Some(expiry)) if !code.is_empty() && code == submitted && now < expiry => {
            Ok(())
        }
        _ => Err(AppError::InvalidOrExpired),
    }
}

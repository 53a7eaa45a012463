use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    pub length: usize,
    pub ttl_minutes: i64,
}

impl OtpConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(4..=12).contains(&self.length) {
            anyhow::bail!("OTP_LENGTH must be between 4 and 12, got {}", self.length);
        }
        if self.ttl_minutes <= 0 {
            anyhow::bail!("OTP_TTL_MINUTES must be positive, got {}", self.ttl_minutes);
        }
        Ok(())
    }
}

/// SMTP relay settings. When absent, outgoing mail is only logged.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// S3-compatible media store used for post images.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub otp: OtpConfig,
    pub smtp: Option<SmtpConfig>,
    pub media: MediaConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: env_or("JWT_ISSUER", "inkpress"),
            audience: env_or("JWT_AUDIENCE", "inkpress-users"),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60 * 24 * 7),
        };
        let otp = OtpConfig {
            length: env_parse("OTP_LENGTH", 6),
            ttl_minutes: env_parse("OTP_TTL_MINUTES", 10),
        };
        otp.validate()?;
        let smtp = match std::env::var("SMTP_HOST") {
            Ok(host) if !host.is_empty() => Some(SmtpConfig {
                host,
                port: env_parse("SMTP_PORT", 587),
                username: env_or("SMTP_USERNAME", ""),
                password: env_or("SMTP_PASSWORD", ""),
                from: env_or("MAIL_FROM", "Inkpress <no-reply@inkpress.local>"),
            }),
            _ => None,
        };
        let media = MediaConfig {
            endpoint: env_or("MEDIA_ENDPOINT", "http://localhost:9000"),
            bucket: env_or("MEDIA_BUCKET", "inkpress"),
            access_key: env_or("MEDIA_ACCESS_KEY", "minioadmin"),
            secret_key: env_or("MEDIA_SECRET_KEY", "minioadmin"),
            region: env_or("MEDIA_REGION", "us-east-1"),
        };
        Ok(Self {
            database_url,
            jwt,
            otp,
            smtp,
            media,
        })
    }
}

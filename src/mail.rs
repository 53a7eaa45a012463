use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, warn};

use crate::config::SmtpConfig;

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()>;
}

/// Sends mail through an SMTP relay using STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)?
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .build();
        Ok(Self {
            transport,
            from: cfg.from.parse()?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email.to.parse()?)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(email.html)?;
        self.transport.send(message).await?;
        info!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

/// Used when no SMTP relay is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        info!(to = %email.to, subject = %email.subject, "smtp disabled; email not sent");
        Ok(())
    }
}

/// Fire-and-forget delivery: failures are logged, never returned.
pub async fn deliver(mailer: &dyn Mailer, email: OutgoingEmail) {
    let to = email.to.clone();
    let subject = email.subject.clone();
    if let Err(e) = mailer.send(email).await {
        warn!(error = %e, %to, %subject, "email delivery failed");
    }
}

pub fn verification_code(to: &str, first_name: &str, code: &str, ttl_minutes: i64) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: "Verify your email".into(),
        html: format!(
            "<p>Hi {first_name},</p>\
             <p>Your verification code is <strong>{code}</strong>.</p>\
             <p>It expires in {ttl_minutes} minutes.</p>"
        ),
    }
}

pub fn welcome(to: &str, first_name: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: "Welcome to Inkpress".into(),
        html: format!("<p>Hi {first_name},</p><p>Your email is verified. Happy writing!</p>"),
    }
}

pub fn password_reset_code(to: &str, first_name: &str, code: &str, ttl_minutes: i64) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: "Reset your password".into(),
        html: format!(
            "<p>Hi {first_name},</p>\
             <p>Use <strong>{code}</strong> to reset your password.</p>\
             <p>It expires in {ttl_minutes} minutes. If you did not ask for this, ignore this email.</p>"
        ),
    }
}

pub fn password_changed(to: &str, first_name: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: "Your password was changed".into(),
        html: format!(
            "<p>Hi {first_name},</p>\
             <p>Your password was just reset and all other sessions were signed out.</p>"
        ),
    }
}

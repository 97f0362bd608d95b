//! Magic-link email delivery using lettre

use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use tracing::{error, info};

use crate::config::EmailConfig;

/// Email service for magic-link delivery
#[derive(Clone)]
pub struct MailerService {
    mailer: SmtpTransport,
    from: String,
    skip_sending: bool,
}

impl MailerService {
    /// Create a new mailer from configuration
    pub fn new(config: &EmailConfig) -> anyhow::Result<Self> {
        let mailer = if config.smtp_username.is_empty() || config.smtp_password.is_empty() {
            info!(
                smtp_host = %config.smtp_host,
                smtp_port = config.smtp_port,
                "SMTP credentials not configured, using unauthenticated connection (e.g., MailDev)"
            );
            SmtpTransport::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .build()
        } else {
            info!(
                smtp_host = %config.smtp_host,
                smtp_port = config.smtp_port,
                from = %config.from_email,
                "Email service initialized with authentication and TLS"
            );
            // relay() uses STARTTLS, appropriate for SMTP on port 587.
            let creds =
                Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());
            SmtpTransport::relay(&config.smtp_host)?
                .port(config.smtp_port)
                .credentials(creds)
                .build()
        };

        Ok(Self {
            mailer,
            from: format!("{} <{}>", config.from_name, config.from_email),
            skip_sending: false,
        })
    }

    /// Create a mock mailer for testing (skips actual SMTP)
    pub fn new_mock(config: &EmailConfig) -> Self {
        let mailer = SmtpTransport::builder_dangerous("localhost")
            .port(1025)
            .build();

        Self {
            mailer,
            from: format!("{} <{}>", config.from_name, config.from_email),
            skip_sending: true,
        }
    }

    /// Send a sign-in link. Delivery is the whole point of issuance, so a
    /// failure here is surfaced to the caller rather than swallowed.
    pub fn send_magic_link(
        &self,
        to: &str,
        link: &str,
        link_ttl_hours: i64,
    ) -> anyhow::Result<()> {
        if self.skip_sending {
            info!(%to, "Mock mailer: skipping SMTP send");
            return Ok(());
        }

        let body = format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2>Welcome to Solace</h2>
  <p>Click the link below to sign in and start your free trial:</p>
  <p>
    <a href="{link}" style="display: inline-block; padding: 12px 24px; background-color: #000; color: #fff; text-decoration: none; border-radius: 4px;">
      Open Solace
    </a>
  </p>
  <p style="color: #666; font-size: 14px;">This link expires in {link_ttl_hours} hours and can be used once.</p>
  <p style="color: #666; font-size: 14px;">If you didn't request this, you can safely ignore this email.</p>
</div>"#
        );

        let email = Message::builder()
            .from(self.from.parse()?)
            .to(to.parse()?)
            .subject("Your Solace sign-in link")
            .header(ContentType::TEXT_HTML)
            .body(body)?;

        match self.mailer.send(&email) {
            Ok(_) => {
                info!(%to, "Magic link email sent");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, %to, "Failed to send magic link via SMTP");
                Err(anyhow::anyhow!("SMTP error: {}", e))
            }
        }
    }
}

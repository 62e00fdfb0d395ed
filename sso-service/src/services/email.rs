use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use std::sync::Mutex;
use std::time::Duration;

use super::error::ServiceError;

/// Messages the authority sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailTemplate {
    LoginCode { code: String },
    RecoveryCode { code: String },
}

impl EmailTemplate {
    pub fn subject(&self) -> &'static str {
        match self {
            EmailTemplate::LoginCode { .. } => "Login Code",
            EmailTemplate::RecoveryCode { .. } => "Password Recovery Code",
        }
    }

    pub fn body(&self) -> String {
        match self {
            EmailTemplate::LoginCode { code } => format!(
                "Your login code is {}.\n\nIf you did not try to sign in, change your password.",
                code
            ),
            EmailTemplate::RecoveryCode { code } => format!(
                "Your password recovery code is {}.\n\nIf you did not request a reset, ignore this email.",
                code
            ),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            EmailTemplate::LoginCode { code } | EmailTemplate::RecoveryCode { code } => code,
        }
    }
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, to_email: &str, template: EmailTemplate) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl EmailService {
    pub fn new(config: &crate::config::SmtpConfig) -> Result<Self, ServiceError> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let mailer = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, port = config.port, "Email service initialized");

        Ok(Self {
            mailer,
            from_email: config.from.clone(),
        })
    }
}

#[async_trait]
impl EmailProvider for EmailService {
    #[tracing::instrument(skip(self, template), fields(subject = template.subject()))]
    async fn send(&self, to_email: &str, template: EmailTemplate) -> Result<(), ServiceError> {
        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| ServiceError::Internal(e.into()))?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| ServiceError::Internal(e.into()))?)
            .subject(template.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(template.body())
            .map_err(|e| ServiceError::Internal(e.into()))?;

        // SmtpTransport is blocking
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| ServiceError::Internal(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!("Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to send email");
                Err(ServiceError::Internal(anyhow::anyhow!(
                    "Failed to send email: {}",
                    e
                )))
            }
        }
    }
}

/// Records outgoing mail instead of sending it.
#[derive(Default)]
pub struct MockEmailService {
    sent: Mutex<Vec<(String, EmailTemplate)>>,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, oldest first.
    pub fn sent(&self) -> Vec<(String, EmailTemplate)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Code carried by the most recent mail to `to_email`.
    pub fn last_code_for(&self, to_email: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|(to, _)| to == to_email)
            .map(|(_, template)| template.code().to_string())
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send(&self, to_email: &str, template: EmailTemplate) -> Result<(), ServiceError> {
        tracing::info!(to = %to_email, subject = template.subject(), "Mock email sent");
        self.sent
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Mock email mutex poisoned: {}", e)))?
            .push((to_email.to_string(), template));
        Ok(())
    }
}

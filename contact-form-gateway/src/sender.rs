use crate::{
    config::ProviderConfig,
    mailgun::{MailgunSender, REQUEST_TIMEOUT},
    smtp::SmtpSender,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::fmt::Display;
use tracing::{info, warn};

/// One email as handed to the sending capability.
#[derive(Debug, Clone, Copy)]
pub struct OutgoingEmail<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    pub html: &'a str,
    pub reply_to: Option<&'a str>,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Whether provider credentials and a sending domain are available. When this is false,
    /// callers should not attempt to send at all.
    fn is_configured(&self) -> bool;

    async fn send(&self, email: OutgoingEmail<'_>) -> Result<(), SendError>;
}

/// The sender chosen at startup from the process configuration.
pub enum EmailTransport {
    Mailgun(MailgunSender),
    Smtp(SmtpSender),
    Disabled,
}

impl EmailTransport {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, SendError> {
        match config {
            ProviderConfig::Mailgun(mailgun) => {
                let (Some(api_key), Some(domain)) = (&mailgun.api_key, &mailgun.domain) else {
                    warn!("MAILGUN_API_KEY or MAILGUN_DOMAIN not set, email sending is disabled.");
                    return Ok(Self::Disabled);
                };
                info!("Sending email through Mailgun domain {domain}");
                Ok(Self::Mailgun(MailgunSender::new(
                    api_key.clone(),
                    domain.clone(),
                    mailgun.api_url.clone(),
                    REQUEST_TIMEOUT,
                )?))
            }
            ProviderConfig::Smtp(smtp) => {
                let (Some(url), Some(_)) = (&smtp.url, &smtp.domain) else {
                    warn!("SMTP_URL or MAIL_DOMAIN not set, email sending is disabled.");
                    return Ok(Self::Disabled);
                };
                info!("Sending email through SMTP relay");
                Ok(Self::Smtp(SmtpSender::new(
                    url.clone(),
                    smtp.username.clone(),
                    smtp.password.clone(),
                )))
            }
        }
    }
}

#[async_trait]
impl EmailSender for EmailTransport {
    fn is_configured(&self) -> bool {
        !matches!(self, EmailTransport::Disabled)
    }

    async fn send(&self, email: OutgoingEmail<'_>) -> Result<(), SendError> {
        match self {
            EmailTransport::Mailgun(sender) => sender.send(email).await,
            EmailTransport::Smtp(sender) => sender.send(email).await,
            EmailTransport::Disabled => Err(SendError::NotConfigured),
        }
    }
}

#[derive(Debug)]
pub enum SendError {
    NotConfigured,
    InvalidAddress(String),
    Rejected { status: StatusCode, body: String },
    Http(reqwest::Error),
    MalformedResponse(reqwest::Error),
    Message(lettre::error::Error),
    Smtp(lettre::transport::smtp::Error),
}

impl Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::NotConfigured => write!(f, "Email sending is not configured"),
            SendError::InvalidAddress(address) => write!(f, "Invalid address {address}"),
            SendError::Rejected { status, body } => {
                write!(f, "Provider rejected message with status {status}: {body}")
            }
            SendError::Http(error) => write!(f, "Error calling provider: {error}"),
            SendError::MalformedResponse(error) => {
                write!(f, "Malformed response from provider: {error}")
            }
            SendError::Message(error) => write!(f, "Error building message: {error}"),
            SendError::Smtp(error) => write!(f, "Error sending message: {error}"),
        }
    }
}

impl std::error::Error for SendError {}

#[cfg(test)]
pub mod test_support {
    use super::{EmailSender, OutgoingEmail, SendError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// An owned copy of an [`OutgoingEmail`], as recorded by [`FakeEmailSender`].
    #[derive(Debug, Clone, PartialEq)]
    pub struct SentEmail {
        pub from: String,
        pub to: String,
        pub subject: String,
        pub html: String,
        pub reply_to: Option<String>,
    }

    /// Records every send attempt, including the ones it was told to fail.
    pub struct FakeEmailSender {
        configured: bool,
        failing_attempt: Option<usize>,
        attempts: Mutex<Vec<SentEmail>>,
    }

    impl FakeEmailSender {
        pub fn configured() -> Self {
            Self {
                configured: true,
                failing_attempt: None,
                attempts: Default::default(),
            }
        }

        pub fn unconfigured() -> Self {
            Self {
                configured: false,
                ..Self::configured()
            }
        }

        /// Fails the attempt with the given zero-based index.
        pub fn failing_on_attempt(self, index: usize) -> Self {
            Self {
                failing_attempt: Some(index),
                ..self
            }
        }

        pub fn attempts(&self) -> Vec<SentEmail> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmailSender for FakeEmailSender {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn send(&self, email: OutgoingEmail<'_>) -> Result<(), SendError> {
            let mut attempts = self.attempts.lock().unwrap();
            let index = attempts.len();
            attempts.push(SentEmail {
                from: email.from.into(),
                to: email.to.into(),
                subject: email.subject.into(),
                html: email.html.into(),
                reply_to: email.reply_to.map(String::from),
            });
            if self.failing_attempt == Some(index) {
                Err(SendError::InvalidAddress(email.to.into()))
            } else {
                Ok(())
            }
        }
    }
}

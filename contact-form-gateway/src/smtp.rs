use crate::sender::{OutgoingEmail, SendError};
use async_once_cell::OnceCell;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::{Credentials, Mechanism},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use reqwest::Url;
use std::time::Duration;
use tracing::info;

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends messages through an SMTP relay. The transport is built on first use.
pub struct SmtpSender {
    url: String,
    username: Option<String>,
    password: Option<String>,
    mailer: OnceCell<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpSender {
    pub fn new(url: String, username: Option<String>, password: Option<String>) -> Self {
        Self {
            url,
            username,
            password,
            mailer: Default::default(),
        }
    }

    pub async fn send(&self, email: OutgoingEmail<'_>) -> Result<(), SendError> {
        let message = Self::construct_message(email)?;
        let mailer = self
            .mailer
            .get_or_try_init(self.initialise_mailer())
            .await?;
        mailer.send(message).await.map_err(SendError::Smtp)?;
        Ok(())
    }

    fn construct_message(email: OutgoingEmail<'_>) -> Result<Message, SendError> {
        let mut builder = Message::builder()
            .from(parse_mailbox(email.from)?)
            .to(parse_mailbox(email.to)?)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML);
        if let Some(reply_to) = email.reply_to {
            builder = builder.reply_to(parse_mailbox(reply_to)?);
        }
        builder
            .body(email.html.to_string())
            .map_err(SendError::Message)
    }

    async fn initialise_mailer(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, SendError> {
        info!("initialise_mailer: Connecting to {}", redacted_url(&self.url));
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::from_url(&self.url)
            .map_err(SendError::Smtp)?
            .timeout(Some(CONNECTION_TIMEOUT))
            .authentication(vec![Mechanism::Plain]);

        // Credentials only go over TLS. A relay that insists on them over plain SMTP will
        // reject the connection instead.
        if self.url.starts_with("smtps://") {
            if let (Some(username), Some(password)) = (&self.username, &self.password) {
                builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
            }
        }

        Ok(builder.build())
    }
}

// SMTP_URL may carry `user:pass@` userinfo, which must not reach the logs.
fn redacted_url(url: &str) -> String {
    let mut parsed = match Url::parse(url) {
        Ok(parsed) if parsed.has_host() => parsed,
        _ => return "<unparseable SMTP URL>".into(),
    };
    // Cannot fail once the URL has a host.
    let _ = parsed.set_username("");
    let _ = parsed.set_password(None);
    parsed.into()
}

fn parse_mailbox(address: &str) -> Result<Mailbox, SendError> {
    address
        .parse()
        .map_err(|_| SendError::InvalidAddress(address.into()))
}

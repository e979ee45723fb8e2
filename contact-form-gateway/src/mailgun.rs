use crate::sender::{OutgoingEmail, SendError};
use reqwest::Client;
use serde::Deserialize;
use std::{borrow::Cow, time::Duration};
use tracing::debug;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends messages through Mailgun's HTTP API.
pub struct MailgunSender {
    client: Client,
    api_key: String,
    domain: String,
    api_url: Cow<'static, str>,
}

impl MailgunSender {
    pub fn new(
        api_key: String,
        domain: String,
        api_url: Cow<'static, str>,
        timeout: Duration,
    ) -> Result<Self, SendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SendError::Http)?;
        Ok(Self {
            client,
            api_key,
            domain,
            api_url,
        })
    }

    pub async fn send(&self, email: OutgoingEmail<'_>) -> Result<(), SendError> {
        let mut form = vec![
            ("from", email.from),
            ("to", email.to),
            ("subject", email.subject),
            ("html", email.html),
        ];
        if let Some(reply_to) = email.reply_to {
            form.push(("h:Reply-To", reply_to));
        }

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await
            .map_err(SendError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Rejected { status, body });
        }

        let accepted: MailgunResponse = response
            .json()
            .await
            .map_err(SendError::MalformedResponse)?;
        debug!(
            "Mailgun accepted message {} to {}: {}",
            accepted.id, email.to, accepted.message
        );
        Ok(())
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/messages",
            self.api_url.trim_end_matches('/'),
            self.domain
        )
    }
}

#[derive(Deserialize)]
struct MailgunResponse {
    #[serde(default)]
    id: String,
    message: String,
}

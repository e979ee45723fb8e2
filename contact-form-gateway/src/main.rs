mod config;
mod contact;
mod mailgun;
mod routes;
mod sender;
mod smtp;
mod templates;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use config::{Config, ContactSettings};
use contact::ContactFormMessage;
use routes::{cors_layer, router};
use sender::{EmailSender, EmailTransport, OutgoingEmail, SendError};
use serde::Serialize;
use std::{borrow::Cow, sync::Arc};
use templates::{render_confirmation, render_notification};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const BRAND: &str = "Insight RTLS";
const CONFIRMATION_SUBJECT: &str = "Thanks for contacting Insight RTLS";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the process environment still applies.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let config = Config::from_env()?;
    let transport = EmailTransport::from_config(&config.provider)?;
    let handler = ContactFormMessageHandler::new(transport, config.contact_settings());
    let app = router(Arc::new(handler))
        .layer(cors_layer(&config.frontend_url)?)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("{BRAND} backend running on port {}", config.port);
    axum::serve(listener, app).await?;
    Ok(())
}

pub struct ContactFormMessageHandler<EmailSenderT: EmailSender> {
    sender: EmailSenderT,
    settings: ContactSettings,
}

impl<EmailSenderT: EmailSender> ContactFormMessageHandler<EmailSenderT> {
    pub fn new(sender: EmailSenderT, settings: ContactSettings) -> Self {
        Self { sender, settings }
    }

    pub async fn handle(&self, message: ContactFormMessage) -> Response {
        match self.process_message(message).await {
            Ok(()) => (StatusCode::OK, Json(ContactResponse::success())).into_response(),
            Err(error) => {
                error.log();
                error.into_response()
            }
        }
    }

    async fn process_message(&self, message: ContactFormMessage) -> Result<(), ContactFormError> {
        let validated_message = message.validate()?;
        let from_address = self.from_address()?;
        if !self.sender.is_configured() {
            return Err(ContactFormError::NotConfigured);
        }
        let Some(from_address) = from_address else {
            return Err(ContactFormError::Misconfigured(
                "No sender address, set COMPANY_EMAIL or the sending domain".into(),
            ));
        };
        let Some(contact_email) = self.settings.contact_email.as_deref() else {
            return Err(ContactFormError::Misconfigured(
                "No recipient address, set CONTACT_EMAIL".into(),
            ));
        };

        let confirmation_html = render_confirmation(&validated_message).map_err(|e| {
            ContactFormError::InternalError(format!("Error rendering confirmation: {e}"))
        })?;
        let notification_html = render_notification(&validated_message).map_err(|e| {
            ContactFormError::InternalError(format!("Error rendering notification: {e}"))
        })?;

        self.sender
            .send(OutgoingEmail {
                from: &from_address,
                to: validated_message.email,
                subject: CONFIRMATION_SUBJECT,
                html: &confirmation_html,
                reply_to: None,
            })
            .await?;
        self.sender
            .send(OutgoingEmail {
                from: &from_address,
                to: contact_email,
                subject: &format!("New contact from {}", validated_message.name),
                html: &notification_html,
                reply_to: Some(validated_message.email),
            })
            .await?;

        info!(
            name = validated_message.name,
            email = validated_message.email,
            "Contact form submitted"
        );
        Ok(())
    }

    /// The configured company address, or a no-reply address on the sending domain. `None`
    /// when neither is configured.
    fn from_address(&self) -> Result<Option<Cow<'_, str>>, ContactFormError> {
        let from_address = match (&self.settings.company_email, &self.settings.sending_domain) {
            (Some(company_email), _) => Cow::Borrowed(company_email.as_str()),
            (None, Some(domain)) => Cow::Owned(format!("{BRAND} <noreply@{domain}>")),
            (None, None) => return Ok(None),
        };
        if !from_address.contains('@') {
            return Err(ContactFormError::Misconfigured(format!(
                "Invalid sender address {from_address:?}, check COMPANY_EMAIL"
            )));
        }
        Ok(Some(from_address))
    }
}

#[derive(Serialize)]
struct ContactResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

impl ContactResponse {
    fn success() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    fn failure(message: &'static str) -> Self {
        Self {
            success: false,
            message: Some(message),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum ContactFormError {
    MissingFields,
    InvalidEmail(String),
    InvalidPayload(String),
    NotConfigured,
    Misconfigured(String),
    InternalError(String),
}

impl ContactFormError {
    fn log(&self) {
        match self {
            ContactFormError::MissingFields
            | ContactFormError::InvalidEmail(_)
            | ContactFormError::InvalidPayload(_) => {
                warn!("Client error in contact form submission: {self}");
            }
            ContactFormError::NotConfigured => {
                warn!("Rejecting contact form submission: {self}");
            }
            ContactFormError::Misconfigured(_) | ContactFormError::InternalError(_) => {
                error!("Contact error: {self}");
            }
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ContactFormError::MissingFields
            | ContactFormError::InvalidEmail(_)
            | ContactFormError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ContactFormError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ContactFormError::Misconfigured(_) | ContactFormError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The message shown to the caller. Never includes the internal description.
    fn public_message(&self) -> &'static str {
        match self {
            ContactFormError::MissingFields => "Missing required fields",
            ContactFormError::InvalidEmail(_) => "Invalid email address",
            ContactFormError::InvalidPayload(_) => "Invalid request body",
            ContactFormError::NotConfigured => "Email service not configured on server.",
            ContactFormError::Misconfigured(_) => "Email configuration error.",
            ContactFormError::InternalError(_) => "Server error",
        }
    }
}

impl IntoResponse for ContactFormError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(ContactResponse::failure(self.public_message())),
        )
            .into_response()
    }
}

impl From<SendError> for ContactFormError {
    fn from(error: SendError) -> Self {
        ContactFormError::InternalError(error.to_string())
    }
}

impl std::fmt::Display for ContactFormError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactFormError::MissingFields => write!(f, "Missing required fields"),
            ContactFormError::InvalidEmail(email) => write!(f, "Invalid email address {email}"),
            ContactFormError::InvalidPayload(description) => {
                write!(f, "Invalid request body: {description}")
            }
            ContactFormError::NotConfigured => write!(f, "Email service not configured"),
            ContactFormError::Misconfigured(description) => {
                write!(f, "Email configuration error: {description}")
            }
            ContactFormError::InternalError(description) => {
                write!(f, "Internal error: {description}")
            }
        }
    }
}

impl std::error::Error for ContactFormError {}

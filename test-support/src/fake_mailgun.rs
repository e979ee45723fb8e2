use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use log::debug;
use serde::Deserialize;
use serde_json::json;
use std::{
    borrow::Cow,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{net::TcpListener, task::JoinHandle};

const MESSAGES_PATH: &str = "/v3/{domain}/messages";

/// A stand-in for Mailgun's message sending API which records what it accepts.
#[derive(Clone)]
pub struct FakeMailgun {
    required_api_key: Cow<'static, str>,
    required_domain: Cow<'static, str>,
    reject_with: Option<StatusCode>,
    return_invalid_response: bool,
    response_delay: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub domain: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub reply_to: Option<String>,
}

#[derive(Deserialize)]
struct MessageForm {
    from: String,
    to: String,
    subject: String,
    html: String,
    #[serde(rename = "h:Reply-To")]
    reply_to: Option<String>,
}

struct FakeMailgunState {
    fake: FakeMailgun,
    received: Arc<Mutex<Vec<ReceivedMessage>>>,
}

impl FakeMailgun {
    pub fn new(
        required_api_key: impl Into<Cow<'static, str>>,
        required_domain: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            required_api_key: required_api_key.into(),
            required_domain: required_domain.into(),
            reject_with: None,
            return_invalid_response: false,
            response_delay: None,
        }
    }

    /// Answers every authorised request with the given error status.
    pub fn reject_with(self, status: StatusCode) -> Self {
        Self {
            reject_with: Some(status),
            ..self
        }
    }

    pub fn return_invalid_response(self) -> Self {
        Self {
            return_invalid_response: true,
            ..self
        }
    }

    pub fn delay_responses(self, delay: Duration) -> Self {
        Self {
            response_delay: Some(delay),
            ..self
        }
    }

    /// Serves the fake on an ephemeral loopback port until the returned handle is dropped.
    pub async fn start(self) -> RunningFakeMailgun {
        let received = Arc::new(Mutex::new(Vec::new()));
        let state = Arc::new(FakeMailgunState {
            fake: self,
            received: received.clone(),
        });
        let app = Router::new()
            .route(MESSAGES_PATH, post(send_message))
            .with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        RunningFakeMailgun {
            address,
            received,
            server,
        }
    }

    fn is_authorised(&self, headers: &HeaderMap) -> bool {
        let expected = format!(
            "Basic {}",
            STANDARD.encode(format!("api:{}", self.required_api_key))
        );
        headers
            .get(header::AUTHORIZATION)
            .is_some_and(|value| value == expected.as_str())
    }
}

pub struct RunningFakeMailgun {
    address: SocketAddr,
    received: Arc<Mutex<Vec<ReceivedMessage>>>,
    server: JoinHandle<()>,
}

impl RunningFakeMailgun {
    /// Base URL to configure in place of `https://api.mailgun.net/v3`.
    pub fn api_url(&self) -> String {
        format!("http://{}/v3", self.address)
    }

    pub fn received_messages(&self) -> Vec<ReceivedMessage> {
        self.received.lock().unwrap().clone()
    }
}

impl Drop for RunningFakeMailgun {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn send_message(
    State(state): State<Arc<FakeMailgunState>>,
    Path(domain): Path<String>,
    headers: HeaderMap,
    Form(form): Form<MessageForm>,
) -> Response {
    let fake = &state.fake;
    if let Some(delay) = fake.response_delay {
        tokio::time::sleep(delay).await;
    }
    if !fake.is_authorised(&headers) {
        return (StatusCode::UNAUTHORIZED, "Forbidden").into_response();
    }
    if domain != fake.required_domain {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": format!("Domain not found: {domain}") })),
        )
            .into_response();
    }
    if let Some(status) = fake.reject_with {
        return (
            status,
            Json(json!({ "message": "Rejected by fake Mailgun" })),
        )
            .into_response();
    }
    if fake.return_invalid_response {
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            "Invalid response",
        )
            .into_response();
    }

    debug!("Fake Mailgun accepted message to {}: {}", form.to, form.subject);
    let id = {
        let mut received = state.received.lock().unwrap();
        received.push(ReceivedMessage {
            domain: domain.clone(),
            from: form.from,
            to: form.to,
            subject: form.subject,
            html: form.html,
            reply_to: form.reply_to,
        });
        format!("<{}.fake@{domain}>", received.len())
    };
    (
        StatusCode::OK,
        Json(json!({ "id": id, "message": "Queued. Thank you." })),
    )
        .into_response()
}

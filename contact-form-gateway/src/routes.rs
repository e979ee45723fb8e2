use crate::{
    contact::ContactFormMessage, sender::EmailSender, ContactFormError, ContactFormMessageHandler,
};
use axum::{
    extract::{FromRequest, Request, State},
    http::{
        header::{InvalidHeaderValue, CONTENT_TYPE},
        HeaderValue, Method,
    },
    response::Response,
    routing::{get, post},
    Form, Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub fn router<EmailSenderT: EmailSender + 'static>(
    handler: Arc<ContactFormMessageHandler<EmailSenderT>>,
) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/contact", post(contact::<EmailSenderT>))
        .with_state(handler)
}

/// Allows the website at `frontend_url` to call the API with credentials. Requests from any
/// other origin get no `Access-Control-Allow-Origin` header.
pub fn cors_layer(frontend_url: &str) -> Result<CorsLayer, InvalidHeaderValue> {
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list([frontend_url.parse::<HeaderValue>()?]))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true))
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    time: String,
}

async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

async fn contact<EmailSenderT: EmailSender + 'static>(
    State(handler): State<Arc<ContactFormMessageHandler<EmailSenderT>>>,
    ContactPayload(message): ContactPayload,
) -> Response {
    handler.handle(message).await
}

/// A contact form submission sent either as JSON or as a url-encoded form. Bodies of any other
/// type yield an empty submission, which then fails validation.
pub struct ContactPayload(pub ContactFormMessage);

impl<S: Send + Sync> FromRequest<S> for ContactPayload {
    type Rejection = ContactFormError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let message = if content_type.starts_with("application/json") {
            let Json(message) = Json::<ContactFormMessage>::from_request(req, state)
                .await
                .map_err(|rejection| invalid_payload(rejection.body_text()))?;
            message
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(message) = Form::<ContactFormMessage>::from_request(req, state)
                .await
                .map_err(|rejection| invalid_payload(rejection.body_text()))?;
            message
        } else {
            ContactFormMessage::default()
        };
        Ok(Self(message))
    }
}

fn invalid_payload(description: String) -> ContactFormError {
    let error = ContactFormError::InvalidPayload(description);
    error.log();
    error
}

#[cfg(test)]
mod tests {
    use super::{cors_layer, router};
    use crate::{
        config::ContactSettings, sender::test_support::FakeEmailSender, ContactFormMessageHandler,
    };
    use axum::{
        body::{to_bytes, Body},
        http::{Request, Response},
        Router,
    };
    use googletest::prelude::*;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const FRONTEND_URL: &str = "https://insight-rtls.example";

    type HandlerForTesting = Arc<ContactFormMessageHandler<FakeEmailSender>>;

    fn app() -> (Router, HandlerForTesting) {
        let handler = Arc::new(ContactFormMessageHandler::new(
            FakeEmailSender::configured(),
            ContactSettings {
                company_email: None,
                contact_email: Some("sales@insight-rtls.example".into()),
                sending_domain: Some("mg.insight-rtls.example".into()),
            },
        ));
        let app = router(handler.clone()).layer(cors_layer(FRONTEND_URL).unwrap());
        (app, handler)
    }

    fn post_contact(content_type: Option<&str>, body: impl Into<Body>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/api/contact");
        if let Some(content_type) = content_type {
            builder = builder.header("Content-Type", content_type);
        }
        builder.body(body.into()).unwrap()
    }

    async fn body_json(response: Response<Body>) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[googletest::test]
    #[tokio::test]
    async fn health_reports_ok_with_timestamp() {
        let (app, _) = app();

        let response = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        expect_that!(response.status().as_u16(), eq(200));
        let body = body_json(response).await;
        expect_that!(body["status"], eq(json!("ok")));
        let time = body["time"].as_str().unwrap_or_default();
        expect_that!(chrono::DateTime::parse_from_rfc3339(time), ok(anything()));
        expect_that!(time, ends_with("Z"));
    }

    #[googletest::test]
    #[tokio::test]
    async fn accepts_json_submission() {
        let (app, handler) = app();
        let body = json!({"name": "Jo", "email": "jo@x.com", "message": "Hi"}).to_string();

        let response = app
            .oneshot(post_contact(Some("application/json"), body))
            .await
            .unwrap();

        expect_that!(response.status().as_u16(), eq(200));
        expect_that!(body_json(response).await, eq(json!({"success": true})));
        expect_that!(handler.sender.attempts(), len(eq(2)));
    }

    #[googletest::test]
    #[tokio::test]
    async fn accepts_form_encoded_submission() {
        let (app, handler) = app();

        let response = app
            .oneshot(post_contact(
                Some("application/x-www-form-urlencoded"),
                "name=Jo&email=jo%40x.com&company=Acme&message=line+one%0Aline+two",
            ))
            .await
            .unwrap();

        expect_that!(response.status().as_u16(), eq(200));
        let attempts = handler.sender.attempts();
        assert_that!(attempts, len(eq(2)));
        expect_that!(attempts[0].to, eq("jo@x.com"));
        expect_that!(attempts[1].html, contains_substring("Acme"));
        expect_that!(attempts[1].html, contains_substring("line one<br>line two"));
    }

    #[googletest::test]
    #[tokio::test]
    async fn rejects_undecodable_json() {
        let (app, handler) = app();

        let response = app
            .oneshot(post_contact(Some("application/json"), "{\"name\": "))
            .await
            .unwrap();

        expect_that!(response.status().as_u16(), eq(400));
        expect_that!(
            body_json(response).await,
            eq(json!({"success": false, "message": "Invalid request body"}))
        );
        expect_that!(handler.sender.attempts(), empty());
    }

    #[googletest::test]
    #[tokio::test]
    async fn treats_body_without_content_type_as_empty_submission() {
        let (app, handler) = app();

        let response = app.oneshot(post_contact(None, "name=Jo")).await.unwrap();

        expect_that!(response.status().as_u16(), eq(400));
        expect_that!(
            body_json(response).await,
            eq(json!({"success": false, "message": "Missing required fields"}))
        );
        expect_that!(handler.sender.attempts(), empty());
    }

    #[googletest::test]
    #[tokio::test]
    async fn allows_configured_origin() {
        let (app, _) = app();
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/contact")
            .header("Origin", FRONTEND_URL)
            .header("Access-Control-Request-Method", "POST")
            .header("Access-Control-Request-Headers", "content-type")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        expect_that!(
            response.headers().get("Access-Control-Allow-Origin"),
            some(eq(FRONTEND_URL))
        );
        expect_that!(
            response.headers().get("Access-Control-Allow-Credentials"),
            some(eq("true"))
        );
    }

    #[googletest::test]
    #[tokio::test]
    async fn does_not_allow_other_origins() {
        let (app, _) = app();
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/contact")
            .header("Origin", "https://evil.example")
            .header("Access-Control-Request-Method", "POST")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        expect_that!(response.headers().get("Access-Control-Allow-Origin"), none());
    }

    #[googletest::test]
    #[tokio::test]
    async fn echoes_origin_on_simple_requests_only_when_configured() {
        let (app, _) = app();
        let request_from = |origin: &str| {
            Request::get("/api/health")
                .header("Origin", origin)
                .body(Body::empty())
                .unwrap()
        };

        let allowed = app.clone().oneshot(request_from(FRONTEND_URL)).await.unwrap();
        let other = app
            .oneshot(request_from("https://evil.example"))
            .await
            .unwrap();

        expect_that!(
            allowed.headers().get("Access-Control-Allow-Origin"),
            some(eq(FRONTEND_URL))
        );
        expect_that!(other.status().as_u16(), eq(200));
        expect_that!(other.headers().get("Access-Control-Allow-Origin"), none());
    }
}

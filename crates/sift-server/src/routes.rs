use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use serde_json::Value;
use sift_ai::AiService;
use sift_core::{AnalyzeInput, ReplyTone};
use std::sync::Arc;

const MAX_TONE_CHARS: usize = 30;

#[derive(Clone)]
pub struct AppState {
    pub ai: Arc<AiService>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
}

#[derive(Debug, Serialize)]
struct ReplyResponse {
    reply: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/ai/analyze", post(handle_analyze))
        .route("/api/ai/reply", post(handle_reply))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(middleware::from_fn(cors_middleware))
}

async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse { ok: true })
}

/// Bodies are read whatever their content type; anything that is not JSON
/// reads as an empty object.
fn json_or_empty(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

async fn handle_analyze(State(state): State<AppState>, body: Bytes) -> Response {
    let body = json_or_empty(&body);
    let input = email_input(&body);
    if !input.has_content() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Missing email content.".to_string(),
            }),
        )
            .into_response();
    }

    let analysis = state.ai.analyze(&input).await;
    tracing::debug!(priority = analysis.priority.as_str(), "analyze request served");
    Json(analysis).into_response()
}

async fn handle_reply(State(state): State<AppState>, body: Bytes) -> Response {
    let body = json_or_empty(&body);
    let tone = ReplyTone::parse(&capped_text(&body, "tone", MAX_TONE_CHARS)).unwrap_or_default();
    let input = body.get("email").map(email_input).unwrap_or_default();

    let reply = state.ai.draft_reply(tone, &input).await;
    Json(ReplyResponse { reply }).into_response()
}

/// Non-string fields read as empty; every field is truncated to its cap.
fn email_input(body: &Value) -> AnalyzeInput {
    AnalyzeInput {
        id: text(body, "id"),
        from: text(body, "from"),
        subject: text(body, "subject"),
        snippet: Some(text(body, "snippet")),
        body_text: Some(text(body, "bodyText")),
    }
    .capped()
}

fn text(body: &Value, key: &str) -> String {
    body.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn capped_text(body: &Value, key: &str, max_chars: usize) -> String {
    text(body, key).chars().take(max_chars).collect()
}

async fn cors_middleware(request: axum::extract::Request, next: Next) -> Response {
    if request.method() == axum::http::Method::OPTIONS {
        return (
            StatusCode::NO_CONTENT,
            [
                ("Access-Control-Allow-Origin", "*"),
                ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
                ("Access-Control-Allow-Headers", "Content-Type, Authorization"),
                ("Access-Control-Max-Age", "3600"),
            ],
        )
            .into_response();
    }

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
        axum::http::HeaderValue::from_static("*"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use sift_ai::{classify, fallback_reply, AiError, CompletionProvider, CompletionRequest};
    use tower::ServiceExt;

    struct Unreachable;

    #[async_trait]
    impl CompletionProvider for Unreachable {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, AiError> {
            Err(AiError::Api {
                status: 503,
                body: "unavailable".to_string(),
            })
        }
    }

    fn app(ai: AiService) -> Router {
        router(AppState { ai: Arc::new(ai) }, 1024 * 1024)
    }

    async fn call(
        app: Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Response) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .oneshot(request.body(body).expect("request"))
            .await
            .expect("response");
        (response.status(), response)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    fn overdue_invoice() -> Value {
        serde_json::json!({
            "from": "billing@vendor.com",
            "subject": "Invoice overdue - action required",
            "snippet": "Please pay by EOD",
            "bodyText": ""
        })
    }

    #[tokio::test]
    async fn health_reports_ok_with_cors() {
        let (status, response) =
            call(app(AiService::heuristic_only()), "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            response.headers().get("access-control-allow-origin").map(|v| v.as_bytes()),
            Some(&b"*"[..])
        );
        assert_eq!(json_body(response).await, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn preflight_is_answered_without_routing() {
        let (status, _) =
            call(app(AiService::heuristic_only()), "OPTIONS", "/api/ai/analyze", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn analyze_without_provider_is_heuristic() {
        let (status, response) = call(
            app(AiService::heuristic_only()),
            "POST",
            "/api/ai/analyze",
            Some(overdue_invoice()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["priority"], "high");
        assert_eq!(body["category"], "urgent");
        let actions = body["suggestedActions"].as_array().expect("actions");
        assert!(!actions.is_empty());
        assert!(!actions.iter().any(|action| action == "archive"));
    }

    #[tokio::test]
    async fn unreachable_provider_matches_heuristic() {
        let (_, response) = call(
            app(AiService::new(Some(Arc::new(Unreachable)))),
            "POST",
            "/api/ai/analyze",
            Some(overdue_invoice()),
        )
        .await;

        let expected = classify(&email_input(&overdue_invoice()));
        assert_eq!(
            json_body(response).await,
            serde_json::to_value(expected).expect("serialize")
        );
    }

    #[tokio::test]
    async fn analyze_rejects_empty_content() {
        let (status, response) = call(
            app(AiService::heuristic_only()),
            "POST",
            "/api/ai/analyze",
            Some(serde_json::json!({"from": "a@b.com", "subject": 42, "snippet": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"error": "Missing email content."})
        );
    }

    #[tokio::test]
    async fn reply_falls_back_for_unknown_tone() {
        let (status, response) = call(
            app(AiService::heuristic_only()),
            "POST",
            "/api/ai/reply",
            Some(serde_json::json!({"tone": "sarcastic", "email": overdue_invoice()})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json_body(response).await["reply"],
            fallback_reply(ReplyTone::Professional)
        );
    }

    #[tokio::test]
    async fn reply_without_email_still_answers() {
        let (_, response) = call(
            app(AiService::heuristic_only()),
            "POST",
            "/api/ai/reply",
            Some(serde_json::json!({"tone": "friendly"})),
        )
        .await;
        assert_eq!(
            json_body(response).await["reply"],
            fallback_reply(ReplyTone::Friendly)
        );
    }

    #[tokio::test]
    async fn reply_without_content_type_uses_fallback() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/ai/reply")
            .body(Body::from(r#"{"tone":"friendly"}"#))
            .expect("request");
        let response = app(AiService::heuristic_only())
            .oneshot(request)
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await["reply"],
            fallback_reply(ReplyTone::Friendly)
        );
    }

    #[tokio::test]
    async fn non_json_body_reads_as_empty() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/ai/reply")
            .header("content-type", "text/plain")
            .body(Body::from("not json"))
            .expect("request");
        let response = app(AiService::heuristic_only())
            .oneshot(request)
            .await
            .expect("response");
        assert_eq!(
            json_body(response).await["reply"],
            fallback_reply(ReplyTone::Professional)
        );

        let (status, _) =
            call(app(AiService::heuristic_only()), "POST", "/api/ai/analyze", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn oversized_fields_are_truncated() {
        let input = email_input(&serde_json::json!({
            "subject": "s".repeat(600),
            "from": ["not", "a", "string"]
        }));
        assert_eq!(input.subject.chars().count(), 500);
        assert!(input.from.is_empty());
        let tone = serde_json::json!({"tone": "x".repeat(40)});
        assert_eq!(capped_text(&tone, "tone", 30).len(), 30);
    }
}

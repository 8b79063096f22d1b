use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use bytes::Bytes;
use serde_json::{Value, json};
use tower::ServiceExt;

use tguard_common::ProxyConfig;
use tguard_provider::{
    UpstreamClient, UpstreamFailure, UpstreamHttpRequest, UpstreamHttpResponse,
};
use tguard_router::{ProxyState, proxy_router};

struct StubUpstream {
    status: u16,
    body: String,
}

impl UpstreamClient for StubUpstream {
    fn send<'a>(
        &'a self,
        _req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>
    {
        let status = self.status;
        let body = Bytes::from(self.body.clone());
        Box::pin(async move { Ok(UpstreamHttpResponse { status, body }) })
    }
}

fn app_with(status: u16, body: impl Into<String>, api_key: Option<&str>) -> Router {
    let config = ProxyConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        api_key: api_key.map(str::to_string),
        base_url: None,
        proxy: None,
    };
    proxy_router(ProxyState {
        config: Arc::new(config),
        upstream: Arc::new(StubUpstream {
            status,
            body: body.into(),
        }),
    })
}

fn envelope(text: &str) -> String {
    json!({"candidates": [{"content": {"parts": [{"text": text}]}}]}).to_string()
}

fn page_request(content: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/extension-analyze")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "pageContent": content }).to_string()))
        .unwrap()
}

fn multipart_request(field_name: &str) -> Request<Body> {
    let body = format!(
        "--BOUNDARY\r\n\
         content-disposition: form-data; name=\"{field_name}\"; filename=\"doc.jpg\"\r\n\
         content-type: image/jpeg\r\n\r\n\
         fake image bytes\r\n\
         --BOUNDARY--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri("/analyze")
        .header(
            header::CONTENT_TYPE,
            "multipart/form-data; boundary=BOUNDARY",
        )
        .body(Body::from(body))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

const LONG_PAGE: &str = "This privacy policy grants the operator a perpetual license to all user content and data.";

#[tokio::test]
async fn options_preflight_returns_200_with_cors_headers() {
    for uri in ["/analyze", "/extension-analyze"] {
        let app = app_with(200, "", None);
        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
        assert_eq!(
            response.headers().get("access-control-allow-methods").unwrap(),
            "POST, OPTIONS"
        );
        assert_eq!(
            response.headers().get("access-control-allow-headers").unwrap(),
            "Content-Type"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(bytes.is_empty());
    }
}

#[tokio::test]
async fn non_post_method_gets_405_with_allow_header_and_cors() {
    let app = app_with(200, "", Some("key"));
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/analyze")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers().get(header::ALLOW).unwrap(), "POST, OPTIONS");
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
    let body = body_json(response).await;
    assert_eq!(body["error"], "Method Not Allowed");
}

#[tokio::test]
async fn multipart_without_document_field_is_rejected() {
    let app = app_with(200, "", Some("key"));
    let response = app.oneshot(multipart_request("attachment")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "No file was provided in the request.");
}

#[tokio::test]
async fn non_multipart_analyze_body_is_rejected() {
    let app = app_with(200, "", Some("key"));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/analyze")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(!body["error"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn short_or_missing_page_content_is_rejected() {
    let app = app_with(200, "", Some("key"));
    let response = app.oneshot(page_request("too short")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Page content is too short or missing");

    let app = app_with(200, "", Some("key"));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/extension-analyze")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_credential_is_a_configuration_error_for_valid_input() {
    let app = app_with(200, envelope("{}"), None);
    let response = app.oneshot(page_request(LONG_PAGE)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Server configuration error");

    let app = app_with(200, envelope("{}"), None);
    let response = app.oneshot(multipart_request("document")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Server configuration error: API key not found.");
}

#[tokio::test]
async fn upstream_error_status_and_message_are_mirrored() {
    let app = app_with(
        429,
        json!({"error": {"message": "quota exceeded"}}).to_string(),
        Some("key"),
    );
    let response = app.oneshot(page_request(LONG_PAGE)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert_eq!(body["error"], "quota exceeded");
}

#[tokio::test]
async fn upstream_error_without_message_uses_generic_fallback() {
    let app = app_with(503, "{}", Some("key"));
    let response = app.oneshot(page_request(LONG_PAGE)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"], "AI service error");
}

#[tokio::test]
async fn fenced_reply_is_normalized_end_to_end() {
    let reply = "Sure, here is the analysis:\n```json\n{\"summary\":\"x\",\"risks\":[]}\n```";
    let app = app_with(200, envelope(reply), Some("key"));
    let response = app.oneshot(page_request(LONG_PAGE)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["summary"], "x");
    assert_eq!(body["risks"], json!([]));
}

#[tokio::test]
async fn plain_text_reply_degrades_to_a_200_with_literal_summary() {
    let app = app_with(200, envelope("not json at all"), Some("key"));
    let response = app.oneshot(page_request(LONG_PAGE)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["summary"], "not json at all");
    assert_eq!(body["risks"], json!([]));
}

#[tokio::test]
async fn document_reply_keeps_key_details_and_coerces_legacy_risks() {
    let reply = json!({
        "summary": "a lease",
        "keyDetails": ["12 month term"],
        "risks": [{"risk": "early termination fee", "severity": "High"}]
    })
    .to_string();
    let app = app_with(200, envelope(&reply), Some("key"));
    let response = app.oneshot(multipart_request("document")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["keyDetails"], json!(["12 month term"]));
    assert_eq!(body["risks"][0]["severity"], "high");
    assert_eq!(body["risks"][0]["description"], "early termination fee");
}

#[tokio::test]
async fn page_reply_never_carries_key_details() {
    let reply = json!({"summary": "s", "keyDetails": ["leaked"], "risks": []}).to_string();
    let app = app_with(200, envelope(&reply), Some("key"));
    let response = app.oneshot(page_request(LONG_PAGE)).await.unwrap();
    let body = body_json(response).await;
    assert!(body.get("keyDetails").is_none());
}

#[tokio::test]
async fn envelope_without_answer_text_is_an_invalid_upstream_response() {
    let app = app_with(200, "{}", Some("key"));
    let response = app.oneshot(page_request(LONG_PAGE)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid AI response");
}

#[tokio::test]
async fn error_responses_still_carry_cors_headers() {
    let app = app_with(200, "", Some("key"));
    let response = app.oneshot(page_request("x")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}

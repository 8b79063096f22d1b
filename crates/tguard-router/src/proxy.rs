use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use tracing::Instrument;

use tguard_common::ProxyConfig;
use tguard_normalize::{DocumentKind, candidate_text, normalize_text};
use tguard_protocol::analysis::{AnalysisResult, ErrorBody};
use tguard_protocol::gemini::GenerateContentResponse;
use tguard_provider::{
    AnalysisRequest, UpstreamClient, build_generate_request, extract_error_message,
};

const MIN_PAGE_TEXT_CHARS: usize = 50;
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<ProxyConfig>,
    pub upstream: Arc<dyn UpstreamClient>,
}

pub fn proxy_router(state: ProxyState) -> Router {
    Router::new()
        .route(
            "/analyze",
            post(analyze).options(preflight).fallback(method_not_allowed),
        )
        .route(
            "/extension-analyze",
            post(extension_analyze)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .layer(middleware::from_fn(boundary))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Outermost per-request layer: trace span, request log line, and the
/// CORS headers every response must carry regardless of branch.
async fn boundary(req: Request, next: Next) -> Response {
    let trace_id = uuid::Uuid::now_v7().to_string();
    let span = tracing::info_span!(
        "request",
        trace_id = %trace_id,
        method = %req.method(),
        path = req.uri().path()
    );
    async move {
        let mut response = next.run(req).await;
        let headers = response.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        );
        tracing::info!(status = response.status().as_u16(), "request handled");
        response
    }
    .instrument(span)
    .await
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> ProxyError {
    ProxyError::MethodNotAllowed
}

/// Failure taxonomy for the request path. Every variant renders as a JSON
/// `{error}` body; messages carry the client-facing text, details stay in
/// the server log.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Method Not Allowed")]
    MethodNotAllowed,
    #[error("{0}")]
    Configuration(String),
    #[error("{message}")]
    Upstream { status: u16, message: String },
    #[error("{0}")]
    InvalidUpstreamResponse(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::Configuration(_)
            | ProxyError::InvalidUpstreamResponse(_)
            | ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        };
        let is_method_not_allowed = matches!(self, ProxyError::MethodNotAllowed);
        let body = ErrorBody {
            error: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        if is_method_not_allowed {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("POST, OPTIONS"));
        }
        response
    }
}

/// Client-facing error strings, fixed per endpoint.
struct EndpointMessages {
    configuration: &'static str,
    upstream_fallback: &'static str,
    invalid_upstream: &'static str,
    internal: &'static str,
}

const DOCUMENT_MESSAGES: EndpointMessages = EndpointMessages {
    configuration: "Server configuration error: API key not found.",
    upstream_fallback: "An error occurred with the AI service.",
    invalid_upstream: "Invalid response from the AI service.",
    internal: "An internal server error occurred processing your request.",
};

const PAGE_TEXT_MESSAGES: EndpointMessages = EndpointMessages {
    configuration: "Server configuration error",
    upstream_fallback: "AI service error",
    invalid_upstream: "Invalid AI response",
    internal: "Internal server error",
};

async fn analyze(
    State(state): State<ProxyState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    match analyze_inner(state, multipart).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn analyze_inner(
    state: ProxyState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<AnalysisResult, ProxyError> {
    let mut multipart = multipart.map_err(|_| missing_document())?;
    let (bytes, mime_type) = read_document_field(&mut multipart)
        .await?
        .ok_or_else(missing_document)?;

    run_analysis(
        &state,
        AnalysisRequest::Document { bytes, mime_type },
        DocumentKind::Document,
        &DOCUMENT_MESSAGES,
    )
    .await
}

fn missing_document() -> ProxyError {
    ProxyError::BadRequest("No file was provided in the request.".to_string())
}

async fn read_document_field(
    multipart: &mut Multipart,
) -> Result<Option<(Bytes, Option<String>)>, ProxyError> {
    loop {
        let field = multipart.next_field().await.map_err(|err| {
            tracing::error!(error = %err, "multipart read failed");
            ProxyError::Internal(DOCUMENT_MESSAGES.internal.to_string())
        })?;
        let Some(field) = field else {
            return Ok(None);
        };
        if field.name() != Some("document") {
            continue;
        }
        let mime_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(|err| {
            tracing::error!(error = %err, "multipart field read failed");
            ProxyError::Internal(DOCUMENT_MESSAGES.internal.to_string())
        })?;
        return Ok(Some((bytes, mime_type)));
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageAnalyzeBody {
    #[serde(default)]
    page_content: Option<String>,
}

async fn extension_analyze(
    State(state): State<ProxyState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    match extension_analyze_inner(state, body).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn extension_analyze_inner(
    state: ProxyState,
    body: Result<Bytes, BytesRejection>,
) -> Result<AnalysisResult, ProxyError> {
    let body = body.map_err(|err| {
        tracing::error!(error = %err, "request body read failed");
        ProxyError::Internal(PAGE_TEXT_MESSAGES.internal.to_string())
    })?;
    let content = serde_json::from_slice::<PageAnalyzeBody>(&body)
        .ok()
        .and_then(|body| body.page_content)
        .filter(|content| content.chars().count() >= MIN_PAGE_TEXT_CHARS)
        .ok_or_else(|| {
            ProxyError::BadRequest("Page content is too short or missing".to_string())
        })?;

    run_analysis(
        &state,
        AnalysisRequest::PageText { content },
        DocumentKind::PageText,
        &PAGE_TEXT_MESSAGES,
    )
    .await
}

/// Shared tail of both endpoints: credential check, the single upstream
/// call, and normalization. No retries, no second call.
async fn run_analysis(
    state: &ProxyState,
    request: AnalysisRequest,
    kind: DocumentKind,
    messages: &EndpointMessages,
) -> Result<AnalysisResult, ProxyError> {
    let api_key = state.config.require_api_key().map_err(|err| {
        tracing::error!(error = %err, "upstream credential missing");
        ProxyError::Configuration(messages.configuration.to_string())
    })?;

    let upstream_request = build_generate_request(&state.config, api_key, &request);
    let response = state.upstream.send(upstream_request).await.map_err(|err| {
        tracing::error!(error = %err, "upstream call failed");
        ProxyError::Internal(messages.internal.to_string())
    })?;

    if !response.is_success() {
        let message = extract_error_message(&response.body)
            .unwrap_or_else(|| messages.upstream_fallback.to_string());
        tracing::error!(status = response.status, message = %message, "upstream reported an error");
        return Err(ProxyError::Upstream {
            status: response.status,
            message,
        });
    }

    let envelope: GenerateContentResponse =
        serde_json::from_slice(&response.body).map_err(|err| {
            tracing::error!(error = %err, "upstream body was not a generateContent envelope");
            ProxyError::Internal(messages.internal.to_string())
        })?;

    let Some(text) = candidate_text(&envelope) else {
        tracing::error!("upstream envelope carried no answer text");
        return Err(ProxyError::InvalidUpstreamResponse(
            messages.invalid_upstream.to_string(),
        ));
    };

    Ok(normalize_text(text, kind))
}

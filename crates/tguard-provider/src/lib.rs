//! Upstream side of the proxy.
//!
//! Request construction is pure: `gemini` builds an [`UpstreamHttpRequest`]
//! from a validated analysis request without touching the network. IO lives
//! behind the [`UpstreamClient`] trait so the HTTP boundary can be tested
//! against a stub upstream.

pub mod gemini;
pub mod headers;
pub mod upstream_client;

pub use gemini::{
    AnalysisRequest, DOCUMENT_MODEL, PAGE_TEXT_CHAR_BUDGET, PAGE_TEXT_MODEL,
    build_generate_request, extract_error_message,
};
pub use headers::{Headers, header_get, header_set};
pub use upstream_client::{
    HttpMethod, UpstreamClient, UpstreamClientConfig, UpstreamFailure, UpstreamHttpRequest,
    UpstreamHttpResponse, WreqUpstreamClient,
};

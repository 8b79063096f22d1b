use base64::Engine;
use bytes::Bytes;

use tguard_common::ProxyConfig;
use tguard_protocol::gemini::error::ErrorResponse;
use tguard_protocol::gemini::generate_content::GenerateContentRequestBody;
use tguard_protocol::gemini::generate_content::types::{Content, GenerationConfig, Part};

use crate::headers::{Headers, header_set};
use crate::upstream_client::{HttpMethod, UpstreamHttpRequest};

/// Vision-capable model used for document images.
pub const DOCUMENT_MODEL: &str = "gemini-2.5-flash";
/// Text model used for page-content analysis.
pub const PAGE_TEXT_MODEL: &str = "gemini-2.0-flash";
/// Page text beyond this many characters is silently dropped before the
/// prompt is built. Truncation, not rejection, is the upstream contract.
pub const PAGE_TEXT_CHAR_BUDGET: usize = 30_000;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_DOCUMENT_MIME: &str = "image/jpeg";

const DOCUMENT_SYSTEM_PROMPT: &str = r#"You are an AI legal assistant named TermsGuard. Analyze legal document images.
1. Provide a concise, easy-to-understand summary of the document's purpose.
2. List key details like clauses, responsibilities, and deadlines.
3. Highlight potential risks (fees, ambiguous language). For each risk, you MUST classify its severity as 'Low', 'Medium', or 'High'.

You MUST respond ONLY with a valid JSON object with this exact structure:
{
  "summary": "string",
  "keyDetails": ["string"],
  "risks": [{"risk": "string", "severity": "'Low'|'Medium'|'High'"}]
}"#;

const DOCUMENT_USER_PROMPT: &str =
    "Analyze the document image and provide the analysis in the required JSON format.";

const PAGE_TEXT_PROMPT_HEADER: &str = r#"You are a legal document analyzer. Analyze the following webpage content and identify any risky clauses, terms of service issues, or concerning legal language.

Respond in JSON format with this structure:
{
  "summary": "A brief 2-3 sentence overview of what this page contains and its overall risk level",
  "risks": [
    {
      "severity": "high|medium|low",
      "description": "Clear explanation of the risky clause in plain English"
    }
  ]
}

If no significant risks are found, return an empty risks array.

Page content:
"#;

/// One validated analysis request. Exactly one variant per request; the
/// boundary rejects anything else before this type is built.
#[derive(Debug, Clone)]
pub enum AnalysisRequest {
    Document {
        bytes: Bytes,
        mime_type: Option<String>,
    },
    PageText {
        content: String,
    },
}

/// Builds the single outbound `generateContent` call for a request.
///
/// Pure: model selection, prompt templating, base64 encoding and the
/// page-text character budget all happen here, with no IO.
pub fn build_generate_request(
    config: &ProxyConfig,
    api_key: &str,
    request: &AnalysisRequest,
) -> UpstreamHttpRequest {
    let (model, body) = match request {
        AnalysisRequest::Document { bytes, mime_type } => {
            (DOCUMENT_MODEL, document_body(bytes, mime_type.as_deref()))
        }
        AnalysisRequest::PageText { content } => (PAGE_TEXT_MODEL, page_text_body(content)),
    };

    let url = format!(
        "{}/v1beta/models/{}:generateContent?key={}",
        base_url(config),
        model,
        api_key
    );

    let mut headers = Headers::new();
    header_set(&mut headers, "content-type", "application/json");
    header_set(&mut headers, "accept", "application/json");

    // The body types contain no map keys that can fail to serialize.
    let body = serde_json::to_vec(&body).unwrap_or_default();

    UpstreamHttpRequest {
        method: HttpMethod::Post,
        url,
        headers,
        body: Some(Bytes::from(body)),
    }
}

fn document_body(bytes: &Bytes, mime_type: Option<&str>) -> GenerateContentRequestBody {
    let mime_type = mime_type
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .unwrap_or(DEFAULT_DOCUMENT_MIME);
    let data = base64::engine::general_purpose::STANDARD.encode(bytes);

    GenerateContentRequestBody {
        contents: vec![Content {
            parts: vec![
                Part::text(DOCUMENT_USER_PROMPT),
                Part::inline_data(mime_type, data),
            ],
            role: None,
        }],
        system_instruction: Some(Content {
            parts: vec![Part::text(DOCUMENT_SYSTEM_PROMPT)],
            role: None,
        }),
        generation_config: Some(GenerationConfig {
            response_mime_type: Some("application/json".to_string()),
            ..Default::default()
        }),
    }
}

fn page_text_body(content: &str) -> GenerateContentRequestBody {
    let mut prompt = String::with_capacity(PAGE_TEXT_PROMPT_HEADER.len() + content.len());
    prompt.push_str(PAGE_TEXT_PROMPT_HEADER);
    prompt.push_str(truncate_chars(content, PAGE_TEXT_CHAR_BUDGET));

    GenerateContentRequestBody {
        contents: vec![Content {
            parts: vec![Part::text(prompt)],
            role: None,
        }],
        system_instruction: None,
        generation_config: Some(GenerationConfig {
            temperature: Some(0.3),
            max_output_tokens: Some(2048),
            ..Default::default()
        }),
    }
}

/// Pulls a human-readable message out of the Gemini error envelope.
pub fn extract_error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorResponse>(body)
        .ok()?
        .error
        .message
        .filter(|message| !message.trim().is_empty())
}

fn base_url(config: &ProxyConfig) -> &str {
    config
        .base_url
        .as_deref()
        .map(|base| base.trim_end_matches('/'))
        .filter(|base| !base.is_empty())
        .unwrap_or(DEFAULT_BASE_URL)
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

//! Request plumbing shared by the HTTP model backends.
//!
//! Both the OpenAI and Gemini providers send the same grounded-answer
//! prompt and map failed responses onto [`RagError`]'s provider variants
//! the same way; only the wire shapes differ.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use tracing::error;

use crate::error::{RagError, Result};

pub(crate) const TEMPERATURE: f32 = 0.1;
pub(crate) const MAX_TOKENS: u32 = 1000;

/// Inputs per embedding request.
pub(crate) const MAX_INPUTS_PER_REQUEST: usize = 100;

const SYSTEM_PROMPT: &str = "You are an assistant helping users understand their documents.

You will be given excerpts from the documents and a question. Answer the question \
using ONLY the excerpts. Be accurate and specific, and cite the relevant part of \
an excerpt where you can. If the excerpts do not contain enough information to \
answer, say so clearly. Keep the answer concise.";

pub(crate) fn system_prompt(context_chunks: &[String]) -> String {
    if context_chunks.is_empty() {
        return format!("{SYSTEM_PROMPT}\n\nNo document excerpts were found for this question.");
    }
    format!("{SYSTEM_PROMPT}\n\nDocument excerpts:\n{}", context_chunks.join("\n\n"))
}

pub(crate) fn api_key_from_env(provider: &str, var: &str) -> Result<String> {
    let key = std::env::var(var)
        .map_err(|_| RagError::ConfigError(format!("{var} environment variable not set")))?;
    check_api_key(provider, &key)?;
    Ok(key)
}

pub(crate) fn check_api_key(provider: &str, api_key: &str) -> Result<()> {
    if api_key.is_empty() {
        return Err(RagError::ConfigError(format!("{provider} API key must not be empty")));
    }
    Ok(())
}

/// Both APIs wrap failures as `{"error": {"message": .., "code": ..}}`;
/// OpenAI's code is a string, Gemini's a number next to a `status` string.
#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    status: Option<String>,
}

impl ErrorDetail {
    fn is_context_overflow(&self) -> bool {
        self.code.as_ref().and_then(|c| c.as_str()) == Some("context_length_exceeded")
            || self.message.contains("maximum context length")
            || self.message.contains("exceeds the maximum number of tokens")
    }
}

pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> RagError {
    error!(provider, error = %e, "request failed");
    RagError::unavailable(provider, format!("request failed: {e}"))
}

pub(crate) fn parse_error(provider: &str, e: reqwest::Error) -> RagError {
    error!(provider, error = %e, "failed to parse response");
    RagError::unavailable(provider, format!("failed to parse response: {e}"))
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    error!(provider, %status, "API error");
    Err(classify_status(provider, status.as_u16(), retry_after, &body))
}

/// Map a failed response onto the error taxonomy.
fn classify_status(
    provider: &str,
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> RagError {
    let parsed = serde_json::from_str::<ErrorResponse>(body).ok().map(|r| r.error);
    let context_overflow = parsed.as_ref().is_some_and(ErrorDetail::is_context_overflow);
    let detail = match parsed {
        Some(ErrorDetail { message, status: Some(code), .. }) => format!("{code}: {message}"),
        Some(ErrorDetail { message, .. }) => message,
        None => body.to_string(),
    };
    let message = format!("API returned {status}: {detail}");

    match status {
        429 => RagError::RateLimited { provider: provider.into(), message, retry_after },
        400..=499 if context_overflow => {
            RagError::ContextTooLarge { provider: provider.into(), message }
        }
        400..=499 => RagError::invalid_input(provider, message),
        _ => RagError::unavailable(provider, message),
    }
}

//! Shared reqwest plumbing.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use hirebill_core::gateway::{ExternalSystem, UpstreamError};

/// Builds a client with the given request timeout.
pub(crate) fn build_client(
    system: ExternalSystem,
    timeout_secs: u64,
) -> Result<reqwest::Client, UpstreamError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|e| UpstreamError::transport(system, e.to_string()))
}

/// Maps a send failure.
pub(crate) fn send_error(system: ExternalSystem, err: &reqwest::Error) -> UpstreamError {
    match err.status() {
        Some(status) => UpstreamError::http(system, status.as_u16(), err.to_string()),
        None => UpstreamError::transport(system, err.to_string()),
    }
}

/// Reads a JSON body, turning non-success statuses into errors carrying the
/// upstream's text.
pub(crate) async fn read_json(
    system: ExternalSystem,
    response: reqwest::Response,
) -> Result<(u16, Value), UpstreamError> {
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| UpstreamError::transport(system, e.to_string()))?;

    if !(200..300).contains(&status) {
        debug!(%system, status, "upstream returned an error status");
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|body| error_text(&body))
            .unwrap_or_else(|| truncate(&text));
        return Err(UpstreamError::http(system, status, message));
    }

    if text.trim().is_empty() {
        return Ok((status, Value::Null));
    }
    serde_json::from_str(&text)
        .map(|body| (status, body))
        .map_err(|e| UpstreamError::http(system, status, format!("unparseable response: {e}")))
}

/// Extracts an error message from the usual vendor error shapes.
pub(crate) fn error_text(body: &Value) -> Option<String> {
    let candidates = [
        body.pointer("/error/message"),
        body.pointer("/error_message"),
        body.pointer("/errors/0/message"),
        body.get("error"),
        body.get("message"),
    ];
    candidates.into_iter().flatten().find_map(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(format!("error code {n}")),
        _ => None,
    })
}

fn truncate(text: &str) -> String {
    const LIMIT: usize = 300;
    match text.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

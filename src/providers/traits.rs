use crate::conversation::Turn;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

/// Upstream chat model. One `generate` call is one remote request: no
/// retries, no streaming, no reordering of `turns`.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Provider name for logs and metrics.
    fn name(&self) -> &str;

    /// Model id requests are sent to.
    fn model(&self) -> &str;

    /// Whether the upstream accepts a system role. Selects the persona
    /// encoding used by the conversation assembler.
    fn supports_system_role(&self) -> bool;

    /// Send the assembled turns and return the generated text.
    ///
    /// Fails with `UpstreamUnavailable` before any I/O when no credential is
    /// configured, and with `Upstream` for anything the remote side rejects.
    async fn generate(&self, turns: &[Turn]) -> Result<String>;
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Human-readable detail for a failed upstream response. Both supported
/// APIs wrap errors as `{"error": {"message": ...}}`; anything else falls
/// back to a truncated raw body.
pub(crate) fn error_detail(provider: &str, status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|e| e.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| truncate(body.trim(), 300));
    format!("{provider} returned {status}: {message}")
}

/// 404-class failures get the model listing attached.
pub(crate) fn looks_like_model_not_found(status: StatusCode, detail: &str) -> bool {
    status == StatusCode::NOT_FOUND || detail.to_lowercase().contains("not found")
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

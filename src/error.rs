//! Error taxonomy shared by every layer of the crate.
//!
//! Handlers map each variant to a status class: `InvalidInput` is a 400,
//! `NotFound` a 404, and both upstream variants are 500s. Nothing here is
//! retried automatically.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Caller-correctable input problem (empty message, malformed field).
    #[error("{0}")]
    InvalidInput(String),

    /// Unknown persona, character, conversation or test id.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// No credential configured for the model gateway. Raised before any
    /// network I/O is attempted.
    #[error("model gateway is not configured: {0}")]
    UpstreamUnavailable(String),

    /// The remote model service rejected or failed the call.
    #[error("upstream model call failed: {detail}")]
    Upstream {
        detail: String,
        /// Filled opportunistically when the failure looks like an unknown
        /// model. Empty when the listing was not attempted or failed.
        available_models: Vec<String>,
    },

    /// Startup-time configuration or persona data problem.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn upstream(detail: impl Into<String>) -> Self {
        Self::Upstream {
            detail: detail.into(),
            available_models: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_kind_and_id() {
        let err = Error::not_found("character", "ghost");
        assert_eq!(err.to_string(), "character not found: ghost");
    }

    #[test]
    fn upstream_helper_starts_without_enrichment() {
        match Error::upstream("boom") {
            Error::Upstream {
                detail,
                available_models,
            } => {
                assert_eq!(detail, "boom");
                assert!(available_models.is_empty());
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}

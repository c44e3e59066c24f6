pub mod gemini;
pub mod openai;
#[cfg(test)]
pub mod stub;
pub mod traits;

pub use gemini::GeminiGateway;
pub use openai::OpenAiCompatibleGateway;
pub use traits::ModelGateway;

use crate::config::ModelConfig;
use crate::error::{Error, Result};
use std::sync::Arc;

/// Build the gateway named by `config.provider`.
///
/// A missing credential is not an error here: the gateway is still built and
/// reports `UpstreamUnavailable` on first use, before any network call.
pub fn create_gateway(config: &ModelConfig) -> Result<Arc<dyn ModelGateway>> {
    let key = config.credential().map(str::to_string);
    let gateway: Arc<dyn ModelGateway> = match config.provider.as_str() {
        "gemini" => Arc::new(match &config.base_url {
            Some(url) => GeminiGateway::with_base_url(url.as_str(), &config.model, key),
            None => GeminiGateway::new(&config.model, key),
        }),
        "openai" | "openai-compatible" => Arc::new(match &config.base_url {
            Some(url) => OpenAiCompatibleGateway::with_base_url(url.as_str(), &config.model, key),
            None => OpenAiCompatibleGateway::new(&config.model, key),
        }),
        other => {
            return Err(Error::Config(format!(
                "unknown model provider '{other}' (expected gemini or openai)"
            )))
        }
    };

    if config.credential().is_none() {
        tracing::warn!(
            provider = %config.provider,
            "no model credential configured; chat and test requests will fail until one is set"
        );
    }
    Ok(gateway)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_config(provider: &str) -> ModelConfig {
        ModelConfig {
            provider: provider.into(),
            ..ModelConfig::default()
        }
    }

    #[test]
    fn factory_picks_gemini_without_system_role() {
        let gateway = create_gateway(&model_config("gemini")).unwrap();
        assert_eq!(gateway.name(), "gemini");
        assert!(!gateway.supports_system_role());
    }

    #[test]
    fn factory_picks_openai_with_system_role() {
        let gateway = create_gateway(&model_config("openai")).unwrap();
        assert_eq!(gateway.name(), "openai");
        assert!(gateway.supports_system_role());
    }

    #[test]
    fn unknown_provider_is_config_error() {
        assert!(matches!(
            create_gateway(&model_config("carrier-pigeon")),
            Err(Error::Config(_))
        ));
    }
}

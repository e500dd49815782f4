//! Chat gateway implementations for Lotline.
//!
//! All gateways implement the `lotline_core::ChatGateway` trait.
//! `build_from_config` selects and wires the right backend from
//! configuration, wrapped in the retry layer.

use lotline_config::{GatewayBackend, GatewayConfig};
use lotline_core::error::GatewayError;
use lotline_core::gateway::ChatGateway;
use std::sync::Arc;
use std::time::Duration;

pub mod openai;
pub mod retry;

pub use openai::{AuthScheme, OpenAiGateway};
pub use retry::RetryGateway;

/// Build the configured chat gateway, wrapped in the retry layer.
///
/// Fails with `NotConfigured` when a required setting (API key, or the
/// endpoint for azure/custom backends) is absent, so the caller can
/// print setup help instead of a network error.
pub fn build_from_config(config: &GatewayConfig) -> Result<Arc<dyn ChatGateway>, GatewayError> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        GatewayError::NotConfigured(
            "no API key set; add gateway.api_key to lotline.toml or export LOTLINE_API_KEY".into(),
        )
    })?;

    let gateway: Arc<dyn ChatGateway> = match config.backend {
        GatewayBackend::Azure => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                GatewayError::NotConfigured(
                    "azure backend needs gateway.endpoint (or LOTLINE_ENDPOINT)".into(),
                )
            })?;
            Arc::new(OpenAiGateway::azure(
                endpoint,
                config.effective_deployment(),
                &config.api_version,
                api_key,
            ))
        }
        GatewayBackend::Openai => Arc::new(OpenAiGateway::openai(api_key)),
        GatewayBackend::Custom => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                GatewayError::NotConfigured("custom backend needs gateway.endpoint".into())
            })?;
            Arc::new(OpenAiGateway::new("custom", endpoint, api_key))
        }
    };

    Ok(Arc::new(RetryGateway::new(
        gateway,
        Duration::from_secs(config.timeout_secs),
        config.retries,
    )))
}

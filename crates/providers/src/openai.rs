//! OpenAI-compatible chat gateway.
//!
//! Works with Azure OpenAI deployments and any endpoint speaking the
//! `/chat/completions` protocol (OpenAI itself, proxies, vLLM).
//!
//! The two flavors differ only in addressing and authentication:
//! - OpenAI-style: `{base}/chat/completions`, `Authorization: Bearer`
//! - Azure: `{endpoint}/openai/deployments/{deployment}/chat/completions`
//!   with an `api-version` query parameter and an `api-key` header

use async_trait::async_trait;
use lotline_core::error::GatewayError;
use lotline_core::gateway::{ChatGateway, ChatRequest, ChatResponse, TokenUsage};
use serde::Deserialize;
use tracing::{debug, warn};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const HTTP_TIMEOUT_SECS: u64 = 120;

/// How the API key travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>` (OpenAI and most compatibles).
    Bearer,
    /// `api-key: <key>` header (Azure OpenAI).
    ApiKey,
}

/// A chat gateway for OpenAI-compatible endpoints.
pub struct OpenAiGateway {
    name: String,
    completions_url: String,
    models_url: String,
    api_key: String,
    auth: AuthScheme,
    client: reqwest::Client,
}

impl OpenAiGateway {
    /// Create a gateway for a generic OpenAI-compatible endpoint.
    ///
    /// `base_url` is the API root (e.g., `https://api.openai.com/v1`);
    /// the `/chat/completions` path is appended here.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let base = base_url.into().trim_end_matches('/').to_string();
        Self {
            name: name.into(),
            completions_url: format!("{base}/chat/completions"),
            models_url: format!("{base}/models"),
            api_key: api_key.into(),
            auth: AuthScheme::Bearer,
            client: build_client(),
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", OPENAI_BASE_URL, api_key)
    }

    /// Create a gateway for an Azure OpenAI deployment.
    ///
    /// Azure routes by deployment name rather than by the `model` field,
    /// and authenticates with an `api-key` header instead of a Bearer
    /// token.
    pub fn azure(
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let deployment = deployment.into();
        let api_version = api_version.into();
        Self {
            name: "azure-openai".into(),
            completions_url: format!(
                "{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={api_version}"
            ),
            models_url: format!("{endpoint}/openai/models?api-version={api_version}"),
            api_key: api_key.into(),
            auth: AuthScheme::ApiKey,
            client: build_client(),
        }
    }

    /// The URL completion requests are posted to.
    pub fn completions_url(&self) -> &str {
        &self.completions_url
    }

    /// Which authentication scheme this gateway uses.
    pub fn auth_scheme(&self) -> AuthScheme {
        self.auth
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            AuthScheme::Bearer => {
                req.header("Authorization", format!("Bearer {}", self.api_key))
            }
            AuthScheme::ApiKey => req.header("api-key", &self.api_key),
        }
    }

    /// Build the JSON body for a completion call.
    ///
    /// `ChatMessage` already serializes to the wire shape, so the
    /// messages go in as-is. Azure ignores the `model` field (the
    /// deployment in the URL decides), but sending it is harmless and
    /// keeps both flavors on one code path.
    fn request_body(request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        body
    }
}

fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .expect("Failed to create HTTP client")
}

fn to_chat_response(api_response: ApiResponse) -> Result<ChatResponse, GatewayError> {
    let model = api_response.model;
    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::InvalidResponse("no choices in response".into()))?;

    Ok(ChatResponse {
        content: choice.message.content.unwrap_or_default().trim().to_string(),
        model,
        usage: api_response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
    })
}

#[async_trait]
impl ChatGateway for OpenAiGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, GatewayError> {
        let body = Self::request_body(&request);

        debug!(
            gateway = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let response = self
            .authorize(self.client.post(&self.completions_url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(e.to_string())
                } else {
                    GatewayError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(GatewayError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(GatewayError::AuthFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(gateway = %self.name, status, body = %error_body, "Backend returned error");
            return Err(GatewayError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        to_chat_response(api_response)
    }

    async fn health_check(&self) -> Result<bool, GatewayError> {
        let response = self
            .authorize(self.client.get(&self.models_url))
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(GatewayError::AuthFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        Ok(status == 200)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

//! Retry wrapper: per-attempt timeout plus a bounded retry budget.
//!
//! Wraps a single backend. Each attempt runs under its own timeout.
//! Failures classified transient (network, timeout, rate limit, 5xx)
//! consume one retry; anything else surfaces immediately.

use async_trait::async_trait;
use lotline_core::error::GatewayError;
use lotline_core::gateway::{ChatGateway, ChatRequest, ChatResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Upper bound on how long a rate-limit hint can stall a retry.
const MAX_RATE_LIMIT_PAUSE_SECS: u64 = 10;

/// A gateway that retries transient failures of the wrapped backend.
pub struct RetryGateway {
    inner: Arc<dyn ChatGateway>,
    timeout: Duration,
    retries: u32,
}

impl RetryGateway {
    /// Wrap a backend with a per-attempt timeout and a retry budget.
    ///
    /// `retries` counts extra attempts, so `retries = 1` means at most
    /// two calls to the backend.
    pub fn new(inner: Arc<dyn ChatGateway>, timeout: Duration, retries: u32) -> Self {
        Self {
            inner,
            timeout,
            retries,
        }
    }
}

#[async_trait]
impl ChatGateway for RetryGateway {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, GatewayError> {
        let attempts = self.retries.saturating_add(1);
        let mut last_error = GatewayError::NotConfigured("no attempts were made".into());

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.timeout, self.inner.complete(request.clone())).await {
                Ok(Ok(response)) => {
                    if attempt > 1 {
                        info!(
                            gateway = %self.inner.name(),
                            attempt,
                            "Request succeeded after retry"
                        );
                    }
                    return Ok(response);
                }
                Ok(Err(e)) => {
                    if !e.is_transient() {
                        return Err(e);
                    }
                    warn!(
                        gateway = %self.inner.name(),
                        attempt,
                        error = %e,
                        "Transient gateway failure"
                    );
                    if attempt < attempts {
                        if let GatewayError::RateLimited { retry_after_secs } = &e {
                            let pause = Duration::from_secs(
                                (*retry_after_secs).min(MAX_RATE_LIMIT_PAUSE_SECS),
                            );
                            tokio::time::sleep(pause).await;
                        }
                    }
                    last_error = e;
                }
                Err(_) => {
                    warn!(
                        gateway = %self.inner.name(),
                        attempt,
                        timeout_secs = self.timeout.as_secs(),
                        "Gateway attempt timed out"
                    );
                    last_error = GatewayError::Timeout(format!(
                        "no response after {}s",
                        self.timeout.as_secs()
                    ));
                }
            }
        }

        Err(last_error)
    }

    async fn health_check(&self) -> Result<bool, GatewayError> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotline_core::message::ChatMessage;
    use std::sync::Mutex;

    /// A mock gateway that always fails with the same error.
    struct FailingGateway {
        error: GatewayError,
        call_count: Mutex<usize>,
    }

    impl FailingGateway {
        fn new(error: GatewayError) -> Self {
            Self {
                error,
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl ChatGateway for FailingGateway {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, GatewayError> {
            *self.call_count.lock().unwrap() += 1;
            Err(self.error.clone())
        }
    }

    /// A mock gateway that fails a fixed number of times, then succeeds.
    struct FlakyGateway {
        error: GatewayError,
        failures: usize,
        call_count: Mutex<usize>,
    }

    impl FlakyGateway {
        fn new(error: GatewayError, failures: usize) -> Self {
            Self {
                error,
                failures,
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl ChatGateway for FlakyGateway {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, GatewayError> {
            let mut count = self.call_count.lock().unwrap();
            *count += 1;
            if *count <= self.failures {
                Err(self.error.clone())
            } else {
                Ok(answer("recovered"))
            }
        }
    }

    /// A mock gateway that hangs forever (for timeout testing).
    struct HangingGateway;

    #[async_trait]
    impl ChatGateway for HangingGateway {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, GatewayError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    fn answer(text: &str) -> ChatResponse {
        ChatResponse {
            content: text.into(),
            model: "test-model".into(),
            usage: None,
        }
    }

    fn test_request() -> ChatRequest {
        ChatRequest::new("test", vec![ChatMessage::user("hola")])
    }

    #[tokio::test]
    async fn success_needs_a_single_attempt() {
        let inner = Arc::new(FlakyGateway::new(GatewayError::Network("unused".into()), 0));
        let gateway = RetryGateway::new(inner.clone(), Duration::from_secs(5), 1);

        let result = gateway.complete(test_request()).await;
        assert_eq!(result.unwrap().content, "recovered");
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn oversized_retry_budget_does_not_wrap() {
        let inner = Arc::new(FlakyGateway::new(GatewayError::Network("unused".into()), 0));
        let gateway = RetryGateway::new(inner.clone(), Duration::from_secs(5), u32::MAX);

        let result = gateway.complete(test_request()).await;
        assert_eq!(result.unwrap().content, "recovered");
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let inner = Arc::new(FlakyGateway::new(
            GatewayError::Network("connection reset".into()),
            1,
        ));
        let gateway = RetryGateway::new(inner.clone(), Duration::from_secs(5), 1);

        let result = gateway.complete(test_request()).await;
        assert_eq!(result.unwrap().content, "recovered");
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn server_error_is_retried() {
        let inner = Arc::new(FlakyGateway::new(
            GatewayError::Api {
                status_code: 503,
                message: "overloaded".into(),
            },
            1,
        ));
        let gateway = RetryGateway::new(inner.clone(), Duration::from_secs(5), 1);

        let result = gateway.complete(test_request()).await;
        assert!(result.is_ok());
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn rate_limit_hint_is_honored_before_retry() {
        let inner = Arc::new(FlakyGateway::new(
            GatewayError::RateLimited {
                retry_after_secs: 0,
            },
            1,
        ));
        let gateway = RetryGateway::new(inner.clone(), Duration::from_secs(5), 1);

        let result = gateway.complete(test_request()).await;
        assert!(result.is_ok());
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let inner = Arc::new(FailingGateway::new(GatewayError::AuthFailed(
            "bad key".into(),
        )));
        let gateway = RetryGateway::new(inner.clone(), Duration::from_secs(5), 1);

        let result = gateway.complete(test_request()).await;
        match result.unwrap_err() {
            GatewayError::AuthFailed(_) => {}
            other => panic!("Expected AuthFailed, got: {other:?}"),
        }
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let inner = Arc::new(FailingGateway::new(GatewayError::Api {
            status_code: 400,
            message: "bad request".into(),
        }));
        let gateway = RetryGateway::new(inner.clone(), Duration::from_secs(5), 1);

        let result = gateway.complete(test_request()).await;
        assert!(result.is_err());
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_returns_last_error() {
        let inner = Arc::new(FailingGateway::new(GatewayError::Network(
            "conn refused".into(),
        )));
        let gateway = RetryGateway::new(inner.clone(), Duration::from_secs(5), 1);

        let result = gateway.complete(test_request()).await;
        match result.unwrap_err() {
            GatewayError::Network(_) => {}
            other => panic!("Expected Network, got: {other:?}"),
        }
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn zero_retries_fails_fast() {
        let inner = Arc::new(FailingGateway::new(GatewayError::Network("down".into())));
        let gateway = RetryGateway::new(inner.clone(), Duration::from_secs(5), 0);

        let result = gateway.complete(test_request()).await;
        assert!(result.is_err());
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn hanging_backend_times_out() {
        let gateway = RetryGateway::new(Arc::new(HangingGateway), Duration::from_millis(50), 0);

        let result = gateway.complete(test_request()).await;
        match result.unwrap_err() {
            GatewayError::Timeout(_) => {}
            other => panic!("Expected Timeout, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn name_delegates_to_inner() {
        let gateway = RetryGateway::new(
            Arc::new(FailingGateway::new(GatewayError::Network("x".into()))),
            Duration::from_secs(5),
            1,
        );
        assert_eq!(gateway.name(), "failing");
    }
}

//! Bounded retry around any gateway.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use narrascript_shared::{GatewayError, RetryConfig};

use crate::GenerationGateway;

/// Retries transient failures ([`GatewayError::is_retryable`]) with doubling
/// backoff. Anything else is returned on the first occurrence.
pub struct RetryingGateway<G> {
    inner: G,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl<G: GenerationGateway> RetryingGateway<G> {
    /// `max_attempts` counts the first try; values below 1 are treated as 1.
    pub fn new(inner: G, max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    pub fn from_config(inner: G, config: &RetryConfig) -> Self {
        Self::new(
            inner,
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
        )
    }

    pub fn into_inner(self) -> G {
        self.inner
    }
}

#[async_trait]
impl<G: GenerationGateway> GenerationGateway for RetryingGateway<G> {
    async fn generate(&self, prompt: &str) -> Result<String, GatewayError> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 1;

        loop {
            match self.inner.generate(prompt).await {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "transient gateway failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays a fixed list of results and counts calls.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, GatewayError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, GatewayError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationGateway for Scripted {
        async fn generate(&self, _prompt: &str) -> Result<String, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GatewayError::TransportFailure("exhausted".into())))
        }
    }

    #[tokio::test]
    async fn retries_timeout_then_succeeds() {
        let inner = Scripted::new(vec![
            Err(GatewayError::Timeout),
            Err(GatewayError::TransportFailure("reset".into())),
            Ok("done".into()),
        ]);
        let gateway = RetryingGateway::new(inner, 3, Duration::ZERO);

        assert_eq!(gateway.generate("p").await.unwrap(), "done");
        assert_eq!(gateway.into_inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let inner = Scripted::new(vec![
            Err(GatewayError::Timeout),
            Err(GatewayError::Timeout),
            Ok("too late".into()),
        ]);
        let gateway = RetryingGateway::new(inner, 2, Duration::ZERO);

        assert_eq!(gateway.generate("p").await.unwrap_err(), GatewayError::Timeout);
        assert_eq!(gateway.into_inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn never_retries_rejections_or_malformed_bodies() {
        for failure in [
            GatewayError::NonSuccessStatus {
                code: 401,
                body: "no".into(),
            },
            GatewayError::MalformedResponse("bad".into()),
        ] {
            let inner = Scripted::new(vec![Err(failure.clone()), Ok("unused".into())]);
            let gateway = RetryingGateway::new(inner, 5, Duration::ZERO);

            assert_eq!(gateway.generate("p").await.unwrap_err(), failure);
            assert_eq!(gateway.into_inner().calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn single_attempt_means_no_retry() {
        let inner = Scripted::new(vec![Err(GatewayError::Timeout), Ok("unused".into())]);
        let gateway = RetryingGateway::from_config(
            inner,
            &RetryConfig {
                max_attempts: 1,
                initial_backoff_ms: 0,
            },
        );

        assert!(gateway.generate("p").await.is_err());
        assert_eq!(gateway.into_inner().calls.load(Ordering::SeqCst), 1);
    }
}

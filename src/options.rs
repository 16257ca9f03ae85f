use std::{fmt, sync::Arc, time::Duration};

use crate::{CancelSignal, RateLimiter, RetryPolicy};

/// Configures the transport, rate limiting and retry behavior of a client.
///
/// Read-only once passed to [`crate::SnipeItClient::with_options`].
#[derive(Clone, Default)]
pub struct ClientOptions {
    /// HTTP client used for every attempt. Defaults to `reqwest::Client::new()`.
    pub http: Option<reqwest::Client>,
    /// Limiter consulted once before each call. `None` disables rate limiting.
    pub rate_limiter: Option<Arc<dyn RateLimiter>>,
    /// Retry policy. `None` means [`RetryPolicy::default`] unless retries are
    /// disabled.
    pub retry_policy: Option<RetryPolicy>,
    /// Disables automatic retries for every call.
    pub disable_retries: bool,
    /// Per-attempt timeout applied by the transport.
    pub timeout: Option<Duration>,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("rate_limiter", &self.rate_limiter)
            .field("retry_policy", &self.retry_policy)
            .field("disable_retries", &self.disable_retries)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ClientOptions {
    pub fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_rate_limiter<L>(mut self, limiter: L) -> Self
    where
        L: RateLimiter + 'static,
    {
        self.rate_limiter = Some(Arc::new(limiter));
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn without_retries(mut self) -> Self {
        self.disable_retries = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Per-call overrides.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// Replaces the request's own cancellation signal for this call.
    pub cancel: Option<CancelSignal>,
    /// Disables retries for this call regardless of client configuration.
    pub disable_retries: bool,
}

impl RequestOptions {
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn without_retries(mut self) -> Self {
        self.disable_retries = true;
        self
    }
}

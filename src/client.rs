use std::{fmt, io::Write, sync::Arc, time::Duration};

use reqwest::{
    header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Url,
};
use serde::de::DeserializeOwned;
use tokio::time::sleep;

use crate::{
    retry::{should_retry, Backoff},
    transport::send_once,
    ApiRequest, ApiResponse, CancelSignal, ClientOptions, DecodeTarget, RateLimiter,
    RequestOptions, Result, RetryPolicy, SnipeItError,
};

#[derive(Clone)]
/// HTTP client for the Snipe-IT REST API.
///
/// Every call goes through the configured rate limiter once, then through
/// the retry loop. Cloning is cheap; clones share the limiter and the
/// underlying connection pool.
pub struct SnipeItClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    retry_policy: Option<Arc<RetryPolicy>>,
    disable_retries: bool,
    timeout: Option<Duration>,
}

impl fmt::Debug for SnipeItClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnipeItClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"<redacted>")
            .field("rate_limiter", &self.rate_limiter)
            .field("retry_policy", &self.retry_policy)
            .field("disable_retries", &self.disable_retries)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SnipeItClient {
    /// Creates a client for the Snipe-IT instance at `base_url`.
    ///
    /// `token` is an API key from the Snipe-IT web interface; the `Bearer `
    /// prefix is added if missing. A trailing slash is appended to the base
    /// path so request paths resolve beneath it.
    ///
    /// Uses [`ClientOptions::default`]: no rate limiting and
    /// [`RetryPolicy::default`].
    pub fn new(base_url: impl AsRef<str>, token: impl AsRef<str>) -> Result<Self> {
        let base_url = base_url.as_ref().trim();
        if base_url.is_empty() {
            return Err(SnipeItError::Config("a base URL must be provided".to_owned()));
        }
        if token.as_ref().trim().is_empty() {
            return Err(SnipeItError::Config("a token must be provided".to_owned()));
        }

        let mut base_url = Url::parse(base_url).map_err(|err| {
            SnipeItError::Config(format!("invalid base URL '{base_url}': {err}"))
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let token = normalize_bearer_authorization(token.as_ref());
        if HeaderValue::from_str(&token).is_err() {
            return Err(SnipeItError::Config(
                "the token contains characters not allowed in an HTTP header".to_owned(),
            ));
        }

        let client = Self {
            http: reqwest::Client::new(),
            base_url,
            token,
            rate_limiter: None,
            retry_policy: None,
            disable_retries: false,
            timeout: None,
        };
        Ok(client.with_options(ClientOptions::default()))
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `SNIPEIT_URL` — base URL of the instance (e.g. `https://assets.example.com`)
    /// - `SNIPEIT_TOKEN` — API key (Bearer prefix optional)
    ///
    /// # Example
    ///
    /// ```no_run
    /// use snipeit_http::SnipeItClient;
    ///
    /// let client = SnipeItClient::from_env().expect("missing SNIPEIT_* env vars");
    /// ```
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("SNIPEIT_URL").map_err(|_| {
            SnipeItError::Config("missing SNIPEIT_URL environment variable".to_owned())
        })?;
        let token = std::env::var("SNIPEIT_TOKEN").map_err(|_| {
            SnipeItError::Config("missing SNIPEIT_TOKEN environment variable".to_owned())
        })?;
        Self::new(url, token)
    }

    /// Applies transport, rate limiting and retry options.
    ///
    /// Without an explicit policy, [`RetryPolicy::default`] is used unless
    /// retries are disabled.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.http = opts.http.unwrap_or_default();
        self.rate_limiter = opts.rate_limiter;
        self.disable_retries = opts.disable_retries;
        self.retry_policy = match opts.retry_policy {
            Some(policy) => Some(Arc::new(policy)),
            None if !opts.disable_retries => Some(Arc::new(RetryPolicy::default())),
            None => None,
        };
        self.timeout = opts.timeout;
        self
    }

    /// Base URL that request paths are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Sends a request with default options and drops the response body.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.execute(request, DecodeTarget::Discard, RequestOptions::default())
            .await
    }

    /// Sends a request and decodes a JSON response body.
    ///
    /// Returns `None` for an empty body.
    pub async fn execute_json<T>(
        &self,
        request: &ApiRequest,
        options: RequestOptions,
    ) -> Result<(ApiResponse, Option<T>)>
    where
        T: DeserializeOwned + Send,
    {
        let mut slot = None;
        let response = self
            .execute(request, DecodeTarget::json(&mut slot), options)
            .await?;
        Ok((response, slot))
    }

    /// Sends a request and copies the response body verbatim into `sink`.
    pub async fn execute_raw<W>(
        &self,
        request: &ApiRequest,
        sink: &mut W,
        options: RequestOptions,
    ) -> Result<ApiResponse>
    where
        W: Write + Send,
    {
        self.execute(request, DecodeTarget::raw(sink), options)
            .await
    }

    /// Executes a request: waits for the rate limiter, sends the request and
    /// retries failed attempts according to the retry policy.
    ///
    /// The returned error is always the outcome of the last attempt, so the
    /// same variants can be matched whether or not retries happened.
    /// Cancellation of the effective signal aborts the call at any stage.
    pub async fn execute(
        &self,
        request: &ApiRequest,
        mut target: DecodeTarget<'_>,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let cancel = options.cancel.unwrap_or_else(|| request.cancel.clone());

        if let Some(limiter) = &self.rate_limiter {
            limiter.wait(&cancel).await?;
        }

        let policy = match &self.retry_policy {
            Some(policy) if !self.disable_retries && !options.disable_retries => policy,
            _ => return self.attempt(request, target, &cancel).await,
        };

        let mut backoff = Backoff::new(policy);
        let mut outcome = self.attempt(request, target.reborrow(), &cancel).await;

        for _ in 0..policy.max_retries {
            let decision = should_retry(&outcome, policy);
            if !decision.retry {
                break;
            }

            let delay = match decision.explicit_delay {
                Some(delay) => delay,
                None => backoff.next_delay(),
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(
                "retrying {} {} after {} ms",
                request.method,
                request.path,
                delay.as_millis()
            );

            tokio::select! {
                biased;
                reason = cancel.cancelled() => return Err(SnipeItError::Cancelled(reason)),
                _ = sleep(delay) => {}
            }

            outcome = self.attempt(request, target.reborrow(), &cancel).await;
        }

        outcome
    }

    /// Builds a fresh request from the template and sends it once.
    async fn attempt(
        &self,
        request: &ApiRequest,
        target: DecodeTarget<'_>,
        cancel: &CancelSignal,
    ) -> Result<ApiResponse> {
        let attempt = self.build_request(request)?;
        send_once(&self.http, attempt, target, cancel).await
    }

    fn build_request(&self, request: &ApiRequest) -> Result<reqwest::Request> {
        let url = self.resolve(&request.path)?;
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, &self.token)
            .headers(request.headers.clone());

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        // The template keeps the original bytes; every attempt gets its own copy.
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        // Nothing has been sent yet, so a failure here is never retryable.
        builder.build().map_err(|err| {
            SnipeItError::InvalidRequest(format!("request could not be built: {err}"))
        })
    }

    /// Resolves `path` against the base URL. One leading slash is ignored.
    fn resolve(&self, path: &str) -> Result<Url> {
        let relative = path.strip_prefix('/').unwrap_or(path);
        self.base_url.join(relative).map_err(|err| {
            SnipeItError::InvalidRequest(format!("invalid request path '{path}': {err}"))
        })
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{normalize_bearer_authorization, SnipeItClient};
    use crate::{ApiRequest, ClientOptions, RetryPolicy, SnipeItError};

    #[test]
    fn normalize_bearer_adds_prefix_when_missing() {
        assert_eq!(
            normalize_bearer_authorization("abc123"),
            "Bearer abc123".to_owned()
        );
    }

    #[test]
    fn normalize_bearer_keeps_existing_prefix() {
        assert_eq!(
            normalize_bearer_authorization("bEaReR abc123"),
            "bEaReR abc123".to_owned()
        );
    }

    #[test]
    fn debug_redacts_authorization_value() {
        let client = SnipeItClient::new("https://assets.example.com", "secret-token")
            .expect("client must build");
        let debug = format!("{client:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn empty_base_url_or_token_is_rejected() {
        assert!(matches!(
            SnipeItClient::new("", "token"),
            Err(SnipeItError::Config(_))
        ));
        assert!(matches!(
            SnipeItClient::new("https://assets.example.com", "  "),
            Err(SnipeItError::Config(_))
        ));
        assert!(matches!(
            SnipeItClient::new("not a url", "token"),
            Err(SnipeItError::Config(_))
        ));
    }

    #[test]
    fn token_that_is_not_a_header_value_is_rejected() {
        let err = SnipeItClient::new("https://assets.example.com", "tok\u{7}en")
            .expect_err("control characters cannot be sent");
        assert!(matches!(err, SnipeItError::Config(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn request_build_failure_is_terminal() {
        let mut client = SnipeItClient::new("http://127.0.0.1:9", "token")
            .expect("client must build")
            .with_options(
                ClientOptions::default().with_retry_policy(
                    RetryPolicy::default()
                        .with_backoff(Duration::from_secs(5), Duration::from_secs(5)),
                ),
            );
        client.token = "tok\u{7}en".to_owned();

        let started = Instant::now();
        let err = client
            .send(&ApiRequest::get("api/v1/hardware"))
            .await
            .expect_err("request must not build");

        assert!(matches!(err, SnipeItError::InvalidRequest(_)), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn base_url_gets_trailing_slash_and_paths_resolve_beneath_it() {
        let client = SnipeItClient::new("https://assets.example.com/snipe", "token")
            .expect("client must build");
        assert_eq!(client.base_url().as_str(), "https://assets.example.com/snipe/");

        let url = client.resolve("/api/v1/hardware/7").expect("path must resolve");
        assert_eq!(url.as_str(), "https://assets.example.com/snipe/api/v1/hardware/7");
    }

    #[test]
    fn default_options_install_default_retry_policy() {
        let client = SnipeItClient::new("https://assets.example.com", "token")
            .expect("client must build");
        assert_eq!(client.retry_policy.as_deref(), Some(&RetryPolicy::default()));
        assert!(client.rate_limiter.is_none());
    }

    #[test]
    fn disabling_retries_without_policy_leaves_no_policy() {
        let client = SnipeItClient::new("https://assets.example.com", "token")
            .expect("client must build")
            .with_options(ClientOptions::default().without_retries());
        assert!(client.retry_policy.is_none());
        assert!(client.disable_retries);
    }
}

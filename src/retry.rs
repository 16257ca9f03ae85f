//! Retry eligibility and backoff.

use std::{collections::HashSet, time::Duration};

use rand::Rng;

use crate::{ApiResponse, Result, SnipeItError};

const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
const DEFAULT_JITTER: f64 = 0.2;

/// Defines which failed requests are retried and how long to wait between
/// attempts.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// HTTP status codes that trigger a retry.
    pub retryable_status_codes: HashSet<u16>,
    /// Backoff before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for the backoff between retries.
    pub max_backoff: Duration,
    /// Factor applied to the backoff after each retry.
    pub backoff_multiplier: f64,
    /// Fraction of the backoff that may be randomly subtracted, in `[0, 1]`.
    /// `0` waits the full backoff, `1` waits anywhere between zero and the
    /// full backoff.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retryable_status_codes: HashSet::from([429, 500, 502, 503, 504]),
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the backoff bounds. `max` is raised to `initial` if smaller.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    /// Sets the backoff growth factor, never below `1.0`.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = sanitize_multiplier(multiplier);
        self
    }

    /// Sets the jitter factor, clamped into `[0, 1]`.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = sanitize_jitter(jitter);
        self
    }

    pub fn with_retryable_status_codes<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }
}

/// Outcome of [`should_retry`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RetryDecision {
    pub retry: bool,
    /// Server-supplied delay that replaces the computed backoff.
    pub explicit_delay: Option<Duration>,
}

impl RetryDecision {
    const STOP: Self = Self {
        retry: false,
        explicit_delay: None,
    };

    const BACKOFF: Self = Self {
        retry: true,
        explicit_delay: None,
    };
}

/// Decides whether the outcome of an attempt should be retried.
pub fn should_retry(outcome: &Result<ApiResponse>, policy: &RetryPolicy) -> RetryDecision {
    let err = match outcome {
        Ok(_) => return RetryDecision::STOP,
        Err(err) => err,
    };

    match err {
        SnipeItError::Api {
            status,
            retry_after,
            ..
        } if policy.is_retryable_status(*status) => RetryDecision {
            retry: true,
            explicit_delay: retry_after.as_deref().and_then(parse_retry_after),
        },
        SnipeItError::Transport(_) => RetryDecision::BACKOFF,
        _ => RetryDecision::STOP,
    }
}

/// Parses a `Retry-After` header value.
///
/// Accepts a whole number of seconds or an HTTP-date. Returns `None` for
/// anything else, and for delays that are zero or already in the past.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return (seconds > 0).then(|| Duration::from_secs(seconds));
    }

    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delay = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    delay.to_std().ok().filter(|delay| !delay.is_zero())
}

/// Running backoff for a single request.
#[derive(Clone, Debug)]
pub(crate) struct Backoff {
    current: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
}

impl Backoff {
    /// Policy fields are public, so out-of-range values are sanitized here
    /// the same way the builders do.
    pub(crate) fn new(policy: &RetryPolicy) -> Self {
        Self {
            current: policy.initial_backoff,
            max: policy.max_backoff,
            multiplier: sanitize_multiplier(policy.backoff_multiplier),
            jitter: sanitize_jitter(policy.jitter),
        }
    }

    /// Returns the jittered delay for this retry and grows the backoff.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let sample = rand::thread_rng().gen::<f64>();
        let delay = jittered(self.current, self.jitter, sample);
        self.current = scale(self.current, self.multiplier)
            .unwrap_or(self.max)
            .min(self.max);
        delay
    }
}

fn sanitize_multiplier(multiplier: f64) -> f64 {
    if multiplier.is_finite() {
        multiplier.max(1.0)
    } else {
        DEFAULT_BACKOFF_MULTIPLIER
    }
}

fn sanitize_jitter(jitter: f64) -> f64 {
    if jitter.is_nan() {
        0.0
    } else {
        jitter.clamp(0.0, 1.0)
    }
}

/// `duration * factor`, or `None` if the product is not representable.
fn scale(duration: Duration, factor: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).ok()
}

/// `backoff` minus a random fraction `jitter * sample` of itself.
fn jittered(backoff: Duration, jitter: f64, sample: f64) -> Duration {
    let cut = sanitize_jitter(jitter * sample);
    backoff.saturating_sub(scale(backoff, cut).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::{header::HeaderMap, StatusCode};

    use super::{jittered, parse_retry_after, should_retry, Backoff, RetryPolicy};
    use crate::{ApiResponse, CancelReason, SnipeItError};

    fn api_error(status: u16, retry_after: Option<&str>) -> SnipeItError {
        SnipeItError::Api {
            status,
            method: "GET".to_owned(),
            url: "https://assets.example.com/api/v1/hardware".to_owned(),
            message: String::new(),
            retry_after: retry_after.map(str::to_owned),
            headers: HeaderMap::new(),
        }
    }

    fn ok_response() -> ApiResponse {
        ApiResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            url: "https://assets.example.com/api/v1/hardware"
                .parse()
                .expect("valid url"),
        }
    }

    #[test]
    fn success_is_never_retried() {
        let decision = should_retry(&Ok(ok_response()), &RetryPolicy::default());
        assert!(!decision.retry);
    }

    #[test]
    fn retryable_status_uses_computed_backoff_without_hint() {
        let decision = should_retry(&Err(api_error(503, None)), &RetryPolicy::default());
        assert!(decision.retry);
        assert_eq!(decision.explicit_delay, None);
    }

    #[test]
    fn retry_after_seconds_becomes_explicit_delay() {
        let decision = should_retry(&Err(api_error(429, Some("7"))), &RetryPolicy::default());
        assert!(decision.retry);
        assert_eq!(decision.explicit_delay, Some(Duration::from_secs(7)));
    }

    #[test]
    fn retry_after_is_ignored_for_non_retryable_status() {
        let decision = should_retry(&Err(api_error(404, Some("7"))), &RetryPolicy::default());
        assert!(!decision.retry);
    }

    #[test]
    fn custom_status_set_is_honored() {
        let policy = RetryPolicy::default().with_retryable_status_codes([409]);
        assert!(should_retry(&Err(api_error(409, None)), &policy).retry);
        assert!(!should_retry(&Err(api_error(503, None)), &policy).retry);
    }

    #[test]
    fn cancellation_and_decode_errors_are_terminal() {
        let policy = RetryPolicy::default();
        for err in [
            SnipeItError::Cancelled(CancelReason::Cancelled),
            SnipeItError::Cancelled(CancelReason::DeadlineExceeded),
            SnipeItError::Decode {
                message: "bad json".to_owned(),
                status: 200,
                headers: HeaderMap::new(),
            },
            SnipeItError::InvalidRequest("bad header".to_owned()),
        ] {
            assert!(!should_retry(&Err(err), &policy).retry);
        }
    }

    #[test]
    fn parse_retry_after_accepts_seconds() {
        assert_eq!(parse_retry_after("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after("  45 "), Some(Duration::from_secs(45)));
    }

    #[test]
    fn parse_retry_after_rejects_zero_and_garbage() {
        assert_eq!(parse_retry_after("0"), None);
        assert_eq!(parse_retry_after(""), None);
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after("-5"), None);
        assert_eq!(parse_retry_after("1.5"), None);
    }

    #[test]
    fn parse_retry_after_accepts_future_http_date() {
        let future = chrono::Utc::now() + chrono::Duration::seconds(120);
        let header = future.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let delay = parse_retry_after(&header).expect("future date must parse");
        assert!(delay > Duration::from_secs(100), "delay {delay:?}");
        assert!(delay <= Duration::from_secs(120), "delay {delay:?}");
    }

    #[test]
    fn parse_retry_after_ignores_past_http_date() {
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn jitter_subtracts_a_fraction_of_the_backoff() {
        let backoff = Duration::from_millis(1_000);
        assert_eq!(jittered(backoff, 0.0, 0.9), backoff);
        assert_eq!(jittered(backoff, 0.2, 0.0), backoff);
        assert_eq!(jittered(backoff, 0.2, 0.5), Duration::from_millis(900));
        assert_eq!(jittered(backoff, 1.0, 0.5), Duration::from_millis(500));
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy::default()
            .with_backoff(Duration::from_millis(100), Duration::from_millis(350))
            .with_jitter(0.0);
        let mut backoff = Backoff::new(&policy);

        let delays: Vec<_> = (0..4).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(350),
                Duration::from_millis(350),
            ]
        );
    }

    #[test]
    fn jittered_backoff_stays_within_bounds() {
        let policy = RetryPolicy::default()
            .with_backoff(Duration::from_millis(100), Duration::from_secs(1))
            .with_jitter(0.5);
        let mut backoff = Backoff::new(&policy);
        let delay = backoff.next_delay();
        assert!(delay >= Duration::from_millis(50), "delay {delay:?}");
        assert!(delay <= Duration::from_millis(100), "delay {delay:?}");
    }

    #[test]
    fn builders_clamp_out_of_range_values() {
        let policy = RetryPolicy::default()
            .with_jitter(3.0)
            .with_multiplier(0.5)
            .with_backoff(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(policy.jitter, 1.0);
        assert_eq!(policy.backoff_multiplier, 1.0);
        assert_eq!(policy.max_backoff, Duration::from_secs(2));
    }

    #[test]
    fn backoff_tolerates_out_of_range_policy_fields() {
        let mut policy = RetryPolicy::default()
            .with_backoff(Duration::from_millis(100), Duration::from_secs(1));
        policy.backoff_multiplier = -2.0;
        policy.jitter = f64::NAN;
        let mut backoff = Backoff::new(&policy);
        for _ in 0..3 {
            assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        }

        policy.backoff_multiplier = f64::NAN;
        policy.jitter = 5.0;
        let mut backoff = Backoff::new(&policy);
        for _ in 0..3 {
            assert!(backoff.next_delay() <= Duration::from_secs(1));
        }
    }

    #[test]
    fn huge_multiplier_saturates_at_max_backoff() {
        let mut policy = RetryPolicy::default().with_jitter(0.5);
        policy.initial_backoff = Duration::from_secs(1);
        policy.max_backoff = Duration::MAX;
        policy.backoff_multiplier = 1e300;
        let mut backoff = Backoff::new(&policy);

        backoff.next_delay();
        for _ in 0..3 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::MAX / 4, "delay {delay:?}");
        }
    }
}

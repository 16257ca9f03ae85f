//! `snipeit-http` is the request-execution core of an async client for the
//! Snipe-IT asset management API.
//!
//! API services build an [`ApiRequest`] and hand it to
//! [`SnipeItClient::execute`], which:
//! - waits for the configured [`RateLimiter`] (e.g. [`TokenBucketRateLimiter`])
//! - sends the request once over `reqwest`
//! - retries transient failures per [`RetryPolicy`], honoring `Retry-After`
//!
//! A single [`CancelSignal`] aborts the call at any of these stages.

mod cancel;
mod client;
mod error;
mod limiter;
mod options;
mod request;
mod retry;
mod transport;
mod types;
mod wire;

pub use cancel::{CancelReason, CancelSignal};
pub use client::SnipeItClient;
pub use error::SnipeItError;
pub use limiter::{RateLimiter, TokenBucketRateLimiter, Unlimited};
pub use options::{ClientOptions, RequestOptions};
pub use request::ApiRequest;
pub use retry::{parse_retry_after, should_retry, RetryDecision, RetryPolicy};
pub use types::{ApiResponse, DecodeTarget, JsonSlot};

pub type Result<T> = std::result::Result<T, SnipeItError>;

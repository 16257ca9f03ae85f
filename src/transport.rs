//! A single HTTP round trip, without retries.

use reqwest::{
    header::{HeaderMap, RETRY_AFTER},
    StatusCode,
};

use crate::{wire::ErrorPayload, ApiResponse, CancelSignal, DecodeTarget, Result, SnipeItError};

/// Sends `request` once and classifies the outcome.
///
/// The whole attempt, including reading the body, is raced against
/// `cancel`. A transport error observed after the signal fired is reported
/// as a cancellation.
pub(crate) async fn send_once(
    http: &reqwest::Client,
    request: reqwest::Request,
    target: DecodeTarget<'_>,
    cancel: &CancelSignal,
) -> Result<ApiResponse> {
    tokio::select! {
        biased;
        reason = cancel.cancelled() => Err(SnipeItError::Cancelled(reason)),
        outcome = round_trip(http, request, target) => match (outcome, cancel.reason()) {
            (Err(SnipeItError::Transport(_)), Some(reason)) => Err(SnipeItError::Cancelled(reason)),
            (outcome, _) => outcome,
        },
    }
}

async fn round_trip(
    http: &reqwest::Client,
    request: reqwest::Request,
    target: DecodeTarget<'_>,
) -> Result<ApiResponse> {
    let method = request.method().to_string();
    let url = request.url().clone();

    let response = http
        .execute(request)
        .await
        .map_err(SnipeItError::Transport)?;
    let status = response.status();
    let headers = response.headers().clone();

    if !status.is_success() {
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        // An unreadable error body only costs us the message.
        let body = response.bytes().await.unwrap_or_default();
        let message = ErrorPayload::parse(&body).into_message();

        #[cfg(feature = "tracing")]
        tracing::debug!(status = status.as_u16(), %method, %url, "api error response");

        return Err(SnipeItError::Api {
            status: status.as_u16(),
            method,
            url: url.to_string(),
            message,
            retry_after,
            headers,
        });
    }

    let response_url = response.url().clone();
    decode_body(response, target, status, &headers).await?;

    Ok(ApiResponse {
        status,
        headers,
        url: response_url,
    })
}

async fn decode_body(
    mut response: reqwest::Response,
    target: DecodeTarget<'_>,
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<()> {
    match target {
        DecodeTarget::Discard => Ok(()),
        DecodeTarget::Raw(sink) => {
            while let Some(chunk) = response.chunk().await.map_err(SnipeItError::Transport)? {
                sink.write_all(&chunk)?;
            }
            sink.flush()?;
            Ok(())
        }
        DecodeTarget::Json(slot) => {
            let body = response.bytes().await.map_err(SnipeItError::Transport)?;
            if body.iter().all(u8::is_ascii_whitespace) {
                return Ok(());
            }
            slot.fill(&body).map_err(|err| SnipeItError::Decode {
                message: format!(
                    "invalid JSON response: {err}; body: {}",
                    String::from_utf8_lossy(&body)
                ),
                status: status.as_u16(),
                headers: headers.clone(),
            })
        }
    }
}

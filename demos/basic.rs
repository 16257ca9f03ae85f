use std::time::Duration;

use serde_json::{json, Value as JsonValue};
use snipeit_http::{
    ApiRequest, CancelSignal, ClientOptions, RequestOptions, RetryPolicy, SnipeItClient,
    TokenBucketRateLimiter,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::var("SNIPEIT_URL")?;
    let token = std::env::var("SNIPEIT_TOKEN")?;

    let client = SnipeItClient::new(url, token)?.with_options(
        ClientOptions::default()
            .with_rate_limiter(TokenBucketRateLimiter::new(5.0, 10))
            .with_retry_policy(RetryPolicy::default().with_max_retries(5)),
    );

    let (_, assets) = client
        .execute_json::<JsonValue>(
            &ApiRequest::get("api/v1/hardware?limit=5"),
            RequestOptions::default().with_cancel(CancelSignal::timeout(Duration::from_secs(30))),
        )
        .await?;

    if let Some(rows) = assets.as_ref().and_then(|body| body["rows"].as_array()) {
        for row in rows {
            println!("{} {}", row["asset_tag"], row["name"]);
        }
    }

    // Creates are not idempotent.
    let create = ApiRequest::json(
        reqwest::Method::POST,
        "api/v1/hardware",
        &json!({"asset_tag": "DEMO-001", "model_id": 1, "status_id": 1}),
    )?;
    let (response, created) = client
        .execute_json::<JsonValue>(&create, RequestOptions::default().without_retries())
        .await?;
    println!("{} {:?}", response.status, created);

    Ok(())
}

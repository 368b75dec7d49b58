//! First-valid-response racing across mirrors
//!
//! All mirrors are queried at once. The first response that passes
//! [`is_structurally_valid`] wins; the remaining requests are dropped (and so
//! abandoned) as soon as a winner is found. Each request carries its own
//! deadline.

use super::transport::CatalogTransport;
use crate::error::ResolveError;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Duck-typed validity check for a primary catalog search response.
///
/// Accepts a success flag, a `"SUCCESS"` status, or a results array either at
/// the top level or under `data`.
pub fn is_structurally_valid(body: &Value) -> bool {
    let Some(obj) = body.as_object() else {
        return false;
    };
    obj.get("success").and_then(Value::as_bool) == Some(true)
        || obj.get("status").and_then(Value::as_str) == Some("SUCCESS")
        || body.pointer("/data/results").is_some_and(Value::is_array)
        || obj.get("results").is_some_and(Value::is_array)
}

/// Query every URL concurrently and return the first structurally valid body.
///
/// Returns `None` when every request failed, timed out or was invalid.
pub async fn race_first_valid<T>(
    transport: &T,
    urls: &[String],
    timeout: Duration,
) -> Option<(usize, Value)>
where
    T: CatalogTransport + ?Sized,
{
    let mut pending: FuturesUnordered<_> = urls
        .iter()
        .enumerate()
        .map(|(index, url)| async move {
            let outcome = match tokio::time::timeout(timeout, transport.get_json(url)).await {
                Ok(result) => result,
                Err(_) => Err(ResolveError::Timeout(timeout.as_millis() as u64)),
            };
            (index, outcome)
        })
        .collect();

    while let Some((index, outcome)) = pending.next().await {
        match outcome {
            Ok(body) if is_structurally_valid(&body) => {
                debug!(mirror = %urls[index], "mirror won the race");
                return Some((index, body));
            }
            Ok(_) => debug!(mirror = %urls[index], "mirror returned an invalid payload"),
            Err(e) => debug!(mirror = %urls[index], error = %e, "mirror failed"),
        }
    }
    None
}

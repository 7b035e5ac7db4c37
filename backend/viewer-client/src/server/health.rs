use std::time::Duration;

use log::debug;
use reqwest::Client;

/// Check whether the viewer server answers HTTP.
///
/// Sends `HEAD /` with the given timeout. Any HTTP response counts as alive -
/// the server only needs to be accepting connections, not serving a
/// particular route.
///
/// # Returns
///
/// * `true` - If the server produced a response in time
/// * `false` - If the request failed or timed out
pub async fn ping(hostname: &str, port: u16, timeout: Duration) -> bool {
    let url = format!("http://{hostname}:{port}/");

    let client = match Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            debug!("Failed to build HTTP client for ping: {e}");
            return false;
        }
    };

    match client.head(&url).send().await {
        Ok(resp) => {
            debug!("Ping {url} answered with status={}", resp.status());
            true
        }
        Err(e) => {
            debug!("Ping {url} failed: {e}");
            false
        }
    }
}

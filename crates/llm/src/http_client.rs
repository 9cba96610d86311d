//! HTTP client factory for provider calls.

use std::time::Duration;

/// Per-call ceiling applied when no other timeout is configured.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Builds the shared `reqwest::Client` used by every adapter.
///
/// `timeout` bounds a whole call, including reading a streamed body.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
}

//! Shared HTTP plumbing for the Dream endpoints.

use reqwest::{Client, RequestBuilder};

/// Browser identity sent with every request; the web endpoints reject
/// obviously scripted clients.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:131.0) Gecko/20100101 Firefox/131.0";
pub const ORIGIN: &str = "https://dream.ai";
pub const REFERER: &str = "https://dream.ai/";

/// Build the client shared by every component. Per-request timeouts are set
/// at each call site.
pub fn build_client() -> reqwest::Result<Client> {
    Client::builder().user_agent(USER_AGENT).build()
}

/// Send `request` and return the body of a successful response.
///
/// Transport failures and non-success statuses are logged and flattened to a
/// message so each caller can wrap them in its own error variant.
pub(crate) async fn send_for_text(
    request: RequestBuilder,
    what: &str,
) -> std::result::Result<String, String> {
    let response = request.send().await.map_err(|e| {
        tracing::error!("Failed to send {} request: {}", what, e);
        format!("request failed: {}", e)
    })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| {
        tracing::error!("Failed to read {} response body: {}", what, e);
        format!("failed to read body: {}", e)
    })?;

    if !status.is_success() {
        tracing::error!("{} error (status {}): {}", what, status, body);
        return Err(format!("status {}: {}", status, body));
    }

    Ok(body)
}

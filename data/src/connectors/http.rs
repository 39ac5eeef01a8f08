use recap_config::ConnectorSettings;
use reqwest::{Client, Response, StatusCode};

use super::error::{ConnectorError, ConnectorResult};

/// HTTP client shared by the API-backed connectors
pub fn build_client(settings: &ConnectorSettings) -> ConnectorResult<Client> {
    Client::builder()
        .user_agent(settings.user_agent.clone())
        .timeout(settings.request_timeout())
        .build()
        .map_err(ConnectorError::from)
}

/// Maps non-2xx responses onto connector errors
pub async fn check_response(service: &str, response: Response) -> ConnectorResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("{} API error {}: {}", service, status, body);

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ConnectorError::AuthenticationFailed(message),
        StatusCode::TOO_MANY_REQUESTS => ConnectorError::RateLimitExceeded(message),
        _ => ConnectorError::HttpError(message),
    })
}

pub fn trim_base(url: &str) -> &str {
    url.trim_end_matches('/')
}

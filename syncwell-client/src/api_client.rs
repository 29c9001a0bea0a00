//! REST client and failure classification.
//!
//! Every failure leaving this module is a classified [`RemoteError`]; status
//! codes and transport errors never travel further.

use crate::config::{AuthConfig, ClientConfig};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use syncwell_core::{ErrorEnvelope, RemoteError};
use tracing::debug;

const NETWORK_MESSAGE: &str = "Network connection failed, check your connection or try again later";
const SERVER_MESSAGE: &str = "Server error, please try again later";
const VALIDATION_MESSAGE: &str = "Input validation failed";

/// Errors building the client itself.
#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Config error: {0}")]
    Config(String),
}

#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderMap,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let auth_header = build_auth_headers(&config.auth)?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_header,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) async fn get_json<T, Q>(&self, path: &str, query: Option<&Q>) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let mut request = self.client.get(self.url(path));
        if let Some(query) = query {
            request = request.query(query);
        }
        let response = self.send(request).await?;
        self.parse_response(response).await
    }

    pub(crate) async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.send(self.client.post(self.url(path)).json(body)).await?;
        self.parse_response(response).await
    }

    pub(crate) async fn patch_json<T, B>(&self, path: &str, body: &B) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.send(self.client.patch(self.url(path)).json(body)).await?;
        self.parse_response(response).await
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        let response = self.send(self.client.delete(self.url(path))).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.bytes().await.map_err(|e| classify_transport(&e))?;
        Err(classify_status(status.as_u16(), &body))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request
            .headers(self.auth_header.clone())
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;
        debug!(url = %response.url(), status = response.status().as_u16(), "Response received");
        Ok(response)
    }

    async fn parse_response<T: DeserializeOwned>(&self, response: Response) -> Result<T, RemoteError> {
        let status = response.status();
        let body = response.bytes().await.map_err(|e| classify_transport(&e))?;
        if status.is_success() {
            serde_json::from_slice::<T>(&body)
                .map_err(|e| RemoteError::unknown(format!("Unexpected response body: {}", e)))
        } else {
            Err(classify_status(status.as_u16(), &body))
        }
    }
}

/// Classify a request that produced no usable response.
pub fn classify_transport(err: &reqwest::Error) -> RemoteError {
    if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
        RemoteError::network(NETWORK_MESSAGE)
    } else {
        RemoteError::unknown(format!("Unknown error, please try again later ({})", err))
    }
}

/// Classify a non-success response from its status and raw body.
pub fn classify_status(status: u16, body: &[u8]) -> RemoteError {
    let Ok(ErrorEnvelope { error }) = serde_json::from_slice::<ErrorEnvelope>(body) else {
        return RemoteError::server(
            format!("http_{}", status),
            format!("Request failed ({})", status),
        );
    };

    let message_or = |fallback: String| {
        if error.message.is_empty() {
            fallback
        } else {
            error.message.clone()
        }
    };

    let classified = match status {
        422 => RemoteError::validation(
            error.code.clone(),
            message_or(VALIDATION_MESSAGE.to_string()),
        ),
        500.. => return RemoteError::server(error.code, SERVER_MESSAGE),
        _ => RemoteError::server(
            error.code.clone(),
            message_or(format!("Request failed ({})", status)),
        ),
    };
    match error.details {
        Some(details) => classified.with_details(details),
        None => classified,
    }
}

fn build_auth_headers(auth: &AuthConfig) -> Result<HeaderMap, ApiClientError> {
    let mut headers = HeaderMap::new();
    if let Some(api_key) = &auth.api_key {
        headers.insert(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_str(api_key).map_err(|e| ApiClientError::Config(e.to_string()))?,
        );
    }
    if let Some(token) = &auth.bearer_token {
        let value = format!("Bearer {}", token);
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&value).map_err(|e| ApiClientError::Config(e.to_string()))?,
        );
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, DebounceConfig, TreeConfig};
    use serde_json::json;
    use syncwell_core::ErrorKind;

    fn config(url: &str) -> ClientConfig {
        ClientConfig {
            api_base_url: url.to_string(),
            request_timeout_ms: 2_000,
            auth: AuthConfig {
                api_key: Some("test-key".to_string()),
                bearer_token: None,
            },
            cache: CacheConfig {
                stale_after_ms: None,
                retain_unused: false,
            },
            debounce: DebounceConfig {
                search_delay_ms: 300,
            },
            tree: TreeConfig {
                database: "main".to_string(),
            },
        }
    }

    fn envelope(code: &str, message: &str, details: Option<serde_json::Value>) -> Vec<u8> {
        let mut error = json!({ "code": code, "message": message });
        if let Some(details) = details {
            error["details"] = details;
        }
        serde_json::to_vec(&json!({ "error": error })).unwrap()
    }

    #[test]
    fn test_422_is_validation_with_details() {
        let body = envelope(
            "validation_error",
            "title must not be empty",
            Some(json!({ "field": "title" })),
        );
        let err = classify_status(422, &body);
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.code, "validation_error");
        assert_eq!(err.message, "title must not be empty");
        assert_eq!(err.field(), Some("title"));
    }

    #[test]
    fn test_5xx_hides_server_message() {
        let body = envelope("internal_error", "stack trace here", Some(json!({ "x": 1 })));
        let err = classify_status(503, &body);
        assert_eq!(err.kind, ErrorKind::Server);
        assert_eq!(err.code, "internal_error");
        assert_eq!(err.message, SERVER_MESSAGE);
        assert!(err.details.is_none());
    }

    #[test]
    fn test_other_4xx_keeps_server_message() {
        let body = envelope("ticket_not_found", "Ticket not found", None);
        let err = classify_status(404, &body);
        assert_eq!(err.kind, ErrorKind::Server);
        assert_eq!(err.code, "ticket_not_found");
        assert_eq!(err.message, "Ticket not found");
    }

    #[test]
    fn test_empty_message_falls_back() {
        let body = envelope("conflict", "", None);
        let err = classify_status(409, &body);
        assert_eq!(err.message, "Request failed (409)");

        let body = envelope("validation_error", "", None);
        assert_eq!(classify_status(422, &body).message, VALIDATION_MESSAGE);
    }

    #[test]
    fn test_no_envelope_uses_http_code() {
        let err = classify_status(502, b"<html>Bad Gateway</html>");
        assert_eq!(err.kind, ErrorKind::Server);
        assert_eq!(err.code, "http_502");
        assert_eq!(err.message, "Request failed (502)");
    }

    #[test]
    fn test_client_builds_with_auth() {
        let client = RestClient::new(&config("http://localhost:8000/")).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert!(client.auth_header.contains_key("x-api-key"));
    }

    #[test]
    fn test_invalid_header_value_is_config_error() {
        let mut cfg = config("http://localhost:8000");
        cfg.auth.api_key = Some("bad\nkey".to_string());
        assert!(matches!(RestClient::new(&cfg), Err(ApiClientError::Config(_))));
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_error() {
        let client = RestClient::new(&config("http://127.0.0.1:9")).unwrap();
        let err = client
            .get_json::<serde_json::Value, ()>("/tickets", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
        assert_eq!(err.code, "network_error");
    }
}

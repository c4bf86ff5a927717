//! REST client for the chat backend.
//!
//! Every call maps one endpoint. Non-success statuses are captured with
//! their body text so the reducer can surface something better than a bare
//! status code.

use std::fmt;

use log::{debug, info, warn};
use reqwest::Method;

use super::types::{ChatDto, CreateChatRequest, MessageDto};

/// Errors that can occur talking to the backend.
/// Variants carry enough info to determine retryability (future use).
#[derive(Debug)]
pub enum ApiError {
    /// Network-level failure (timeout, DNS, connection refused). Retryable.
    Network(String),
    /// Backend returned an error response. Retryable if status >= 500 or 429.
    Api { status: u16, message: String },
    /// Failed to parse the backend's response. Not retryable.
    Parse(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(msg) => write!(f, "network error: {msg}"),
            ApiError::Api { status, message } => {
                write!(f, "API error (HTTP {status}): {message}")
            }
            ApiError::Parse(msg) => write!(f, "parse error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Client for the backend's REST surface.
pub struct ChatApi {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl ChatApi {
    /// Creates a new client.
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. `http://localhost:8080/api`
    /// * `token` - Optional bearer token attached to every request
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        ChatApi {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder
    }

    /// Sends a request and returns the response, with non-success statuses
    /// mapped to `ApiError::Api` and the error body captured.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        debug!("backend response status: {}", response.status());

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            warn!("backend API error: {} - {}", status, message);
            return Err(ApiError::Api { status, message });
        }

        Ok(response)
    }

    /// GET /chats
    pub async fn list_chats(&self) -> Result<Vec<ChatDto>, ApiError> {
        info!("GET /chats");
        let response = self.send(self.request(Method::GET, "/chats")).await?;
        response
            .json::<Vec<ChatDto>>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// POST /chats
    pub async fn create_chat(&self, request: &CreateChatRequest) -> Result<ChatDto, ApiError> {
        info!("POST /chats (assistant {})", request.assistant_id);
        let response = self
            .send(self.request(Method::POST, "/chats").json(request))
            .await?;
        response
            .json::<ChatDto>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// DELETE /chats/{id}. Success carries no body.
    pub async fn delete_chat(&self, chat_id: &str) -> Result<(), ApiError> {
        info!("DELETE /chats/{chat_id}");
        self.send(self.request(Method::DELETE, &format!("/chats/{chat_id}")))
            .await?;
        Ok(())
    }

    /// GET /chats/{id}/messages
    pub async fn list_messages(&self, chat_id: &str) -> Result<Vec<MessageDto>, ApiError> {
        info!("GET /chats/{chat_id}/messages");
        let response = self
            .send(self.request(Method::GET, &format!("/chats/{chat_id}/messages")))
            .await?;
        response
            .json::<Vec<MessageDto>>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builds_url_and_bearer_header() {
        let api = ChatApi::new("http://host/api/", Some("tok-1".to_string()));
        let request = api.request(Method::GET, "/chats").build().unwrap();
        assert_eq!(request.url().as_str(), "http://host/api/chats");
        assert_eq!(
            request
                .headers()
                .get("Authorization")
                .unwrap()
                .to_str()
                .unwrap(),
            "Bearer tok-1"
        );
    }

    #[test]
    fn test_request_without_token_has_no_auth_header() {
        let api = ChatApi::new("http://host/api", None);
        let request = api
            .request(Method::DELETE, "/chats/c1")
            .build()
            .unwrap();
        assert_eq!(request.url().as_str(), "http://host/api/chats/c1");
        assert!(request.headers().get("Authorization").is_none());
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::Api {
            status: 404,
            message: "no such chat".to_string(),
        };
        assert_eq!(err.to_string(), "API error (HTTP 404): no such chat");
        assert_eq!(
            ApiError::Network("refused".to_string()).to_string(),
            "network error: refused"
        );
    }
}

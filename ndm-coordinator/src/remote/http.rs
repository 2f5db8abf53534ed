//! Shared HTTP plumbing for the *arr v3 APIs
//!
//! One [`ArrHttp`] per configured manager. Every request carries the API key
//! and the client-wide timeout; status codes and transport failures are
//! mapped onto [`RemoteError`] here so the manager modules never see reqwest.

use ndm_common::ManagerEndpoint;
use reqwest::{header, Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

use super::RemoteError;
use crate::models::Manager;

/// Error bodies are truncated to this many characters in messages
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SystemStatus {
    version: String,
}

/// HTTP access to one manager
#[derive(Debug, Clone)]
pub struct ArrHttp {
    manager: Manager,
    client: Client,
    base_url: String,
    api_key: String,
}

impl ArrHttp {
    pub fn new(manager: Manager, endpoint: &ManagerEndpoint, timeout: Duration) -> Result<Self, RemoteError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| RemoteError::Transient(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            manager,
            client,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            api_key: endpoint.api_key.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        self.client.request(method, url).header("X-Api-Key", &self.api_key)
    }

    async fn send(&self, method: Method, path: &str, builder: RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let started = Instant::now();
        let response = builder.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();

        debug!(
            manager = %self.manager,
            method = %method,
            path,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Manager request"
        );

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(self.status_error(status, &body))
    }

    fn transport_error(&self, err: reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Transient(format!("{} request timed out", self.manager))
        } else if err.is_connect() {
            RemoteError::Transient(format!("cannot connect to {}: {}", self.manager, err))
        } else {
            RemoteError::Transient(format!("{} request failed: {}", self.manager, err))
        }
    }

    fn status_error(&self, status: StatusCode, body: &str) -> RemoteError {
        let detail: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
        let message = if detail.is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            format!("HTTP {}: {}", status.as_u16(), detail)
        };

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized {
                manager: self.manager,
                message,
            },
            StatusCode::NOT_FOUND => RemoteError::NotFound(message),
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => RemoteError::Transient(message),
            s if s.is_server_error() => RemoteError::Transient(message),
            s => RemoteError::Rejected {
                code: s.as_u16(),
                message,
            },
        }
    }

    /// GET and decode a JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, RemoteError> {
        let builder = self.request(Method::GET, path).query(query);
        let response = self.send(Method::GET, path, builder).await?;
        let status = response.status();

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e)
            } else {
                RemoteError::Rejected {
                    code: status.as_u16(),
                    message: format!("unexpected {} response from {}: {}", self.manager, path, e),
                }
            }
        })
    }

    /// POST a JSON body; the response body is ignored
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<(), RemoteError> {
        let builder = self.request(Method::POST, path).json(body);
        self.send(Method::POST, path, builder).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        let builder = self.request(Method::DELETE, path);
        self.send(Method::DELETE, path, builder).await?;
        Ok(())
    }

    /// `GET api/v3/system/status`, returning the manager's version
    pub async fn system_version(&self) -> Result<String, RemoteError> {
        let status: SystemStatus = self.get_json("api/v3/system/status", &[]).await?;
        Ok(status.version)
    }
}

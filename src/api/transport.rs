//! HTTP transport seam.
//!
//! [`JiraClient`](super::jira::JiraClient) never talks to reqwest directly;
//! it hands an [`HttpRequest`] to an [`HttpTransport`]. Two native
//! transports exist: [`FetchTransport`] goes through reqwest's request
//! builder, [`RawTransport`] assembles a `reqwest::Request` by hand on an
//! HTTP/1.1-only client without connection reuse. The last issue-creation
//! strategy uses the raw one to sidestep proxies and servers that choke on
//! what the builder sends.

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use std::collections::HashMap;

use crate::errors::{JiraMailError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn is_write(self) -> bool {
        matches!(self, Method::Post)
    }

    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

#[cfg(test)]
impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request. An `Err` means no HTTP response arrived at all.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

pub struct FetchTransport {
    client: reqwest::Client,
}

impl FetchTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for FetchTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for FetchTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method.as_reqwest(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        into_response(response).await
    }
}

pub struct RawTransport {
    client: reqwest::Client,
}

impl RawTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .http1_only()
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for RawTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| JiraMailError::ConfigInvalid(format!("{}: {}", request.url, e)))?;

        let mut raw = reqwest::Request::new(request.method.as_reqwest(), url);
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| JiraMailError::Other(format!("bad header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| JiraMailError::Other(format!("bad header value: {}", e)))?;
            raw.headers_mut().append(name, value);
        }
        if let Some(body) = request.body {
            *raw.body_mut() = Some(reqwest::Body::from(body));
        }

        let response = self.client.execute(raw).await?;
        into_response(response).await
    }
}

async fn into_response(response: reqwest::Response) -> Result<HttpResponse> {
    let status = response.status();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        headers,
        body,
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_transport_roundtrip() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/echo")
            .match_header("x-test", "1")
            .match_body("payload")
            .with_status(201)
            .with_header("X-CSRF-TOKEN", "abc")
            .with_body("done")
            .create_async()
            .await;

        let response = FetchTransport::new()
            .send(HttpRequest {
                method: Method::Post,
                url: format!("{}/echo", server.url()),
                headers: vec![("X-Test".to_string(), "1".to_string())],
                body: Some(b"payload".to_vec()),
            })
            .await
            .unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(response.status_text, "Created");
        assert_eq!(response.header("X-CSRF-Token"), Some("abc"));
        assert_eq!(response.text(), "done");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_raw_transport_roundtrip() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/thing")
            .match_header("accept", "application/json")
            .with_status(404)
            .create_async()
            .await;

        let response = RawTransport::new()
            .unwrap()
            .send(HttpRequest {
                method: Method::Get,
                url: format!("{}/thing", server.url()),
                headers: vec![("Accept".to_string(), "application/json".to_string())],
                body: None,
            })
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert!(!response.is_success());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_raw_transport_rejects_bad_url() {
        let err = RawTransport::new()
            .unwrap()
            .send(HttpRequest {
                method: Method::Get,
                url: "not a url".to_string(),
                headers: Vec::new(),
                body: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, JiraMailError::ConfigInvalid(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Port 9 (discard) is closed on test machines.
        let err = FetchTransport::new()
            .send(HttpRequest {
                method: Method::Get,
                url: "http://127.0.0.1:9/".to_string(),
                headers: Vec::new(),
                body: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, JiraMailError::NetworkError(_)));
    }
}

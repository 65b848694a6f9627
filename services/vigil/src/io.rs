//! HTTP client abstraction for testability

use std::time::Duration;

use async_trait::async_trait;

/// An outgoing HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: &str, timeout: Duration) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.to_string(),
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }
}

/// HTTP response from a request
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub content_type: Option<String>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Abstraction over HTTP client for dependency injection
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient: Send + Sync {
    /// Send an arbitrary request
    async fn send(&self, request: &HttpRequest) -> crate::Result<HttpResponse>;

    /// Send a POST request with a JSON body
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> crate::Result<HttpResponse>;

    /// Send a POST request with form-encoded body
    async fn post_form(&self, url: &str, params: &[(&str, &str)]) -> crate::Result<HttpResponse>;
}

/// Timeout for notification deliveries
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Production HTTP client using reqwest
#[derive(Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }
}

async fn into_response(response: reqwest::Response) -> crate::Result<HttpResponse> {
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response
        .text()
        .await
        .map_err(|e| crate::VigilError::Http(format!("Reading response body: {}", e)))?;
    Ok(HttpResponse {
        status,
        body,
        content_type,
    })
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: &HttpRequest) -> crate::Result<HttpResponse> {
        tracing::debug!("{} {}", request.method, request.url);
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|e| {
                crate::VigilError::Http(format!("Invalid method '{}': {}", request.method, e))
            })?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            crate::VigilError::Http(format!(
                "{} {} failed: {}",
                request.method, request.url, e
            ))
        })?;
        let response = into_response(response).await?;

        tracing::debug!(
            "{} {} -> {} ({} bytes)",
            request.method,
            request.url,
            response.status,
            response.body.len()
        );
        Ok(response)
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> crate::Result<HttpResponse> {
        tracing::debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .timeout(DELIVERY_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|e| crate::VigilError::Http(format!("POST {} failed: {}", url, e)))?;

        let response = into_response(response).await?;
        tracing::debug!("POST {} -> {}", url, response.status);
        Ok(response)
    }

    async fn post_form(&self, url: &str, params: &[(&str, &str)]) -> crate::Result<HttpResponse> {
        tracing::debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .timeout(DELIVERY_TIMEOUT)
            .form(params)
            .send()
            .await
            .map_err(|e| crate::VigilError::Http(format!("POST {} failed: {}", url, e)))?;

        let response = into_response(response).await?;
        tracing::debug!("POST {} -> {}", url, response.status);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A URL that will always refuse connections (port 1 is reserved and unbound)
    const UNREACHABLE_URL: &str = "http://127.0.0.1:1/test";

    #[tokio::test]
    async fn send_connection_refused_returns_http_error() {
        let client = ReqwestHttpClient::new();
        let request = HttpRequest::get(UNREACHABLE_URL, Duration::from_secs(2));
        let err = client.send(&request).await.unwrap_err();

        match &err {
            crate::VigilError::Http(msg) => {
                assert!(
                    msg.starts_with("GET http://127.0.0.1:1/test failed:"),
                    "{msg}"
                );
            }
            other => panic!("expected VigilError::Http, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_rejects_invalid_method() {
        let client = ReqwestHttpClient::new();
        let mut request = HttpRequest::get(UNREACHABLE_URL, Duration::from_secs(2));
        request.method = "NOT A METHOD".to_string();
        let err = client.send(&request).await.unwrap_err();
        assert!(err.to_string().contains("Invalid method"), "{err}");
    }

    #[tokio::test]
    async fn post_json_connection_refused_returns_http_error() {
        let client = ReqwestHttpClient::new();
        let err = client
            .post_json(UNREACHABLE_URL, &serde_json::json!({"text": "hi"}))
            .await
            .unwrap_err();

        match &err {
            crate::VigilError::Http(msg) => {
                assert!(
                    msg.starts_with("POST http://127.0.0.1:1/test failed:"),
                    "{msg}"
                );
            }
            other => panic!("expected VigilError::Http, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn post_form_connection_refused_returns_http_error() {
        let client = ReqwestHttpClient::new();
        let err = client
            .post_form(UNREACHABLE_URL, &[("key", "value")])
            .await
            .unwrap_err();
        assert!(matches!(err, crate::VigilError::Http(_)));
    }
}

//! HTTP client abstraction for testability

use std::future::Future;
use std::time::Duration;

use super::types::ProviderError;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Status and body of a completed HTTP exchange.
///
/// Non-2xx responses are returned as values, not errors, so each adapter can
/// translate them with its own provider name.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for async HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
pub trait AsyncHttpClient: Send + Sync {
    /// Performs an HTTP GET request.
    fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> impl Future<Output = Result<HttpResponse, ProviderError>> + Send;

    /// Performs an HTTP POST request with the given body.
    fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> impl Future<Output = Result<HttpResponse, ProviderError>> + Send;
}

/// Real HTTP client implementation using reqwest.
///
/// Cloning is cheap; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with default configuration.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates a new ReqwestClient with custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("slymaps/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<HttpResponse, ProviderError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Network(format!("Request timed out: {}", e))
            } else {
                ProviderError::Network(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Network(format!("Failed to read response: {}", e)))?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

impl AsyncHttpClient for ReqwestClient {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, ProviderError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.send(request).await
    }

    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, ProviderError> {
        let mut request = self.client.post(url).body(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.send(request).await
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// A request seen by [`MockHttpClient`].
    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedRequest {
        pub method: &'static str,
        pub url: String,
        pub body: Option<String>,
        pub headers: Vec<(String, String)>,
    }

    #[derive(Debug, Clone)]
    struct MockRoute {
        pattern: String,
        reply: Result<HttpResponse, ProviderError>,
        delay: Option<Duration>,
    }

    #[derive(Debug, Default)]
    struct MockState {
        routes: Vec<MockRoute>,
        requests: Vec<RecordedRequest>,
        in_flight: usize,
        max_in_flight: usize,
    }

    /// Mock HTTP client for testing.
    ///
    /// Replies are matched by URL substring in registration order. Clones
    /// share state, so a test can keep a handle while the adapter owns one.
    #[derive(Debug, Clone, Default)]
    pub struct MockHttpClient {
        state: Arc<Mutex<MockState>>,
    }

    impl MockHttpClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// Reply with `status` and `body` to URLs containing `pattern`.
        pub fn respond(self, pattern: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
            self.push(pattern, Ok(HttpResponse {
                status,
                body: body.into(),
            }), None);
            self
        }

        /// Like [`respond`](Self::respond) but resolves after `delay`.
        pub fn respond_after(
            self,
            pattern: &str,
            delay: Duration,
            body: impl Into<Vec<u8>>,
        ) -> Self {
            self.push(pattern, Ok(HttpResponse::ok(body)), Some(delay));
            self
        }

        /// Fail requests to URLs containing `pattern`.
        pub fn fail(self, pattern: &str, error: ProviderError) -> Self {
            self.push(pattern, Err(error), None);
            self
        }

        fn push(
            &self,
            pattern: &str,
            reply: Result<HttpResponse, ProviderError>,
            delay: Option<Duration>,
        ) {
            self.state.lock().routes.push(MockRoute {
                pattern: pattern.to_string(),
                reply,
                delay,
            });
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.state.lock().requests.clone()
        }

        pub fn request_count(&self) -> usize {
            self.state.lock().requests.len()
        }

        /// Highest number of requests that were in flight at once.
        pub fn max_in_flight(&self) -> usize {
            self.state.lock().max_in_flight
        }

        async fn handle(&self, request: RecordedRequest) -> Result<HttpResponse, ProviderError> {
            let route = {
                let mut state = self.state.lock();
                let route = state
                    .routes
                    .iter()
                    .find(|r| request.url.contains(&r.pattern))
                    .cloned();
                state.requests.push(request.clone());
                state.in_flight += 1;
                state.max_in_flight = state.max_in_flight.max(state.in_flight);
                route
            };

            if let Some(delay) = route.as_ref().and_then(|r| r.delay) {
                tokio::time::sleep(delay).await;
            }

            self.state.lock().in_flight -= 1;

            match route {
                Some(route) => route.reply,
                None => Err(ProviderError::Network(format!(
                    "no mock response for {}",
                    request.url
                ))),
            }
        }
    }

    fn own_headers(headers: &[(&str, &str)]) -> Vec<(String, String)> {
        headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    impl AsyncHttpClient for MockHttpClient {
        async fn get(
            &self,
            url: &str,
            headers: &[(&str, &str)],
        ) -> Result<HttpResponse, ProviderError> {
            self.handle(RecordedRequest {
                method: "GET",
                url: url.to_string(),
                body: None,
                headers: own_headers(headers),
            })
            .await
        }

        async fn post(
            &self,
            url: &str,
            body: Vec<u8>,
            headers: &[(&str, &str)],
        ) -> Result<HttpResponse, ProviderError> {
            self.handle(RecordedRequest {
                method: "POST",
                url: url.to_string(),
                body: Some(String::from_utf8_lossy(&body).into_owned()),
                headers: own_headers(headers),
            })
            .await
        }
    }

    #[tokio::test]
    async fn test_mock_client_success() {
        let mock = MockHttpClient::new().respond("example.com", 200, vec![1, 2, 3, 4]);

        let result = mock.get("http://example.com", &[]).await;
        assert_eq!(result.unwrap().body, vec![1, 2, 3, 4]);
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_client_error() {
        let mock = MockHttpClient::new().fail("example.com", ProviderError::Network("down".into()));

        let result = mock.get("http://example.com", &[]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_client_unmatched_url() {
        let mock = MockHttpClient::new();
        let result = mock.post("http://nowhere", b"{}".to_vec(), &[]).await;
        assert!(matches!(result, Err(ProviderError::Network(_))));
        assert_eq!(mock.requests()[0].body.as_deref(), Some("{}"));
    }

    #[test]
    fn test_response_success_range() {
        assert!(HttpResponse::ok(vec![]).is_success());
        assert!(!HttpResponse {
            status: 404,
            body: vec![]
        }
        .is_success());
    }
}

//! # HTTP Retrieval Utilities
//!
//! An asynchronous API client wrapper around `reqwest`, with middleware-driven
//! exponential backoff retries. Bodies are exchanged as text because both of
//! its users speak non-JSON formats: session descriptions for signaling and
//! playlists for the headless engine.

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

/// A standardized container for API responses.
///
/// This struct wraps the response body along with metadata about the
/// HTTP transaction, such as status codes and headers.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The response body on success.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

/// A text body together with the content type it is sent as.
pub struct TextBody<'a> {
    /// Value of the `Content-Type` header.
    pub content_type: &'a str,
    /// The payload.
    pub text: String,
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles base URLs and automatic
/// retries of transient failures.
pub struct ApiClient {
    inner: ClientWithMiddleware,
    base_url: Url,
}

impl ApiClient {
    /// Creates a new `ApiClient` instance with a retry policy.
    ///
    /// # Arguments
    /// * `base_url` - The absolute base URL every relative path is joined to.
    /// * `max_retries` - Transient-failure retries; `0` disables retrying.
    ///
    /// # Errors
    /// Returns an error if `base_url` is not a valid absolute URL.
    pub fn new(base_url: &str, max_retries: u32) -> anyhow::Result<Self> {
        let url = Url::parse(base_url)?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);

        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
        })
    }

    /// The URL a relative path resolves to.
    pub fn resolve(&self, path: &str) -> anyhow::Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Performs an HTTP request and captures the response body as text.
    ///
    /// Non-2xx responses are not errors: they come back with `success: false`
    /// and the body in `error_body`.
    ///
    /// # Errors
    /// Returns an `anyhow::Error` if URL joining or network execution fails.
    pub async fn request_text(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<TextBody<'_>>,
    ) -> anyhow::Result<ApiResponse<String>> {
        // 1. Construct the full absolute URL
        let full_url = self.resolve(path)?;
        let mut req = self.inner.request(method, full_url);

        // 2. Add custom headers if provided
        if let Some(h) = headers {
            req = req.headers(h);
        }

        // 3. Attach the text body under its content type
        if let Some(b) = body {
            req = req.header(CONTENT_TYPE, b.content_type).body(b.text);
        }

        // 4. Execute the request and capture response metadata
        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        let resp_headers = response.headers().clone();
        let success = status.is_success();

        // 5. Success carries the body as data, anything else as error_body
        if success {
            let data = response.text().await?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
            })
        }
    }
}

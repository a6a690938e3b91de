//! Blocking HTTP client for exercising a running Spektr instance.

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::{ClientError, ClientResult};
use crate::expectations::RequestSpec;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Status and body of a completed exchange whose expectations all held.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeResult {
    status: u16,
    body: String,
}

impl ExchangeResult {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> ClientResult<Value> {
        serde_json::from_str(&self.body).map_err(|e| ClientError::InvalidJson {
            reason: e.to_string(),
        })
    }
}

/// Issues requests below `base_url + base_uri` and checks the responses.
///
/// # Examples
///
/// ```no_run
/// use spektr_client::SpektrTestClient;
///
/// # fn example(base_url: &str) -> Result<(), spektr_client::ClientError> {
/// let users = SpektrTestClient::new(base_url, "/api/users")?;
///
/// users.get("/42", |spec| {
///     spec.expect(|e| {
///         e.has_ok_status();
///         e.json_path("$.name").value_equals("Wraith");
///     })
/// })?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SpektrTestClient {
    http: Client,
    base_url: String,
    base_uri: String,
}

impl SpektrTestClient {
    /// # Errors
    /// Fails if the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, base_uri: impl Into<String>) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Build {
                reason: e.to_string(),
            })?;
        Ok(Self::with_client(http, base_url, base_uri))
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(
        http: Client,
        base_url: impl Into<String>,
        base_uri: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            base_uri: base_uri.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    pub fn get(&self, path: &str, scope: impl FnOnce(&mut RequestSpec)) -> ClientResult<ExchangeResult> {
        self.exchange(Method::GET, path, None, scope)
    }

    /// POST with a JSON content type and an optional JSON body.
    pub fn post(
        &self,
        path: &str,
        body: Option<&Value>,
        scope: impl FnOnce(&mut RequestSpec),
    ) -> ClientResult<ExchangeResult> {
        self.exchange(Method::POST, path, body, scope)
    }

    /// PUT with a JSON content type and an optional JSON body.
    pub fn put(
        &self,
        path: &str,
        body: Option<&Value>,
        scope: impl FnOnce(&mut RequestSpec),
    ) -> ClientResult<ExchangeResult> {
        self.exchange(Method::PUT, path, body, scope)
    }

    pub fn delete(&self, path: &str, scope: impl FnOnce(&mut RequestSpec)) -> ClientResult<ExchangeResult> {
        self.exchange(Method::DELETE, path, None, scope)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.base_uri, path)
    }

    fn exchange(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        scope: impl FnOnce(&mut RequestSpec),
    ) -> ClientResult<ExchangeResult> {
        let mut spec = RequestSpec::new();
        scope(&mut spec);

        let url = self.url(path);
        let mut request: RequestBuilder = self.http.request(method.clone(), &url);
        if method == Method::POST || method == Method::PUT {
            request = request.header(CONTENT_TYPE, "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }
        }

        let response = request.send().map_err(|e| ClientError::Request {
            method: method.to_string(),
            url: url.clone(),
            reason: e.to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|e| ClientError::Request {
            method: method.to_string(),
            url: url.clone(),
            reason: e.to_string(),
        })?;

        debug!(method = %method, url = %url, status, "Spektr client exchange");

        let failures = spec.verify(status, &body);
        if !failures.is_empty() {
            warn!(method = %method, url = %url, failures = failures.len(), "Expectations failed");
            return Err(ClientError::ExpectationFailed {
                method: method.to_string(),
                url,
                status,
                failures,
                body,
            });
        }

        Ok(ExchangeResult { status, body })
    }
}

/// Shorthand for [`SpektrTestClient::new`].
pub fn spektr_client(
    base_url: impl Into<String>,
    base_uri: impl Into<String>,
) -> ClientResult<SpektrTestClient> {
    SpektrTestClient::new(base_url, base_uri)
}

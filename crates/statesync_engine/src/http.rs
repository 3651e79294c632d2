use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use statesync_logging::{sync_debug, sync_warn};
use thiserror::Error;

use crate::config::ClientConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        return RemoteError::Timeout;
    }
    if err.is_decode() {
        return RemoteError::Decode(err.to_string());
    }
    RemoteError::Network(err.to_string())
}

/// Shared HTTP client. Every request carries the session cookies; mutating
/// requests additionally carry the anti-forgery header read from the cookie
/// jar. No other component builds request headers.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    stream_client: reqwest::Client,
    base_url: Url,
    jar: Arc<Jar>,
    csrf_cookie_name: String,
    csrf_header: HeaderName,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, RemoteError> {
        Self::with_cookie_jar(config, Arc::new(Jar::default()))
    }

    pub fn with_cookie_jar(config: &ClientConfig, jar: Arc<Jar>) -> Result<Self, RemoteError> {
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url =
            Url::parse(&base).map_err(|err| RemoteError::InvalidUrl(format!("{base}: {err}")))?;
        let csrf_header = HeaderName::from_bytes(config.csrf_header_name.as_bytes())
            .map_err(|err| RemoteError::InvalidUrl(format!("bad csrf header name: {err}")))?;
        for cookie in &config.cookies {
            jar.add_cookie_str(cookie, &base_url);
        }
        if !config.cookies.is_empty() {
            sync_debug!("Seeded {} configured cookie(s) for {}", config.cookies.len(), base_url);
        }

        let client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(map_reqwest_error)?;
        // Streams stay open for the lifetime of a job, so no overall timeout here.
        let stream_client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(map_reqwest_error)?;

        Ok(Self {
            client,
            stream_client,
            base_url,
            jar,
            csrf_cookie_name: config.csrf_cookie_name.clone(),
            csrf_header,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.jar
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| RemoteError::InvalidUrl(format!("{path}: {err}")))
    }

    /// Value of the anti-forgery cookie for the API origin, if the session has one.
    pub fn csrf_token(&self) -> Option<String> {
        let cookies = self.jar.cookies(&self.base_url)?;
        let cookies = cookies.to_str().ok()?;
        cookies.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == self.csrf_cookie_name && !value.is_empty()).then(|| value.to_string())
        })
    }

    /// Headers for a state-changing request.
    pub fn mutating_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        match self.csrf_token() {
            Some(token) => match HeaderValue::from_str(&token) {
                Ok(value) => {
                    headers.insert(self.csrf_header.clone(), value);
                }
                Err(err) => sync_warn!("Ignoring malformed anti-forgery cookie: {}", err),
            },
            None => sync_debug!("No anti-forgery cookie present for {}", self.base_url),
        }
        headers
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, RemoteError> {
        let mut url = self.endpoint(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_reqwest_error)?;
        decode_json(check_status(response).await?).await
    }

    /// Sends a POST/PATCH/PUT/DELETE through the shared mutating path.
    pub async fn send_mutating<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, RemoteError> {
        let url = self.endpoint(path)?;
        let mut request = self
            .client
            .request(method, url)
            .headers(self.mutating_headers());
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(map_reqwest_error)?;
        check_status(response).await
    }

    pub async fn send_mutating_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, RemoteError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send_mutating(method, path, body).await?;
        decode_json(response).await
    }

    /// Opens a long-lived GET for server-sent events.
    pub async fn open_event_stream(&self, path: &str) -> Result<Response, RemoteError> {
        let url = self.endpoint(path)?;
        let response = self
            .stream_client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::HttpStatus {
        status: status.as_u16(),
        body: if body.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            body
        },
    })
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    let bytes = response.bytes().await.map_err(map_reqwest_error)?;
    serde_json::from_slice(&bytes).map_err(|err| RemoteError::Decode(err.to_string()))
}

pub(crate) fn is_validation_status(status: u16) -> bool {
    status == StatusCode::BAD_REQUEST.as_u16() || status == StatusCode::CONFLICT.as_u16()
}

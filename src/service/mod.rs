// Blocking client for OpenAI-compatible HTTP services
// Shared by the embedding and generation clients


use serde::Serialize;
use serde::de::DeserializeOwned;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Why a service call produced no usable response
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    Request(String),

    /// 4xx answer; the request itself is wrong and is not retried
    #[error("Service rejected the request with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    /// 5xx answers or transport failures on every attempt
    #[error("Service unavailable after {attempts} attempts: {last}")]
    Unavailable { attempts: u32, last: String },

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Malformed response from {url}: {source}")]
    Malformed {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ServiceError {
    /// HTTP status of a rejected request
    #[inline]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Outcome of one attempt that did not succeed
enum Failure {
    Retryable(String),
    Final(ServiceError),
}

#[derive(Debug, Clone)]
pub struct ServiceClient {
    base_url: Url,
    api_key: Option<String>,
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff: Duration,
}

impl ServiceClient {
    #[inline]
    pub fn new(base_url: Url, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            base_url,
            api_key,
            agent: build_agent(timeout),
            retry_attempts: 3,
            backoff: DEFAULT_BACKOFF,
        }
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Delay before the first retry; doubles on every further attempt
    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base_url}/{path}`, keeping any path prefix such as `/v1`
    #[inline]
    pub fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined)
            .map_err(|e| ServiceError::Request(format!("Bad endpoint URL {joined}: {e}")))
    }

    /// POST `body` as JSON and decode the JSON answer.
    /// Server errors and dropped connections are retried with exponential backoff.
    #[inline]
    pub fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let payload = serde_json::to_string(body)
            .map_err(|e| ServiceError::Request(format!("Could not serialize body: {e}")))?;

        let text = self.send_with_retry(&url, &payload)?;
        serde_json::from_str(&text).map_err(|source| ServiceError::Malformed {
            url: url.to_string(),
            source,
        })
    }

    fn send_with_retry(&self, url: &Url, payload: &str) -> Result<String, ServiceError> {
        let mut delays = std::iter::successors(Some(self.backoff), |delay| Some(*delay * 2));
        let mut last = String::new();

        for attempt in 1..=self.retry_attempts {
            match self.send_once(url, payload) {
                Ok(text) => {
                    debug!("POST {} succeeded on attempt {}", url, attempt);
                    return Ok(text);
                }
                Err(Failure::Final(e)) => {
                    warn!("POST {} failed: {}", url, e);
                    return Err(e);
                }
                Err(Failure::Retryable(reason)) => {
                    warn!(
                        "POST {} attempt {}/{} failed: {}",
                        url, attempt, self.retry_attempts, reason
                    );
                    last = reason;
                }
            }

            if attempt < self.retry_attempts {
                if let Some(delay) = delays.next() {
                    thread::sleep(delay);
                }
            }
        }

        error!("Giving up on {} after {} attempts", url, self.retry_attempts);
        Err(ServiceError::Unavailable {
            attempts: self.retry_attempts,
            last,
        })
    }

    fn send_once(&self, url: &Url, payload: &str) -> Result<String, Failure> {
        let mut request = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let mut response = request.send(payload).map_err(|e| transport_failure(url, e))?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| transport_failure(url, e))?;

        match status {
            200..=299 => Ok(text),
            500.. => Err(Failure::Retryable(format!("HTTP {status}"))),
            _ => Err(Failure::Final(ServiceError::Rejected {
                status,
                message: error_message(&text),
            })),
        }
    }
}

fn transport_failure(url: &Url, error: ureq::Error) -> Failure {
    match error {
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_)
        | ureq::Error::Protocol(_) => Failure::Retryable(error.to_string()),
        other => Failure::Final(ServiceError::Transport {
            url: url.to_string(),
            message: other.to_string(),
        }),
    }
}

/// The `error.message` of an OpenAI style error body, else the start of the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(MAX_ERROR_BODY_CHARS).collect())
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

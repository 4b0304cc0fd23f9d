use std::sync::Arc;
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ServiceCredentials;
use super::throttle::RateGate;
use crate::error::SourceError;
use crate::util::truncate_chars;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

enum Attempt<T> {
    Done(Result<T, SourceError>),
    Retry(String),
}

#[derive(Debug)]
pub struct HttpTransport {
    service: &'static str,
    credentials: ServiceCredentials,
    client: Client,
    retry: RetryPolicy,
    gate: Arc<RateGate>,
}

impl HttpTransport {
    pub fn new(
        service: &'static str,
        credentials: ServiceCredentials,
        retry: RetryPolicy,
        gate: Arc<RateGate>,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .gzip(true)
            .build()
            .map_err(|err| SourceError::Transport {
                service,
                attempts: 0,
                reason: format!("failed to build http client: {err}"),
            })?;

        Ok(Self {
            service,
            credentials,
            client,
            retry,
            gate,
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn base_url(&self) -> &str {
        &self.credentials.base_url
    }

    pub fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let url = join_url(&self.credentials.base_url, path);
        let mut last_err = String::new();

        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                let backoff = self.retry.backoff_before(attempt);
                debug!(
                    service = self.service,
                    attempt,
                    max_retries = self.retry.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    reason = %last_err,
                    "retrying request"
                );
                thread::sleep(backoff);
            }

            self.gate.acquire();
            match self.attempt::<T>(&url, path, query) {
                Attempt::Done(result) => return result,
                Attempt::Retry(reason) => last_err = reason,
            }
        }

        Err(SourceError::Transport {
            service: self.service,
            attempts: self.retry.max_retries + 1,
            reason: last_err,
        })
    }

    fn attempt<T: DeserializeOwned>(
        &self,
        url: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Attempt<T> {
        let response = self
            .client
            .get(url)
            .query(query)
            .basic_auth(&self.credentials.email, Some(&self.credentials.api_token))
            .header(ACCEPT, "application/json")
            .send();

        let response = match response {
            Ok(response) => response,
            Err(err) => return Attempt::Retry(err.to_string()),
        };

        let status = response.status();
        if status.is_success() {
            return Attempt::Done(response.json::<T>().map_err(|err| SourceError::Decode {
                service: self.service,
                reason: err.to_string(),
            }));
        }

        match classify_status(status) {
            StatusClass::Auth => Attempt::Done(Err(SourceError::Auth {
                service: self.service,
                status: status.as_u16(),
            })),
            StatusClass::NotFound => Attempt::Done(Err(SourceError::NotFound {
                service: self.service,
                resource: path.to_string(),
            })),
            StatusClass::Retryable => Attempt::Retry(format!("HTTP {status}")),
            StatusClass::Rejected => {
                let body = response.text().unwrap_or_default();
                Attempt::Done(Err(SourceError::Status {
                    service: self.service,
                    status: status.as_u16(),
                    body: truncate_chars(body.trim(), ERROR_BODY_CHARS).to_string(),
                }))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Auth,
    NotFound,
    Retryable,
    Rejected,
}

fn classify_status(status: StatusCode) -> StatusClass {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StatusClass::Auth,
        StatusCode::NOT_FOUND => StatusClass::NotFound,
        StatusCode::TOO_MANY_REQUESTS => StatusClass::Retryable,
        status if status.is_server_error() => StatusClass::Retryable,
        _ => StatusClass::Rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 6,
            initial_backoff_ms: 500,
            max_backoff_ms: 3_000,
        };
        let waits = (1..=5)
            .map(|attempt| policy.backoff_before(attempt).as_millis())
            .collect::<Vec<_>>();
        assert_eq!(waits, vec![500, 1_000, 2_000, 3_000, 3_000]);
    }

    #[test]
    fn backoff_survives_large_attempt_numbers() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_before(200), Duration::from_millis(30_000));
    }

    #[test]
    fn status_classes_follow_retry_rules() {
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), StatusClass::Auth);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), StatusClass::Auth);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), StatusClass::NotFound);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            StatusClass::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            StatusClass::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST),
            StatusClass::Rejected
        );
    }

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(
            join_url("https://acme.atlassian.net/", "/rest/api/2/search"),
            "https://acme.atlassian.net/rest/api/2/search"
        );
        assert_eq!(
            join_url("https://acme.atlassian.net/wiki", "rest/api/content/1"),
            "https://acme.atlassian.net/wiki/rest/api/content/1"
        );
    }
}

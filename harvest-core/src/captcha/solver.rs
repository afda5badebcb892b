use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::config::SolverSection;

pub type SolverResult<T> = Result<T, SolverError>;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("captcha api key missing: environment variable {0} is not set")]
    MissingApiKey(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("solver rejected the submission: {0}")]
    Rejected(String),
    #[error("solution not ready after {0} polls")]
    PollExhausted(u32),
}

/// Image-to-text oracle. The production implementation talks to a remote
/// solving service; tests substitute an in-memory fake.
#[async_trait(?Send)]
pub trait CaptchaSolver {
    async fn solve(&self, image: &[u8]) -> SolverResult<String>;
}

/// Client for a 2Captcha-style HTTP API: submit the image base64-encoded,
/// receive a task id, then poll the result endpoint until the solved text
/// is available.
pub struct HttpCaptchaSolver {
    client: reqwest::Client,
    api_key: String,
    config: SolverSection,
}

impl HttpCaptchaSolver {
    pub fn from_env(config: SolverSection) -> SolverResult<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| SolverError::MissingApiKey(config.api_key_env.clone()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            config,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: u8,
    request: String,
}

fn submission_id(response: ApiResponse) -> SolverResult<String> {
    if response.status == 1 {
        Ok(response.request)
    } else {
        Err(SolverError::Rejected(response.request))
    }
}

fn poll_outcome(response: ApiResponse) -> SolverResult<Option<String>> {
    if response.status == 1 {
        return Ok(Some(response.request));
    }
    if response.request == "CAPCHA_NOT_READY" {
        return Ok(None);
    }
    Err(SolverError::Rejected(response.request))
}

#[async_trait(?Send)]
impl CaptchaSolver for HttpCaptchaSolver {
    async fn solve(&self, image: &[u8]) -> SolverResult<String> {
        let body = STANDARD.encode(image);
        let response: ApiResponse = self
            .client
            .post(&self.config.submit_url)
            .form(&[
                ("key", self.api_key.as_str()),
                ("method", "base64"),
                ("body", body.as_str()),
                ("json", "1"),
            ])
            .send()
            .await?
            .json()
            .await?;
        let id = submission_id(response)?;
        debug!(id = %id, "captcha submitted to solver");

        for attempt in 0..self.config.max_poll_attempts {
            sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
            let response: ApiResponse = self
                .client
                .get(&self.config.result_url)
                .query(&[
                    ("key", self.api_key.as_str()),
                    ("action", "get"),
                    ("id", id.as_str()),
                    ("json", "1"),
                ])
                .send()
                .await?
                .json()
                .await?;
            if let Some(code) = poll_outcome(response)? {
                return Ok(code);
            }
            trace!(attempt, "solution not ready");
        }
        Err(SolverError::PollExhausted(self.config.max_poll_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(raw: &str) -> ApiResponse {
        serde_json::from_str(raw).expect("valid payload")
    }

    #[test]
    fn accepted_submission_yields_task_id() {
        let id = submission_id(response(r#"{"status":1,"request":"7890"}"#)).unwrap();
        assert_eq!(id, "7890");
    }

    #[test]
    fn rejected_submission_surfaces_reason() {
        let err = submission_id(response(r#"{"status":0,"request":"ERROR_ZERO_BALANCE"}"#))
            .unwrap_err();
        assert!(matches!(err, SolverError::Rejected(reason) if reason == "ERROR_ZERO_BALANCE"));
    }

    #[test]
    fn pending_poll_is_not_an_error() {
        let outcome = poll_outcome(response(r#"{"status":0,"request":"CAPCHA_NOT_READY"}"#));
        assert!(matches!(outcome, Ok(None)));
    }

    #[test]
    fn ready_poll_yields_solution() {
        let outcome = poll_outcome(response(r#"{"status":1,"request":"xk4f9"}"#)).unwrap();
        assert_eq!(outcome.as_deref(), Some("xk4f9"));
    }

    #[test]
    fn failed_poll_surfaces_reason() {
        let err = poll_outcome(response(r#"{"status":0,"request":"ERROR_CAPTCHA_UNSOLVABLE"}"#))
            .unwrap_err();
        assert!(matches!(err, SolverError::Rejected(_)));
    }
}

// Remote responder endpoint.
//
// One logical operation: submit an alert, get success or an error back.
// There is no retry here; failures are reported to the caller.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::model::Alert;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("responder unreachable: {0}")]
    Transport(String),
    #[error("responder rejected alert with status {status}")]
    Rejected { status: u16 },
    #[error("could not encode alert: {0}")]
    Encode(String),
}

#[async_trait]
pub trait Responder: Send + Sync {
    async fn submit(&self, alert: &Alert) -> Result<(), DispatchError>;
}

/// Posts alerts as JSON to `<base_url>/alert`.
pub struct HttpResponder {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpResponder {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| DispatchError::Transport(err.to_string()))?;
        Ok(Self {
            endpoint: format!("{}/alert", trim_trailing_slash(base_url.into())),
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn trim_trailing_slash(mut base: String) -> String {
    while base.ends_with('/') {
        base.pop();
    }
    base
}

#[async_trait]
impl Responder for HttpResponder {
    async fn submit(&self, alert: &Alert) -> Result<(), DispatchError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(alert)
            .send()
            .await
            .map_err(|err| {
                if err.is_builder() {
                    DispatchError::Encode(err.to_string())
                } else {
                    DispatchError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
            });
        }

        log::debug!("Responder accepted alert {} ({})", alert.id, status);
        Ok(())
    }
}

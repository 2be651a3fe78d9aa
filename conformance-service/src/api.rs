// Remote platform API
// API-key authentication and execution status requests. There is no
// push channel; the poller drives this interface on a fixed cadence.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::error::{ServiceError, ServiceResult};

/// Environment variables holding the platform login.
pub const USER_VAR: &str = "CONFRUN_USER";
pub const PASS_VAR: &str = "CONFRUN_PASS";

/// Login used for both the API and the web frontend.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    /// Read the login from the environment. Missing variables are an
    /// authentication error before any network traffic happens.
    pub fn from_env() -> ServiceResult<Self> {
        let email = std::env::var(USER_VAR).map_err(|_| {
            ServiceError::Auth(format!("set the environment variable '{}'", USER_VAR))
        })?;
        let password = std::env::var(PASS_VAR).map_err(|_| {
            ServiceError::Auth(format!("set the environment variable '{}'", PASS_VAR))
        })?;
        Ok(Self { email, password })
    }
}

/// Test counters as reported by the platform. The remote API omits
/// zero-valued counters, so everything except the total defaults.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    #[serde(rename = "numberOfTests")]
    pub total: u32,
    #[serde(rename = "numberOfTestPasses", default)]
    pub passes: u32,
    #[serde(rename = "numberOfTestPassesWarn", default)]
    pub warns: u32,
    #[serde(rename = "numberOfTestFailures", default)]
    pub fails: u32,
}

/// One status response for an execution. A payload without `status`
/// does not deserialize and is treated as a transport failure by the
/// caller.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusReport {
    pub status: String,
    #[serde(default)]
    pub duration: String,
    #[serde(rename = "statusCounts", default)]
    pub counts: Option<StatusCounts>,
}

/// The status side of the remote platform, behind a trait so the
/// poller can be exercised against scripted responses.
#[async_trait]
pub trait StatusApi {
    /// Fetch the current status of one execution.
    async fn execution_status(&self, execution_id: &str) -> ServiceResult<StatusReport>;
}

/// reqwest-backed implementation with a lazily created API key that is
/// shared for the process lifetime.
#[derive(Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    api_key: OnceCell<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            credentials,
            api_key: OnceCell::new(),
        }
    }

    /// The API key for this session, starting a new API session on
    /// first use. Authentication failure is fatal for the run.
    pub async fn api_key(&self) -> ServiceResult<&str> {
        let key = self
            .api_key
            .get_or_try_init(|| self.authenticate())
            .await?;
        Ok(key.as_str())
    }

    async fn authenticate(&self) -> ServiceResult<String> {
        let body = serde_json::json!({
            "email": self.credentials.email,
            "password": self.credentials.password,
        });
        let response = self
            .http
            .post(format!("{}/api/authenticate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|err| ServiceError::Auth(err.to_string()))?;

        if response.status() != StatusCode::CREATED {
            return Err(ServiceError::Auth(format!(
                "unexpected HTTP status {}",
                response.status()
            )));
        }
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ServiceError::Auth(err.to_string()))?;
        payload
            .get("API-Key")
            .and_then(|key| key.as_str())
            .map(|key| key.to_string())
            .ok_or_else(|| ServiceError::Auth("response carries no API-Key".to_string()))
    }
}

#[async_trait]
impl StatusApi for ApiClient {
    async fn execution_status(&self, execution_id: &str) -> ServiceResult<StatusReport> {
        let api_key = self.api_key().await?.to_string();
        let response = self
            .http
            .get(format!(
                "{}/api/testExecution/{}",
                self.base_url, execution_id
            ))
            .header("API-Key", api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| ServiceError::PollTransport(err.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(ServiceError::PollTransport(format!(
                "unexpected HTTP status {}",
                response.status()
            )));
        }
        response
            .json::<StatusReport>()
            .await
            .map_err(|err| ServiceError::PollTransport(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_counters_default_to_zero() {
        let report: StatusReport = serde_json::from_str(
            r#"{"status": "Running", "duration": "00:12", "statusCounts": {"numberOfTests": 10, "numberOfTestPasses": 3}}"#,
        )
        .unwrap();
        let counts = report.counts.unwrap();
        assert_eq!(counts.total, 10);
        assert_eq!(counts.passes, 3);
        assert_eq!(counts.warns, 0);
        assert_eq!(counts.fails, 0);
    }

    #[test]
    fn missing_status_is_malformed() {
        let result: Result<StatusReport, _> =
            serde_json::from_str(r#"{"duration": "00:12"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn missing_counts_block_is_tolerated() {
        let report: StatusReport =
            serde_json::from_str(r#"{"status": "Running"}"#).unwrap();
        assert!(report.counts.is_none());
        assert_eq!(report.duration, "");
    }
}

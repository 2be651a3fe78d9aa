// Web frontend session
// Thin wrapper around the platform's HTML forms: login, execution
// setup and launch, logout. No state machine lives here; the session
// is a single shared handle and the orchestrator never submits two
// forms concurrently.

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::api::Credentials;
use crate::error::{ServiceError, ServiceResult};
use crate::targets::ExecutionTarget;

/// Starts executions on behalf of the orchestrator. The production
/// implementation talks to the web frontend; tests substitute a fake.
#[async_trait]
pub trait SuiteLauncher {
    /// Set up and launch one target, returning the platform-assigned
    /// execution identifier.
    async fn launch(&self, target: &ExecutionTarget) -> ServiceResult<String>;
}

/// Cookie-backed browser session against the web frontend.
#[derive(Debug, Clone)]
pub struct FrontendSession {
    http: reqwest::Client,
    base_url: String,
    /// Parent group path prefix under which all suites live.
    group_prefix: String,
    credentials: Credentials,
}

impl FrontendSession {
    pub fn new(
        base_url: impl Into<String>,
        group_prefix: impl Into<String>,
        credentials: Credentials,
    ) -> ServiceResult<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|err| ServiceError::Http(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            group_prefix: group_prefix.into(),
            credentials,
        })
    }

    /// Login to the website. The session cookie lives in the client.
    pub async fn login(&self) -> ServiceResult<()> {
        let form = [
            ("emailOrLoginID", self.credentials.email.as_str()),
            ("password", self.credentials.password.as_str()),
        ];
        let response = self
            .http
            .post(format!("{}/login", self.base_url))
            .form(&form)
            .send()
            .await
            .map_err(|err| ServiceError::Auth(err.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|err| ServiceError::Auth(err.to_string()))?;
        if !body.contains("Sign Out") {
            return Err(ServiceError::Auth(
                "couldn't login into the web frontend".to_string(),
            ));
        }
        Ok(())
    }

    /// End the web session. Best effort: a failed logout only leaves a
    /// stale session behind on the platform.
    pub async fn logout(&self) {
        let _ = self
            .http
            .get(format!("{}/logout", self.base_url))
            .send()
            .await;
    }

    fn launch_error(&self, target: &ExecutionTarget, reason: impl Into<String>) -> ServiceError {
        ServiceError::Launch {
            path: target.rel_path.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SuiteLauncher for FrontendSession {
    async fn launch(&self, target: &ExecutionTarget) -> ServiceResult<String> {
        // Navigate to the suite and select its test scripts. Load
        // scripts are only included for the load-resources folder
        // itself.
        let response = self
            .http
            .get(format!(
                "{}/testdefinitions?selectedTestGrp={}/{}&activeOnly=true&contentEntry=TEST_SCRIPTS&ps=200",
                self.base_url, self.group_prefix, target.rel_path
            ))
            .send()
            .await
            .map_err(|err| self.launch_error(target, err.to_string()))?;
        if response.status() != StatusCode::OK {
            return Err(self.launch_error(
                target,
                format!("suite selection returned {}", response.status()),
            ));
        }

        let mut form: Vec<(String, String)> = vec![
            ("allSelected".to_string(), "true".to_string()),
            (
                "includeLoadScripts".to_string(),
                target.is_loadscript_folder.to_string(),
            ),
        ];
        for (i, origin) in target.origins.iter().enumerate() {
            form.push((format!("mainorigin{}TsSelect", i + 1), origin.clone()));
        }
        for (i, destination) in target.destinations.iter().enumerate() {
            form.push((format!("maindest{}TsSelect", i + 1), destination.clone()));
        }
        for (name, value) in &target.params {
            form.push((
                format!("variableSetups.variableSetupMap[{}]", name),
                value.trim().to_string(),
            ));
        }
        // The backend expects the field normally added by clicking the
        // execute button.
        form.push(("execute".to_string(), String::new()));

        let response = self
            .http
            .post(format!("{}/testsetup", self.base_url))
            .form(&form)
            .send()
            .await
            .map_err(|err| self.launch_error(target, err.to_string()))?;
        if response.status() != StatusCode::OK {
            return Err(self.launch_error(
                target,
                format!("execution setup returned {}", response.status()),
            ));
        }

        // A successful submission redirects to the execution page; the
        // identifier is the `exec` query parameter of the final URL.
        response
            .url()
            .query_pairs()
            .find(|(key, _)| key == "exec")
            .map(|(_, value)| value.to_string())
            .ok_or_else(|| self.launch_error(target, "no execution id in response URL"))
    }
}

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{info, warn};
use vice_api::error::{Error, Result};

/// The capability set a lifecycle owner needs for reporting: terminal
/// failure, terminal success, and (repeatable) running updates. Modeled as a
/// trait so tests can substitute a recording double.
#[async_trait]
pub trait AnalysisStatusPublisher {
    /// Sends a failure update. Should be sent once per analysis.
    async fn fail(&self, job_id: &str, message: &str) -> Result<()>;

    /// Sends a success update. Should be sent once per analysis.
    async fn success(&self, job_id: &str, message: &str) -> Result<()>;

    /// Sends a running update. May be sent many times, preferably with
    /// distinct messages.
    async fn running(&self, job_id: &str, message: &str) -> Result<()>;
}

#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Running,
    Succeeded,
    Failed,
}

/// The document POSTed to `<status_url>/<job_id>/status`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AnalysisStatus {
    pub hostname: String,
    pub state: JobState,
    pub message: String,
}

/// Publishes updates to the job-status-listener service. Performs exactly
/// one attempt per call; retries are the caller's concern.
#[derive(Clone)]
pub struct JobStatusPublisher {
    client: Client,
    status_url: Url,
    hostname: String,
}

impl JobStatusPublisher {
    pub fn new(client: Client, status_url: Url, hostname: String) -> Self {
        Self {
            client,
            status_url,
            hostname,
        }
    }

    async fn post_status(&self, job_id: &str, message: &str, state: JobState) -> Result<()> {
        let status = AnalysisStatus {
            hostname: self.hostname.clone(),
            state,
            message: message.to_string(),
        };

        let mut url = self.status_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([job_id, "status"]);
        }

        let response = self
            .client
            .post(url.clone())
            .json(&status)
            .send()
            .await
            .map_err(|error| Error::Upstream(error.into()))?;

        let code = response.status().as_u16();
        if !(200..400).contains(&code) {
            return Err(Error::Upstream(anyhow!(
                "status listener returned {code} after posting {state} for job {job_id} to {url}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AnalysisStatusPublisher for JobStatusPublisher {
    async fn fail(&self, job_id: &str, message: &str) -> Result<()> {
        warn!("sending failure status update for external-id {job_id}");
        self.post_status(job_id, message, JobState::Failed).await
    }

    async fn success(&self, job_id: &str, message: &str) -> Result<()> {
        info!("sending success status update for external-id {job_id}");
        self.post_status(job_id, message, JobState::Succeeded).await
    }

    async fn running(&self, job_id: &str, message: &str) -> Result<()> {
        info!("sending running status update for external-id {job_id}");
        self.post_status(job_id, message, JobState::Running).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_document_shape() {
        let status = AnalysisStatus {
            hostname: "exposer-0".into(),
            state: JobState::Running,
            message: "pod is ready".into(),
        };

        let value = ::serde_json::to_value(&status).unwrap();
        assert_eq!(
            value,
            ::serde_json::json!({
                "Hostname": "exposer-0",
                "State": "Running",
                "Message": "pod is ready",
            })
        );
    }

    #[test]
    fn job_states_render_as_wire_names() {
        assert_eq!(JobState::Running.to_string(), "Running");
        assert_eq!(JobState::Succeeded.to_string(), "Succeeded");
        assert_eq!(JobState::Failed.to_string(), "Failed");
    }
}

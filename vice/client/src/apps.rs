use anyhow::anyhow;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use vice_api::error::{Error, Result};

/// Client for the Apps service: user identity, login IPs, the external-id
/// to analysis-id mapping, and subscription job limits.
#[derive(Clone)]
pub struct AppsClient {
    client: Client,
    host: Url,
}

#[derive(Debug, Deserialize)]
struct UserIdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UserIpResponse {
    ip: String,
}

#[derive(Debug, Deserialize)]
struct AnalysisIdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobLimitResponse {
    concurrent_jobs: i64,
}

impl AppsClient {
    pub fn new(client: Client, host: Url) -> Self {
        Self { client, host }
    }

    /// Resolves a fully-qualified username to its opaque user id.
    pub async fn get_user_id(&self, username: &str) -> Result<String> {
        let response: UserIdResponse = self
            .get(
                &["users", username, "id"],
                Some(format!("user {username}")),
            )
            .await?;
        Ok(response.id)
    }

    /// The IP address the user last logged in from.
    pub async fn get_user_ip(&self, user_id: &str) -> Result<String> {
        let response: UserIpResponse = self.get(&["users", user_id, "ip"], None).await?;
        Ok(response.ip)
    }

    /// Maps an invocation id onto the analysis id the Permissions service
    /// keys decisions by.
    pub async fn get_analysis_id_by_external_id(&self, external_id: &str) -> Result<String> {
        let response: AnalysisIdResponse = self
            .get(
                &["admin", "analyses", "by-external-id", external_id],
                Some(format!("analysis for external id {external_id}")),
            )
            .await?;
        Ok(response.id)
    }

    /// The user's concurrent-analysis cap, or `None` when no subscription
    /// row exists and the configured default applies.
    pub async fn get_concurrent_job_limit(&self, user_id: &str) -> Result<Option<i64>> {
        match self
            .get::<JobLimitResponse>(&["users", user_id, "concurrent-job-limit"], None)
            .await
        {
            Ok(response) => Ok(Some(response.concurrent_jobs)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn get<Res>(&self, path: &[&str], missing: Option<String>) -> Result<Res>
    where
        Res: for<'de> Deserialize<'de>,
    {
        let url = self.get_url(path);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|error| Error::Upstream(error.into()))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                Err(Error::NotFound(missing.unwrap_or_else(|| url.to_string())))
            }
            status if status.is_success() => response
                .json()
                .await
                .map_err(|error| Error::Upstream(error.into())),
            status => Err(Error::Upstream(anyhow!(
                "apps service returned {status} for {url}"
            ))),
        }
    }

    fn get_url(&self, path: &[&str]) -> Url {
        let mut url = self.host.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(path);
        }
        url
    }
}

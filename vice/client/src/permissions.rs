use anyhow::anyhow;
use reqwest::{Client, Url};
use serde::Deserialize;
use vice_api::error::{Error, Result};

/// Client for the Permissions service. One call answers the only question
/// this controller asks: may `user` see `analysis`?
#[derive(Clone)]
pub struct PermissionsClient {
    client: Client,
    host: Url,
}

#[derive(Debug, Deserialize)]
struct PermissionListing {
    #[serde(default)]
    permissions: Vec<Permission>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Permission {
    #[allow(dead_code)]
    permission_level: String,
}

impl PermissionsClient {
    pub fn new(client: Client, host: Url) -> Self {
        Self { client, host }
    }

    pub async fn is_allowed(&self, user: &str, analysis_id: &str) -> Result<bool> {
        let mut url = self.host.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["permissions", "subjects", "user", user, "analysis", analysis_id]);
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|error| Error::Upstream(error.into()))?;

        if !response.status().is_success() {
            return Err(Error::Upstream(anyhow!(
                "permissions service returned {} for {url}",
                response.status()
            )));
        }

        let listing: PermissionListing = response
            .json()
            .await
            .map_err(|error| Error::Upstream(error.into()))?;
        Ok(!listing.permissions.is_empty())
    }
}

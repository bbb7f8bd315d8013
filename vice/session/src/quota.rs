use std::collections::BTreeMap;

use kube::Client;
use tracing::debug;
use vice_api::{
    config::Config,
    error::{Error, Result},
    labels::LABEL_USER_ID,
};
use vice_client::AppsClient;

use crate::inspect;

/// Admission gate for new launches: the user's subscription cap against
/// their currently-deployed analyses. Advisory only — the count and the
/// create are not one transaction, and a racing launch may land one over
/// the limit.
pub async fn check_concurrent_limit(
    kube: &Client,
    config: &Config,
    apps: &AppsClient,
    user_id: &str,
) -> Result<()> {
    let max = apps
        .get_concurrent_job_limit(user_id)
        .await?
        .unwrap_or(config.default_concurrent_limit);

    let filter = BTreeMap::from([(LABEL_USER_ID.to_string(), user_id.to_string())]);
    let current = inspect::deployment_list(kube, &config.namespace, &filter, &[])
        .await?
        .len();

    debug!("user {user_id} runs {current} of {max} allowed analyses");
    if (current as i64) >= max {
        return Err(Error::QuotaExceeded { current, max });
    }
    Ok(())
}

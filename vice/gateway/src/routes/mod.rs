pub mod admin;
pub mod labels;
pub mod lifecycle;
pub mod listing;

use std::collections::BTreeMap;

use actix_web::HttpResponse;
use serde_json::json;
use vice_api::{
    config::Config,
    error::{Error, Result},
    labels::{fix_username, LABEL_USER_ID},
};
use vice_client::{AppsClient, PermissionsClient};
use vice_session::inspect::{self, DeploymentInfo};

/// The outbound clients every permission-gated route needs.
pub struct Clients {
    pub apps: AppsClient,
    pub permissions: PermissionsClient,
}

/// Maps the structural error kinds onto HTTP status codes.
pub fn error_response(error: &Error) -> HttpResponse {
    let body = json!({ "message": error.to_string() });
    match error {
        Error::InvalidInput(_) | Error::InputPathCollision { .. } => {
            HttpResponse::BadRequest().json(body)
        }
        Error::QuotaExceeded { .. } | Error::NameCollision { .. } => {
            HttpResponse::Conflict().json(body)
        }
        Error::NotFound(_) => HttpResponse::NotFound().json(body),
        Error::Forbidden { .. } => HttpResponse::Forbidden().json(body),
        Error::Upstream(_) => HttpResponse::BadGateway().json(body),
        Error::Internal(_) => HttpResponse::InternalServerError().json(body),
    }
}

/// Converts a query string into a label filter with the caller resolved:
/// the `user` parameter is stripped, suffixed, looked up through Apps, and
/// re-injected as `user-id`. Returns the original user for the permission
/// check. Unknown users surface as `NotFound`.
pub async fn resolve_user_filter(
    apps: &AppsClient,
    config: &Config,
    query: &str,
) -> Result<(String, BTreeMap<String, String>)> {
    let mut filter = inspect::filter_map(query);
    let user = filter
        .remove("user")
        .ok_or_else(|| Error::InvalidInput("user query parameter must be set".into()))?;

    // usernames don't survive the labelling process unscathed, so listings
    // key on the user id instead
    let fixed_user = fix_username(&user, &config.user_suffix);
    let user_id = apps.get_user_id(&fixed_user).await?;
    filter.insert(LABEL_USER_ID.into(), user_id);

    Ok((user, filter))
}

/// The permission gate: an empty listing has no subject to authorize, a
/// non-empty one is keyed by the first matched deployment's analysis.
pub async fn assert_allowed(
    clients: &Clients,
    user: &str,
    deployments: &[DeploymentInfo],
) -> Result<()> {
    let Some(deployment) = deployments.first() else {
        return Ok(());
    };

    let analysis_id = clients
        .apps
        .get_analysis_id_by_external_id(&deployment.meta.external_id)
        .await?;

    if clients.permissions.is_allowed(user, &analysis_id).await? {
        Ok(())
    } else {
        Err(Error::Forbidden {
            user: user.to_string(),
            analysis_id,
        })
    }
}

use std::{collections::BTreeMap, fmt::Debug};

use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, Service},
    networking::v1::Ingress,
};
use kube::{
    api::{ListParams, Patch, PatchParams},
    core::NamespaceResourceScope,
    Api, Client, ResourceExt,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};
use vice_api::{
    config::Config,
    error::{Error, Result},
    labels::{LABEL_ANALYSIS_ID, LABEL_EXTERNAL_ID, LABEL_LOGIN_IP, LABEL_SUBDOMAIN, LABEL_USER_ID},
    name,
};
use vice_client::AppsClient;

use crate::inspect;

/// Derives `subdomain` when both of its inputs are already labelled.
/// Objects missing the base labels are left alone (and logged); the launch
/// path owns those.
pub fn populate_subdomain(labels: &mut BTreeMap<String, String>) {
    if labels.contains_key(LABEL_SUBDOMAIN) {
        return;
    }

    match (labels.get(LABEL_EXTERNAL_ID), labels.get(LABEL_USER_ID)) {
        (Some(external_id), Some(user_id)) => {
            let subdomain = name::ingress_name(user_id, external_id);
            labels.insert(LABEL_SUBDOMAIN.into(), subdomain);
        }
        _ => warn!("cannot derive a subdomain without external-id and user-id labels"),
    }
}

/// Resolves `login-ip` through the Apps service. A lookup failure is the
/// caller's to aggregate.
pub async fn populate_login_ip(
    apps: &AppsClient,
    labels: &mut BTreeMap<String, String>,
) -> Result<()> {
    if labels.contains_key(LABEL_LOGIN_IP) {
        return Ok(());
    }

    if let Some(user_id) = labels.get(LABEL_USER_ID) {
        let ip = apps.get_user_ip(user_id).await?;
        labels.insert(LABEL_LOGIN_IP.into(), ip);
    }
    Ok(())
}

/// Resolves `analysis-id` through the Apps service. Resolution failures are
/// best-effort: the label stays unset for a later sweep and the object's
/// update still goes ahead.
pub async fn populate_analysis_id(
    apps: &AppsClient,
    labels: &mut BTreeMap<String, String>,
) -> Result<()> {
    if labels.contains_key(LABEL_ANALYSIS_ID) {
        return Ok(());
    }

    let external_id = labels
        .get(LABEL_EXTERNAL_ID)
        .ok_or_else(|| Error::Internal(::anyhow::anyhow!("missing external-id key")))?;

    match apps.get_analysis_id_by_external_id(external_id).await {
        Ok(analysis_id) => {
            labels.insert(LABEL_ANALYSIS_ID.into(), analysis_id);
        }
        Err(error) => {
            debug!("no analysis id for external id {external_id}: {error}");
        }
    }
    Ok(())
}

async fn relabel<K>(kube: &Client, namespace: &str, apps: &AppsClient) -> Vec<Error>
where
    K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug,
{
    let api = Api::<K>::namespaced(kube.clone(), namespace);
    let params = ListParams::default().labels(&inspect::list_selector(&BTreeMap::new(), &[]));

    let list = match api.list(&params).await {
        Ok(list) => list,
        Err(error) => return vec![error.into()],
    };

    let mut errors = Vec::new();
    for object in list.items {
        let name = object.name_any();
        let mut labels = object.labels().clone();
        let before = labels.clone();

        populate_subdomain(&mut labels);
        if let Err(error) = populate_login_ip(apps, &mut labels).await {
            errors.push(error);
        }
        if let Err(error) = populate_analysis_id(apps, &mut labels).await {
            errors.push(error);
        }

        // a complete label set patches nothing, so re-running the sweep is
        // a no-op
        if labels == before {
            continue;
        }

        let patch = json!({ "metadata": { "labels": labels } });
        if let Err(error) = api
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            errors.push(error.into());
        }
    }
    errors
}

/// One sweep over every interactive object, backfilling the derived labels.
/// Per-object failures are collected so a single bad object never aborts
/// the rest; label writes are merges, safe alongside a concurrent launch.
pub async fn apply_async_labels(kube: &Client, config: &Config, apps: &AppsClient) -> Vec<Error> {
    let mut errors = Vec::new();
    errors.extend(relabel::<Deployment>(kube, &config.namespace, apps).await);
    errors.extend(relabel::<ConfigMap>(kube, &config.namespace, apps).await);
    errors.extend(relabel::<Service>(kube, &config.namespace, apps).await);
    errors.extend(relabel::<Ingress>(kube, &config.namespace, apps).await);
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdomain_fills_from_base_labels() {
        let mut labels = BTreeMap::from([
            (LABEL_EXTERNAL_ID.to_string(), "abc123".to_string()),
            (LABEL_USER_ID.to_string(), "u-1".to_string()),
        ]);

        populate_subdomain(&mut labels);
        assert_eq!(
            labels.get(LABEL_SUBDOMAIN),
            Some(&name::ingress_name("u-1", "abc123"))
        );
    }

    #[test]
    fn subdomain_left_unset_without_base_labels() {
        let mut labels = BTreeMap::from([(LABEL_EXTERNAL_ID.to_string(), "abc123".to_string())]);
        populate_subdomain(&mut labels);
        assert!(!labels.contains_key(LABEL_SUBDOMAIN));
    }

    #[test]
    fn subdomain_population_is_idempotent() {
        let mut labels = BTreeMap::from([
            (LABEL_EXTERNAL_ID.to_string(), "abc123".to_string()),
            (LABEL_USER_ID.to_string(), "u-1".to_string()),
        ]);

        populate_subdomain(&mut labels);
        let first = labels.clone();
        populate_subdomain(&mut labels);
        assert_eq!(labels, first);
    }

    #[test]
    fn existing_subdomain_is_never_rewritten() {
        let mut labels = BTreeMap::from([
            (LABEL_EXTERNAL_ID.to_string(), "abc123".to_string()),
            (LABEL_USER_ID.to_string(), "u-1".to_string()),
            (LABEL_SUBDOMAIN.to_string(), "a0000000".to_string()),
        ]);

        populate_subdomain(&mut labels);
        assert_eq!(labels.get(LABEL_SUBDOMAIN).unwrap(), "a0000000");
    }
}

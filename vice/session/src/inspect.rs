use std::collections::BTreeMap;

use futures::try_join;
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, ContainerStatus, Pod, Service},
    networking::v1::Ingress,
};
use kube::{api::ListParams, core::ObjectMeta, Api, Client};
use serde::{Deserialize, Serialize};
use vice_api::{
    config::Config,
    consts,
    error::{Error, Result},
    labels::{APP_TYPE_INTERACTIVE, LABEL_APP_TYPE},
};

/// Builds the one label selector every listing uses: the interactive
/// app-type is always required and cannot be filtered away, custom pairs
/// are matched by equality, and `missing` labels must be absent.
pub fn list_selector(custom: &BTreeMap<String, String>, missing: &[&str]) -> String {
    let mut parts = vec![format!("{LABEL_APP_TYPE}={APP_TYPE_INTERACTIVE}")];
    for (key, value) in custom {
        if key != LABEL_APP_TYPE {
            parts.push(format!("{key}={value}"));
        }
    }
    for label in missing {
        parts.push(format!("!{label}"));
    }
    parts.join(",")
}

/// Converts a raw query string into a label filter. Only the first value
/// per key counts.
pub fn filter_map(query: &str) -> BTreeMap<String, String> {
    let mut filter = BTreeMap::new();
    for (key, value) in ::url::form_urlencoded::parse(query.as_bytes()) {
        filter
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    filter
}

macro_rules! list_fn {
    ($name:ident, $kind:ty) => {
        pub async fn $name(
            kube: &Client,
            namespace: &str,
            custom: &BTreeMap<String, String>,
            missing: &[&str],
        ) -> Result<Vec<$kind>> {
            let api = Api::<$kind>::namespaced(kube.clone(), namespace);
            let params = ListParams::default().labels(&list_selector(custom, missing));
            Ok(api.list(&params).await.map_err(Error::from)?.items)
        }
    };
}

list_fn!(deployment_list, Deployment);
list_fn!(pod_list, Pod);
list_fn!(config_map_list, ConfigMap);
list_fn!(service_list, Service);
list_fn!(ingress_list, Ingress);

/// Label-derived metadata shared by every projected resource kind.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaInfo {
    pub name: String,
    pub namespace: String,
    pub analysis_name: String,
    pub app_name: String,
    #[serde(rename = "appID")]
    pub app_id: String,
    #[serde(rename = "externalID")]
    pub external_id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    pub username: String,
    pub creation_timestamp: String,
}

fn meta_info(meta: &ObjectMeta) -> MetaInfo {
    let label = |key: &str| -> String {
        meta.labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .cloned()
            .unwrap_or_default()
    };

    MetaInfo {
        name: meta.name.clone().unwrap_or_default(),
        namespace: meta.namespace.clone().unwrap_or_default(),
        analysis_name: label("analysis-name"),
        app_name: label("app-name"),
        app_id: label("app-id"),
        external_id: label("external-id"),
        user_id: label("user-id"),
        username: label("username"),
        creation_timestamp: meta
            .creation_timestamp
            .as_ref()
            .map(|time| time.0.to_rfc3339())
            .unwrap_or_default(),
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeploymentInfo {
    #[serde(flatten)]
    pub meta: MetaInfo,
    pub image: String,
    pub command: Vec<String>,
    pub port: i32,
    pub user: i64,
    pub group: i64,
}

pub fn deployment_info(deployment: &Deployment) -> DeploymentInfo {
    let mut info = DeploymentInfo {
        meta: meta_info(&deployment.metadata),
        image: String::new(),
        command: Vec::new(),
        port: 0,
        user: 0,
        group: 0,
    };

    let containers = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .map(|spec| spec.containers.as_slice())
        .unwrap_or_default();

    for container in containers {
        if container.name == consts::ANALYSIS_CONTAINER_NAME {
            info.image = container.image.clone().unwrap_or_default();
            info.command = container.command.clone().unwrap_or_default();
            info.port = container
                .ports
                .as_ref()
                .and_then(|ports| ports.first())
                .map(|port| port.container_port)
                .unwrap_or_default();
            if let Some(security) = &container.security_context {
                info.user = security.run_as_user.unwrap_or_default();
                info.group = security.run_as_group.unwrap_or_default();
            }
        }
    }
    info
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodInfo {
    #[serde(flatten)]
    pub meta: MetaInfo,
    pub phase: String,
    pub message: String,
    pub reason: String,
    pub container_statuses: Vec<ContainerStatus>,
    pub init_container_statuses: Vec<ContainerStatus>,
}

pub fn pod_info(pod: &Pod) -> PodInfo {
    let status = pod.status.clone().unwrap_or_default();
    PodInfo {
        meta: meta_info(&pod.metadata),
        phase: status.phase.unwrap_or_default(),
        message: status.message.unwrap_or_default(),
        reason: status.reason.unwrap_or_default(),
        container_statuses: status.container_statuses.unwrap_or_default(),
        init_container_statuses: status.init_container_statuses.unwrap_or_default(),
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigMapInfo {
    #[serde(flatten)]
    pub meta: MetaInfo,
    pub data: BTreeMap<String, String>,
}

pub fn config_map_info(config_map: &ConfigMap) -> ConfigMapInfo {
    ConfigMapInfo {
        meta: meta_info(&config_map.metadata),
        data: config_map.data.clone().unwrap_or_default(),
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfoPort {
    pub name: String,
    pub node_port: i32,
    pub target_port: i32,
    pub target_port_name: String,
    pub port: i32,
    pub protocol: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(flatten)]
    pub meta: MetaInfo,
    pub ports: Vec<ServiceInfoPort>,
}

pub fn service_info(service: &Service) -> ServiceInfo {
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    let ports = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .map(|ports| ports.as_slice())
        .unwrap_or_default();

    ServiceInfo {
        meta: meta_info(&service.metadata),
        ports: ports
            .iter()
            .map(|port| {
                let (target_port, target_port_name) = match &port.target_port {
                    Some(IntOrString::Int(number)) => (*number, number.to_string()),
                    Some(IntOrString::String(name)) => (0, name.clone()),
                    None => (0, String::new()),
                };
                ServiceInfoPort {
                    name: port.name.clone().unwrap_or_default(),
                    node_port: port.node_port.unwrap_or_default(),
                    target_port,
                    target_port_name,
                    port: port.port,
                    protocol: port.protocol.clone().unwrap_or_default(),
                }
            })
            .collect(),
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressInfo {
    #[serde(flatten)]
    pub meta: MetaInfo,
    pub default_backend: String,
    pub rules: Vec<k8s_openapi::api::networking::v1::IngressRule>,
}

pub fn ingress_info(ingress: &Ingress) -> IngressInfo {
    let default_backend = ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.default_backend.as_ref())
        .and_then(|backend| backend.service.as_ref())
        .map(|service| {
            format!(
                "{}:{}",
                service.name,
                service
                    .port
                    .as_ref()
                    .and_then(|port| port.number)
                    .unwrap_or_default()
            )
        })
        .unwrap_or_default();

    IngressInfo {
        meta: meta_info(&ingress.metadata),
        default_backend,
        rules: ingress
            .spec
            .as_ref()
            .and_then(|spec| spec.rules.clone())
            .unwrap_or_default(),
    }
}

/// Everything the cluster holds for a set of analyses, keyed by kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub deployments: Vec<DeploymentInfo>,
    pub pods: Vec<PodInfo>,
    #[serde(rename = "configMaps")]
    pub config_maps: Vec<ConfigMapInfo>,
    pub services: Vec<ServiceInfo>,
    pub ingresses: Vec<IngressInfo>,
}

pub async fn filtered_deployments(
    kube: &Client,
    config: &Config,
    filter: &BTreeMap<String, String>,
) -> Result<Vec<DeploymentInfo>> {
    let items = deployment_list(kube, &config.namespace, filter, &[]).await?;
    Ok(items.iter().map(deployment_info).collect())
}

pub async fn filtered_pods(
    kube: &Client,
    config: &Config,
    filter: &BTreeMap<String, String>,
) -> Result<Vec<PodInfo>> {
    let items = pod_list(kube, &config.namespace, filter, &[]).await?;
    Ok(items.iter().map(pod_info).collect())
}

pub async fn filtered_config_maps(
    kube: &Client,
    config: &Config,
    filter: &BTreeMap<String, String>,
) -> Result<Vec<ConfigMapInfo>> {
    let items = config_map_list(kube, &config.namespace, filter, &[]).await?;
    Ok(items.iter().map(config_map_info).collect())
}

pub async fn filtered_services(
    kube: &Client,
    config: &Config,
    filter: &BTreeMap<String, String>,
) -> Result<Vec<ServiceInfo>> {
    let items = service_list(kube, &config.namespace, filter, &[]).await?;
    Ok(items.iter().map(service_info).collect())
}

pub async fn filtered_ingresses(
    kube: &Client,
    config: &Config,
    filter: &BTreeMap<String, String>,
) -> Result<Vec<IngressInfo>> {
    let items = ingress_list(kube, &config.namespace, filter, &[]).await?;
    Ok(items.iter().map(ingress_info).collect())
}

/// The composite listing backing the describe and resources endpoints.
pub async fn resource_listing(
    kube: &Client,
    config: &Config,
    filter: &BTreeMap<String, String>,
) -> Result<ResourceInfo> {
    let (deployments, pods, config_maps, services, ingresses) = try_join!(
        filtered_deployments(kube, config, filter),
        filtered_pods(kube, config, filter),
        filtered_config_maps(kube, config, filter),
        filtered_services(kube, config, filter),
        filtered_ingresses(kube, config, filter),
    )?;

    Ok(ResourceInfo {
        deployments,
        pods,
        config_maps,
        services,
        ingresses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_always_requires_interactive() {
        let filter = BTreeMap::from([
            ("user-id".to_string(), "u-1".to_string()),
            // attempts to override the app type are ignored
            (LABEL_APP_TYPE.to_string(), "batch".to_string()),
        ]);
        assert_eq!(
            list_selector(&filter, &[]),
            "app-type=interactive,user-id=u-1"
        );
    }

    #[test]
    fn selector_requires_missing_labels_to_be_absent() {
        assert_eq!(
            list_selector(&BTreeMap::new(), &["subdomain"]),
            "app-type=interactive,!subdomain"
        );
    }

    #[test]
    fn filter_map_keeps_the_first_value() {
        let filter = filter_map("external-id=a&external-id=b&user=alice");
        assert_eq!(filter.get("external-id").unwrap(), "a");
        assert_eq!(filter.get("user").unwrap(), "alice");
    }

    #[test]
    fn meta_info_projects_labels() {
        let meta = ObjectMeta {
            name: Some("vice-abc123".into()),
            namespace: Some("vice-apps".into()),
            labels: Some(BTreeMap::from([
                ("external-id".to_string(), "abc123".to_string()),
                ("user-id".to_string(), "u-1".to_string()),
                ("analysis-name".to_string(), "word-count".to_string()),
            ])),
            ..Default::default()
        };

        let info = meta_info(&meta);
        assert_eq!(info.name, "vice-abc123");
        assert_eq!(info.external_id, "abc123");
        assert_eq!(info.user_id, "u-1");
        assert_eq!(info.analysis_name, "word-count");
        assert_eq!(info.app_id, "");
    }

    #[test]
    fn meta_info_serializes_with_stable_field_names() {
        let rendered = ::serde_json::to_string(&MetaInfo::default()).unwrap();
        assert_eq!(
            rendered,
            r#"{"name":"","namespace":"","analysisName":"","appName":"","appID":"","externalID":"","userID":"","username":"","creationTimestamp":""}"#
        );
    }
}

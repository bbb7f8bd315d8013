use std::collections::BTreeMap;

use k8s_openapi::{
    api::apps::v1::{Deployment, DeploymentSpec},
    api::core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec, SecurityContext},
    apimachinery::pkg::apis::meta::v1::LabelSelector,
};
use kube::core::ObjectMeta;
use vice_api::{
    config::Config,
    consts,
    error::{Error, Result},
    job::Job,
    labels::LABEL_EXTERNAL_ID,
    name,
};

use super::volume;

/// The single-replica workload running the analysis container between its
/// two sidecars.
pub fn deployment(
    job: &Job,
    config: &Config,
    labels: &BTreeMap<String, String>,
) -> Result<Deployment> {
    let container = job
        .analysis_container()
        .ok_or_else(|| Error::InvalidInput("job has no steps".into()))?;

    let security_context = SecurityContext {
        run_as_user: Some(container.uid),
        run_as_group: Some(container.gid),
        ..Default::default()
    };

    let volume_mounts = volume::pod_volume_mount(job, config).map(|mount| vec![mount]);

    let working_dir = if container.working_directory.is_empty() {
        consts::CSI_OUTPUT_MOUNT_PATH.to_string()
    } else {
        container.working_directory.clone()
    };

    let setup = Container {
        name: consts::ANALYSIS_SETUP_CONTAINER_NAME.into(),
        image: Some(config.file_transfers_image.clone()),
        command: Some(vec!["mkdir".into(), "-p".into(), working_dir.clone()]),
        security_context: Some(security_context.clone()),
        volume_mounts: volume_mounts.clone(),
        ..Default::default()
    };

    let analysis = Container {
        name: consts::ANALYSIS_CONTAINER_NAME.into(),
        image: Some(container.image.clone()),
        command: (!container.command.is_empty()).then(|| container.command.clone()),
        working_dir: Some(working_dir),
        ports: Some(vec![ContainerPort {
            container_port: container.port,
            protocol: Some("TCP".into()),
            ..Default::default()
        }]),
        security_context: Some(security_context),
        volume_mounts: volume_mounts.clone(),
        ..Default::default()
    };

    let file_transfers = Container {
        name: consts::FILE_TRANSFERS_CONTAINER_NAME.into(),
        image: Some(config.file_transfers_image.clone()),
        ports: Some(vec![ContainerPort {
            name: Some(consts::FILE_TRANSFERS_PORT_NAME.into()),
            container_port: consts::FILE_TRANSFERS_PORT,
            protocol: Some("TCP".into()),
            ..Default::default()
        }]),
        volume_mounts,
        ..Default::default()
    };

    let vice_proxy = Container {
        name: consts::VICE_PROXY_CONTAINER_NAME.into(),
        image: Some(config.vice_proxy_image.clone()),
        args: Some(vec![
            "--backend-url".into(),
            format!("http://127.0.0.1:{}", container.port),
        ]),
        ports: Some(vec![ContainerPort {
            name: Some(consts::VICE_PROXY_PORT_NAME.into()),
            container_port: consts::VICE_PROXY_PORT,
            protocol: Some("TCP".into()),
            ..Default::default()
        }]),
        ..Default::default()
    };

    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(name::deployment_name(&job.invocation_id)),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([(
                    LABEL_EXTERNAL_ID.to_string(),
                    job.invocation_id.clone(),
                )])),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    init_containers: Some(vec![setup]),
                    containers: vec![analysis, file_transfers, vice_proxy],
                    volumes: volume::pod_volume(job, config).map(|v| vec![v]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    })
}

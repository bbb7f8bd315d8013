use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{
        CSIPersistentVolumeSource, PersistentVolume, PersistentVolumeClaim,
        PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, PersistentVolumeSpec,
        ResourceRequirements, Volume, VolumeMount,
    },
    apimachinery::pkg::api::resource::Quantity,
};
use kube::core::ObjectMeta;
use serde::{Deserialize, Serialize};
use vice_api::{
    config::Config,
    consts,
    error::{Error, Result},
    job::Job,
    labels::LABEL_VOLUME_NAME,
    name,
};

const STORAGE_CAPACITY: &str = "5Gi";
const ACCESS_MODE_RWX: &str = "ReadWriteMany";

/// A single mount point the remote-filesystem driver realizes inside the
/// analysis pod.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathMapping {
    pub irods_path: String,
    pub mapping_path: String,
    /// `file` or `dir`.
    pub resource_type: String,
    pub read_only: bool,
    pub create_dir: bool,
    pub ignore_not_exist_error: bool,
}

/// Walks every step input and derives its mount point under the input root.
/// Two inputs resolving to the same mount path are a hard error even before
/// any cluster object exists.
pub fn input_path_mappings(job: &Job) -> Result<Vec<PathMapping>> {
    let mut mappings = Vec::new();
    // key = mount path, val = remote path already occupying it
    let mut occupied: BTreeMap<String, String> = BTreeMap::new();

    for step in &job.steps {
        for input in &step.component.inputs {
            if input.path.is_empty() {
                continue;
            }

            let resource_type = match input.ty.to_lowercase().as_str() {
                "fileinput" | "multifileselector" => "file",
                "folderinput" => "dir",
                other => {
                    return Err(Error::InvalidInput(format!(
                        "unknown step input type - {other}"
                    )))
                }
            };

            let mount_path = format!("{}/{}", consts::CSI_INPUT_MOUNT_PATH, input.basename());
            if let Some(existing_path) = occupied.get(&mount_path) {
                return Err(Error::InputPathCollision {
                    mount_path,
                    existing_path: existing_path.clone(),
                    new_path: input.path.clone(),
                });
            }
            occupied.insert(mount_path.clone(), input.path.clone());

            mappings.push(PathMapping {
                irods_path: input.path.clone(),
                mapping_path: mount_path,
                resource_type: resource_type.into(),
                read_only: true,
                create_dir: false,
                ignore_not_exist_error: true,
            });
        }
    }
    Ok(mappings)
}

fn output_path_mapping(job: &Job) -> PathMapping {
    PathMapping {
        irods_path: job.output_directory.clone(),
        mapping_path: consts::CSI_OUTPUT_MOUNT_PATH.into(),
        resource_type: "dir".into(),
        read_only: false,
        create_dir: true,
        ignore_not_exist_error: true,
    }
}

fn home_path_mapping(job: &Job) -> PathMapping {
    PathMapping {
        irods_path: job.user_home.clone(),
        mapping_path: job.user_home.clone(),
        resource_type: "dir".into(),
        read_only: false,
        create_dir: false,
        ignore_not_exist_error: false,
    }
}

fn shared_path_mapping(config: &Config) -> PathMapping {
    let shared = format!("/{}/home/shared", config.irods_zone);
    PathMapping {
        irods_path: shared.clone(),
        mapping_path: shared,
        resource_type: "dir".into(),
        read_only: false,
        create_dir: false,
        ignore_not_exist_error: true,
    }
}

/// The full mapping manifest: inputs, then the writable output collection,
/// the user home when known, and the shared collection.
pub fn path_mappings(job: &Job, config: &Config) -> Result<Vec<PathMapping>> {
    let mut mappings = input_path_mappings(job)?;
    mappings.push(output_path_mapping(job));
    if !job.user_home.is_empty() {
        mappings.push(home_path_mapping(job));
    }
    mappings.push(shared_path_mapping(config));
    Ok(mappings)
}

/// The PersistentVolume carrying the encoded mapping manifest. `None` when
/// remote-filesystem mode is off.
pub fn persistent_volume(
    job: &Job,
    config: &Config,
    labels: &BTreeMap<String, String>,
) -> Result<Option<PersistentVolume>> {
    if !config.use_csi_driver {
        return Ok(None);
    }

    let container = job
        .analysis_container()
        .ok_or_else(|| Error::InvalidInput("job has no steps".into()))?;

    let mappings = path_mappings(job, config)?;
    let mappings_json =
        ::serde_json::to_string(&mappings).map_err(|error| Error::Internal(error.into()))?;

    let mut volume_labels = labels.clone();
    volume_labels.insert(
        LABEL_VOLUME_NAME.into(),
        name::volume_name(&job.invocation_id),
    );

    let attributes = BTreeMap::from([
        ("client".to_string(), "irodsfuse".to_string()),
        ("path_mapping_json".to_string(), mappings_json),
        ("no_permission_check".to_string(), "true".to_string()),
        // proxy access runs as the submitter
        ("clientUser".to_string(), job.submitter.clone()),
        ("uid".to_string(), container.uid.to_string()),
        ("gid".to_string(), container.gid.to_string()),
    ]);

    Ok(Some(PersistentVolume {
        metadata: ObjectMeta {
            name: Some(name::volume_name(&job.invocation_id)),
            labels: Some(volume_labels),
            ..Default::default()
        },
        spec: Some(PersistentVolumeSpec {
            capacity: Some(BTreeMap::from([(
                "storage".to_string(),
                Quantity(STORAGE_CAPACITY.into()),
            )])),
            volume_mode: Some("Filesystem".into()),
            access_modes: Some(vec![ACCESS_MODE_RWX.into()]),
            persistent_volume_reclaim_policy: Some("Retain".into()),
            storage_class_name: Some(consts::CSI_DRIVER_STORAGE_CLASS.into()),
            csi: Some(CSIPersistentVolumeSource {
                driver: consts::CSI_DRIVER_NAME.into(),
                volume_handle: name::volume_handle(&job.invocation_id),
                volume_attributes: Some(attributes),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    }))
}

/// The claim binding the analysis pod to the PersistentVolume by name.
pub fn persistent_volume_claim(
    job: &Job,
    config: &Config,
    labels: &BTreeMap<String, String>,
) -> Option<PersistentVolumeClaim> {
    if !config.use_csi_driver {
        return None;
    }

    Some(PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name::volume_claim_name(&job.invocation_id)),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![ACCESS_MODE_RWX.into()]),
            storage_class_name: Some(consts::CSI_DRIVER_STORAGE_CLASS.into()),
            volume_name: Some(name::volume_name(&job.invocation_id)),
            resources: Some(ResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(STORAGE_CAPACITY.into()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    })
}

/// The pod-side volume referencing the claim.
pub fn pod_volume(job: &Job, config: &Config) -> Option<Volume> {
    if !config.use_csi_driver {
        return None;
    }

    Some(Volume {
        name: name::volume_claim_name(&job.invocation_id),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: name::volume_claim_name(&job.invocation_id),
            read_only: None,
        }),
        ..Default::default()
    })
}

pub fn pod_volume_mount(job: &Job, config: &Config) -> Option<VolumeMount> {
    if !config.use_csi_driver {
        return None;
    }

    Some(VolumeMount {
        name: name::volume_claim_name(&job.invocation_id),
        mount_path: consts::CSI_LOCAL_MOUNT_PATH.into(),
        ..Default::default()
    })
}

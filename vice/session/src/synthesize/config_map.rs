use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::core::ObjectMeta;
use vice_api::{
    config::Config,
    error::{Error, Result},
    job::Job,
    name,
};

use super::volume;

/// Paths the output uploader must skip: everything staged as an input.
/// Newline-terminated, one path per line.
pub fn excludes_config_map(
    job: &Job,
    labels: &BTreeMap<String, String>,
) -> Result<ConfigMap> {
    let mut excludes = String::new();
    for mapping in volume::input_path_mappings(job)? {
        excludes.push_str(&mapping.mapping_path);
        excludes.push('\n');
    }

    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(name::excludes_config_map_name(&job.invocation_id)),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([("excludes".to_string(), excludes)])),
        ..Default::default()
    })
}

/// Per-analysis settings for the sidecars: where the inputs land and where
/// the outputs go.
pub fn input_paths_config_map(
    job: &Job,
    config: &Config,
    labels: &BTreeMap<String, String>,
) -> Result<ConfigMap> {
    let input_paths: Vec<String> = volume::input_path_mappings(job)?
        .into_iter()
        .map(|mapping| mapping.mapping_path)
        .collect();

    let document = ::serde_json::json!({
        "input_paths": input_paths,
        "output_dir": job.output_directory,
        "zone": config.irods_zone,
    });
    let document =
        ::serde_json::to_string(&document).map_err(|error| Error::Internal(error.into()))?;

    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(name::input_paths_config_map_name(&job.invocation_id)),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([("input-paths".to_string(), document)])),
        ..Default::default()
    })
}

mod config_map;
mod deployment;
mod ingress;
mod service;
pub mod volume;

use std::collections::BTreeMap;

use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, PersistentVolume, PersistentVolumeClaim, Service},
    networking::v1::Ingress,
};
use kube::core::ObjectMeta;
use vice_api::{
    config::Config,
    error::{Error, Result},
    job::Job,
    labels,
};

/// Every cluster object a single analysis owns. Creation applies this
/// leaf-first; teardown walks it in reverse.
#[derive(Clone, Debug)]
pub struct ObjectGraph {
    pub persistent_volume: Option<PersistentVolume>,
    pub persistent_volume_claim: Option<PersistentVolumeClaim>,
    pub config_maps: Vec<ConfigMap>,
    pub service: Service,
    pub deployment: Deployment,
    pub ingress: Ingress,
}

impl ObjectGraph {
    /// Merges extra labels into every object (and the pod template).
    /// Used for the lazily-resolved labels (`login-ip`, `analysis-id`) when
    /// the Apps service answered at launch time.
    pub fn merge_labels(&mut self, extra: &BTreeMap<String, String>) {
        if extra.is_empty() {
            return;
        }

        fn merge(meta: &mut ObjectMeta, extra: &BTreeMap<String, String>) {
            let labels = meta.labels.get_or_insert_with(Default::default);
            for (key, value) in extra {
                labels.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        if let Some(pv) = &mut self.persistent_volume {
            merge(&mut pv.metadata, extra);
        }
        if let Some(pvc) = &mut self.persistent_volume_claim {
            merge(&mut pvc.metadata, extra);
        }
        for config_map in &mut self.config_maps {
            merge(&mut config_map.metadata, extra);
        }
        merge(&mut self.service.metadata, extra);
        merge(&mut self.deployment.metadata, extra);
        if let Some(spec) = &mut self.deployment.spec {
            if let Some(meta) = &mut spec.template.metadata {
                merge(meta, extra);
            }
        }
        merge(&mut self.ingress.metadata, extra);
    }
}

/// Maps a Job onto its object graph. Pure; performs no cluster I/O, so a
/// retried launch synthesizes byte-identical objects.
pub fn synthesize(job: &Job, config: &Config) -> Result<ObjectGraph> {
    if job.steps.is_empty() {
        return Err(Error::InvalidInput("job has no steps".into()));
    }

    let labels = labels::labels_from_job(job);

    // validates input types and mount-path uniqueness even when the
    // remote-filesystem driver is disabled
    volume::input_path_mappings(job)?;

    Ok(ObjectGraph {
        persistent_volume: volume::persistent_volume(job, config, &labels)?,
        persistent_volume_claim: volume::persistent_volume_claim(job, config, &labels),
        config_maps: vec![
            config_map::excludes_config_map(job, &labels)?,
            config_map::input_paths_config_map(job, config, &labels)?,
        ],
        service: service::service(job, &labels),
        deployment: deployment::deployment(job, config, &labels)?,
        ingress: ingress::ingress(job, config, &labels),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    use url::Url;
    use vice_api::{
        consts,
        job::{Component, Container, Input, Step},
        labels::{LABEL_EXTERNAL_ID, LABEL_SUBDOMAIN},
        name,
    };

    fn test_config(use_csi_driver: bool) -> Config {
        Config {
            namespace: "vice-apps".into(),
            user_suffix: "@cyverse.org".into(),
            ingress_class: "nginx".into(),
            apps_url: Url::parse("http://apps").unwrap(),
            permissions_url: Url::parse("http://permissions").unwrap(),
            status_url: Url::parse("http://status").unwrap(),
            use_csi_driver,
            irods_zone: "testzone".into(),
            listen_port: 60000,
            log_level: "info".into(),
            vice_proxy_image: "discoenv/vice-proxy".into(),
            file_transfers_image: "discoenv/vice-file-transfers".into(),
            default_concurrent_limit: 2,
        }
    }

    fn test_job(inputs: Vec<Input>) -> Job {
        Job {
            invocation_id: "abc123".into(),
            name: "word count".into(),
            app_id: "app-1".into(),
            app_name: "wordcount".into(),
            submitter: "alice".into(),
            user_id: "alice-id".into(),
            user_home: "/testzone/home/alice".into(),
            output_directory: "/testzone/home/alice/out".into(),
            steps: vec![Step {
                component: Component {
                    container: Container {
                        image: "quay.io/analyses/wordcount:1".into(),
                        command: vec!["wc".into()],
                        working_directory: String::new(),
                        port: 8888,
                        uid: 1000,
                        gid: 1000,
                    },
                    inputs,
                },
            }],
        }
    }

    fn file_input(path: &str) -> Input {
        Input {
            ty: "FileInput".into(),
            path: path.into(),
        }
    }

    #[test]
    fn happy_path_produces_one_of_each() {
        let job = test_job(vec![file_input("/testzone/home/alice/in.txt")]);
        let graph = synthesize(&job, &test_config(true)).unwrap();

        assert!(graph.persistent_volume.is_some());
        assert!(graph.persistent_volume_claim.is_some());
        assert_eq!(graph.config_maps.len(), 2);
        assert_eq!(graph.service.metadata.name.as_deref(), Some("vice-abc123"));
        assert_eq!(
            graph.deployment.metadata.name.as_deref(),
            Some("vice-abc123")
        );
        assert_eq!(
            graph.deployment.spec.as_ref().unwrap().replicas,
            Some(1),
        );
    }

    #[test]
    fn service_selector_matches_template_labels() {
        let job = test_job(vec![]);
        let graph = synthesize(&job, &test_config(true)).unwrap();

        let selector = graph.service.spec.unwrap().selector.unwrap();
        assert_eq!(selector.get(LABEL_EXTERNAL_ID).unwrap(), "abc123");

        let deployment_spec = graph.deployment.spec.unwrap();
        assert_eq!(
            deployment_spec.selector.match_labels.as_ref().unwrap(),
            &selector
        );

        let template_labels = deployment_spec.template.metadata.unwrap().labels.unwrap();
        for (key, value) in &selector {
            assert_eq!(template_labels.get(key), Some(value));
        }
    }

    #[test]
    fn service_ports_target_names_not_numbers() {
        let job = test_job(vec![]);
        let graph = synthesize(&job, &test_config(true)).unwrap();

        let ports = graph.service.spec.unwrap().ports.unwrap();
        let names: Vec<_> = ports.iter().filter_map(|p| p.name.as_deref()).collect();
        assert_eq!(
            names,
            [consts::FILE_TRANSFERS_PORT_NAME, consts::VICE_PROXY_PORT_NAME]
        );

        for port in &ports {
            match port.target_port.as_ref().unwrap() {
                IntOrString::String(name) => assert_eq!(name, port.name.as_ref().unwrap()),
                IntOrString::Int(number) => panic!("numeric target port {number}"),
            }
        }
    }

    #[test]
    fn ingress_host_is_the_derived_subdomain() {
        let job = test_job(vec![]);
        let graph = synthesize(&job, &test_config(true)).unwrap();

        let subdomain = name::ingress_name("alice-id", "abc123");
        assert_eq!(graph.ingress.metadata.name.as_deref(), Some(&*subdomain));

        let rules = graph.ingress.spec.unwrap().rules.unwrap();
        assert_eq!(rules[0].host.as_deref(), Some(&*subdomain));

        let labels = graph.deployment.metadata.labels.unwrap();
        assert_eq!(labels.get(LABEL_SUBDOMAIN), Some(&subdomain));
    }

    #[test]
    fn duplicate_basenames_collide() {
        let job = test_job(vec![
            file_input("/testzone/home/alice/a/in.txt"),
            file_input("/testzone/home/alice/b/in.txt"),
        ]);

        match synthesize(&job, &test_config(true)) {
            Err(Error::InputPathCollision {
                mount_path,
                existing_path,
                new_path,
            }) => {
                assert_eq!(mount_path, "/input/in.txt");
                assert_eq!(existing_path, "/testzone/home/alice/a/in.txt");
                assert_eq!(new_path, "/testzone/home/alice/b/in.txt");
            }
            other => panic!("expected a path collision, got {other:?}"),
        }
    }

    #[test]
    fn collision_applies_without_the_csi_driver() {
        let job = test_job(vec![file_input("/a/in.txt"), file_input("/b/in.txt")]);
        assert!(matches!(
            synthesize(&job, &test_config(false)),
            Err(Error::InputPathCollision { .. })
        ));
    }

    #[test]
    fn unknown_input_type_is_invalid() {
        let job = test_job(vec![Input {
            ty: "ReferenceGenome".into(),
            path: "/testzone/home/alice/genome".into(),
        }]);
        assert!(matches!(
            synthesize(&job, &test_config(true)),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn volume_manifest_lists_inputs_output_home_and_shared() {
        let job = test_job(vec![
            file_input("/testzone/home/alice/in.txt"),
            Input {
                ty: "FolderInput".into(),
                path: "/testzone/home/alice/dataset".into(),
            },
        ]);
        let mappings = volume::path_mappings(&job, &test_config(true)).unwrap();

        let paths: Vec<_> = mappings.iter().map(|m| m.mapping_path.as_str()).collect();
        assert_eq!(
            paths,
            [
                "/input/in.txt",
                "/input/dataset",
                "/output",
                "/testzone/home/alice",
                "/testzone/home/shared",
            ]
        );

        assert_eq!(mappings[0].resource_type, "file");
        assert!(mappings[0].read_only);
        assert_eq!(mappings[1].resource_type, "dir");

        let output = &mappings[2];
        assert!(!output.read_only);
        assert!(output.create_dir);
        assert!(output.ignore_not_exist_error);

        let home = &mappings[3];
        assert!(!home.create_dir);
        assert!(!home.ignore_not_exist_error);
    }

    #[test]
    fn csi_disabled_synthesizes_no_volumes() {
        let job = test_job(vec![file_input("/testzone/home/alice/in.txt")]);
        let graph = synthesize(&job, &test_config(false)).unwrap();

        assert!(graph.persistent_volume.is_none());
        assert!(graph.persistent_volume_claim.is_none());
        assert!(graph
            .deployment
            .spec
            .unwrap()
            .template
            .spec
            .unwrap()
            .volumes
            .is_none());
    }

    #[test]
    fn volume_attributes_carry_the_mapping_manifest() {
        let job = test_job(vec![file_input("/testzone/home/alice/in.txt")]);
        let pv = synthesize(&job, &test_config(true))
            .unwrap()
            .persistent_volume
            .unwrap();

        let spec = pv.spec.unwrap();
        assert_eq!(spec.access_modes.as_deref(), Some(&["ReadWriteMany".to_string()][..]));
        assert_eq!(spec.persistent_volume_reclaim_policy.as_deref(), Some("Retain"));

        let csi = spec.csi.unwrap();
        assert_eq!(csi.driver, consts::CSI_DRIVER_NAME);
        assert_eq!(csi.volume_handle, "csi-data-volume-handle-abc123");

        let attributes = csi.volume_attributes.unwrap();
        assert_eq!(attributes.get("client").unwrap(), "irodsfuse");
        assert_eq!(attributes.get("clientUser").unwrap(), "alice");
        assert_eq!(attributes.get("uid").unwrap(), "1000");
        assert_eq!(attributes.get("gid").unwrap(), "1000");
        assert_eq!(attributes.get("no_permission_check").unwrap(), "true");

        let manifest: Vec<volume::PathMapping> =
            ::serde_json::from_str(attributes.get("path_mapping_json").unwrap()).unwrap();
        assert_eq!(manifest.len(), 4);
    }

    #[test]
    fn merge_labels_fills_without_overwriting() {
        let job = test_job(vec![]);
        let mut graph = synthesize(&job, &test_config(true)).unwrap();

        let extra = BTreeMap::from([
            ("analysis-id".to_string(), "analysis-uuid".to_string()),
            (LABEL_EXTERNAL_ID.to_string(), "spoofed".to_string()),
        ]);
        graph.merge_labels(&extra);

        let labels = graph.deployment.metadata.labels.unwrap();
        assert_eq!(labels.get("analysis-id").unwrap(), "analysis-uuid");
        // present keys win over merged ones
        assert_eq!(labels.get(LABEL_EXTERNAL_ID).unwrap(), "abc123");
    }
}

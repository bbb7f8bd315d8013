use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{Service, ServicePort, ServiceSpec},
    apimachinery::pkg::util::intstr::IntOrString,
};
use kube::core::ObjectMeta;
use vice_api::{consts, job::Job, labels::LABEL_EXTERNAL_ID, name};

/// The Service fronting both sidecars. Target ports reference the *named*
/// container ports so renumbering a container never desynchronizes the
/// service.
pub fn service(job: &Job, labels: &BTreeMap<String, String>) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name::service_name(&job.invocation_id)),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(BTreeMap::from([(
                LABEL_EXTERNAL_ID.to_string(),
                job.invocation_id.clone(),
            )])),
            ports: Some(vec![
                ServicePort {
                    name: Some(consts::FILE_TRANSFERS_PORT_NAME.into()),
                    protocol: Some("TCP".into()),
                    port: consts::FILE_TRANSFERS_PORT,
                    target_port: Some(IntOrString::String(
                        consts::FILE_TRANSFERS_PORT_NAME.into(),
                    )),
                    ..Default::default()
                },
                ServicePort {
                    name: Some(consts::VICE_PROXY_PORT_NAME.into()),
                    protocol: Some("TCP".into()),
                    port: consts::VICE_PROXY_PORT,
                    target_port: Some(IntOrString::String(consts::VICE_PROXY_PORT_NAME.into())),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        status: None,
    }
}

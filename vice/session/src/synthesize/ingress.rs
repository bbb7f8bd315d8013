use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use kube::core::ObjectMeta;
use vice_api::{config::Config, consts, job::Job, name};

/// The Ingress routing the derived subdomain to the analysis service's
/// proxy port.
pub fn ingress(job: &Job, config: &Config, labels: &BTreeMap<String, String>) -> Ingress {
    let subdomain = name::ingress_name(&job.user_id, &job.invocation_id);
    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: name::service_name(&job.invocation_id),
            port: Some(ServiceBackendPort {
                name: Some(consts::VICE_PROXY_PORT_NAME.into()),
                number: None,
            }),
        }),
        resource: None,
    };

    Ingress {
        metadata: ObjectMeta {
            name: Some(subdomain.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: Some(config.ingress_class.clone()),
            default_backend: Some(IngressBackend {
                service: Some(IngressServiceBackend {
                    name: name::service_name(&job.invocation_id),
                    port: Some(ServiceBackendPort {
                        name: None,
                        number: Some(consts::VICE_PROXY_PORT),
                    }),
                }),
                resource: None,
            }),
            rules: Some(vec![IngressRule {
                host: Some(subdomain),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".into()),
                        path_type: "Prefix".into(),
                        backend,
                    }],
                }),
            }]),
            tls: None,
        }),
        status: None,
    }
}

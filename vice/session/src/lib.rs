pub mod inspect;
pub mod quota;
pub mod reconcile;
pub mod synthesize;

use std::{collections::BTreeMap, fmt::Debug, sync::Arc, time::Duration};

use anyhow::anyhow;
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, PersistentVolume, PersistentVolumeClaim, Pod, Service},
    networking::v1::Ingress,
};
use kube::{
    api::{DeleteParams, ListParams, Patch, PatchParams, PostParams},
    Api, Client, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::{debug, error, warn};
use vice_api::{
    config::Config,
    consts,
    error::{Error, Result},
    job::Job,
    labels::{LABEL_ANALYSIS_ID, LABEL_EXTERNAL_ID, LABEL_LOGIN_IP},
    name,
};
use vice_client::{AnalysisStatusPublisher, AppsClient};

const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);
const READY_POLL_ATTEMPTS: u32 = 900;

/// Owns the lifecycle of every analysis: admission, object-graph creation,
/// scaling, and teardown. The status publisher is injected as a capability
/// so tests can substitute a recording double.
pub struct SessionManager {
    kube: Client,
    config: Config,
    apps: AppsClient,
    publisher: Arc<dyn AnalysisStatusPublisher + Send + Sync>,
}

impl SessionManager {
    pub fn new(
        kube: Client,
        config: Config,
        apps: AppsClient,
        publisher: Arc<dyn AnalysisStatusPublisher + Send + Sync>,
    ) -> Self {
        Self {
            kube,
            config,
            apps,
            publisher,
        }
    }

    /// Admits, synthesizes, and applies the analysis object graph, then
    /// hands readiness watching to a background task. Safe to retry with
    /// the same invocation id: every apply is idempotent by name and
    /// verified by the `external-id` label.
    pub async fn launch(&self, job: &Job) -> Result<()> {
        quota::check_concurrent_limit(&self.kube, &self.config, &self.apps, &job.user_id).await?;

        let mut graph = synthesize::synthesize(job, &self.config)?;
        graph.merge_labels(&self.lazy_labels(job).await);

        let external_id = &job.invocation_id;
        if let Some(pv) = &graph.persistent_volume {
            let api = Api::<PersistentVolume>::all(self.kube.clone());
            self.apply(&api, "PersistentVolume", pv, external_id).await?;
        }
        if let Some(pvc) = &graph.persistent_volume_claim {
            self.apply(&self.namespaced(), "PersistentVolumeClaim", pvc, external_id)
                .await?;
        }
        for config_map in &graph.config_maps {
            self.apply(&self.namespaced(), "ConfigMap", config_map, external_id)
                .await?;
        }
        self.apply(&self.namespaced(), "Service", &graph.service, external_id)
            .await?;
        self.apply(&self.namespaced(), "Deployment", &graph.deployment, external_id)
            .await?;
        self.apply(&self.namespaced(), "Ingress", &graph.ingress, external_id)
            .await?;

        let kube = self.kube.clone();
        let namespace = self.config.namespace.clone();
        let publisher = self.publisher.clone();
        let external_id = job.invocation_id.clone();
        ::tokio::spawn(async move {
            watch_for_ready(kube, namespace, publisher, external_id).await;
        });

        Ok(())
    }

    /// Tears the object graph down in reverse creation order. Missing
    /// objects are ignored, so repeated terminations are no-ops; the
    /// terminal status goes out only on the invocation that found
    /// something to delete.
    pub async fn terminate(&self, external_id: &str) -> Result<()> {
        let selector = format!("{LABEL_EXTERNAL_ID}={external_id}");

        let deployments = Api::<Deployment>::namespaced(self.kube.clone(), &self.config.namespace);
        let existed = deployments
            .get_opt(&name::deployment_name(external_id))
            .await
            .map_err(Error::from)?
            .is_some();

        // a pod that already failed means the watcher owned the terminal
        // Failed publication; send nothing further
        let pods = Api::<Pod>::namespaced(self.kube.clone(), &self.config.namespace);
        let failed = pods
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(Error::from)?
            .items
            .iter()
            .any(|pod| {
                pod.status
                    .as_ref()
                    .and_then(|status| status.phase.as_deref())
                    == Some("Failed")
            });

        self.delete_collection::<Ingress>(&selector).await?;
        self.delete_collection::<Deployment>(&selector).await?;
        self.delete_collection::<Service>(&selector).await?;
        self.delete_collection::<ConfigMap>(&selector).await?;
        self.delete_collection::<PersistentVolumeClaim>(&selector)
            .await?;

        let volumes = Api::<PersistentVolume>::all(self.kube.clone());
        volumes
            .delete_collection(
                &DeleteParams::default(),
                &ListParams::default().labels(&selector),
            )
            .await
            .map_err(Error::from)?;

        if existed && !failed {
            if let Err(error) = self
                .publisher
                .success(external_id, "analysis terminated")
                .await
            {
                warn!("status publication after terminating {external_id} failed: {error}");
            }
        }
        Ok(())
    }

    /// Scales the analysis to zero replicas without touching anything else.
    pub async fn pause(&self, external_id: &str) -> Result<()> {
        self.scale(external_id, 0).await
    }

    pub async fn resume(&self, external_id: &str) -> Result<()> {
        self.scale(external_id, 1).await
    }

    /// Labels the launch path could not derive on its own, resolved
    /// best-effort: when Apps cannot answer now, the label sweep fills the
    /// gap later.
    async fn lazy_labels(&self, job: &Job) -> BTreeMap<String, String> {
        let mut extra = BTreeMap::new();

        match self.apps.get_user_ip(&job.user_id).await {
            Ok(ip) => {
                extra.insert(LABEL_LOGIN_IP.to_string(), ip);
            }
            Err(error) => debug!("no login ip for user {}: {error}", job.user_id),
        }

        match self
            .apps
            .get_analysis_id_by_external_id(&job.invocation_id)
            .await
        {
            Ok(analysis_id) => {
                extra.insert(LABEL_ANALYSIS_ID.to_string(), analysis_id);
            }
            Err(error) => debug!(
                "no analysis id for external id {}: {error}",
                job.invocation_id
            ),
        }
        extra
    }

    fn namespaced<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = kube::core::NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.kube.clone(), &self.config.namespace)
    }

    async fn apply<K>(
        &self,
        api: &Api<K>,
        kind: &'static str,
        object: &K,
        external_id: &str,
    ) -> Result<()>
    where
        K: kube::Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
    {
        let object_name = object
            .meta()
            .name
            .clone()
            .ok_or_else(|| Error::Internal(anyhow!("synthesized {kind} has no name")))?;

        match api.get_opt(&object_name).await.map_err(Error::from)? {
            Some(existing) => verify_owner(kind, &object_name, &existing, external_id),
            None => match api.create(&PostParams::default(), object).await {
                Ok(_) => Ok(()),
                // a racing create beat us to the name; settle by ownership
                Err(kube::Error::Api(response)) if response.code == 409 => {
                    let existing = api.get(&object_name).await.map_err(Error::from)?;
                    verify_owner(kind, &object_name, &existing, external_id)
                }
                Err(error) => Err(error.into()),
            },
        }
    }

    async fn delete_collection<K>(&self, selector: &str) -> Result<()>
    where
        K: kube::Resource<Scope = kube::core::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let api: Api<K> = self.namespaced();
        api.delete_collection(
            &DeleteParams::default(),
            &ListParams::default().labels(selector),
        )
        .await
        .map(|_| ())
        .map_err(Error::from)
    }

    async fn scale(&self, external_id: &str, replicas: i32) -> Result<()> {
        let api = Api::<Deployment>::namespaced(self.kube.clone(), &self.config.namespace);
        let patch = json!({ "spec": { "replicas": replicas } });

        match api
            .patch(
                &name::deployment_name(external_id),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                Err(Error::NotFound(format!("analysis {external_id}")))
            }
            Err(error) => Err(error.into()),
        }
    }
}

fn verify_owner<K>(kind: &'static str, object_name: &str, existing: &K, external_id: &str) -> Result<()>
where
    K: kube::Resource,
{
    if existing.labels().get(LABEL_EXTERNAL_ID).map(String::as_str) == Some(external_id) {
        Ok(())
    } else {
        Err(Error::NameCollision {
            kind,
            name: object_name.to_string(),
        })
    }
}

/// Polls the analysis pod until its first readiness, publishing `Running`
/// once it arrives and `Failed` on a terminal pod or init-container error.
/// Restarts before first readiness stay silent.
async fn watch_for_ready(
    kube: Client,
    namespace: String,
    publisher: Arc<dyn AnalysisStatusPublisher + Send + Sync>,
    external_id: String,
) {
    let api = Api::<Pod>::namespaced(kube, &namespace);
    let params = ListParams::default().labels(&format!("{LABEL_EXTERNAL_ID}={external_id}"));

    for _ in 0..READY_POLL_ATTEMPTS {
        let pods = match api.list(&params).await {
            Ok(list) => list.items,
            Err(err) => {
                warn!("listing pods for analysis {external_id} failed: {err}");
                ::tokio::time::sleep(READY_POLL_INTERVAL).await;
                continue;
            }
        };

        for pod in &pods {
            let Some(status) = &pod.status else { continue };

            for cs in status.init_container_statuses.as_deref().unwrap_or_default() {
                let terminated = cs.state.as_ref().and_then(|state| state.terminated.as_ref());
                if let Some(terminated) = terminated {
                    if terminated.exit_code != 0 {
                        let message = format!(
                            "init container {} exited with code {}",
                            cs.name, terminated.exit_code
                        );
                        publish_failure(&*publisher, &external_id, &message).await;
                        return;
                    }
                }
            }

            if status.phase.as_deref() == Some("Failed") {
                let message = format!(
                    "pod {} failed: {}",
                    pod.name_any(),
                    status.reason.as_deref().unwrap_or("unknown reason")
                );
                publish_failure(&*publisher, &external_id, &message).await;
                return;
            }

            let ready = status
                .container_statuses
                .as_deref()
                .unwrap_or_default()
                .iter()
                .any(|cs| cs.name == consts::ANALYSIS_CONTAINER_NAME && cs.ready);
            if ready {
                let message = format!("pod {} is ready", pod.name_any());
                if let Err(err) = publisher.running(&external_id, &message).await {
                    error!("running status for analysis {external_id} failed: {err}");
                }
                return;
            }
        }

        ::tokio::time::sleep(READY_POLL_INTERVAL).await;
    }

    warn!("gave up waiting for analysis {external_id} to become ready");
}

async fn publish_failure(
    publisher: &(dyn AnalysisStatusPublisher + Send + Sync),
    external_id: &str,
    message: &str,
) {
    if let Err(err) = publisher.fail(external_id, message).await {
        error!("failure status for analysis {external_id} failed: {err}");
    }
}

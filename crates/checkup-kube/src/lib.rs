//! [`ClusterClient`] backed by the Kubernetes API through kube-rs.
//!
//! Uses the ambient configuration (in-cluster service account or the local
//! kubeconfig). Waits are `kube::runtime` watches bounded by
//! `tokio::time::timeout`.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobCondition};
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::runtime::wait::{await_condition, Condition};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use checkup_core::client::{object_ref, ClientResult, ClusterClient};
use checkup_core::resources::CONTAINER_NAME;
use checkup_core::ClientError;

const JOB_NAME_LABEL: &str = "job-name";

pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect with the inferred in-cluster or kubeconfig settings.
    pub async fn try_default() -> Result<Self, kube::Error> {
        Ok(Self::new(Client::try_default().await?))
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn create<K>(&self, kind: &'static str, obj: &K) -> ClientResult<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned
            + Serialize
            + Send
            + Sync
            + 'static,
    {
        let (namespace, name) = object_ref(obj.meta());
        let created = self
            .api::<K>(namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| api_error(kind, namespace, name, e))?;
        info!(kind, namespace = %namespace, name = %name, "created");
        Ok(created)
    }

    async fn delete<K>(&self, kind: &'static str, namespace: &str, name: &str) -> ClientResult<()>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned
            + Send
            + Sync
            + 'static,
    {
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map_err(|e| api_error(kind, namespace, name, e))?;
        info!(kind, namespace = %namespace, name = %name, "deleted");
        Ok(())
    }
}

fn api_error(kind: &'static str, namespace: &str, name: &str, e: kube::Error) -> ClientError {
    match e {
        kube::Error::Api(ae) if ae.code == 404 => ClientError::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        e => ClientError::Api(Box::new(e)),
    }
}

// ---------------------------------------------------------------------------
// Job conditions
// ---------------------------------------------------------------------------

fn true_condition<'a>(job: &'a Job, type_: &str) -> Option<&'a JobCondition> {
    job.status
        .as_ref()?
        .conditions
        .as_ref()?
        .iter()
        .find(|c| c.type_ == type_ && c.status == "True")
}

/// Why a finished Job failed, or `None` if it did not.
pub fn job_failure_reason(job: &Job) -> Option<String> {
    let failed = true_condition(job, "Failed")?;
    let reason = failed.reason.as_deref().unwrap_or("Failed");
    Some(match failed.message.as_deref() {
        Some(message) if !message.is_empty() => format!("{reason}: {message}"),
        _ => reason.to_string(),
    })
}

pub fn is_job_finished() -> impl Condition<Job> {
    |obj: Option<&Job>| {
        obj.is_some_and(|job| {
            true_condition(job, "Complete").is_some() || true_condition(job, "Failed").is_some()
        })
    }
}

/// The Job with this uid no longer exists (a recreated Job with the same
/// name does not count).
pub fn is_job_gone(uid: Option<String>) -> impl Condition<Job> {
    move |obj: Option<&Job>| match (obj, uid.as_deref()) {
        (None, _) => true,
        (Some(job), Some(uid)) => job.metadata.uid.as_deref() != Some(uid),
        (Some(_), None) => false,
    }
}

// ---------------------------------------------------------------------------
// ClusterClient
// ---------------------------------------------------------------------------

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn create_config_map(&self, config_map: &ConfigMap) -> ClientResult<ConfigMap> {
        self.create("ConfigMap", config_map).await
    }

    async fn read_config_map(&self, namespace: &str, name: &str) -> ClientResult<ConfigMap> {
        self.api::<ConfigMap>(namespace)
            .get(name)
            .await
            .map_err(|e| api_error("ConfigMap", namespace, name, e))
    }

    async fn read_config_map_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClientResult<BTreeMap<String, String>> {
        let config_map = self.read_config_map(namespace, name).await?;
        Ok(config_map.data.unwrap_or_default())
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> ClientResult<()> {
        self.delete::<ConfigMap>("ConfigMap", namespace, name).await
    }

    async fn create_role(&self, role: &Role) -> ClientResult<Role> {
        self.create("Role", role).await
    }

    async fn delete_role(&self, namespace: &str, name: &str) -> ClientResult<()> {
        self.delete::<Role>("Role", namespace, name).await
    }

    async fn create_role_binding(&self, binding: &RoleBinding) -> ClientResult<RoleBinding> {
        self.create("RoleBinding", binding).await
    }

    async fn delete_role_binding(&self, namespace: &str, name: &str) -> ClientResult<()> {
        self.delete::<RoleBinding>("RoleBinding", namespace, name).await
    }

    async fn create_job(&self, job: &Job) -> ClientResult<Job> {
        self.create("Job", job).await
    }

    async fn wait_for_job_completion(&self, job: &Job, timeout: Duration) -> ClientResult<Job> {
        let (namespace, name) = object_ref(&job.metadata);
        let api = self.api::<Job>(namespace);

        let finished = tokio::time::timeout(timeout, await_condition(api, name, is_job_finished()))
            .await
            .map_err(|_| ClientError::Timeout {
                what: format!("job '{namespace}/{name}' to finish"),
                timeout,
            })?
            .map_err(|e| ClientError::Api(Box::new(e)))?;

        let finished = finished.ok_or_else(|| ClientError::NotFound {
            kind: "Job",
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;

        if let Some(reason) = job_failure_reason(&finished) {
            return Err(ClientError::WorkloadFailed {
                namespace: namespace.to_string(),
                name: name.to_string(),
                reason,
            });
        }

        debug!(namespace = %namespace, name = %name, "job completed");
        Ok(finished)
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> ClientResult<()> {
        self.delete::<Job>("Job", namespace, name).await
    }

    async fn wait_for_job_deletion(&self, job: &Job, timeout: Duration) -> ClientResult<()> {
        let (namespace, name) = object_ref(&job.metadata);
        let api = self.api::<Job>(namespace);
        let gone = is_job_gone(job.metadata.uid.clone());

        tokio::time::timeout(timeout, await_condition(api, name, gone))
            .await
            .map_err(|_| ClientError::Timeout {
                what: format!("job '{namespace}/{name}' to be deleted"),
                timeout,
            })?
            .map_err(|e| ClientError::Api(Box::new(e)))?;

        debug!(namespace = %namespace, name = %name, "job deleted");
        Ok(())
    }

    async fn job_logs(&self, job: &Job) -> ClientResult<String> {
        let (namespace, name) = object_ref(&job.metadata);
        let pods = self.api::<Pod>(namespace);

        let selector = format!("{JOB_NAME_LABEL}={name}");
        let list = pods
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| api_error("Pod", namespace, name, e))?;

        let pod_name = list
            .items
            .into_iter()
            .find_map(|pod| pod.metadata.name)
            .ok_or_else(|| ClientError::NotFound {
                kind: "Pod",
                namespace: namespace.to_string(),
                name: selector.clone(),
            })?;

        let params = LogParams {
            container: Some(CONTAINER_NAME.to_string()),
            ..Default::default()
        };
        pods.logs(&pod_name, &params)
            .await
            .map_err(|e| api_error("Pod", namespace, &pod_name, e))
    }
}

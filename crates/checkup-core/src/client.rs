use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};

use crate::error::ClientError;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Cluster operations a checkup run depends on.
///
/// Every object is addressed by namespace and name. Create calls return the
/// object as stored by the server. The two waits must give up with
/// [`ClientError::Timeout`] once `timeout` elapses.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn create_config_map(&self, config_map: &ConfigMap) -> ClientResult<ConfigMap>;

    async fn read_config_map(&self, namespace: &str, name: &str) -> ClientResult<ConfigMap>;

    /// The `data` of a ConfigMap; empty when it has none.
    async fn read_config_map_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClientResult<BTreeMap<String, String>>;

    async fn delete_config_map(&self, namespace: &str, name: &str) -> ClientResult<()>;

    async fn create_role(&self, role: &Role) -> ClientResult<Role>;

    async fn delete_role(&self, namespace: &str, name: &str) -> ClientResult<()>;

    async fn create_role_binding(&self, binding: &RoleBinding) -> ClientResult<RoleBinding>;

    async fn delete_role_binding(&self, namespace: &str, name: &str) -> ClientResult<()>;

    async fn create_job(&self, job: &Job) -> ClientResult<Job>;

    /// Block until the Job completes, returning it with its final status.
    ///
    /// A Job that ends in failure is [`ClientError::WorkloadFailed`].
    async fn wait_for_job_completion(&self, job: &Job, timeout: Duration) -> ClientResult<Job>;

    async fn delete_job(&self, namespace: &str, name: &str) -> ClientResult<()>;

    async fn wait_for_job_deletion(&self, job: &Job, timeout: Duration) -> ClientResult<()>;

    async fn job_logs(&self, job: &Job) -> ClientResult<String>;
}

/// Namespace and name of an object description, empty when unset.
pub fn object_ref(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> (&str, &str) {
    (
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default(),
    )
}

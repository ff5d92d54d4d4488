//! In-memory `ClusterClient` that records calls and fails on request.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobStatus};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::client::{object_ref, ClientResult, ClusterClient};
use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateConfigMap,
    ReadConfigMap,
    ReadConfigMapData,
    DeleteConfigMap,
    CreateRole,
    DeleteRole,
    CreateRoleBinding,
    DeleteRoleBinding,
    CreateJob,
    WaitForJobCompletion,
    DeleteJob,
    WaitForJobDeletion,
    JobLogs,
}

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Api,
    NotFound,
    Timeout,
    WorkloadFailed,
}

#[derive(Default)]
pub struct FakeClient {
    calls: Mutex<Vec<(Op, String)>>,
    timeouts: Mutex<Vec<(Op, Duration)>>,
    failures: HashMap<Op, Failure>,
    data: BTreeMap<String, String>,
}

impl FakeClient {
    pub fn failing(mut self, op: Op, failure: Failure) -> Self {
        self.failures.insert(op, failure);
        self
    }

    pub fn with_data(mut self, pairs: &[(&str, &str)]) -> Self {
        self.data = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self
    }

    pub fn calls(&self) -> Vec<(Op, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.calls().into_iter().map(|(op, _)| op).collect()
    }

    pub fn last_timeout(&self, op: Op) -> Option<Duration> {
        self.timeouts
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(o, _)| *o == op)
            .map(|(_, d)| *d)
    }

    fn call(&self, op: Op, namespace: &str, name: &str) -> ClientResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push((op, format!("{namespace}/{name}")));

        match self.failures.get(&op) {
            None => Ok(()),
            Some(Failure::Api) => Err(ClientError::Api(format!("{op:?} refused").into())),
            Some(Failure::NotFound) => Err(ClientError::NotFound {
                kind: "object",
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Some(Failure::Timeout) => Err(ClientError::Timeout {
                what: format!("{op:?} on {namespace}/{name}"),
                timeout: Duration::from_secs(1),
            }),
            Some(Failure::WorkloadFailed) => Err(ClientError::WorkloadFailed {
                namespace: namespace.to_string(),
                name: name.to_string(),
                reason: "DeadlineExceeded".into(),
            }),
        }
    }

    fn call_with_timeout(&self, op: Op, meta: &ObjectMeta, timeout: Duration) -> ClientResult<()> {
        self.timeouts.lock().unwrap().push((op, timeout));
        let (namespace, name) = object_ref(meta);
        self.call(op, namespace, name)
    }
}

/// What the API server adds on create.
fn stored(meta: &ObjectMeta) -> ObjectMeta {
    let mut meta = meta.clone();
    meta.uid = meta.name.as_ref().map(|n| format!("uid-{n}"));
    meta
}

#[async_trait]
impl ClusterClient for FakeClient {
    async fn create_config_map(&self, config_map: &ConfigMap) -> ClientResult<ConfigMap> {
        let (namespace, name) = object_ref(&config_map.metadata);
        self.call(Op::CreateConfigMap, namespace, name)?;
        Ok(ConfigMap {
            metadata: stored(&config_map.metadata),
            ..config_map.clone()
        })
    }

    async fn read_config_map(&self, namespace: &str, name: &str) -> ClientResult<ConfigMap> {
        self.call(Op::ReadConfigMap, namespace, name)?;
        Ok(ConfigMap {
            metadata: stored(&ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            }),
            data: Some(self.data.clone()),
            ..Default::default()
        })
    }

    async fn read_config_map_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClientResult<BTreeMap<String, String>> {
        self.call(Op::ReadConfigMapData, namespace, name)?;
        Ok(self.data.clone())
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> ClientResult<()> {
        self.call(Op::DeleteConfigMap, namespace, name)
    }

    async fn create_role(&self, role: &Role) -> ClientResult<Role> {
        let (namespace, name) = object_ref(&role.metadata);
        self.call(Op::CreateRole, namespace, name)?;
        Ok(Role {
            metadata: stored(&role.metadata),
            ..role.clone()
        })
    }

    async fn delete_role(&self, namespace: &str, name: &str) -> ClientResult<()> {
        self.call(Op::DeleteRole, namespace, name)
    }

    async fn create_role_binding(&self, binding: &RoleBinding) -> ClientResult<RoleBinding> {
        let (namespace, name) = object_ref(&binding.metadata);
        self.call(Op::CreateRoleBinding, namespace, name)?;
        Ok(RoleBinding {
            metadata: stored(&binding.metadata),
            ..binding.clone()
        })
    }

    async fn delete_role_binding(&self, namespace: &str, name: &str) -> ClientResult<()> {
        self.call(Op::DeleteRoleBinding, namespace, name)
    }

    async fn create_job(&self, job: &Job) -> ClientResult<Job> {
        let (namespace, name) = object_ref(&job.metadata);
        self.call(Op::CreateJob, namespace, name)?;
        Ok(Job {
            metadata: stored(&job.metadata),
            ..job.clone()
        })
    }

    async fn wait_for_job_completion(&self, job: &Job, timeout: Duration) -> ClientResult<Job> {
        self.call_with_timeout(Op::WaitForJobCompletion, &job.metadata, timeout)?;
        Ok(Job {
            status: Some(JobStatus {
                succeeded: Some(1),
                ..Default::default()
            }),
            ..job.clone()
        })
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> ClientResult<()> {
        self.call(Op::DeleteJob, namespace, name)
    }

    async fn wait_for_job_deletion(&self, job: &Job, timeout: Duration) -> ClientResult<()> {
        self.call_with_timeout(Op::WaitForJobDeletion, &job.metadata, timeout)
    }

    async fn job_logs(&self, job: &Job) -> ClientResult<String> {
        let (namespace, name) = object_ref(&job.metadata);
        self.call(Op::JobLogs, namespace, name)?;
        Ok(format!("logs of {name}"))
    }
}

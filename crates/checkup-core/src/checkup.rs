//! Lifecycle of one checkup run.
//!
//! Transitions: `Created → SetUp → Ran → TornDown`, with `Failed` entered when
//! `setup` or `run` fails. Teardown is accepted from every phase except
//! `TornDown`, so a failed run can still be cleaned up. A new run needs a new
//! [`Checkup`].

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use serde::Serialize;
use tracing::{info, warn};

use crate::client::{object_ref, ClientResult, ClusterClient};
use crate::error::{CheckupError, ClientError, Result, TeardownErrors, TeardownStep};
use crate::plan::ExecutionPlan;
use crate::resources;

pub const DEFAULT_TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Created,
    SetUp,
    Ran,
    Failed,
    TornDown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::SetUp => "set_up",
            Self::Ran => "ran",
            Self::Failed => "failed",
            Self::TornDown => "torn_down",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Checkup
// ---------------------------------------------------------------------------

pub struct Checkup<C> {
    client: C,
    namespace: String,
    phase: Phase,
    result_config_map: ConfigMap,
    roles: Vec<Role>,
    role_bindings: Vec<RoleBinding>,
    job: Job,
    job_created: bool,
    job_timeout: Duration,
    teardown_timeout: Duration,
}

impl<C: ClusterClient> Checkup<C> {
    /// Describe every object of the run. Nothing is sent to the cluster yet.
    pub fn new(client: C, plan: &ExecutionPlan) -> Self {
        let namespace = plan.namespace();
        let config_map_name = resources::results_config_map_name(plan.name());
        let role_name = resources::results_writer_role_name(plan.name());

        let roles = vec![resources::config_map_writer_role(
            namespace,
            &role_name,
            &config_map_name,
        )];
        let subject = resources::service_account_subject(namespace, plan.service_account_name());
        let role_bindings = roles
            .iter()
            .map(|role| {
                let (_, name) = object_ref(&role.metadata);
                resources::role_binding(namespace, name, subject.clone())
            })
            .collect();

        let deadline = i64::try_from(plan.timeout().as_secs()).unwrap_or(i64::MAX);
        let job = resources::checkup_job(
            namespace,
            &resources::job_name(plan.name()),
            plan.service_account_name(),
            plan.image(),
            deadline,
            resources::checkup_env(plan, &config_map_name),
        );

        Self {
            client,
            namespace: namespace.to_string(),
            phase: Phase::Created,
            result_config_map: resources::config_map(namespace, &config_map_name),
            roles,
            role_bindings,
            job,
            job_created: false,
            job_timeout: plan.timeout(),
            teardown_timeout: DEFAULT_TEARDOWN_TIMEOUT,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// The Job, once `run` has created it.
    pub fn job(&self) -> Option<&Job> {
        self.job_created.then_some(&self.job)
    }

    pub fn result_config_map(&self) -> &ConfigMap {
        &self.result_config_map
    }

    pub fn teardown_timeout(&self) -> Duration {
        self.teardown_timeout
    }

    pub fn set_teardown_timeout(&mut self, timeout: Duration) {
        self.teardown_timeout = timeout;
    }

    fn expect_phase(&self, expected: Phase, operation: &'static str) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(CheckupError::InvalidTransition {
                from: self.phase,
                operation,
            })
        }
    }

    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    /// Create the result ConfigMap, the Roles and the RoleBindings, in that
    /// order. Stops at the first failure; objects already created stay until
    /// [`Checkup::teardown`].
    pub async fn setup(&mut self) -> Result<()> {
        self.expect_phase(Phase::Created, "set up")?;

        match self.create_objects().await {
            Ok(()) => {
                self.phase = Phase::SetUp;
                info!(namespace = %self.namespace, "checkup set up");
                Ok(())
            }
            Err(e) => {
                self.phase = Phase::Failed;
                Err(CheckupError::Setup(e))
            }
        }
    }

    async fn create_objects(&mut self) -> ClientResult<()> {
        self.result_config_map = self
            .client
            .create_config_map(&self.result_config_map)
            .await?;

        for role in self.roles.iter_mut() {
            *role = self.client.create_role(role).await?;
        }

        for binding in self.role_bindings.iter_mut() {
            *binding = self.client.create_role_binding(binding).await?;
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Run
    // -----------------------------------------------------------------------

    /// Create the Job and wait for it to finish within the execution timeout.
    pub async fn run(&mut self) -> Result<()> {
        self.expect_phase(Phase::SetUp, "run")?;

        match self.client.create_job(&self.job).await {
            Ok(created) => {
                self.job = created;
                self.job_created = true;
            }
            Err(e) => {
                self.phase = Phase::Failed;
                return Err(CheckupError::RunFailure(e));
            }
        }

        let (_, job_name) = object_ref(&self.job.metadata);
        info!(namespace = %self.namespace, job = %job_name, timeout = ?self.job_timeout, "waiting for checkup job");

        match self
            .client
            .wait_for_job_completion(&self.job, self.job_timeout)
            .await
        {
            Ok(finished) => {
                self.job = finished;
                self.phase = Phase::Ran;
                info!(namespace = %self.namespace, "checkup job finished");
                Ok(())
            }
            Err(e) => {
                self.phase = Phase::Failed;
                if e.is_timeout() {
                    Err(CheckupError::RunTimeout(e))
                } else {
                    Err(CheckupError::RunFailure(e))
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Results / Logs
    // -----------------------------------------------------------------------

    /// Current contents of the result ConfigMap, as written by the workload.
    pub async fn results(&self) -> Result<BTreeMap<String, String>> {
        let (namespace, name) = object_ref(&self.result_config_map.metadata);
        self.client
            .read_config_map_data(namespace, name)
            .await
            .map_err(CheckupError::Results)
    }

    pub async fn logs(&self) -> Result<String> {
        let job = self.job().ok_or(CheckupError::NoWorkloadYet)?;
        self.client.job_logs(job).await.map_err(CheckupError::Logs)
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Delete everything the run may have created.
    ///
    /// Every step runs regardless of the others; all failures are returned
    /// together, including deletes of objects that do not exist.
    pub async fn teardown(&mut self) -> Result<()> {
        if self.phase == Phase::TornDown {
            return Err(CheckupError::InvalidTransition {
                from: self.phase,
                operation: "tear down",
            });
        }

        let mut errs = TeardownErrors::default();

        if self.job_created {
            if let Err(e) = self.delete_job_and_wait().await {
                record(&mut errs, TeardownStep::Job, e);
            }
        }

        for binding in &self.role_bindings {
            let (namespace, name) = object_ref(&binding.metadata);
            if let Err(e) = self.client.delete_role_binding(namespace, name).await {
                record(&mut errs, TeardownStep::RoleBindings, e);
            }
        }

        for role in &self.roles {
            let (namespace, name) = object_ref(&role.metadata);
            if let Err(e) = self.client.delete_role(namespace, name).await {
                record(&mut errs, TeardownStep::Roles, e);
            }
        }

        let (namespace, name) = object_ref(&self.result_config_map.metadata);
        if let Err(e) = self.client.delete_config_map(namespace, name).await {
            record(&mut errs, TeardownStep::ResultConfigMap, e);
        }

        self.phase = Phase::TornDown;

        if errs.is_empty() {
            info!(namespace = %self.namespace, "checkup torn down");
            Ok(())
        } else {
            Err(CheckupError::Teardown(errs))
        }
    }

    async fn delete_job_and_wait(&self) -> ClientResult<()> {
        let (namespace, name) = object_ref(&self.job.metadata);
        self.client.delete_job(namespace, name).await?;
        self.client
            .wait_for_job_deletion(&self.job, self.teardown_timeout)
            .await
    }
}

fn record(errs: &mut TeardownErrors, step: TeardownStep, e: ClientError) {
    warn!(%step, error = %e, "teardown step failed");
    errs.push(step, e);
}

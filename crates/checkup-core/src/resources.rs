//! Declarative descriptions of the cluster objects a checkup run needs.
//!
//! Names are derived from the run name alone, so the same objects can be
//! addressed again after a restart without storing anything.

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{ConfigMap, Container, EnvVar, PodSpec, PodTemplateSpec};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::plan;

/// Env vars every checkup workload receives, ahead of its own parameters.
pub const UID_ENV_VAR: &str = "CHECKUP_UID";
pub const RESULTS_CONFIG_MAP_NAME_ENV_VAR: &str = "RESULT_CONFIGMAP_NAME";
pub const RESULTS_CONFIG_MAP_NAMESPACE_ENV_VAR: &str = "RESULT_CONFIGMAP_NAMESPACE";

pub const CONTAINER_NAME: &str = "checkup";
pub const TERMINATION_GRACE_PERIOD_SECONDS: i64 = 5;

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

pub fn results_config_map_name(run: &str) -> String {
    format!("{run}-results")
}

pub fn results_writer_role_name(run: &str) -> String {
    format!("{run}-results-cm-writer")
}

pub fn job_name(run: &str) -> String {
    format!("{run}-checkup")
}

fn meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

pub fn config_map(namespace: &str, name: &str) -> ConfigMap {
    ConfigMap {
        metadata: meta(namespace, name),
        ..Default::default()
    }
}

/// Role allowed to write exactly one ConfigMap and nothing else.
pub fn config_map_writer_role(namespace: &str, name: &str, config_map_name: &str) -> Role {
    Role {
        metadata: meta(namespace, name),
        rules: Some(vec![PolicyRule {
            verbs: vec!["get".into(), "update".into(), "patch".into()],
            api_groups: Some(vec![String::new()]),
            resources: Some(vec!["configmaps".into()]),
            resource_names: Some(vec![config_map_name.to_string()]),
            ..Default::default()
        }]),
    }
}

pub fn service_account_subject(namespace: &str, name: &str) -> Subject {
    Subject {
        kind: "ServiceAccount".into(),
        name: name.to_string(),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

/// Binding named after the role it grants.
pub fn role_binding(namespace: &str, role_name: &str, subject: Subject) -> RoleBinding {
    RoleBinding {
        metadata: meta(namespace, role_name),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.into(),
            kind: "Role".into(),
            name: role_name.to_string(),
        },
        subjects: Some(vec![subject]),
    }
}

/// A run-once Job: no restarts, no retries, hard deadline.
pub fn checkup_job(
    namespace: &str,
    name: &str,
    service_account_name: &str,
    image: &str,
    active_deadline_seconds: i64,
    env: Vec<EnvVar>,
) -> Job {
    let container = Container {
        name: CONTAINER_NAME.into(),
        image: Some(image.to_string()),
        env: Some(env),
        ..Default::default()
    };

    Job {
        metadata: meta(namespace, name),
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            active_deadline_seconds: Some(active_deadline_seconds),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta::default()),
                spec: Some(PodSpec {
                    service_account_name: Some(service_account_name.to_string()),
                    restart_policy: Some("Never".into()),
                    termination_grace_period_seconds: Some(TERMINATION_GRACE_PERIOD_SECONDS),
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}

/// The workload's environment: the fixed contract first, then the plan's own.
pub fn checkup_env(plan: &plan::ExecutionPlan, results_config_map_name: &str) -> Vec<EnvVar> {
    let mut env = vec![
        env_var(UID_ENV_VAR, plan.uid()),
        env_var(RESULTS_CONFIG_MAP_NAME_ENV_VAR, results_config_map_name),
        env_var(RESULTS_CONFIG_MAP_NAMESPACE_ENV_VAR, plan.namespace()),
    ];
    env.extend(plan.env_vars().iter().map(|v| env_var(&v.name, &v.value)));
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Params;
    use crate::plan::ExecutionPlan;

    #[test]
    fn names_derive_from_the_run_name() {
        assert_eq!(results_config_map_name("lat"), "lat-results");
        assert_eq!(results_writer_role_name("lat"), "lat-results-cm-writer");
        assert_eq!(job_name("lat"), "lat-checkup");
    }

    #[test]
    fn writer_role_is_limited_to_one_config_map() {
        let role = config_map_writer_role("ns", "lat-results-cm-writer", "lat-results");
        let rules = role.rules.unwrap();
        assert_eq!(rules.len(), 1);

        let rule = &rules[0];
        assert_eq!(rule.verbs, vec!["get", "update", "patch"]);
        assert_eq!(rule.api_groups.as_deref(), Some(&[String::new()][..]));
        assert_eq!(rule.resources.as_deref(), Some(&["configmaps".to_string()][..]));
        assert_eq!(rule.resource_names.as_deref(), Some(&["lat-results".to_string()][..]));
    }

    #[test]
    fn role_binding_points_at_its_role() {
        let binding = role_binding("ns", "writer", service_account_subject("ns", "sa"));
        assert_eq!(binding.metadata.name.as_deref(), Some("writer"));
        assert_eq!(binding.role_ref.kind, "Role");
        assert_eq!(binding.role_ref.name, "writer");

        let subjects = binding.subjects.unwrap();
        assert_eq!(subjects[0].kind, "ServiceAccount");
        assert_eq!(subjects[0].name, "sa");
        assert_eq!(subjects[0].namespace.as_deref(), Some("ns"));
    }

    #[test]
    fn job_runs_once_within_its_deadline() {
        let job = checkup_job("ns", "lat-checkup", "sa", "img:1", 300, vec![]);
        let spec = job.spec.unwrap();
        assert_eq!(spec.backoff_limit, Some(0));
        assert_eq!(spec.active_deadline_seconds, Some(300));

        let pod = spec.template.spec.unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod.termination_grace_period_seconds, Some(5));
        assert_eq!(pod.service_account_name.as_deref(), Some("sa"));
        assert_eq!(pod.containers.len(), 1);
        assert_eq!(pod.containers[0].name, CONTAINER_NAME);
        assert_eq!(pod.containers[0].image.as_deref(), Some("img:1"));
    }

    #[test]
    fn env_contract_comes_before_checkup_params() {
        let params: Params = [
            ("spec.image", "img"),
            ("spec.timeout", "1m"),
            ("spec.serviceAccountName", "sa"),
            ("spec.param.target", "10.0.0.1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let plan = ExecutionPlan::new("lat", "ns", "uid-9", Some(&params)).unwrap();

        let env = checkup_env(&plan, "lat-results");
        let pairs: Vec<(&str, Option<&str>)> = env
            .iter()
            .map(|e| (e.name.as_str(), e.value.as_deref()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (UID_ENV_VAR, Some("uid-9")),
                (RESULTS_CONFIG_MAP_NAME_ENV_VAR, Some("lat-results")),
                (RESULTS_CONFIG_MAP_NAMESPACE_ENV_VAR, Some("ns")),
                ("TARGET", Some("10.0.0.1")),
            ]
        );
    }
}

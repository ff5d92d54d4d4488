//! The validated execution plan of one checkup run.
//!
//! Built once from the user's checkup definition (the `data` of a ConfigMap)
//! and then passed by value. Nothing downstream looks at raw strings again.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::error::ParamError;
use crate::params::{self, Params};

pub const IMAGE_KEY: &str = "spec.image";
pub const TIMEOUT_KEY: &str = "spec.timeout";
pub const SERVICE_ACCOUNT_NAME_KEY: &str = "spec.serviceAccountName";
pub const PARAM_KEY_PREFIX: &str = "spec.param.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    name: String,
    namespace: String,
    uid: String,
    image: String,
    #[serde(serialize_with = "serialize_duration")]
    timeout: Duration,
    service_account_name: String,
    env_vars: Vec<EnvVar>,
}

impl ExecutionPlan {
    /// Validate a checkup definition.
    ///
    /// `name` and `namespace` address the run's objects; `uid` is handed to the
    /// workload untouched.
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        uid: impl Into<String>,
        params: Option<&Params>,
    ) -> Result<Self, ParamError> {
        let params = params::non_empty(params)?;

        let image = params::mandatory(params, IMAGE_KEY)?;
        params::mandatory(params, TIMEOUT_KEY)?;
        let service_account_name = params::mandatory(params, SERVICE_ACCOUNT_NAME_KEY)?;

        let timeout = params::duration(params, TIMEOUT_KEY)?;
        let env_vars = checkup_env_vars(params)?;

        Ok(Self {
            name: name.into(),
            namespace: namespace.into(),
            uid: uid.into(),
            image: image.to_string(),
            timeout,
            service_account_name: service_account_name.to_string(),
            env_vars,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn service_account_name(&self) -> &str {
        &self.service_account_name
    }

    pub fn env_vars(&self) -> &[EnvVar] {
        &self.env_vars
    }
}

/// `spec.param.sample_duration` becomes `SAMPLE_DURATION`.
pub fn env_var_name(param: &str) -> String {
    param
        .chars()
        .map(|c| match c {
            '.' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

fn checkup_env_vars(params: &Params) -> Result<Vec<EnvVar>, ParamError> {
    // BTreeMap iteration keeps the order stable across runs.
    let mut sources: BTreeMap<String, &str> = BTreeMap::new();
    let mut env_vars = Vec::new();

    for (key, value) in params {
        let Some(param) = key.strip_prefix(PARAM_KEY_PREFIX) else {
            continue;
        };
        if param.is_empty() {
            return Err(ParamError::InvalidMandatoryField(PARAM_KEY_PREFIX));
        }

        let name = env_var_name(param);
        if let Some(first) = sources.insert(name.clone(), key) {
            return Err(ParamError::DuplicateParam {
                first: first.to_string(),
                second: key.clone(),
            });
        }
        env_vars.push(EnvVar {
            name,
            value: value.clone(),
        });
    }

    Ok(env_vars)
}

fn serialize_duration<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(&params::format_duration(*d))
}

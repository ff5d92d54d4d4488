use std::fmt;
use std::num::ParseIntError;
use std::time::Duration;

use thiserror::Error;

use crate::checkup::Phase;

// ---------------------------------------------------------------------------
// ParamError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("invalid params: no parameters were supplied")]
    InvalidParams,

    #[error("invalid {0}: parameter is missing or empty")]
    InvalidMandatoryField(&'static str),

    #[error("invalid {key}: {source}")]
    Syntax {
        key: &'static str,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid {key}: {source}")]
    Range {
        key: &'static str,
        #[source]
        source: ParseIntError,
    },

    #[error("illegal {first} and {second} combination: set both or neither")]
    IllegalPairedParamsCombination {
        first: &'static str,
        second: &'static str,
    },

    #[error("invalid {key}: '{value}' is not a positive duration")]
    InvalidDuration { key: &'static str, value: String },

    #[error("{first} and {second} map to the same environment variable")]
    DuplicateParam { first: String, second: String },
}

impl ParamError {
    /// The parse failure behind a `Syntax` or `Range` error.
    pub fn parse_cause(&self) -> Option<&ParseIntError> {
        match self {
            Self::Syntax { source, .. } | Self::Range { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ClientError
// ---------------------------------------------------------------------------

/// Failures reported by a [`crate::client::ClusterClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{kind} '{namespace}/{name}' not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    #[error("job '{namespace}/{name}' failed: {reason}")]
    WorkloadFailed {
        namespace: String,
        name: String,
        reason: String,
    },

    #[error(transparent)]
    Api(Box<dyn std::error::Error + Send + Sync>),
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// ---------------------------------------------------------------------------
// TeardownErrors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    Job,
    RoleBindings,
    Roles,
    ResultConfigMap,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Job => "job",
            Self::RoleBindings => "role bindings",
            Self::Roles => "roles",
            Self::ResultConfigMap => "result config map",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
#[error("{step}: {source}")]
pub struct TeardownFailure {
    pub step: TeardownStep,
    #[source]
    pub source: ClientError,
}

/// Every failure collected during one teardown, in the order the steps ran.
#[derive(Debug, Default)]
pub struct TeardownErrors(Vec<TeardownFailure>);

impl TeardownErrors {
    pub(crate) fn push(&mut self, step: TeardownStep, source: ClientError) {
        self.0.push(TeardownFailure { step, source });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TeardownFailure> {
        self.0.iter()
    }

    pub fn steps(&self) -> Vec<TeardownStep> {
        self.0.iter().map(|f| f.step).collect()
    }
}

impl fmt::Display for TeardownErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TeardownErrors {}

// ---------------------------------------------------------------------------
// CheckupError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CheckupError {
    #[error("setup: {0}")]
    Setup(#[source] ClientError),

    #[error("run: {0}")]
    RunTimeout(#[source] ClientError),

    #[error("run: {0}")]
    RunFailure(#[source] ClientError),

    #[error("results: {0}")]
    Results(#[source] ClientError),

    #[error("logs: {0}")]
    Logs(#[source] ClientError),

    #[error("logs: no checkup job has been created yet")]
    NoWorkloadYet,

    #[error("teardown: {0}")]
    Teardown(#[source] TeardownErrors),

    #[error("cannot {operation} a checkup in phase {from}")]
    InvalidTransition { from: Phase, operation: &'static str },
}

pub type Result<T> = std::result::Result<T, CheckupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_errors_render_on_one_line() {
        let mut errs = TeardownErrors::default();
        errs.push(TeardownStep::Roles, ClientError::Api("forbidden".into()));
        errs.push(
            TeardownStep::ResultConfigMap,
            ClientError::NotFound {
                kind: "ConfigMap",
                namespace: "ns".into(),
                name: "x-results".into(),
            },
        );

        let msg = CheckupError::Teardown(errs).to_string();
        assert_eq!(
            msg,
            "teardown: roles: forbidden; result config map: ConfigMap 'ns/x-results' not found"
        );
        assert!(!msg.contains('\n'));
    }

    #[test]
    fn run_errors_share_the_phase_prefix() {
        let timeout = CheckupError::RunTimeout(ClientError::Timeout {
            what: "job 'ns/x-checkup' to finish".into(),
            timeout: Duration::from_secs(1),
        });
        let failure = CheckupError::RunFailure(ClientError::WorkloadFailed {
            namespace: "ns".into(),
            name: "x-checkup".into(),
            reason: "BackoffLimitExceeded".into(),
        });
        assert!(timeout.to_string().starts_with("run: "));
        assert!(failure.to_string().starts_with("run: "));
    }
}

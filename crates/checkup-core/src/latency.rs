//! Parameters of the VM latency checkup.

use serde::Serialize;

use crate::error::ParamError;
use crate::params::{self, Params};

pub const NETWORK_NAME_PARAM: &str = "network_attachment_definition_name";
pub const NETWORK_NAMESPACE_PARAM: &str = "network_attachment_definition_namespace";
pub const SAMPLE_DURATION_SECONDS_PARAM: &str = "sample_duration_seconds";
pub const DESIRED_MAX_LATENCY_MILLISECONDS_PARAM: &str = "max_desired_latency_milliseconds";
pub const SOURCE_NODE_PARAM: &str = "source_node";
pub const TARGET_NODE_PARAM: &str = "target_node";

pub const DEFAULT_SAMPLE_DURATION_SECONDS: u64 = 5;
/// No latency bound unless one is requested.
pub const DEFAULT_DESIRED_MAX_LATENCY_MILLISECONDS: u64 = u64::MAX;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatencyConfig {
    pub network_attachment_definition_name: String,
    pub network_attachment_definition_namespace: String,
    pub sample_duration_seconds: u64,
    pub desired_max_latency_milliseconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_node: Option<String>,
}

impl LatencyConfig {
    pub fn new(params: Option<&Params>) -> Result<Self, ParamError> {
        let params = params::non_empty(params)?;

        let name = params::mandatory(params, NETWORK_NAME_PARAM)?;
        let namespace = params::mandatory(params, NETWORK_NAMESPACE_PARAM)?;

        let sample_duration_seconds = params::integer_or(
            params,
            SAMPLE_DURATION_SECONDS_PARAM,
            DEFAULT_SAMPLE_DURATION_SECONDS,
        )?;
        let desired_max_latency_milliseconds = params::integer_or(
            params,
            DESIRED_MAX_LATENCY_MILLISECONDS_PARAM,
            DEFAULT_DESIRED_MAX_LATENCY_MILLISECONDS,
        )?;

        let nodes = params::linked_pair(params, SOURCE_NODE_PARAM, TARGET_NODE_PARAM)?;
        let (source_node, target_node) = match nodes {
            Some((source, target)) => (Some(source), Some(target)),
            None => (None, None),
        };

        Ok(Self {
            network_attachment_definition_name: name.to_string(),
            network_attachment_definition_namespace: namespace.to_string(),
            sample_duration_seconds,
            desired_max_latency_milliseconds,
            source_node,
            target_node,
        })
    }
}

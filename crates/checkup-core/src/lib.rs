pub mod checkup;
pub mod client;
pub mod error;
pub mod latency;
pub mod params;
pub mod plan;
pub mod resources;

#[cfg(test)]
mod testing;

pub use checkup::{Checkup, Phase, DEFAULT_TEARDOWN_TIMEOUT};
pub use client::ClusterClient;
pub use error::{CheckupError, ClientError, ParamError, Result};
pub use plan::ExecutionPlan;

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use checkup_core::{Checkup, CheckupError, ClusterClient, ExecutionPlan, Phase};
use checkup_kube::KubeClusterClient;

use crate::output::{print_json, print_table};

#[derive(Serialize)]
struct RunReport {
    namespace: String,
    name: String,
    /// Where the run stopped, before teardown.
    phase: Phase,
    succeeded: bool,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
    results: BTreeMap<String, String>,
}

pub fn run(
    namespace: &str,
    config_map: &str,
    teardown_timeout: Option<Duration>,
    json: bool,
) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let report = rt.block_on(execute(namespace, config_map, teardown_timeout))?;

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    match report.failure_reason {
        None => Ok(()),
        Some(reason) => anyhow::bail!("checkup {namespace}/{config_map} failed: {reason}"),
    }
}

async fn execute(
    namespace: &str,
    config_map: &str,
    teardown_timeout: Option<Duration>,
) -> anyhow::Result<RunReport> {
    let client = KubeClusterClient::try_default()
        .await
        .context("failed to connect to the cluster")?;

    let definition = client
        .read_config_map(namespace, config_map)
        .await
        .with_context(|| format!("failed to read checkup definition {namespace}/{config_map}"))?;
    let uid = definition.metadata.uid.clone().unwrap_or_default();

    let plan = ExecutionPlan::new(config_map, namespace, uid, definition.data.as_ref())
        .with_context(|| format!("invalid checkup definition {namespace}/{config_map}"))?;
    info!(
        image = %plan.image(),
        timeout = ?plan.timeout(),
        service_account = %plan.service_account_name(),
        "starting checkup"
    );

    let mut checkup = Checkup::new(client, &plan);
    if let Some(timeout) = teardown_timeout {
        checkup.set_teardown_timeout(timeout);
    }

    Ok(drive(checkup, namespace, config_map).await)
}

/// Run the checkup to completion and always tear it down.
async fn drive<C: ClusterClient>(mut checkup: Checkup<C>, namespace: &str, name: &str) -> RunReport {
    let started_at = Utc::now();
    let outcome = run_checkup(&mut checkup).await;
    let phase = checkup.phase();
    let teardown = checkup.teardown().await;
    let completed_at = Utc::now();

    let mut failures = Vec::new();
    let results = match outcome {
        Ok(results) => results,
        Err(e) => {
            failures.push(e.to_string());
            BTreeMap::new()
        }
    };
    if let Err(e) = teardown {
        failures.push(e.to_string());
    }

    RunReport {
        namespace: namespace.to_string(),
        name: name.to_string(),
        phase,
        succeeded: failures.is_empty(),
        started_at,
        completed_at,
        failure_reason: (!failures.is_empty()).then(|| failures.join("; ")),
        results,
    }
}

/// Set up, run and collect. The caller tears down whatever this leaves behind.
async fn run_checkup<C: ClusterClient>(
    checkup: &mut Checkup<C>,
) -> Result<BTreeMap<String, String>, CheckupError> {
    checkup.setup().await?;
    let ran = checkup.run().await;

    match checkup.logs().await {
        Ok(logs) => info!("checkup logs:\n{logs}"),
        Err(e) => warn!(error = %e, "could not fetch checkup logs"),
    }

    ran?;
    checkup.results().await
}

fn print_report(report: &RunReport) {
    let status = if report.succeeded { "succeeded" } else { "failed" };
    println!(
        "checkup {}/{} {status} in {}s",
        report.namespace,
        report.name,
        (report.completed_at - report.started_at).num_seconds()
    );
    if let Some(reason) = &report.failure_reason {
        println!("reason: {reason}");
    }
    if report.results.is_empty() {
        return;
    }

    println!();
    let rows: Vec<Vec<String>> = report
        .results
        .iter()
        .map(|(k, v)| vec![k.clone(), v.clone()])
        .collect();
    print_table(&["KEY", "VALUE"], &rows);
}

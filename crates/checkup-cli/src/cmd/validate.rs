use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde_yaml::Value;

use checkup_core::latency::LatencyConfig;
use checkup_core::params::Params;
use checkup_core::{resources, ExecutionPlan};

use crate::output::{print_json, print_table, print_yaml};

pub fn run(file: &Path, latency: bool, name: &str, namespace: &str, json: bool) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let params = parse_params(&raw).with_context(|| format!("failed to parse {}", file.display()))?;

    if latency {
        let config = LatencyConfig::new(params.as_ref())
            .with_context(|| format!("invalid latency parameters in {}", file.display()))?;
        return if json { print_json(&config) } else { print_yaml(&config) };
    }

    let plan = ExecutionPlan::new(name, namespace, "", params.as_ref())
        .with_context(|| format!("invalid checkup definition in {}", file.display()))?;
    if json {
        return print_json(&plan);
    }

    println!("image:           {}", plan.image());
    println!("timeout:         {}", checkup_core::params::format_duration(plan.timeout()));
    println!("service account: {}", plan.service_account_name());
    println!("job:             {}", resources::job_name(plan.name()));
    println!("results:         {}", resources::results_config_map_name(plan.name()));
    if !plan.env_vars().is_empty() {
        println!();
        let rows: Vec<Vec<String>> = plan
            .env_vars()
            .iter()
            .map(|v| vec![v.name.clone(), v.value.clone()])
            .collect();
        print_table(&["ENV", "VALUE"], &rows);
    }
    Ok(())
}

/// A YAML mapping of scalars, read the way ConfigMap data is: every value as a
/// string. An empty document means no parameters at all.
fn parse_params(raw: &str) -> anyhow::Result<Option<Params>> {
    let doc: Option<BTreeMap<String, Value>> = serde_yaml::from_str(raw)?;
    let Some(doc) = doc else {
        return Ok(None);
    };

    doc.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                _ => anyhow::bail!("value of '{key}' is not a scalar"),
            };
            Ok((key, value))
        })
        .collect::<anyhow::Result<Params>>()
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_become_strings() {
        let params = parse_params("a: 60\nb: true\nc: text\nd:\n").unwrap().unwrap();
        assert_eq!(params["a"], "60");
        assert_eq!(params["b"], "true");
        assert_eq!(params["c"], "text");
        assert_eq!(params["d"], "");
    }

    #[test]
    fn empty_document_is_no_params() {
        assert_eq!(parse_params("").unwrap(), None);
    }

    #[test]
    fn nested_values_are_rejected() {
        let err = parse_params("a:\n  b: c\n").unwrap_err();
        assert!(err.to_string().contains("'a'"));
    }
}

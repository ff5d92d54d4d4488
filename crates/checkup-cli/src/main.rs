mod cmd;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "checkup",
    about = "Run self-contained diagnostic checkups inside a Kubernetes cluster",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the checkup defined by a ConfigMap, then remove everything it created
    Run {
        /// Namespace of the checkup definition; all run objects live here
        #[arg(long, env = "CONFIGMAP_NAMESPACE")]
        namespace: String,

        /// ConfigMap holding spec.image, spec.timeout, spec.serviceAccountName
        /// and spec.param.* entries
        #[arg(long = "config-map", env = "CONFIGMAP_NAME")]
        config_map: String,

        /// How long to wait for the checkup job to be deleted (e.g. 90s, 5m)
        #[arg(long, value_parser = parse_timeout)]
        teardown_timeout: Option<Duration>,
    },

    /// Validate a parameter file offline (YAML map of string values)
    Validate {
        file: PathBuf,

        /// Validate as VM latency checkup parameters instead of a checkup definition
        #[arg(long)]
        latency: bool,

        /// Run name used to derive object names
        #[arg(long, default_value = "checkup")]
        name: String,

        #[arg(long, default_value = "default")]
        namespace: String,
    },
}

fn parse_timeout(s: &str) -> Result<Duration, String> {
    match checkup_core::params::parse_duration(s) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => Err(format!("invalid duration '{s}': expected e.g. 90s, 5m, 1h")),
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        Commands::Validate { .. } => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run {
            namespace,
            config_map,
            teardown_timeout,
        } => cmd::run::run(&namespace, &config_map, teardown_timeout, cli.json),
        Commands::Validate {
            file,
            latency,
            name,
            namespace,
        } => cmd::validate::run(&file, latency, &name, &namespace, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

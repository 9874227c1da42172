use std::env;
use std::path::PathBuf;

use anyhow::anyhow;
use tracing_subscriber::EnvFilter;

use callcheck::{Harness, HarnessConfig};

const USAGE: &str = "Usage: callcheck <run|compare|clear> [--config <file.yaml>]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Handle CLI commands
    let mut args = env::args();
    let _ = args.next();
    let command = args.next().unwrap_or_else(|| "run".to_string());
    if command == "-h" || command == "--help" {
        println!("{USAGE}");
        return Ok(());
    }
    if !matches!(command.as_str(), "run" | "compare" | "clear") {
        anyhow::bail!("Unknown command '{command}'. {USAGE}");
    }

    let mut config_path: Option<PathBuf> = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                config_path = Some(PathBuf::from(path));
            }
            other => {
                anyhow::bail!("Unknown option '{other}'. {USAGE}");
            }
        }
    }

    // Load configuration
    let config = match &config_path {
        Some(path) => HarnessConfig::from_file(path),
        None => HarnessConfig::from_env(),
    }
    .map_err(|e| anyhow!(e.to_string()))?;
    let verdict_mode = config.verdict_mode;

    let harness = Harness::with_webdriver(config)?;

    match command.as_str() {
        "run" => {
            println!(
                "Running {} parallel voice sessions against {}",
                harness.config().session_count(),
                harness.config().app_url
            );
            let report = harness.run().await?;
            println!("{report}");
            report.conclude(verdict_mode)?;
        }
        "compare" => {
            let verdict = harness.compare().await?;
            println!("{verdict}");
            verdict.enforce(verdict_mode)?;
        }
        "clear" => {
            harness.prepare().await?;
            println!("Artifact directories and timing logs cleared");
        }
        _ => unreachable!(),
    }

    Ok(())
}

//! Migrates a legacy `AdapterConfig` YAML document to the native Workflow
//! wire format. Translation only — no execution.

use clap::Parser;
use hyperfleet_engine::document;
use hyperfleet_engine::translator;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "migrate", about = "Converts a legacy AdapterConfig document to a Workflow document")]
struct Args {
    /// Path to the legacy `AdapterConfig` YAML file.
    input: PathBuf,

    /// Where to write the translated Workflow YAML. Defaults to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("migrate: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let raw_yaml = std::fs::read_to_string(&args.input)?;
    let raw: serde_json::Value = serde_yaml::from_str(&raw_yaml)?;

    let cfg: translator::AdapterConfig = serde_json::from_value(raw)?;
    let translated = translator::translate(&cfg)?;
    let workflow_json = document::document_to_json(&translated);
    let workflow_yaml = serde_yaml::to_string(&workflow_json)?;

    let header = format!(
        "# Migrated from legacy AdapterConfig {}\n# source: {}\n",
        cfg.metadata.name,
        args.input.display()
    );
    let rendered = format!("{header}{workflow_yaml}");

    match &args.output {
        Some(path) => std::fs::write(path, rendered)?,
        None => print!("{rendered}"),
    }
    Ok(())
}

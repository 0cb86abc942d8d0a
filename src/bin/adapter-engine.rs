//! Manual-testing CLI: loads a document (legacy or Workflow-native, JSON or
//! YAML) and runs one event read from stdin through it, printing the
//! resulting execution summary as JSON. Not the broker integration — just a
//! stand-in for driving the façade by hand.

use clap::Parser;
use hyperfleet_engine::document;
use hyperfleet_engine::facade::{Adapter, EngineConfig, EngineDeps};
use hyperfleet_engine::http::ReqwestHttpTransport;
use hyperfleet_engine::k8s::KubeK8sTransport;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "adapter-engine", about = "Runs one event through a loaded workflow document")]
struct Args {
    /// Path to the workflow document (legacy `AdapterConfig` or Workflow-native, JSON or YAML).
    document: PathBuf,

    /// Domain prefix for the generation-tracking annotation.
    #[arg(long, default_value = "hyperfleet.io")]
    annotation_domain: String,

    /// Event JSON is read from stdin if this is not given.
    #[arg(long)]
    event: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    dotenvy::dotenv().ok();

    let args = Args::parse();
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("adapter-engine: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(&args.document)?;
    let parsed: serde_json::Value = serde_yaml::from_str(&raw)?;
    let doc = document::load(parsed)?;

    let event_raw = match &args.event {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let event: serde_json::Value = serde_json::from_str(event_raw.trim())?;

    let kube_client = kube::Client::try_default().await?;
    let deps = EngineDeps {
        http: Arc::new(ReqwestHttpTransport::default()),
        k8s: Arc::new(KubeK8sTransport::new(kube_client)),
    };
    let config = EngineConfig {
        annotation_domain: args.annotation_domain.clone(),
        ..EngineConfig::default()
    };
    let adapter = Adapter::new(Arc::new(doc), deps, config);

    let result = adapter.execute(event).await;
    let summary = serde_json::json!({
        "success": result.is_success(),
        "errorReason": result.error_reason,
        "errorMessage": result.error_message,
        "resourcesSkipped": result.resources_skipped,
        "skipReason": result.skip_reason,
        "output": result.output.as_json(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

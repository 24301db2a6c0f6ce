use clap::Parser;
use route_feasibility_lib::config::AppConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "route-feasibility", version, about = "Bus route feasibility classifier web app")]
struct Cli {
    /// JSON config file; built-in defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:8501
    #[arg(long)]
    bind: Option<String>,

    /// ONNX classifier artifact
    #[arg(long)]
    model: Option<PathBuf>,

    /// Label file next to the artifact
    #[arg(long)]
    labels: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --help and --version exit here, before anything is logged
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    tracing::info!("route-feasibility v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(model) = cli.model {
        config.model.model_path = model;
    }
    if let Some(labels) = cli.labels {
        config.model.labels_path = labels;
    }
    tracing::info!(
        source = %cli.config.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "defaults".into()),
        model = %config.model.model_path.display(),
        "configuration loaded"
    );

    if let Err(e) = route_feasibility_lib::run(config).await {
        tracing::error!(error = %e, "fatal");
        return Err(e);
    }
    Ok(())
}

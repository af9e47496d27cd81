//! CLI entry point for the grano record loader.

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use grano_client::Grano;
use grano_core::config::default_config_path;
use grano_core::ClientConfig;

use grano_loader::config::LoadConfig;
use grano_loader::records;
use grano_loader::Loader;

#[derive(Parser)]
#[command(name = "grano-load")]
#[command(about = "Load newline-delimited JSON records into a grano project")]
struct Cli {
    /// Record file to load.
    #[arg(short, long)]
    input: PathBuf,

    /// Project slug (otherwise read from config).
    #[arg(short, long)]
    project: Option<String>,

    /// Default source URL for loaded properties.
    #[arg(long)]
    source_url: Option<String>,

    /// Maximum concurrent saves.
    #[arg(short, long)]
    workers: Option<usize>,

    /// grano server URL.
    #[arg(long)]
    host: Option<String>,

    /// API key sent with every request.
    #[arg(long)]
    api_key: Option<String>,

    /// INI config file (default: ~/.grano.ini).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().or_else(default_config_path);

    let client_config = load_client_config(&cli, config_path.as_deref())?;
    let load_config = LoadConfig::load(config_path.as_deref())?;

    let slug = cli.project.as_deref().unwrap_or(&load_config.project);
    if slug.is_empty() {
        anyhow::bail!("Project required: set --project or load.project in config");
    }
    let source_url = cli.source_url.clone().or(load_config.source_url.clone());
    let workers = cli.workers.unwrap_or(load_config.workers);

    let grano = Grano::new(client_config)?;
    let project = grano.project(slug).await?;
    tracing::info!(project = %slug, host = %grano.client().config().host, "Connected to grano");

    let parsed = records::read_records(&cli.input)?;
    let base_dir = cli.input.parent().unwrap_or(Path::new("."));
    let loader = Loader::new(project, source_url);
    let plan = records::plan(&loader, &parsed, base_dir)?;
    let report = records::load(&loader, plan, workers).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.errors > 0 {
        anyhow::bail!("{} records could not be saved", report.errors);
    }
    Ok(())
}

fn load_client_config(cli: &Cli, path: Option<&Path>) -> anyhow::Result<ClientConfig> {
    let mut config = ClientConfig::load(path)?;
    if let Some(host) = &cli.host {
        config = config.with_host(host.as_str());
    }
    if let Some(api_key) = &cli.api_key {
        config = config.with_api_key(api_key.as_str());
    }
    Ok(config)
}

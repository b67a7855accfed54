use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use genesys_etl::apis::{GenesysApi, GenesysClient};
use genesys_etl::config::{ConnectionsConfig, EndpointsConfig, Settings};
use genesys_etl::credentials::{CredentialProvider, EnvCredentialProvider};
use genesys_etl::logging;
use genesys_etl::notify::{FailureNotifier, LogNotifier, SlackWebhookNotifier};
use genesys_etl::pipeline::{EndpointRunner, PipelineContext, RunStatus};
use genesys_etl::storage::LocalObjectStore;
use genesys_etl::warehouse::SqliteWarehouse;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Exit status of `extract` when the endpoint produced no rows.
const NO_DATA_EXIT_CODE: u8 = 10;

#[derive(Parser)]
#[command(name = "genesys_etl")]
#[command(about = "Genesys call log, contact and user extraction into the warehouse")]
#[command(version = "0.1.0")]
struct Cli {
    /// Endpoints document (JSON)
    #[arg(long, global = true, default_value = "configs/endpoints.json")]
    endpoints_config: PathBuf,

    /// Connections document (JSON)
    #[arg(long, global = true, default_value = "configs/connections.json")]
    connections_config: PathBuf,

    /// Runtime settings (TOML); defaults apply when the file is missing
    #[arg(long, global = true, default_value = "configs/config.toml")]
    settings: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract an endpoint into the raw tier (exit code 10 when no data was produced)
    Extract {
        #[arg(long)]
        endpoint: String,
    },
    /// Apply column transforms and write the curated tier
    Transform {
        #[arg(long)]
        endpoint: String,
    },
    /// Stage and upsert curated data into the warehouse
    Load {
        #[arg(long)]
        endpoint: String,
        /// Only this output (defaults to all outputs of the endpoint)
        #[arg(long)]
        output: Option<String>,
    },
    /// Run the whole chain; endpoints run concurrently
    Run {
        /// Endpoints to run (comma-separated). Defaults to every declared endpoint
        #[arg(long)]
        endpoints: Option<String>,
    },
    /// List declared endpoints and their outputs
    List,
}

fn build_context(cli: &Cli) -> anyhow::Result<PipelineContext> {
    let endpoints = EndpointsConfig::load(&cli.endpoints_config)
        .with_context(|| format!("loading {}", cli.endpoints_config.display()))?;
    let connections = ConnectionsConfig::load(&cli.connections_config)
        .with_context(|| format!("loading {}", cli.connections_config.display()))?;
    let settings = Settings::load(&cli.settings)?;

    let store = LocalObjectStore::new(connections.storage.root.clone());
    let wh = &connections.warehouse;
    let warehouse = SqliteWarehouse::open(&wh.path, &[wh.staging_schema.as_str(), wh.production_schema.as_str()])?;
    let notifier = build_notifier(&connections);

    Ok(PipelineContext {
        endpoints: Arc::new(endpoints),
        connections: Arc::new(connections),
        settings: Arc::new(settings),
        store: Arc::new(store),
        warehouse: Arc::new(warehouse),
        notifier,
    })
}

fn build_notifier(connections: &ConnectionsConfig) -> Arc<dyn FailureNotifier> {
    if let Some(cfg) = &connections.notifier {
        match std::env::var(&cfg.slack_webhook_env) {
            Ok(url) if !url.is_empty() => {
                info!("Failure notifications go to Slack");
                return Arc::new(SlackWebhookNotifier::new(url, cfg.channel.clone()));
            }
            _ => warn!("{} is not set, failures are only logged", cfg.slack_webhook_env),
        }
    }
    Arc::new(LogNotifier)
}

async fn build_api(ctx: &PipelineContext) -> anyhow::Result<Arc<dyn GenesysApi>> {
    let credentials = EnvCredentialProvider.load(&ctx.connections.secrets)?;
    let timeout = Duration::from_secs(ctx.settings.api.timeout_seconds);
    let client = GenesysClient::authenticate(&credentials, &ctx.connections.region, timeout).await?;
    Ok(Arc::new(client))
}

fn select_endpoints(ctx: &PipelineContext, requested: Option<String>) -> anyhow::Result<Vec<String>> {
    let Some(list) = requested else {
        return Ok(ctx.endpoints.names());
    };
    let names: Vec<String> = list.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
    for name in &names {
        ctx.endpoints.endpoint(name)?;
    }
    Ok(names)
}

async fn run_endpoints(runner: EndpointRunner, names: Vec<String>) -> anyhow::Result<()> {
    let mut set = JoinSet::new();
    for name in names {
        let runner = runner.clone();
        set.spawn(async move {
            let result = runner.run(&name).await;
            (name, result)
        });
    }

    let mut failed = Vec::new();
    while let Some(joined) = set.join_next().await {
        let (name, result) = joined?;
        match result {
            Ok(report) => {
                println!("\n📊 {} ({})", report.endpoint, report.run_id);
                match report.status {
                    RunStatus::Skipped => println!("   No data extracted, load skipped"),
                    RunStatus::Completed => {
                        println!("   Extracted rows: {}", report.extracted_rows);
                        for load in &report.outputs {
                            println!(
                                "   {}: staged {}, upserted {}",
                                load.output, load.staged_rows, load.upserted_rows
                            );
                        }
                    }
                }
            }
            Err(e) => {
                error!("Run for {} failed: {}", name, e);
                println!("❌ {} failed: {}", name, e);
                failed.push(name);
            }
        }
    }

    if !failed.is_empty() {
        bail!("{} endpoint run(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv::dotenv().ok();
    let _guard = logging::init_logging();

    let cli = Cli::parse();

    if let Commands::List = cli.command {
        let endpoints = EndpointsConfig::load(&cli.endpoints_config)?;
        for (name, endpoint) in &endpoints.endpoints {
            let schedule = endpoint.schedule.as_deref().unwrap_or("-");
            println!("{name} [{schedule}]");
            for (output, cfg) in &endpoint.output {
                println!("   {output} (key: {})", cfg.key.join(", "));
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let ctx = build_context(&cli)?;
    let run_id = Uuid::new_v4();

    match cli.command {
        Commands::Extract { endpoint } => {
            ctx.endpoints.endpoint(&endpoint)?;
            let api = build_api(&ctx).await?;
            let runner = EndpointRunner::new(ctx, api);
            let outcome = runner.extract(&endpoint, run_id).await?;
            if !outcome.data_available {
                println!("⚠️  No data extracted for {endpoint}");
                return Ok(ExitCode::from(NO_DATA_EXIT_CODE));
            }
            for dataset in &outcome.uploaded {
                println!("✅ {}: {} rows -> {}", dataset.output, dataset.rows, dataset.blob);
            }
        }
        Commands::Transform { endpoint } => {
            for curated in ctx.transform(&endpoint, run_id).await? {
                println!("✅ {}: {} rows curated", curated.output, curated.rows);
            }
        }
        Commands::Load { endpoint, output } => {
            let outputs = match output {
                Some(output) => vec![output],
                None => ctx.endpoints.endpoint(&endpoint)?.output.keys().cloned().collect(),
            };
            for output in &outputs {
                let load = ctx.load_output(&endpoint, output, run_id).await?;
                println!("✅ {}: staged {}, upserted {}", load.output, load.staged_rows, load.upserted_rows);
            }
        }
        Commands::Run { endpoints } => {
            let names = select_endpoints(&ctx, endpoints)?;
            let api = build_api(&ctx).await?;
            run_endpoints(EndpointRunner::new(ctx, api), names).await?;
        }
        Commands::List => {}
    }

    Ok(ExitCode::SUCCESS)
}

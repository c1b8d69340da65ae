use crate::commands::Commands;
use crate::error::CliError;
use crate::shutdown::ShutdownCoordinator;
use clap::Parser;
use engine_config::api::ApiConfig;
use engine_config::env::EnvOverrides;
use engine_config::error::ConfigError;
use engine_config::paths::BridgePaths;
use engine_config::secrets::EnvSecretResolver;
use engine_config::{mappings, secrets::SecretResolver};
use engine_core::state::json_store::JsonStateStore;
use engine_core::state::StateStore;
use engine_runtime::execution::executor::{self, RunOptions};
use engine_runtime::execution::factory;
use engine_runtime::execution::worker::WorkerContext;
use engine_runtime::upload::client::ControlPlaneClient;
use engine_runtime::upload::UploadTransport;
use model::outcome::RunReport;
use model::watermark::Watermark;
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

mod commands;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(name = "bridge", version, about = "Client-side data transfer agent")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let exit_code = match run_cli().await {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            eprintln!("error: {err}");
            err.exit_code()
        }
    };
    process::exit(exit_code);
}

fn init_tracing(paths: &BridgePaths, env: &EnvOverrides) {
    let level = env
        .log_level
        .as_deref()
        .and_then(|raw| raw.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    let filter = tracing_subscriber::filter::LevelFilter::from_level(level);

    let file_layer = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths.log_file())
        .ok()
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .with_filter(filter)
        });

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .with(file_layer)
        .init();
}

async fn run_cli() -> Result<i32, CliError> {
    let cli = Cli::parse();
    let env = EnvOverrides::from_env();

    let paths = BridgePaths::resolve(env.config_dir.as_deref())?;
    paths.ensure_directories()?;
    init_tracing(&paths, &env);

    let cancel = CancellationToken::new();
    ShutdownCoordinator::new(cancel.clone()).register_handlers();

    match cli.command {
        Commands::Sync {
            all,
            mapping,
            dry_run,
            force,
            sequential,
            parallel: _,
            workers,
            batch_size,
            status,
        } => {
            if status {
                return show_status(&paths, false).await;
            }
            run_sync(
                &paths,
                &env,
                cancel,
                SyncArgs {
                    all,
                    mapping,
                    dry_run: dry_run || env.dry_run.unwrap_or(false),
                    force,
                    sequential,
                    workers,
                    batch_size,
                },
            )
            .await
        }
        Commands::Status { json } => show_status(&paths, json).await,
        Commands::TestConn { mapping } => test_connection(&paths, &mapping).await,
    }
}

struct SyncArgs {
    all: bool,
    mapping: Vec<String>,
    dry_run: bool,
    force: bool,
    sequential: bool,
    workers: Option<usize>,
    batch_size: Option<usize>,
}

async fn run_sync(
    paths: &BridgePaths,
    env: &EnvOverrides,
    cancel: CancellationToken,
    args: SyncArgs,
) -> Result<i32, CliError> {
    if !args.all && args.mapping.is_empty() {
        return Err(CliError::NothingSelected);
    }

    let loaded = mappings::load_all(paths)?;
    if loaded.is_empty() {
        return Err(ConfigError::NoMappings.into());
    }
    let selected = mappings::select(loaded, &args.mapping)?;

    let transport: Option<Arc<dyn UploadTransport>> = if args.dry_run {
        None
    } else {
        let api = ApiConfig::load(paths)?;
        let client = ControlPlaneClient::new(api, env.http_timeout)
            .map_err(|err| ConfigError::ApiUnconfigured(err.to_string()))?;
        Some(Arc::new(client))
    };

    let template = WorkerContext {
        state: Arc::new(JsonStateStore::open(paths.state_file())?),
        secrets: Arc::new(EnvSecretResolver),
        transport,
        scratch_dir: paths.scratch_dir(),
        cancel,
        dry_run: false,
        force: false,
    };
    let options = RunOptions {
        dry_run: args.dry_run,
        force: args.force,
        parallelism: args.workers,
        sequential: args.sequential,
        batch_size_override: args.batch_size,
    };

    let report = executor::run(selected, options, template).await?;
    output::print_report(&report);
    Ok(report_exit_code(&report))
}

fn report_exit_code(report: &RunReport) -> i32 {
    if report.any_cancelled() {
        info!("run cancelled by signal");
        return 130;
    }
    if report.all_clean() {
        0
    } else {
        2
    }
}

async fn show_status(paths: &BridgePaths, as_json: bool) -> Result<i32, CliError> {
    let store = JsonStateStore::open(paths.state_file())?;
    let states = store.all().await?;
    output::print_status(&states, as_json)?;
    Ok(0)
}

async fn test_connection(paths: &BridgePaths, mapping_id: &str) -> Result<i32, CliError> {
    let loaded = mappings::load_all(paths)?;
    let selected = mappings::select(loaded, &[mapping_id.to_string()])?;
    let mapping = selected
        .into_iter()
        .next()
        .ok_or_else(|| ConfigError::UnknownMapping(mapping_id.to_string()))?;

    let resolver: Arc<dyn SecretResolver> = Arc::new(EnvSecretResolver);
    let mut source = factory::create_source(&mapping, &*resolver, Watermark::empty(), false)
        .await
        .map_err(|err| CliError::TestConn(err.to_string()))?;

    match source.open().await {
        Ok(()) => {
            source.close().await;
            println!("{mapping_id}: connection ok");
            Ok(0)
        }
        Err(err) => {
            source.close().await;
            Err(CliError::TestConn(err.to_string()))
        }
    }
}

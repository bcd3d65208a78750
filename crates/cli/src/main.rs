use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use colored::Colorize;
use crux_core::agent::{AgentError, ComponentLauncher, PipelineAgent};
use crux_core::config::{load_config, load_pipeline};
use crux_core::daemon::{Daemon, DaemonApi};
use crux_core::logging::init_logging;
use crux_core::pool::ProcessPool;
use crux_core::transport::{Address, ChannelOptions};
use crux_protocol::{CruxConfig, PipelineDefinition, TransportKind};
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

/// How long admin commands keep retrying a daemon that is not listening.
const ADMIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period for local components after SIGTERM.
const LOCAL_POOL_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "crux")]
#[command(about = "Launch components and run pipelines over them", version)]
struct Cli {
    /// Project root holding `.crux/config.toml`
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground until shut down or interrupted
    Daemon {
        /// Command endpoint, e.g. tcp://*:30020
        #[arg(long)]
        bind: Option<String>,

        /// Notification endpoint
        #[arg(long)]
        publish: Option<String>,

        /// Address launched components over Unix sockets
        #[arg(long)]
        ipc: bool,
    },

    /// Manage the daemon's processes
    Process {
        #[command(subcommand)]
        command: ProcessCommands,

        /// Daemon command endpoint (defaults to the configured bind address)
        #[arg(long, global = true)]
        daemon: Option<String>,
    },

    /// Ask the daemon to stop
    Shutdown {
        #[arg(long)]
        daemon: Option<String>,
    },

    /// Run a pipeline definition (JSON or YAML)
    Run {
        pipeline: PathBuf,

        /// Launch components through this daemon instead of a local pool
        #[arg(long)]
        daemon: Option<String>,

        /// Use Unix sockets for the local pool
        #[arg(long)]
        ipc: bool,
    },
}

#[derive(Subcommand)]
enum ProcessCommands {
    /// Launch the component at PATH
    Start { path: PathBuf },
    /// Print the address of every running process
    List,
    /// Terminate every process
    Killall,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = load_config(&cli.root)
        .await
        .wrap_err_with(|| format!("Failed to load config under {}", cli.root.display()))?;
    let level = cli.log_level.as_deref().unwrap_or(config.logging.level.as_str());
    init_logging(level)?;

    match cli.command {
        Commands::Daemon { bind, publish, ipc } => run_daemon(&config, bind, publish, ipc).await,
        Commands::Process { command, daemon } => {
            let mut api = daemon_api(&config, daemon)?;
            match command {
                ProcessCommands::Start { path } => {
                    let path = absolute(&path)?;
                    let address = api.process_start(&path.to_string_lossy()).await?;
                    println!("{address}");
                }
                ProcessCommands::List => {
                    for address in api.process_list().await? {
                        println!("{address}");
                    }
                }
                ProcessCommands::Killall => api.process_killall().await?,
            }
            Ok(())
        }
        Commands::Shutdown { daemon } => {
            daemon_api(&config, daemon)?.shutdown().await?;
            println!("{}", "Daemon shutting down".green());
            Ok(())
        }
        Commands::Run {
            pipeline,
            daemon,
            ipc,
        } => run_pipeline(&config, &pipeline, daemon, ipc).await,
    }
}

async fn run_daemon(
    config: &CruxConfig,
    bind: Option<String>,
    publish: Option<String>,
    ipc: bool,
) -> Result<()> {
    let mut settings = config.daemon.clone();
    if let Some(bind) = bind {
        settings.bind = bind;
    }
    if let Some(publish) = publish {
        settings.publish = publish;
    }

    let pool = local_pool(config, ipc);
    let daemon = Daemon::from_settings(&settings, pool).await?;
    daemon
        .listen_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}

async fn run_pipeline(
    config: &CruxConfig,
    file: &Path,
    daemon: Option<String>,
    ipc: bool,
) -> Result<()> {
    let mut definition = load_pipeline(file)?;
    resolve_sources(&mut definition, file)?;
    let options = ChannelOptions::from_settings(&config.agent);

    match daemon {
        Some(address) => {
            let address: Address = address.parse()?;
            let api = DaemonApi::new(address.connectable(), options);
            let mut agent = PipelineAgent::new(api, options);
            let outcome = drive(&mut agent, &definition).await;
            agent.release().await;
            outcome
        }
        None => {
            let mut agent = PipelineAgent::new(local_pool(config, ipc), options);
            let outcome = drive(&mut agent, &definition).await;
            agent.release().await;

            let mut pool = agent.into_launcher();
            pool.terminate_all();
            if tokio::time::timeout(LOCAL_POOL_GRACE, pool.wait_all()).await.is_err() {
                warn!(remaining = pool.len(), "Components ignored SIGTERM, killing");
                pool.kill_all();
                pool.wait_all().await;
            }
            outcome
        }
    }
}

/// Run every step, printing each result as it arrives.
async fn drive<L: ComponentLauncher>(
    agent: &mut PipelineAgent<L>,
    definition: &PipelineDefinition,
) -> Result<()> {
    let stream = agent.run(definition);
    tokio::pin!(stream);

    while let Some(item) = stream.next().await {
        match item {
            Ok(step) => {
                let payload = step
                    .result
                    .payload
                    .as_ref()
                    .map(|p| p.to_json().to_string())
                    .unwrap_or_default();
                println!(
                    "{} {} {}",
                    format!("[{}]", step.index).bold(),
                    step.step.component.cyan(),
                    payload
                );
            }
            Err(e) => {
                if matches!(e, AgentError::BrokenPipeline { .. }) {
                    error!(error = %e, "Pipeline broken");
                }
                return Err(e.into());
            }
        }
    }

    info!(steps = definition.pipeline.len(), "Pipeline finished");
    Ok(())
}

/// Relative component sources are taken relative to the pipeline file.
fn resolve_sources(definition: &mut PipelineDefinition, file: &Path) -> Result<()> {
    let base = absolute(file)?
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    for dependency in definition.components.values_mut() {
        let src = Path::new(&dependency.src);
        if src.is_relative() {
            dependency.src = base.join(src).to_string_lossy().into_owned();
        }
    }
    Ok(())
}

fn local_pool(config: &CruxConfig, ipc: bool) -> ProcessPool {
    let mut settings = config.pool.clone();
    if ipc {
        settings.transport = TransportKind::Ipc;
    }
    ProcessPool::from_settings(&settings)
}

fn daemon_api(config: &CruxConfig, daemon: Option<String>) -> Result<DaemonApi> {
    let address: Address = daemon.as_deref().unwrap_or(config.daemon.bind.as_str()).parse()?;
    let options = ChannelOptions::from_settings(&config.agent).with_connect_timeout(ADMIN_CONNECT_TIMEOUT);
    Ok(DaemonApi::new(address.connectable(), options))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).wrap_err_with(|| format!("Invalid path {}", path.display()))
}

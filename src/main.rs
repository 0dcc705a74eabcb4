//! md-monitor - Tail GROMACS/PLUMED output into an experiment tracker.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use md_monitor::config::{ConfigError, ConfigLoader, MonitorConfig, Settings, SinkKind};
use md_monitor::display;
use md_monitor::monitor::{MdMonitor, MonitorError};
use md_monitor::parsers;
use md_monitor::process::{wait_for_exit, PidHandle};
use md_monitor::sink::{self, RunSpec, SinkError};
use md_monitor::tools;

/// How often `watch --pid` checks the simulation process.
const PID_CHECK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SinkArg {
    Jsonl,
    Http,
}

impl From<SinkArg> for SinkKind {
    fn from(arg: SinkArg) -> Self {
        match arg {
            SinkArg::Jsonl => SinkKind::Jsonl,
            SinkArg::Http => SinkKind::Http,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "md-monitor",
    about = "Tail GROMACS/PLUMED output into an experiment tracker",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Settings file (defaults to ./.md-monitor.toml, then the user config dir).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Files produced by one simulation.
#[derive(Args, Debug)]
struct FileArgs {
    /// Engine log (md.log).
    #[arg(long)]
    log: PathBuf,
    /// Energy file (md.edr).
    #[arg(long)]
    edr: PathBuf,
    /// PLUMED COLVAR file.
    #[arg(long)]
    colvar: Option<PathBuf>,
    /// PLUMED HILLS file.
    #[arg(long)]
    hills: Option<PathBuf>,
    /// Energy terms to report, comma-separated.
    #[arg(long, value_delimiter = ',')]
    terms: Vec<String>,
    /// COLVAR column holding simulation time.
    #[arg(long)]
    time_field: Option<String>,
    /// Integration time step in ps.
    #[arg(long)]
    dt: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor a running simulation until Ctrl-C or until it exits.
    Watch {
        #[command(flatten)]
        files: FileArgs,
        /// Seconds between poll cycles.
        #[arg(long)]
        interval: Option<f64>,
        /// Stop once this simulation process has exited.
        #[arg(long)]
        pid: Option<u32>,
        /// Sink to report into (overrides the settings file).
        #[arg(long, value_enum)]
        sink: Option<SinkArg>,
        /// Root directory for offline runs.
        #[arg(long)]
        runs_dir: Option<PathBuf>,
        /// Tracking service base URL.
        #[arg(long)]
        endpoint: Option<String>,
        /// Project the run is filed under.
        #[arg(long)]
        project: Option<String>,
        /// Run name (defaults to the log file's directory name).
        #[arg(long)]
        name: Option<String>,
        /// Skip the final poll on shutdown.
        #[arg(long)]
        no_flush: bool,
    },
    /// Show what each reader currently sees, without reporting anything.
    Inspect {
        #[command(flatten)]
        files: FileArgs,
        /// Only show energy steps after this one.
        #[arg(long)]
        after: Option<i64>,
        /// COLVAR data lines to skip.
        #[arg(long, default_value_t = 0)]
        from_row: usize,
    },
    /// Print the controller tool definitions as JSON.
    Tools,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn build_config(files: FileArgs, settings: &Settings) -> MonitorConfig {
    let mut config = settings
        .monitor
        .config_for(files.log, files.edr)
        .with_energy_terms(files.terms);
    if let Some(path) = files.colvar {
        config = config.with_colvar(path);
    }
    if let Some(path) = files.hills {
        config = config.with_hills(path);
    }
    if let Some(field) = files.time_field {
        config = config.with_time_field(field);
    }
    if let Some(dt) = files.dt {
        config = config.with_dt(dt);
    }
    config
}

fn default_run_name(log_file: &Path) -> String {
    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok());
    dir.as_deref()
        .and_then(Path::file_name)
        .map_or_else(|| "md-run".to_string(), |n| n.to_string_lossy().into_owned())
}

/// Resolves once `pid` has exited. Never resolves without a PID.
async fn simulation_exit(pid: Option<u32>) {
    let Some(pid) = pid else {
        return std::future::pending().await;
    };
    let mut handle = PidHandle::new(pid);
    if let Err(e) = wait_for_exit(&mut handle, PID_CHECK_INTERVAL).await {
        tracing::warn!(pid, error = %e, "Cannot watch simulation process");
        std::future::pending::<()>().await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn watch(
    mut settings: Settings,
    files: FileArgs,
    interval: Option<f64>,
    pid: Option<u32>,
    sink_kind: Option<SinkArg>,
    runs_dir: Option<PathBuf>,
    endpoint: Option<String>,
    project: Option<String>,
    name: Option<String>,
    no_flush: bool,
) -> Result<(), CliError> {
    if let Some(kind) = sink_kind {
        settings.sink.kind = kind.into();
    }
    if runs_dir.is_some() {
        settings.sink.runs_dir = runs_dir;
    }
    if endpoint.is_some() {
        settings.sink.endpoint = endpoint;
    }

    let name = name.unwrap_or_else(|| default_run_name(&files.log));
    let mut config = build_config(files, &settings);
    if let Some(interval) = interval {
        config.poll_interval_s = interval;
    }
    config.validate().map_err(MonitorError::from)?;

    let sink = sink::from_settings(&settings.sink)?;
    let mut spec = RunSpec::new(project.unwrap_or_else(|| settings.sink.project.clone()), name);
    spec.config = serde_json::to_value(&config)?;
    let run = sink.ensure_active_context(&spec).await?;
    display::print_run(&run);

    let mut monitor = MdMonitor::new(config, Arc::clone(&sink));
    let report = monitor.start_or_close().await?;
    display::print_started(&report);

    let mut snapshots = monitor.subscribe();
    let exited = simulation_exit(pid);
    tokio::pin!(exited);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping monitor");
                break;
            }
            () = &mut exited => {
                tracing::info!(pid = ?pid, "Simulation exited, stopping monitor");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                display::print_cycle(&snapshot);
            }
        }
    }

    let outcome = monitor.stop(!no_flush).await;
    display::print_stopped(outcome);
    Ok(())
}

fn inspect(settings: &Settings, files: FileArgs, after: Option<i64>, from_row: usize) -> Result<(), CliError> {
    let config = build_config(files, settings);

    display::print_section("ENERGY", &config.energy_file);
    match parsers::read_energy_file(&config.energy_file) {
        Ok(file) => {
            let names: Vec<&str> = file.terms.iter().map(|t| t.name.as_str()).collect();
            println!(
                "  version={} precision={:?} frames={} truncated={}",
                file.version,
                file.precision,
                file.frames.len(),
                file.truncated
            );
            println!("  terms: {}", names.join(", "));
            let series = file.select(&config.energy_terms, after);
            println!("  selected steps: {}", series.len());
            if let Some((step, values)) = series.last_key_value() {
                println!("  last: step={step} {}", serde_json::to_string(values)?);
            }
        }
        Err(e) => display::print_error(&e.to_string()),
    }

    if let Some(path) = &config.colvar_file {
        display::print_section("COLVAR", path);
        match parsers::read_colvar(path, from_row) {
            Ok(chunk) => {
                println!("  rows={} consumed={}", chunk.rows.len(), chunk.consumed);
                if let Some(row) = chunk.rows.last() {
                    let time = row.get(&config.time_field).unwrap_or(0.0);
                    println!(
                        "  last: line={} md_step={} {}",
                        row.line,
                        config.time_to_step(time),
                        serde_json::to_string(&row.values)?
                    );
                }
            }
            Err(e) => display::print_error(&e.to_string()),
        }
    }

    if let Some(path) = &config.hills_file {
        display::print_section("HILLS", path);
        match parsers::count_hills(path) {
            Ok(count) => println!("  deposited={count}"),
            Err(e) => display::print_error(&e.to_string()),
        }
    }

    display::print_section("LOG", &config.log_file);
    match parsers::parse_progress(&config.log_file) {
        Ok(Some(progress)) => println!("  {}", serde_json::to_string(&progress)?),
        Ok(None) => println!("  no progress yet"),
        Err(e) => display::print_error(&e.to_string()),
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let loader = cli.config.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    let settings = loader.load()?;

    match cli.command {
        Commands::Watch {
            files,
            interval,
            pid,
            sink,
            runs_dir,
            endpoint,
            project,
            name,
            no_flush,
        } => {
            watch(
                settings, files, interval, pid, sink, runs_dir, endpoint, project, name, no_flush,
            )
            .await
        }
        Commands::Inspect {
            files,
            after,
            from_row,
        } => inspect(&settings, files, after, from_row),
        Commands::Tools => {
            println!("{}", serde_json::to_string_pretty(&tools::definitions())?);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            display::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clipocr::config::{Config, RuntimePaths};
use clipocr::daemon::{self, DaemonLauncher, DaemonStatus, StartOutcome, StopOutcome, Supervisor};
use clipocr::engine::EngineRuntime;
use clipocr::ipc::Action;
use clipocr::output::DesktopNotifier;
use clipocr::platform::{self, DisplayServer};
use clipocr::{panic_handler, Client};
use std::path::Path;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "clipocr")]
#[command(author, version, about = "Screen-region OCR to clipboard", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Select a region, recognize it and copy the text with anything held
    #[command(alias = "ocr")]
    Recognize,

    /// Select a region, recognize it and hold the text for the next recognize
    Hold,

    /// Download the recognition engine
    Download,

    /// Start the daemon
    #[command(alias = "listen")]
    Start {
        /// Run the daemon in this process instead of spawning it
        #[arg(short, long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Stop and start the daemon
    Restart,

    /// Check daemon status
    Status,

    /// Stop the daemon and delete the downloaded engine
    #[command(alias = "nuke")]
    Purge,
}

/// Console logging on stderr; the foreground daemon also logs to a daily file
/// in `log_dir`, since a spawned daemon has no terminal.
fn init_logging(verbose: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("clipocr=debug")
        } else {
            EnvFilter::new("clipocr=info")
        }
    });

    let file = log_dir.and_then(|dir| {
        RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("daemon.log")
            .build(dir)
            .map_err(|e| eprintln!("File logging disabled: {}", e))
            .ok()
    });
    let (file_layer, guard) = match file {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn supervisor(paths: &RuntimePaths) -> anyhow::Result<Supervisor> {
    let launcher = DaemonLauncher::current_exe().context("Cannot locate clipocr executable")?;
    Ok(Supervisor::new(paths, launcher))
}

fn client(paths: &RuntimePaths) -> anyhow::Result<Client> {
    Ok(Client::new(
        paths,
        supervisor(paths)?,
        EngineRuntime::locate()?,
    ))
}

fn print_started(outcome: StartOutcome) {
    match outcome {
        StartOutcome::Started(pid) => println!("Started daemon (PID {}).", pid),
        StartOutcome::AlreadyRunning(pid) => println!("Already running (PID {}).", pid),
    }
}

fn print_stopped(outcome: StopOutcome) {
    match outcome {
        StopOutcome::AlreadyStopped => println!("Already stopped."),
        StopOutcome::Stopped(pid) => println!("Stopped daemon (PID {}).", pid),
        StopOutcome::Killed(pid) => println!("Killed daemon (PID {}), it ignored stop.", pid),
    }
}

fn main() -> anyhow::Result<()> {
    panic_handler::install();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let foreground = matches!(command, Commands::Start { foreground: true });
    let log_dir = if foreground {
        Config::data_dir().ok().map(|dir| dir.join("logs"))
    } else {
        None
    };
    let _guard = init_logging(cli.verbose, log_dir.as_deref());

    let paths = RuntimePaths::from_env();

    match command {
        Commands::Recognize | Commands::Hold => {
            let action = if matches!(command, Commands::Hold) {
                Action::Hold
            } else {
                Action::Recognize
            };
            let platform = platform::detect();
            client(&paths)?.submit(action, platform.as_ref(), &DesktopNotifier)?;
        }

        Commands::Download => {
            let runtime = EngineRuntime::locate()?;
            if runtime.is_installed() {
                warn!("Engine already present at {}, upgrading", runtime.prefix().display());
            }
            runtime.download()?;
        }

        Commands::Start { foreground: true } => {
            info!("Starting clipocr daemon...");
            daemon::run_foreground(&paths)?;
        }

        Commands::Start { foreground: false } => {
            print_started(client(&paths)?.start()?);
        }

        Commands::Stop => {
            print_stopped(supervisor(&paths)?.stop()?);
        }

        Commands::Restart => {
            let (stopped, started) = client(&paths)?.restart()?;
            print_stopped(stopped);
            print_started(started);
        }

        Commands::Status => {
            let server = DisplayServer::detect().name();
            match supervisor(&paths)?.status() {
                DaemonStatus::Running(pid) => println!("Running (PID {}), {}.", pid, server),
                DaemonStatus::Stopped => println!("Stopped, {}.", server),
            }
        }

        Commands::Purge => {
            print_stopped(supervisor(&paths)?.stop()?);
            let runtime = EngineRuntime::locate()?;
            if runtime.purge()? {
                println!("Removed {}.", runtime.prefix().display());
            } else {
                println!("Nothing to remove.");
            }
        }
    }

    Ok(())
}

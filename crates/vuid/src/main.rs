//! vuid - voice-skill lifecycle supervisor daemon
//!
//! Main entry point for the daemon binary.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::path::{Path, PathBuf};

use clap::Parser;
use eyre::WrapErr;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use vui_core::Config;
use vuid::{Daemon, DaemonConfig};

#[derive(Parser)]
#[command(name = "vuid", about = "Voice-skill lifecycle supervisor", version)]
struct Cli {
    /// Config file (key=value)
    #[arg(short, long, env = "VUID_CONFIG")]
    config: Option<PathBuf>,

    /// Package directory; repeat to load several, in order
    #[arg(long = "app-dir", env = "VUID_APP_DIRS", value_delimiter = ':')]
    app_dirs: Vec<PathBuf>,

    /// Reject foreground-only calls from background apps with an error
    #[arg(long, env = "VUID_STRICT_FOREGROUND")]
    strict_foreground: bool,

    /// Read newline-delimited JSON voice commands from stdin
    #[arg(long)]
    stdin_commands: bool,
}

/// Default config path (~/.config/vuid/vuid.conf).
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("vuid").join("vuid.conf"))
}

fn load_config(cli: &Cli) -> eyre::Result<Config> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => default_config_path().filter(|path| path.exists()),
    };

    let mut config = match &path {
        Some(path) => Config::from_file(path)
            .wrap_err_with(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(base) = path.as_deref().and_then(Path::parent) {
        config.resolve_paths(base);
    }

    if !cli.app_dirs.is_empty() {
        config.app_dirs.clone_from(&cli.app_dirs);
    }
    if cli.strict_foreground {
        config.strict_foreground = true;
    }
    Ok(config)
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing.
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = DaemonConfig {
        supervisor: load_config(&cli)?,
        stdin_commands: cli.stdin_commands,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("failed to create tokio runtime")?;

    runtime.block_on(async {
        let daemon = Daemon::new(config)
            .await
            .wrap_err("failed to initialize daemon")?;

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).wrap_err("failed to register SIGTERM handler")?;
            let mut sigint =
                signal(SignalKind::interrupt()).wrap_err("failed to register SIGINT handler")?;

            tokio::select! {
                () = daemon.run() => {}
                _ = sigint.recv() => {
                    info!("received SIGINT, initiating graceful shutdown");
                    daemon.shutdown();
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating graceful shutdown");
                    daemon.shutdown();
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                () = daemon.run() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("received SIGINT, initiating graceful shutdown");
                    daemon.shutdown();
                }
            }
        }

        daemon.join().await.wrap_err("supervisor did not stop cleanly")
    })
}

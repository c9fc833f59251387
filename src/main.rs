//! RingElect - Ring-Based Leader Election
//!
//! Runs one election node per process. Protocol events go to stdout and to
//! the log file named on the command line.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ringelect::config::RingConfig;
use ringelect::error::{Error, Result};
use ringelect::node::RingNode;

/// RingElect - Ring-Based Leader Election
#[derive(Parser)]
#[command(name = "ringelect")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (two-line ip,port format or .toml)
    #[arg(short, long, default_value = "config.txt")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the election node
    Start {
        /// Log file, truncated at startup
        log_file: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Write a new configuration file
    Init {
        /// Output path (written as TOML when it ends in .toml)
        #[arg(short, long, default_value = "config.txt")]
        output: PathBuf,

        /// Address to listen on for the upstream peer
        #[arg(long, default_value = "127.0.0.1:5001")]
        listen: String,

        /// Address of the outbound neighbor
        #[arg(long, default_value = "127.0.0.1:5002")]
        neighbor: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { log_file } => {
            init_logging(&cli.log_level, Some(&log_file))?;
            run_start(cli.config).await
        }
        Commands::Validate => {
            init_logging(&cli.log_level, None)?;
            run_validate(cli.config)
        }
        Commands::Init {
            output,
            listen,
            neighbor,
        } => {
            init_logging(&cli.log_level, None)?;
            run_init(output, listen, neighbor)
        }
    }
}

/// Wall-clock timestamp in `ctime` style, e.g. `[Sat Oct 17 14:02:11 2026]`
struct CtimeTimer;

impl FormatTime for CtimeTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "[{}]", chrono::Local::now().format("%a %b %e %H:%M:%S %Y"))
    }
}

/// Initialize logging
fn init_logging(level: &str, log_file: Option<&Path>) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false)
                    .with_timer(CtimeTimer),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}

/// Start the election node
async fn run_start(config_path: PathBuf) -> Result<()> {
    let config = match RingConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("FATAL: Error reading {:?}: {}", config_path, e);
            return Err(e);
        }
    };
    tracing::info!(
        "Loaded configuration: listen {} -> neighbor {}",
        config.listen_address(),
        config.neighbor_address()
    );

    let node = match RingNode::bind(config).await {
        Ok(n) => n,
        Err(e) => {
            tracing::error!("FATAL: Failed to start node: {}", e);
            return Err(e);
        }
    };
    let handle = node.handle();
    let mut task = tokio::spawn(node.run());

    let finished = tokio::select! {
        result = &mut task => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let result = match finished {
        Some(result) => result,
        None => {
            tracing::info!("Ctrl+C detected. Initiating shutdown...");
            handle.shutdown();
            task.await
        }
    };

    result.map_err(|e| Error::Internal(format!("node task failed: {}", e)))??;
    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: PathBuf) -> Result<()> {
    match RingConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Listen Address:   {}", config.listen_address());
            println!("  Neighbor Address: {}", config.neighbor_address());
            println!("  Connect Retry:    {} ms", config.ring.connect_retry_ms);
            println!("  Receive Timeout:  {} ms", config.ring.receive_timeout_ms);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Write a new configuration file
fn run_init(output: PathBuf, listen: String, neighbor: String) -> Result<()> {
    if output.exists() {
        return Err(Error::Config(format!(
            "{} already exists, refusing to overwrite",
            output.display()
        )));
    }

    let config = RingConfig::new(listen, neighbor);
    config.validate()?;

    let is_toml = output
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let content = if is_toml {
        config.to_toml()?
    } else {
        config.to_lines()?
    };

    std::fs::write(&output, content)?;
    println!("Configuration written to {}", output.display());
    Ok(())
}

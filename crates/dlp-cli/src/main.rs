//! DLP CLI - mask pipeline events and maintain denylist referentials

use anyhow::{Context, Result};
use clap::Parser;
use dlp_core::{
    CountingListener, DlpConfig, DlpProcessor, Filter, HashAlgorithm, HashFilter, JsonEvent,
};
use dlp_denylist::{BuilderJob, BuilderSettings, DenylistBuilder, FileTopic, SourceFactory};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "dlp", version)]
#[command(about = "DLP - digest-referential masking of sensitive tokens")]
struct Cli {
    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Mask denylisted tokens in JSON events read line by line from stdin
    Mask {
        /// Configuration file path
        #[arg(short, long, default_value = "config/dlp.toml")]
        config: PathBuf,
    },
    /// Replace a field of each JSON event on stdin with its digest
    Hash {
        /// Configuration file path
        #[arg(short, long, default_value = "config/dlp.toml")]
        config: PathBuf,
    },
    /// Run the denylist builder once, or on its interval with --watch
    Build {
        /// Configuration file path
        #[arg(short, long, default_value = "config/dlp.toml")]
        config: PathBuf,

        /// Keep running on the configured interval until Ctrl-C
        #[arg(short, long)]
        watch: bool,
    },
    /// Print the digest of a single value
    Digest {
        /// SHA1, SHA256, SHA512 or MD5; anything else means SHA256
        #[arg(short, long, default_value = "SHA256")]
        algorithm: String,

        /// Value to digest
        value: String,
    },
    /// Check configuration validity
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "config/dlp.toml")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Some(Commands::Mask { config }) => {
            let config = load_config(&config)?;
            let processor = DlpProcessor::with_own_cache(config.processor);
            filter_stdin(&processor)
        }
        Some(Commands::Hash { config }) => {
            let config = load_config(&config)?;
            filter_stdin(&HashFilter::new(config.hash_filter))
        }
        Some(Commands::Build { config, watch }) => {
            let config = load_config(&config)?;
            tokio::runtime::Runtime::new()
                .context("Failed to start the async runtime")?
                .block_on(build(config, watch))
        }
        Some(Commands::Digest { algorithm, value }) => {
            println!("{}", HashAlgorithm::from_name(&algorithm).digest(&value));
            Ok(())
        }
        Some(Commands::Check { config }) => {
            let config = load_config(&config)?;
            println!("Configuration OK: {}", config_summary(&config));
            Ok(())
        }
        None => {
            println!("DLP v{} - Use --help for commands", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<DlpConfig> {
    DlpConfig::load(path).with_context(|| format!("Failed to load config: {}", path.display()))
}

fn config_summary(config: &DlpConfig) -> String {
    let source = match &config.denylist.stream.spool_path {
        Some(spool) => format!("spool {}", spool.display()),
        None => format!(
            "topic {} on {}",
            config.denylist.stream.topic, config.denylist.stream.brokers
        ),
    };
    format!(
        "masking '{}' with {} from {}; building {} from {}",
        config.processor.source_field,
        config.processor.hashing_algorithm,
        config.processor.hash_path,
        config.denylist.referential_file().display(),
        source
    )
}

/// Runs `filter` over JSON events on stdin, one per line, writing each
/// result to stdout. Lines that are not JSON objects are passed through.
fn filter_stdin<F: Filter>(filter: &F) -> Result<()> {
    let stdin = io::stdin();
    let mut out = BufWriter::new(io::stdout().lock());
    let listener = CountingListener::new();
    let mut events = 0usize;
    let mut passed_through = 0usize;

    for (index, line) in stdin.lock().lines().enumerate() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        events += 1;

        match JsonEvent::from_json(&line) {
            Ok(mut event) => {
                filter.filter(std::slice::from_mut(&mut event), &listener);
                let json = event.to_json().context("Failed to serialize event")?;
                writeln!(out, "{}", json).context("Failed to write stdout")?;
            }
            Err(e) => {
                warn!("Line {} is not a JSON object, passed through: {}", index + 1, e);
                passed_through += 1;
                writeln!(out, "{}", line).context("Failed to write stdout")?;
            }
        }
    }
    out.flush().context("Failed to flush stdout")?;

    info!(
        "{}: {} events, {} inspected, {} passed through",
        filter.id(),
        events,
        listener.matched(),
        passed_through
    );
    Ok(())
}

async fn build(config: DlpConfig, watch: bool) -> Result<()> {
    let stream = &config.denylist.stream;
    match &stream.spool_path {
        Some(spool) => {
            let topic = FileTopic::new(spool, &stream.group_id);
            run_builder(topic, &config, watch).await
        }
        None => build_from_broker(&config, watch).await,
    }
}

#[cfg(feature = "kafka")]
async fn build_from_broker(config: &DlpConfig, watch: bool) -> Result<()> {
    let connector = dlp_denylist::KafkaConnector::from_config(&config.denylist.stream);
    run_builder(connector, config, watch).await
}

#[cfg(not(feature = "kafka"))]
async fn build_from_broker(_config: &DlpConfig, _watch: bool) -> Result<()> {
    anyhow::bail!(
        "denylist.stream.spool_path is not set and dlp was built without the `kafka` feature"
    )
}

async fn run_builder<F>(factory: F, config: &DlpConfig, watch: bool) -> Result<()>
where
    F: SourceFactory + 'static,
{
    let builder = DenylistBuilder::new(factory, BuilderSettings::from_config(&config.denylist));

    if !watch {
        let report = tokio::task::spawn_blocking(move || builder.run_once())
            .await
            .context("Builder task failed")?
            .context("Builder run aborted")?;
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = BuilderJob::new(builder, config.denylist.interval()).spawn(shutdown_rx);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");
    let _ = shutdown_tx.send(true);

    let summary = handle.await.context("Builder job failed")?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

//! 🚀 s3sift-cli: the front door, the bouncer, the maitre d' of s3sift.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that parses flags, loads
//! config, sets up logging, and then lets the library do the heavy lifting.
//! Like a manager. 🦆

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use s3sift::collectors::OutputFormat;
use s3sift::{Command, RunStatus};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🔎 Ask every gzipped JSON-lines object under an S3 prefix the same question.
#[derive(Debug, Parser)]
#[command(name = "s3sift", version, about)]
struct Cli {
    /// Config file (TOML). Defaults to ./s3sift.toml when it exists.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Bucket to scan. Overrides [scan].bucket.
    #[arg(long)]
    bucket: Option<String>,

    /// Key prefix to scan. Overrides [scan].prefix.
    #[arg(long)]
    prefix: Option<String>,

    /// S3 Select expression. Overrides [scan].query.
    #[arg(long)]
    query: Option<String>,

    #[command(subcommand)]
    verb: Verb,
}

#[derive(Debug, Subcommand)]
enum Verb {
    /// Print every matching record.
    Collect {
        /// ndjson or json
        #[arg(long, default_value_t = OutputFormat::Ndjson)]
        format: OutputFormat,
    },
    /// Count matching records per object and in total.
    Count,
    /// Delete every object with at least one matching record.
    Delete,
}

impl From<Verb> for Command {
    fn from(verb: Verb) -> Self {
        match verb {
            Verb::Collect { format } => Command::Collect { format },
            Verb::Count => Command::Count,
            Verb::Delete => Command::Delete,
        }
    }
}

const DEFAULT_CONFIG_FILE: &str = "s3sift.toml";

/// 🚀 main(): where it all begins. The "I pressed enter and held my breath" moment.
///
/// Exit codes: 0 clean, 2 finished with failures, 1 could not run at all.
#[tokio::main]
async fn main() -> ExitCode {
    // 📡 logs to stderr, stdout belongs to the results
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match sift(cli).await {
        Ok(RunStatus::Clean) => ExitCode::SUCCESS,
        Ok(status @ RunStatus::Degraded { failures }) => {
            error!("⚠️ scan finished with {} failures", failures);
            ExitCode::from(status.exit_code() as u8)
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one layer at a time
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
            }
            ExitCode::from(1)
        }
    }
}

async fn sift(cli: Cli) -> Result<RunStatus> {
    let the_config_file = match cli.config {
        Some(path) => {
            // 🔒 an explicit file that isn't there is a typo, not a preference
            let the_exists = path.try_exists().with_context(|| {
                format!("💀 couldn't check whether '{}' exists", path.display())
            })?;
            anyhow::ensure!(
                the_exists,
                "💀 Configuration file '{}' does not exist. Relative paths resolve against the current directory.",
                path.display()
            );
            Some(path)
        }
        None => {
            let the_default = PathBuf::from(DEFAULT_CONFIG_FILE);
            the_default.is_file().then_some(the_default)
        }
    };

    let mut app_config = s3sift::app_config::load_config(the_config_file.as_deref())
        .context("💀 couldn't load the configuration. Check the file and the S3SIFT_* variables.")?;

    if let Some(bucket) = cli.bucket {
        app_config.scan.bucket = Some(bucket);
    }
    if let Some(prefix) = cli.prefix {
        app_config.scan.prefix = prefix;
    }
    if let Some(query) = cli.query {
        app_config.scan.query = Some(query);
    }

    s3sift::run(app_config, cli.verb.into()).await
}

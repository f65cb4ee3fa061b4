use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use csvtally_config::ConfigLoader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "csvtallyctl", version)]
#[command(about = "Inspect and drive batched CSV import progress tracking")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct GlobalArgs {
    /// Config file (TOML or JSON); overrides CSVTALLY_CONFIG_PATH
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Redis connection URL; overrides REDIS_URL
    #[arg(long, global = true)]
    redis_url: Option<String>,

    /// Key namespace; overrides CSVTALLY_KEY_PREFIX
    #[arg(long, global = true)]
    key_prefix: Option<String>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start tracking an import, discarding any previous state for the id
    Init {
        import_id: String,
        #[arg(long)]
        total_rows: u64,
        #[arg(long)]
        total_batches: u64,
    },
    /// Attach descriptive metadata to an initialized import
    Meta {
        import_id: String,
        #[arg(long)]
        financer_id: Option<String>,
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long)]
        file_path: Option<String>,
        /// Additional field as KEY=VALUE; repeatable
        #[arg(long = "extra", value_parser = parse_key_val)]
        extra: Vec<(String, String)>,
    },
    /// Record one finished batch
    Report {
        import_id: String,
        #[arg(long)]
        processed: u64,
        #[arg(long, default_value_t = 0)]
        failed: u64,
        /// Batch number; repeated numbers are ignored
        #[arg(long)]
        batch_number: Option<u64>,
        /// Failure record as JSON; repeatable
        #[arg(long = "failure")]
        failures: Vec<String>,
        /// How long to wait for the completion signal after the final batch
        #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
        wait: Duration,
    },
    /// Print the current snapshot of an import
    Status { import_id: String },
    /// Delete every tracking key of an import
    Cleanup { import_id: String },
    /// Print the effective configuration without connecting
    Config,
}

fn parse_key_val(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("empty key in {raw:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let loader = ConfigLoader::new();
    let mut env = loader.gather_env();
    if let Some(path) = cli.global.config.clone() {
        env.config_path = Some(path);
    }
    if let Some(url) = cli.global.redis_url.clone() {
        env.redis_url = Some(url);
    }
    if let Some(prefix) = cli.global.key_prefix.clone() {
        env.key_prefix = Some(prefix);
    }
    let load = loader
        .load_with_env(&env)
        .context("failed to load tracker configuration")?;

    let output = commands::Output {
        pretty: cli.global.pretty,
    };

    if let Command::Config = cli.command {
        return commands::show_config(&load, output);
    }

    let mut session = commands::Session::connect(&load.config)
        .await
        .with_context(|| {
            format!("failed to connect to Redis at {}", load.config.redis.url)
        })?;

    match cli.command {
        Command::Init {
            import_id,
            total_rows,
            total_batches,
        } => {
            session
                .init(&import_id, total_rows, total_batches, output)
                .await
        }
        Command::Meta {
            import_id,
            financer_id,
            user_id,
            file_path,
            extra,
        } => {
            let metadata = csvtally_core::model::ImportMetadata {
                financer_id,
                user_id,
                file_path,
                extra: extra.into_iter().collect(),
            };
            session.meta(&import_id, &metadata, output).await
        }
        Command::Report {
            import_id,
            processed,
            failed,
            batch_number,
            failures,
            wait,
        } => {
            let report = commands::build_report(
                processed,
                failed,
                batch_number,
                &failures,
            )?;
            session.report(&import_id, &report, wait, output).await
        }
        Command::Status { import_id } => session.status(&import_id, output).await,
        Command::Cleanup { import_id } => {
            session.cleanup(&import_id, output).await
        }
        Command::Config => Ok(()),
    }
}

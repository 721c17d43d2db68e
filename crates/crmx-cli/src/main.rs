//! 🚀 crmx-cli: the front door. Parses flags, loads config, wires up logging,
//! then hands the wheel to `crmx::run` and reports how it went.
//!
//! 🦆 The duck rides in the sidecar.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crmx::pipelines::{Command, RunOptions};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// 🚚 Migrate clients, services, invoices and PPPoE credentials between two CRM instances.
#[derive(Debug, Parser)]
#[command(name = "crmx", version, about)]
struct Cli {
    /// TOML config file. Skipped if it doesn't exist; CRMX_* env vars still apply.
    #[arg(long, global = true, env = "CRMX_CONFIG", default_value = "crmx.toml")]
    config: PathBuf,

    /// Log every record, not just checkpoints.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Import clients and their services from the legacy CSV export.
    Clients {
        #[arg(long)]
        csv: PathBuf,
        #[command(flatten)]
        run: RunFlags,
    },
    /// Print the destination service plan catalog.
    ListPlans,
    /// Export service plans and client services from the source.
    ExportServices {
        /// Don't export `/service-plans`.
        #[arg(long)]
        skip_plans: bool,
        #[command(flatten)]
        run: RunFlags,
    },
    /// Export invoices from the source and import them with their payments.
    Invoices {
        /// Write the export snapshot and stop.
        #[arg(long)]
        export_only: bool,
        /// Import from a previously written snapshot instead of the source.
        #[arg(long, value_name = "FILE")]
        import_from: Option<PathBuf>,
        #[command(flatten)]
        run: RunFlags,
    },
    /// Copy PPPoE usernames from source clients onto destination services.
    Pppoe {
        #[command(flatten)]
        run: RunFlags,
    },
}

#[derive(Debug, Clone, Default, Args)]
struct RunFlags {
    /// Small batch only.
    #[arg(long)]
    test: bool,
    /// Process at most this many records. Wins over --test.
    #[arg(long)]
    limit: Option<usize>,
    /// Start offset for source exports.
    #[arg(long, default_value_t = 0)]
    offset: usize,
    /// Skip this many records of the processing list.
    #[arg(long, default_value_t = 0)]
    resume_from: usize,
    /// Compute and report, write nothing.
    #[arg(long)]
    dry_run: bool,
}

impl From<RunFlags> for RunOptions {
    fn from(flags: RunFlags) -> Self {
        RunOptions {
            test: flags.test,
            limit: flags.limit,
            offset: flags.offset,
            resume_from: flags.resume_from,
            dry_run: flags.dry_run,
        }
    }
}

impl CliCommand {
    fn into_parts(self) -> (Command, RunOptions) {
        match self {
            CliCommand::Clients { csv, run } => (Command::Clients { csv }, run.into()),
            CliCommand::ListPlans => (Command::ListPlans, RunOptions::default()),
            CliCommand::ExportServices { skip_plans, run } => {
                (Command::ExportServices { skip_plans }, run.into())
            }
            CliCommand::Invoices {
                export_only,
                import_from,
                run,
            } => (
                Command::Invoices {
                    export_only,
                    import_from,
                },
                run.into(),
            ),
            CliCommand::Pppoe { run } => (Command::Pppoe, run.into()),
        }
    }
}

/// 📡 stderr for humans, plus a plain-text copy under the artifacts dir.
fn init_tracing(verbose: bool, log_file: &std::path::Path) -> Result<()> {
    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("💀 Couldn't create log directory '{}'", parent.display()))?;
    }
    let file = File::create(log_file)
        .with_context(|| format!("💀 Couldn't create log file '{}'", log_file.display()))?;
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .init();
    Ok(())
}

/// 🕵️ Does any layer of the error smell like the CRM simply isn't answering?
fn looks_like_connectivity(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        let cause = cause.to_string();
        cause.contains("connection failed")
            || cause.contains("Cannot connect")
            || cause.contains("error sending request")
            || cause.contains("dns error")
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 🔒 A missing file is fine, env vars can carry everything
    let config_file = cli
        .config
        .try_exists()
        .with_context(|| {
            format!(
                "💀 Couldn't check whether the config file exists. Was checking here: '{}'",
                cli.config.display()
            )
        })?
        .then_some(cli.config.as_path());
    let app_config = crmx::app_config::load_config(config_file)
        .context("💀 Couldn't load the config. Check the TOML file and the CRMX_* variables")?;

    let (command, options) = cli.command.into_parts();
    let log_file = app_config.runtime.artifacts_dir.join(format!(
        "{}_{}.log",
        command.name(),
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    init_tracing(cli.verbose, &log_file)?;
    info!("🚀 {} starting, logging to {}", command.name(), log_file.display());

    if let Err(err) = crmx::run(app_config, command, options).await {
        error!("💀 error: {}", err);
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
        }
        if looks_like_connectivity(&err) {
            error!(
                "🔧 hint: a CRM isn't answering. Check base_url and token for both \
                 instances (CRMX_SOURCE__BASE_URL, CRMX_DESTINATION__BASE_URL and the \
                 matching __TOKEN variables), and that the host is reachable from here."
            );
        }
        std::process::exit(1);
    }
    Ok(())
}

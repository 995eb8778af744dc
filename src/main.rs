use std::{env, path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use datahygiene::{
    config::{Settings, resolve_settings_path},
    jira::JiraClient,
    run::Orchestrator,
    sendgrid::SendGridClient,
};

#[derive(Parser, Debug)]
#[command(name = "datahygiene")]
#[command(about = "Email Jira assignees a digest of issues caught by data hygiene filters")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to appsettings.json beside the binary or in the working directory)
    #[arg(short, long, env = "DATAHYGIENE_CONFIG")]
    config: Option<PathBuf>,

    /// Redirect every email to the configured dry-run recipient and post no comments
    #[arg(long)]
    dry_run: bool,

    /// Log output format (compact, json)
    #[arg(long, env = "DATAHYGIENE_LOG_FORMAT", default_value = "compact")]
    log_format: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_format);

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(err) => {
            error!("{err:#}");
            return ExitCode::FAILURE;
        }
    };

    match execute(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let path = resolve_settings_path(cli.config.as_deref())?;
    let mut settings =
        Settings::load(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    if cli.dry_run {
        settings.send_grid.dry_run = true;
        settings.validate()?;
    }
    Ok(settings)
}

fn execute(settings: &Settings) -> Result<()> {
    let jira = JiraClient::new(&settings.jira).context("Failed to build Jira client")?;
    let sendgrid =
        SendGridClient::new(&settings.send_grid).context("Failed to build SendGrid client")?;

    let report = Orchestrator::new(settings, &jira, &sendgrid).run();
    let failures = report.stats.email_failures + report.stats.comment_failures;
    if failures > 0 {
        warn!(
            emails = report.stats.email_failures,
            comments = report.stats.comment_failures,
            "Run finished with failures"
        );
    }
    Ok(())
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_env("DATAHYGIENE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "datahygiene=debug,info"
        } else {
            "datahygiene=info,warn"
        })
    });

    let registry = tracing_subscriber::registry().with(filter);

    match format {
        "json" => {
            registry.with(fmt::layer().json().with_ansi(false)).init();
        }
        _ => {
            registry.with(fmt::layer().compact()).init();
        }
    }
}

use anyhow::Result;
use bookshelf_monitor::application::*;
use bookshelf_monitor::monitoring::HealthStatus;
use bookshelf_monitor::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bookshelf-monitor")]
#[command(about = "Health checks, metrics, alerts and a live dashboard for the bookshelf review service")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override its values
    #[arg(long, short, env = "BOOKSHELF_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the monitoring dashboard and API (default)
    Serve,
    /// Run one health check and print it as JSON
    Health,
    /// Collect one metrics snapshot and print it as JSON
    Metrics,
    /// Print a configuration file with every default spelled out
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Some(Commands::InitConfig)) {
        print!("{}", Config::sample_toml()?);
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    init_logging(&config.log_level);

    // Initialize application
    let app = Application::new(config)?;
    app.initialize().await?;

    // Route commands to appropriate handlers
    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let handler = ServerCommandHandler::new(app.lifecycle.clone());
            handler.start_http().await
        }
        Commands::Health => {
            let handler = HealthCommandHandler::new(app.container.clone());
            let status = handler.run_health_check().await?;
            app.shutdown().await?;
            if status == HealthStatus::Unhealthy {
                std::process::exit(1);
            }
            return Ok(());
        }
        Commands::Metrics => {
            let handler = MetricsCommandHandler::new(app.container.clone());
            handler.collect().await
        }
        Commands::InitConfig => Ok(()),
    };

    app.shutdown().await?;
    result
}

/// `RUST_LOG` wins over the configured level; `LOG_FORMAT=json` switches to JSON lines.
fn init_logging(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_level.into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    // Logs go to stderr so the one-shot commands can pipe their JSON.
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

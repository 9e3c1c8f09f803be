use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use forge_mcp::config::Config;
use forge_mcp::forge::ForgeHttpClient;
use forge_mcp::resource::{Credentials, RestExecutor};
use forge_mcp::transport::{http, stdio, McpServer};
use forge_mcp::Gateway;

/// MCP gateway for the Laravel Forge API
#[derive(Parser, Debug)]
#[command(name = "forge-mcp", version, about, long_about = None)]
struct Args {
    /// Log level for debugging (RUST_LOG overrides)
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    log_stderr: bool,

    /// Forge API base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve one client over stdin/stdout (default)
    Stdio,
    /// Serve many clients over HTTP
    Http {
        /// Address to listen on
        #[arg(long)]
        bind: Option<String>,
    },
    /// Manage the local configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Store the Forge API token used by the stdio transport
    SetToken { token: String },
    /// Print the effective configuration
    Show,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

/// Stdout belongs to the protocol: logs go to a file or stderr
fn setup_logging(
    level: LogLevel,
    to_stderr: bool,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = match (std::env::var("RUST_LOG").ok(), level.to_tracing_level()) {
        (Some(directives), _) => EnvFilter::new(directives),
        (None, Some(level)) => EnvFilter::new(level.as_str().to_lowercase()),
        (None, None) => return Ok(None),
    };

    let (non_blocking, guard) = if to_stderr {
        tracing_appender::non_blocking(std::io::stderr())
    } else {
        let log_path = get_log_path();
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {:?}", parent))?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file {:?}", log_path))?;
        tracing_appender::non_blocking(file)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("forge-mcp {} started with log level: {:?}", env!("CARGO_PKG_VERSION"), level);
    if !to_stderr {
        tracing::info!("Log file: {:?}", get_log_path());
    }

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("forge-mcp").join("forge-mcp.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".forge-mcp").join("forge-mcp.log");
    }
    PathBuf::from("forge-mcp.log")
}

fn build_gateway(config: &Config) -> Result<Arc<Gateway>> {
    let http = ForgeHttpClient::new()?;
    let executor = Arc::new(RestExecutor::new(http, &config.base_url));
    Ok(Arc::new(Gateway::new(executor, config.gateway_settings())))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level, args.log_stderr)?;

    match args.command.unwrap_or(Command::Stdio) {
        Command::Config { action } => match action {
            ConfigCommand::SetToken { token } => {
                let mut config = Config::load();
                config.set_token(&token)?;
                if let Some(path) = Config::config_path() {
                    println!("Token saved to {}", path.display());
                }
            }
            ConfigCommand::Show => {
                let config = Config::resolve(args.base_url.as_deref())?;
                println!("{}", config.display());
            }
        },
        Command::Stdio => {
            let config = Config::resolve(args.base_url.as_deref())?;
            if config.token().is_empty() {
                tracing::warn!("No API token configured; tool calls will fail until one is set");
            }
            let server = Arc::new(McpServer::new(build_gateway(&config)?));
            stdio::serve_stdio(server, Credentials::new(config.token())).await?;
        }
        Command::Http { bind } => {
            let config = Config::resolve(args.base_url.as_deref())?;
            let bind = config.bind_addr(bind.as_deref())?;
            http::serve(bind, build_gateway(&config)?, config.session_idle()).await?;
        }
    }

    Ok(())
}

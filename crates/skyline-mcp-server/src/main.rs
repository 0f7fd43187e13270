use std::path::PathBuf;
use std::process::ExitCode;

use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{ArgAction, Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use skyline_mcp_server::config::{self, AuthMode, LogFormat, LogLevel, ServerConfig};
use skyline_mcp_server::crypto::StoreKey;
use skyline_mcp_server::errors::GatewayError;
use skyline_mcp_server::server::{self, Gateway};
use skyline_mcp_server::session::mcp::ProfileMcpHandler;
use skyline_mcp_server::session::stdio;
use skyline_mcp_server::store::ProfileStore;

/// Environment variable holding the store encryption key.
const KEY_ENV_DEFAULT: &str = "SKYLINE_PROFILES_KEY";

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Debug, Parser)]
#[command(
    styles = STYLES,
    about = "Skyline MCP - expose any API as tools for AI agents",
    disable_version_flag = true,
)]
struct Args {
    /// Transport to serve on
    #[arg(long, value_enum, default_value_t = TransportArg::Http)]
    transport: TransportArg,

    /// Address and port to bind the HTTP server to
    #[arg(long)]
    bind: Option<std::net::SocketAddr>,

    /// Path of the encrypted profile store
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Path of the server config YAML
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bearer-token enforcement mode
    #[arg(long, value_enum)]
    auth_mode: Option<AuthModeArg>,

    /// Name of the environment variable holding the store key
    #[arg(long, default_value = KEY_ENV_DEFAULT)]
    key_env: String,

    /// Store key given directly (raw, base64, or hex)
    #[arg(long)]
    key: Option<String>,

    /// Load additional environment variables from this file
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Check that the store file decrypts with the configured key, then exit
    #[arg(long)]
    validate: bool,

    /// Create an empty encrypted store file, then exit
    #[arg(long)]
    init_profiles: bool,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormatArg>,

    /// Log level
    #[arg(long, value_enum)]
    log_level: Option<LogLevelArg>,

    /// Print version information
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportArg {
    Http,
    Stdio,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AuthModeArg {
    None,
    Bearer,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevelArg {
    Debug,
    Info,
    Warn,
    Error,
}

/// Exit codes for `--validate` / `--init-profiles`.
const EXIT_OK: u8 = 0;
const EXIT_FILE_CONFLICT: u8 = 1;
const EXIT_KEY_ERROR: u8 = 2;
const EXIT_DATA_ERROR: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(env_file) = &args.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            eprintln!("failed to load env file {}: {e}", env_file.display());
            return ExitCode::from(EXIT_FILE_CONFLICT);
        }
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::from(EXIT_DATA_ERROR);
        }
    };

    setup_logging(&config, args.transport);

    let key = match resolve_key(&args) {
        Ok(key) => key,
        Err(message) => {
            error!("{message}");
            return ExitCode::from(EXIT_KEY_ERROR);
        }
    };

    if args.init_profiles {
        return match ProfileStore::init(&config.storage, &key).await {
            Ok(()) => {
                info!(path = %config.storage.display(), "profile store initialised");
                ExitCode::from(EXIT_OK)
            }
            Err(GatewayError::BadArguments(message)) => {
                error!("{message}");
                ExitCode::from(EXIT_FILE_CONFLICT)
            }
            Err(e) => {
                error!("failed to initialise store: {e}");
                ExitCode::from(EXIT_DATA_ERROR)
            }
        };
    }

    if args.validate {
        return match ProfileStore::validate(&config.storage, &key).await {
            Ok(count) => {
                info!(profiles = count, "store validated");
                ExitCode::from(EXIT_OK)
            }
            Err(GatewayError::BadArguments(message)) => {
                error!("{message}");
                ExitCode::from(EXIT_FILE_CONFLICT)
            }
            Err(e) => {
                error!("store validation failed: {e}");
                ExitCode::from(EXIT_DATA_ERROR)
            }
        };
    }

    info!(
        "Skyline MCP v{} starting ({} transport)",
        env!("CARGO_PKG_VERSION"),
        match args.transport {
            TransportArg::Http => "http",
            TransportArg::Stdio => "stdio",
        }
    );

    let gateway = match Gateway::builder().config(config).key(key).build().await {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("startup failed: {e}");
            return ExitCode::from(EXIT_DATA_ERROR);
        }
    };

    let outcome = match args.transport {
        TransportArg::Http => server::serve(gateway).await,
        TransportArg::Stdio => serve_stdio(gateway).await,
    };
    match outcome {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(e) => {
            error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn serve_stdio(gateway: std::sync::Arc<Gateway>) -> Result<(), GatewayError> {
    let profile = server::stdio_profile(&gateway).await?;
    let entry = gateway.cache.get_or_build(&profile).await?;
    let handler = ProfileMcpHandler::new(
        profile.name.clone(),
        entry,
        gateway.hooks.clone(),
        gateway.tracker.clone(),
    );
    stdio::serve(handler).await
}

fn load_config(args: &Args) -> Result<ServerConfig, figment::Error> {
    let mut config = match &args.config {
        Some(path) => config::read_config(path)?,
        None => config::read_config_from_env()?,
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(storage) = &args.storage {
        config.storage = storage.clone();
    }
    if let Some(auth_mode) = args.auth_mode {
        config.auth_mode = match auth_mode {
            AuthModeArg::None => AuthMode::None,
            AuthModeArg::Bearer => AuthMode::Bearer,
        };
    }
    if let Some(format) = args.log_format {
        config.logging.format = match format {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        };
    }
    if let Some(level) = args.log_level {
        config.logging.level = match level {
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Error => LogLevel::Error,
        };
    }
    Ok(config)
}

fn resolve_key(args: &Args) -> Result<StoreKey, String> {
    let raw = match &args.key {
        Some(key) => key.clone(),
        None => std::env::var(&args.key_env).map_err(|_| {
            format!(
                "no store key: set {} or pass --key",
                args.key_env
            )
        })?,
    };
    StoreKey::parse(&raw).map_err(|e| e.to_string())
}

/// Stdio transport logs to stderr since stdout carries MCP messages.
fn setup_logging(config: &ServerConfig, transport: TransportArg) {
    let level: tracing::Level = config.logging.level.into();
    let env_filter = EnvFilter::from_default_env().add_directive(level.into());
    let to_stderr = transport == TransportArg::Stdio;

    match (config.logging.format, to_stderr) {
        (LogFormat::Json, true) => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init(),
        (LogFormat::Json, false) => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .init(),
        (LogFormat::Text, true) => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
            .init(),
        (LogFormat::Text, false) => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_ansi(true)
            .with_target(false)
            .init(),
    }
}

//! crm-access server
//!
//! Module-scoped role-based authorization and workspace membership over HTTP.

use clap::Parser;
use crm_access::{
    config::{LogFormat, load_config},
    store::Stores,
    transport::{DEFAULT_HTTP_PORT, HttpConfig, serve},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// crm-access - Module-scoped RBAC and workspace membership service
#[derive(Parser, Debug)]
#[command(name = "crm-access")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "CRM_ACCESS_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "CRM_ACCESS_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format; overrides the config file
    #[arg(long, env = "CRM_ACCESS_LOG_FORMAT", value_enum)]
    log_format: Option<LogFormat>,

    /// HTTP server host; overrides the config file
    #[arg(long, env = "CRM_ACCESS_HOST")]
    host: Option<String>,

    /// HTTP server port; overrides the config file
    #[arg(long, env = "CRM_ACCESS_PORT")]
    port: Option<u16>,
}

fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Loaded before logging so the file can set the level
    let mut config = load_config(args.config.as_deref())?;

    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    init_logging(&config.logging.level, config.logging.format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        default_port = DEFAULT_HTTP_PORT,
        "Starting crm-access"
    );

    let app = crm_access::build(&config, Stores::in_memory())
        .await
        .inspect_err(|e| error!(error = %e, "Failed to build application"))?;

    let http_config = HttpConfig::from_host_port(&config.server.host, config.server.port)
        .inspect_err(|e| error!(error = %e, "Invalid bind address"))?
        .with_port_fallback(config.server.port_fallback);

    serve(app.router, http_config, CancellationToken::new()).await
}

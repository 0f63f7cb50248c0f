//! Market data proxy - Main Entry Point

use anyhow::Result;
use clap::{Arg, Command};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use market_proxy::{ProxyConfig, start_server};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "market_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let matches = Command::new("market-proxy")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Caching, rate-limited proxy for a crypto market data API")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("market-proxy.toml"),
        )
        .arg(
            Arg::new("routes")
                .long("routes")
                .help("Print available routes and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if matches.get_flag("routes") {
        market_proxy::server::print_routes();
        return Ok(());
    }

    let default_config = "market-proxy.toml".to_string();
    let config_path = matches
        .get_one::<String>("config")
        .unwrap_or(&default_config);
    let config = match ProxyConfig::load(config_path) {
        Ok(config) => {
            info!("Loaded configuration (file: {})", config_path);
            config
        }
        Err(e) => {
            error!("Failed to load config from {}: {}", config_path, e);
            info!("Using default configuration");
            ProxyConfig::default()
        }
    };

    info!(
        "Starting market proxy v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!("Server will bind to: {}", config.server_address());
    info!("Upstream API: {}", config.upstream.base_url);
    info!("Cache TTL: {} seconds", config.cache.default_ttl_seconds);
    info!(
        "Rate limit: {} requests per {} seconds (enabled: {})",
        config.rate_limiting.max_requests,
        config.rate_limiting.window_seconds,
        config.rate_limiting.enabled
    );
    info!("Fan-out merge strategy: {:?}", config.fanout.merge_strategy);

    if let Err(e) = start_server(config).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

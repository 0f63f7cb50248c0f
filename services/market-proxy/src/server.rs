//! Market proxy server implementation

use anyhow::Result;
use axum::{Router, http::Uri, middleware, routing::get};
use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::task::JoinHandle;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    cache::ResponseCache,
    clock::{Clock, SystemClock},
    config::ProxyConfig,
    errors::{ProxyError, ProxyResult},
    fanout::CurrencyFanoutMerger,
    handlers::{health_check, list_markets, passthrough, search},
    middleware::{
        RateLimitState, create_cors_layer, logging_middleware, rate_limit_middleware,
        timeout_middleware,
    },
    rate_limiter::RateLimiter,
    upstream::UpstreamClient,
};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<UpstreamClient>,
    pub cache: Arc<ResponseCache>,
    pub fanout: Arc<CurrencyFanoutMerger>,
    pub start_time: Instant,
}

/// Market data proxy server
pub struct ProxyServer {
    config: ProxyConfig,
    state: AppState,
    limiter: Arc<RateLimiter>,
}

impl ProxyServer {
    /// Create a new proxy server using the system clock
    pub fn new(config: ProxyConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a new proxy server whose cache and rate limiter read `clock`
    pub fn with_clock(config: ProxyConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        info!("Initializing market proxy server");

        let upstream = Arc::new(UpstreamClient::new(&config.upstream)?);
        let cache = Arc::new(ResponseCache::new(&config.cache, Arc::clone(&clock)));
        let fanout = Arc::new(CurrencyFanoutMerger::new(
            Arc::clone(&upstream),
            config.fanout.merge_strategy,
        ));
        let limiter = Arc::new(RateLimiter::new(config.rate_limiting.clone(), clock));

        if !upstream.has_api_key() {
            info!("No upstream API key configured, using public rate limits");
        }

        Ok(Self {
            config,
            state: AppState {
                upstream,
                cache,
                fanout,
                start_time: Instant::now(),
            },
            limiter,
        })
    }

    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Start the server and run until Ctrl-C
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self.config.server_address().parse().map_err(|e| {
            error!(
                "Invalid server address '{}': {}",
                self.config.server_address(),
                e
            );
            anyhow::anyhow!("Invalid server address: {}", e)
        })?;

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind TCP listener to {}: {}", addr, e);
            anyhow::anyhow!("Failed to bind to address {}: {}", addr, e)
        })?;

        let housekeeping = self.spawn_housekeeping();
        let app = self.router();

        info!("Market proxy listening on http://{}", addr);

        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        housekeeping.abort();

        if let Err(e) = served {
            error!("Server encountered a fatal error: {}", e);
            return Err(anyhow::anyhow!("Server error: {}", e));
        }

        info!("Market proxy stopped");
        Ok(())
    }

    /// Periodic cache sweep and idle rate-window collection
    pub fn spawn_housekeeping(&self) -> JoinHandle<()> {
        let cache = Arc::clone(&self.state.cache);
        let limiter = Arc::clone(&self.limiter);
        let interval = Duration::from_secs(self.config.cache.sweep_interval_seconds.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let swept = cache.sweep();
                let idle = limiter.cleanup_idle();
                if swept > 0 || idle > 0 {
                    info!(
                        swept_entries = swept,
                        idle_clients = idle,
                        "Housekeeping pass completed"
                    );
                }
            }
        })
    }

    /// Build the request dispatcher.
    ///
    /// Route priority: market listing, search, generic `/api/*` passthrough.
    /// `/health` sits outside the rate limiter.
    pub fn router(&self) -> Router {
        let rate_limit_state = RateLimitState {
            limiter: Arc::clone(&self.limiter),
        };

        let api = Router::new()
            .route("/api/coins/markets", get(list_markets))
            .route("/api/search", get(search))
            .route("/api/*path", get(passthrough))
            .route_layer(middleware::from_fn_with_state(
                rate_limit_state,
                rate_limit_middleware,
            ));

        let mut app = Router::new()
            .route("/health", get(health_check))
            .merge(api)
            .fallback(not_found)
            .with_state(self.state.clone())
            .layer(middleware::from_fn_with_state(
                Duration::from_secs(self.config.server.timeout_seconds.max(1)),
                timeout_middleware,
            ))
            .layer(middleware::from_fn(logging_middleware))
            .layer(TraceLayer::new_for_http());

        if self.config.server.compression {
            app = app.layer(CompressionLayer::new());
        }
        if self.config.cors.enabled {
            app = app.layer(create_cors_layer(&self.config.cors));
        }

        app
    }
}

async fn not_found(uri: Uri) -> ProxyResult<()> {
    Err(ProxyError::NotFound(format!("No route for {}", uri.path())))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// API route documentation
pub fn print_routes() {
    println!("Market Proxy Routes:");
    println!("====================");
    println!();
    println!("  GET /health                                  - Liveness check");
    println!("  GET /api/coins/markets?vs_currency=<c>&...   - Market listing, one currency");
    println!("  GET /api/coins/markets?vs_currencies=<c,c>&. - Market listing, merged per currency");
    println!("  GET /api/search?query=<text>                 - Asset search");
    println!("  GET /api/*                                   - Passthrough to the upstream API");
    println!();
    println!("All /api routes are cached and rate limited per client.");
}

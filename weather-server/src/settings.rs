use anyhow::Context;
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{info, warn};
use weather_core::{
    CacheStore, CachedConfigProvider, ConfigProvider, FileConfigProvider, Resolver,
    VisualCrossingProvider,
    cache::{self, RedisTimeouts},
    config::DEFAULT_CONFIG_PATH,
    provider::visualcrossing::DEFAULT_BASE_URL,
};

use crate::{AppState, build_router};

/// Process settings, from flags or the environment.
#[derive(Debug, Parser)]
#[command(name = "weather-server", version, about = "Cached current-weather lookup over HTTP")]
pub struct Settings {
    /// Address to listen on.
    #[arg(long, env = "WEATHER_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Cache store URL. `memory://` keeps entries in this process.
    #[arg(long, env = "WEATHER_CACHE_URL", default_value = "redis://localhost:6379")]
    pub cache_url: String,

    /// JSON file holding `{"OpenWeatherApiKey": "..."}`.
    #[arg(long, env = "WEATHER_API_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub api_config: PathBuf,

    /// Base URL of the Visual Crossing API.
    #[arg(long, env = "WEATHER_UPSTREAM_URL", default_value = DEFAULT_BASE_URL)]
    pub upstream_url: String,

    /// Read the API config once instead of before every upstream fetch.
    #[arg(long, env = "WEATHER_CACHE_CONFIG")]
    pub cache_config: bool,

    /// Milliseconds allowed for connecting to the cache store.
    #[arg(long, env = "WEATHER_CACHE_CONNECT_TIMEOUT_MS", default_value_t = 5000)]
    pub cache_connect_timeout_ms: u64,

    /// Milliseconds allowed for a single cache store command.
    #[arg(long, env = "WEATHER_CACHE_RESPONSE_TIMEOUT_MS", default_value_t = 3000)]
    pub cache_response_timeout_ms: u64,
}

impl Settings {
    /// Connect the cache store named by `--cache-url`, then [`Settings::serve`].
    pub async fn run(self) -> anyhow::Result<()> {
        info!("Starting weather server...");

        let store = cache::store_from_url(&self.cache_url, self.cache_timeouts())
            .await
            .with_context(|| format!("Could not connect to cache store at {}", self.cache_url))?;

        self.serve(store).await
    }

    /// Refuse to start unless `store` answers a ping, then serve until shutdown.
    pub async fn serve(self, store: Arc<dyn CacheStore>) -> anyhow::Result<()> {
        store
            .ping()
            .await
            .with_context(|| format!("Cache store at {} did not answer PING", self.cache_url))?;
        info!(cache_url = %self.cache_url, "cache store is reachable");

        let resolver = self.resolver(store);
        let router = build_router(AppState::new(resolver));

        let listener = TcpListener::bind(self.listen)
            .await
            .with_context(|| format!("Failed to bind {}", self.listen))?;
        info!("HTTP server listening on http://{}", self.listen);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server failed")?;

        info!("Server shutdown complete");
        Ok(())
    }

    pub fn cache_timeouts(&self) -> RedisTimeouts {
        RedisTimeouts {
            connection: Duration::from_millis(self.cache_connect_timeout_ms),
            response: Duration::from_millis(self.cache_response_timeout_ms),
        }
    }

    /// Compose the resolver from its collaborators.
    pub fn resolver(&self, store: Arc<dyn CacheStore>) -> Resolver {
        let file = FileConfigProvider::new(&self.api_config);
        let config: Arc<dyn ConfigProvider> = if self.cache_config {
            Arc::new(CachedConfigProvider::new(file))
        } else {
            Arc::new(file)
        };
        let provider = Arc::new(VisualCrossingProvider::with_base_url(self.upstream_url.clone()));

        Resolver::new(store, config, provider)
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("Failed to install signal handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}

use std::sync::Arc;

use gateway::config::Config;
use gateway::fetcher::HttpFetcher;
use gateway::shared_cache::RedisSharedCache;
use gateway::{build_router, AppState};
use gateway_core::{Fetcher, NoopSharedCache, SharedCache};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    gateway::telemetry::init(&config);

    tracing::info!(
        services = ?config.services.names(),
        cors_enabled = config.cors_enabled,
        "starting gateway"
    );

    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(config.services.clone()));
    let shared_cache: Arc<dyn SharedCache> = match &config.redis_url {
        Some(url) if config.redis_cluster => {
            let connection = RedisSharedCache::connect_cluster(
                &[url.clone()],
                config.redis_connect_timeout,
                config.redis_timeout_get,
                config.redis_timeout_set,
            )
            .await?;
            Arc::new(connection)
        }
        Some(url) => {
            let connection = RedisSharedCache::connect(
                url,
                config.redis_connect_timeout,
                config.redis_timeout_get,
                config.redis_timeout_set,
            )
            .await?;
            Arc::new(connection)
        }
        None => {
            tracing::warn!("no REDIS_URL configured, shared cache is disabled");
            Arc::new(NoopSharedCache)
        }
    };

    let state = AppState {
        registry: Arc::new(config.services.clone()),
        fetcher,
        shared_cache,
        cors_enabled: config.cors_enabled,
        reference_fetch_timeout: config.reference_fetch_timeout,
        reference_max_level: config.reference_max_level,
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}

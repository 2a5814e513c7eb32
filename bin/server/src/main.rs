use medislot_access::{InMemoryRateLimiter, RateLimitStore, RetryingRoleStore, RoleResolver};
use medislot_server::{
    app,
    auth::{self, LoginState, OidcClient, OidcError},
    config::{RateLimitBackend, ServerConfig},
    db::{Database, PgRateLimitStore, PgRoleStore},
    state::AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Reasons the server can fail to start or stop cleanly.
#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error("failed to connect to database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to initialize OIDC: {0}")]
    Oidc(#[from] OidcError),
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!("loaded configuration");

    let db = Database::connect(&config.database).await?;
    tracing::info!("connected to database");

    tracing::info!("discovering OIDC provider");
    let oidc_client = OidcClient::discover(config.oidc).await?;
    let session_verifier = Arc::new(oidc_client.session_verifier());

    let role_store = RetryingRoleStore::new(
        Arc::new(PgRoleStore::new(db.pool())),
        config.role_store,
    );
    let resolver = RoleResolver::new(session_verifier, role_store);
    tracing::info!(?resolver, "role resolver ready");

    let purge_every = Duration::from_secs(config.rate_limit.purge_interval_seconds);
    let max_window = config.rate_limit.role_lookup.window();
    let rate_limits: Arc<dyn RateLimitStore> = match config.rate_limit.backend {
        RateLimitBackend::Memory => {
            let limiter = InMemoryRateLimiter::new();
            spawn_purge(purge_every, {
                let limiter = limiter.clone();
                move || {
                    let limiter = limiter.clone();
                    async move {
                        let purged = limiter.purge_expired();
                        if purged > 0 {
                            tracing::debug!(purged, "purged expired rate-limit buckets");
                        }
                    }
                }
            });
            Arc::new(limiter)
        }
        RateLimitBackend::Postgres => {
            let store = Arc::new(PgRateLimitStore::new(db.pool()));
            spawn_purge(purge_every, {
                let store = store.clone();
                move || {
                    let store = store.clone();
                    async move {
                        match store.purge_expired(max_window).await {
                            Ok(purged) if purged > 0 => {
                                tracing::debug!(purged, "purged expired rate-limit buckets");
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to purge rate-limit buckets");
                            }
                        }
                    }
                }
            });
            store
        }
    };
    tracing::info!(backend = ?config.rate_limit.backend, "rate limiting ready");

    let state = Arc::new(AppState::new(
        resolver,
        rate_limits,
        config.rate_limit.role_lookup,
        config.security,
    ));
    let login = Arc::new(LoginState {
        oidc_client,
        session_config: config.session,
    });

    let router = app::with_common_layers(
        app::api_router(state).merge(auth::routes::router(login)),
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server drained, shutting down");
    db.close().await;
    Ok(())
}

/// Runs `purge` every `every` for the life of the process.
fn spawn_purge<F, Fut>(every: Duration, purge: F)
where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            purge().await;
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutdown signal received");
}

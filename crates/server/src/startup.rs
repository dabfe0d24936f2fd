use std::{future::Future, net::SocketAddr, sync::Arc};

use axum::Router;
use configs::{AppConfig, StorageBackend};
use migration::MigratorTrait;
use service::clock::SystemClock;
use service::notify::{EventPublisher, LogNotificationSink, NotificationSink};
use service::repo::SeaOrmNotificationSink;
use service::{AppContext, MarketSettings};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::auth::{ServerAuthConfig, ServerState};
use crate::errors::StartupError;
use crate::routes;

fn build_cors() -> CorsLayer {
    CorsLayer::very_permissive()
}

/// Router over an already wired context.
pub fn build_app(ctx: AppContext, jwt_secret: impl Into<String>) -> Router {
    let state = ServerState { ctx, auth: ServerAuthConfig { jwt_secret: jwt_secret.into() } };
    routes::build_router(state, build_cors())
}

/// Listen address from the `[server]` section.
pub fn bind_addr(cfg: &AppConfig) -> Result<SocketAddr, StartupError> {
    format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .map_err(|e| StartupError::InvalidConfig(format!("server address: {e}")))
}

/// Serve on `listener` until `shutdown` resolves, then drain background tasks.
pub async fn serve<F>(cfg: AppConfig, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (publisher, rx) = EventPublisher::channel();
    let settings = MarketSettings::from(&cfg.market);
    let clock = Arc::new(SystemClock);

    let (ctx, sink) = match cfg.database.backend {
        StorageBackend::Memory => {
            info!(backend = "memory", "using in-memory storage");
            let sink: Arc<dyn NotificationSink> = Arc::new(LogNotificationSink);
            (AppContext::in_memory(clock, publisher, settings), sink)
        }
        StorageBackend::Postgres => {
            let db = models::db::connect_with_config(&cfg.database).await?;
            migration::Migrator::up(&db, None).await?;
            info!(backend = "postgres", "database migrated");
            let sink: Arc<dyn NotificationSink> = Arc::new(SeaOrmNotificationSink { db: db.clone() });
            (AppContext::postgres(db, clock, publisher, settings), sink)
        }
    };
    let background = ctx.start_background(rx, sink);

    let app = build_app(ctx, cfg.auth.jwt_secret.clone());
    let addr = listener.local_addr()?;
    info!(%addr, event = "listening", "marketplace server listening");
    let served = axum::serve(listener, app).with_graceful_shutdown(shutdown).await;

    background.shutdown().await;
    info!(event = "stopped", "background tasks drained");
    served?;
    Ok(())
}

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};

use configurator_api as api;
use api::{
    repositories::{SeaOrmAuditStore, SeaOrmDesignStore},
    security::SecurityManager,
    services::commerce::{
        pricing_service::{decimal_from_f64, MaterialRatePricing},
        CartCommitService, ExternalCheckoutClient,
        PriceReverifier,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    let security = Arc::new(
        SecurityManager::from_config(&cfg).context("failed to initialise secret key")?,
    );

    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    let client = ExternalCheckoutClient::from_config(&cfg.checkout)
        .context("failed to build checkout client")?;
    let tolerance = decimal_from_f64(cfg.price_tolerance).context("price_tolerance must be finite")?;
    let pricing = PriceReverifier::new(Arc::new(MaterialRatePricing::default()), tolerance);

    let cart_commit = CartCommitService::new(
        security.clone(),
        Arc::new(SeaOrmDesignStore::new(db_arc.clone())),
        Arc::new(SeaOrmAuditStore::new(db_arc.clone())),
        pricing,
        client,
    )
    .with_retry_url_base(cfg.retry_url_base.clone());

    let host = cfg.host.clone();
    let port = cfg.port;
    let app_state = api::AppState {
        config: Arc::new(cfg),
        security,
        cart_commit: Arc::new(cart_commit),
        db: Some(db_arc),
    };

    let app = api::build_router(app_state);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;
    info!("configurator-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

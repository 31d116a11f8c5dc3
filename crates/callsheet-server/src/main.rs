mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use callsheet_ingest::Pipeline;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
    scheduler::{pipeline_jobs, Scheduler},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(callsheet_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = callsheet_db::PoolConfig::from_app_config(&config);
    let pool = callsheet_db::connect_pool(&config.database_url, pool_config).await?;
    callsheet_db::run_migrations(&pool).await?;

    let pipeline = Pipeline::from_config(pool.clone(), &config)?;
    let jobs = pipeline_jobs(
        Arc::clone(&pipeline.ingestion),
        Arc::clone(&pipeline.aggregation),
        &config,
    );
    let mut scheduler = Scheduler::new(jobs.all());
    scheduler.start().await?;

    let auth = AuthState::from_env(matches!(
        config.env,
        callsheet_core::Environment::Development
    ))?;
    let state = AppState {
        pool,
        social: Arc::clone(&pipeline.social),
        jobs,
    };
    let app = build_app(
        state,
        auth,
        default_rate_limit_state(),
        &config.allowed_origins,
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "api: listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("api: shutdown signal received; draining connections");
}

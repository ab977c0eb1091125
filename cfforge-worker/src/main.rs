//! CF Forge Worker
//!
//! Consumes build and deploy requests and runs them through the engine's
//! dispatchers.
//!
//! Architecture:
//! - Configuration: settings from environment variables with defaults
//! - Repository: Postgres persistence of builds, deployments and projects
//! - API: HTTP intake of messages plus rollback and multi-target deploys
//! - Consumer: bounded queue feeding the dispatchers

mod api;
mod config;
mod consumer;
mod db;
mod events;
mod repository;

use anyhow::{Context, Result};
use cfforge_engine::Collaborators;
use cfforge_engine::build::dispatcher::{BuildDispatcher, BuildDispatcherConfig};
use cfforge_engine::build::registry::PipelineRegistry;
use cfforge_engine::deploy::dispatcher::{DeployDispatcher, DeployDispatcherConfig};
use cfforge_engine::deploy::registry::StrategyRegistry;
use cfforge_engine::events::{EventPublisher, TracingEventPublisher};
use cfforge_engine::process::{CommandRunner, SystemCommandRunner};
use cfforge_engine::storage::FilesystemObjectStore;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::Config;
use crate::consumer::{Dispatchers, MessageConsumer};
use crate::events::HttpEventPublisher;
use crate::repository::PgRepository;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting CF Forge Worker");

    let config = load_config()?;
    info!(
        "Loaded configuration: worker_id={}, bind_addr={}, max_concurrent_jobs={}",
        config.worker_id, config.bind_addr, config.max_concurrent_jobs
    );

    let pool = connect_with_retry(&config.database_url).await?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let services = collaborators(&config, pool)?;
    let dispatchers = build_dispatchers(&config, services);
    info!("Dispatchers initialized");

    // A full queue makes the intake wait for the consumer
    let (intake, receiver) = mpsc::channel(config.max_concurrent_jobs * 2);
    let app = api::create_router(AppState {
        intake,
        deploy: dispatchers.deploy.clone(),
    });

    let consumer = MessageConsumer::new(Arc::new(dispatchers), config.max_concurrent_jobs);
    let consumer_handle = tokio::spawn(async move { consumer.run(receiver).await });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Intake server failed")?;

    // The router and its queue sender are gone; let the consumer drain
    match consumer_handle.await {
        Ok(Ok(())) => info!("Worker stopped"),
        Ok(Err(e)) => error!("Consumer error: {:#}", e),
        Err(e) => error!("Consumer task panicked: {}", e),
    }

    Ok(())
}

/// `RUST_LOG` selects what is logged, `LOG_FORMAT=json` how
fn init_tracing() {
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let (text_layer, json_layer) = if json {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cfforge_worker=info,cfforge_engine=info,tower_http=debug".into()
            }),
        )
        .with(text_layer)
        .with(json_layer)
        .init();
}

/// Loads configuration from the environment, validating it
fn load_config() -> Result<Config> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load config from environment ({}), using defaults", e);
            Config::default()
        }
    };
    config.validate()?;
    Ok(config)
}

fn collaborators(config: &Config, pool: PgPool) -> Result<Collaborators> {
    let repository = Arc::new(PgRepository::new(pool));
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::new());

    let events: Arc<dyn EventPublisher> = match &config.metrics_url {
        Some(url) => {
            let publisher = HttpEventPublisher::new(url.clone())?;
            info!("Publishing metric events to {}", publisher.url());
            Arc::new(publisher)
        }
        None => {
            info!("METRICS_URL not set, metric events are only logged");
            Arc::new(TracingEventPublisher)
        }
    };

    Ok(Collaborators {
        builds: repository.clone(),
        deployments: repository.clone(),
        projects: repository,
        store: Arc::new(FilesystemObjectStore::new(
            config.storage_root.clone(),
            &config.storage_bucket,
        )),
        events,
        runner,
    })
}

fn build_dispatchers(config: &Config, services: Collaborators) -> Dispatchers {
    let build = BuildDispatcher::new(
        BuildDispatcherConfig {
            source: config.worker_id.clone(),
            workspace_base: config.workspace_base.clone(),
            scan: config.scan_config(),
            enforce_vulnerability_gate: config.enforce_cve_gate,
        },
        PipelineRegistry::standard(),
        services.clone(),
    );

    let strategies = StrategyRegistry::standard(
        services.runner.clone(),
        &config.health_check_url,
        config.canary_config(),
    );
    let deploy = DeployDispatcher::new(
        DeployDispatcherConfig {
            source: config.worker_id.clone(),
            workspace_base: config.workspace_base.clone(),
            apps_domain: config.apps_domain.clone(),
            default_strategy: config.default_strategy,
        },
        strategies,
        services,
        config.cf_credentials.clone(),
    );

    Dispatchers {
        build: Arc::new(build),
        deploy: Arc::new(deploy),
    }
}

/// Connects to Postgres with exponential backoff
///
/// The database is often still starting when the worker container comes up.
async fn connect_with_retry(database_url: &str) -> Result<PgPool> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match db::create_pool(database_url).await {
            Ok(pool) => {
                info!("Database connection pool created (attempt {})", attempt);
                return Ok(pool);
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!("Failed to connect to database after {} attempts", MAX_RETRIES);
                    return Err(anyhow::anyhow!("Failed to create database pool: {}", e));
                }

                warn!(
                    "Failed to connect to database (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

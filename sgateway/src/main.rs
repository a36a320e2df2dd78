//! Binary entrypoint: loads configuration, wires the registry/pipeline,
//! optionally connects to AMQP, and serves HTTP on `0.0.0.0:8000`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use sgateway_cache::InMemoryStore;
use sgateway_core::config::{GatewayConfig, GatewaySettings};
use sgateway_data::{IdempotencyStore, InMemoryIdempotencyStore};
use sgateway_data_sqlx::PgIdempotencyStore;
use sgateway_events::{LocalBus, MessageBus};
use sgateway_events_amqp::{consumer, declare_queue, run, AmqpBus, QUEUE_NAME};
use sgateway_ratelimit::InMemoryRateLimitBackend;
use sgateway::bootstrap::{build_app_state, BootstrapInputs};
use sgateway::mq::GatewayCallHandler;

const DEFAULT_BIND: &str = "0.0.0.0:8000";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=debug".parse().unwrap()))
        .init();

    let profile = std::env::var("APP_PROFILE").unwrap_or_else(|_| "dev".to_string());
    let config = GatewayConfig::load(&profile)
        .and_then(|c| c.with_typed::<GatewaySettings>())
        .expect("failed to load gateway configuration");
    let settings = config.typed().clone();
    let vendor_config: HashMap<String, String> = config.get_or("vendor_config", HashMap::new());

    let idempotency_store: Arc<dyn IdempotencyStore> = if settings.is_local {
        Arc::new(InMemoryIdempotencyStore::new())
    } else {
        let pool = sqlx::PgPool::connect(&settings.db_config).await.expect("failed to connect to idempotency database");
        Arc::new(PgIdempotencyStore::new(pool))
    };

    let cache_store = Arc::new(InMemoryStore::new());
    let rate_limit_backend = Arc::new(InMemoryRateLimitBackend::new());

    let bus: Option<Arc<dyn MessageBus>> = match &settings.amqp_url {
        Some(url) => match connect_amqp(url).await {
            Ok(bus) => Some(bus),
            Err(err) => {
                tracing::error!(%err, "failed to connect to AMQP_URL, continuing without a message bus");
                None
            }
        },
        None => {
            tracing::warn!("AMQP_URL is not set; message bus logging and MQ-inbound calls are disabled");
            None
        }
    };
    let domains_bus = bus.clone().unwrap_or_else(|| Arc::new(LocalBus::new()));

    let bootstrapped = build_app_state(
        &settings,
        BootstrapInputs { vendor_config, idempotency_store, cache_store, rate_limit_backend, bus: bus.clone(), domains_bus },
    );

    if let (Some(url), true) = (&settings.amqp_url, bus.is_some()) {
        match open_consumer_channel(url).await {
            Ok(channel) => {
                let handler = Arc::new(GatewayCallHandler::new(bootstrapped.state.clone()));
                tokio::spawn(run_consumer(channel, handler));
            }
            Err(err) => tracing::error!(%err, "failed to open {QUEUE_NAME} consumer channel"),
        }
    }

    let listener = tokio::net::TcpListener::bind(DEFAULT_BIND).await.expect("failed to bind listener");
    tracing::info!(addr = DEFAULT_BIND, "sgateway listening");
    axum::serve(listener, sgateway_http::router(bootstrapped.state).into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("server exited with an error");
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn connect_amqp(url: &str) -> Result<Arc<dyn MessageBus>, BoxError> {
    let connection = lapin::Connection::connect(
        url,
        lapin::ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio),
    )
    .await?;
    let channel = connection.create_channel().await?;
    let bus = AmqpBus::new(channel);
    bus.declare_topic("sl.topic").await?;
    Ok(Arc::new(bus))
}

async fn open_consumer_channel(url: &str) -> Result<lapin::Channel, BoxError> {
    let connection = lapin::Connection::connect(
        url,
        lapin::ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio),
    )
    .await?;
    let channel = connection.create_channel().await?;
    declare_queue(&channel).await?;
    Ok(channel)
}

async fn run_consumer(channel: lapin::Channel, handler: Arc<GatewayCallHandler>) {
    match consumer(&channel, "sgateway").await {
        Ok(consumer) => run(consumer, handler).await,
        Err(err) => tracing::error!(%err, "failed to start {QUEUE_NAME} consumer"),
    }
}

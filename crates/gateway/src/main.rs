//! Writify Gateway
//!
//! The HTTP entry point for the writing assistant.
//! Handles:
//! - Sessions and the subscription gate
//! - Payment provider checkout, portal and webhooks
//! - Documents, texts and AI writing suggestions
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;
mod routes;

use anyhow::Context;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use writify_common::{
    auth::{FederatedVerifier, GoogleVerifier, JwtManager},
    billing::{PaymentEventProcessor, PaymentProvider, PlanPrices, StripeClient, WebhookVerifier},
    cache::Cache,
    config::AppConfig,
    context::{
        create_generation_client, ContextLimits, DocumentContextBuilder, GenerationParams,
        SuggestionPipeline,
    },
    db::{schema::create_schema, DbPool, Repository},
    documents::DocumentStorage,
    metrics::{self, GENERATION_BUCKETS, LATENCY_BUCKETS, METRICS_PREFIX},
};

use crate::middleware::rate_limit::{create_rate_limiter, GlobalRateLimiter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repo: Repository,
    pub processor: PaymentEventProcessor,
    /// `None` when no webhook signing secret is configured; every delivery is then rejected
    pub webhook_verifier: Option<Arc<WebhookVerifier>>,
    pub provider: Arc<dyn PaymentProvider>,
    pub suggestions: SuggestionPipeline,
    pub context_builder: DocumentContextBuilder,
    pub storage: DocumentStorage,
    pub jwt: Arc<JwtManager>,
    pub federated: Option<Arc<dyn FederatedVerifier>>,
    /// Redis counters for auth rate limiting; `None` fails open
    pub cache: Option<Arc<Cache>>,
    pub limiter: Arc<GlobalRateLimiter>,
}

impl AppState {
    /// Wire every collaborator from configuration
    async fn build(config: AppConfig, db: DbPool) -> anyhow::Result<Self> {
        let webhook_verifier = config
            .billing
            .webhook_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|secret| {
                Arc::new(WebhookVerifier::new(secret, config.billing.webhook_tolerance_secs))
            });
        if webhook_verifier.is_none() {
            warn!("billing.webhook_secret is not set; webhook deliveries will be rejected");
        }

        let provider: Arc<dyn PaymentProvider> = Arc::new(StripeClient::new(&config.billing)?);

        let generation = create_generation_client(&config.generation)?;
        info!(model = generation.model_name(), "Generation client ready");
        let suggestions = SuggestionPipeline::new(
            generation,
            GenerationParams::from(&config.generation),
            config.context.prompt_max_chars,
        );

        let federated = GoogleVerifier::from_config(&config.auth)?
            .map(|verifier| Arc::new(verifier) as Arc<dyn FederatedVerifier>);

        let cache = match Cache::new(&config.redis).await {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                warn!(error = %e, "Redis unavailable, auth rate limiting disabled");
                None
            }
        };

        Ok(Self {
            processor: PaymentEventProcessor::new(
                db.conn().clone(),
                PlanPrices::from(&config.billing),
            ),
            repo: Repository::new(db),
            webhook_verifier,
            provider,
            suggestions,
            context_builder: DocumentContextBuilder::new(ContextLimits::from(&config.context)),
            storage: DocumentStorage::from_config(&config.documents)?,
            jwt: Arc::new(JwtManager::from_config(&config.auth)?),
            federated,
            cache,
            limiter: create_rate_limiter(
                config.rate_limit.requests_per_second,
                config.rate_limit.burst,
            ),
            config: Arc::new(config),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!(
        service = %config.observability.service_name,
        "Starting Writify Gateway v{}",
        writify_common::VERSION
    );

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .set_buckets_for_metric(
                Matcher::Full(format!("{}_request_duration_seconds", METRICS_PREFIX)),
                LATENCY_BUCKETS,
            )?
            .set_buckets_for_metric(
                Matcher::Full(format!("{}_generation_duration_seconds", METRICS_PREFIX)),
                GENERATION_BUCKETS,
            )?
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Metrics listening on {}", metrics_addr);
    }
    metrics::register_metrics();

    // Initialize database connection
    let db = DbPool::new(&config.database).await?;
    if config.database.create_schema {
        create_schema(db.conn()).await?;
        info!("Database schema ensured");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server.host/server.port")?;

    let state = AppState::build(config, db).await?;
    let app = routes::create_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

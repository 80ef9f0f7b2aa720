//! # Waypost Service
//!
//! Binary entry point for the Waypost webhook intake service.
//!
//! This executable:
//! - Loads configuration from environment and files
//! - Initializes logging
//! - Builds the signature verifier, collaborators, processor, and queue
//! - Starts the HTTP server from waypost-api

mod collaborators;
mod handler;

use collaborators::{RestEntityDirectory, RestNotificationSender};
use handler::ProcessorTaskHandler;
use std::sync::Arc;
use std::time::Duration;
use task_runtime::{NotificationQueue, QueueConfig, QueueLane, RetryPolicy};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waypost_api::{start_server, AppState, ServiceConfig};
use waypost_core::webhook::{SharedSecretVerifier, SignatureVerifier, WebhookSecret};
use waypost_core::{GeofenceEventProcessor, InMemoryProcessedEventStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waypost_service=info,waypost_api=info,task_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Waypost Service");

    // -------------------------------------------------------------------------
    // Load configuration
    //
    // Sources (applied in order — later sources override earlier ones):
    //  1. /etc/waypost/service.yaml        — system-wide defaults
    //  2. ./config/service.yaml            — deployment-local override
    //  3. Path given by WAYPOST_CONFIG_FILE env — operator-specified file
    //  4. Environment variables prefixed WAYPOST__ (double-underscore
    //     separator), e.g. WAYPOST__SERVER__PORT=9090 sets server.port
    //
    // All configuration fields carry serde defaults, so absent files produce
    // a valid config with built-in defaults. A malformed file or an
    // environment variable that cannot be coerced IS a hard error because it
    // indicates deliberate-but-broken operator configuration.
    // -------------------------------------------------------------------------
    let mut config_builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/waypost/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    // Optional explicit path supplied by the operator.
    if let Ok(explicit_path) = std::env::var("WAYPOST_CONFIG_FILE") {
        if !explicit_path.is_empty() {
            config_builder = config_builder.add_source(
                config::File::with_name(&explicit_path)
                    .required(true)
                    .format(config::FileFormat::Yaml),
            );
            info!(path = %explicit_path, "Loading configuration from explicit path");
        }
    }

    let config = match config_builder
        .add_source(config::Environment::with_prefix("WAYPOST").separator("__"))
        .build()
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "Failed to build configuration; aborting");
            std::process::exit(3);
        }
    };

    let service_config: ServiceConfig = match config.try_deserialize() {
        Ok(sc) => sc,
        Err(e) => {
            error!(
                error = %e,
                "Could not deserialize service configuration; aborting. \
                 Fix the configuration and restart."
            );
            std::process::exit(3);
        }
    };

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    // -------------------------------------------------------------------------
    // Signature verifier
    // -------------------------------------------------------------------------
    let verifier: Arc<dyn SignatureVerifier> = match &service_config.webhook.secret {
        Some(secret) if !service_config.webhook.allow_unverified => {
            Arc::new(SharedSecretVerifier::new(WebhookSecret::new(secret.clone())))
        }
        Some(secret) => {
            warn!("Signature verification bypass is enabled in configuration");
            Arc::new(SharedSecretVerifier::unverified(WebhookSecret::new(
                secret.clone(),
            )))
        }
        None => {
            // validate() only lets this through with allow_unverified set
            warn!("No webhook secret configured; running with verification bypassed");
            Arc::new(SharedSecretVerifier::unverified(WebhookSecret::new("")))
        }
    };

    // -------------------------------------------------------------------------
    // Collaborators and processor
    // -------------------------------------------------------------------------
    let collaborator_timeout =
        Duration::from_secs(service_config.collaborators.timeout_seconds);

    let Some(directory_url) = service_config.collaborators.directory_url.clone() else {
        error!("collaborators.directory_url is required; aborting");
        std::process::exit(3);
    };
    let Some(notifier_url) = service_config.collaborators.notifier_url.clone() else {
        error!("collaborators.notifier_url is required; aborting");
        std::process::exit(3);
    };
    let token = service_config.collaborators.api_token.clone();

    let directory = match RestEntityDirectory::new(&directory_url, token.clone(), collaborator_timeout)
    {
        Ok(directory) => Arc::new(directory),
        Err(e) => {
            error!(error = %e, "Invalid entity directory configuration; aborting");
            std::process::exit(3);
        }
    };

    let sender = match RestNotificationSender::new(&notifier_url, token, collaborator_timeout) {
        Ok(sender) => Arc::new(sender),
        Err(e) => {
            error!(error = %e, "Invalid notifier configuration; aborting");
            std::process::exit(3);
        }
    };

    let processor = Arc::new(GeofenceEventProcessor::new(
        directory,
        sender,
        Arc::new(InMemoryProcessedEventStore::new()),
    ));

    // -------------------------------------------------------------------------
    // Queue and HTTP server
    // -------------------------------------------------------------------------
    let lane = match QueueLane::new(service_config.queue.lane.clone()) {
        Ok(lane) => lane,
        Err(e) => {
            error!(error = %e, "Invalid queue lane name; aborting");
            std::process::exit(3);
        }
    };

    let queue = NotificationQueue::start(
        QueueConfig {
            lane,
            workers: service_config.queue.workers,
            retry: RetryPolicy::fixed(
                service_config.queue.max_attempts,
                Duration::from_secs(service_config.queue.backoff_seconds),
            ),
        },
        Arc::new(ProcessorTaskHandler::new(processor)),
    );

    let state = AppState::new(service_config, verifier, queue);

    start_server(state).await?;

    Ok(())
}

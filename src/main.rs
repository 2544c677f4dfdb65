mod bus;
mod command;
mod config;
mod error;
mod identity;
mod merger;
mod platform;
mod publisher;
mod relay;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bus::{MessageBus, SnsMessageBus};
use crate::config::Config;
use crate::identity::{IdentitySource, ParameterStore, SsmParameterStore};
use crate::platform::telegram::{WebhookRegistry, WebhookUpdateSource};
use crate::publisher::Publisher;
use crate::relay::Relay;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tg_command_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Optional config file; environment variables override it
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    if let Some(path) = &config_path {
        info!("Loading configuration from: {}", path.display());
    }
    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;
    let public_url = config.public_url()?;
    let telegram_api_url = config.telegram_api_url()?;

    info!("Configuration loaded successfully");
    info!("  Public URL: {}", public_url);
    info!("  Token prefix: {}", config.parameters.token_prefix);
    info!("  Topic parameter: {}", config.parameters.topic_parameter);
    if let Some(url) = &telegram_api_url {
        info!("  Telegram API: {}", url);
    }

    let aws = aws_config::load_from_env().await;
    let store: Arc<dyn ParameterStore> =
        Arc::new(SsmParameterStore::new(aws_sdk_ssm::Client::new(&aws)));
    let bus: Arc<dyn MessageBus> = Arc::new(SnsMessageBus::new(aws_sdk_sns::Client::new(&aws)));

    // The webhook server must be up before any bot registers its webhook
    let registry = WebhookRegistry::new();
    let listener = TcpListener::bind(("0.0.0.0", config.server.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.server.port))?;
    info!("Listening on port {}", config.server.port);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = registry.router();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let relay = Relay::new(
        IdentitySource::new(store.clone(), &config.parameters.token_prefix),
        Arc::new(WebhookUpdateSource::new(registry, public_url, telegram_api_url)),
        Publisher::new(store, bus, &config.parameters.topic_parameter),
    );

    let outcome = tokio::select! {
        result = relay.run() => result.context("Relay terminated"),
        _ = shutdown_signal() => {
            info!("Received shutdown signal");
            Ok(())
        }
    };

    let _ = shutdown_tx.send(());
    match server.await {
        Ok(Ok(())) => info!("Webhook server stopped"),
        Ok(Err(e)) => error!("Webhook server error: {}", e),
        Err(e) => error!("Webhook server task failed: {}", e),
    }

    outcome
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use futures::stream::{self, StreamExt};
use reqwest::Url;
use teloxide::payloads::SetWebhookSetters;
use teloxide::prelude::*;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::identity::BotIdentity;
use crate::platform::{RawUpdate, UpdateSource, UpdateStream};

/// Maps each bot token to the channel its webhook deliveries go to.
///
/// Cloning is cheap; all clones share the same table.
#[derive(Clone, Default)]
pub struct WebhookRegistry {
    listeners: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<RawUpdate>>>>,
}

impl WebhookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route deliveries for `token` to a fresh channel, replacing any earlier one.
    pub async fn subscribe(&self, token: &str) -> mpsc::UnboundedReceiver<RawUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.write().await.insert(token.to_string(), tx);
        rx
    }

    pub async fn unsubscribe(&self, token: &str) {
        self.listeners.write().await.remove(token);
    }

    /// Axum router serving `POST /{token}` for every subscribed token.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/{token}", post(receive_update))
            .with_state(self.clone())
    }

    async fn deliver(&self, token: &str, update: RawUpdate) -> bool {
        let listeners = self.listeners.read().await;
        match listeners.get(token) {
            Some(tx) => tx.send(update).is_ok(),
            None => false,
        }
    }
}

async fn receive_update(
    State(registry): State<WebhookRegistry>,
    Path(token): Path<String>,
    Json(update): Json<RawUpdate>,
) -> StatusCode {
    let update_id = update.id;
    if registry.deliver(&token, update).await {
        debug!(?update_id, "Webhook update received");
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

/// The public address Telegram should deliver a bot's updates to.
pub fn webhook_url(public_url: &Url, token: &str) -> Url {
    let mut url = public_url.clone();
    url.set_path(token);
    url.set_query(None);
    url.set_fragment(None);
    url
}

/// [`UpdateSource`] that registers a Telegram webhook per bot and reads the
/// deliveries arriving on the shared [`WebhookRegistry`] server.
pub struct WebhookUpdateSource {
    registry: WebhookRegistry,
    public_url: Url,
    /// Bot API server override; `None` means api.telegram.org.
    api_url: Option<Url>,
}

impl WebhookUpdateSource {
    pub fn new(registry: WebhookRegistry, public_url: Url, api_url: Option<Url>) -> Self {
        Self {
            registry,
            public_url,
            api_url,
        }
    }

    fn bot(&self, token: &str) -> Bot {
        let bot = Bot::new(token);
        match &self.api_url {
            Some(url) => bot.set_api_url(url.clone()),
            None => bot,
        }
    }
}

#[async_trait]
impl UpdateSource for WebhookUpdateSource {
    async fn open(&self, identity: &BotIdentity) -> Result<UpdateStream, RelayError> {
        // Listen before registering so the first delivery has somewhere to go.
        let rx = self.registry.subscribe(&identity.credential).await;

        let bot = self.bot(&identity.credential);
        let url = webhook_url(&self.public_url, &identity.credential);

        // A single connection keeps Telegram's deliveries for this bot in order.
        if let Err(e) = bot.set_webhook(url).max_connections(1).await {
            self.registry.unsubscribe(&identity.credential).await;
            return Err(RelayError::RegistrationFailed {
                bot: identity.name.clone(),
                reason: e.to_string(),
            });
        }
        info!(bot = %identity.name, "Webhook registered");

        match bot.get_webhook_info().await {
            Ok(info) => {
                if let Some(date) = info.last_error_date {
                    let stale = RelayError::TransportDeliveryStale {
                        bot: identity.name.clone(),
                        message: info.last_error_message.unwrap_or_default(),
                    };
                    warn!(last_error_date = ?date, "{}", stale);
                }
            }
            Err(e) => warn!(bot = %identity.name, "Failed to query webhook info: {}", e),
        }

        Ok(receiver_stream(rx))
    }
}

fn receiver_stream(rx: mpsc::UnboundedReceiver<RawUpdate>) -> UpdateStream {
    stream::unfold(rx, |mut rx| async move {
        let update = rx.recv().await?;
        Some((update, rx))
    })
    .boxed()
}

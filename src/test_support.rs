//! Fakes for the store, bus and update transport, plus Telegram update fixtures.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};

use crate::bus::{MessageBus, PublishEnvelope};
use crate::error::RelayError;
use crate::identity::{BotIdentity, Parameter, ParameterStore};
use crate::platform::{RawUpdate, UpdateSource, UpdateStream};

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub const TEST_TOPIC: &str = "arn:aws:sns:eu-west-1:123456789012:telegram-commands";

/// Telegram JSON for a private text message. A leading `/word` gets a
/// `bot_command` entity, as Telegram would send it.
pub fn text_update_json(id: u32, text: &str) -> Value {
    let mut message = json!({
        "message_id": id,
        "date": 1_700_000_000,
        "chat": { "id": 42, "type": "private", "first_name": "Ada" },
        "from": { "id": 42, "is_bot": false, "first_name": "Ada" },
        "text": text,
    });

    if text.starts_with('/') {
        let command = text.split_whitespace().next().unwrap_or(text);
        message["entities"] = json!([{
            "type": "bot_command",
            "offset": 0,
            "length": command.encode_utf16().count(),
        }]);
    }

    json!({ "update_id": id, "message": message })
}

pub fn update_from_json(value: Value) -> RawUpdate {
    // teloxide's `UpdateKind` only deserializes from borrowed-str keys, which
    // `serde_json::from_value` can't provide; go through text as a webhook would.
    serde_json::from_str(&value.to_string()).unwrap()
}

pub fn text_update(id: u32, text: &str) -> RawUpdate {
    update_from_json(text_update_json(id, text))
}

pub struct FakeStore {
    parameters: Vec<Parameter>,
    topic: Option<String>,
    available: bool,
    topic_lookups: AtomicUsize,
}

impl FakeStore {
    pub fn with_parameters(parameters: Vec<Parameter>) -> Self {
        Self {
            parameters,
            topic: Some(TEST_TOPIC.to_string()),
            available: true,
            topic_lookups: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::with_parameters(vec![])
        }
    }

    pub fn without_topic(mut self) -> Self {
        self.topic = None;
        self
    }

    pub fn topic_lookups(&self) -> usize {
        self.topic_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParameterStore for FakeStore {
    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<Parameter>, RelayError> {
        if !self.available {
            return Err(RelayError::ConfigUnavailable(format!("{} unreachable", prefix)));
        }
        Ok(self.parameters.clone())
    }

    async fn get_scalar(&self, name: &str) -> Result<String, RelayError> {
        self.topic_lookups.fetch_add(1, Ordering::SeqCst);
        match (&self.topic, self.available) {
            (Some(topic), true) => Ok(topic.clone()),
            _ => Err(RelayError::ConfigUnavailable(format!("{} unreachable", name))),
        }
    }
}

pub struct FakeBus {
    published: Mutex<Vec<PublishEnvelope>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl FakeBus {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn published(&self) -> Vec<PublishEnvelope> {
        self.published.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageBus for FakeBus {
    async fn publish(&self, envelope: &PublishEnvelope) -> Result<String, RelayError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(RelayError::PublishFailed("topic does not exist".to_string()));
        }
        self.published.lock().unwrap().push(envelope.clone());
        Ok(format!("msg-{}", attempt))
    }
}

/// Serves a fixed, finite list of updates per bot name.
pub struct FakeSource {
    updates: HashMap<String, Vec<RawUpdate>>,
    failing: HashSet<String>,
    opened: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            updates: HashMap::new(),
            failing: HashSet::new(),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn with_updates(mut self, name: &str, updates: Vec<RawUpdate>) -> Self {
        self.updates.insert(name.to_string(), updates);
        self
    }

    /// Opening this bot fails as if Telegram rejected the webhook.
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpdateSource for FakeSource {
    async fn open(&self, identity: &BotIdentity) -> Result<UpdateStream, RelayError> {
        self.opened.lock().unwrap().push(identity.name.clone());

        if self.failing.contains(&identity.name) {
            return Err(RelayError::RegistrationFailed {
                bot: identity.name.clone(),
                reason: "Unauthorized".to_string(),
            });
        }

        let updates = self.updates.get(&identity.name).cloned().unwrap_or_default();
        Ok(stream::iter(updates).boxed())
    }
}


use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_sns::error::DisplayErrorContext;
use aws_sdk_sns::types::MessageAttributeValue;

use crate::error::RelayError;
use crate::merger::TaggedUpdate;

pub const BOT_ATTRIBUTE: &str = "bot";
pub const COMMAND_ATTRIBUTE: &str = "command";

/// A message ready to hand to the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishEnvelope {
    /// JSON rendering of the Telegram update.
    pub body: String,
    pub attributes: BTreeMap<String, String>,
    /// Topic ARN.
    pub destination: String,
}

impl PublishEnvelope {
    pub fn for_update(
        tagged: &TaggedUpdate,
        command: &str,
        destination: impl Into<String>,
    ) -> Result<Self, RelayError> {
        let body = serde_json::to_string(&tagged.payload)
            .map_err(|e| RelayError::PublishFailed(format!("cannot serialize update: {}", e)))?;

        let attributes = BTreeMap::from([
            (BOT_ATTRIBUTE.to_string(), tagged.source_name.clone()),
            (COMMAND_ATTRIBUTE.to_string(), command.to_string()),
        ]);

        Ok(Self {
            body,
            attributes,
            destination: destination.into(),
        })
    }
}

/// The fan-out bus downstream consumers subscribe to.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish and return the bus-assigned message id.
    async fn publish(&self, envelope: &PublishEnvelope) -> Result<String, RelayError>;
}

/// [`MessageBus`] backed by an AWS SNS topic.
pub struct SnsMessageBus {
    client: aws_sdk_sns::Client,
}

impl SnsMessageBus {
    pub fn new(client: aws_sdk_sns::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessageBus for SnsMessageBus {
    async fn publish(&self, envelope: &PublishEnvelope) -> Result<String, RelayError> {
        let mut request = self
            .client
            .publish()
            .topic_arn(envelope.destination.as_str())
            .message(envelope.body.as_str());

        for (name, value) in &envelope.attributes {
            let attribute = MessageAttributeValue::builder()
                .data_type("String")
                .string_value(value.as_str())
                .build()
                .map_err(|e| RelayError::PublishFailed(e.to_string()))?;
            request = request.message_attributes(name.as_str(), attribute);
        }

        let output = request
            .send()
            .await
            .map_err(|e| RelayError::PublishFailed(DisplayErrorContext(&e).to_string()))?;

        output
            .message_id()
            .map(str::to_string)
            .ok_or_else(|| RelayError::PublishFailed("bus returned no message id".to_string()))
    }
}

use std::sync::Arc;

use tracing::{debug, info};

use crate::bus::{MessageBus, PublishEnvelope};
use crate::command::extract_command;
use crate::error::RelayError;
use crate::identity::ParameterStore;
use crate::merger::{MergedUpdates, TaggedUpdate};

/// Forwards command updates from the merged stream to the message bus.
pub struct Publisher {
    store: Arc<dyn ParameterStore>,
    bus: Arc<dyn MessageBus>,
    topic_parameter: String,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn ParameterStore>,
        bus: Arc<dyn MessageBus>,
        topic_parameter: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bus,
            topic_parameter: topic_parameter.into(),
        }
    }

    /// Publish every command update, one at a time, until the stream ends.
    ///
    /// The first store or bus failure stops the loop and is returned; nothing
    /// is retried.
    pub async fn run(&self, updates: &mut MergedUpdates) -> Result<(), RelayError> {
        while let Some(tagged) = updates.next().await {
            self.forward(&tagged).await?;
        }
        Ok(())
    }

    /// Publish a single update. Returns the message id, or `None` when the
    /// update carries no command.
    pub async fn forward(&self, tagged: &TaggedUpdate) -> Result<Option<String>, RelayError> {
        let Some(command) = extract_command(&tagged.payload) else {
            return Ok(None);
        };

        let topic = self.store.get_scalar(&self.topic_parameter).await?;
        let envelope = PublishEnvelope::for_update(tagged, &command, topic)?;
        let message_id = self.bus.publish(&envelope).await?;

        info!(
            bot = %tagged.source_name,
            command = %command,
            "Published to bus: {}",
            message_id
        );
        debug!(update = ?tagged.payload, "Forwarded update");

        Ok(Some(message_id))
    }
}

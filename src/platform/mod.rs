pub mod telegram;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::RelayError;
use crate::identity::BotIdentity;

/// An update as delivered by the Telegram Bot API.
pub type RawUpdate = teloxide::types::Update;

/// Unbounded sequence of updates for one bot.
pub type UpdateStream = BoxStream<'static, RawUpdate>;

/// A transport that delivers the updates of a single bot.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Start receiving updates for `identity`.
    ///
    /// A failure here concerns only this bot; other bots keep running.
    async fn open(&self, identity: &BotIdentity) -> Result<UpdateStream, RelayError>;
}

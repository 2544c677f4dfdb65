use thiserror::Error;

/// Errors produced by the relay pipeline components.
///
/// `ConfigUnavailable`, `ConfigMalformed`, `PublishFailed` and `NoActiveSources`
/// end the process.
/// `RegistrationFailed` only ends the worker of the bot it names, and
/// `TransportDeliveryStale` is never returned, only logged.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The parameter store could not be reached or returned no value.
    #[error("configuration unavailable: {0}")]
    ConfigUnavailable(String),

    /// A bot identity entry in the parameter store is unusable.
    #[error("malformed configuration entry: {0}")]
    ConfigMalformed(String),

    /// Telegram rejected the webhook registration for one bot.
    #[error("webhook registration failed for bot '{bot}': {reason}")]
    RegistrationFailed { bot: String, reason: String },

    /// The message bus rejected or failed a publish.
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// No bot's update stream could be opened, so nothing can ever be relayed.
    #[error("no bot update stream could be opened ({0} configured)")]
    NoActiveSources(usize),

    /// Telegram reports an earlier failed delivery to this bot's webhook.
    #[error("last webhook delivery for bot '{bot}' failed: {message}")]
    TransportDeliveryStale { bot: String, message: String },
}

use teloxide::types::{MessageEntityKind, UpdateKind};

use crate::platform::RawUpdate;

/// The bot command a message starts with, without the `/` marker or any
/// `@botname` suffix.
///
/// Only plain messages count, and the command entity must open the text.
pub fn extract_command(update: &RawUpdate) -> Option<String> {
    let UpdateKind::Message(message) = &update.kind else {
        return None;
    };

    let entities = message.parse_entities()?;
    let first = entities.first()?;
    if !matches!(first.kind(), MessageEntityKind::BotCommand) || first.start() != 0 {
        return None;
    }

    let command = first.text().strip_prefix('/')?;
    let command = command.split('@').next().unwrap_or(command);
    if command.is_empty() {
        None
    } else {
        Some(command.to_string())
    }
}

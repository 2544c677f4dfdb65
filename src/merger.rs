use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::identity::BotIdentity;
use crate::platform::{RawUpdate, UpdateSource};

/// An update labelled with the bot it arrived for.
#[derive(Debug, Clone)]
pub struct TaggedUpdate {
    pub source_name: String,
    pub payload: RawUpdate,
}

/// The merged update stream of every bot.
///
/// Updates of one bot arrive in the order that bot received them; updates of
/// different bots interleave freely. Dropping this value stops all workers.
pub struct MergedUpdates {
    rx: mpsc::UnboundedReceiver<TaggedUpdate>,
    opened: Arc<AtomicUsize>,
    _workers: JoinSet<()>,
}

impl MergedUpdates {
    /// The next update from any bot, or `None` once every worker has ended.
    pub async fn next(&mut self) -> Option<TaggedUpdate> {
        self.rx.recv().await
    }

    /// How many bots' update streams were opened successfully so far.
    pub fn opened_sources(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

/// Spawn one worker per identity, each feeding its bot's updates into a
/// shared channel.
pub fn merge(source: Arc<dyn UpdateSource>, identities: Vec<BotIdentity>) -> MergedUpdates {
    let (tx, rx) = mpsc::unbounded_channel();
    let opened = Arc::new(AtomicUsize::new(0));
    let mut workers = JoinSet::new();

    for identity in identities {
        workers.spawn(forward_updates(
            source.clone(),
            identity,
            tx.clone(),
            opened.clone(),
        ));
    }

    MergedUpdates {
        rx,
        opened,
        _workers: workers,
    }
}

async fn forward_updates(
    source: Arc<dyn UpdateSource>,
    identity: BotIdentity,
    tx: mpsc::UnboundedSender<TaggedUpdate>,
    opened: Arc<AtomicUsize>,
) {
    let mut updates = match source.open(&identity).await {
        Ok(updates) => updates,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };
    opened.fetch_add(1, Ordering::SeqCst);
    info!(bot = %identity.name, "Receiving updates");

    while let Some(payload) = updates.next().await {
        let tagged = TaggedUpdate {
            source_name: identity.name.clone(),
            payload,
        };
        if tx.send(tagged).is_err() {
            break;
        }
    }

    debug!(bot = %identity.name, "Update stream closed");
}

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::RelayError;
use crate::identity::IdentitySource;
use crate::merger;
use crate::platform::UpdateSource;
use crate::publisher::Publisher;

/// The whole pipeline: resolve bots, merge their updates, publish commands.
pub struct Relay {
    identities: IdentitySource,
    source: Arc<dyn UpdateSource>,
    publisher: Publisher,
}

impl Relay {
    pub fn new(
        identities: IdentitySource,
        source: Arc<dyn UpdateSource>,
        publisher: Publisher,
    ) -> Self {
        Self {
            identities,
            source,
            publisher,
        }
    }

    /// Runs until a fatal error, or until every bot's update stream has closed.
    ///
    /// Fails with [`RelayError::NoActiveSources`] when the streams end without
    /// a single bot ever having been opened.
    pub async fn run(&self) -> Result<(), RelayError> {
        let identities = self.identities.list_identities().await?;
        let configured = identities.len();
        info!("Starting update workers for {} bots", configured);

        let mut updates = merger::merge(self.source.clone(), identities);
        self.publisher.run(&mut updates).await?;

        if updates.opened_sources() == 0 {
            return Err(RelayError::NoActiveSources(configured));
        }
        warn!("All update streams closed");
        Ok(())
    }
}

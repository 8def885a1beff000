use std::path::PathBuf;

use tracing::{debug, info};

use crate::document::Tier;

/// Number of drafts swept to `published` per call when the caller does
/// not say otherwise. The sweep triggers revisioning on the CMS side,
/// so it is amortised over a batch rather than invoked per document.
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Run configuration for the publisher.
#[derive(Debug, Clone)]
pub struct PushConfig {
    pub batch_size: usize,
    pub tier: Tier,
    /// When set, payloads are written here instead of being delivered.
    pub dump_dir: Option<PathBuf>,
}

impl PushConfig {
    pub fn trace_loaded(&self) {
        info!(
            batch_size = self.batch_size,
            tier = %self.tier.name(),
            dump = self.dump_dir.is_some(),
            "Loaded push config"
        );
        debug!(?self, "Push config (full debug)");
    }
}

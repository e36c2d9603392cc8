use super::DiskStore;
use tracing::{info, warn};

/// Wipe-all policy over a set of stores sharing one byte budget.
#[derive(Debug, Clone, Copy)]
pub struct EvictionPolicy {
    threshold: u64,
}

impl EvictionPolicy {
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Clear every store when their combined size exceeds the threshold.
    /// Returns whether a wipe happened.
    pub async fn maybe_evict(&self, stores: &[&DiskStore]) -> bool {
        let mut total: u64 = 0;
        for store in stores {
            match store.total_size().await {
                Ok(size) => total = total.saturating_add(size),
                Err(e) => warn!(dir = ?store.dir(), error = %e, "Failed to measure cache directory"),
            }
        }

        if total <= self.threshold {
            return false;
        }

        let mut removed = 0;
        for store in stores {
            removed += store.clear().await;
        }
        info!(
            total_bytes = total,
            threshold = self.threshold,
            removed,
            "Cache size over budget, cleared all stores"
        );
        true
    }
}

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::store::{LayeredStore, Namespace};

pub const PROGRESS_NAMESPACE: &str = "video_progress";

/// Best-ever watched percentage for one video on this visitor-device.
/// Players report progress non-monotonically (seeking, re-watch), so the
/// stored value only ever goes up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub resource_id: String,
    pub percent_watched: u8,
}

/// Store view over the progress namespace, shared by the unlock controller
/// and the completion watcher.
#[derive(Clone)]
pub struct ProgressLedger {
    ns: Namespace,
    threshold: u8,
}

impl ProgressLedger {
    pub fn new(store: &Arc<LayeredStore>, threshold: u8) -> Self {
        ProgressLedger {
            ns: store.namespace(PROGRESS_NAMESPACE),
            threshold,
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn percent(&self, resource_id: &str) -> u8 {
        self.ns
            .get(resource_id)
            .and_then(|v| v.as_u64())
            .map(|n| n.min(100) as u8)
            .unwrap_or(0)
    }

    pub fn is_complete(&self, resource_id: &str) -> bool {
        self.percent(resource_id) >= self.threshold
    }

    /// Record fractional progress from the player. Returns the floored
    /// percent, or `None` for out-of-range reports, which are dropped.
    pub fn record_fraction(&self, resource_id: &str, fraction: f64) -> Option<u8> {
        if !fraction.is_finite() {
            return None;
        }
        let percent = (fraction * 100.0).floor();
        if !(0.0..=100.0).contains(&percent) {
            return None;
        }
        let percent = percent as u8;
        self.record_percent(resource_id, percent);
        Some(percent)
    }

    pub fn record_percent(&self, resource_id: &str, percent: u8) {
        self.ns.set(resource_id, json!(percent.min(100)));
    }

    pub fn record_for(&self, resource_id: &str) -> ProgressRecord {
        ProgressRecord {
            resource_id: resource_id.to_string(),
            percent_watched: self.percent(resource_id),
        }
    }
}

// Redesigned player integration: instead of a global registration queue, the
// host owns a shared registry and feeds player events into the session's
// single event channel.

use crate::page::SlotId;

/// Events the host's player framework reports for one video.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Play { resource_id: String },
    Pause { resource_id: String },
    /// Fractional progress, 0.0..=1.0.
    ProgressChanged { resource_id: String, fraction: f64 },
    Ended { resource_id: String },
}

impl PlayerEvent {
    pub fn resource_id(&self) -> &str {
        match self {
            PlayerEvent::Play { resource_id }
            | PlayerEvent::Pause { resource_id }
            | PlayerEvent::ProgressChanged { resource_id, .. }
            | PlayerEvent::Ended { resource_id } => resource_id,
        }
    }
}

/// Static facts about one mounted video, registered as the host's player
/// framework initializes each embed.
#[derive(Debug, Clone)]
pub struct MediaDescriptor {
    pub resource_id: String,
    /// Stable per-video hashed identifier from the player framework.
    pub media_hash: String,
    pub duration_seconds: f64,
    pub slot: SlotId,
}

/// Ordered registry of mounted videos (registration order = page order).
/// Videos may register late; consumers re-check on every poll tick.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    videos: Vec<MediaDescriptor>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a video, or refresh its descriptor if already present.
    pub fn register(&mut self, descriptor: MediaDescriptor) {
        match self
            .videos
            .iter_mut()
            .find(|v| v.resource_id == descriptor.resource_id)
        {
            Some(existing) => *existing = descriptor,
            None => self.videos.push(descriptor),
        }
    }

    pub fn find(&self, resource_id: &str) -> Option<&MediaDescriptor> {
        self.videos.iter().find(|v| v.resource_id == resource_id)
    }

    /// The last mounted video, the one a completion CTA hangs off.
    pub fn last(&self) -> Option<&MediaDescriptor> {
        self.videos.last()
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }
}

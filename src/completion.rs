// Completion CTA: the page's call-to-action button stays hidden until the
// last video on the page has effectively been watched.

use std::sync::Arc;

use serde_json::json;

use crate::page::PageSurface;
use crate::player::PlayerRegistry;
use crate::store::{LayeredStore, Namespace};

pub const CTA_NAMESPACE: &str = "cta_reveal";

/// Watches the last registered video and reveals the CTA button once its
/// watched percentage reaches the threshold (or it ends). Reveal state is
/// shown-once and persisted, so a reload after completion re-reveals without
/// another watch-through.
pub struct CompletionWatcher {
    ns: Namespace,
    threshold: u8,
    /// Resource id of the last video once the registry has settled.
    armed: Option<String>,
    revealed: bool,
    /// Set when the page has no CTA button; nothing to do, ever.
    disarmed: bool,
}

impl CompletionWatcher {
    pub fn new(store: &Arc<LayeredStore>, threshold: u8) -> Self {
        CompletionWatcher {
            ns: store.namespace(CTA_NAMESPACE),
            threshold,
            armed: None,
            revealed: false,
            disarmed: false,
        }
    }

    /// Called on poll ticks until the registry has videos. Re-arms onto the
    /// new last video if more embeds mount later.
    pub fn ensure_armed(&mut self, registry: &PlayerRegistry, page: &mut dyn PageSurface) {
        if self.disarmed || self.revealed {
            return;
        }
        if !page.cta_button_present() {
            tracing::warn!("no CTA button on page; completion reveal disabled");
            self.disarmed = true;
            return;
        }
        let Some(last) = registry.last() else {
            return;
        };
        if self.armed.as_deref() != Some(last.resource_id.as_str()) {
            tracing::debug!(
                resource_id = %last.resource_id,
                total_videos = registry.len(),
                "watching last video for completion"
            );
            self.armed = Some(last.resource_id.clone());
        }

        // A prior visit may already have earned the reveal.
        let shown = self
            .ns
            .get(&last.resource_id)
            .and_then(|v| v.get("shown").and_then(|s| s.as_bool()))
            .unwrap_or(false);
        if shown {
            self.reveal(page);
        }
    }

    pub fn observe_progress(&mut self, resource_id: &str, percent: u8, page: &mut dyn PageSurface) {
        if self.revealed || self.disarmed {
            return;
        }
        if self.armed.as_deref() == Some(resource_id) && percent >= self.threshold {
            self.reveal(page);
        }
    }

    pub fn observe_end(&mut self, resource_id: &str, page: &mut dyn PageSurface) {
        if self.revealed || self.disarmed {
            return;
        }
        if self.armed.as_deref() == Some(resource_id) {
            self.reveal(page);
        }
    }

    fn reveal(&mut self, page: &mut dyn PageSurface) {
        page.reveal_cta_button();
        if let Some(resource_id) = &self.armed {
            self.ns.set(resource_id, json!({"shown": true}));
        }
        self.revealed = true;
        tracing::info!("CTA button revealed");
    }
}

#[cfg(test)]
mod tests {
    use crate::page::VirtualPage;
    use crate::player::MediaDescriptor;
    use crate::store::{LayerKind, MemoryBackend, StorageBackend};

    use super::*;

    fn store_with(session: Arc<MemoryBackend>) -> Arc<LayeredStore> {
        Arc::new(LayeredStore::new(vec![session as Arc<dyn StorageBackend>]))
    }

    fn registry_of(ids: &[&str]) -> PlayerRegistry {
        let mut registry = PlayerRegistry::new();
        for (slot, id) in ids.iter().enumerate() {
            registry.register(MediaDescriptor {
                resource_id: id.to_string(),
                media_hash: format!("hash-{id}"),
                duration_seconds: 60.0,
                slot: slot as u64,
            });
        }
        registry
    }

    #[test]
    fn only_the_last_video_reveals() {
        let store = store_with(Arc::new(MemoryBackend::new(LayerKind::Session)));
        let page = VirtualPage::new();
        page.add_cta_button();
        let registry = registry_of(&["1", "2"]);

        let mut watcher = CompletionWatcher::new(&store, 90);
        let mut surface = page.clone();
        watcher.ensure_armed(&registry, &mut surface);

        watcher.observe_progress("1", 100, &mut surface);
        assert!(!page.cta_visible());

        watcher.observe_progress("2", 89, &mut surface);
        assert!(!page.cta_visible());
        watcher.observe_progress("2", 90, &mut surface);
        assert!(page.cta_visible());
    }

    #[test]
    fn end_event_reveals_without_the_threshold() {
        let store = store_with(Arc::new(MemoryBackend::new(LayerKind::Session)));
        let page = VirtualPage::new();
        page.add_cta_button();
        let registry = registry_of(&["7"]);

        let mut watcher = CompletionWatcher::new(&store, 90);
        let mut surface = page.clone();
        watcher.ensure_armed(&registry, &mut surface);
        watcher.observe_end("7", &mut surface);
        assert!(page.cta_visible());
    }

    #[test]
    fn reveal_state_survives_a_reload() {
        let session = Arc::new(MemoryBackend::new(LayerKind::Session));
        {
            let store = store_with(session.clone());
            let page = VirtualPage::new();
            page.add_cta_button();
            let registry = registry_of(&["9"]);
            let mut watcher = CompletionWatcher::new(&store, 90);
            let mut surface = page.clone();
            watcher.ensure_armed(&registry, &mut surface);
            watcher.observe_end("9", &mut surface);
        }

        // Fresh page, fresh watcher, same surviving layer.
        let store = store_with(session);
        let page = VirtualPage::new();
        page.add_cta_button();
        let registry = registry_of(&["9"]);
        let mut watcher = CompletionWatcher::new(&store, 90);
        let mut surface = page.clone();
        watcher.ensure_armed(&registry, &mut surface);
        assert!(page.cta_visible());
    }

    #[test]
    fn missing_button_disarms_the_watcher() {
        let store = store_with(Arc::new(MemoryBackend::new(LayerKind::Session)));
        let page = VirtualPage::new();
        let registry = registry_of(&["1"]);

        let mut watcher = CompletionWatcher::new(&store, 90);
        let mut surface = page.clone();
        watcher.ensure_armed(&registry, &mut surface);
        watcher.observe_end("1", &mut surface);
        assert!(!page.cta_visible());
    }
}

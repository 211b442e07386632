use std::sync::{Arc, Mutex, PoisonError};

use super::{PageSurface, SlotId, VideoSlot};

#[derive(Debug, Default)]
struct SlotState {
    slot: SlotId,
    resource_id: Option<String>,
    lock_exempt: bool,
    overlay: bool,
    badge: bool,
    marked_unlocked: bool,
}

#[derive(Debug, Default)]
struct PageInner {
    slots: Vec<SlotState>,
    next_slot: SlotId,
    cta_present: bool,
    cta_visible: bool,
    back_button_url: Option<String>,
}

/// In-memory page model. Clones share state, so a test (or a host shell
/// prototype) can keep a handle while the session owns the boxed surface.
#[derive(Clone, Default)]
pub struct VirtualPage {
    inner: Arc<Mutex<PageInner>>,
}

impl VirtualPage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PageInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mount a video container at the end of the page.
    pub fn add_video(&self, resource_id: Option<&str>, lock_exempt: bool) -> SlotId {
        let mut inner = self.lock();
        let slot = inner.next_slot;
        inner.next_slot += 1;
        inner.slots.push(SlotState {
            slot,
            resource_id: resource_id.map(str::to_string),
            lock_exempt,
            ..SlotState::default()
        });
        slot
    }

    pub fn add_cta_button(&self) {
        self.lock().cta_present = true;
    }

    pub fn cta_visible(&self) -> bool {
        self.lock().cta_visible
    }

    pub fn has_badge(&self, slot: SlotId) -> bool {
        self.lock()
            .slots
            .iter()
            .any(|s| s.slot == slot && s.badge)
    }

    pub fn back_button_url(&self) -> Option<String> {
        self.lock().back_button_url.clone()
    }
}

impl PageSurface for VirtualPage {
    fn scan_video_slots(&mut self) -> Vec<VideoSlot> {
        self.lock()
            .slots
            .iter()
            .map(|s| VideoSlot {
                slot: s.slot,
                resource_id: s.resource_id.clone(),
                lock_exempt: s.lock_exempt,
            })
            .collect()
    }

    fn render_lock(&mut self, slot: SlotId) {
        if let Some(s) = self.lock().slots.iter_mut().find(|s| s.slot == slot) {
            s.overlay = true;
        }
    }

    fn clear_lock(&mut self, slot: SlotId) -> bool {
        if let Some(s) = self.lock().slots.iter_mut().find(|s| s.slot == slot) {
            let had_overlay = s.overlay;
            s.overlay = false;
            had_overlay
        } else {
            false
        }
    }

    fn is_locked(&self, slot: SlotId) -> bool {
        self.lock().slots.iter().any(|s| s.slot == slot && s.overlay)
    }

    fn mark_unlocked(&mut self, slot: SlotId) {
        if let Some(s) = self.lock().slots.iter_mut().find(|s| s.slot == slot) {
            s.marked_unlocked = true;
        }
    }

    fn is_marked_unlocked(&self, slot: SlotId) -> bool {
        self.lock()
            .slots
            .iter()
            .any(|s| s.slot == slot && s.marked_unlocked)
    }

    fn show_unlocked_badge(&mut self, slot: SlotId) {
        if let Some(s) = self.lock().slots.iter_mut().find(|s| s.slot == slot) {
            s.badge = true;
        }
    }

    fn dismiss_badge(&mut self, slot: SlotId) {
        if let Some(s) = self.lock().slots.iter_mut().find(|s| s.slot == slot) {
            s.badge = false;
        }
    }

    fn cta_button_present(&self) -> bool {
        self.lock().cta_present
    }

    fn reveal_cta_button(&mut self) {
        let mut inner = self.lock();
        if inner.cta_present {
            inner.cta_visible = true;
        }
    }

    fn show_back_button(&mut self, url: &str) {
        self.lock().back_button_url = Some(url.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_and_marker_lifecycle() {
        let page = VirtualPage::new();
        let slot = page.add_video(Some("101"), false);
        let mut surface = page.clone();

        assert!(!surface.is_locked(slot));
        surface.render_lock(slot);
        assert!(surface.is_locked(slot));

        assert!(surface.clear_lock(slot));
        assert!(!surface.clear_lock(slot));
        assert!(!surface.is_marked_unlocked(slot));
        surface.mark_unlocked(slot);
        assert!(surface.is_marked_unlocked(slot));
    }

    #[test]
    fn cta_reveal_requires_a_button() {
        let page = VirtualPage::new();
        let mut surface = page.clone();
        surface.reveal_cta_button();
        assert!(!page.cta_visible());

        page.add_cta_button();
        surface.reveal_cta_button();
        assert!(page.cta_visible());
    }
}

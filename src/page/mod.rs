// The page surface is the engine's only view of the host UI. Hosts bridge
// these calls to their real DOM/webview; VirtualPage is the in-memory
// reference implementation.

mod virtual_page;

pub use virtual_page::VirtualPage;

/// Stable handle for one video container on the page.
pub type SlotId = u64;

/// What a page scan reports for one video container, in DOM order.
#[derive(Debug, Clone)]
pub struct VideoSlot {
    pub slot: SlotId,
    /// Numeric-string resource id from the container's authoring attributes.
    /// Containers without one are excluded from the unlock sequence.
    pub resource_id: Option<String>,
    /// Authoring-time opt-out of the sequential gate.
    pub lock_exempt: bool,
}

/// Host-implemented view of the lesson page.
///
/// All calls are idempotent: rendering a lock on an already-locked slot or
/// clearing an absent overlay must be a no-op, because the periodic rescan
/// and the event-driven re-evaluation both touch the same slots.
pub trait PageSurface: Send {
    /// Enumerate video containers in DOM order. Called on every rescan;
    /// containers may appear late as the player framework initializes.
    fn scan_video_slots(&mut self) -> Vec<VideoSlot>;

    fn render_lock(&mut self, slot: SlotId);

    /// Remove the lock overlay. Returns whether an overlay was present, so
    /// the caller knows a visible transition happened.
    fn clear_lock(&mut self, slot: SlotId) -> bool;

    fn is_locked(&self, slot: SlotId) -> bool;

    /// Sticky unlock marker, independent of the progress store. Survives
    /// rescans within the page lifetime and keeps a degraded-storage read
    /// miss from ever re-locking a slot.
    fn mark_unlocked(&mut self, slot: SlotId);

    fn is_marked_unlocked(&self, slot: SlotId) -> bool;

    fn show_unlocked_badge(&mut self, slot: SlotId);

    fn dismiss_badge(&mut self, slot: SlotId);

    fn cta_button_present(&self) -> bool;

    fn reveal_cta_button(&mut self);

    fn show_back_button(&mut self, url: &str);
}

// Sequential-unlock control: ordered lesson videos, each gated on every
// earlier one reaching the watch threshold. Unlocking is a one-way ratchet.

mod sequence;

use std::collections::HashSet;

pub use sequence::{LessonVideo, LockState, build_sequence, desired_state, predecessors_complete};

use crate::page::{PageSurface, SlotId};
use crate::progress::ProgressLedger;

/// Drives lock/unlock state for the lesson sequence against a page surface.
///
/// The controller is re-entrant by construction: the poll-driven rescan and
/// the event-driven re-evaluation compute the same decisions, and applying a
/// decision twice is a no-op on the page.
pub struct UnlockController {
    ledger: ProgressLedger,
    videos: Vec<LessonVideo>,
    /// Slots this controller has unlocked. The page marker is authoritative
    /// across controller rebuilds; this set just saves page round-trips.
    sticky: HashSet<SlotId>,
    warned_slots: HashSet<SlotId>,
}

impl UnlockController {
    pub fn new(ledger: ProgressLedger) -> Self {
        UnlockController {
            ledger,
            videos: Vec::new(),
            sticky: HashSet::new(),
            warned_slots: HashSet::new(),
        }
    }

    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    /// Re-enumerate the page and (re)apply lock state to every slot.
    /// Returns slots whose overlay came off during this pass, i.e. visible
    /// unlock transitions that deserve a badge.
    pub fn rescan(&mut self, page: &mut dyn PageSurface) -> Vec<SlotId> {
        let slots = page.scan_video_slots();
        let (videos, skipped) = build_sequence(&slots);
        for slot in skipped {
            if self.warned_slots.insert(slot) {
                tracing::warn!(
                    slot,
                    "video container has no resource id; excluded from the unlock sequence"
                );
            }
        }
        self.videos = videos;

        let threshold = self.ledger.threshold();
        let decisions: Vec<(SlotId, LockState)> = (0..self.videos.len())
            .map(|index| {
                let video = &self.videos[index];
                let state = if self.sticky.contains(&video.slot)
                    || page.is_marked_unlocked(video.slot)
                {
                    // Sticky: a slot that was ever unlocked stays unlocked,
                    // even if a degraded layer has lost the numbers.
                    LockState::Unlocked
                } else {
                    desired_state(
                        &self.videos,
                        index,
                        |resource_id| self.ledger.percent(resource_id),
                        threshold,
                    )
                };
                (video.slot, state)
            })
            .collect();

        let mut newly_visible = Vec::new();
        for (slot, state) in decisions {
            match state {
                LockState::Unlocked => {
                    if self.apply_unlock(slot, page) {
                        newly_visible.push(slot);
                    }
                }
                LockState::Locked => page.render_lock(slot),
            }
        }
        newly_visible
    }

    /// Ingest a fractional progress report. On a threshold crossing the
    /// immediate successor is re-evaluated synchronously; deeper cascades
    /// are picked up by the next poll rescan.
    pub fn ingest_progress(
        &mut self,
        resource_id: &str,
        fraction: f64,
        page: &mut dyn PageSurface,
    ) -> Vec<SlotId> {
        let Some(percent) = self.ledger.record_fraction(resource_id, fraction) else {
            tracing::debug!(resource_id, fraction, "dropping out-of-range progress report");
            return Vec::new();
        };
        if percent < self.ledger.threshold() {
            return Vec::new();
        }
        self.unlock_successor(resource_id, page)
    }

    /// An end event counts as fully watched.
    pub fn ingest_ended(&mut self, resource_id: &str, page: &mut dyn PageSurface) -> Vec<SlotId> {
        self.ledger.record_percent(resource_id, 100);
        self.unlock_successor(resource_id, page)
    }

    fn unlock_successor(&mut self, resource_id: &str, page: &mut dyn PageSurface) -> Vec<SlotId> {
        let Some(position) = self.videos.iter().position(|v| v.resource_id == resource_id)
        else {
            return Vec::new();
        };
        let next = position + 1;
        if next >= self.videos.len() {
            return Vec::new();
        }
        let eligible = predecessors_complete(
            &self.videos,
            next,
            |resource_id| self.ledger.percent(resource_id),
            self.ledger.threshold(),
        );
        if !eligible {
            return Vec::new();
        }
        let slot = self.videos[next].slot;
        if self.apply_unlock(slot, page) {
            tracing::info!(
                resource_id = %self.videos[next].resource_id,
                "unlocked next lesson video"
            );
            vec![slot]
        } else {
            Vec::new()
        }
    }

    /// Returns true when an overlay actually came off (a visible transition,
    /// worth a badge); silent confirmations return false.
    fn apply_unlock(&mut self, slot: SlotId, page: &mut dyn PageSurface) -> bool {
        let had_overlay = page.clear_lock(slot);
        if self.sticky.insert(slot) {
            page.mark_unlocked(slot);
        }
        if had_overlay {
            page.show_unlocked_badge(slot);
        }
        had_overlay
    }
}

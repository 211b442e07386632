//! Pure gate decisions over a snapshot of the lesson sequence. No page, no
//! timers, no storage — the controller feeds these from whatever it scanned.

use crate::page::{SlotId, VideoSlot};

/// One trackable video in the sequence. Identity is the resource id; the
/// index is derived from page order at scan time and never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonVideo {
    pub slot: SlotId,
    pub resource_id: String,
    pub index: usize,
    pub always_unlocked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocked,
}

/// Build the ordered sequence from a page scan, dropping containers without
/// a resource id. Returns the sequence and the dropped slots.
pub fn build_sequence(slots: &[VideoSlot]) -> (Vec<LessonVideo>, Vec<SlotId>) {
    let mut videos = Vec::new();
    let mut skipped = Vec::new();
    for s in slots {
        match &s.resource_id {
            Some(resource_id) => videos.push(LessonVideo {
                slot: s.slot,
                resource_id: resource_id.clone(),
                index: videos.len(),
                always_unlocked: s.lock_exempt,
            }),
            None => skipped.push(s.slot),
        }
    }
    (videos, skipped)
}

/// Every non-exempt predecessor of `index` has reached the threshold.
/// Exempt videos are skipped entirely, they neither gate nor block.
pub fn predecessors_complete<F>(
    videos: &[LessonVideo],
    index: usize,
    percent: F,
    threshold: u8,
) -> bool
where
    F: Fn(&str) -> u8,
{
    videos[..index]
        .iter()
        .filter(|v| !v.always_unlocked)
        .all(|v| percent(&v.resource_id) >= threshold)
}

pub fn desired_state<F>(videos: &[LessonVideo], index: usize, percent: F, threshold: u8) -> LockState
where
    F: Fn(&str) -> u8,
{
    let video = &videos[index];
    if video.always_unlocked || predecessors_complete(videos, index, percent, threshold) {
        LockState::Unlocked
    } else {
        LockState::Locked
    }
}

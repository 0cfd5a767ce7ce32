//! Compact re-numbering of raw track labels.
//!
//! Labels get small integer slots in order of appearance. A label missing
//! from a frame frees its slot, and the next newcomer takes the oldest
//! free slot. No pose information is used; every record is kept.

use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};

use crate::detection::{group_frames, Detection, IdentityKey};
use crate::error::{RepairError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecycleReport {
    pub frames: usize,
    /// Distinct slots handed out
    pub slots: i64,
    /// Times a freed slot went to a newcomer
    pub reused: usize,
}

#[derive(Debug, Default)]
struct SlotPool {
    bindings: HashMap<IdentityKey, i64>,
    free: VecDeque<i64>,
    next: i64,
    reused: usize,
}

impl SlotPool {
    fn slot_for(&mut self, key: &IdentityKey) -> i64 {
        if let Some(&slot) = self.bindings.get(key) {
            return slot;
        }
        let slot = match self.free.pop_front() {
            Some(slot) => {
                self.reused += 1;
                slot
            }
            None => {
                self.next += 1;
                self.next - 1
            }
        };
        self.bindings.insert(key.clone(), slot);
        slot
    }

    fn release<'a>(&mut self, gone: impl Iterator<Item = &'a IdentityKey>) {
        let mut slots: Vec<i64> = gone.filter_map(|k| self.bindings.remove(k)).collect();
        slots.sort_unstable();
        self.free.extend(slots);
    }
}

/// Rewrite every record's `idx` to a recycled slot. Output keeps input order.
pub fn recycle(detections: &[Detection]) -> Result<(Vec<Detection>, RecycleReport)> {
    let keys = detections
        .iter()
        .enumerate()
        .map(|(index, det)| {
            det.raw_key().ok_or_else(|| RepairError::MissingLabel {
                index,
                image_id: det.image_id().to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let frames = group_frames(detections);
    if frames.is_empty() {
        return Err(RepairError::NoFrames);
    }

    let mut pool = SlotPool::default();
    let mut active: HashSet<&IdentityKey> = HashSet::new();
    let mut out = detections.to_vec();

    for frame in &frames {
        let mut current = HashSet::new();
        for &i in &frame.indices {
            let slot = pool.slot_for(&keys[i]);
            current.insert(&keys[i]);
            out[i].set_idx(slot.into());
        }

        let gone: Vec<&IdentityKey> = active.difference(&current).copied().collect();
        if !gone.is_empty() {
            debug!("Frame {}: {} labels left, slots freed", frame.image_id, gone.len());
        }
        pool.release(gone.into_iter());
        active = current;
    }

    let report = RecycleReport {
        frames: frames.len(),
        slots: pool.next,
        reused: pool.reused,
    };
    info!(
        "Recycled labels over {} frames: {} slots, {} reuses",
        report.frames, report.slots, report.reused
    );
    Ok((out, report))
}

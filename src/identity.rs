use nalgebra::Point2;
use std::collections::VecDeque;

use crate::detection::IdentityKey;
use crate::pose::Pose;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityState {
    /// Matched in the latest frame
    Present,
    /// Not matched in the latest frame, still eligible
    Absent,
    /// Absent for too long, no longer matched
    Retired,
}

/// One slot of the closed identity pool.
#[derive(Debug, Clone)]
pub struct Identity {
    pub key: IdentityKey,
    /// Most recent accepted poses, oldest first
    history: VecDeque<Pose>,
    capacity: usize,
    last_center: Option<Point2<f64>>,
    pub state: IdentityState,
    /// Consecutive frames without a match
    pub absent_frames: u32,
    /// Detections accepted so far, including the frame-0 binding
    pub hits: usize,
}

impl Identity {
    /// Create an empty slot. `capacity` is clamped to at least one pose.
    pub fn new(key: IdentityKey, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            key,
            history: VecDeque::with_capacity(capacity),
            capacity,
            last_center: None,
            state: IdentityState::Present,
            absent_frames: 0,
            hits: 0,
        }
    }

    /// Bind the frame-0 detection. A pose without a center seeds nothing.
    pub fn seed(&mut self, pose: &Pose, center: Option<Point2<f64>>) {
        self.hits += 1;
        if let Some(c) = center {
            self.push_pose(pose.clone());
            self.last_center = Some(c);
        }
    }

    /// Record an accepted match.
    pub fn update(&mut self, pose: Pose, center: Point2<f64>) {
        self.push_pose(pose);
        self.last_center = Some(center);
        self.state = IdentityState::Present;
        self.absent_frames = 0;
        self.hits += 1;
    }

    /// Note a frame without a match; retire once `max_absent` is exceeded.
    pub fn mark_missed(&mut self, max_absent: Option<u32>) {
        if self.state == IdentityState::Retired {
            return;
        }
        self.absent_frames += 1;
        self.state = match max_absent {
            Some(limit) if self.absent_frames > limit => IdentityState::Retired,
            _ => IdentityState::Absent,
        };
    }

    fn push_pose(&mut self, pose: Pose) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(pose);
    }

    /// The pose new detections are compared against.
    pub fn reference_pose(&self) -> Option<&Pose> {
        self.history.back()
    }

    pub fn last_center(&self) -> Option<Point2<f64>> {
        self.last_center
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn is_retired(&self) -> bool {
        self.state == IdentityState::Retired
    }
}

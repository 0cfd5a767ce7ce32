use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::RepairConfig;
use crate::detection::{group_frames, parse_poses, Detection, IdentityKey};
use crate::error::{RepairError, Result};
use crate::identity::{Identity, IdentityState};
use crate::matcher::{match_frame, Observation};
use crate::pose::Pose;

/// Summary of one repair run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairReport {
    pub frames: usize,
    /// Pool keys in creation order
    pub identities: Vec<IdentityKey>,
    pub emitted: usize,
    pub dropped: usize,
    /// Accepted detections per identity, frame-0 binding included
    pub hits: Vec<(IdentityKey, usize)>,
    pub retired: Vec<IdentityKey>,
}

impl fmt::Display for RepairReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} frames, {} identities, {} records kept, {} dropped",
            self.frames,
            self.identities.len(),
            self.emitted,
            self.dropped
        )?;
        for (key, hits) in &self.hits {
            let tag = if self.retired.contains(key) { " (retired)" } else { "" };
            writeln!(f, "  id {}: {} frames{}", key, hits, tag)?;
        }
        Ok(())
    }
}

/// Repaired records plus the run summary.
#[derive(Debug, Clone)]
pub struct RepairOutput {
    pub detections: Vec<Detection>,
    pub report: RepairReport,
}

/// Re-associates detections to the closed identity pool built from the
/// first frame.
#[derive(Debug, Clone)]
pub struct IdentityRepairer {
    config: RepairConfig,
    identities: Vec<Identity>,
    frame_count: usize,
}

impl IdentityRepairer {
    /// Build the pool from the first frame and bind its detections.
    ///
    /// Raw labels become keys only when every detection has a usable one and
    /// they are all distinct; otherwise identities are numbered `0..N-1`.
    pub fn from_first_frame(
        config: RepairConfig,
        frame: &[(&Detection, &Pose)],
    ) -> Result<(Self, Vec<Detection>)> {
        config.validate()?;
        let Some((first, _)) = frame.first() else {
            return Err(RepairError::NoFrames);
        };

        let keys = initial_keys(frame);
        let mut identities = Vec::with_capacity(keys.len());
        let mut emitted = Vec::with_capacity(keys.len());

        for (key, &(det, pose)) in keys.into_iter().zip(frame) {
            let mut identity = Identity::new(key, config.pose_history);
            let center = pose.center(config.visibility_threshold);
            if center.is_none() {
                warn!(
                    "Identity {} starts without history: no visible joints in {}",
                    identity.key,
                    det.image_id()
                );
            }
            identity.seed(pose, center);
            emitted.push(det.with_identity(&identity.key));
            identities.push(identity);
        }

        info!(
            "Locked {} identities from frame {}: [{}]",
            identities.len(),
            first.image_id(),
            identities
                .iter()
                .map(|i| i.key.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let repairer = IdentityRepairer {
            config,
            identities,
            frame_count: 1,
        };
        Ok((repairer, emitted))
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn config(&self) -> &RepairConfig {
        &self.config
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Match one later frame. Returns the re-labelled records in acceptance
    /// order; unmatched detections are left out.
    pub fn update(&mut self, frame: &[(&Detection, &Pose)]) -> Vec<Detection> {
        let threshold = self.config.visibility_threshold;
        let observations: Vec<Observation<'_>> = frame
            .iter()
            .map(|&(_, pose)| Observation {
                pose,
                center: pose.center(threshold),
            })
            .collect();

        let matching = match_frame(&self.identities, &observations, &self.config);

        let mut emitted = Vec::with_capacity(matching.matches.len());
        for m in &matching.matches {
            let Some(center) = observations[m.detection].center else {
                continue;
            };
            let (det, pose) = frame[m.detection];
            let identity = &mut self.identities[m.identity];
            identity.update(pose.clone(), center);
            emitted.push(det.with_identity(&identity.key));
        }

        for &i in &matching.unmatched_identities {
            let identity = &mut self.identities[i];
            let was_retired = identity.is_retired();
            identity.mark_missed(self.config.max_absent_frames);
            if !was_retired && identity.state == IdentityState::Retired {
                info!(
                    "Identity {} retired after {} absent frames",
                    identity.key, identity.absent_frames
                );
            }
        }

        if !matching.unmatched_detections.is_empty() {
            debug!(
                "Frame {}: dropping {} unmatched detections",
                frame.first().map_or("?", |(d, _)| d.image_id()),
                matching.unmatched_detections.len()
            );
        }

        self.frame_count += 1;
        emitted
    }

    fn report(&self, emitted: usize, dropped: usize) -> RepairReport {
        RepairReport {
            frames: self.frame_count,
            identities: self.identities.iter().map(|i| i.key.clone()).collect(),
            emitted,
            dropped,
            hits: self
                .identities
                .iter()
                .map(|i| (i.key.clone(), i.hits))
                .collect(),
            retired: self
                .identities
                .iter()
                .filter(|i| i.is_retired())
                .map(|i| i.key.clone())
                .collect(),
        }
    }
}

fn initial_keys(frame: &[(&Detection, &Pose)]) -> Vec<IdentityKey> {
    let raw: Vec<Option<IdentityKey>> = frame.iter().map(|(d, _)| d.raw_key()).collect();
    let distinct = raw.iter().flatten().collect::<HashSet<_>>().len();

    if distinct == frame.len() {
        return raw.into_iter().flatten().collect();
    }
    if distinct > 0 {
        warn!(
            "First frame labels are incomplete or duplicated ({} distinct of {}), numbering identities from 0",
            distinct,
            frame.len()
        );
    }
    (0..frame.len() as i64).map(IdentityKey::Index).collect()
}

fn frame_slice<'a>(
    indices: &[usize],
    detections: &'a [Detection],
    poses: &'a [Pose],
) -> Vec<(&'a Detection, &'a Pose)> {
    indices.iter().map(|&i| (&detections[i], &poses[i])).collect()
}

/// Run the whole repair pass over a detection stream.
///
/// Fails before touching any identity if the stream is empty or a record
/// has malformed keypoints.
pub fn repair(detections: &[Detection], config: &RepairConfig) -> Result<RepairOutput> {
    config.validate()?;
    let poses = parse_poses(detections)?;
    let frames = group_frames(detections);
    let Some((first, rest)) = frames.split_first() else {
        return Err(RepairError::NoFrames);
    };

    let entries = frame_slice(&first.indices, detections, &poses);
    let (mut repairer, mut output) = IdentityRepairer::from_first_frame(config.clone(), &entries)?;

    for frame in rest {
        let entries = frame_slice(&frame.indices, detections, &poses);
        let emitted = repairer.update(&entries);
        debug!(
            "Frame {} (#{}): {} detections, {} matched",
            frame.image_id,
            frame.number,
            entries.len(),
            emitted.len()
        );
        output.extend(emitted);
    }

    let dropped = detections.len() - output.len();
    let report = repairer.report(output.len(), dropped);
    info!(
        "Repaired {} frames: kept {} of {} records ({} dropped)",
        report.frames,
        report.emitted,
        detections.len(),
        report.dropped
    );

    Ok(RepairOutput {
        detections: output,
        report,
    })
}

//! Gated scoring of (identity, detection) pairs and the assignment step.

use nalgebra::Point2;
use tracing::trace;

use crate::config::{AssignmentStrategy, RepairConfig};
use crate::identity::Identity;
use crate::pose::{center_distance, pose_distance, Pose};

/// A detection of the current frame, prepared for matching.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub pose: &'a Pose,
    /// `None` when no joint is visible; such a detection never matches
    pub center: Option<Point2<f64>>,
}

/// A pair that survived both gates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub score: f64,
    pub pose_distance: f64,
    pub center_distance: f64,
    pub identity: usize,
    pub detection: usize,
}

/// Outcome of matching one frame.
#[derive(Debug, Clone, Default)]
pub struct Matching {
    /// Accepted pairs, in acceptance order
    pub matches: Vec<Candidate>,
    pub unmatched_identities: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Score one pair, or `None` if a gate rejects it.
pub fn score_pair(
    identity: &Identity,
    observation: &Observation<'_>,
    config: &RepairConfig,
) -> Option<(f64, f64, f64)> {
    let center = observation.center?;

    let jump = match identity.last_center() {
        Some(last) => {
            let jump = center_distance(&center, &last);
            if jump > config.max_center_jump {
                return None;
            }
            jump
        }
        None => 0.0,
    };

    let pdist = match identity.reference_pose() {
        // no history yet: permissive, not subject to the similarity gate
        None => config.no_history_distance,
        Some(reference) => {
            let d = pose_distance(reference, observation.pose, config.visibility_threshold)?;
            if d > config.similarity_threshold {
                return None;
            }
            d
        }
    };

    let score = config.pose_weight * pdist + config.center_weight * (jump / config.center_scale());
    Some((score, pdist, jump))
}

/// Every gated pair of the frame, in identity-major order. Retired
/// identities are skipped.
pub fn build_candidates(
    identities: &[Identity],
    observations: &[Observation<'_>],
    config: &RepairConfig,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for (i, identity) in identities.iter().enumerate() {
        if identity.is_retired() {
            continue;
        }
        for (j, obs) in observations.iter().enumerate() {
            if let Some((score, pose_distance, center_distance)) = score_pair(identity, obs, config) {
                trace!(
                    "candidate id={} det={} score={:.4} pose={:.4} center={:.1}",
                    identity.key, j, score, pose_distance, center_distance
                );
                candidates.push(Candidate {
                    score,
                    pose_distance,
                    center_distance,
                    identity: i,
                    detection: j,
                });
            }
        }
    }
    candidates
}

/// Sort by score and accept each pair whose identity and detection are
/// both still free. Ties keep candidate order.
pub fn greedy_assign(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| a.score.total_cmp(&b.score));

    let mut used_ids = std::collections::HashSet::new();
    let mut used_dets = std::collections::HashSet::new();
    let mut accepted = Vec::new();

    for cand in candidates {
        if used_ids.contains(&cand.identity) || used_dets.contains(&cand.detection) {
            continue;
        }
        used_ids.insert(cand.identity);
        used_dets.insert(cand.detection);
        accepted.push(cand);
    }
    accepted
}

/// Minimum total score matching over the gated pairs.
pub fn optimal_assign(
    candidates: &[Candidate],
    n_identities: usize,
    n_detections: usize,
) -> Vec<Candidate> {
    if candidates.is_empty() {
        return Vec::new();
    }

    // above any sum of real scores, so one more real pair always wins
    let forbidden = candidates.iter().map(|c| c.score).sum::<f64>() + 1.0;
    let mut lookup = vec![vec![None; n_detections]; n_identities];
    let mut costs = vec![vec![forbidden; n_detections]; n_identities];
    for cand in candidates {
        costs[cand.identity][cand.detection] = cand.score;
        lookup[cand.identity][cand.detection] = Some(*cand);
    }

    let mut accepted: Vec<Candidate> = hungarian(&costs, forbidden)
        .into_iter()
        .filter_map(|(i, j)| lookup[i][j])
        .collect();
    accepted.sort_by(|a, b| a.score.total_cmp(&b.score));
    accepted
}

/// Potential-based Kuhn-Munkres on a rectangular cost matrix, squared up
/// with `pad` cells. Returns `(row, col)` pairs; padded cells are dropped.
fn hungarian(cost: &[Vec<f64>], pad: f64) -> Vec<(usize, usize)> {
    let n_rows = cost.len();
    let n_cols = cost.first().map_or(0, |r| r.len());
    if n_rows == 0 || n_cols == 0 {
        return Vec::new();
    }

    let n = n_rows.max(n_cols);
    let mut c = vec![vec![pad; n]; n];
    for (i, row) in cost.iter().enumerate() {
        c[i][..n_cols].copy_from_slice(row);
    }

    // 1-indexed potentials; column 0 is the dummy source
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; n + 1];
    let mut p = vec![0_usize; n + 1];
    let mut way = vec![0_usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0_usize;
        let mut min_val = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0_usize;

            for j in 1..=n {
                if !used[j] {
                    let val = c[i0 - 1][j - 1] - u[i0] - v[j];
                    if val < min_val[j] {
                        min_val[j] = val;
                        way[j] = j0;
                    }
                    if min_val[j] < delta {
                        delta = min_val[j];
                        j1 = j;
                    }
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_val[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        loop {
            p[j0] = p[way[j0]];
            j0 = way[j0];
            if j0 == 0 {
                break;
            }
        }
    }

    (1..=n)
        .filter(|&j| p[j] != 0)
        .map(|j| (p[j] - 1, j - 1))
        .filter(|&(i, j)| i < n_rows && j < n_cols)
        .collect()
}

/// Match one frame's observations against the pool.
pub fn match_frame(
    identities: &[Identity],
    observations: &[Observation<'_>],
    config: &RepairConfig,
) -> Matching {
    let candidates = build_candidates(identities, observations, config);
    let matches = match config.assignment {
        AssignmentStrategy::Greedy => greedy_assign(candidates),
        AssignmentStrategy::Optimal => {
            optimal_assign(&candidates, identities.len(), observations.len())
        }
    };

    let mut id_taken = vec![false; identities.len()];
    let mut det_taken = vec![false; observations.len()];
    for m in &matches {
        id_taken[m.identity] = true;
        det_taken[m.detection] = true;
    }

    Matching {
        matches,
        unmatched_identities: (0..identities.len()).filter(|&i| !id_taken[i]).collect(),
        unmatched_detections: (0..observations.len()).filter(|&j| !det_taken[j]).collect(),
    }
}

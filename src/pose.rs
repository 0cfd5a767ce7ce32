//! Pose geometry: visibility, centers, size/position normalization and
//! the joint-wise distance used to compare two poses.

use nalgebra::{Point2, Vector2};

/// Added to the normalization scale so a collapsed pose never divides by zero.
pub const SCALE_EPSILON: f64 = 1e-6;

/// A single keypoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Joint {
    pub position: Point2<f64>,
    pub confidence: f64,
}

impl Joint {
    pub fn new(x: f64, y: f64, confidence: f64) -> Self {
        Self {
            position: Point2::new(x, y),
            confidence,
        }
    }

    pub fn is_visible(&self, threshold: f64) -> bool {
        self.confidence > threshold
    }
}

/// Ordered joints of one person in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    joints: Vec<Joint>,
}

/// A pose centered on its visible joints and scaled to unit RMS radius.
///
/// Invisible joints are `None` so the distance only runs over joints both
/// poses actually observed.
#[derive(Debug, Clone)]
pub struct NormalizedPose {
    pub joints: Vec<Option<Vector2<f64>>>,
    pub center: Point2<f64>,
    pub scale: f64,
}

impl Pose {
    pub fn new(joints: Vec<Joint>) -> Self {
        Self { joints }
    }

    /// Build from a flat `[x1, y1, c1, x2, y2, c2, ...]` array.
    /// Returns `None` when the length is not a multiple of 3.
    pub fn from_flat(values: &[f64]) -> Option<Self> {
        if values.len() % 3 != 0 {
            return None;
        }
        let joints = values
            .chunks_exact(3)
            .map(|c| Joint::new(c[0], c[1], c[2]))
            .collect();
        Some(Self { joints })
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    fn visible(&self, threshold: f64) -> impl Iterator<Item = &Joint> {
        self.joints.iter().filter(move |j| j.is_visible(threshold))
    }

    pub fn visible_count(&self, threshold: f64) -> usize {
        self.visible(threshold).count()
    }

    /// Mean position of the visible joints, `None` if nothing is visible.
    pub fn center(&self, threshold: f64) -> Option<Point2<f64>> {
        let (sum, n) = self
            .visible(threshold)
            .fold((Vector2::<f64>::zeros(), 0usize), |(sum, n), j| {
                (sum + j.position.coords, n + 1)
            });
        if n == 0 {
            return None;
        }
        Some(Point2::from(sum / n as f64))
    }

    /// Center at the visible mean and divide by the RMS distance to it.
    pub fn normalize(&self, threshold: f64) -> Option<NormalizedPose> {
        let center = self.center(threshold)?;
        let (sq_sum, n) = self.visible(threshold).fold((0.0, 0usize), |(acc, n), j| {
            (acc + (j.position - center).norm_squared(), n + 1)
        });
        let scale = (sq_sum / n as f64).sqrt() + SCALE_EPSILON;

        let joints = self
            .joints
            .iter()
            .map(|j| {
                j.is_visible(threshold)
                    .then(|| (j.position - center) / scale)
            })
            .collect();

        Some(NormalizedPose {
            joints,
            center,
            scale,
        })
    }
}

/// Mean Euclidean distance between normalized joints visible in both poses.
///
/// `None` when either pose has no visible joints or they share none. Joints
/// past the end of the shorter pose count as not shared.
pub fn pose_distance(a: &Pose, b: &Pose, threshold: f64) -> Option<f64> {
    let na = a.normalize(threshold)?;
    let nb = b.normalize(threshold)?;

    let (sum, n) = na
        .joints
        .iter()
        .zip(nb.joints.iter())
        .filter_map(|pair| match pair {
            (Some(ja), Some(jb)) => Some((ja - jb).norm()),
            _ => None,
        })
        .fold((0.0, 0usize), |(sum, n), d| (sum + d, n + 1));

    if n == 0 {
        return None;
    }
    Some(sum / n as f64)
}

/// Euclidean distance between two centers.
pub fn center_distance(a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    nalgebra::distance(a, b)
}

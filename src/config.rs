use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{RepairError, Result};

/// How the gated candidate pairs of one frame are turned into a matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStrategy {
    /// Consume candidates in ascending score order
    #[default]
    Greedy,
    /// Minimum total score matching (Hungarian)
    Optimal,
}

/// Tunables for the identity repair pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Poses kept per identity
    pub pose_history: usize,
    /// Max center movement between accepted detections, in pixels
    pub max_center_jump: f64,
    /// Max normalized pose distance; 0 accepts only identical poses
    pub similarity_threshold: f64,
    pub pose_weight: f64,
    pub center_weight: f64,
    /// Joints with confidence at or below this are invisible
    pub visibility_threshold: f64,
    /// Pose distance used when an identity has no reference pose yet
    pub no_history_distance: f64,
    pub assignment: AssignmentStrategy,
    /// Retire identities absent for more than this many consecutive frames
    pub max_absent_frames: Option<u32>,
}

/// Command-line values that take precedence over a loaded config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub max_center_jump: Option<f64>,
    pub similarity_threshold: Option<f64>,
    pub pose_history: Option<usize>,
    pub max_absent_frames: Option<u32>,
    /// Switch to optimal assignment; `false` keeps whatever was loaded
    pub optimal: bool,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            pose_history: 5,
            max_center_jump: 150.0,
            similarity_threshold: 0.9,
            pose_weight: 0.7,
            center_weight: 0.3,
            visibility_threshold: 0.05,
            no_history_distance: 0.5,
            assignment: AssignmentStrategy::Greedy,
            max_absent_frames: None,
        }
    }
}

impl RepairConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|e| RepairError::io(path, e))?;
        let cfg: RepairConfig = serde_json::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `overrides` on top of this config and validate the result.
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Result<Self> {
        if let Some(v) = overrides.max_center_jump {
            self.max_center_jump = v;
        }
        if let Some(v) = overrides.similarity_threshold {
            self.similarity_threshold = v;
        }
        if let Some(v) = overrides.pose_history {
            self.pose_history = v;
        }
        if overrides.max_absent_frames.is_some() {
            self.max_absent_frames = overrides.max_absent_frames;
        }
        if overrides.optimal {
            self.assignment = AssignmentStrategy::Optimal;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the matcher cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.pose_history == 0 {
            return Err(RepairError::Config("pose_history must be at least 1".into()));
        }
        let non_negative = [
            ("max_center_jump", self.max_center_jump),
            ("similarity_threshold", self.similarity_threshold),
            ("pose_weight", self.pose_weight),
            ("center_weight", self.center_weight),
            ("visibility_threshold", self.visibility_threshold),
            ("no_history_distance", self.no_history_distance),
        ];
        for (name, value) in non_negative {
            if value.is_nan() || value < 0.0 {
                return Err(RepairError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Divisor that maps center distance onto the pose-distance scale.
    pub fn center_scale(&self) -> f64 {
        self.max_center_jump.max(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = RepairConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.pose_history, 5);
        assert_eq!(cfg.assignment, AssignmentStrategy::Greedy);
        assert!(cfg.max_absent_frames.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: RepairConfig =
            serde_json::from_str(r#"{"similarity_threshold": 1.2, "assignment": "optimal"}"#)
                .unwrap();
        assert_eq!(cfg.similarity_threshold, 1.2);
        assert_eq!(cfg.assignment, AssignmentStrategy::Optimal);
        assert_eq!(cfg.max_center_jump, 150.0);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_center_jump": 80.0, "max_absent_frames": 10}}"#).unwrap();

        let cfg = RepairConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.max_center_jump, 80.0);
        assert_eq!(cfg.max_absent_frames, Some(10));
    }

    #[test]
    fn test_file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"similarity_threshold": 0.4, "pose_history": 8}}"#).unwrap();

        let cfg = RepairConfig::from_file(file.path())
            .unwrap()
            .with_overrides(&ConfigOverrides::default())
            .unwrap();
        assert_eq!(cfg.similarity_threshold, 0.4);
        assert_eq!(cfg.pose_history, 8);
        assert_eq!(cfg.max_center_jump, 150.0);
        assert_eq!(cfg.assignment, AssignmentStrategy::Greedy);
    }

    #[test]
    fn test_overrides_take_precedence_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"max_center_jump": 80.0, "similarity_threshold": 0.4, "max_absent_frames": 10}}"#
        )
        .unwrap();

        let overrides = ConfigOverrides {
            max_center_jump: Some(40.0),
            pose_history: Some(3),
            max_absent_frames: Some(2),
            optimal: true,
            ..ConfigOverrides::default()
        };
        let cfg = RepairConfig::from_file(file.path())
            .unwrap()
            .with_overrides(&overrides)
            .unwrap();
        assert_eq!(cfg.max_center_jump, 40.0);
        assert_eq!(cfg.pose_history, 3);
        assert_eq!(cfg.max_absent_frames, Some(2));
        assert_eq!(cfg.assignment, AssignmentStrategy::Optimal);
        // not overridden, so the file value stands
        assert_eq!(cfg.similarity_threshold, 0.4);
    }

    #[test]
    fn test_overrides_are_validated() {
        let overrides = ConfigOverrides {
            pose_history: Some(0),
            ..ConfigOverrides::default()
        };
        assert!(matches!(
            RepairConfig::default().with_overrides(&overrides),
            Err(RepairError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cfg = RepairConfig {
            pose_history: 0,
            ..RepairConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(RepairError::Config(_))));

        let cfg = RepairConfig {
            max_center_jump: -1.0,
            ..RepairConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = RepairConfig {
            pose_weight: f64::NAN,
            ..RepairConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_center_scale_floor() {
        let cfg = RepairConfig {
            max_center_jump: 0.0,
            ..RepairConfig::default()
        };
        assert_eq!(cfg.center_scale(), 1.0);
    }
}

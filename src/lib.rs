pub mod config;
pub mod detection;
pub mod error;
pub mod identity;
pub mod inspect;
pub mod matcher;
pub mod pose;
pub mod recycle;
pub mod repair;

// Re-export main types
pub use crate::config::{AssignmentStrategy, ConfigOverrides, RepairConfig};
pub use crate::detection::{Detection, IdentityKey};
pub use crate::error::{RepairError, Result};
pub use crate::repair::{repair, IdentityRepairer, RepairOutput, RepairReport};

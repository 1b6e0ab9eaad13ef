//! Training module
//!
//! - Explicit SGD training loop with per-epoch validation
//! - Constant or reduce-on-plateau learning rate

pub mod scheduler;
pub mod trainer;

pub use scheduler::{LearningRateScheduler, LrSchedule};
pub use trainer::{evaluate, steps_per_epoch, Evaluation, Trainer};

// Re-export TrainingConfig from model::config where it's defined
pub use crate::model::config::TrainingConfig;

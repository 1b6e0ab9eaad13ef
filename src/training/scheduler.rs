//! Learning rate schedule
//!
//! The rate is either constant or divided by a factor whenever the validation
//! error has stopped improving for `patience` epochs.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::TrainingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum LrSchedule {
    #[default]
    Constant,

    ReduceOnPlateau {
        factor: f64,
        patience: usize,
        min_lr: f64,
    },
}

impl LrSchedule {
    pub fn from_config(config: &TrainingConfig) -> Self {
        match config.plateau_patience {
            Some(patience) => LrSchedule::ReduceOnPlateau {
                factor: config.plateau_factor,
                patience,
                min_lr: config.min_learning_rate,
            },
            None => LrSchedule::Constant,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LearningRateScheduler {
    schedule: LrSchedule,
    base_lr: f64,
    current_lr: f64,
    best_error: Option<f64>,
    epochs_without_improvement: usize,
}

impl LearningRateScheduler {
    pub fn new(schedule: LrSchedule, base_lr: f64) -> Self {
        Self {
            schedule,
            base_lr,
            current_lr: base_lr,
            best_error: None,
            epochs_without_improvement: 0,
        }
    }

    pub fn lr(&self) -> f64 {
        self.current_lr
    }

    /// Record the validation error of a finished epoch and return the rate
    /// for the next one.
    pub fn step(&mut self, validation_error: f64) -> f64 {
        let LrSchedule::ReduceOnPlateau {
            factor,
            patience,
            min_lr,
        } = self.schedule
        else {
            return self.current_lr;
        };

        let improved = self.best_error.map_or(true, |best| validation_error < best);
        if improved {
            self.best_error = Some(validation_error);
            self.epochs_without_improvement = 0;
            return self.current_lr;
        }

        self.epochs_without_improvement += 1;
        if self.epochs_without_improvement >= patience {
            let reduced = (self.current_lr * factor).max(min_lr);
            if reduced < self.current_lr {
                info!(
                    "Validation error plateaued at {:.4}, learning rate {:.6} -> {:.6}",
                    validation_error, self.current_lr, reduced
                );
            }
            self.current_lr = reduced;
            self.epochs_without_improvement = 0;
        }

        self.current_lr
    }

    pub fn reset(&mut self) {
        self.current_lr = self.base_lr;
        self.best_error = None;
        self.epochs_without_improvement = 0;
    }
}

//! Per-group forecast trainer.

pub mod model;
pub mod series;
pub mod trainer;

pub use model::{ArModel, FitError};
pub use trainer::{train_all, train_group, GroupOutcome, SkipReason, TrainingReport};

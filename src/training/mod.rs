//! Training and evaluation loops.
//!
//! - [`train_epoch`]: one pass of forward/loss/backward/step per batch,
//!   with loss accumulation, periodic logging, and end-of-epoch
//!   checkpointing
//! - [`evaluate`]: gradient-free accuracy sweep
//! - [`fit`]: multi-epoch driver combining the two

pub mod config;
pub mod evaluator;
pub mod trainer;

pub use config::TrainingConfig;
pub use evaluator::{evaluate, evaluate_detailed, EvalReport};
pub use trainer::{fit, load_checkpoint, save_checkpoint, train_epoch, EpochReport, FitSummary};

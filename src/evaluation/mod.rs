//! 交差検証・ホールドアウト評価・混同行列。
use thiserror::Error;

use crate::classification::ModelError;

pub mod cross_val;
pub mod metrics;
pub mod split;

pub use cross_val::{CvEntry, compare_models, cross_val_score};
pub use metrics::{ClassificationMetrics, ConfusionMatrix, MetricsCalculator, NormalizedConfusion, accuracy};
pub use split::{StratifiedKFold, TrainTestSplit, train_test_split};

#[derive(Debug, Error, PartialEq)]
pub enum EvaluationError {
    #[error("cannot split {samples} samples into {folds} folds")]
    TooFewSamples { samples: usize, folds: usize },
    #[error("every class has fewer than {folds} members")]
    AllClassesTooSmall { folds: usize },
    #[error("n_splits must be at least 2, got {0}")]
    InvalidFolds(usize),
    #[error("test_size must be in (0, 1), got {0}")]
    InvalidTestSize(f64),
    #[error("split of {samples} samples with test_size {test_size} leaves an empty side")]
    EmptySplit { samples: usize, test_size: f64 },
    #[error("{truth} true labels but {predicted} predictions")]
    LengthMismatch { truth: usize, predicted: usize },
    #[error("label {label} is outside the category set of size {categories}")]
    UnknownLabel { label: usize, categories: usize },
    #[error("no samples to evaluate")]
    Empty,
    #[error(transparent)]
    Model(#[from] ModelError),
}

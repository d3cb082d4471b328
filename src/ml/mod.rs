//! 機械学習モジュール
//!
//! 標準化 → RFE → SVM + ランダムフォレストのソフト投票アンサンブル

pub mod bundle;
pub mod ensemble;
pub mod forest;
pub mod grid_search;
pub mod inference;
pub mod label_encoder;
pub mod metrics;
pub mod scaler;
pub mod selector;
pub mod svm;
pub mod training;

pub use bundle::{BatchPrediction, ModelBundle};
pub use inference::{majority_vote, soft_vote, PredictionSummary, Predictor, UndoOutcome};
pub use training::{Trainer, TrainedModel, TrainingCorpus, TrainingReport};

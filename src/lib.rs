//! 色ペアのサンプルからグラフェンの層数を分類する
//!
//! データの流れ: [`sampler`] → [`features`] → {学習時は [`collector`] |
//! 推論時は [`ml::Predictor`]}。[`ml::Trainer`] が書き出したレコードから
//! [`ml::ModelBundle`] を作り、[`model::save_bundle`] で保存する。

pub mod collector;
pub mod commands;
pub mod csv_loader;
pub mod error;
pub mod features;
pub mod logging;
pub mod ml;
pub mod model;
pub mod sampler;
pub mod types;

pub use error::{GrapheneError, Result};
pub use features::{FeatureRecord, FEATURE_NAMES, NUM_FEATURES};
pub use types::{DiffMode, LayerCount, PointPair, SampledPoint};

//! 学習済みパイプライン: 標準化・特徴量選択・アンサンブル・ラベル復号

use ndarray::Array2;

use crate::error::{GrapheneError, Result};
use crate::features::{FeatureRecord, FEATURE_NAMES};
use crate::ml::ensemble::SoftVotingEnsemble;
use crate::ml::label_encoder::LabelEncoder;
use crate::ml::scaler::StandardScaler;
use crate::ml::selector::FeatureSelector;
use crate::ml::svm::argmax;
use crate::types::LayerCount;

/// 特徴量レコードを層数に変換するのに必要なものすべて
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBundle {
    pub scaler: StandardScaler,
    pub feature_selector: FeatureSelector,
    pub ensemble: SoftVotingEnsemble,
    pub label_encoder: LabelEncoder,
    /// スケーラーを学習したときの列順
    pub full_feature_names: Vec<String>,
    pub selected_feature_names: Vec<String>,
}

/// [`ModelBundle::predict_batch`] の出力
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPrediction {
    /// レコードごとの層数
    pub labels: Vec<LayerCount>,
    /// アンサンブルの確率（列はラベルエンコーダの順）
    pub probabilities: Array2<f64>,
}

impl ModelBundle {
    /// 各部品の形状と列名が整合しているか確認する
    pub fn validate(&self) -> std::result::Result<(), String> {
        let n_full = self.full_feature_names.len();
        if self.scaler.n_features() != n_full {
            return Err(format!(
                "scaler expects {} features, names list has {}",
                self.scaler.n_features(),
                n_full
            ));
        }
        if let Some(unknown) = self
            .full_feature_names
            .iter()
            .find(|name| !FEATURE_NAMES.contains(&name.as_str()))
        {
            return Err(format!("unknown feature name '{}'", unknown));
        }
        if self.feature_selector.n_features_in() != n_full {
            return Err(format!(
                "selector expects {} inputs, names list has {}",
                self.feature_selector.n_features_in(),
                n_full
            ));
        }
        if self.feature_selector.selected_names(&self.full_feature_names) != self.selected_feature_names {
            return Err("selected feature names do not match the selector".to_string());
        }
        if self.ensemble.n_features() != self.selected_feature_names.len() {
            return Err(format!(
                "ensemble expects {} features, {} are selected",
                self.ensemble.n_features(),
                self.selected_feature_names.len()
            ));
        }
        if self.ensemble.n_classes != self.label_encoder.n_classes().max(1) {
            return Err(format!(
                "ensemble has {} classes, label encoder has {}",
                self.ensemble.n_classes,
                self.label_encoder.n_classes()
            ));
        }
        if self.label_encoder.n_classes() == 0 {
            return Err("label encoder has no classes".to_string());
        }
        Ok(())
    }

    /// `full_feature_names` の順にレコードを行列に並べる
    pub fn feature_matrix(&self, records: &[FeatureRecord]) -> Result<Array2<f64>> {
        let mut columns = Vec::with_capacity(self.full_feature_names.len());
        for name in &self.full_feature_names {
            let idx = FEATURE_NAMES
                .iter()
                .position(|n| *n == name.as_str())
                .ok_or_else(|| GrapheneError::bundle_load("full_feature_names", format!("unknown feature '{}'", name)))?;
            columns.push(idx);
        }

        Ok(Array2::from_shape_fn((records.len(), columns.len()), |(i, j)| {
            records[i].values[columns[j]]
        }))
    }

    /// 全レコードを標準化・選択して分類する
    pub fn predict_batch(&self, records: &[FeatureRecord]) -> Result<BatchPrediction> {
        let x = self.feature_matrix(records)?;
        let x = self.feature_selector.transform(&self.scaler.transform(&x));
        let probabilities = self.ensemble.predict_proba(&x);

        let mut labels = Vec::with_capacity(records.len());
        for row in probabilities.rows() {
            let idx = argmax(&row.to_vec());
            let label = self.label_encoder.decode(idx).ok_or_else(|| {
                GrapheneError::bundle_load("label_encoder", format!("class index {} out of range", idx))
            })?;
            labels.push(label);
        }

        Ok(BatchPrediction {
            labels,
            probabilities,
        })
    }
}

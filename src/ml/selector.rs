//! 線形SVMの重みによる再帰的特徴量削減 (RFE)

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ml::svm::{SvmClassifier, SvmParams};

/// 削減後に残る入力列
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSelector {
    /// 残す列は `true`（入力と同じ添字）
    pub support: Vec<bool>,
    /// 残した列は1、値が大きいほど早く削除された
    pub ranking: Vec<usize>,
}

impl FeatureSelector {
    /// `n_select` 個になるまで1ラウンドに1特徴量ずつ削る。
    ///
    /// 各ラウンドで残った列に線形SVM（正則化 `c`）を学習し、重みの二乗和が
    /// 最小の列を落とす。同じ重みなら後ろの列から落とす。
    pub fn fit_rfe(x: &Array2<f64>, y: &[usize], n_classes: usize, n_select: usize, c: f64) -> Result<Self> {
        let n_features = x.ncols();
        let n_select = n_select.clamp(1, n_features.max(1));
        let mut active: Vec<usize> = (0..n_features).collect();
        let mut ranking = vec![1usize; n_features];

        while active.len() > n_select {
            let subset = x.select(Axis(1), &active);
            let model = SvmClassifier::fit(&subset, y, n_classes, SvmParams::linear(c))?;
            let importance = model.feature_importance();

            let mut weakest = 0usize;
            for (pos, &w) in importance.iter().enumerate() {
                if w <= importance[weakest] {
                    weakest = pos;
                }
            }

            let removed = active.remove(weakest);
            ranking[removed] = active.len() + 1 - n_select + 1;
            tracing::debug!("RFE dropped column {} ({} left)", removed, active.len());
        }

        let mut support = vec![false; n_features];
        for &idx in &active {
            support[idx] = true;
        }

        Ok(Self { support, ranking })
    }

    /// 選択した列だけを順序を保って残す
    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        x.select(Axis(1), &self.selected_indices())
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        self.support
            .iter()
            .enumerate()
            .filter(|(_, &kept)| kept)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// 全入力列の名前から、残した列の名前を返す
    pub fn selected_names<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        self.selected_indices()
            .into_iter()
            .filter_map(|idx| names.get(idx).map(|n| n.as_ref().to_string()))
            .collect()
    }

    pub fn n_features_in(&self) -> usize {
        self.support.len()
    }

    pub fn n_selected(&self) -> usize {
        self.support.iter().filter(|&&kept| kept).count()
    }
}

//! 列ごとの標準化（平均0・分散1）

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// 学習行列から求めた列の統計量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    /// 母標準偏差（定数列は `1.0`）
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// 列の平均と標準偏差を求める
    pub fn fit(x: &Array2<f64>) -> Self {
        let n_features = x.ncols();
        if x.nrows() == 0 {
            return Self {
                mean: vec![0.0; n_features],
                scale: vec![1.0; n_features],
            };
        }

        let mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        let std = x.std_axis(Axis(0), 0.0);

        Self {
            mean: mean.to_vec(),
            scale: std
                .iter()
                .map(|&s| if s > 0.0 && s.is_finite() { s } else { 1.0 })
                .collect(),
        }
    }

    /// 学習済みの統計量で変換する（再学習はしない）
    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = x.clone();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (mean, scale) = (self.mean[j], self.scale[j]);
            column.mapv_inplace(|v| (v - mean) / scale);
        }
        out
    }

    pub fn fit_transform(x: &Array2<f64>) -> (Self, Array2<f64>) {
        let scaler = Self::fit(x);
        let scaled = scaler.transform(x);
        (scaler, scaled)
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }
}

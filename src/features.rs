//! 点ペアから作る固定スキーマの特徴量レコード
//!
//! 並び（24値、常にこの順）:
//! - `R1 G1 B1 H1 S1 V1` : 1点目（RGB 0-255、HSV は正規化済み）
//! - `R2 G2 B2 H2 S2 V2` : 2点目
//! - `ratio_X`           : `X1 / X2`（`X2 == 0` なら `0.0`）
//! - `diff_X`            : [`DiffMode`] に応じて `X1 - X2` または `|X1 - X2|`

use serde::{Deserialize, Serialize};

use crate::types::{DiffMode, LayerCount, PointPair, SampledPoint};

/// 特徴量の列数
pub const NUM_FEATURES: usize = 24;

/// 1点あたりの生チャンネル数 (R, G, B, H, S, V)
pub const NUM_CHANNELS: usize = 6;

/// 正解ラベルの列名
pub const LABEL_COLUMN: &str = "layer_count";

/// 列順のチャンネル名
pub const CHANNELS: [&str; NUM_CHANNELS] = ["R", "G", "B", "H", "S", "V"];

/// 出力順の特徴量列名
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "R1", "G1", "B1", "H1", "S1", "V1",
    "R2", "G2", "B2", "H2", "S2", "V2",
    "ratio_R", "ratio_G", "ratio_B", "ratio_H", "ratio_S", "ratio_V",
    "diff_R", "diff_G", "diff_B", "diff_H", "diff_S", "diff_V",
];

/// 1点目の生チャンネル列名
pub const FIRST_POINT_COLUMNS: [&str; NUM_CHANNELS] = ["R1", "G1", "B1", "H1", "S1", "V1"];

/// 2点目の生チャンネル列名
pub const SECOND_POINT_COLUMNS: [&str; NUM_CHANNELS] = ["R2", "G2", "B2", "H2", "S2", "V2"];

/// 分母が0なら `0.0` を返す除算
pub fn safe_div(a: f64, b: f64) -> f64 {
    if b != 0.0 {
        a / b
    } else {
        0.0
    }
}

/// ヘッダー行（必要ならラベル列を末尾に追加）
pub fn header(with_label: bool) -> Vec<&'static str> {
    let mut columns: Vec<&'static str> = FEATURE_NAMES.to_vec();
    if with_label {
        columns.push(LABEL_COLUMN);
    }
    columns
}

/// 特徴量ベクトル1件（層数ラベルは任意）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub values: [f64; NUM_FEATURES],
    #[serde(default)]
    pub layer_count: Option<LayerCount>,
}

impl FeatureRecord {
    /// 点ペアからレコードを作る
    pub fn build(pair: &PointPair, diff_mode: DiffMode) -> Self {
        Self::from_channels(
            point_channels(&pair.first),
            point_channels(&pair.second),
            diff_mode,
        )
    }

    /// 両点の生チャンネルからレコードを作る。
    ///
    /// 比と差は常にここで計算し直す。
    pub fn from_channels(
        first: [f64; NUM_CHANNELS],
        second: [f64; NUM_CHANNELS],
        diff_mode: DiffMode,
    ) -> Self {
        let mut values = [0.0; NUM_FEATURES];
        values[..NUM_CHANNELS].copy_from_slice(&first);
        values[NUM_CHANNELS..2 * NUM_CHANNELS].copy_from_slice(&second);

        for c in 0..NUM_CHANNELS {
            values[2 * NUM_CHANNELS + c] = safe_div(first[c], second[c]);
            let diff = first[c] - second[c];
            values[3 * NUM_CHANNELS + c] = match diff_mode {
                DiffMode::Signed => diff,
                DiffMode::Absolute => diff.abs(),
            };
        }

        Self {
            values,
            layer_count: None,
        }
    }

    /// 正解ラベルを付ける
    pub fn with_label(mut self, layer_count: LayerCount) -> Self {
        self.layer_count = Some(layer_count);
        self
    }

    /// 列名で特徴量を引く
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }

    pub fn first_channels(&self) -> [f64; NUM_CHANNELS] {
        let mut out = [0.0; NUM_CHANNELS];
        out.copy_from_slice(&self.values[..NUM_CHANNELS]);
        out
    }

    pub fn second_channels(&self) -> [f64; NUM_CHANNELS] {
        let mut out = [0.0; NUM_CHANNELS];
        out.copy_from_slice(&self.values[NUM_CHANNELS..2 * NUM_CHANNELS]);
        out
    }

    /// すべての値が有限か
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// ヘッダー順のCSVフィールド（ラベルがあれば末尾に追加）
    pub fn to_csv_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        if let Some(layer) = self.layer_count {
            fields.push(layer.to_string());
        }
        fields
    }
}

/// サンプル点の `[R, G, B, H, S, V]`
pub fn point_channels(point: &SampledPoint) -> [f64; NUM_CHANNELS] {
    let (r, g, b) = point.rgb;
    let (h, s, v) = point.hsv_normalized;
    [r as f64, g as f64, b as f64, h, s, v]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(a: (u8, u8, u8), b: (u8, u8, u8)) -> PointPair {
        PointPair::new(SampledPoint::from_rgb(a), SampledPoint::from_rgb(b))
    }

    #[test]
    fn test_safe_div_zero_denominator() {
        for a in [0.0, 1.0, -3.5, 255.0] {
            assert_eq!(safe_div(a, 0.0), 0.0);
        }
        assert_eq!(safe_div(6.0, 3.0), 2.0);
    }

    #[test]
    fn test_layout_and_names() {
        assert_eq!(FEATURE_NAMES.len(), NUM_FEATURES);
        assert_eq!(header(true).last(), Some(&LABEL_COLUMN));
        assert_eq!(header(false).len(), NUM_FEATURES);
        assert_eq!(&FEATURE_NAMES[..6], &FIRST_POINT_COLUMNS);
        assert_eq!(&FEATURE_NAMES[6..12], &SECOND_POINT_COLUMNS);
    }

    #[test]
    fn test_build_ratios_and_diffs() {
        let record = FeatureRecord::build(&pair((100, 50, 0), (50, 100, 0)), DiffMode::Absolute);
        assert_eq!(record.get("R1"), Some(100.0));
        assert_eq!(record.get("ratio_R"), Some(2.0));
        assert_eq!(record.get("ratio_G"), Some(0.5));
        // 0 / 0 も安全に処理される
        assert_eq!(record.get("ratio_B"), Some(0.0));
        assert_eq!(record.get("diff_G"), Some(50.0));
        assert!(record.is_finite());
        assert_eq!(record.layer_count, None);
    }

    #[test]
    fn test_signed_vs_absolute_diff() {
        let p = pair((10, 10, 10), (30, 5, 10));
        let signed = FeatureRecord::build(&p, DiffMode::Signed);
        let absolute = FeatureRecord::build(&p, DiffMode::Absolute);
        assert_eq!(signed.get("diff_R"), Some(-20.0));
        assert_eq!(absolute.get("diff_R"), Some(20.0));
        assert_eq!(signed.get("diff_G"), absolute.get("diff_G"));
        assert_eq!(&signed.values[..18], &absolute.values[..18]);
    }

    #[test]
    fn test_black_reference_never_faults() {
        let record = FeatureRecord::build(&pair((120, 80, 200), (0, 0, 0)), DiffMode::Absolute);
        for name in ["ratio_R", "ratio_G", "ratio_B", "ratio_H", "ratio_S", "ratio_V"] {
            assert_eq!(record.get(name), Some(0.0), "{}", name);
        }
        assert!(record.is_finite());
    }

    #[test]
    fn test_csv_fields_with_label() {
        let record = FeatureRecord::build(&pair((1, 2, 3), (4, 5, 6)), DiffMode::Absolute).with_label(3);
        let fields = record.to_csv_fields();
        assert_eq!(fields.len(), NUM_FEATURES + 1);
        assert_eq!(fields[0], "1");
        assert_eq!(fields.last().unwrap(), "3");
    }
}

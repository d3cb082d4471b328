use serde::{Deserialize, Serialize};

use crate::sampler::rgb_to_hsv_normalized;

/// グラフェンの層数（分類対象）
pub type LayerCount = u32;

/// 画像上の1点: 生の RGB と [0, 1] に正規化した HSV
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampledPoint {
    pub rgb: (u8, u8, u8),
    pub hsv_normalized: (f64, f64, f64),
}

impl SampledPoint {
    /// RGB から点を作り、正規化 HSV を求める
    pub fn from_rgb(rgb: (u8, u8, u8)) -> Self {
        Self {
            rgb,
            hsv_normalized: rgb_to_hsv_normalized(rgb),
        }
    }
}

/// 順序付きの点ペア: 1点目がグラフェン、2点目が基準
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointPair {
    pub first: SampledPoint,
    pub second: SampledPoint,
}

impl PointPair {
    pub fn new(first: SampledPoint, second: SampledPoint) -> Self {
        Self { first, second }
    }
}

/// `diff_*` 特徴量の求め方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffMode {
    /// `X1 - X2`
    Signed,
    /// `|X1 - X2|`
    Absolute,
}

impl Default for DiffMode {
    fn default() -> Self {
        DiffMode::Absolute
    }
}

impl std::fmt::Display for DiffMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffMode::Signed => write!(f, "signed"),
            DiffMode::Absolute => write!(f, "absolute"),
        }
    }
}

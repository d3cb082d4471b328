//! モデルメタデータの定義
//!
//! バンドルフォルダ内の `metadata.json` に学習時の情報を記録します。
//! 推論には不要で、読み込みに失敗してもバンドル自体は利用できます。

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{DiffMode, LayerCount};

/// 学習時の情報
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    /// 学習時刻（RFC3339形式）
    pub trained_at: String,
    /// 学習に使用したレコード数
    pub n_records: usize,
    /// 層数クラス（ラベルエンコーダーの順序）
    pub classes: Vec<LayerCount>,
    /// 選択されたSVMのハイパーパラメータ
    pub svm_params: String,
    /// 選択されたランダムフォレストのハイパーパラメータ
    pub forest_params: String,
    /// RFEで選択された特徴量
    pub selected_features: Vec<String>,
    /// 学習データ上の正解率
    pub training_accuracy: f64,
    /// 差分特徴量の計算方式
    #[serde(default)]
    pub diff_mode: DiffMode,
}

impl BundleMetadata {
    /// 現在時刻で新しいメタデータを作成
    pub fn new(
        n_records: usize,
        classes: Vec<LayerCount>,
        svm_params: String,
        forest_params: String,
        selected_features: Vec<String>,
        training_accuracy: f64,
    ) -> Self {
        Self {
            trained_at: chrono::Local::now().to_rfc3339(),
            n_records,
            classes,
            svm_params,
            forest_params,
            selected_features,
            training_accuracy,
            diff_mode: DiffMode::Absolute,
        }
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// 表示用の複数行テキスト
    pub fn summary(&self) -> String {
        let classes: Vec<String> = self.classes.iter().map(|c| c.to_string()).collect();
        [
            format!("trained at: {}", self.trained_at),
            format!("records:    {}", self.n_records),
            format!("classes:    {}", classes.join(", ")),
            format!("SVM:        {}", self.svm_params),
            format!("forest:     {}", self.forest_params),
            format!("features:   {}", self.selected_features.join(", ")),
            format!("accuracy:   {:.4}", self.training_accuracy),
        ]
        .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip() {
        let meta = BundleMetadata::new(
            12,
            vec![1, 2, 3],
            "kernel=rbf, C=1, gamma=scale".to_string(),
            "n_estimators=100, max_depth=None, min_samples_split=2".to_string(),
            vec!["R1".to_string(), "diff_V".to_string()],
            0.9166,
        );
        let json = meta.to_json_string().unwrap();
        assert_eq!(BundleMetadata::from_json_string(&json).unwrap(), meta);
        assert!(chrono::DateTime::parse_from_rfc3339(&meta.trained_at).is_ok());
        assert!(meta.summary().contains("1, 2, 3"));
    }
}

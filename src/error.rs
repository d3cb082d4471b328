//! グラフェン層数分類器のエラー型

use std::path::PathBuf;
use thiserror::Error;

/// ライブラリ共通の Result 型
pub type Result<T> = std::result::Result<T, GrapheneError>;

/// サンプリング・収集・学習・推論で起きる失敗。
///
/// どれもプロセスを止めず、[`GrapheneError::user_message`] で短い
/// ステータス行に変換される。
#[derive(Error, Debug)]
pub enum GrapheneError {
    /// 画像ファイルを読めなかった
    #[error("Failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 読めたがデコードできない
    #[error("Failed to decode image: {source}")]
    ImageDecode {
        #[source]
        source: image::ImageError,
    },

    /// 画像を読み込む前に点を取得しようとした
    #[error("No image loaded")]
    NoImageLoaded,

    /// 座標が画像の範囲外
    #[error("Point ({x}, {y}) is outside the {width}x{height} image")]
    OutOfBounds {
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    },

    /// レコードがないのに書き出そうとした
    #[error("No feature records collected")]
    NoData,

    /// どのファイルからも学習行を読めなかった
    #[error("Training corpus is empty")]
    EmptyCorpus,

    /// 点ペアがないのに推論しようとした
    #[error("No point pairs to predict")]
    NoPairs,

    /// モデル未読み込みで推論しようとした
    #[error("No model bundle loaded")]
    NoModelLoaded,

    /// バンドルのファイルが欠けているか壊れている
    #[error("Failed to load bundle artifact '{artifact}': {reason}")]
    BundleLoad { artifact: String, reason: String },

    /// バンドルのフォルダまたはファイルを書き込めなかった
    #[error("Failed to save bundle to {path}: {source}")]
    BundleSave {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// モデルの学習に失敗した
    #[error("Training failed: {reason}")]
    Training { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl GrapheneError {
    /// 指定ファイルの読み込みエラーを作る
    pub fn bundle_load(artifact: impl Into<String>, reason: impl ToString) -> Self {
        Self::BundleLoad {
            artifact: artifact.into(),
            reason: reason.to_string(),
        }
    }

    /// 学習エラーを作る
    pub fn training(reason: impl Into<String>) -> Self {
        Self::Training {
            reason: reason.into(),
        }
    }

    /// 入力不足によるもの（何も実行していない）か
    pub fn is_insufficient_input(&self) -> bool {
        matches!(
            self,
            GrapheneError::NoData
                | GrapheneError::EmptyCorpus
                | GrapheneError::NoPairs
                | GrapheneError::NoImageLoaded
                | GrapheneError::NoModelLoaded
        )
    }

    /// 画面表示用の短いステータス行
    pub fn user_message(&self) -> String {
        match self {
            GrapheneError::ImageRead { .. } => "Could not read the image file.".to_string(),
            GrapheneError::ImageDecode { .. } => {
                "The file is not a supported image format.".to_string()
            }
            GrapheneError::NoImageLoaded => "Load an image first.".to_string(),
            GrapheneError::OutOfBounds { .. } => "Invalid click: outside the image.".to_string(),
            GrapheneError::NoData => "No data recorded yet, nothing to save.".to_string(),
            GrapheneError::EmptyCorpus => {
                "No training data could be loaded. Check the CSV files.".to_string()
            }
            GrapheneError::NoPairs => "No point pairs to predict.".to_string(),
            GrapheneError::NoModelLoaded => "Load a model first.".to_string(),
            GrapheneError::BundleLoad { .. } => "Model loading failed.".to_string(),
            GrapheneError::BundleSave { .. } => "Model saving failed.".to_string(),
            _ => format!("Operation failed: {}", self),
        }
    }
}

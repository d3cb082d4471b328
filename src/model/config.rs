//! アプリケーション設定管理モジュール
//!
//! データ・モデルの保存先や学習パラメータをJSON形式で保存・読み込みします。

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::DiffMode;

/// トレーニング設定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// RFEで残す特徴量の数
    pub n_features_to_select: usize,
    /// 交差検証の分割数
    pub cv_folds: usize,
    /// ランダムフォレストのシード
    pub seed: u64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            n_features_to_select: 5,
            cv_folds: 5,
            seed: 42,
        }
    }
}

/// データ収集設定
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSettings {
    /// 差分特徴量の符号の扱い
    #[serde(default)]
    pub diff_mode: DiffMode,
}

/// アプリケーション設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// 収集データ(CSV)の保存先
    pub data_dir: PathBuf,
    /// モデルバージョンを格納する親フォルダ
    pub models_dir: PathBuf,
    /// トレーニング設定
    #[serde(default)]
    pub training: TrainingSettings,
    /// データ収集設定
    #[serde(default)]
    pub collection: CollectionSettings,
    /// 最後に使用した画像ファイルのパス
    #[serde(default)]
    pub last_image_path: Option<String>,
    /// 最後に読み込んだモデルバージョン
    #[serde(default)]
    pub last_model_version: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            models_dir: PathBuf::from("models"),
            training: TrainingSettings::default(),
            collection: CollectionSettings::default(),
            last_image_path: None,
            last_model_version: None,
        }
    }
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(config)
    }

    /// 指定パスから設定を読み込む、存在しない・壊れている場合はデフォルト設定を返す
    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No config at {}; using defaults", path.display());
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => {
                tracing::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!("{:#}; using defaults", e);
                Self::default()
            }
        }
    }

    /// デフォルトパスから設定を読み込む
    pub fn load_or_default() -> Self {
        Self::load_or_default_from(Self::default_path())
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// デフォルトパスに設定を保存する
    pub fn save_default(&self) -> anyhow::Result<()> {
        let path = Self::default_path();
        self.save(&path)?;
        tracing::info!("Saved config to {}", path.display());
        Ok(())
    }

    /// バージョン名からモデルフォルダのパスを得る
    pub fn model_folder(&self, version: &str) -> PathBuf {
        self.models_dir.join(version)
    }

    /// 最後に使用した画像ファイルのパスを更新
    pub fn update_last_image_path<P: AsRef<Path>>(&mut self, path: P) {
        self.last_image_path = Some(path.as_ref().to_string_lossy().to_string());
    }

    /// 最後に読み込んだモデルバージョンを更新
    pub fn update_last_model_version(&mut self, version: &str) {
        self.last_model_version = Some(version.to_string());
    }

    /// 設定情報を表示用の文字列にする
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "=== Configuration ===".to_string(),
            format!("data dir:    {}", self.data_dir.display()),
            format!("models dir:  {}", self.models_dir.display()),
            format!("diff mode:   {}", self.collection.diff_mode),
            format!(
                "training:    {} features, {} folds, seed {}",
                self.training.n_features_to_select, self.training.cv_folds, self.training.seed
            ),
        ];
        if let Some(ref image) = self.last_image_path {
            lines.push(format!("last image:  {}", image));
        }
        if let Some(ref version) = self.last_model_version {
            lines.push(format!("last model:  {}", version));
        }
        lines.join("\n")
    }
}

//! モデルバンドルの永続化
//!
//! バンドルは1フォルダ（＝モデルバージョン）に独立したJSONファイルとして保存します。
//!
//! フォルダ構成:
//! - scaler.json                  - 標準化の平均・スケール
//! - feature_selector.json        - RFEの選択結果
//! - classifier_ensemble.json     - SVM + ランダムフォレスト
//! - label_encoder.json           - 層数クラス
//! - full_feature_names.json      - 全24特徴量名
//! - selected_feature_names.json  - 選択された特徴量名
//! - metadata.json                - 学習情報（任意）

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{GrapheneError, Result};
use crate::ml::bundle::ModelBundle;
use crate::model::model_metadata::BundleMetadata;

pub const SCALER_FILE: &str = "scaler.json";
pub const FEATURE_SELECTOR_FILE: &str = "feature_selector.json";
pub const ENSEMBLE_FILE: &str = "classifier_ensemble.json";
pub const LABEL_ENCODER_FILE: &str = "label_encoder.json";
pub const FULL_FEATURE_NAMES_FILE: &str = "full_feature_names.json";
pub const SELECTED_FEATURE_NAMES_FILE: &str = "selected_feature_names.json";
pub const METADATA_FILE: &str = "metadata.json";

/// 推論に必須の6ファイル
pub const BUNDLE_ARTIFACTS: [&str; 6] = [
    SCALER_FILE,
    FEATURE_SELECTOR_FILE,
    ENSEMBLE_FILE,
    LABEL_ENCODER_FILE,
    FULL_FEATURE_NAMES_FILE,
    SELECTED_FEATURE_NAMES_FILE,
];

fn write_json<T: Serialize>(folder: &Path, file_name: &str, value: &T) -> Result<()> {
    let path = folder.join(file_name);
    let json = serde_json::to_string(value)?;
    fs::write(&path, json).map_err(|source| GrapheneError::BundleSave { path, source })
}

fn read_json<T: DeserializeOwned>(folder: &Path, file_name: &str) -> Result<T> {
    let path = folder.join(file_name);
    let content = fs::read_to_string(&path).map_err(|e| GrapheneError::bundle_load(file_name, e))?;
    serde_json::from_str(&content).map_err(|e| GrapheneError::bundle_load(file_name, e))
}

/// バンドルをフォルダに保存（フォルダがなければ作成、既存ファイルは上書き）
///
/// `metadata` が `None` なら既存の `metadata.json` は削除します。
pub fn save_bundle(bundle: &ModelBundle, folder: &Path, metadata: Option<&BundleMetadata>) -> Result<()> {
    fs::create_dir_all(folder).map_err(|source| GrapheneError::BundleSave {
        path: folder.to_path_buf(),
        source,
    })?;

    write_json(folder, SCALER_FILE, &bundle.scaler)?;
    write_json(folder, FEATURE_SELECTOR_FILE, &bundle.feature_selector)?;
    write_json(folder, ENSEMBLE_FILE, &bundle.ensemble)?;
    write_json(folder, LABEL_ENCODER_FILE, &bundle.label_encoder)?;
    write_json(folder, FULL_FEATURE_NAMES_FILE, &bundle.full_feature_names)?;
    write_json(folder, SELECTED_FEATURE_NAMES_FILE, &bundle.selected_feature_names)?;

    let path = folder.join(METADATA_FILE);
    match metadata {
        Some(metadata) => {
            fs::write(&path, metadata.to_json_string()?).map_err(|source| GrapheneError::BundleSave { path, source })?;
        }
        // 上書き保存時に前のバンドルの学習情報を残さない
        None if path.exists() => {
            fs::remove_file(&path).map_err(|source| GrapheneError::BundleSave { path, source })?;
        }
        None => {}
    }

    tracing::info!("Saved model bundle to {}", folder.display());
    Ok(())
}

/// フォルダからバンドルを読み込む
///
/// 6ファイルのいずれかが欠けている・壊れている・互いに矛盾している場合は失敗します。
pub fn load_bundle(folder: &Path) -> Result<ModelBundle> {
    if !folder.is_dir() {
        return Err(GrapheneError::bundle_load(
            folder.display().to_string(),
            "model folder does not exist",
        ));
    }

    let bundle = ModelBundle {
        scaler: read_json(folder, SCALER_FILE)?,
        feature_selector: read_json(folder, FEATURE_SELECTOR_FILE)?,
        ensemble: read_json(folder, ENSEMBLE_FILE)?,
        label_encoder: read_json(folder, LABEL_ENCODER_FILE)?,
        full_feature_names: read_json(folder, FULL_FEATURE_NAMES_FILE)?,
        selected_feature_names: read_json(folder, SELECTED_FEATURE_NAMES_FILE)?,
    };
    bundle
        .validate()
        .map_err(|reason| GrapheneError::bundle_load("bundle", reason))?;

    tracing::info!("Loaded model bundle from {}", folder.display());
    Ok(bundle)
}

/// `metadata.json` を読み込む（存在しなければ `None`）
pub fn load_metadata(folder: &Path) -> Result<Option<BundleMetadata>> {
    let path = folder.join(METADATA_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    Ok(Some(BundleMetadata::from_json_string(&content)?))
}

/// モデルフォルダ直下のバージョン名一覧（名前順）
///
/// フォルダが存在しない場合は空のリストを返します。
pub fn list_model_versions(models_dir: &Path) -> Result<Vec<String>> {
    if !models_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut versions = Vec::new();
    for entry in fs::read_dir(models_dir)? {
        let path: PathBuf = entry?.path();
        if path.is_dir() {
            if let Some(name) = path.file_name() {
                versions.push(name.to_string_lossy().to_string());
            }
        }
    }
    versions.sort();
    Ok(versions)
}

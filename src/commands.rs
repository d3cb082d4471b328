//! コマンド層: CLIから呼ばれ、コアAPIに座標とパスを渡して結果を文字列で返す

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::collector::{default_export_path, AddPointOutcome, DataCollector};
use crate::error::GrapheneError;
use crate::ml::{Predictor, Trainer};
use crate::model::{list_model_versions, load_metadata, save_bundle, AppConfig};
use crate::types::LayerCount;

/// `"x,y"` を座標に変換
pub fn parse_point(raw: &str) -> Result<(i64, i64)> {
    let (x, y) = raw
        .split_once(',')
        .with_context(|| format!("point '{}' must look like x,y", raw))?;
    let x = x.trim().parse().with_context(|| format!("bad x in '{}'", raw))?;
    let y = y.trim().parse().with_context(|| format!("bad y in '{}'", raw))?;
    Ok((x, y))
}

/// クリックを再生して学習データを収集し、CSVに書き出す
///
/// 範囲外の点は警告して読み飛ばす。
pub fn collect(
    config: &AppConfig,
    image: &Path,
    layer_count: LayerCount,
    points: &[(i64, i64)],
    output: Option<PathBuf>,
) -> Result<String> {
    let mut collector = DataCollector::new(config.collection.diff_mode);
    collector
        .load(image, layer_count)
        .with_context(|| format!("Failed to load {}", image.display()))?;

    for &(x, y) in points {
        match collector.add_point(x, y) {
            Ok(AddPointOutcome::PairCompleted { pairs }) => {
                tracing::debug!("pair {} recorded at ({}, {})", pairs, x, y)
            }
            Ok(AddPointOutcome::Pending) => {}
            Err(e @ GrapheneError::OutOfBounds { .. }) => {
                tracing::warn!("{} {}", e.user_message(), e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    if collector.pending_point().is_some() {
        tracing::warn!("Last point has no partner and was not recorded");
    }

    let path = output.unwrap_or_else(|| default_export_path(&config.data_dir));
    let n = collector.export_csv(&path)?;
    Ok(format!("Saved {} records to {}", n, path.display()))
}

/// CSVを読み込んで学習し、`models_dir/<version>` に保存する
///
/// `sources` が空なら `data_dir` 内の全CSVを使う。
pub fn train(config: &AppConfig, sources: &[PathBuf], version: &str) -> Result<String> {
    if version.trim().is_empty() {
        bail!("model version name must not be empty");
    }

    let mut trainer = Trainer::new(config.training);
    let n = if sources.is_empty() {
        trainer.load_corpus_dir(&config.data_dir)?
    } else {
        trainer.load_corpus(sources)?
    };
    tracing::info!("Corpus loaded: {} records", n);

    let trained = trainer.train()?;
    let folder = config.model_folder(version);
    save_bundle(&trained.bundle, &folder, Some(&trained.metadata()))?;

    Ok(format!(
        "{}\n\nModel saved as '{}' ({})",
        trained.report,
        version,
        folder.display()
    ))
}

/// 保存済みモデルで画像上の点ペアを予測する
pub fn predict(config: &AppConfig, version: &str, image: &Path, points: &[(i64, i64)]) -> Result<String> {
    let mut predictor = Predictor::new();
    predictor
        .load_bundle(&config.model_folder(version))
        .with_context(|| format!("Failed to load model '{}'", version))?;
    predictor
        .load_image(image)
        .with_context(|| format!("Failed to load {}", image.display()))?;

    for &(x, y) in points {
        if let Err(e) = predictor.add_point_at(x, y) {
            tracing::warn!("{} {}", e.user_message(), e);
        }
    }

    let summary = predictor.predict_all()?;
    Ok(summary.to_string())
}

/// モデルバージョンの一覧（メタデータがあれば添える）
pub fn list_models(config: &AppConfig) -> Result<String> {
    let versions = list_model_versions(&config.models_dir)?;
    if versions.is_empty() {
        return Ok(format!("No models in {}", config.models_dir.display()));
    }

    let mut lines = Vec::new();
    for version in versions {
        match load_metadata(&config.model_folder(&version)) {
            Ok(Some(meta)) => lines.push(format!(
                "{}  (trained {}, classes {:?}, accuracy {:.3})",
                version, meta.trained_at, meta.classes, meta.training_accuracy
            )),
            Ok(None) => lines.push(version),
            Err(e) => {
                tracing::warn!("Unreadable metadata for {}: {}", version, e);
                lines.push(version);
            }
        }
    }
    Ok(lines.join("\n"))
}

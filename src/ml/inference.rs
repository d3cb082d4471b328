//! 推論セッション: 点ペアのバッファリングと多数決・ソフト投票による集約

use std::fmt;
use std::path::Path;

use image::RgbImage;
use ndarray::{Array2, Axis};

use crate::collector::AddPointOutcome;
use crate::error::{GrapheneError, Result};
use crate::features::FeatureRecord;
use crate::ml::bundle::ModelBundle;
use crate::ml::svm::argmax;
use crate::model::model_storage;
use crate::sampler;
use crate::types::{DiffMode, LayerCount, PointPair, SampledPoint};

/// 1画像分の予測結果
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSummary {
    /// ペアごとの予測層数（入力順）
    pub labels: Vec<LayerCount>,
    pub majority_label: LayerCount,
    pub majority_votes: usize,
    pub soft_label: LayerCount,
    /// ソフト投票で選ばれたクラスの平均確率
    pub soft_confidence: f64,
    /// クラスごとの平均確率（ラベルエンコーダー順）
    pub mean_probabilities: Vec<f64>,
}

impl fmt::Display for PredictionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.labels.iter().map(|l| l.to_string()).collect();
        writeln!(f, "Per-pair predictions: [{}]", labels.join(", "))?;
        writeln!(
            f,
            "Majority vote: {} ({} votes)",
            self.majority_label, self.majority_votes
        )?;
        write!(
            f,
            "Soft vote: {} (mean confidence: {:.2})",
            self.soft_label, self.soft_confidence
        )
    }
}

/// 最多ラベルと得票数。同数の場合は先に現れたラベル
pub fn majority_vote(labels: &[LayerCount]) -> Option<(LayerCount, usize)> {
    let mut tally: Vec<(LayerCount, usize)> = Vec::new();
    for &label in labels {
        match tally.iter_mut().find(|(l, _)| *l == label) {
            Some((_, count)) => *count += 1,
            None => tally.push((label, 1)),
        }
    }

    let mut best: Option<(LayerCount, usize)> = None;
    for (label, count) in tally {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((label, count));
        }
    }
    best
}

/// 確率行の平均を取り、最大クラスのインデックスとその平均確率を返す
pub fn soft_vote(probabilities: &Array2<f64>) -> Option<(usize, f64)> {
    let mean = probabilities.mean_axis(Axis(0))?;
    if mean.is_empty() {
        return None;
    }
    let values = mean.to_vec();
    let idx = argmax(&values);
    Some((idx, values[idx]))
}

/// What `undo_last` removed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UndoOutcome {
    /// The unpaired point
    PendingPoint(SampledPoint),
    /// The most recent pair; the last prediction is now stale
    Pair(PointPair),
    Nothing,
}

/// 読み込んだバンドルで1画像分の点ペアを予測する
#[derive(Debug, Default)]
pub struct Predictor {
    bundle: Option<ModelBundle>,
    image: Option<RgbImage>,
    pending: Option<SampledPoint>,
    pairs: Vec<PointPair>,
    last_prediction: Option<PredictionSummary>,
}

impl Predictor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 既にあるバンドルで初期化
    pub fn with_bundle(bundle: ModelBundle) -> Self {
        Self {
            bundle: Some(bundle),
            ..Self::default()
        }
    }

    /// フォルダからバンドルを読み込む
    ///
    /// 失敗した場合は以前のバンドルがそのまま有効。
    pub fn load_bundle(&mut self, folder: &Path) -> Result<()> {
        let bundle = model_storage::load_bundle(folder)?;
        self.bundle = Some(bundle);
        Ok(())
    }

    pub fn set_bundle(&mut self, bundle: ModelBundle) {
        self.bundle = Some(bundle);
    }

    pub fn bundle(&self) -> Option<&ModelBundle> {
        self.bundle.as_ref()
    }

    /// 画像を読み込み、新しいセッションを始める（失敗時は何も変えない）
    pub fn load_image(&mut self, path: &Path) -> Result<()> {
        let image = sampler::load_image(path)?;
        self.set_image(image);
        Ok(())
    }

    pub fn set_image(&mut self, image: RgbImage) {
        self.image = Some(image);
        self.clear();
    }

    /// 点ペアのバッファをクリアする
    pub fn reset(&mut self) {
        self.pending = None;
        self.pairs.clear();
    }

    /// バッファと前回の予測結果をクリアする
    pub fn clear(&mut self) {
        self.reset();
        self.last_prediction = None;
    }

    pub fn add_point_pair(&mut self, first: SampledPoint, second: SampledPoint) {
        self.pairs.push(PointPair::new(first, second));
    }

    /// 1点ずつ追加し、2点目でペアにする
    pub fn add_point(&mut self, point: SampledPoint) -> AddPointOutcome {
        match self.pending.take() {
            Some(first) => {
                self.add_point_pair(first, point);
                AddPointOutcome::PairCompleted {
                    pairs: self.pairs.len(),
                }
            }
            None => {
                self.pending = Some(point);
                AddPointOutcome::Pending
            }
        }
    }

    /// 読み込み済み画像の (x, y) をサンプリングして追加する
    pub fn add_point_at(&mut self, x: i64, y: i64) -> Result<AddPointOutcome> {
        let image = self.image.as_ref().ok_or(GrapheneError::NoImageLoaded)?;
        let point = sampler::sample(image, x, y)?;
        Ok(self.add_point(point))
    }

    /// 未ペアの点があればそれを、なければ最後のペアを取り消す
    pub fn undo_last(&mut self) -> UndoOutcome {
        if let Some(point) = self.pending.take() {
            return UndoOutcome::PendingPoint(point);
        }
        match self.pairs.pop() {
            Some(pair) => UndoOutcome::Pair(pair),
            None => UndoOutcome::Nothing,
        }
    }

    pub fn pairs(&self) -> &[PointPair] {
        &self.pairs
    }

    pub fn pending_point(&self) -> Option<&SampledPoint> {
        self.pending.as_ref()
    }

    pub fn last_prediction(&self) -> Option<&PredictionSummary> {
        self.last_prediction.as_ref()
    }

    /// バッファ内の全ペアを予測して集約する
    pub fn predict_all(&mut self) -> Result<PredictionSummary> {
        if self.pairs.is_empty() {
            return Err(GrapheneError::NoPairs);
        }
        let bundle = self.bundle.as_ref().ok_or(GrapheneError::NoModelLoaded)?;

        let records: Vec<FeatureRecord> = self
            .pairs
            .iter()
            .map(|pair| FeatureRecord::build(pair, DiffMode::Absolute))
            .collect();
        let batch = bundle.predict_batch(&records)?;

        let (majority_label, majority_votes) =
            majority_vote(&batch.labels).ok_or(GrapheneError::NoPairs)?;
        let (soft_idx, soft_confidence) =
            soft_vote(&batch.probabilities).ok_or(GrapheneError::NoPairs)?;
        let soft_label = bundle.label_encoder.decode(soft_idx).ok_or_else(|| {
            GrapheneError::bundle_load("label_encoder", format!("class index {} out of range", soft_idx))
        })?;

        let summary = PredictionSummary {
            labels: batch.labels,
            majority_label,
            majority_votes,
            soft_label,
            soft_confidence,
            mean_probabilities: batch
                .probabilities
                .mean_axis(Axis(0))
                .map(|m| m.to_vec())
                .unwrap_or_default(),
        };
        tracing::info!(
            "Predicted {} pairs: majority {} / soft {} ({:.2})",
            summary.labels.len(),
            summary.majority_label,
            summary.soft_label,
            summary.soft_confidence
        );

        self.last_prediction = Some(summary.clone());
        Ok(summary)
    }
}

//! 学習パイプライン: コーパス読み込みからアンサンブル構築・評価まで

use std::fmt;
use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::csv_loader::{list_csv_files, load_training_csv};
use crate::error::{GrapheneError, Result};
use crate::features::{FeatureRecord, FEATURE_NAMES};
use crate::ml::bundle::ModelBundle;
use crate::ml::ensemble::SoftVotingEnsemble;
use crate::ml::forest::{ForestParams, RandomForest};
use crate::ml::grid_search::{grid_search, SearchResult};
use crate::ml::label_encoder::LabelEncoder;
use crate::ml::metrics::{classification_report, ConfusionMatrix};
use crate::ml::scaler::StandardScaler;
use crate::ml::selector::FeatureSelector;
use crate::ml::svm::{SvmClassifier, SvmParams};
use crate::model::config::TrainingSettings;
use crate::model::model_metadata::BundleMetadata;
use crate::types::LayerCount;

/// RFEで使う線形SVMのC
const SELECTOR_C: f64 = 1.0;

/// 読み込み済みの学習データ
#[derive(Debug, Clone, Default)]
pub struct TrainingCorpus {
    pub records: Vec<FeatureRecord>,
    /// 1行以上読めたファイル
    pub sources: Vec<PathBuf>,
    pub skipped_rows: usize,
}

impl TrainingCorpus {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 24列の特徴量行列
    pub fn features(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.records.len(), FEATURE_NAMES.len()), |(i, j)| {
            self.records[i].values[j]
        })
    }

    pub fn labels(&self) -> Vec<LayerCount> {
        self.records
            .iter()
            .filter_map(|r| r.layer_count)
            .collect()
    }

    /// クラスごとの件数（層数の昇順）
    pub fn class_counts(&self) -> Vec<(LayerCount, usize)> {
        let encoder = LabelEncoder::fit(&self.labels());
        encoder
            .classes
            .iter()
            .map(|&c| (c, self.records.iter().filter(|r| r.layer_count == Some(c)).count()))
            .collect()
    }
}

/// 学習結果のレポート
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub n_records: usize,
    pub classes: Vec<LayerCount>,
    pub accuracy: f64,
    pub svm_params: SvmParams,
    pub svm_cv_accuracy: f64,
    pub forest_params: ForestParams,
    pub forest_cv_accuracy: f64,
    pub selected_features: Vec<String>,
    pub classification_report: String,
    pub confusion_matrix: String,
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Training records: {}", self.n_records)?;
        writeln!(f, "Accuracy: {:.4}", self.accuracy)?;
        writeln!(
            f,
            "Best SVM params: {} (CV accuracy {:.4})",
            self.svm_params, self.svm_cv_accuracy
        )?;
        writeln!(
            f,
            "Best RandomForest params: {} (CV accuracy {:.4})",
            self.forest_params, self.forest_cv_accuracy
        )?;
        writeln!(f, "Selected features: {}", self.selected_features.join(", "))?;
        writeln!(f)?;
        writeln!(f, "Classification Report:")?;
        writeln!(f, "{}", self.classification_report)?;
        writeln!(f, "Confusion Matrix:")?;
        write!(f, "{}", self.confusion_matrix)
    }
}

/// `train()` の戻り値
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub bundle: ModelBundle,
    pub report: TrainingReport,
}

impl TrainedModel {
    /// レポートから `metadata.json` 用の情報を作成
    pub fn metadata(&self) -> BundleMetadata {
        BundleMetadata::new(
            self.report.n_records,
            self.report.classes.clone(),
            self.report.svm_params.to_string(),
            self.report.forest_params.to_string(),
            self.report.selected_features.clone(),
            self.report.accuracy,
        )
    }
}

/// コーパスを保持して学習を実行する
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    settings: TrainingSettings,
    corpus: TrainingCorpus,
}

impl Trainer {
    pub fn new(settings: TrainingSettings) -> Self {
        Self {
            settings,
            corpus: TrainingCorpus::default(),
        }
    }

    /// CSVファイル群を読み込んで連結する
    ///
    /// 読めないファイル・行は警告してスキップ。1行も読めなければ
    /// `EmptyCorpus` を返し、既存のコーパスはそのまま残る。
    pub fn load_corpus(&mut self, paths: &[PathBuf]) -> Result<usize> {
        let mut corpus = TrainingCorpus::default();

        for path in paths {
            match load_training_csv(path) {
                Ok(loaded) => {
                    tracing::info!(
                        "Loaded {} rows from {} ({} skipped)",
                        loaded.records.len(),
                        path.display(),
                        loaded.skipped_rows
                    );
                    corpus.skipped_rows += loaded.skipped_rows;
                    if !loaded.records.is_empty() {
                        corpus.records.extend(loaded.records);
                        corpus.sources.push(path.clone());
                    }
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable source {}: {}", path.display(), e);
                }
            }
        }

        if corpus.is_empty() {
            return Err(GrapheneError::EmptyCorpus);
        }

        let n = corpus.len();
        self.corpus = corpus;
        Ok(n)
    }

    /// ディレクトリ直下の全CSVを読み込む
    pub fn load_corpus_dir(&mut self, dir: &Path) -> Result<usize> {
        let files = list_csv_files(dir).map_err(|e| {
            tracing::warn!("Cannot list {}: {}", dir.display(), e);
            GrapheneError::EmptyCorpus
        })?;
        tracing::info!("Found {} CSV files in {}", files.len(), dir.display());
        self.load_corpus(&files)
    }

    pub fn corpus(&self) -> &TrainingCorpus {
        &self.corpus
    }

    pub fn settings(&self) -> &TrainingSettings {
        &self.settings
    }

    /// 読み込み済みコーパスでバンドルを学習する
    pub fn train(&self) -> Result<TrainedModel> {
        if self.corpus.is_empty() {
            return Err(GrapheneError::EmptyCorpus);
        }

        // 1. ラベルエンコード
        let labels = self.corpus.labels();
        if labels.len() != self.corpus.len() {
            return Err(GrapheneError::training("every training record needs a layer_count"));
        }
        let label_encoder = LabelEncoder::fit(&labels);
        let y = label_encoder
            .encode_all(&labels)
            .ok_or_else(|| GrapheneError::training("label encoding failed"))?;
        let n_classes = label_encoder.n_classes();
        tracing::info!(
            "Training on {} records, classes {:?}",
            self.corpus.len(),
            label_encoder.classes
        );

        // 2. 標準化
        let (scaler, x_scaled) = StandardScaler::fit_transform(&self.corpus.features());

        // 3. RFEで特徴量選択
        let n_select = self.settings.n_features_to_select.clamp(1, FEATURE_NAMES.len());
        let feature_selector = FeatureSelector::fit_rfe(&x_scaled, &y, n_classes, n_select, SELECTOR_C)?;
        let x_selected = feature_selector.transform(&x_scaled);
        let full_feature_names: Vec<String> = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
        let selected_feature_names = feature_selector.selected_names(&full_feature_names);
        tracing::info!("Selected features: {}", selected_feature_names.join(", "));

        // 4. グリッドサーチ
        let svm_search: SearchResult<SvmParams> = grid_search(
            &x_selected,
            &y,
            &SvmParams::grid(),
            self.settings.cv_folds,
            |x_train, y_train, x_test, params| {
                Ok(SvmClassifier::fit(x_train, y_train, n_classes, params)?.predict(x_test))
            },
        )?;
        tracing::info!(
            "Best SVM: {} (CV accuracy {:.4})",
            svm_search.best_params,
            svm_search.best_score
        );

        let seed = self.settings.seed;
        let forest_search: SearchResult<ForestParams> = grid_search(
            &x_selected,
            &y,
            &ForestParams::grid(),
            self.settings.cv_folds,
            |x_train, y_train, x_test, params| {
                Ok(RandomForest::fit(x_train, y_train, n_classes, params, seed).predict(x_test))
            },
        )?;
        tracing::info!(
            "Best RandomForest: {} (CV accuracy {:.4})",
            forest_search.best_params,
            forest_search.best_score
        );

        // 5. 全データで再学習してアンサンブル
        let svm = SvmClassifier::fit(&x_selected, &y, n_classes, svm_search.best_params)?;
        let forest = RandomForest::fit(&x_selected, &y, n_classes, forest_search.best_params, seed);
        let ensemble = SoftVotingEnsemble::new(svm, forest);

        // 6. 学習データ上で評価
        let predicted = ensemble.predict(&x_selected);
        let confusion = ConfusionMatrix::from_predictions(n_classes, &y, &predicted);
        let class_names: Vec<String> = label_encoder.classes.iter().map(|c| c.to_string()).collect();
        let accuracy = confusion.accuracy();
        tracing::info!("In-sample accuracy: {:.4}", accuracy);

        let report = TrainingReport {
            n_records: self.corpus.len(),
            classes: label_encoder.classes.clone(),
            accuracy,
            svm_params: svm_search.best_params,
            svm_cv_accuracy: svm_search.best_score,
            forest_params: forest_search.best_params,
            forest_cv_accuracy: forest_search.best_score,
            selected_features: selected_feature_names.clone(),
            classification_report: classification_report(&confusion, &class_names),
            confusion_matrix: confusion.format_table(&class_names),
        };

        let bundle = ModelBundle {
            scaler,
            feature_selector,
            ensemble,
            label_encoder,
            full_feature_names,
            selected_feature_names,
        };

        Ok(TrainedModel { bundle, report })
    }
}

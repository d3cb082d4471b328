//! 通しテスト: 収集 → 書き出し → 学習 → 保存 → 読み込み → 推論

use std::path::{Path, PathBuf};

use graphene_layers_lib::collector::DataCollector;
use graphene_layers_lib::commands;
use graphene_layers_lib::ml::{Predictor, Trainer};
use graphene_layers_lib::model::model_storage::METADATA_FILE;
use graphene_layers_lib::model::{
    list_model_versions, load_bundle, load_metadata, save_bundle, AppConfig, TrainingSettings,
};
use graphene_layers_lib::{DiffMode, GrapheneError, LayerCount};
use image::{Rgb, RgbImage};

const WIDTH: u32 = 40;
const HEIGHT: u32 = 20;

/// 左半分がフレーク（層が多いほど暗い）、右半分が基板
fn flake_image(layer: LayerCount) -> RgbImage {
    let l = layer as u8;
    RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        let jitter = ((x + y) % 4) as u8;
        if x < WIDTH / 2 {
            Rgb([150 - 20 * l + jitter, 120 - 15 * l + jitter, 170 - 10 * l])
        } else {
            Rgb([160 + jitter, 130, 175 - jitter])
        }
    })
}

fn save_image(dir: &Path, layer: LayerCount) -> PathBuf {
    let path = dir.join(format!("flake_{}.png", layer));
    flake_image(layer).save(&path).unwrap();
    path
}

/// フレークと基板を交互にクリック（`n_pairs` 組）
fn clicks(n_pairs: i64) -> Vec<(i64, i64)> {
    let mut points = Vec::new();
    for i in 0..n_pairs {
        points.push((2 + i, 3 + i % 10));
        points.push((25 + i % 10, 5 + i % 7));
    }
    points
}

fn test_config(root: &Path) -> AppConfig {
    AppConfig {
        data_dir: root.join("data"),
        models_dir: root.join("models"),
        training: TrainingSettings {
            n_features_to_select: 5,
            cv_folds: 3,
            seed: 42,
        },
        ..AppConfig::default()
    }
}

fn collect_corpus(root: &Path, config: &AppConfig) {
    for layer in [1, 2, 3] {
        let image = save_image(root, layer);
        let mut collector = DataCollector::new(DiffMode::Absolute);
        collector.load(&image, layer).unwrap();
        for (x, y) in clicks(6) {
            collector.add_point(x, y).unwrap();
        }
        let out = config.data_dir.join(format!("layer_{}.csv", layer));
        assert_eq!(collector.export_csv(&out).unwrap(), 6);
    }
}

#[test]
fn full_pipeline_round_trip() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    collect_corpus(root.path(), &config);

    let mut trainer = Trainer::new(config.training);
    assert_eq!(trainer.load_corpus_dir(&config.data_dir).unwrap(), 18);
    let trained = trainer.train().unwrap();
    assert_eq!(trained.bundle.label_encoder.classes, vec![1, 2, 3]);
    assert_eq!(trained.bundle.selected_feature_names.len(), 5);

    let folder = config.model_folder("v1");
    save_bundle(&trained.bundle, &folder, Some(&trained.metadata())).unwrap();
    for artifact in graphene_layers_lib::model::model_storage::BUNDLE_ARTIFACTS {
        assert!(folder.join(artifact).is_file(), "{}", artifact);
    }
    assert!(load_metadata(&folder).unwrap().is_some());
    // 上書き保存でき、メタデータなしなら古い metadata.json は消える
    save_bundle(&trained.bundle, &folder, None).unwrap();
    assert_eq!(list_model_versions(&config.models_dir).unwrap(), vec!["v1"]);
    assert!(load_metadata(&folder).unwrap().is_none());
    assert!(!folder.join(METADATA_FILE).exists());

    let loaded = load_bundle(&folder).unwrap();
    assert_eq!(loaded.selected_feature_names, trained.bundle.selected_feature_names);

    // 保存前後で同じ予測になる
    let mut before = Predictor::with_bundle(trained.bundle.clone());
    let mut after = Predictor::new();
    after.load_bundle(&folder).unwrap();
    for predictor in [&mut before, &mut after] {
        predictor.set_image(flake_image(2));
        for (x, y) in clicks(4) {
            predictor.add_point_at(x, y).unwrap();
        }
    }
    let a = before.predict_all().unwrap();
    let b = after.predict_all().unwrap();
    assert_eq!(a.labels, b.labels);
    assert_eq!(a.majority_label, b.majority_label);
    assert_eq!(a.soft_label, b.soft_label);
    assert!((a.soft_confidence - b.soft_confidence).abs() < 1e-12);

    assert_eq!(b.majority_label, 2);
    assert_eq!(b.soft_label, 2);
    assert_eq!(b.labels.len(), 4);
    assert!(b.to_string().contains("Majority vote: 2"));
}

#[test]
fn predictor_keeps_state_on_failures() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    collect_corpus(root.path(), &config);

    let mut trainer = Trainer::new(config.training);
    trainer.load_corpus_dir(&config.data_dir).unwrap();
    let trained = trainer.train().unwrap();
    let folder = config.model_folder("good");
    save_bundle(&trained.bundle, &folder, None).unwrap();

    let mut predictor = Predictor::new();
    predictor.load_bundle(&folder).unwrap();
    predictor.set_image(flake_image(3));
    for (x, y) in clicks(2) {
        predictor.add_point_at(x, y).unwrap();
    }
    let first = predictor.predict_all().unwrap();

    // バッファが空: NoPairs、前回の予測はそのまま
    predictor.reset();
    assert!(matches!(predictor.predict_all(), Err(GrapheneError::NoPairs)));
    assert_eq!(predictor.last_prediction(), Some(&first));

    // 壊れたバンドル: 読み込みは失敗し、前のバンドルが有効なまま
    let broken = config.model_folder("broken");
    save_bundle(&trained.bundle, &broken, None).unwrap();
    std::fs::write(broken.join("scaler.json"), "{ truncated").unwrap();
    assert!(matches!(
        predictor.load_bundle(&broken),
        Err(GrapheneError::BundleLoad { .. })
    ));
    std::fs::remove_file(folder.join("label_encoder.json")).unwrap();
    assert!(load_bundle(&folder).is_err());

    for (x, y) in clicks(2) {
        predictor.add_point_at(x, y).unwrap();
    }
    assert_eq!(predictor.predict_all().unwrap().labels, first.labels);
}

#[test]
fn single_class_corpus_trains_and_predicts() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let image = save_image(root.path(), 2);

    let mut collector = DataCollector::default();
    collector.load(&image, 2).unwrap();
    for (x, y) in clicks(5) {
        collector.add_point(x, y).unwrap();
    }
    let csv = config.data_dir.join("only.csv");
    collector.export_csv(&csv).unwrap();

    let mut trainer = Trainer::new(config.training);
    trainer.load_corpus(&[csv]).unwrap();
    let trained = trainer.train().unwrap();

    let mut predictor = Predictor::with_bundle(trained.bundle);
    predictor.set_image(flake_image(3));
    for (x, y) in clicks(3) {
        predictor.add_point_at(x, y).unwrap();
    }
    let summary = predictor.predict_all().unwrap();
    assert_eq!(summary.labels, vec![2, 2, 2]);
    assert_eq!(summary.majority_votes, 3);
    assert!((summary.soft_confidence - 1.0).abs() < 1e-12);
}

#[test]
fn command_layer_flow() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());

    for layer in [1, 3] {
        let image = save_image(root.path(), layer);
        let mut points = clicks(5);
        // 範囲外のクリックは飛ばすだけ
        points.push((WIDTH as i64 + 5, 0));
        let message = commands::collect(&config, &image, layer, &points, None).unwrap();
        assert!(message.starts_with("Saved 5 records"));
        // 既定の出力名には秒単位のタイムスタンプが付く
        std::thread::sleep(std::time::Duration::from_millis(1100));
    }

    let report = commands::train(&config, &[], "cli").unwrap();
    assert!(report.contains("Accuracy:"));
    assert!(report.contains("Model saved as 'cli'"));

    let listing = commands::list_models(&config).unwrap();
    assert!(listing.starts_with("cli"));

    let image = save_image(root.path(), 3);
    let summary = commands::predict(&config, "cli", &image, &clicks(3)).unwrap();
    assert!(summary.contains("Majority vote: 3"));

    assert!(commands::predict(&config, "missing", &image, &clicks(1)).is_err());
}

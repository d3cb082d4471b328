//! 画像1枚分の学習データ収集
//!
//! 点を1つずつクリックし、2点ごとにペアを閉じてラベル付き [`FeatureRecord`]
//! を追加する。取り消しは点のみが対象で、ペアの2点目を消しても
//! 作られたレコードは残る。

use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::csv_loader::write_records_csv;
use crate::error::{GrapheneError, Result};
use crate::features::FeatureRecord;
use crate::sampler;
use crate::types::{DiffMode, LayerCount, PointPair, SampledPoint};

/// クリック位置付きのサンプル点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedPoint {
    pub x: i64,
    pub y: i64,
    pub point: SampledPoint,
}

/// 受け付けたクリックの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddPointOutcome {
    /// ペアの1点目。相方待ち
    Pending,
    /// ペアが閉じた。完成したペアは `pairs` 組
    PairCompleted { pairs: usize },
}

struct CollectionSession {
    image: RgbImage,
    layer_count: LayerCount,
    points: Vec<PlacedPoint>,
    records: Vec<FeatureRecord>,
}

/// 読み込んだ画像へのクリックからラベル付きレコードを集める
pub struct DataCollector {
    session: Option<CollectionSession>,
    diff_mode: DiffMode,
}

impl DataCollector {
    pub fn new(diff_mode: DiffMode) -> Self {
        Self {
            session: None,
            diff_mode,
        }
    }

    /// 画像ファイルを読み込み、`layer_count` ラベルで新しいセッションを始める。
    ///
    /// 読み込みやデコードに失敗した場合は前のセッションをそのまま残す。
    pub fn load(&mut self, path: &Path, layer_count: LayerCount) -> Result<()> {
        let image = sampler::load_image(path)?;
        self.load_image(image, layer_count);
        tracing::info!(
            "Loaded {} for collection ({} layers)",
            path.display(),
            layer_count
        );
        Ok(())
    }

    /// デコード済みのラスタで新しいセッションを始める
    pub fn load_image(&mut self, image: RgbImage, layer_count: LayerCount) {
        self.session = Some(CollectionSession {
            image,
            layer_count,
            points: Vec::new(),
            records: Vec::new(),
        });
    }

    /// `(x, y)` をサンプルして点バッファに追加する。
    ///
    /// 範囲外のクリックは状態を変えずに拒否する。
    pub fn add_point(&mut self, x: i64, y: i64) -> Result<AddPointOutcome> {
        let diff_mode = self.diff_mode;
        let session = self.session.as_mut().ok_or(GrapheneError::NoImageLoaded)?;

        let point = sampler::sample(&session.image, x, y)?;
        session.points.push(PlacedPoint { x, y, point });

        if session.points.len() % 2 != 0 {
            return Ok(AddPointOutcome::Pending);
        }

        let n = session.points.len();
        let pair = PointPair::new(session.points[n - 2].point, session.points[n - 1].point);
        let record = FeatureRecord::build(&pair, diff_mode).with_label(session.layer_count);
        session.records.push(record);

        tracing::debug!("Recorded pair #{}", session.records.len());
        Ok(AddPointOutcome::PairCompleted {
            pairs: session.records.len(),
        })
    }

    /// 最後に追加した点を取り除いて返す
    pub fn undo_last_point(&mut self) -> Option<PlacedPoint> {
        self.session.as_mut().and_then(|s| s.points.pop())
    }

    /// 集めたレコードをすべて `path` に書き出す
    pub fn export_csv(&self, path: &Path) -> Result<usize> {
        let records = self.records();
        if records.is_empty() {
            return Err(GrapheneError::NoData);
        }
        write_records_csv(path, records)?;
        tracing::info!("Exported {} records to {}", records.len(), path.display());
        Ok(records.len())
    }

    pub fn records(&self) -> &[FeatureRecord] {
        self.session
            .as_ref()
            .map(|s| s.records.as_slice())
            .unwrap_or(&[])
    }

    pub fn points(&self) -> &[PlacedPoint] {
        self.session
            .as_ref()
            .map(|s| s.points.as_slice())
            .unwrap_or(&[])
    }

    /// ペアになっていない末尾の点
    pub fn pending_point(&self) -> Option<&PlacedPoint> {
        let points = self.points();
        if points.len() % 2 == 1 {
            points.last()
        } else {
            None
        }
    }

    pub fn layer_count(&self) -> Option<LayerCount> {
        self.session.as_ref().map(|s| s.layer_count)
    }

    pub fn image(&self) -> Option<&RgbImage> {
        self.session.as_ref().map(|s| &s.image)
    }

    pub fn diff_mode(&self) -> DiffMode {
        self.diff_mode
    }
}

impl Default for DataCollector {
    fn default() -> Self {
        Self::new(DiffMode::default())
    }
}

/// タイムスタンプ付きの出力パス: `<data_dir>/graphene_data_YYYYmmdd_HHMMSS.csv`
pub fn default_export_path(data_dir: &Path) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    data_dir.join(format!("graphene_data_{}.csv", timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_loader::load_training_csv;
    use image::Rgb;

    fn striped_image() -> RgbImage {
        // 左半分: グラフェン, 右半分: 基板
        RgbImage::from_fn(8, 4, |x, _| {
            if x < 4 {
                Rgb([90, 60, 140])
            } else {
                Rgb([120, 80, 160])
            }
        })
    }

    fn collector() -> DataCollector {
        let mut collector = DataCollector::default();
        collector.load_image(striped_image(), 3);
        collector
    }

    #[test]
    fn test_add_point_requires_image() {
        let mut collector = DataCollector::default();
        assert!(matches!(
            collector.add_point(0, 0),
            Err(GrapheneError::NoImageLoaded)
        ));
    }

    #[test]
    fn test_even_points_make_records() {
        let mut c = collector();
        for n in 0..3 {
            assert_eq!(c.add_point(1, 1).unwrap(), AddPointOutcome::Pending);
            assert_eq!(
                c.add_point(6, 2).unwrap(),
                AddPointOutcome::PairCompleted {
                    pairs: n + 1
                }
            );
        }
        assert_eq!(c.records().len(), 3);
        assert!(c.pending_point().is_none());

        c.add_point(2, 2).unwrap();
        assert_eq!(c.records().len(), 3);
        assert_eq!(c.pending_point().map(|p| (p.x, p.y)), Some((2, 2)));

        let record = &c.records()[0];
        assert_eq!(record.layer_count, Some(3));
        assert_eq!(record.get("R1"), Some(90.0));
        assert_eq!(record.get("R2"), Some(120.0));
        assert_eq!(record.get("diff_R"), Some(30.0));
    }

    #[test]
    fn test_out_of_bounds_does_not_mutate() {
        let mut c = collector();
        c.add_point(1, 1).unwrap();
        let before_points = c.points().len();

        assert!(matches!(
            c.add_point(8, 0),
            Err(GrapheneError::OutOfBounds { .. })
        ));
        assert!(c.add_point(-1, 0).is_err());
        assert_eq!(c.points().len(), before_points);
        assert!(c.records().is_empty());
    }

    #[test]
    fn test_undo_pending_point() {
        let mut c = collector();
        c.add_point(1, 1).unwrap();
        let undone = c.undo_last_point().unwrap();
        assert_eq!((undone.x, undone.y), (1, 1));
        assert!(c.points().is_empty());
        assert!(c.records().is_empty());
    }

    #[test]
    fn test_undo_after_pair_keeps_record() {
        let mut c = collector();
        c.add_point(1, 1).unwrap();
        c.add_point(6, 1).unwrap();
        c.undo_last_point();
        assert_eq!(c.points().len(), 1);
        assert_eq!(c.records().len(), 1);

        // 残った点は次のクリックとペアになる
        c.add_point(5, 3).unwrap();
        assert_eq!(c.records().len(), 2);
    }

    #[test]
    fn test_signed_mode_collection() {
        let mut c = DataCollector::new(DiffMode::Signed);
        c.load_image(striped_image(), 2);
        c.add_point(1, 1).unwrap();
        c.add_point(6, 1).unwrap();
        assert_eq!(c.records()[0].get("diff_R"), Some(-30.0));
    }

    #[test]
    fn test_export_without_data() {
        let c = collector();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            c.export_csv(&dir.path().join("out.csv")),
            Err(GrapheneError::NoData)
        ));
    }

    #[test]
    fn test_failed_load_keeps_session() {
        let mut c = collector();
        c.add_point(1, 1).unwrap();
        c.add_point(6, 1).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.png");
        std::fs::write(&bogus, b"not an image").unwrap();

        assert!(matches!(
            c.load(&bogus, 7),
            Err(GrapheneError::ImageDecode { .. })
        ));
        assert_eq!(c.layer_count(), Some(3));
        assert_eq!(c.records().len(), 1);
    }

    #[test]
    fn test_export_round_trip() {
        let mut c = collector();
        c.add_point(1, 1).unwrap();
        c.add_point(6, 1).unwrap();
        c.add_point(7, 3).unwrap();
        c.add_point(0, 0).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("export.csv");
        assert_eq!(c.export_csv(&path).unwrap(), 2);

        let header_line = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .next()
            .unwrap()
            .to_string();
        assert!(header_line.contains("diff_V"));
        assert!(header_line.ends_with("layer_count"));

        let loaded = load_training_csv(&path).unwrap();
        assert_eq!(loaded.records.len(), 2);
        for (original, reloaded) in c.records().iter().zip(&loaded.records) {
            for (a, b) in original.values.iter().zip(reloaded.values.iter()) {
                assert!((a - b).abs() < 1e-12);
            }
            assert_eq!(original.layer_count, reloaded.layer_count);
        }
    }

    #[test]
    fn test_default_export_path_shape() {
        let path = default_export_path(Path::new("data"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("graphene_data_"));
        assert!(name.ends_with(".csv"));
        assert_eq!(path.parent(), Some(Path::new("data")));
    }
}

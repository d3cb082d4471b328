//! CSVレコードファイル: コーパス読み込みと収集データの書き出し

use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};

use crate::error::Result;
use crate::features::{
    header, FeatureRecord, FIRST_POINT_COLUMNS, LABEL_COLUMN, NUM_CHANNELS, SECOND_POINT_COLUMNS,
};
use crate::types::{DiffMode, LayerCount};

/// 1ファイルから読んだ行
#[derive(Debug, Clone, Default)]
pub struct LoadedSource {
    pub records: Vec<FeatureRecord>,
    /// 解析に失敗して捨てた行数
    pub skipped_rows: usize,
}

/// 1ファイル内の生チャンネル列とラベル列の位置
struct ColumnMap {
    first: [usize; NUM_CHANNELS],
    second: [usize; NUM_CHANNELS],
    label: usize,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> std::result::Result<Self, String> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| format!("missing column '{}'", name))
        };

        let mut first = [0; NUM_CHANNELS];
        let mut second = [0; NUM_CHANNELS];
        for c in 0..NUM_CHANNELS {
            first[c] = find(FIRST_POINT_COLUMNS[c])?;
            second[c] = find(SECOND_POINT_COLUMNS[c])?;
        }
        let label = find(LABEL_COLUMN)?;

        Ok(Self {
            first,
            second,
            label,
        })
    }
}

/// CSVファイルからラベル付きの学習行を読み込む。
///
/// 読むのは12個の生チャンネル列と `layer_count` のみで、比と差は
/// 計算し直す（差は絶対値）。解析できない行は警告を出して飛ばす。
/// 必要なヘッダーがないファイルは全体が失敗になる。
pub fn load_training_csv(path: &Path) -> Result<LoadedSource> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let columns = ColumnMap::from_headers(&headers).map_err(|reason| {
        csv::Error::from(std::io::Error::new(std::io::ErrorKind::InvalidData, reason))
    })?;

    let mut loaded = LoadedSource::default();

    for (row_idx, result) in reader.records().enumerate() {
        let parsed = result
            .map_err(|e| e.to_string())
            .and_then(|record| parse_row(&record, &columns));

        match parsed {
            Ok(record) => loaded.records.push(record),
            Err(reason) => {
                // ヘッダー行を1行目として数える
                tracing::warn!(
                    "Skipping row {} of {}: {}",
                    row_idx + 2,
                    path.display(),
                    reason
                );
                loaded.skipped_rows += 1;
            }
        }
    }

    Ok(loaded)
}

fn parse_row(record: &StringRecord, columns: &ColumnMap) -> std::result::Result<FeatureRecord, String> {
    let field = |idx: usize| {
        record
            .get(idx)
            .ok_or_else(|| format!("missing field at column {}", idx))
    };
    let number = |idx: usize| -> std::result::Result<f64, String> {
        let raw = field(idx)?;
        let value: f64 = raw
            .parse()
            .map_err(|_| format!("'{}' is not a number", raw))?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(format!("'{}' is not finite", raw))
        }
    };

    let mut first = [0.0; NUM_CHANNELS];
    let mut second = [0.0; NUM_CHANNELS];
    for c in 0..NUM_CHANNELS {
        first[c] = number(columns.first[c])?;
        second[c] = number(columns.second[c])?;
    }
    let layer_count = parse_layer_count(field(columns.label)?)?;

    Ok(FeatureRecord::from_channels(first, second, DiffMode::Absolute).with_label(layer_count))
}

/// 層数を解析する（`"3.0"` のような整数値の浮動小数も可）
pub fn parse_layer_count(raw: &str) -> std::result::Result<LayerCount, String> {
    if let Ok(value) = raw.parse::<LayerCount>() {
        return Ok(value);
    }
    match raw.parse::<f64>() {
        Ok(value) if value >= 0.0 && value.fract() == 0.0 && value <= LayerCount::MAX as f64 => {
            Ok(value as LayerCount)
        }
        _ => Err(format!("'{}' is not a valid layer count", raw)),
    }
}

/// 24特徴量と `layer_count` のヘッダー付きでレコードを書き出す
pub fn write_records_csv(path: &Path, records: &[FeatureRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = WriterBuilder::new().from_path(path)?;
    writer.write_record(header(true))?;

    for record in records {
        let mut fields = record.to_csv_fields();
        if record.layer_count.is_none() {
            fields.push(String::new());
        }
        writer.write_record(&fields)?;
    }

    writer.flush()?;
    Ok(())
}

/// `dir` 直下の `*.csv` をファイル名順に返す
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() {
            if let Some(ext) = path.extension() {
                if ext.to_string_lossy().eq_ignore_ascii_case("csv") {
                    files.push(path);
                }
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_NAMES;

    const HEADER_12: &str = "R1,G1,B1,H1,S1,V1,R2,G2,B2,H2,S2,V2,layer_count";

    #[test]
    fn test_parse_layer_count() {
        assert_eq!(parse_layer_count("3"), Ok(3));
        assert_eq!(parse_layer_count("4.0"), Ok(4));
        assert!(parse_layer_count("4.5").is_err());
        assert!(parse_layer_count("-1").is_err());
        assert!(parse_layer_count("two").is_err());
    }

    #[test]
    fn test_load_recomputes_derived_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        std::fs::write(
            &path,
            format!(
                "{}\n100,50,0,0.5,1,0.4,50,100,10,0.25,0,0.2,3\n",
                HEADER_12
            ),
        )
        .unwrap();

        let loaded = load_training_csv(&path).unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.skipped_rows, 0);

        let record = &loaded.records[0];
        assert_eq!(record.layer_count, Some(3));
        assert_eq!(record.get("ratio_R"), Some(2.0));
        assert_eq!(record.get("ratio_S"), Some(0.0));
        assert_eq!(record.get("diff_G"), Some(50.0));
        assert_eq!(record.get("diff_B"), Some(10.0));
    }

    #[test]
    fn test_stale_derived_columns_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.csv");
        let mut line = vec!["10"; 12];
        line.extend(vec!["999"; 12]);
        line.push("2");
        std::fs::write(
            &path,
            format!("{},layer_count\n{}\n", FEATURE_NAMES.join(","), line.join(",")),
        )
        .unwrap();

        let loaded = load_training_csv(&path).unwrap();
        let record = &loaded.records[0];
        assert_eq!(record.get("ratio_R"), Some(1.0));
        assert_eq!(record.get("diff_V"), Some(0.0));
    }

    #[test]
    fn test_bad_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.csv");
        std::fs::write(
            &path,
            format!(
                "{}\n1,2,3,0.1,0.2,0.3,4,5,6,0.4,0.5,0.6,2\nx,2,3,0.1,0.2,0.3,4,5,6,0.4,0.5,0.6,2\n1,2,3\n1,2,3,0.1,0.2,0.3,4,5,6,0.4,0.5,0.6,5\n",
                HEADER_12
            ),
        )
        .unwrap();

        let loaded = load_training_csv(&path).unwrap();
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.skipped_rows, 2);
    }

    #[test]
    fn test_missing_label_column_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nolabel.csv");
        std::fs::write(&path, "R1,G1,B1\n1,2,3\n").unwrap();
        assert!(load_training_csv(&path).is_err());
    }

    #[test]
    fn test_list_csv_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.csv", "a.CSV", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let files = list_csv_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.CSV", "b.csv"]);
    }
}

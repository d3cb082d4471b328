//! 層数分類器の評価指標

use std::fmt::Write as _;

/// `K` クラス分類器の混同行列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub n_classes: usize,
    /// 行優先の `KxK` 件数（`truth * K + predicted`）
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![0; n_classes * n_classes],
        }
    }

    /// 正解と予測の列から作る
    pub fn from_predictions(n_classes: usize, truth: &[usize], predicted: &[usize]) -> Self {
        let mut cm = Self::new(n_classes);
        for (&t, &p) in truth.iter().zip(predicted) {
            cm.add(t, p);
        }
        cm
    }

    pub fn add(&mut self, truth: usize, predicted: usize) {
        if truth >= self.n_classes || predicted >= self.n_classes {
            return;
        }
        let idx = truth * self.n_classes + predicted;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes + predicted]
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// 対角成分の割合（空なら `0.0`）
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: u32 = (0..self.n_classes).map(|k| self.get(k, k)).sum();
        correct as f64 / total as f64
    }

    /// 行が正解ラベル、列が予測ラベル
    pub fn format_table(&self, labels: &[String]) -> String {
        let width = labels
            .iter()
            .map(|l| l.len())
            .chain(self.counts.iter().map(|c| c.to_string().len()))
            .max()
            .unwrap_or(1)
            .max(4);

        let mut out = String::new();
        let _ = write!(out, "{:>width$}", "true\\pred", width = width.max(9));
        for label in labels {
            let _ = write!(out, " {:>width$}", label, width = width);
        }
        out.push('\n');
        for (t, label) in labels.iter().enumerate().take(self.n_classes) {
            let _ = write!(out, "{:>width$}", label, width = width.max(9));
            for p in 0..self.n_classes {
                let _ = write!(out, " {:>width$}", self.get(t, p), width = width);
            }
            out.push('\n');
        }
        out
    }
}

/// 1クラスの適合率・再現率
#[derive(Debug, Clone, PartialEq)]
pub struct PerClassStats {
    /// `TP / (TP + FP)`（このクラスの予測がなければ `0.0`）
    pub precision: f64,
    /// `TP / (TP + FN)`
    pub recall: f64,
    pub f1: f64,
    /// このクラスの正解件数
    pub support: u32,
}

pub fn precision_recall_by_class(cm: &ConfusionMatrix) -> Vec<PerClassStats> {
    let k = cm.n_classes;
    let mut stats = Vec::with_capacity(k);
    for class_idx in 0..k {
        let tp = cm.get(class_idx, class_idx) as f64;
        let support: u32 = (0..k).map(|j| cm.get(class_idx, j)).sum();
        let predicted: u32 = (0..k).map(|i| cm.get(i, class_idx)).sum();

        let precision = if predicted > 0 { tp / predicted as f64 } else { 0.0 };
        let recall = if support > 0 { tp / support as f64 } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        stats.push(PerClassStats {
            precision,
            recall,
            f1,
            support,
        });
    }
    stats
}

/// クラスごとの precision / recall / F1 / support と、
/// accuracy・マクロ平均・件数加重平均を並べたテキストレポート
pub fn classification_report(cm: &ConfusionMatrix, labels: &[String]) -> String {
    let stats = precision_recall_by_class(cm);
    let total = cm.total();
    let name_width = labels.iter().map(|l| l.len()).max().unwrap_or(0).max(12);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>nw$} {:>9} {:>9} {:>9} {:>9}",
        "",
        "precision",
        "recall",
        "f1-score",
        "support",
        nw = name_width
    );
    out.push('\n');

    for (label, s) in labels.iter().zip(&stats) {
        let _ = writeln!(
            out,
            "{:>nw$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
            label,
            s.precision,
            s.recall,
            s.f1,
            s.support,
            nw = name_width
        );
    }
    out.push('\n');

    let _ = writeln!(
        out,
        "{:>nw$} {:>9} {:>9} {:>9.2} {:>9}",
        "accuracy",
        "",
        "",
        cm.accuracy(),
        total,
        nw = name_width
    );

    let n = stats.len().max(1) as f64;
    let macro_avg = |f: fn(&PerClassStats) -> f64| stats.iter().map(f).sum::<f64>() / n;
    let weighted_avg = |f: fn(&PerClassStats) -> f64| {
        if total == 0 {
            0.0
        } else {
            stats.iter().map(|s| f(s) * s.support as f64).sum::<f64>() / total as f64
        }
    };

    let _ = writeln!(
        out,
        "{:>nw$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
        "macro avg",
        macro_avg(|s| s.precision),
        macro_avg(|s| s.recall),
        macro_avg(|s| s.f1),
        total,
        nw = name_width
    );
    let _ = writeln!(
        out,
        "{:>nw$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
        "weighted avg",
        weighted_avg(|s| s.precision),
        weighted_avg(|s| s.recall),
        weighted_avg(|s| s.f1),
        total,
        nw = name_width
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_confusion_counts_and_accuracy() {
        let cm = ConfusionMatrix::from_predictions(2, &[0, 0, 1, 1], &[0, 1, 1, 1]);
        assert_eq!(cm.get(0, 0), 1);
        assert_eq!(cm.get(0, 1), 1);
        assert_eq!(cm.get(1, 1), 2);
        assert_eq!(cm.total(), 4);
        assert!((cm.accuracy() - 0.75).abs() < 1e-12);
        assert_eq!(ConfusionMatrix::new(3).accuracy(), 0.0);
    }

    #[test]
    fn test_precision_recall() {
        let cm = ConfusionMatrix::from_predictions(2, &[0, 0, 1, 1], &[0, 1, 1, 1]);
        let stats = precision_recall_by_class(&cm);
        assert!((stats[0].precision - 1.0).abs() < 1e-12);
        assert!((stats[0].recall - 0.5).abs() < 1e-12);
        assert!((stats[1].precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((stats[1].recall - 1.0).abs() < 1e-12);
        assert_eq!(stats[1].support, 2);
        assert!((stats[0].f1 - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_class_never_predicted() {
        let cm = ConfusionMatrix::from_predictions(2, &[0, 1], &[0, 0]);
        let stats = precision_recall_by_class(&cm);
        assert_eq!(stats[1].precision, 0.0);
        assert_eq!(stats[1].f1, 0.0);
    }

    #[test]
    fn test_report_layout() {
        let cm = ConfusionMatrix::from_predictions(2, &[0, 0, 1, 1], &[0, 1, 1, 1]);
        let report = classification_report(&cm, &labels(&["2", "3"]));
        assert!(report.contains("precision"));
        assert!(report.contains("accuracy"));
        assert!(report.contains("macro avg"));
        assert!(report.contains("weighted avg"));
        assert!(report.contains("0.75"));

        let table = cm.format_table(&labels(&["2", "3"]));
        assert_eq!(table.lines().count(), 3);
        assert!(table.lines().nth(1).unwrap().trim_start().starts_with('2'));
    }
}

//! 層数の連番エンコード

use serde::{Deserialize, Serialize};

use crate::types::LayerCount;

/// 観測した層数を昇順に `0..n_classes` へ対応付ける
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    pub classes: Vec<LayerCount>,
}

impl LabelEncoder {
    pub fn fit(labels: &[LayerCount]) -> Self {
        let mut classes = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();
        Self { classes }
    }

    pub fn encode(&self, label: LayerCount) -> Option<usize> {
        self.classes.binary_search(&label).ok()
    }

    /// 全ラベルをエンコードする（未知のラベルがあれば `None`）
    pub fn encode_all(&self, labels: &[LayerCount]) -> Option<Vec<usize>> {
        labels.iter().map(|&l| self.encode(l)).collect()
    }

    pub fn decode(&self, index: usize) -> Option<LayerCount> {
        self.classes.get(index).copied()
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_and_invertible() {
        let encoder = LabelEncoder::fit(&[5, 3, 4, 3, 5]);
        assert_eq!(encoder.classes, vec![3, 4, 5]);
        assert_eq!(encoder.encode(4), Some(1));
        assert_eq!(encoder.encode(7), None);
        assert_eq!(encoder.encode_all(&[5, 3]), Some(vec![2, 0]));
        for idx in 0..encoder.n_classes() {
            assert_eq!(encoder.encode(encoder.decode(idx).unwrap()), Some(idx));
        }
        assert_eq!(encoder.decode(3), None);
    }
}

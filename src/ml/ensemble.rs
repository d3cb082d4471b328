//! カーネルSVMとランダムフォレストのソフト投票アンサンブル

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::ml::forest::RandomForest;
use crate::ml::svm::{argmax, SvmClassifier};

/// 両モデルのクラス確率を平均し、最大のクラスを採用する
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftVotingEnsemble {
    pub svm: SvmClassifier,
    pub forest: RandomForest,
    pub n_classes: usize,
}

impl SoftVotingEnsemble {
    /// 学習済みの2モデルをまとめる
    pub fn new(svm: SvmClassifier, forest: RandomForest) -> Self {
        let n_classes = svm.n_classes.max(forest.n_classes).max(1);
        Self {
            svm,
            forest,
            n_classes,
        }
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        let p_svm = self.svm.predict_proba(x);
        let p_forest = self.forest.predict_proba(x);
        (p_svm + p_forest) / 2.0
    }

    pub fn predict(&self, x: &Array2<f64>) -> Vec<usize> {
        self.predict_proba(x)
            .rows()
            .into_iter()
            .map(|row| argmax(&row.to_vec()))
            .collect()
    }

    /// 学習時の入力列数
    pub fn n_features(&self) -> usize {
        self.svm.n_features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::forest::ForestParams;
    use crate::ml::svm::SvmParams;
    use ndarray::array;

    #[test]
    fn test_soft_vote_averages_members() {
        let x = array![[-1.0], [-0.9], [-1.1], [1.0], [0.9], [1.1]];
        let y = vec![0, 0, 0, 1, 1, 1];
        let svm = SvmClassifier::fit(&x, &y, 2, SvmParams::linear(1.0)).unwrap();
        let forest = RandomForest::fit(
            &x,
            &y,
            2,
            ForestParams {
                n_estimators: 10,
                max_depth: None,
                min_samples_split: 2,
            },
            42,
        );
        let ensemble = SoftVotingEnsemble::new(svm.clone(), forest.clone());

        let proba = ensemble.predict_proba(&x);
        let expected = (svm.predict_proba(&x) + forest.predict_proba(&x)) / 2.0;
        assert_eq!(proba, expected);
        assert_eq!(ensemble.predict(&x), y);
        assert_eq!(ensemble.n_features(), 1);
    }
}

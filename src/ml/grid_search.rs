//! 層化k分割の正解率で評価する全探索のハイパーパラメータ探索

use ndarray::{Array2, Axis};

use crate::error::Result;

/// 1グリッド点の交差検証正解率
#[derive(Debug, Clone)]
pub struct CvScore<P> {
    pub params: P,
    pub mean_accuracy: f64,
    pub fold_accuracies: Vec<f64>,
}

/// 全スコアと最良のグリッド点
#[derive(Debug, Clone)]
pub struct SearchResult<P> {
    pub best_params: P,
    pub best_score: f64,
    pub scores: Vec<CvScore<P>>,
}

/// シャッフルなしの層化 `n_splits` 分割のテスト添字集合。
///
/// サンプルをクラス順（安定ソート）に並べて順番に配るので、各分割に
/// クラスが比率どおり入り、`n_splits <= y.len()` なら空の分割はない。
pub fn stratified_folds(y: &[usize], n_splits: usize) -> Vec<Vec<usize>> {
    let n_splits = n_splits.max(1);
    let mut order: Vec<usize> = (0..y.len()).collect();
    order.sort_by_key(|&i| y[i]);

    let mut folds = vec![Vec::new(); n_splits];
    for (pos, idx) in order.into_iter().enumerate() {
        folds[pos % n_splits].push(idx);
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    folds
}

/// 全グリッド点を `min(cv_folds, n)` 分割で評価し最良を選ぶ。
///
/// `fit_predict(x_train, y_train, x_test, params)` は `x_test` の予測を返す。
/// 同点なら先のグリッド点を採用する。サンプルが2未満なら評価できないので
/// 最初のグリッド点を返す。
pub fn grid_search<P, F>(
    x: &Array2<f64>,
    y: &[usize],
    grid: &[P],
    cv_folds: usize,
    fit_predict: F,
) -> Result<SearchResult<P>>
where
    P: Copy + std::fmt::Display,
    F: Fn(&Array2<f64>, &[usize], &Array2<f64>, P) -> Result<Vec<usize>>,
{
    let n = y.len();
    let n_splits = cv_folds.min(n);
    let folds = if n_splits >= 2 {
        stratified_folds(y, n_splits)
    } else {
        Vec::new()
    };

    let mut scores = Vec::with_capacity(grid.len());
    for &params in grid {
        let mut fold_accuracies = Vec::with_capacity(folds.len());

        for test_idx in &folds {
            let train_idx: Vec<usize> = (0..n).filter(|i| test_idx.binary_search(i).is_err()).collect();
            if train_idx.is_empty() || test_idx.is_empty() {
                continue;
            }

            let x_train = x.select(Axis(0), &train_idx);
            let y_train: Vec<usize> = train_idx.iter().map(|&i| y[i]).collect();
            let x_test = x.select(Axis(0), test_idx);

            let predicted = fit_predict(&x_train, &y_train, &x_test, params)?;
            let correct = predicted
                .iter()
                .zip(test_idx)
                .filter(|(&p, &i)| p == y[i])
                .count();
            fold_accuracies.push(correct as f64 / test_idx.len() as f64);
        }

        let mean_accuracy = if fold_accuracies.is_empty() {
            0.0
        } else {
            fold_accuracies.iter().sum::<f64>() / fold_accuracies.len() as f64
        };
        tracing::debug!("CV {} -> {:.4}", params, mean_accuracy);

        scores.push(CvScore {
            params,
            mean_accuracy,
            fold_accuracies,
        });
    }

    let mut best: Option<&CvScore<P>> = None;
    for score in &scores {
        if best.map_or(true, |b| score.mean_accuracy > b.mean_accuracy) {
            best = Some(score);
        }
    }
    let (best_params, best_score) = match best {
        Some(b) => (b.params, b.mean_accuracy),
        None => {
            return Err(crate::error::GrapheneError::training(
                "hyperparameter grid is empty",
            ))
        }
    };

    Ok(SearchResult {
        best_params,
        best_score,
        scores,
    })
}

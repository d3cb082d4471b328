//! ランダムフォレスト分類器: ブートストラップした Gini 決定木の集合。
//! 分割ごとに √d 個の特徴量を候補にし、確率は葉の分布の平均。

use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::ml::svm::argmax;

/// フォレスト探索の1グリッド点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// `None` なら葉が純粋になるまで伸ばす
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
}

impl ForestParams {
    /// 探索グリッド: max_depth × min_samples_split × n_estimators
    pub fn grid() -> Vec<Self> {
        let mut grid = Vec::new();
        for max_depth in [None, Some(10)] {
            for min_samples_split in [2, 4] {
                for n_estimators in [100, 200] {
                    grid.push(Self {
                        n_estimators,
                        max_depth,
                        min_samples_split,
                    });
                }
            }
        }
        grid
    }
}

impl std::fmt::Display for ForestParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let depth = match self.max_depth {
            Some(d) => d.to_string(),
            None => "None".to_string(),
        };
        write!(
            f,
            "n_estimators={}, max_depth={}, min_samples_split={}",
            self.n_estimators, depth, self.min_samples_split
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Node {
    Leaf {
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// n_left·gini_left + n_right·gini_right
    weighted_impurity: f64,
}

/// 1本の木の全ノードで共有する成長設定
struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    y: &'a [usize],
    n_classes: usize,
    params: ForestParams,
    max_features: usize,
}

/// フラットなノード列で持つ CART 木（根は添字0）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn leaf_distribution(&self, row: ArrayView1<f64>) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }
}

impl<'a> TreeBuilder<'a> {
    fn grow(&self, indices: Vec<usize>, rng: &mut StdRng) -> DecisionTree {
        let mut tree = DecisionTree { nodes: Vec::new() };
        self.build(&mut tree, indices, 0, rng);
        tree
    }

    fn build(&self, tree: &mut DecisionTree, indices: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let counts = class_counts(self.y, &indices, self.n_classes);
        let is_pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let depth_reached = self.params.max_depth.map_or(false, |d| depth >= d);

        if is_pure || depth_reached || indices.len() < self.params.min_samples_split {
            return push_leaf(tree, &counts);
        }

        let split = match self.best_split(&indices, rng) {
            Some(split) => split,
            None => return push_leaf(tree, &counts),
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[[i, split.feature]] <= split.threshold);

        let node_idx = tree.nodes.len();
        tree.nodes.push(Node::Leaf {
            distribution: Vec::new(),
        });
        let left = self.build(tree, left_idx, depth + 1, rng);
        let right = self.build(tree, right_idx, depth + 1, rng);
        tree.nodes[node_idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_idx
    }

    /// ランダムな特徴量部分集合で最良の Gini 分割を探す。
    /// 部分集合が定数列だけなら全特徴量で探し直す。
    fn best_split(&self, indices: &[usize], rng: &mut StdRng) -> Option<SplitCandidate> {
        let n_features = self.x.ncols();
        let candidates = rand::seq::index::sample(rng, n_features, self.max_features.min(n_features)).into_vec();

        let best = self.best_split_among(indices, &candidates);
        if best.is_some() || candidates.len() == n_features {
            return best;
        }
        let rest: Vec<usize> = (0..n_features).filter(|f| !candidates.contains(f)).collect();
        self.best_split_among(indices, &rest)
    }

    fn best_split_among(&self, indices: &[usize], features: &[usize]) -> Option<SplitCandidate> {
        let n = indices.len();
        let total = class_counts(self.y, indices, self.n_classes);
        let mut best: Option<SplitCandidate> = None;

        for &feature in features {
            let mut sorted: Vec<(f64, usize)> = indices
                .iter()
                .map(|&i| (self.x[[i, feature]], self.y[i]))
                .collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = vec![0usize; self.n_classes];
            for pos in 0..n.saturating_sub(1) {
                left[sorted[pos].1] += 1;
                let (value, next) = (sorted[pos].0, sorted[pos + 1].0);
                if value == next {
                    continue;
                }

                let n_left = pos + 1;
                let n_right = n - n_left;
                let right: Vec<usize> = total.iter().zip(&left).map(|(t, l)| t - l).collect();
                let impurity = n_left as f64 * gini(&left, n_left) + n_right as f64 * gini(&right, n_right);

                if best.map_or(true, |b| impurity < b.weighted_impurity) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: value + (next - value) / 2.0,
                        weighted_impurity: impurity,
                    });
                }
            }
        }

        best
    }
}

fn push_leaf(tree: &mut DecisionTree, counts: &[usize]) -> usize {
    let total: usize = counts.iter().sum();
    let distribution = if total == 0 {
        vec![1.0 / counts.len().max(1) as f64; counts.len()]
    } else {
        counts.iter().map(|&c| c as f64 / total as f64).collect()
    };
    tree.nodes.push(Node::Leaf { distribution });
    tree.nodes.len() - 1
}

fn class_counts(y: &[usize], indices: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes.max(1)];
    for &i in indices {
        if y[i] < counts.len() {
            counts[y[i]] += 1;
        }
    }
    counts
}

fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

/// [`DecisionTree`] のバギングアンサンブル
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub params: ForestParams,
    pub n_classes: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// エンコード済みラベル `y` で学習する。同じシードなら結果も同じ
    pub fn fit(x: &Array2<f64>, y: &[usize], n_classes: usize, params: ForestParams, seed: u64) -> Self {
        let n = x.nrows();
        let n_classes = n_classes.max(1);
        let max_features = ((x.ncols() as f64).sqrt().floor() as usize).max(1);
        let builder = TreeBuilder {
            x,
            y,
            n_classes,
            params,
            max_features,
        };

        let mut rng = StdRng::seed_from_u64(seed);
        let mut trees = Vec::with_capacity(params.n_estimators);
        for _ in 0..params.n_estimators {
            let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n.max(1))).filter(|&i| i < n).collect();
            trees.push(builder.grow(bootstrap, &mut rng));
        }

        Self {
            params,
            n_classes,
            trees,
        }
    }

    /// 木ごとの葉の分布の平均（1サンプル1行）
    pub fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((x.nrows(), self.n_classes));
        if self.trees.is_empty() {
            out.fill(1.0 / self.n_classes as f64);
            return out;
        }

        for (i, row) in x.rows().into_iter().enumerate() {
            for tree in &self.trees {
                for (c, p) in tree.leaf_distribution(row).iter().enumerate() {
                    out[[i, c]] += p;
                }
            }
        }
        out.mapv_inplace(|p| p / self.trees.len() as f64);
        out
    }

    pub fn predict(&self, x: &Array2<f64>) -> Vec<usize> {
        self.predict_proba(x)
            .rows()
            .into_iter()
            .map(|row| argmax(&row.to_vec()))
            .collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn params(n_estimators: usize, max_depth: Option<usize>) -> ForestParams {
        ForestParams {
            n_estimators,
            max_depth,
            min_samples_split: 2,
        }
    }

    #[test]
    fn test_grid_size() {
        let grid = ForestParams::grid();
        assert_eq!(grid.len(), 8);
        assert_eq!(grid[0].max_depth, None);
        assert_eq!(grid[0].n_estimators, 100);
        assert_eq!(grid[1].n_estimators, 200);
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini(&[4, 0], 4), 0.0);
        assert!((gini(&[2, 2], 4) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_fits_separable_data() {
        let x = array![[0.0, 5.0], [0.2, 5.0], [0.4, 5.0], [1.0, 5.0], [1.2, 5.0], [1.4, 5.0]];
        let y = vec![0, 0, 0, 1, 1, 1];
        let forest = RandomForest::fit(&x, &y, 2, params(25, None), 42);
        assert_eq!(forest.n_trees(), 25);
        assert_eq!(forest.predict(&array![[0.1, 5.0], [1.3, 5.0]]), vec![0, 1]);

        let proba = forest.predict_proba(&x);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_deterministic_for_seed() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = vec![0, 1, 0, 1, 1, 0];
        let a = RandomForest::fit(&x, &y, 2, params(10, Some(3)), 7);
        let b = RandomForest::fit(&x, &y, 2, params(10, Some(3)), 7);
        assert_eq!(a, b);
    }

    #[test]
    fn test_depth_limit() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = vec![0, 1, 0, 1];
        let forest = RandomForest::fit(&x, &y, 2, params(5, Some(1)), 1);
        // 深さ1: 分割1つと葉2つまで
        assert!(forest.trees.iter().all(|t| t.n_nodes() <= 3));
    }

    #[test]
    fn test_single_class() {
        let x = array![[0.0], [1.0]];
        let forest = RandomForest::fit(&x, &[0, 0], 1, params(3, None), 0);
        let proba = forest.predict_proba(&x);
        assert_eq!(proba.dim(), (2, 1));
        assert!(proba.iter().all(|&p| (p - 1.0).abs() < 1e-12));
    }
}

//! 確率推定付きカーネルSVM分類器
//!
//! 多クラスは one-vs-rest に分割し、各2値マシンを `linfa-svm` で学習して
//! サポートベクトルの係数だけを保持する:
//!
//! - 線形カーネル: k(x, y) = x·y
//! - RBFカーネル:  k(x, y) = exp(-γ||x-y||²)
//! - 判定値:       f(x) = Σ(αᵢ·k(x, xᵢ)) - ρ
//!
//! 確率はマシンごとの Platt シグモイドをクラス間で正規化したもの。
//! シグモイドは内部の層化5分割で得た out-of-fold 判定値に当てはめる
//! （どちらかのクラスが2件未満なら学習データの判定値）。
//! ハードラベルは確率が最大のクラス。

use linfa::prelude::*;
use linfa_svm::Svm;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{GrapheneError, Result};

/// これ未満の係数はサポートベクトルとみなさない
const SUPPORT_EPS: f64 = 1e-5;

/// Platt 当てはめ用の内部分割数（上限）
const PLATT_FOLDS: usize = 5;

/// 探索するカーネルの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelKind {
    Rbf,
    Linear,
}

impl std::fmt::Display for KernelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelKind::Rbf => write!(f, "rbf"),
            KernelKind::Linear => write!(f, "linear"),
        }
    }
}

/// RBF の幅を学習行列から決める方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GammaSetting {
    /// `1 / (n_features * var(X))`
    Scale,
    /// `1 / n_features`
    Auto,
}

impl GammaSetting {
    pub fn resolve(&self, x: &Array2<f64>) -> f64 {
        let n_features = x.ncols().max(1) as f64;
        match self {
            GammaSetting::Auto => 1.0 / n_features,
            GammaSetting::Scale => {
                let var = if x.is_empty() { 0.0 } else { x.var(0.0) };
                if var > 0.0 && var.is_finite() {
                    1.0 / (n_features * var)
                } else {
                    1.0
                }
            }
        }
    }
}

impl std::fmt::Display for GammaSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GammaSetting::Scale => write!(f, "scale"),
            GammaSetting::Auto => write!(f, "auto"),
        }
    }
}

/// 学習済みモデルに保存する確定済みカーネル
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Kernel {
    Linear,
    Rbf { gamma: f64 },
}

impl Kernel {
    #[inline]
    fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self {
            Kernel::Linear => a.dot(&b),
            Kernel::Rbf { gamma } => {
                let sq_dist: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
                (-gamma * sq_dist).exp()
            }
        }
    }
}

/// SVM 探索の1グリッド点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SvmParams {
    pub kernel: KernelKind,
    pub c: f64,
    pub gamma: GammaSetting,
}

impl SvmParams {
    /// 正則化 `c` の線形カーネル（特徴量選択の推定器）
    pub fn linear(c: f64) -> Self {
        Self {
            kernel: KernelKind::Linear,
            c,
            gamma: GammaSetting::Scale,
        }
    }

    /// 探索グリッド: C × gamma × kernel の順に入れ子
    pub fn grid() -> Vec<Self> {
        let mut grid = Vec::new();
        for c in [0.1, 1.0, 10.0] {
            for gamma in [GammaSetting::Scale, GammaSetting::Auto] {
                for kernel in [KernelKind::Rbf, KernelKind::Linear] {
                    grid.push(Self { kernel, c, gamma });
                }
            }
        }
        grid
    }
}

impl std::fmt::Display for SvmParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "kernel={}, C={}, gamma={}", self.kernel, self.c, self.gamma)
    }
}

/// 学習済み2値マシン: サポートベクトル・係数・Platt シグモイド
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BinaryMachine {
    /// 符号付き係数 (αᵢ·yᵢ)
    coefficients: Vec<f64>,
    support_vectors: Vec<Vec<f64>>,
    rho: f64,
    platt_a: f64,
    platt_b: f64,
}

impl BinaryMachine {
    fn fit(x: &Array2<f64>, labels: &[bool], kernel: Kernel, c: f64) -> Result<Self> {
        let n_pos = labels.iter().filter(|&&l| l).count();

        let one_sided = n_pos == 0 || n_pos == labels.len();
        let mut machine = if one_sided {
            // 片側のみ: 定数判定
            Self {
                coefficients: Vec::new(),
                support_vectors: Vec::new(),
                rho: if n_pos == 0 { 1.0 } else { -1.0 },
                platt_a: 0.0,
                platt_b: 0.0,
            }
        } else {
            Self::fit_margin(x, labels, kernel, c)?
        };

        let held_out = if one_sided {
            None
        } else {
            out_of_fold_decisions(x, labels, kernel, c)?
        };
        let decisions: Vec<f64> = match held_out {
            Some(decisions) => decisions,
            None => x
                .rows()
                .into_iter()
                .map(|row| machine.decision(&kernel, row))
                .collect(),
        };
        let (a, b) = fit_platt(&decisions, labels);
        machine.platt_a = a;
        machine.platt_b = b;

        Ok(machine)
    }

    /// 両クラスを含むデータで判定関数だけを学習する（Platt は未設定）
    fn fit_margin(x: &Array2<f64>, labels: &[bool], kernel: Kernel, c: f64) -> Result<Self> {
        let dataset = Dataset::new(x.clone(), Array1::from_vec(labels.to_vec()));
        let params = Svm::<f64, bool>::params().pos_neg_weights(c, c);
        let svm = match kernel {
            Kernel::Linear => params.linear_kernel().fit(&dataset),
            Kernel::Rbf { gamma } => params.gaussian_kernel(1.0 / gamma).fit(&dataset),
        }
        .map_err(|e| GrapheneError::training(format!("SVM fit failed: {}", e)))?;

        let mut coefficients = Vec::new();
        let mut support_vectors = Vec::new();
        for (i, &alpha) in svm.alpha.iter().enumerate() {
            if alpha.abs() > SUPPORT_EPS {
                coefficients.push(alpha);
                support_vectors.push(x.row(i).to_vec());
            }
        }

        let mut fitted = Self {
            coefficients,
            support_vectors,
            rho: svm.rho,
            platt_a: 0.0,
            platt_b: 0.0,
        };
        fitted.orient(x, labels, &kernel);
        Ok(fitted)
    }

    /// 正例の平均判定値が負例より低ければ符号を反転する
    fn orient(&mut self, x: &Array2<f64>, labels: &[bool], kernel: &Kernel) {
        let (mut pos, mut neg) = (0.0, 0.0);
        let n_pos = labels.iter().filter(|&&l| l).count().max(1) as f64;
        let n_neg = labels.iter().filter(|&&l| !l).count().max(1) as f64;
        for (row, &label) in x.rows().into_iter().zip(labels) {
            let d = self.decision(kernel, row);
            if label {
                pos += d / n_pos;
            } else {
                neg += d / n_neg;
            }
        }
        if pos < neg {
            self.coefficients.iter_mut().for_each(|c| *c = -*c);
            self.rho = -self.rho;
        }
    }

    fn decision(&self, kernel: &Kernel, x: ArrayView1<f64>) -> f64 {
        let mut sum = 0.0;
        for (coef, sv) in self.coefficients.iter().zip(&self.support_vectors) {
            sum += coef * kernel.eval(ArrayView1::from(sv.as_slice()), x);
        }
        sum - self.rho
    }

    fn probability(&self, decision: f64) -> f64 {
        sigmoid_tail(decision * self.platt_a + self.platt_b)
    }

    /// `w = Σ(αᵢ·xᵢ)`。線形カーネルでのみ意味を持つ
    fn linear_weights(&self, n_features: usize) -> Vec<f64> {
        let mut w = vec![0.0; n_features];
        for (coef, sv) in self.coefficients.iter().zip(&self.support_vectors) {
            for (wj, xj) in w.iter_mut().zip(sv) {
                *wj += coef * xj;
            }
        }
        w
    }
}

/// 各クラスを `PLATT_FOLDS` 以下の分割に順番に配り、分割ごとに学習し直して
/// 残りの行の判定値を集める。どちらかのクラスが2件未満なら `None`。
fn out_of_fold_decisions(
    x: &Array2<f64>,
    labels: &[bool],
    kernel: Kernel,
    c: f64,
) -> Result<Option<Vec<f64>>> {
    let n_pos = labels.iter().filter(|&&l| l).count();
    let n_neg = labels.len() - n_pos;
    let n_folds = PLATT_FOLDS.min(n_pos).min(n_neg);
    if n_folds < 2 {
        return Ok(None);
    }

    let (mut seen_pos, mut seen_neg) = (0usize, 0usize);
    let fold_of: Vec<usize> = labels
        .iter()
        .map(|&label| {
            let seen = if label { &mut seen_pos } else { &mut seen_neg };
            let fold = *seen % n_folds;
            *seen += 1;
            fold
        })
        .collect();

    let mut decisions = vec![0.0; labels.len()];
    for fold in 0..n_folds {
        // 各クラスが n_folds 件以上あるので学習側は常に両クラスを含む
        let train_idx: Vec<usize> = (0..labels.len()).filter(|&i| fold_of[i] != fold).collect();
        let x_train = x.select(Axis(0), &train_idx);
        let y_train: Vec<bool> = train_idx.iter().map(|&i| labels[i]).collect();
        let machine = BinaryMachine::fit_margin(&x_train, &y_train, kernel, c)?;
        for i in (0..labels.len()).filter(|&i| fold_of[i] == fold) {
            decisions[i] = machine.decision(&kernel, x.row(i));
        }
    }

    Ok(Some(decisions))
}

/// オーバーフローしない `1 / (1 + exp(f))`
fn sigmoid_tail(f: f64) -> f64 {
    if f >= 0.0 {
        (-f).exp() / (1.0 + (-f).exp())
    } else {
        1.0 / (1.0 + f.exp())
    }
}

/// Platt シグモイド `P(y=1|f) = 1 / (1 + exp(A·f + B))` を
/// 平滑化ターゲットとバックトラッキング付きニュートン法で当てはめる
fn fit_platt(decisions: &[f64], labels: &[bool]) -> (f64, f64) {
    const MAX_ITER: usize = 100;
    const MIN_STEP: f64 = 1e-10;
    const SIGMA: f64 = 1e-12;
    const EPS: f64 = 1e-5;

    let prior1 = labels.iter().filter(|&&l| l).count() as f64;
    let prior0 = labels.len() as f64 - prior1;
    let hi = (prior1 + 1.0) / (prior1 + 2.0);
    let lo = 1.0 / (prior0 + 2.0);
    let targets: Vec<f64> = labels.iter().map(|&l| if l { hi } else { lo }).collect();

    let objective = |a: f64, b: f64| -> f64 {
        decisions
            .iter()
            .zip(&targets)
            .map(|(&d, &t)| {
                let f_ab = d * a + b;
                if f_ab >= 0.0 {
                    t * f_ab + (1.0 + (-f_ab).exp()).ln()
                } else {
                    (t - 1.0) * f_ab + (1.0 + f_ab.exp()).ln()
                }
            })
            .sum()
    };

    let mut a = 0.0;
    let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
    let mut fval = objective(a, b);

    for _ in 0..MAX_ITER {
        let (mut h11, mut h22, mut h21) = (SIGMA, SIGMA, 0.0);
        let (mut g1, mut g2) = (0.0, 0.0);
        for (&d, &t) in decisions.iter().zip(&targets) {
            let f_ab = d * a + b;
            let (p, q) = if f_ab >= 0.0 {
                let e = (-f_ab).exp();
                (e / (1.0 + e), 1.0 / (1.0 + e))
            } else {
                let e = f_ab.exp();
                (1.0 / (1.0 + e), e / (1.0 + e))
            };
            let d2 = p * q;
            h11 += d * d * d2;
            h22 += d2;
            h21 += d * d2;
            let d1 = t - p;
            g1 += d * d1;
            g2 += d1;
        }

        if g1.abs() < EPS && g2.abs() < EPS {
            break;
        }

        let det = h11 * h22 - h21 * h21;
        let d_a = -(h22 * g1 - h21 * g2) / det;
        let d_b = -(-h21 * g1 + h11 * g2) / det;
        let gd = g1 * d_a + g2 * d_b;

        let mut step = 1.0;
        while step >= MIN_STEP {
            let new_a = a + step * d_a;
            let new_b = b + step * d_b;
            let new_f = objective(new_a, new_b);
            if new_f < fval + 1e-4 * step * gd {
                a = new_a;
                b = new_b;
                fval = new_f;
                break;
            }
            step /= 2.0;
        }

        if step < MIN_STEP {
            break;
        }
    }

    (a, b)
}

/// `n_classes` 個のエンコード済みラベルに対する one-vs-rest カーネルSVM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmClassifier {
    pub params: SvmParams,
    pub kernel: Kernel,
    pub n_classes: usize,
    pub n_features: usize,
    machines: Vec<BinaryMachine>,
}

impl SvmClassifier {
    /// `0..n_classes` のエンコード済みラベル `y` で `x` に学習する。
    ///
    /// クラスが2未満ならマシンは作らず、常にクラス0を予測する。
    pub fn fit(x: &Array2<f64>, y: &[usize], n_classes: usize, params: SvmParams) -> Result<Self> {
        let kernel = match params.kernel {
            KernelKind::Linear => Kernel::Linear,
            KernelKind::Rbf => Kernel::Rbf {
                gamma: params.gamma.resolve(x),
            },
        };

        let mut machines = Vec::new();
        if n_classes >= 2 {
            for class_idx in 0..n_classes {
                let labels: Vec<bool> = y.iter().map(|&label| label == class_idx).collect();
                machines.push(BinaryMachine::fit(x, &labels, kernel, params.c)?);
            }
        }

        Ok(Self {
            params,
            kernel,
            n_classes,
            n_features: x.ncols(),
            machines,
        })
    }

    /// 各行のクラスごとの判定値
    pub fn decision_function(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((x.nrows(), self.machines.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (k, machine) in self.machines.iter().enumerate() {
                out[[i, k]] = machine.decision(&self.kernel, row);
            }
        }
        out
    }

    /// ハードラベル: 確率が最大のクラス
    pub fn predict(&self, x: &Array2<f64>) -> Vec<usize> {
        if self.machines.is_empty() {
            return vec![0; x.nrows()];
        }
        let proba = self.predict_proba(x);
        proba
            .rows()
            .into_iter()
            .map(|row| argmax(&row.to_vec()))
            .collect()
    }

    /// クラス確率。1サンプル1行で各行の和は1
    pub fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        let k = self.n_classes.max(1);
        let mut out = Array2::zeros((x.nrows(), k));
        if self.machines.is_empty() {
            out.column_mut(0).fill(1.0);
            return out;
        }

        let decisions = self.decision_function(x);
        for i in 0..x.nrows() {
            let mut total = 0.0;
            for (c, machine) in self.machines.iter().enumerate() {
                let p = machine.probability(decisions[[i, c]]);
                out[[i, c]] = p;
                total += p;
            }
            if total > 0.0 && total.is_finite() {
                out.row_mut(i).mapv_inplace(|p| p / total);
            } else {
                out.row_mut(i).fill(1.0 / k as f64);
            }
        }
        out
    }

    /// 特徴量ごとの線形重みの二乗をマシン間で合計したもの。
    ///
    /// マシンがなければすべて0。
    pub fn feature_importance(&self) -> Vec<f64> {
        let mut importance = vec![0.0; self.n_features];
        for machine in &self.machines {
            let w = machine.linear_weights(self.n_features);
            for (imp, wj) in importance.iter_mut().zip(w) {
                *imp += wj * wj;
            }
        }
        importance
    }
}

/// 最初の最大値の添字
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0usize;
    let mut best_val = f64::NEG_INFINITY;
    for (idx, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best = idx;
        }
    }
    best
}

//! 滑らかな凸目的関数の最小化（L-BFGS と truncated Newton-CG）。
//!
//! パラメータは行列のまま扱い、内積は要素積の総和で計算する。
use std::collections::VecDeque;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis, Zip, s};

const ARMIJO_C1: f64 = 1e-4;
const MAX_LINE_SEARCH: usize = 50;
const LBFGS_MEMORY: usize = 10;
const CG_MAX_ITER: usize = 200;
/// L-BFGS の相対減少量による停止閾値。
const RELATIVE_REDUCTION: f64 = 64.0 * f64::EPSILON;

#[derive(Debug, Clone)]
pub(crate) struct Evaluation {
    pub loss: f64,
    pub gradient: Array2<f64>,
}

pub(crate) trait Curvature {
    fn hessian_product(&self, direction: &Array2<f64>) -> Array2<f64>;
}

pub(crate) trait Objective {
    type Curvature: Curvature;

    fn evaluate(&self, params: &Array2<f64>) -> Evaluation;

    /// 勾配とその点でのヘッセ行列作用素を同時に求める。
    fn second_order(&self, params: &Array2<f64>) -> (Evaluation, Self::Curvature);
}

#[derive(Debug, Clone)]
pub(crate) struct Minimum {
    pub params: Array2<f64>,
    pub iterations: usize,
    pub converged: bool,
}

fn inner(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    Zip::from(a).and(b).fold(0.0, |acc, x, y| acc + x * y)
}

fn max_abs(a: &Array2<f64>) -> f64 {
    a.iter().fold(0.0_f64, |acc, value| acc.max(value.abs()))
}

/// Armijo 条件を満たすまでステップを半減する。成功時は新しい点と評価値を返す。
fn backtracking<O: Objective>(
    objective: &O,
    params: &Array2<f64>,
    current: &Evaluation,
    direction: &Array2<f64>,
    initial_step: f64,
) -> Option<(Array2<f64>, Evaluation)> {
    let slope = inner(&current.gradient, direction);
    let mut step = initial_step;
    for _ in 0..MAX_LINE_SEARCH {
        let candidate = params + &(direction * step);
        let evaluation = objective.evaluate(&candidate);
        if evaluation.loss.is_finite() && evaluation.loss <= current.loss + ARMIJO_C1 * step * slope {
            return Some((candidate, evaluation));
        }
        step *= 0.5;
    }
    None
}

/// 記憶長10の L-BFGS。勾配の最大絶対値が `tol` 以下で収束とする。
pub(crate) fn lbfgs<O: Objective>(
    objective: &O,
    initial: Array2<f64>,
    tol: f64,
    max_iter: usize,
) -> Minimum {
    let mut params = initial;
    let mut current = objective.evaluate(&params);
    let mut history: VecDeque<(Array2<f64>, Array2<f64>, f64)> = VecDeque::with_capacity(LBFGS_MEMORY);
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iter {
        if max_abs(&current.gradient) <= tol {
            converged = true;
            break;
        }

        let mut direction = two_loop_direction(&current.gradient, &history);
        if inner(&current.gradient, &direction) >= 0.0 {
            history.clear();
            direction = current.gradient.mapv(|g| -g);
        }
        let initial_step = if history.is_empty() {
            let norm = inner(&direction, &direction).sqrt();
            if norm > 0.0 { (1.0 / norm).min(1.0) } else { 1.0 }
        } else {
            1.0
        };

        let Some((next_params, next)) =
            backtracking(objective, &params, &current, &direction, initial_step)
        else {
            break;
        };
        iterations += 1;

        let step = &next_params - &params;
        let change = &next.gradient - &current.gradient;
        let curvature = inner(&step, &change);
        if curvature > 1e-10 {
            if history.len() == LBFGS_MEMORY {
                history.pop_front();
            }
            history.push_back((step, change, 1.0 / curvature));
        }

        let reduction = (current.loss - next.loss)
            / current.loss.abs().max(next.loss.abs()).max(1.0);
        params = next_params;
        current = next;
        if reduction <= RELATIVE_REDUCTION {
            converged = true;
            break;
        }
    }

    Minimum {
        params,
        iterations,
        converged,
    }
}

fn two_loop_direction(
    gradient: &Array2<f64>,
    history: &VecDeque<(Array2<f64>, Array2<f64>, f64)>,
) -> Array2<f64> {
    let mut q = gradient.clone();
    let mut alphas = Vec::with_capacity(history.len());
    for (s, y, rho) in history.iter().rev() {
        let alpha = rho * inner(s, &q);
        q.scaled_add(-alpha, y);
        alphas.push(alpha);
    }
    if let Some((s, y, _)) = history.back() {
        let gamma = inner(s, y) / inner(y, y);
        q *= gamma;
    }
    for ((s, y, rho), alpha) in history.iter().zip(alphas.into_iter().rev()) {
        let beta = rho * inner(y, &q);
        q.scaled_add(alpha - beta, s);
    }
    q.mapv_inplace(|value| -value);
    q
}

/// truncated Newton 法。内側の共役勾配法は勾配の L1 ノルムに応じた精度で打ち切る。
pub(crate) fn newton_cg<O: Objective>(
    objective: &O,
    initial: Array2<f64>,
    tol: f64,
    max_iter: usize,
) -> Minimum {
    let mut params = initial;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iter {
        let (current, curvature) = objective.second_order(&params);
        if max_abs(&current.gradient) <= tol {
            converged = true;
            break;
        }

        let l1 = current.gradient.iter().map(|g| g.abs()).sum::<f64>();
        let termination = 0.5_f64.min(l1.sqrt()) * l1;
        let direction = conjugate_gradient(&curvature, &current.gradient, termination);

        let Some((next_params, _)) = backtracking(objective, &params, &current, &direction, 1.0)
        else {
            break;
        };
        params = next_params;
        iterations += 1;
    }

    if !converged && iterations < max_iter {
        // 直前の点で最終確認する
        let check = objective.evaluate(&params);
        converged = max_abs(&check.gradient) <= tol;
    }

    Minimum {
        params,
        iterations,
        converged,
    }
}

/// `H d = -g` を近似的に解く。負の曲率に最初の反復で出会った場合は最急降下方向を返す。
fn conjugate_gradient<C: Curvature>(
    curvature: &C,
    gradient: &Array2<f64>,
    termination: f64,
) -> Array2<f64> {
    let mut solution = Array2::<f64>::zeros(gradient.raw_dim());
    let mut residual = gradient.clone();
    let mut search = gradient.mapv(|g| -g);
    let mut residual_norm = inner(&residual, &residual);

    for iteration in 0..=CG_MAX_ITER {
        if residual.iter().map(|r| r.abs()).sum::<f64>() <= termination {
            break;
        }
        let product = curvature.hessian_product(&search);
        let curv = inner(&search, &product);
        if (0.0..=16.0 * f64::EPSILON).contains(&curv) {
            break;
        }
        if curv < 0.0 {
            if iteration == 0 {
                return gradient.mapv(|g| -g);
            }
            break;
        }
        let alpha = residual_norm / curv;
        solution.scaled_add(alpha, &search);
        residual.scaled_add(alpha, &product);
        let next_norm = inner(&residual, &residual);
        let beta = next_norm / residual_norm;
        search = &search * beta - &residual;
        residual_norm = next_norm;
    }

    if solution.iter().all(|value| *value == 0.0) {
        return gradient.mapv(|g| -g);
    }
    solution
}

/// 多項ロジスティック回帰の重み付き平均損失と L2 正則化。
///
/// パラメータは `(クラス数, 特徴量数 + 1)` で、最終列が切片。
/// 目的関数は `(1/S) Σ w_i ℓ_i + 1/(2CS) ‖W‖²`（S は重みの総和、切片は正則化しない）。
pub(crate) struct SoftmaxObjective<'a> {
    features: ArrayView2<'a, f64>,
    targets: &'a [usize],
    sample_weight: Array1<f64>,
    weight_sum: f64,
    l2: f64,
    fit_intercept: bool,
    parallel: bool,
}

impl<'a> SoftmaxObjective<'a> {
    pub(crate) fn new(
        features: ArrayView2<'a, f64>,
        targets: &'a [usize],
        sample_weight: Array1<f64>,
        c: f64,
        fit_intercept: bool,
        parallel: bool,
    ) -> Self {
        let weight_sum = sample_weight.sum();
        Self {
            features,
            targets,
            sample_weight,
            weight_sum,
            l2: 1.0 / (c * weight_sum),
            fit_intercept,
            parallel,
        }
    }

    fn split<'p>(&self, params: &'p Array2<f64>) -> (ArrayView2<'p, f64>, ArrayView1<'p, f64>) {
        let d = self.features.ncols();
        (params.slice(s![.., ..d]), params.column(d))
    }

    fn scores(&self, params: &Array2<f64>) -> Array2<f64> {
        let (coef, intercept) = self.split(params);
        let mut scores = self.features.dot(&coef.t());
        if self.fit_intercept {
            scores += &intercept;
        }
        scores
    }

    fn compute(&self, params: &Array2<f64>) -> (Evaluation, Array2<f64>) {
        let mut probabilities = self.scores(params);
        let target_score: f64 = self
            .targets
            .iter()
            .zip(self.sample_weight.iter())
            .enumerate()
            .map(|(row, (&target, weight))| weight * probabilities[[row, target]])
            .sum();
        let log_norm = softmax_rows(&mut probabilities, self.parallel);
        let weighted_norm: f64 = log_norm
            .iter()
            .zip(self.sample_weight.iter())
            .map(|(norm, weight)| norm * weight)
            .sum();

        let (coef, _) = self.split(params);
        let penalty = 0.5 * self.l2 * coef.iter().map(|w| w * w).sum::<f64>();
        let loss = (weighted_norm - target_score) / self.weight_sum + penalty;

        let mut residual = probabilities.clone();
        for (row, &target) in self.targets.iter().enumerate() {
            residual[[row, target]] -= 1.0;
        }
        residual *= &self.sample_weight.view().insert_axis(Axis(1));

        let gradient = self.assemble(&residual, coef);
        (Evaluation { loss, gradient }, probabilities)
    }

    /// サンプル方向の残差から `(クラス数, 特徴量数 + 1)` の勾配を組み立てる。
    fn assemble(&self, residual: &Array2<f64>, coef: ArrayView2<'_, f64>) -> Array2<f64> {
        let d = self.features.ncols();
        let mut gradient = Array2::<f64>::zeros((residual.ncols(), d + 1));
        let mut coef_part = residual.t().dot(&self.features) / self.weight_sum;
        coef_part.scaled_add(self.l2, &coef);
        gradient.slice_mut(s![.., ..d]).assign(&coef_part);
        if self.fit_intercept {
            let intercept_part = residual.sum_axis(Axis(0)) / self.weight_sum;
            gradient.column_mut(d).assign(&intercept_part);
        }
        gradient
    }
}

impl<'a> Objective for SoftmaxObjective<'a> {
    type Curvature = SoftmaxCurvature<'a>;

    fn evaluate(&self, params: &Array2<f64>) -> Evaluation {
        self.compute(params).0
    }

    fn second_order(&self, params: &Array2<f64>) -> (Evaluation, Self::Curvature) {
        let (evaluation, probabilities) = self.compute(params);
        let curvature = SoftmaxCurvature {
            features: self.features,
            probabilities,
            sample_weight: self.sample_weight.clone(),
            weight_sum: self.weight_sum,
            l2: self.l2,
            fit_intercept: self.fit_intercept,
        };
        (evaluation, curvature)
    }
}

/// ある点での多項ロジスティック損失のヘッセ行列作用素。
pub(crate) struct SoftmaxCurvature<'a> {
    features: ArrayView2<'a, f64>,
    probabilities: Array2<f64>,
    sample_weight: Array1<f64>,
    weight_sum: f64,
    l2: f64,
    fit_intercept: bool,
}

impl Curvature for SoftmaxCurvature<'_> {
    fn hessian_product(&self, direction: &Array2<f64>) -> Array2<f64> {
        let d = self.features.ncols();
        let coef = direction.slice(s![.., ..d]);
        let mut projected = self.features.dot(&coef.t());
        if self.fit_intercept {
            projected += &direction.column(d);
        }

        // r_i = p_i ⊙ u_i − p_i (p_i · u_i)
        let weighted = &self.probabilities * &projected;
        let totals = weighted.sum_axis(Axis(1));
        let mut response = weighted - &self.probabilities * &totals.view().insert_axis(Axis(1));
        response *= &self.sample_weight.view().insert_axis(Axis(1));

        let mut product = Array2::<f64>::zeros(direction.raw_dim());
        let mut coef_part = response.t().dot(&self.features) / self.weight_sum;
        coef_part.scaled_add(self.l2, &coef);
        product.slice_mut(s![.., ..d]).assign(&coef_part);
        if self.fit_intercept {
            let intercept_part = response.sum_axis(Axis(0)) / self.weight_sum;
            product.column_mut(d).assign(&intercept_part);
        }
        product
    }
}

/// 各行をソフトマックス確率に置き換え、行ごとの log-sum-exp を返す。
pub(crate) fn softmax_rows(scores: &mut Array2<f64>, parallel: bool) -> Array1<f64> {
    let mut log_norm = Array1::<f64>::zeros(scores.nrows());
    let zip = Zip::from(scores.rows_mut()).and(&mut log_norm);
    if parallel {
        zip.par_for_each(normalize_row);
    } else {
        zip.for_each(normalize_row);
    }
    log_norm
}

fn normalize_row(mut row: ArrayViewMut1<'_, f64>, log_norm: &mut f64) {
    let max = row.fold(f64::NEG_INFINITY, |acc, value| acc.max(*value));
    let sum: f64 = row.iter().map(|value| (value - max).exp()).sum();
    *log_norm = max + sum.ln();
    row.mapv_inplace(|value| (value - max).exp() / sum);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// 0.5 (x − a)ᵀ D (x − a)
    struct Quadratic {
        center: Array2<f64>,
        scale: Array2<f64>,
    }

    struct Diagonal(Array2<f64>);

    impl Curvature for Diagonal {
        fn hessian_product(&self, direction: &Array2<f64>) -> Array2<f64> {
            &self.0 * direction
        }
    }

    impl Objective for Quadratic {
        type Curvature = Diagonal;

        fn evaluate(&self, params: &Array2<f64>) -> Evaluation {
            let diff = params - &self.center;
            let gradient = &self.scale * &diff;
            Evaluation {
                loss: 0.5 * inner(&diff, &gradient),
                gradient,
            }
        }

        fn second_order(&self, params: &Array2<f64>) -> (Evaluation, Diagonal) {
            (self.evaluate(params), Diagonal(self.scale.clone()))
        }
    }

    fn quadratic() -> Quadratic {
        Quadratic {
            center: array![[1.0, -2.0], [0.5, 3.0]],
            scale: array![[1.0, 10.0], [4.0, 0.5]],
        }
    }

    #[test]
    fn lbfgs_finds_quadratic_minimum() {
        let objective = quadratic();
        let result = lbfgs(&objective, Array2::zeros((2, 2)), 1e-8, 200);
        assert!(result.converged);
        for (found, expected) in result.params.iter().zip(objective.center.iter()) {
            assert!((found - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn newton_cg_finds_quadratic_minimum() {
        let objective = quadratic();
        let result = newton_cg(&objective, Array2::zeros((2, 2)), 1e-8, 50);
        assert!(result.converged);
        for (found, expected) in result.params.iter().zip(objective.center.iter()) {
            assert!((found - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn softmax_rows_are_stable_and_normalized() {
        let mut scores = array![[1000.0, 1000.0], [0.0, 2.0_f64.ln()]];
        let log_norm = softmax_rows(&mut scores, false);
        assert!((scores[[0, 0]] - 0.5).abs() < 1e-12);
        assert!((scores[[1, 1]] - 2.0 / 3.0).abs() < 1e-12);
        assert!((log_norm[1] - 3.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn softmax_gradient_matches_finite_differences() {
        let x = array![[1.0, 0.0], [0.5, 2.0], [0.0, 1.0]];
        let y = [0, 1, 2];
        let objective = SoftmaxObjective::new(x.view(), &y, array![1.0, 2.0, 0.5], 1.0, true, false);
        let params = array![[0.1, -0.2, 0.05], [0.3, 0.0, -0.1], [-0.4, 0.2, 0.0]];
        let analytic = objective.evaluate(&params).gradient;

        let h = 1e-6;
        for ((row, column), expected) in analytic.indexed_iter() {
            let mut plus = params.clone();
            plus[[row, column]] += h;
            let mut minus = params.clone();
            minus[[row, column]] -= h;
            let numeric = (objective.evaluate(&plus).loss - objective.evaluate(&minus).loss) / (2.0 * h);
            assert!((numeric - expected).abs() < 1e-6, "({row}, {column})");
        }
    }

    #[test]
    fn hessian_product_matches_gradient_differences() {
        let x = array![[1.0, 0.0], [0.5, 2.0], [0.0, 1.0], [1.0, 1.0]];
        let y = [0, 1, 2, 1];
        let objective = SoftmaxObjective::new(x.view(), &y, Array1::ones(4), 1.0, true, false);
        let params = array![[0.1, -0.2, 0.05], [0.3, 0.0, -0.1], [-0.4, 0.2, 0.0]];
        let direction = array![[1.0, 0.5, -0.5], [0.0, -1.0, 0.2], [0.3, 0.3, 0.3]];

        let (_, curvature) = objective.second_order(&params);
        let analytic = curvature.hessian_product(&direction);

        let h = 1e-6;
        let plus = objective.evaluate(&(&params + &(&direction * h))).gradient;
        let minus = objective.evaluate(&(&params - &(&direction * h))).gradient;
        let numeric = (plus - minus) / (2.0 * h);
        for (a, n) in analytic.iter().zip(numeric.iter()) {
            assert!((a - n).abs() < 1e-6);
        }
    }
}

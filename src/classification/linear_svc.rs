//! 二乗ヒンジ損失の線形SVM（双対座標降下法）。
//!
//! 2クラスは1問題、3クラス以上は one-vs-rest で解く。
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::model::{
    Classifier, ModelError, check_feature_count, class_positions, validate_training_input,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSvcParams {
    pub c: f64,
    pub tol: f64,
    pub max_iter: usize,
    pub intercept_scaling: f64,
    pub random_state: u64,
}

impl Default for LinearSvcParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            tol: 1e-4,
            max_iter: 1000,
            intercept_scaling: 1.0,
            random_state: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Fitted {
    classes: Vec<usize>,
    /// 問題ごとの重み。2クラスなら1行。
    coef: Array2<f64>,
    intercept: Array1<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearSvc {
    params: LinearSvcParams,
    fitted: Option<Fitted>,
}

impl LinearSvc {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_params(params: LinearSvcParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    #[must_use]
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.params.random_state = seed;
        self
    }

    #[must_use]
    pub fn params(&self) -> &LinearSvcParams {
        &self.params
    }
}

impl Classifier for LinearSvc {
    fn fit(&mut self, features: ArrayView2<'_, f64>, labels: &[usize]) -> Result<(), ModelError> {
        let classes = validate_training_input(features, labels)?;
        let positions = class_positions(&classes, labels);
        let n_problems = if classes.len() == 2 { 1 } else { classes.len() };
        let n_features = features.ncols();

        let mut coef = Array2::zeros((n_problems, n_features));
        let mut intercept = Array1::zeros(n_problems);
        for problem in 0..n_problems {
            // 2クラスでは classes[1] を正例とする
            let positive = if n_problems == 1 { 1 } else { problem };
            let signs: Vec<f64> = positions
                .iter()
                .map(|&p| if p == positive { 1.0 } else { -1.0 })
                .collect();
            let seed = self.params.random_state.wrapping_add(problem as u64);
            let (weights, bias) = solve_dual(features, &signs, &self.params, seed);
            coef.row_mut(problem).assign(&weights);
            intercept[problem] = bias;
        }

        self.fitted = Some(Fitted {
            classes,
            coef,
            intercept,
        });
        Ok(())
    }

    fn decision_function(&self, features: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        check_feature_count(fitted.coef.ncols(), features)?;
        let scores = features.dot(&fitted.coef.t()) + &fitted.intercept;
        if fitted.classes.len() == 2 {
            let stacked = Array2::from_shape_fn((scores.nrows(), 2), |(row, column)| {
                if column == 0 {
                    -scores[[row, 0]]
                } else {
                    scores[[row, 0]]
                }
            });
            Ok(stacked)
        } else {
            Ok(scores)
        }
    }

    fn classes(&self) -> Result<&[usize], ModelError> {
        self.fitted
            .as_ref()
            .map(|f| f.classes.as_slice())
            .ok_or(ModelError::NotFitted)
    }
}

/// L2正則化・二乗ヒンジ損失の双対問題を縮小付き座標降下で解く。
///
/// 切片は値 `intercept_scaling` の追加特徴量として同時に学習する。
/// 上限のない二乗ヒンジ損失なので、縮小は下限側（alpha = 0）だけで行う。
fn solve_dual(
    features: ArrayView2<'_, f64>,
    signs: &[f64],
    params: &LinearSvcParams,
    seed: u64,
) -> (Array1<f64>, f64) {
    let n_samples = features.nrows();
    let n_features = features.ncols();
    let bias_feature = params.intercept_scaling;
    let diag = 0.5 / params.c;

    let mut weights = Array1::<f64>::zeros(n_features);
    let mut bias_weight = 0.0;
    let mut alpha = vec![0.0_f64; n_samples];
    let q_diag: Vec<f64> = features
        .rows()
        .into_iter()
        .map(|row| diag + row.dot(&row) + bias_feature * bias_feature)
        .collect();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut index: Vec<usize> = (0..n_samples).collect();
    let mut active_size = n_samples;
    let mut pg_max_old = f64::INFINITY;
    let mut iteration = 0;

    while iteration < params.max_iter {
        let mut pg_max_new = f64::NEG_INFINITY;
        let mut pg_min_new = f64::INFINITY;
        index[..active_size].shuffle(&mut rng);

        let mut s = 0;
        while s < active_size {
            let i = index[s];
            let row: ArrayView1<'_, f64> = features.row(i);
            let y = signs[i];
            let gradient = y * (weights.dot(&row) + bias_weight * bias_feature) - 1.0 + alpha[i] * diag;

            let projected = if alpha[i] == 0.0 {
                if gradient > pg_max_old {
                    active_size -= 1;
                    index.swap(s, active_size);
                    continue;
                }
                gradient.min(0.0)
            } else {
                gradient
            };

            pg_max_new = pg_max_new.max(projected);
            pg_min_new = pg_min_new.min(projected);

            if projected.abs() > 1e-12 {
                let previous = alpha[i];
                alpha[i] = (alpha[i] - gradient / q_diag[i]).max(0.0);
                let step = (alpha[i] - previous) * y;
                weights.scaled_add(step, &row);
                bias_weight += step * bias_feature;
            }
            s += 1;
        }

        iteration += 1;
        if pg_max_new - pg_min_new <= params.tol {
            if active_size == n_samples {
                break;
            }
            active_size = n_samples;
            pg_max_old = f64::INFINITY;
            continue;
        }
        pg_max_old = if pg_max_new <= 0.0 {
            f64::INFINITY
        } else {
            pg_max_new
        };
    }

    if iteration >= params.max_iter {
        warn!(
            max_iter = params.max_iter,
            "linear SVM dual solver did not converge; consider increasing max_iter"
        );
    }

    (weights, bias_weight * bias_feature)
}

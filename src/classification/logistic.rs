//! 多項ロジスティック回帰（L2 正則化、ソフトマックス）。
use ndarray::{Array1, Array2, ArrayView2, s};
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::model::{
    Classifier, ModelError, check_feature_count, class_positions, validate_training_input,
};
use super::optim::{Minimum, SoftmaxObjective, lbfgs, newton_cg, softmax_rows};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Solver {
    Lbfgs,
    NewtonCg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassWeight {
    Uniform,
    /// `n_samples / (n_classes * count_c)`
    Balanced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticParams {
    pub c: f64,
    pub tol: f64,
    pub max_iter: usize,
    pub solver: Solver,
    pub class_weight: ClassWeight,
    pub fit_intercept: bool,
    /// `None` は1スレッド、負値は「全CPU + 1 + n」。
    pub n_jobs: Option<i32>,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            tol: 1e-4,
            max_iter: 100,
            solver: Solver::Lbfgs,
            class_weight: ClassWeight::Uniform,
            fit_intercept: true,
            n_jobs: None,
        }
    }
}

impl LogisticParams {
    /// エクスポートするパイプラインの最終段。
    #[must_use]
    pub fn export_default() -> Self {
        Self {
            solver: Solver::NewtonCg,
            class_weight: ClassWeight::Balanced,
            n_jobs: Some(-1),
            ..Self::default()
        }
    }
}

/// `n_jobs` をワーカー数に解決する。
#[must_use]
pub fn resolve_n_jobs(n_jobs: Option<i32>) -> usize {
    let cpus = num_cpus::get();
    match n_jobs {
        None | Some(0) => 1,
        Some(n) if n > 0 => n as usize,
        Some(n) => {
            let resolved = cpus as i64 + 1 + i64::from(n);
            resolved.max(1) as usize
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Fitted {
    classes: Vec<usize>,
    coef: Array2<f64>,
    intercept: Array1<f64>,
    n_iter: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    params: LogisticParams,
    fitted: Option<Fitted>,
}

impl LogisticRegression {
    #[must_use]
    pub fn new(params: LogisticParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    #[must_use]
    pub fn params(&self) -> &LogisticParams {
        &self.params
    }

    /// `(クラス数, 特徴量数)` の係数。
    ///
    /// # Errors
    /// 未学習の場合は [`ModelError::NotFitted`] を返す。
    pub fn coef(&self) -> Result<&Array2<f64>, ModelError> {
        self.fitted
            .as_ref()
            .map(|f| &f.coef)
            .ok_or(ModelError::NotFitted)
    }

    /// # Errors
    /// 未学習の場合は [`ModelError::NotFitted`] を返す。
    pub fn intercept(&self) -> Result<&Array1<f64>, ModelError> {
        self.fitted
            .as_ref()
            .map(|f| &f.intercept)
            .ok_or(ModelError::NotFitted)
    }

    /// # Errors
    /// 未学習の場合は [`ModelError::NotFitted`] を返す。
    pub fn n_iter(&self) -> Result<usize, ModelError> {
        self.fitted
            .as_ref()
            .map(|f| f.n_iter)
            .ok_or(ModelError::NotFitted)
    }

    /// クラスごとの確率。列は [`Classifier::classes`] の順。
    ///
    /// # Errors
    /// 未学習、または特徴量数が学習時と異なる場合はエラーを返す。
    pub fn predict_proba(&self, features: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        let mut scores = self.decision_function(features)?;
        softmax_rows(&mut scores, false);
        Ok(scores)
    }

    fn sample_weight(&self, positions: &[usize], n_classes: usize) -> Array1<f64> {
        match self.params.class_weight {
            ClassWeight::Uniform => Array1::ones(positions.len()),
            ClassWeight::Balanced => {
                let mut counts = vec![0usize; n_classes];
                for &p in positions {
                    counts[p] += 1;
                }
                let n_samples = positions.len() as f64;
                let weights: Vec<f64> = counts
                    .iter()
                    .map(|&count| n_samples / (n_classes as f64 * count as f64))
                    .collect();
                positions.iter().map(|&p| weights[p]).collect()
            }
        }
    }

    fn minimize(&self, objective: &SoftmaxObjective<'_>, initial: Array2<f64>) -> Minimum {
        match self.params.solver {
            Solver::Lbfgs => lbfgs(objective, initial, self.params.tol, self.params.max_iter),
            Solver::NewtonCg => newton_cg(objective, initial, self.params.tol, self.params.max_iter),
        }
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, features: ArrayView2<'_, f64>, labels: &[usize]) -> Result<(), ModelError> {
        let classes = validate_training_input(features, labels)?;
        let positions = class_positions(&classes, labels);
        let n_classes = classes.len();
        let n_features = features.ncols();
        let sample_weight = self.sample_weight(&positions, n_classes);
        let workers = resolve_n_jobs(self.params.n_jobs);
        let initial = Array2::zeros((n_classes, n_features + 1));

        let minimum = if workers > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|error| ModelError::ThreadPool(error.to_string()))?;
            let objective = SoftmaxObjective::new(
                features.view(),
                &positions,
                sample_weight,
                self.params.c,
                self.params.fit_intercept,
                true,
            );
            pool.install(|| self.minimize(&objective, initial))
        } else {
            let objective = SoftmaxObjective::new(
                features.view(),
                &positions,
                sample_weight,
                self.params.c,
                self.params.fit_intercept,
                false,
            );
            self.minimize(&objective, initial)
        };

        if minimum.converged {
            debug!(
                solver = ?self.params.solver,
                iterations = minimum.iterations,
                workers,
                "logistic regression converged"
            );
        } else {
            warn!(
                solver = ?self.params.solver,
                iterations = minimum.iterations,
                max_iter = self.params.max_iter,
                "logistic regression did not converge; increase max_iter or scale the data"
            );
        }

        let coef = minimum.params.slice(s![.., ..n_features]).to_owned();
        let intercept = minimum.params.column(n_features).to_owned();
        self.fitted = Some(Fitted {
            classes,
            coef,
            intercept,
            n_iter: minimum.iterations,
        });
        Ok(())
    }

    fn decision_function(&self, features: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        check_feature_count(fitted.coef.ncols(), features)?;
        Ok(features.dot(&fitted.coef.t()) + &fitted.intercept)
    }

    fn classes(&self) -> Result<&[usize], ModelError> {
        self.fitted
            .as_ref()
            .map(|f| f.classes.as_slice())
            .ok_or(ModelError::NotFitted)
    }
}

//! 多項ナイーブベイズ。
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::model::{
    Classifier, ModelError, check_feature_count, class_positions, validate_training_input,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultinomialNb {
    /// 加法スムージング。
    alpha: f64,
    fit_prior: bool,
    fitted: Option<Fitted>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Fitted {
    classes: Vec<usize>,
    class_log_prior: Array1<f64>,
    feature_log_prob: Array2<f64>,
}

impl Default for MultinomialNb {
    fn default() -> Self {
        Self::new(1.0, true)
    }
}

impl MultinomialNb {
    #[must_use]
    pub fn new(alpha: f64, fit_prior: bool) -> Self {
        Self {
            alpha,
            fit_prior,
            fitted: None,
        }
    }

    /// クラス別の対数同時尤度。
    fn joint_log_likelihood(&self, features: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        check_feature_count(fitted.feature_log_prob.ncols(), features)?;
        Ok(features.dot(&fitted.feature_log_prob.t()) + &fitted.class_log_prior)
    }
}

impl Classifier for MultinomialNb {
    fn fit(&mut self, features: ArrayView2<'_, f64>, labels: &[usize]) -> Result<(), ModelError> {
        let classes = validate_training_input(features, labels)?;
        if features.iter().any(|value| *value < 0.0) {
            return Err(ModelError::NegativeFeatures {
                model: "MultinomialNB",
            });
        }
        let positions = class_positions(&classes, labels);
        let n_classes = classes.len();

        let mut feature_count = Array2::<f64>::zeros((n_classes, features.ncols()));
        let mut class_count = Array1::<f64>::zeros(n_classes);
        for (row, &class) in features.axis_iter(Axis(0)).zip(&positions) {
            let mut target = feature_count.row_mut(class);
            target += &row;
            class_count[class] += 1.0;
        }

        let smoothed = feature_count.mapv(|count| count + self.alpha);
        let totals = smoothed.sum_axis(Axis(1));
        let mut feature_log_prob = smoothed.mapv(f64::ln);
        for (mut row, total) in feature_log_prob.axis_iter_mut(Axis(0)).zip(totals.iter()) {
            let log_total = total.ln();
            row.mapv_inplace(|value| value - log_total);
        }

        let class_log_prior = if self.fit_prior {
            let n_samples = labels.len() as f64;
            class_count.mapv(|count| count.ln() - n_samples.ln())
        } else {
            Array1::from_elem(n_classes, -(n_classes as f64).ln())
        };

        self.fitted = Some(Fitted {
            classes,
            class_log_prior,
            feature_log_prob,
        });
        Ok(())
    }

    fn decision_function(&self, features: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        self.joint_log_likelihood(features)
    }

    fn classes(&self) -> Result<&[usize], ModelError> {
        self.fitted
            .as_ref()
            .map(|f| f.classes.as_slice())
            .ok_or(ModelError::NotFitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn log_probabilities_follow_laplace_smoothing() {
        let x = array![[2.0, 0.0], [1.0, 1.0], [0.0, 3.0]];
        let y = [0, 0, 1];
        let mut nb = MultinomialNb::default();
        nb.fit(x.view(), &y).expect("fit");

        let fitted = nb.fitted.as_ref().expect("fitted");
        // クラス0: counts [3, 1] + 1 → [4, 2] / 6
        assert!((fitted.feature_log_prob[[0, 0]] - (4.0_f64 / 6.0).ln()).abs() < 1e-12);
        assert!((fitted.feature_log_prob[[1, 1]] - (4.0_f64 / 5.0).ln()).abs() < 1e-12);
        assert!((fitted.class_log_prior[0] - (2.0_f64 / 3.0).ln()).abs() < 1e-12);

        assert_eq!(nb.predict(x.view()).expect("predict"), vec![0, 0, 1]);
    }

    #[test]
    fn negative_features_are_rejected() {
        let x = array![[1.0, -0.5], [0.0, 1.0]];
        let mut nb = MultinomialNb::default();
        assert_eq!(
            nb.fit(x.view(), &[0, 1]).expect_err("negative"),
            ModelError::NegativeFeatures {
                model: "MultinomialNB"
            }
        );
    }
}

//! 分類器の共通インターフェースと比較対象モデルの定義。
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{linear_svc::LinearSvc, logistic::LogisticRegression, naive_bayes::MultinomialNb};

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("training data must contain at least 2 classes, found {found}")]
    TooFewClasses { found: usize },
    #[error("feature matrix has {rows} rows but {labels} labels were given")]
    ShapeMismatch { rows: usize, labels: usize },
    #[error("cannot fit a model on zero samples")]
    EmptyInput,
    #[error("{model} requires non-negative feature values")]
    NegativeFeatures { model: &'static str },
    #[error("model was fitted on {expected} features but received {found}")]
    FeatureCountMismatch { expected: usize, found: usize },
    #[error("model has not been fitted")]
    NotFitted,
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

/// 学習・推論の共通インターフェース。ラベルはカテゴリ番号で受け渡す。
pub trait Classifier: Send + Sync {
    /// # Errors
    /// 入力形状の不一致やクラス数不足の場合はエラーを返す。
    fn fit(&mut self, features: ArrayView2<'_, f64>, labels: &[usize]) -> Result<(), ModelError>;

    /// 各サンプル・各学習済みクラスのスコア。列は [`Classifier::classes`] の順。
    ///
    /// # Errors
    /// 未学習、または特徴量数が学習時と異なる場合はエラーを返す。
    fn decision_function(&self, features: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError>;

    /// 学習時に現れたクラス（昇順）。
    ///
    /// # Errors
    /// 未学習の場合は [`ModelError::NotFitted`] を返す。
    fn classes(&self) -> Result<&[usize], ModelError>;

    /// # Errors
    /// [`Classifier::decision_function`] と同じ条件でエラーを返す。
    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Vec<usize>, ModelError> {
        let scores = self.decision_function(features)?;
        let classes = self.classes()?;
        Ok(scores
            .rows()
            .into_iter()
            .map(|row| classes[argmax(row)])
            .collect())
    }
}

/// 交差検証で比較するモデル。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelSpec {
    LinearSvc,
    LogisticRegression,
    MultinomialNb,
}

impl ModelSpec {
    /// 比較の実行順。
    #[must_use]
    pub fn comparison_suite() -> [Self; 3] {
        [Self::LinearSvc, Self::LogisticRegression, Self::MultinomialNb]
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::LinearSvc => "LinearSVC",
            Self::LogisticRegression => "LogisticRegression",
            Self::MultinomialNb => "MultinomialNB",
        }
    }

    /// 既定ハイパーパラメータで未学習のモデルを作る。
    #[must_use]
    pub fn build(self, random_seed: u64) -> Box<dyn Classifier> {
        match self {
            Self::LinearSvc => Box::new(LinearSvc::new().with_random_state(random_seed)),
            Self::LogisticRegression => Box::new(LogisticRegression::default()),
            Self::MultinomialNb => Box::new(MultinomialNb::default()),
        }
    }
}

/// 最大値の位置。同値なら先頭。
pub(crate) fn argmax(row: ArrayView1<'_, f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (index, value) in row.iter().enumerate() {
        if *value > best_value || index == 0 {
            best = index;
            best_value = *value;
        }
    }
    best
}

/// 入力形状を検証し、出現したクラスを昇順で返す。
pub(crate) fn validate_training_input(
    features: ArrayView2<'_, f64>,
    labels: &[usize],
) -> Result<Vec<usize>, ModelError> {
    if features.nrows() != labels.len() {
        return Err(ModelError::ShapeMismatch {
            rows: features.nrows(),
            labels: labels.len(),
        });
    }
    if labels.is_empty() {
        return Err(ModelError::EmptyInput);
    }
    let mut classes = labels.to_vec();
    classes.sort_unstable();
    classes.dedup();
    if classes.len() < 2 {
        return Err(ModelError::TooFewClasses {
            found: classes.len(),
        });
    }
    Ok(classes)
}

/// ラベルを `classes` 内の位置に変換する。
pub(crate) fn class_positions(classes: &[usize], labels: &[usize]) -> Vec<usize> {
    labels
        .iter()
        .map(|label| classes.binary_search(label).unwrap_or_default())
        .collect()
}

pub(crate) fn check_feature_count(expected: usize, features: ArrayView2<'_, f64>) -> Result<(), ModelError> {
    if features.ncols() == expected {
        Ok(())
    } else {
        Err(ModelError::FeatureCountMismatch {
            expected,
            found: features.ncols(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn suite_order_and_names_are_stable() {
        let names: Vec<_> = ModelSpec::comparison_suite()
            .iter()
            .map(|spec| spec.name())
            .collect();
        assert_eq!(names, vec!["LinearSVC", "LogisticRegression", "MultinomialNB"]);
    }

    #[test]
    fn argmax_prefers_first_maximum() {
        let row = array![0.1, 0.7, 0.7, -1.0];
        assert_eq!(argmax(row.view()), 1);
    }

    #[test]
    fn training_input_requires_two_classes() {
        let x = array![[1.0], [2.0]];
        assert_eq!(
            validate_training_input(x.view(), &[3, 3]).expect_err("one class"),
            ModelError::TooFewClasses { found: 1 }
        );
        assert_eq!(
            validate_training_input(x.view(), &[0]).expect_err("shape"),
            ModelError::ShapeMismatch { rows: 2, labels: 1 }
        );
        assert_eq!(
            validate_training_input(x.view(), &[4, 1]).expect("valid"),
            vec![1, 4]
        );
    }

    #[test]
    fn every_model_in_the_suite_separates_simple_data() {
        let x = array![
            [3.0, 0.0, 0.0],
            [2.0, 0.5, 0.0],
            [0.0, 3.0, 0.0],
            [0.5, 2.0, 0.0],
            [0.0, 0.0, 3.0],
            [0.0, 0.5, 2.0]
        ];
        let y = [0, 0, 1, 1, 2, 2];
        for spec in ModelSpec::comparison_suite() {
            let mut model = spec.build(0);
            model.fit(x.view(), &y).expect("fit");
            assert_eq!(model.predict(x.view()).expect("predict"), y.to_vec(), "{}", spec.name());
        }
    }
}

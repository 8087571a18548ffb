//! 層化 k 分割交差検証によるモデル比較。
use ndarray::{ArrayView2, Axis};
use serde::Serialize;
use tracing::{debug, info};

use super::{EvaluationError, metrics::accuracy, split::StratifiedKFold};
use crate::classification::{Classifier, ModelSpec};

/// 1モデル・1分割分の正解率。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CvEntry {
    pub model_name: String,
    pub fold_idx: usize,
    pub accuracy: f64,
}

/// 分割ごとに新しいモデルを学習し、評価側の正解率を返す。
///
/// # Errors
/// 分割の作成、学習、予測のいずれかに失敗した場合はエラーを返す。
pub fn cross_val_score<F>(
    build: F,
    features: ArrayView2<'_, f64>,
    labels: &[usize],
    n_splits: usize,
) -> Result<Vec<f64>, EvaluationError>
where
    F: Fn() -> Box<dyn Classifier>,
{
    let kfold = StratifiedKFold::new(n_splits)?;
    let mut scores = Vec::with_capacity(n_splits);
    for (fold, (train, test)) in kfold.split(labels)?.into_iter().enumerate() {
        let x_train = features.select(Axis(0), &train);
        let y_train: Vec<usize> = train.iter().map(|&index| labels[index]).collect();
        let x_test = features.select(Axis(0), &test);
        let y_test: Vec<usize> = test.iter().map(|&index| labels[index]).collect();

        let mut model = build();
        model.fit(x_train.view(), &y_train)?;
        let predicted = model.predict(x_test.view())?;
        let score = accuracy(&y_test, &predicted)?;
        debug!(fold, train = train.len(), test = test.len(), accuracy = score, "fold evaluated");
        scores.push(score);
    }
    Ok(scores)
}

/// 各モデルを同じ分割で交差検証し、結果表を返す。
///
/// # Errors
/// いずれかのモデルの交差検証に失敗した場合はエラーを返す。
pub fn compare_models(
    specs: &[ModelSpec],
    features: ArrayView2<'_, f64>,
    labels: &[usize],
    n_splits: usize,
    random_seed: u64,
) -> Result<Vec<CvEntry>, EvaluationError> {
    let mut entries = Vec::with_capacity(specs.len() * n_splits);
    for &spec in specs {
        let scores = cross_val_score(|| spec.build(random_seed), features, labels, n_splits)?;
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        info!(model = spec.name(), mean_accuracy = mean, folds = scores.len(), "cross-validation finished");
        entries.extend(scores.into_iter().enumerate().map(|(fold_idx, accuracy)| CvEntry {
            model_name: spec.name().to_string(),
            fold_idx,
            accuracy,
        }));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn blobs() -> (Array2<f64>, Vec<usize>) {
        let n = 30;
        let x = Array2::from_shape_fn((n, 3), |(row, column)| {
            let class = row % 3;
            if column == class {
                2.0 + (row as f64 * 0.37).sin().abs()
            } else {
                0.1 * ((row + column) % 4) as f64
            }
        });
        let y = (0..n).map(|row| row % 3).collect();
        (x, y)
    }

    #[test]
    fn each_model_yields_one_score_per_fold() {
        let (x, y) = blobs();
        let entries =
            compare_models(&ModelSpec::comparison_suite(), x.view(), &y, 5, 0).expect("compare");

        assert_eq!(entries.len(), 15);
        for spec in ModelSpec::comparison_suite() {
            let folds: Vec<_> = entries
                .iter()
                .filter(|entry| entry.model_name == spec.name())
                .map(|entry| entry.fold_idx)
                .collect();
            assert_eq!(folds, vec![0, 1, 2, 3, 4]);
        }
        assert!(entries.iter().all(|entry| (0.0..=1.0).contains(&entry.accuracy)));
    }

    #[test]
    fn separable_data_scores_perfectly() {
        let (x, y) = blobs();
        let scores = cross_val_score(|| ModelSpec::MultinomialNb.build(0), x.view(), &y, 5)
            .expect("cv");
        assert_eq!(scores, vec![1.0; 5]);
    }
}

use ndarray::{Array2, Axis};
use serde::Serialize;
use tracing::warn;

use super::EvaluationError;

/// 正解率（一致数 / 総数）。
///
/// # Errors
/// 長さが異なる場合や空の場合はエラーを返す。
pub fn accuracy(truth: &[usize], predicted: &[usize]) -> Result<f64, EvaluationError> {
    if truth.len() != predicted.len() {
        return Err(EvaluationError::LengthMismatch {
            truth: truth.len(),
            predicted: predicted.len(),
        });
    }
    if truth.is_empty() {
        return Err(EvaluationError::Empty);
    }
    let correct = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
    Ok(correct as f64 / truth.len() as f64)
}

/// 行 = 正解、列 = 予測 の混同行列。カテゴリ集合全体で添字付けする。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    counts: Array2<u64>,
}

impl ConfusionMatrix {
    /// # Errors
    /// 長さの不一致、またはカテゴリ数以上のラベルがある場合はエラーを返す。
    pub fn from_labels(
        truth: &[usize],
        predicted: &[usize],
        n_categories: usize,
    ) -> Result<Self, EvaluationError> {
        let mut calculator = MetricsCalculator::new(n_categories);
        if truth.len() != predicted.len() {
            return Err(EvaluationError::LengthMismatch {
                truth: truth.len(),
                predicted: predicted.len(),
            });
        }
        for (&expected, &actual) in truth.iter().zip(predicted) {
            calculator.push(expected, actual)?;
        }
        Ok(calculator.into_confusion())
    }

    #[must_use]
    pub fn n_categories(&self) -> usize {
        self.counts.nrows()
    }

    #[must_use]
    pub fn counts(&self) -> &Array2<u64> {
        &self.counts
    }

    #[must_use]
    pub fn get(&self, truth: usize, predicted: usize) -> u64 {
        self.counts.get((truth, predicted)).copied().unwrap_or_default()
    }

    /// カテゴリごとの評価側件数（行和）。
    #[must_use]
    pub fn support(&self) -> Vec<u64> {
        self.counts.sum_axis(Axis(1)).to_vec()
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.sum()
    }

    #[must_use]
    pub fn correct(&self) -> u64 {
        self.counts.diag().sum()
    }

    /// 各行を合計100のパーセントに正規化する。件数0の行は `None`。
    #[must_use]
    pub fn normalized(&self) -> NormalizedConfusion {
        let rows = self
            .counts
            .rows()
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                let support = row.sum();
                if support == 0 {
                    warn!(category = index, "category has no held-out support; row left undefined");
                    None
                } else {
                    Some(row.iter().map(|&count| count as f64 / support as f64 * 100.0).collect())
                }
            })
            .collect();
        NormalizedConfusion { rows }
    }
}

/// 行ごとのパーセント表示の混同行列。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedConfusion {
    pub rows: Vec<Option<Vec<f64>>>,
}

impl NormalizedConfusion {
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        self.rows.get(index).and_then(|row| row.as_deref())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// 分類メトリクス。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClassificationMetrics {
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    pub weighted_f1: f64,
    pub accuracy: f64,
}

/// 正解・予測の組を逐次登録して混同行列とメトリクスを集計する。
#[derive(Debug, Clone)]
pub struct MetricsCalculator {
    counts: Array2<u64>,
}

impl MetricsCalculator {
    #[must_use]
    pub fn new(n_categories: usize) -> Self {
        Self {
            counts: Array2::zeros((n_categories, n_categories)),
        }
    }

    /// # Errors
    /// カテゴリ数以上のラベルはエラー。
    pub fn push(&mut self, expected: usize, predicted: usize) -> Result<(), EvaluationError> {
        let categories = self.counts.nrows();
        for label in [expected, predicted] {
            if label >= categories {
                return Err(EvaluationError::UnknownLabel { label, categories });
            }
        }
        self.counts[[expected, predicted]] += 1;
        Ok(())
    }

    #[must_use]
    pub fn into_confusion(self) -> ConfusionMatrix {
        ConfusionMatrix {
            counts: self.counts,
        }
    }

    /// 正解か予測に一度でも現れたカテゴリだけでマクロ平均を取る。
    #[must_use]
    pub fn finalize(&self) -> ClassificationMetrics {
        let total: u64 = self.counts.sum();
        if total == 0 {
            return ClassificationMetrics::default();
        }

        let mut precision_sum = 0.0;
        let mut recall_sum = 0.0;
        let mut f1_sum = 0.0;
        let mut weighted_f1_sum = 0.0;
        let mut counted_labels = 0.0;

        for label in 0..self.counts.nrows() {
            let true_positive = self.counts[[label, label]] as f64;
            let support = self.counts.row(label).sum() as f64;
            let predicted = self.counts.column(label).sum() as f64;
            if support == 0.0 && predicted == 0.0 {
                continue;
            }

            let precision = if predicted > 0.0 { true_positive / predicted } else { 0.0 };
            let recall = if support > 0.0 { true_positive / support } else { 0.0 };
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            precision_sum += precision;
            recall_sum += recall;
            f1_sum += f1;
            weighted_f1_sum += f1 * support;
            counted_labels += 1.0;
        }

        let total = total as f64;
        ClassificationMetrics {
            macro_precision: precision_sum / counted_labels,
            macro_recall: recall_sum / counted_labels,
            macro_f1: f1_sum / counted_labels,
            weighted_f1: weighted_f1_sum / total,
            accuracy: self.counts.diag().sum() as f64 / total,
        }
    }
}

impl From<&ConfusionMatrix> for ClassificationMetrics {
    fn from(confusion: &ConfusionMatrix) -> Self {
        MetricsCalculator {
            counts: confusion.counts.clone(),
        }
        .finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_is_exact_fraction() {
        let value = accuracy(&[0, 1, 2, 1, 0, 2, 2], &[0, 1, 1, 1, 2, 2, 2]).expect("accuracy");
        assert_eq!(value, 5.0 / 7.0);
        assert!(matches!(
            accuracy(&[0], &[0, 1]),
            Err(EvaluationError::LengthMismatch { .. })
        ));
        assert_eq!(accuracy(&[], &[]).expect_err("empty"), EvaluationError::Empty);
    }

    #[test]
    fn confusion_rows_sum_to_support() {
        let truth = [0, 0, 1, 1, 1, 2];
        let predicted = [0, 1, 1, 1, 0, 2];
        let confusion = ConfusionMatrix::from_labels(&truth, &predicted, 4).expect("confusion");

        assert_eq!(confusion.n_categories(), 4);
        assert_eq!(confusion.support(), vec![2, 3, 1, 0]);
        assert_eq!(confusion.get(1, 0), 1);
        assert_eq!(confusion.total(), 6);
        assert_eq!(confusion.correct(), 4);
        assert_eq!(confusion.counts().row(2).sum(), 1);
    }

    #[test]
    fn normalized_rows_sum_to_one_hundred() {
        let truth = [0, 0, 0, 1, 1, 2];
        let predicted = [0, 1, 2, 1, 1, 0];
        let confusion = ConfusionMatrix::from_labels(&truth, &predicted, 4).expect("confusion");
        let normalized = confusion.normalized();

        for index in 0..3 {
            let row = normalized.row(index).expect("supported row");
            assert!((row.iter().sum::<f64>() - 100.0).abs() < 1e-9);
        }
        assert!(normalized.row(3).is_none());
        assert_eq!(normalized.len(), 4);
    }

    #[test]
    fn unknown_labels_are_rejected() {
        assert_eq!(
            ConfusionMatrix::from_labels(&[0, 3], &[0, 0], 2).expect_err("label"),
            EvaluationError::UnknownLabel {
                label: 3,
                categories: 2
            }
        );
    }

    #[test]
    fn test_metrics_calculation() {
        let mut calculator = MetricsCalculator::new(5);
        // A=0, B=1, C=2, D=3
        calculator.push(0, 0).expect("push");
        calculator.push(1, 2).expect("push");
        calculator.push(2, 3).expect("push");

        let metrics = calculator.finalize();

        assert!((metrics.accuracy - 1.0 / 3.0).abs() < 1e-12);
        // A: F1=1、B, C, D: F1=0
        assert!((metrics.macro_f1 - 0.25).abs() < 1e-12);
        // 重み: A=1, B=1, C=1, D=0
        assert!((metrics.weighted_f1 - 1.0 / 3.0).abs() < 1e-12);
    }
}

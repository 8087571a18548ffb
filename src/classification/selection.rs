//! chi2 統計量による特徴選択。
use std::cmp::Ordering;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq)]
pub enum SelectionError {
    #[error("chi2 requires non-negative feature values")]
    NegativeValues,
    #[error("feature matrix has {rows} rows but {labels} labels were given")]
    ShapeMismatch { rows: usize, labels: usize },
    #[error("feature selection requires at least one sample")]
    EmptyInput,
    #[error("selector was fitted on {expected} features but received {found}")]
    FeatureCountMismatch { expected: usize, found: usize },
    #[error("selector has not been fitted")]
    NotFitted,
}

/// 各特徴量とクラス所属の chi2 統計量を計算する。
///
/// クラスは `labels` に現れたものだけを対象にする。期待度数が0の特徴量は NaN になる。
///
/// # Errors
/// 負の値を含む場合や、行数とラベル数が一致しない場合はエラーを返す。
pub fn chi2(features: ArrayView2<'_, f64>, labels: &[usize]) -> Result<Array1<f64>, SelectionError> {
    let (n_samples, n_features) = features.dim();
    if n_samples != labels.len() {
        return Err(SelectionError::ShapeMismatch {
            rows: n_samples,
            labels: labels.len(),
        });
    }
    if n_samples == 0 {
        return Err(SelectionError::EmptyInput);
    }
    if features.iter().any(|value| *value < 0.0) {
        return Err(SelectionError::NegativeValues);
    }

    let mut present: Vec<usize> = labels.to_vec();
    present.sort_unstable();
    present.dedup();

    let mut observed = Array2::<f64>::zeros((present.len(), n_features));
    let mut class_count = vec![0.0_f64; present.len()];
    for (row, label) in features.axis_iter(Axis(0)).zip(labels) {
        // present は labels から作っているので必ず見つかる
        let Ok(class) = present.binary_search(label) else {
            continue;
        };
        class_count[class] += 1.0;
        let mut target = observed.row_mut(class);
        target += &row;
    }

    let feature_sum = features.sum_axis(Axis(0));
    let mut scores = Array1::<f64>::zeros(n_features);
    for (class, count) in class_count.iter().enumerate() {
        let class_prob = count / n_samples as f64;
        for ((score, obs), total) in scores
            .iter_mut()
            .zip(observed.row(class).iter())
            .zip(feature_sum.iter())
        {
            let expected = class_prob * total;
            let diff = obs - expected;
            *score += diff * diff / expected;
        }
    }
    Ok(scores)
}

/// chi2 スコア上位 k 個の特徴量を残すセレクタ。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectKBest {
    k: usize,
    fitted: Option<Selection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Selection {
    n_features_in: usize,
    scores: Array1<f64>,
    selected: Vec<usize>,
}

impl SelectKBest {
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self { k, fitted: None }
    }

    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// # Errors
    /// chi2 の計算に失敗した場合はエラーを返す。
    pub fn fit(&mut self, features: ArrayView2<'_, f64>, labels: &[usize]) -> Result<(), SelectionError> {
        let scores = chi2(features, labels)?;
        let n_features = scores.len();
        if self.k > n_features {
            warn!(
                k = self.k,
                n_features, "k is greater than the number of features; all features are kept"
            );
        }
        let selected = top_k_indices(&scores, self.k);
        self.fitted = Some(Selection {
            n_features_in: n_features,
            scores,
            selected,
        });
        Ok(())
    }

    /// 選択済みの列だけを取り出す。
    ///
    /// # Errors
    /// 未学習、または列数が学習時と異なる場合はエラーを返す。
    pub fn transform(&self, features: ArrayView2<'_, f64>) -> Result<Array2<f64>, SelectionError> {
        let selection = self.fitted.as_ref().ok_or(SelectionError::NotFitted)?;
        if features.ncols() != selection.n_features_in {
            return Err(SelectionError::FeatureCountMismatch {
                expected: selection.n_features_in,
                found: features.ncols(),
            });
        }
        Ok(features.select(Axis(1), &selection.selected))
    }

    /// # Errors
    /// [`SelectKBest::fit`] と [`SelectKBest::transform`] のエラーをそのまま返す。
    pub fn fit_transform(
        &mut self,
        features: ArrayView2<'_, f64>,
        labels: &[usize],
    ) -> Result<Array2<f64>, SelectionError> {
        self.fit(features, labels)?;
        self.transform(features)
    }

    /// 選択された列番号（昇順）。
    ///
    /// # Errors
    /// 未学習の場合は [`SelectionError::NotFitted`] を返す。
    pub fn selected_indices(&self) -> Result<&[usize], SelectionError> {
        self.fitted
            .as_ref()
            .map(|s| s.selected.as_slice())
            .ok_or(SelectionError::NotFitted)
    }

    /// # Errors
    /// 未学習の場合は [`SelectionError::NotFitted`] を返す。
    pub fn scores(&self) -> Result<&Array1<f64>, SelectionError> {
        self.fitted
            .as_ref()
            .map(|s| &s.scores)
            .ok_or(SelectionError::NotFitted)
    }
}

/// スコアの昇順（NaN は最小扱い、同点は元の順）に並べた末尾 k 個を昇順の列番号で返す。
pub(crate) fn top_k_indices(scores: &Array1<f64>, k: usize) -> Vec<usize> {
    let order = ascending_order(scores);
    let start = order.len().saturating_sub(k);
    let mut selected = order[start..].to_vec();
    selected.sort_unstable();
    selected
}

/// NaN を最小として扱う安定な昇順の並び。
pub(crate) fn ascending_order(scores: &Array1<f64>) -> Vec<usize> {
    let cleaned: Vec<f64> = scores
        .iter()
        .map(|score| if score.is_nan() { f64::MIN } else { *score })
        .collect();
    let mut order: Vec<usize> = (0..cleaned.len()).collect();
    order.sort_by(|a, b| {
        cleaned[*a]
            .partial_cmp(&cleaned[*b])
            .unwrap_or(Ordering::Equal)
    });
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn chi2_matches_hand_computed_statistic() {
        // クラス0は列0に、クラス1は列1に偏る
        let x = array![[2.0, 0.0], [1.0, 1.0], [0.0, 3.0], [0.0, 1.0]];
        let y = [0, 0, 1, 1];

        let scores = chi2(x.view(), &y).expect("chi2");

        // 列0: observed [3, 0], expected [1.5, 1.5] → 1.5 + 1.5
        assert!((scores[0] - 3.0).abs() < 1e-12);
        // 列1: observed [1, 4], expected [2.5, 2.5] → 0.9 + 0.9
        assert!((scores[1] - 1.8).abs() < 1e-12);
    }

    #[test]
    fn chi2_yields_nan_for_all_zero_column() {
        let x = array![[1.0, 0.0], [0.0, 0.0]];
        let scores = chi2(x.view(), &[0, 1]).expect("chi2");
        assert!(scores[1].is_nan());
    }

    #[test]
    fn chi2_rejects_negative_values() {
        let x = array![[1.0, -1.0]];
        assert_eq!(
            chi2(x.view(), &[0]).expect_err("negative"),
            SelectionError::NegativeValues
        );
    }

    #[test]
    fn select_k_best_keeps_highest_scores_in_column_order() {
        let x = array![
            [3.0, 1.0, 0.0, 1.0],
            [2.0, 1.0, 0.0, 1.0],
            [0.0, 1.0, 4.0, 1.0],
            [0.0, 1.0, 5.0, 2.0]
        ];
        let y = [0, 0, 1, 1];
        let mut selector = SelectKBest::new(2);

        let reduced = selector.fit_transform(x.view(), &y).expect("select");

        assert_eq!(selector.selected_indices().expect("fitted"), &[0, 2]);
        assert_eq!(reduced.dim(), (4, 2));
        assert_eq!(reduced.column(1), x.column(2));
    }

    #[test]
    fn nan_scores_rank_lowest_and_ties_prefer_later_columns() {
        let scores = array![f64::NAN, 1.0, 1.0, 0.5];
        assert_eq!(top_k_indices(&scores, 1), vec![2]);
        assert_eq!(top_k_indices(&scores, 3), vec![1, 2, 3]);
    }

    #[test]
    fn k_larger_than_feature_count_keeps_everything() {
        let x = array![[1.0, 0.0], [0.0, 1.0]];
        let mut selector = SelectKBest::new(10);
        selector.fit(x.view(), &[0, 1]).expect("fit");
        assert_eq!(selector.k(), 10);
        assert_eq!(selector.selected_indices().expect("fitted"), &[0, 1]);
    }

    #[test]
    fn transform_checks_feature_count() {
        let x = array![[1.0, 0.0], [0.0, 1.0]];
        let mut selector = SelectKBest::new(1);
        assert_eq!(
            selector.transform(x.view()).expect_err("unfitted"),
            SelectionError::NotFitted
        );
        selector.fit(x.view(), &[0, 1]).expect("fit");
        let wider = array![[1.0, 0.0, 2.0]];
        assert!(matches!(
            selector.transform(wider.view()),
            Err(SelectionError::FeatureCountMismatch {
                expected: 2,
                found: 3
            })
        ));
    }
}

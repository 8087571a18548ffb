//! カテゴリごとに相関の強い語（unigram / bigram）を抽出する診断用の処理。
use ndarray::ArrayView2;
use serde::Serialize;

use super::selection::{SelectionError, ascending_order, chi2};
use crate::dataset::Categories;

/// 1カテゴリ分の相関語。スコアの高い順。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrelatedTerms {
    pub category: String,
    pub unigrams: Vec<String>,
    pub bigrams: Vec<String>,
}

/// 各カテゴリについて「そのカテゴリか否か」との chi2 を計算し、上位 `top_n` 語を返す。
///
/// # Errors
/// chi2 の計算に失敗した場合はエラーを返す。
pub fn most_correlated_terms(
    features: ArrayView2<'_, f64>,
    labels: &[usize],
    categories: &Categories,
    feature_names: &[String],
    top_n: usize,
) -> Result<Vec<CorrelatedTerms>, SelectionError> {
    let mut report = Vec::with_capacity(categories.len());
    for (category_index, category) in categories.iter().enumerate() {
        let membership: Vec<usize> = labels
            .iter()
            .map(|label| usize::from(*label == category_index))
            .collect();
        let scores = chi2(features, &membership)?;

        let mut unigrams = Vec::with_capacity(top_n);
        let mut bigrams = Vec::with_capacity(top_n);
        for column in ascending_order(&scores).into_iter().rev() {
            let Some(term) = feature_names.get(column) else {
                continue;
            };
            match term.split(' ').count() {
                1 if unigrams.len() < top_n => unigrams.push(term.clone()),
                2 if bigrams.len() < top_n => bigrams.push(term.clone()),
                _ => {}
            }
            if unigrams.len() == top_n && bigrams.len() == top_n {
                break;
            }
        }

        report.push(CorrelatedTerms {
            category: category.to_string(),
            unigrams,
            bigrams,
        });
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn picks_terms_most_associated_with_each_category() {
        let names: Vec<String> = ["aa", "aa bb", "bb", "cc", "cc dd"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let x = array![
            [2.0, 1.0, 0.0, 0.0, 0.0],
            [3.0, 1.0, 0.0, 0.1, 0.0],
            [0.0, 0.0, 1.0, 2.0, 1.0],
            [0.0, 0.0, 1.0, 3.0, 2.0]
        ];
        let labels = [0, 0, 1, 1];
        let categories = Categories::from_labels(["BILL", "BINDER"]);

        let report = most_correlated_terms(x.view(), &labels, &categories, &names, 1)
            .expect("correlated terms");

        assert_eq!(report.len(), 2);
        assert_eq!(report[0].category, "BILL");
        assert_eq!(report[0].unigrams, vec!["aa".to_string()]);
        assert_eq!(report[0].bigrams, vec!["cc dd".to_string()]);
        assert_eq!(report[1].category, "BINDER");
        assert_eq!(report[1].unigrams.len(), 1);
        assert_eq!(report[1].bigrams.len(), 1);
    }
}

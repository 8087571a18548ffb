//! 文書分類の学習・推論コンポーネント。
//!
//! トークナイズ → TF-IDF → chi2 特徴選択 → 線形分類器、の順で組み立てる。
use serde::{Deserialize, Serialize};

pub mod features;
pub mod keywords;
pub mod linear_svc;
pub mod logistic;
pub mod model;
pub mod naive_bayes;
mod optim;
pub mod pipeline;
pub mod selection;
pub mod tokenizer;

pub use features::{DocumentFrequency, FeatureError, TfidfVectorizer, VectorizerConfig};
pub use keywords::{CorrelatedTerms, most_correlated_terms};
pub use linear_svc::LinearSvc;
pub use logistic::{ClassWeight, LogisticParams, LogisticRegression, Solver};
pub use model::{Classifier, ModelError, ModelSpec};
pub use naive_bayes::MultinomialNb;
pub use pipeline::{PipelineConfig, TextPipeline};
pub use selection::{SelectKBest, SelectionError, chi2};
pub use tokenizer::Splitter;

/// 1文書に対する予測結果。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub category: String,
    pub confidence: f64,
    /// カテゴリ名と確率の組。カテゴリ順。
    pub probabilities: Vec<(String, f64)>,
}

impl Prediction {
    /// 確率分布から予測を組み立てる。最大確率が複数ある場合は先頭を採る。
    #[must_use]
    pub fn from_probabilities<S: AsRef<str>>(names: &[S], probabilities: &[f64]) -> Option<Self> {
        if names.len() != probabilities.len() {
            return None;
        }
        let (best, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold(None, |acc: Option<(usize, f64)>, (index, p)| match acc {
                Some((_, current)) if current >= p => acc,
                _ => Some((index, p)),
            })?;
        Some(Self {
            category: names[best].as_ref().to_string(),
            confidence,
            probabilities: names
                .iter()
                .map(|name| name.as_ref().to_string())
                .zip(probabilities.iter().copied())
                .collect(),
        })
    }

    #[must_use]
    pub fn probability_of(&self, category: &str) -> Option<f64> {
        self.probabilities
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, p)| *p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_picks_first_maximum() {
        let prediction = Prediction::from_probabilities(&["a", "b", "c"], &[0.4, 0.4, 0.2])
            .expect("prediction");

        assert_eq!(prediction.category, "a");
        assert!((prediction.confidence - 0.4).abs() < f64::EPSILON);
        assert_eq!(prediction.probability_of("c"), Some(0.2));
    }

    #[test]
    fn prediction_rejects_length_mismatch() {
        assert!(Prediction::from_probabilities(&["a"], &[0.5, 0.5]).is_none());
        assert!(Prediction::from_probabilities::<&str>(&[], &[]).is_none());
    }
}

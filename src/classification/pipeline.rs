//! TF-IDF → SelectKBest(chi2) → ロジスティック回帰 を連結した学習済みパイプライン。
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::{
    Prediction,
    features::{FeatureError, TfidfVectorizer, VectorizerConfig},
    logistic::{LogisticParams, LogisticRegression},
    model::{Classifier, ModelError},
    selection::{SelectKBest, SelectionError},
    tokenizer::Splitter,
};
use crate::dataset::Categories;

#[derive(Debug, Error)]
pub enum TextPipelineError {
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("label {label} is outside the category set of size {categories}")]
    UnknownLabel { label: usize, categories: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub vectorizer: VectorizerConfig,
    pub splitter: Splitter,
    pub select_k: usize,
    pub logistic: LogisticParams,
}

impl PipelineConfig {
    /// 配布用パイプラインの構成。
    #[must_use]
    pub fn export(select_k: usize) -> Self {
        Self {
            vectorizer: VectorizerConfig::export(),
            splitter: Splitter::default(),
            select_k,
            logistic: LogisticParams::export_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPipeline {
    vectorizer: TfidfVectorizer,
    selector: SelectKBest,
    classifier: LogisticRegression,
    categories: Categories,
}

impl TextPipeline {
    /// 生テキストとカテゴリ番号から全段を学習する。
    ///
    /// # Errors
    /// いずれかの段の学習に失敗した場合、またはラベルがカテゴリ集合外の場合はエラーを返す。
    pub fn fit<S: AsRef<str>>(
        config: &PipelineConfig,
        documents: &[S],
        labels: &[usize],
        categories: Categories,
    ) -> Result<Self, TextPipelineError> {
        if let Some(&label) = labels.iter().find(|&&label| label >= categories.len()) {
            return Err(TextPipelineError::UnknownLabel {
                label,
                categories: categories.len(),
            });
        }

        let mut vectorizer = TfidfVectorizer::new(config.vectorizer.clone(), config.splitter.clone());
        let features = vectorizer.fit_transform(documents)?;

        let mut selector = SelectKBest::new(config.select_k);
        let selected = selector.fit_transform(features.view(), labels)?;

        let mut classifier = LogisticRegression::new(config.logistic.clone());
        classifier.fit(selected.view(), labels)?;

        info!(
            documents = documents.len(),
            vocabulary = features.ncols(),
            selected = selected.ncols(),
            iterations = classifier.n_iter().unwrap_or_default(),
            "text pipeline fitted"
        );

        Ok(Self {
            vectorizer,
            selector,
            classifier,
            categories,
        })
    }

    #[must_use]
    pub fn vectorizer(&self) -> &TfidfVectorizer {
        &self.vectorizer
    }

    #[must_use]
    pub fn selector(&self) -> &SelectKBest {
        &self.selector
    }

    #[must_use]
    pub fn classifier(&self) -> &LogisticRegression {
        &self.classifier
    }

    #[must_use]
    pub fn categories(&self) -> &Categories {
        &self.categories
    }

    /// 分類器が学習したクラスのカテゴリ名（確率列の順）。
    ///
    /// # Errors
    /// 分類器が未学習の場合はエラーを返す。
    pub fn class_names(&self) -> Result<Vec<&str>, TextPipelineError> {
        let classes = self.classifier.classes()?;
        classes
            .iter()
            .map(|&class| {
                self.categories
                    .name(class)
                    .ok_or(TextPipelineError::UnknownLabel {
                        label: class,
                        categories: self.categories.len(),
                    })
            })
            .collect()
    }

    /// 選択された語（列順）とその idf。
    ///
    /// # Errors
    /// 各段が未学習の場合はエラーを返す。
    pub fn selected_terms(&self) -> Result<Vec<(&str, f64)>, TextPipelineError> {
        let names = self.vectorizer.feature_names()?;
        let idf = self.vectorizer.idf()?;
        Ok(self
            .selector
            .selected_indices()?
            .iter()
            .map(|&column| (names[column].as_str(), idf[column]))
            .collect())
    }

    /// 文書集合を選択済み特徴量に変換する。
    ///
    /// # Errors
    /// 各段が未学習の場合はエラーを返す。
    pub fn transform<S: AsRef<str>>(&self, documents: &[S]) -> Result<Array2<f64>, TextPipelineError> {
        let features = self.vectorizer.transform(documents)?;
        Ok(self.selector.transform(features.view())?)
    }

    /// # Errors
    /// [`TextPipeline::transform`] と同じ条件でエラーを返す。
    pub fn predict_proba<S: AsRef<str>>(&self, documents: &[S]) -> Result<Array2<f64>, TextPipelineError> {
        let features = self.transform(documents)?;
        Ok(self.classifier.predict_proba(features.view())?)
    }

    /// # Errors
    /// [`TextPipeline::transform`] と同じ条件でエラーを返す。
    pub fn predict<S: AsRef<str>>(&self, documents: &[S]) -> Result<Vec<String>, TextPipelineError> {
        let features = self.transform(documents)?;
        let predicted = self.classifier.predict(features.view())?;
        Ok(predicted
            .into_iter()
            .map(|class| self.categories.name(class).unwrap_or_default().to_string())
            .collect())
    }

    /// 1文書を採点する。
    ///
    /// # Errors
    /// [`TextPipeline::transform`] と同じ条件でエラーを返す。
    pub fn score_document(&self, text: &str) -> Result<Prediction, TextPipelineError> {
        let probabilities = self.predict_proba(&[text])?;
        let names = self.class_names()?;
        let row: Vec<f64> = probabilities.row(0).to_vec();
        Prediction::from_probabilities(&names, &row).ok_or(TextPipelineError::Model(ModelError::NotFitted))
    }
}

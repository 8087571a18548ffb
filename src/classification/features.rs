//! 本文から TF-IDF 特徴量を抽出する。
//!
//! 語彙は学習時に確定し、辞書順に並べた列番号で変換時にも再利用する。
use ndarray::{Array1, Array2};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};
use thiserror::Error;
use tracing::debug;

use super::tokenizer::Splitter;

#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("empty vocabulary; the documents contain no tokens")]
    EmptyVocabulary,
    #[error("no terms remain after document-frequency pruning; lower min_df or raise max_df")]
    NoTermsAfterPruning,
    #[error("max_df corresponds to {max} documents, fewer than min_df ({min})")]
    InvalidDocumentFrequency { min: f64, max: f64 },
    #[error("invalid n-gram range ({min}, {max})")]
    InvalidNgramRange { min: usize, max: usize },
    #[error("vectorizer has not been fitted")]
    NotFitted,
}

/// 文書頻度の上下限。割合（文書数に対する比率）または絶対文書数。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DocumentFrequency {
    Proportion(f64),
    Count(usize),
}

impl DocumentFrequency {
    #[must_use]
    pub fn document_count(self, n_documents: usize) -> f64 {
        match self {
            Self::Proportion(ratio) => ratio * n_documents as f64,
            Self::Count(count) => count as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizerConfig {
    pub ngram_range: (usize, usize),
    pub min_df: DocumentFrequency,
    pub max_df: DocumentFrequency,
    /// tf を `1 + ln(count)` に置き換える。
    pub sublinear_tf: bool,
    pub lowercase: bool,
}

impl VectorizerConfig {
    /// 探索用。サブリニア tf を使う。
    #[must_use]
    pub fn exploratory() -> Self {
        Self {
            sublinear_tf: true,
            ..Self::export()
        }
    }

    /// エクスポート用。PMML の termFrequency 重みと一致させるため生の出現回数を使う。
    #[must_use]
    pub fn export() -> Self {
        Self {
            ngram_range: (1, 2),
            min_df: DocumentFrequency::Proportion(0.01),
            max_df: DocumentFrequency::Proportion(0.75),
            sublinear_tf: false,
            lowercase: true,
        }
    }

    fn validate(&self) -> Result<(), FeatureError> {
        let (min_n, max_n) = self.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(FeatureError::InvalidNgramRange {
                min: min_n,
                max: max_n,
            });
        }
        Ok(())
    }
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self::export()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Vocabulary {
    terms: Vec<String>,
    index: FxHashMap<String, usize>,
    idf: Array1<f64>,
}

/// n-gram TF-IDF ベクトライザ。出力は正規化しない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    config: VectorizerConfig,
    splitter: Splitter,
    vocabulary: Option<Vocabulary>,
}

impl TfidfVectorizer {
    #[must_use]
    pub fn new(config: VectorizerConfig, splitter: Splitter) -> Self {
        Self {
            config,
            splitter,
            vocabulary: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &VectorizerConfig {
        &self.config
    }

    #[must_use]
    pub fn splitter(&self) -> &Splitter {
        &self.splitter
    }

    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.vocabulary.is_some()
    }

    /// 1文書を n-gram 列に分解する。
    #[must_use]
    pub fn analyze(&self, document: &str) -> Vec<String> {
        let tokens = if self.config.lowercase {
            self.splitter.split(&document.to_lowercase())
        } else {
            self.splitter.split(document)
        };
        ngrams(&tokens, self.config.ngram_range)
    }

    /// 語彙と idf を学習する。
    ///
    /// # Errors
    /// 語彙が空、文書頻度の範囲が矛盾、または枝刈り後に語が残らない場合はエラーを返す。
    pub fn fit<S: AsRef<str>>(&mut self, documents: &[S]) -> Result<(), FeatureError> {
        self.fit_transform(documents).map(|_| ())
    }

    /// 語彙を学習し、同じ文書集合の TF-IDF 行列を返す。
    ///
    /// # Errors
    /// [`TfidfVectorizer::fit`] と同じ条件でエラーを返す。
    pub fn fit_transform<S: AsRef<str>>(
        &mut self,
        documents: &[S],
    ) -> Result<Array2<f64>, FeatureError> {
        self.config.validate()?;
        let n_documents = documents.len();

        let mut provisional: FxHashMap<String, usize> = FxHashMap::default();
        let mut document_frequency: Vec<usize> = Vec::new();
        let mut counted: Vec<Vec<(usize, usize)>> = Vec::with_capacity(n_documents);
        for document in documents {
            let mut counts: FxHashMap<usize, usize> = FxHashMap::default();
            for term in self.analyze(document.as_ref()) {
                let next = provisional.len();
                let id = *provisional.entry(term).or_insert(next);
                if id == document_frequency.len() {
                    document_frequency.push(0);
                }
                *counts.entry(id).or_insert(0) += 1;
            }
            for id in counts.keys() {
                document_frequency[*id] += 1;
            }
            counted.push(counts.into_iter().collect());
        }

        if provisional.is_empty() {
            return Err(FeatureError::EmptyVocabulary);
        }

        let max_count = self.config.max_df.document_count(n_documents);
        let min_count = self.config.min_df.document_count(n_documents);
        if max_count < min_count {
            return Err(FeatureError::InvalidDocumentFrequency {
                min: min_count,
                max: max_count,
            });
        }

        let mut kept: Vec<(String, usize)> = provisional
            .into_iter()
            .filter(|(_, id)| {
                let df = document_frequency[*id] as f64;
                df >= min_count && df <= max_count
            })
            .collect();
        if kept.is_empty() {
            return Err(FeatureError::NoTermsAfterPruning);
        }
        kept.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let mut remap: FxHashMap<usize, usize> = FxHashMap::default();
        let mut terms = Vec::with_capacity(kept.len());
        let mut index = FxHashMap::default();
        let mut idf = Array1::zeros(kept.len());
        for (column, (term, id)) in kept.into_iter().enumerate() {
            remap.insert(id, column);
            idf[column] = smooth_idf(n_documents, document_frequency[id]);
            index.insert(term.clone(), column);
            terms.push(term);
        }

        debug!(
            documents = n_documents,
            vocabulary = terms.len(),
            min_df = min_count,
            max_df = max_count,
            "tfidf vocabulary fitted"
        );

        let rows: Vec<Vec<(usize, usize)>> = counted
            .into_iter()
            .map(|counts| {
                counts
                    .into_iter()
                    .filter_map(|(id, count)| remap.get(&id).map(|&column| (column, count)))
                    .collect()
            })
            .collect();

        self.vocabulary = Some(Vocabulary { terms, index, idf });
        self.weigh(&rows)
    }

    /// 学習済み語彙で文書集合を変換する。未知語は無視する。
    ///
    /// # Errors
    /// 未学習の場合は [`FeatureError::NotFitted`] を返す。
    pub fn transform<S: AsRef<str>>(&self, documents: &[S]) -> Result<Array2<f64>, FeatureError> {
        let vocabulary = self.vocabulary.as_ref().ok_or(FeatureError::NotFitted)?;
        let rows: Vec<Vec<(usize, usize)>> = documents
            .iter()
            .map(|document| {
                let mut counts: FxHashMap<usize, usize> = FxHashMap::default();
                for term in self.analyze(document.as_ref()) {
                    if let Some(&column) = vocabulary.index.get(&term) {
                        *counts.entry(column).or_insert(0) += 1;
                    }
                }
                counts.into_iter().collect()
            })
            .collect();
        self.weigh(&rows)
    }

    /// 列番号順の語彙。
    ///
    /// # Errors
    /// 未学習の場合は [`FeatureError::NotFitted`] を返す。
    pub fn feature_names(&self) -> Result<&[String], FeatureError> {
        self.vocabulary
            .as_ref()
            .map(|v| v.terms.as_slice())
            .ok_or(FeatureError::NotFitted)
    }

    /// # Errors
    /// 未学習の場合は [`FeatureError::NotFitted`] を返す。
    pub fn idf(&self) -> Result<&Array1<f64>, FeatureError> {
        self.vocabulary
            .as_ref()
            .map(|v| &v.idf)
            .ok_or(FeatureError::NotFitted)
    }

    fn weigh(&self, rows: &[Vec<(usize, usize)>]) -> Result<Array2<f64>, FeatureError> {
        let vocabulary = self.vocabulary.as_ref().ok_or(FeatureError::NotFitted)?;
        let n_features = vocabulary.terms.len();
        let mut triplets = TriMat::new((rows.len(), n_features));
        for (row, counts) in rows.iter().enumerate() {
            for &(column, count) in counts {
                let tf = if self.config.sublinear_tf {
                    1.0 + (count as f64).ln()
                } else {
                    count as f64
                };
                triplets.add_triplet(row, column, tf * vocabulary.idf[column]);
            }
        }
        let sparse: CsMat<f64> = triplets.to_csr();
        let mut dense = Array2::zeros((rows.len(), n_features));
        for (value, (row, column)) in sparse.iter() {
            dense[[row, column]] = *value;
        }
        Ok(dense)
    }
}

/// `ln((1 + n) / (1 + df)) + 1`
fn smooth_idf(n_documents: usize, document_frequency: usize) -> f64 {
    ((1.0 + n_documents as f64) / (1.0 + document_frequency as f64)).ln() + 1.0
}

/// トークン列から n-gram を作る。1-gram はそのまま、それ以上は空白で連結する。
#[must_use]
pub fn ngrams(tokens: &[String], (min_n, max_n): (usize, usize)) -> Vec<String> {
    let mut grams = Vec::new();
    if min_n == 1 {
        grams.extend(tokens.iter().cloned());
    }
    for n in min_n.max(2)..=max_n {
        if n > tokens.len() {
            break;
        }
        grams.extend(tokens.windows(n).map(|window| window.join(" ")));
    }
    grams
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min_df: DocumentFrequency, max_df: DocumentFrequency) -> VectorizerConfig {
        VectorizerConfig {
            ngram_range: (1, 2),
            min_df,
            max_df,
            sublinear_tf: false,
            lowercase: true,
        }
    }

    fn vectorizer(config: VectorizerConfig) -> TfidfVectorizer {
        TfidfVectorizer::new(config, Splitter::default())
    }

    #[test]
    fn ngrams_include_unigrams_then_bigrams() {
        let tokens: Vec<String> = ["a", "b", "c"].iter().map(|s| (*s).to_string()).collect();
        assert_eq!(ngrams(&tokens, (1, 2)), vec!["a", "b", "c", "a b", "b c"]);
        assert_eq!(ngrams(&tokens, (2, 3)), vec!["a b", "b c", "a b c"]);
        assert!(ngrams(&tokens[..1], (2, 2)).is_empty());
    }

    #[test]
    fn vocabulary_is_sorted_and_idf_is_smoothed() {
        let docs = ["b a", "a c", "A"];
        let mut v = vectorizer(config(
            DocumentFrequency::Count(1),
            DocumentFrequency::Proportion(1.0),
        ));
        assert!(!v.is_fitted());
        let x = v.fit_transform(&docs).expect("fit");
        assert!(v.is_fitted());

        let names = v.feature_names().expect("names");
        assert_eq!(names, &["a", "a c", "b", "b a", "c"]);
        assert_eq!(x.dim(), (3, 5));

        // "a" は全3文書に出現する
        let idf_a = v.idf().expect("idf")[0];
        assert!((idf_a - 1.0).abs() < 1e-12);
        let idf_b = ((4.0_f64) / 2.0).ln() + 1.0;
        assert!((x[[0, 2]] - idf_b).abs() < 1e-12);
        assert_eq!(x[[2, 2]], 0.0);
    }

    #[test]
    fn sublinear_tf_uses_log_counts() {
        let docs = ["x x x y", "y z"];
        let mut raw = vectorizer(VectorizerConfig {
            ngram_range: (1, 1),
            ..config(DocumentFrequency::Count(1), DocumentFrequency::Count(2))
        });
        let mut sub = vectorizer(VectorizerConfig {
            ngram_range: (1, 1),
            sublinear_tf: true,
            ..config(DocumentFrequency::Count(1), DocumentFrequency::Count(2))
        });
        let x_raw = raw.fit_transform(&docs).expect("fit raw");
        let x_sub = sub.fit_transform(&docs).expect("fit sub");

        let idf_x = (3.0_f64 / 2.0).ln() + 1.0;
        assert!((x_raw[[0, 0]] - 3.0 * idf_x).abs() < 1e-12);
        assert!((x_sub[[0, 0]] - (1.0 + 3.0_f64.ln()) * idf_x).abs() < 1e-12);
    }

    #[test]
    fn document_frequency_bounds_prune_terms() {
        let docs = ["common rare", "common", "common other"];
        let mut v = vectorizer(VectorizerConfig {
            ngram_range: (1, 1),
            ..config(
                DocumentFrequency::Count(1),
                DocumentFrequency::Proportion(0.75),
            )
        });
        v.fit(&docs).expect("fit");
        assert_eq!(v.feature_names().expect("names"), &["other", "rare"]);
    }

    #[test]
    fn transform_ignores_unknown_terms() {
        let mut v = vectorizer(config(
            DocumentFrequency::Count(1),
            DocumentFrequency::Proportion(1.0),
        ));
        let fitted = v.fit_transform(&["aa bb", "bb cc"]).expect("fit");
        let transformed = v.transform(&["aa bb", "zz"]).expect("transform");

        assert_eq!(transformed.row(0), fitted.row(0));
        assert!(transformed.row(1).iter().all(|value| *value == 0.0));
    }

    #[test]
    fn errors_are_reported() {
        let mut v = vectorizer(VectorizerConfig::export());
        assert_eq!(
            v.fit(&["", "  "]).expect_err("empty"),
            FeatureError::EmptyVocabulary
        );

        let mut pruned = vectorizer(config(
            DocumentFrequency::Count(3),
            DocumentFrequency::Count(3),
        ));
        assert_eq!(
            pruned.fit(&["a", "b"]).expect_err("pruned"),
            FeatureError::NoTermsAfterPruning
        );

        let mut inverted = vectorizer(config(
            DocumentFrequency::Proportion(0.9),
            DocumentFrequency::Proportion(0.1),
        ));
        assert!(matches!(
            inverted.fit(&["a", "b"]),
            Err(FeatureError::InvalidDocumentFrequency { .. })
        ));

        let unfitted = vectorizer(VectorizerConfig::export());
        assert_eq!(
            unfitted.transform(&["a"]).expect_err("not fitted"),
            FeatureError::NotFitted
        );
    }
}

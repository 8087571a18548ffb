//! PMML テキスト分類モデルの読み込みと採点。
//!
//! 学習側のコードには依存せず、文書に書かれた `TextIndex` の属性だけで
//! トークナイズと重み付けを再現する。
use std::{
    fs,
    path::{Path, PathBuf},
};

use regex::Regex;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::info;
use unicode_normalization::UnicodeNormalization;

use crate::classification::Prediction;

pub mod document;

pub use document::Pmml;

#[derive(Debug, Error)]
pub enum PmmlError {
    #[error("failed to read PMML document {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse PMML document: {0}")]
    Parse(String),
    #[error("failed to serialize PMML document: {0}")]
    Serialize(String),
    #[error("unsupported PMML construct: {0}")]
    Unsupported(String),
    #[error("field `{0}` is referenced but not defined")]
    UnknownField(String),
    #[error("target category `{0}` is not declared in the data dictionary")]
    UnknownCategory(String),
    #[error("invalid numeric constant `{value}` in field `{field}`")]
    InvalidConstant { field: String, value: String },
    #[error("invalid word separator pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("model has no regression tables")]
    NoTables,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermWeight {
    TermFrequency,
    Binary,
    Logarithmic,
}

impl TermWeight {
    fn parse(raw: &str) -> Result<Self, PmmlError> {
        match raw {
            "termFrequency" => Ok(Self::TermFrequency),
            "binary" => Ok(Self::Binary),
            "logarithmic" => Ok(Self::Logarithmic),
            other => Err(PmmlError::Unsupported(format!("localTermWeights={other}"))),
        }
    }

    fn apply(self, count: usize) -> f64 {
        match self {
            Self::TermFrequency => count as f64,
            Self::Binary => f64::from(u8::from(count > 0)),
            Self::Logarithmic => (1.0 + count as f64).log10(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Normalization {
    Softmax,
    Simplemax,
}

/// 同じ区切り・大小文字設定を共有する派生フィールドのグループ。
#[derive(Debug)]
struct Tokenization {
    separator: Regex,
    case_sensitive: bool,
}

impl Tokenization {
    fn tokens(&self, text: &str) -> Vec<String> {
        let normalized: String = if self.case_sensitive {
            text.nfc().collect()
        } else {
            text.to_lowercase().nfc().collect()
        };
        self.separator
            .split(normalized.trim())
            .map(|token| token.trim_matches(|c: char| c.is_ascii_punctuation()))
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug)]
struct TermFeature {
    tokenization: usize,
    term: Vec<String>,
    weight: TermWeight,
    factor: f64,
}

#[derive(Debug)]
struct Table {
    category: String,
    intercept: f64,
    predictors: Vec<(usize, f64)>,
}

/// 読み込み済みの PMML 分類モデル。
#[derive(Debug)]
pub struct PmmlModel {
    text_field: String,
    tokenizations: Vec<Tokenization>,
    features: Vec<TermFeature>,
    tables: Vec<Table>,
    normalization: Normalization,
}

impl PmmlModel {
    /// ファイルから読み込んで検証する。
    ///
    /// # Errors
    /// 読み込み・解析に失敗した場合、または参照が解決できない場合はエラーを返す。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PmmlError> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path).map_err(|source| PmmlError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model = Self::from_xml(&xml)?;
        info!(
            path = %path.display(),
            terms = model.features.len(),
            categories = model.tables.len(),
            "PMML model loaded"
        );
        Ok(model)
    }

    /// # Errors
    /// 解析に失敗した場合、または参照が解決できない場合はエラーを返す。
    pub fn from_xml(xml: &str) -> Result<Self, PmmlError> {
        let document: Pmml =
            quick_xml::de::from_str(xml).map_err(|error| PmmlError::Parse(error.to_string()))?;
        Self::from_document(&document)
    }

    /// # Errors
    /// 未対応の構成、または参照が解決できない場合はエラーを返す。
    pub fn from_document(document: &Pmml) -> Result<Self, PmmlError> {
        let model = &document.regression_model;
        if model.function_name != "classification" {
            return Err(PmmlError::Unsupported(format!(
                "functionName={}",
                model.function_name
            )));
        }
        let normalization = match model.normalization_method.as_str() {
            "softmax" => Normalization::Softmax,
            "simplemax" => Normalization::Simplemax,
            other => {
                return Err(PmmlError::Unsupported(format!("normalizationMethod={other}")));
            }
        };

        let data_fields: FxHashMap<&str, &document::DataField> = document
            .data_dictionary
            .fields
            .iter()
            .map(|field| (field.name.as_str(), field))
            .collect();

        let target = model
            .mining_schema
            .fields
            .iter()
            .find(|field| field.usage_type.as_deref() == Some("target"))
            .ok_or_else(|| PmmlError::Unsupported("mining schema without target".to_string()))?;
        let target_field = data_fields
            .get(target.name.as_str())
            .ok_or_else(|| PmmlError::UnknownField(target.name.clone()))?;
        let declared: Vec<&str> = target_field.values.iter().map(|v| v.value.as_str()).collect();

        let mut text_field: Option<String> = None;
        let mut tokenizations: Vec<Tokenization> = Vec::new();
        let mut features = Vec::with_capacity(document.transformation_dictionary.derived_fields.len());
        let mut feature_index: FxHashMap<&str, usize> = FxHashMap::default();

        for derived in &document.transformation_dictionary.derived_fields {
            let apply = &derived.apply;
            if apply.function != "*" {
                return Err(PmmlError::Unsupported(format!("Apply function={}", apply.function)));
            }
            let index = &apply.text_index;
            if !data_fields.contains_key(index.text_field.as_str()) {
                return Err(PmmlError::UnknownField(index.text_field.clone()));
            }
            match &text_field {
                Some(existing) if *existing != index.text_field => {
                    return Err(PmmlError::Unsupported("multiple text fields".to_string()));
                }
                Some(_) => {}
                None => text_field = Some(index.text_field.clone()),
            }
            if index.max_levenshtein_distance != 0 {
                return Err(PmmlError::Unsupported("maxLevenshteinDistance".to_string()));
            }
            if !index.tokenize {
                return Err(PmmlError::Unsupported("tokenize=false".to_string()));
            }

            let tokenization = match tokenizations.iter().position(|t| {
                t.separator.as_str() == index.word_separator_character_re
                    && t.case_sensitive == index.is_case_sensitive
            }) {
                Some(position) => position,
                None => {
                    tokenizations.push(Tokenization {
                        separator: Regex::new(&index.word_separator_character_re)?,
                        case_sensitive: index.is_case_sensitive,
                    });
                    tokenizations.len() - 1
                }
            };
            let term = tokenizations[tokenization].tokens(&index.term.value);

            let mut factor = 1.0;
            for constant in &apply.constants {
                let value = constant.value.trim().parse::<f64>().map_err(|_| PmmlError::InvalidConstant {
                    field: derived.name.clone(),
                    value: constant.value.clone(),
                })?;
                factor *= value;
            }

            feature_index.insert(derived.name.as_str(), features.len());
            features.push(TermFeature {
                tokenization,
                term,
                weight: TermWeight::parse(&index.local_term_weights)?,
                factor,
            });
        }

        if model.tables.is_empty() {
            return Err(PmmlError::NoTables);
        }
        let mut tables = Vec::with_capacity(model.tables.len());
        for table in &model.tables {
            if !declared.contains(&table.target_category.as_str()) {
                return Err(PmmlError::UnknownCategory(table.target_category.clone()));
            }
            let mut predictors = Vec::with_capacity(table.predictors.len());
            for predictor in &table.predictors {
                if predictor.exponent != 1 {
                    return Err(PmmlError::Unsupported(format!(
                        "NumericPredictor exponent={}",
                        predictor.exponent
                    )));
                }
                let index = feature_index
                    .get(predictor.name.as_str())
                    .ok_or_else(|| PmmlError::UnknownField(predictor.name.clone()))?;
                predictors.push((*index, predictor.coefficient));
            }
            tables.push(Table {
                category: table.target_category.clone(),
                intercept: table.intercept,
                predictors,
            });
        }

        if let Some(output) = &model.output {
            for field in &output.fields {
                if let Some(value) = &field.value {
                    if !declared.contains(&value.as_str()) {
                        return Err(PmmlError::UnknownCategory(value.clone()));
                    }
                }
            }
        }

        let text_field = text_field.unwrap_or_else(|| {
            model
                .mining_schema
                .fields
                .iter()
                .find(|field| field.usage_type.as_deref() != Some("target"))
                .map(|field| field.name.clone())
                .unwrap_or_default()
        });

        Ok(Self {
            text_field,
            tokenizations,
            features,
            tables,
            normalization,
        })
    }

    #[must_use]
    pub fn text_field(&self) -> &str {
        &self.text_field
    }

    /// 回帰表の順のカテゴリ。
    #[must_use]
    pub fn categories(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.category.as_str()).collect()
    }

    #[must_use]
    pub fn term_count(&self) -> usize {
        self.features.len()
    }

    /// 本文1件を採点する。
    ///
    /// # Errors
    /// 確率を組み立てられない場合はエラーを返す。
    pub fn predict(&self, text: &str) -> Result<Prediction, PmmlError> {
        let tokens: Vec<Vec<String>> = self
            .tokenizations
            .iter()
            .map(|tokenization| tokenization.tokens(text))
            .collect();
        let values: Vec<f64> = self
            .features
            .iter()
            .map(|feature| {
                let count = count_occurrences(&tokens[feature.tokenization], &feature.term);
                feature.weight.apply(count) * feature.factor
            })
            .collect();

        let scores: Vec<f64> = self
            .tables
            .iter()
            .map(|table| {
                table.intercept
                    + table
                        .predictors
                        .iter()
                        .map(|&(index, coefficient)| values[index] * coefficient)
                        .sum::<f64>()
            })
            .collect();
        let probabilities = self.normalize(&scores);
        let names = self.categories();
        Prediction::from_probabilities(&names, &probabilities)
            .ok_or_else(|| PmmlError::Unsupported("empty prediction".to_string()))
    }

    fn normalize(&self, scores: &[f64]) -> Vec<f64> {
        match self.normalization {
            Normalization::Softmax => {
                let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
                let sum: f64 = exps.iter().sum();
                exps.into_iter().map(|e| e / sum).collect()
            }
            Normalization::Simplemax => {
                let sum: f64 = scores.iter().sum();
                scores.iter().map(|s| s / sum).collect()
            }
        }
    }
}

/// 連続するトークン列として `term` が現れる回数。
fn count_occurrences(tokens: &[String], term: &[String]) -> usize {
    if term.is_empty() || term.len() > tokens.len() {
        return 0;
    }
    tokens.windows(term.len()).filter(|window| *window == term).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<PMML xmlns="http://www.dmg.org/PMML-4_4" version="4.4">
  <Header description="test"/>
  <DataDictionary numberOfFields="2">
    <DataField name="y" optype="categorical" dataType="string">
      <Value value="BILL"/>
      <Value value="BINDER"/>
    </DataField>
    <DataField name="Content" optype="continuous" dataType="string"/>
  </DataDictionary>
  <TransformationDictionary>
    <DerivedField name="tfidf(aa)" optype="continuous" dataType="double">
      <Apply function="*">
        <TextIndex textField="Content" localTermWeights="termFrequency" isCaseSensitive="false" wordSeparatorCharacterRE="\s+" tokenize="true">
          <Constant>aa</Constant>
        </TextIndex>
        <Constant dataType="double">2.0</Constant>
      </Apply>
    </DerivedField>
    <DerivedField name="tfidf(aa bb)" optype="continuous" dataType="double">
      <Apply function="*">
        <TextIndex textField="Content" localTermWeights="termFrequency" isCaseSensitive="false" wordSeparatorCharacterRE="\s+" tokenize="true">
          <Constant>aa bb</Constant>
        </TextIndex>
        <Constant dataType="double">1.5</Constant>
      </Apply>
    </DerivedField>
  </TransformationDictionary>
  <RegressionModel functionName="classification" normalizationMethod="softmax">
    <MiningSchema>
      <MiningField name="y" usageType="target"/>
      <MiningField name="Content"/>
    </MiningSchema>
    <RegressionTable intercept="0.5" targetCategory="BILL">
      <NumericPredictor name="tfidf(aa)" coefficient="1.0"/>
      <NumericPredictor name="tfidf(aa bb)" coefficient="-1.0"/>
    </RegressionTable>
    <RegressionTable intercept="0.0" targetCategory="BINDER">
      <NumericPredictor name="tfidf(aa bb)" coefficient="2.0"/>
    </RegressionTable>
  </RegressionModel>
</PMML>
"#;

    #[test]
    fn counts_terms_and_applies_softmax() {
        let model = PmmlModel::from_xml(MODEL).expect("model");
        assert_eq!(model.categories(), vec!["BILL", "BINDER"]);
        assert_eq!(model.text_field(), "Content");

        // aa ×2, "aa bb" ×1
        let prediction = model.predict("AA bb, aa.").expect("predict");
        let bill: f64 = 0.5 + 2.0 * 2.0 - 1.5;
        let binder: f64 = 2.0 * 1.5;
        let expected_bill = bill.exp() / (bill.exp() + binder.exp());
        assert!((prediction.probability_of("BILL").expect("bill") - expected_bill).abs() < 1e-12);
        assert_eq!(prediction.category, "BILL");
    }

    #[test]
    fn empty_text_uses_intercepts() {
        let model = PmmlModel::from_xml(MODEL).expect("model");
        let prediction = model.predict("").expect("predict");
        let expected = 0.5_f64.exp() / (0.5_f64.exp() + 1.0);
        assert!((prediction.confidence - expected).abs() < 1e-12);
    }

    #[test]
    fn unknown_predictor_reference_is_rejected() {
        let broken = MODEL.replace(r#"name="tfidf(aa)" coefficient"#, r#"name="tfidf(zz)" coefficient"#);
        assert!(matches!(
            PmmlModel::from_xml(&broken),
            Err(PmmlError::UnknownField(name)) if name == "tfidf(zz)"
        ));
    }

    #[test]
    fn undeclared_category_is_rejected() {
        let broken = MODEL.replace(r#"targetCategory="BINDER""#, r#"targetCategory="CANCELLATION""#);
        assert!(matches!(
            PmmlModel::from_xml(&broken),
            Err(PmmlError::UnknownCategory(_))
        ));
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        assert!(matches!(
            PmmlModel::from_xml("<PMML><oops"),
            Err(PmmlError::Parse(_))
        ));
    }

    #[test]
    fn counts_contiguous_sequences_only() {
        let tokens: Vec<String> = ["a", "b", "a", "b", "c"].iter().map(|s| (*s).to_string()).collect();
        let ab: Vec<String> = vec!["a".to_string(), "b".to_string()];
        let ac: Vec<String> = vec!["a".to_string(), "c".to_string()];
        assert_eq!(count_occurrences(&tokens, &ab), 2);
        assert_eq!(count_occurrences(&tokens, &ac), 0);
    }
}

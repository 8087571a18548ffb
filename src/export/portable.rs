//! PMML 4.4 文書としての書き出し。
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::info;

use super::{ArtifactExporter, ArtifactInfo, ExportError, io_error};
use crate::{
    classification::{TextPipeline, pipeline::TextPipelineError},
    dataset::{CATEGORY_COLUMN, CONTENT_COLUMN},
    pmml::{
        PmmlError,
        document::{
            Application, Apply, Constant, DataDictionary, DataField, DerivedField, Header,
            MiningField, MiningSchema, NumericPredictor, Output, OutputField, PMML_NAMESPACE,
            PMML_VERSION, Pmml, RegressionModel, RegressionTable, TextIndex,
            TransformationDictionary, Value,
        },
    },
};

/// 目的変数のフィールド名。
pub const TARGET_FIELD: &str = "y";

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

#[derive(Debug, Clone)]
pub struct PmmlExporter {
    path: PathBuf,
}

impl PmmlExporter {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 学習済みパイプラインを PMML 文書に変換する。
    ///
    /// 各選択語を `tfidf(語)` 派生フィールド（出現回数 × idf）とし、
    /// カテゴリごとの回帰表を softmax で正規化する。
    ///
    /// # Errors
    /// 未学習、または tf の対数スケーリングが有効な場合はエラーを返す。
    pub fn document(pipeline: &TextPipeline) -> Result<Pmml, ExportError> {
        let vectorizer = pipeline.vectorizer();
        if vectorizer.config().sublinear_tf {
            return Err(ExportError::Unsupported(
                "sublinear tf scaling has no TextIndex equivalent".to_string(),
            ));
        }
        let terms = pipeline.selected_terms()?;
        let class_names = pipeline.class_names()?;
        let classifier = pipeline.classifier();
        let coef = classifier.coef().map_err(TextPipelineError::from)?;
        let intercept = classifier.intercept().map_err(TextPipelineError::from)?;

        let is_case_sensitive = !vectorizer.config().lowercase;
        let separator = vectorizer.splitter().pattern().to_string();
        let field_names: Vec<String> = terms.iter().map(|(term, _)| derived_name(term)).collect();

        let derived_fields = terms
            .iter()
            .zip(&field_names)
            .map(|(&(term, idf), name)| DerivedField {
                name: name.clone(),
                optype: "continuous".to_string(),
                data_type: "double".to_string(),
                apply: Apply {
                    function: "*".to_string(),
                    text_index: TextIndex {
                        text_field: CONTENT_COLUMN.to_string(),
                        local_term_weights: "termFrequency".to_string(),
                        is_case_sensitive,
                        max_levenshtein_distance: 0,
                        word_separator_character_re: separator.clone(),
                        tokenize: true,
                        term: Constant {
                            data_type: Some("string".to_string()),
                            value: term.to_string(),
                        },
                    },
                    constants: vec![Constant {
                        data_type: Some("double".to_string()),
                        value: idf.to_string(),
                    }],
                },
            })
            .collect();

        let tables = class_names
            .iter()
            .enumerate()
            .map(|(row, &category)| RegressionTable {
                intercept: intercept[row],
                target_category: category.to_string(),
                predictors: field_names
                    .iter()
                    .zip(coef.row(row))
                    .filter(|(_, coefficient)| **coefficient != 0.0)
                    .map(|(name, &coefficient)| NumericPredictor {
                        name: name.clone(),
                        exponent: 1,
                        coefficient,
                    })
                    .collect(),
            })
            .collect();

        let output = Output {
            fields: class_names
                .iter()
                .map(|&category| OutputField {
                    name: format!("probability({category})"),
                    optype: "continuous".to_string(),
                    data_type: "double".to_string(),
                    feature: "probability".to_string(),
                    value: Some(category.to_string()),
                })
                .collect(),
        };

        Ok(Pmml {
            xmlns: PMML_NAMESPACE.to_string(),
            version: PMML_VERSION.to_string(),
            header: Header {
                description: Some(format!(
                    "{CATEGORY_COLUMN} classifier over {} tf-idf terms",
                    field_names.len()
                )),
                application: Some(Application {
                    name: env!("CARGO_PKG_NAME").to_string(),
                    version: Some(env!("CARGO_PKG_VERSION").to_string()),
                }),
                timestamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
            },
            data_dictionary: DataDictionary {
                number_of_fields: Some(2),
                fields: vec![
                    DataField {
                        name: TARGET_FIELD.to_string(),
                        optype: "categorical".to_string(),
                        data_type: "string".to_string(),
                        values: class_names
                            .iter()
                            .map(|&category| Value {
                                value: category.to_string(),
                            })
                            .collect(),
                    },
                    DataField {
                        name: CONTENT_COLUMN.to_string(),
                        optype: "categorical".to_string(),
                        data_type: "string".to_string(),
                        values: Vec::new(),
                    },
                ],
            },
            transformation_dictionary: TransformationDictionary { derived_fields },
            regression_model: RegressionModel {
                function_name: "classification".to_string(),
                normalization_method: "softmax".to_string(),
                mining_schema: MiningSchema {
                    fields: vec![
                        MiningField {
                            name: TARGET_FIELD.to_string(),
                            usage_type: Some("target".to_string()),
                        },
                        MiningField {
                            name: CONTENT_COLUMN.to_string(),
                            usage_type: None,
                        },
                    ],
                },
                output: Some(output),
                tables,
            },
        })
    }

    /// # Errors
    /// [`PmmlExporter::document`] の条件、または XML 化に失敗した場合はエラーを返す。
    pub fn to_xml(pipeline: &TextPipeline) -> Result<String, ExportError> {
        let document = Self::document(pipeline)?;
        Ok(serialize_document(&document)?)
    }
}

impl ArtifactExporter for PmmlExporter {
    fn format(&self) -> &'static str {
        "pmml"
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn export(&self, pipeline: &TextPipeline) -> Result<ArtifactInfo, ExportError> {
        let xml = Self::to_xml(pipeline)?;
        {
            let file = File::create(&self.path).map_err(io_error(&self.path))?;
            let mut writer = BufWriter::new(file);
            writer.write_all(xml.as_bytes()).map_err(io_error(&self.path))?;
            writer.flush().map_err(io_error(&self.path))?;
        }

        let bytes = xml.len() as u64;
        info!(path = %self.path.display(), bytes, "PMML artifact written");
        Ok(ArtifactInfo {
            format: self.format(),
            path: self.path.clone(),
            bytes,
        })
    }
}

fn derived_name(term: &str) -> String {
    format!("tfidf({term})")
}

fn serialize_document(document: &Pmml) -> Result<String, PmmlError> {
    let mut body = String::new();
    let mut serializer = quick_xml::se::Serializer::with_root(&mut body, Some("PMML"))
        .map_err(|error| PmmlError::Serialize(error.to_string()))?;
    serializer.indent(' ', 2);
    document
        .serialize(serializer)
        .map_err(|error| PmmlError::Serialize(error.to_string()))?;
    Ok(format!("{XML_DECLARATION}\n{body}\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classification::{DocumentFrequency, LogisticParams, PipelineConfig, VectorizerConfig},
        dataset::Categories,
        pmml::PmmlModel,
    };

    fn fitted(sublinear_tf: bool) -> TextPipeline {
        let docs = [
            "aa bb cc", "aa bb dd", "aa cc dd", "aa bb",
            "ee ff gg", "ee ff hh", "ee gg hh", "ee ff",
            "ii jj aa", "ii jj ee", "ii kk", "ii jj kk",
        ];
        let labels = [0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2];
        let config = PipelineConfig {
            vectorizer: VectorizerConfig {
                min_df: DocumentFrequency::Count(1),
                max_df: DocumentFrequency::Proportion(1.0),
                sublinear_tf,
                ..VectorizerConfig::export()
            },
            logistic: LogisticParams {
                n_jobs: None,
                ..LogisticParams::export_default()
            },
            ..PipelineConfig::export(12)
        };
        TextPipeline::fit(
            &config,
            &docs,
            &labels,
            Categories::from_labels(["BILL", "BINDER", "POLICY CHANGE"]),
        )
        .expect("fit")
    }

    #[test]
    fn document_lists_every_selected_term_and_category() {
        let pipeline = fitted(false);
        let document = PmmlExporter::document(&pipeline).expect("document");

        assert_eq!(document.transformation_dictionary.derived_fields.len(), 12);
        assert_eq!(document.regression_model.tables.len(), 3);
        assert_eq!(
            document.data_dictionary.fields[0].values.len(),
            3,
            "target field declares every category"
        );
        let output = document.regression_model.output.as_ref().expect("output");
        assert_eq!(output.fields[2].name, "probability(POLICY CHANGE)");
    }

    #[test]
    fn reloaded_document_matches_in_memory_scores() {
        let pipeline = fitted(false);
        let xml = PmmlExporter::to_xml(&pipeline).expect("xml");
        assert!(xml.starts_with("<?xml"));

        let model = PmmlModel::from_xml(&xml).expect("reload");
        for text in ["aa bb zz", "ii jj", "EE ff, gg.", ""] {
            let expected = pipeline.score_document(text).expect("in-memory");
            let actual = model.predict(text).expect("pmml");
            assert_eq!(actual.category, expected.category, "text {text:?}");
            for (category, probability) in &expected.probabilities {
                let reloaded = actual.probability_of(category).expect("category");
                assert!((reloaded - probability).abs() < 1e-9, "text {text:?}");
            }
        }
    }

    #[test]
    fn sublinear_tf_is_rejected() {
        let pipeline = fitted(true);
        assert!(matches!(
            PmmlExporter::document(&pipeline),
            Err(ExportError::Unsupported(_))
        ));
    }
}

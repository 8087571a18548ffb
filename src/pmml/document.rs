//! PMML 4.4 文書のうち、テキスト分類の回帰モデルで使う要素のXMLマッピング。
//!
//! 属性は `@` 付き、要素本文は `$text` で表す。未対応の要素は読み飛ばす。
use serde::{Deserialize, Serialize};

pub const PMML_NAMESPACE: &str = "http://www.dmg.org/PMML-4_4";
pub const PMML_VERSION: &str = "4.4";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pmml {
    #[serde(rename = "@xmlns", default)]
    pub xmlns: String,
    #[serde(rename = "@version")]
    pub version: String,
    #[serde(rename = "Header")]
    pub header: Header,
    #[serde(rename = "DataDictionary")]
    pub data_dictionary: DataDictionary,
    #[serde(rename = "TransformationDictionary", default)]
    pub transformation_dictionary: TransformationDictionary,
    #[serde(rename = "RegressionModel")]
    pub regression_model: RegressionModel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    #[serde(rename = "@description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Application", default, skip_serializing_if = "Option::is_none")]
    pub application: Option<Application>,
    #[serde(rename = "Timestamp", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDictionary {
    #[serde(rename = "@numberOfFields", default, skip_serializing_if = "Option::is_none")]
    pub number_of_fields: Option<usize>,
    #[serde(rename = "DataField", default)]
    pub fields: Vec<DataField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataField {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@optype")]
    pub optype: String,
    #[serde(rename = "@dataType")]
    pub data_type: String,
    #[serde(rename = "Value", default)]
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    #[serde(rename = "@value")]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformationDictionary {
    #[serde(rename = "DerivedField", default)]
    pub derived_fields: Vec<DerivedField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedField {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@optype")]
    pub optype: String,
    #[serde(rename = "@dataType")]
    pub data_type: String,
    #[serde(rename = "Apply")]
    pub apply: Apply,
}

/// `TextIndex` と定数の積。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Apply {
    #[serde(rename = "@function")]
    pub function: String,
    #[serde(rename = "TextIndex")]
    pub text_index: TextIndex,
    #[serde(rename = "Constant", default)]
    pub constants: Vec<Constant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextIndex {
    #[serde(rename = "@textField")]
    pub text_field: String,
    #[serde(rename = "@localTermWeights", default = "default_local_term_weights")]
    pub local_term_weights: String,
    #[serde(rename = "@isCaseSensitive", default)]
    pub is_case_sensitive: bool,
    #[serde(rename = "@maxLevenshteinDistance", default)]
    pub max_levenshtein_distance: usize,
    #[serde(rename = "@wordSeparatorCharacterRE", default = "default_word_separator")]
    pub word_separator_character_re: String,
    #[serde(rename = "@tokenize", default = "default_tokenize")]
    pub tokenize: bool,
    #[serde(rename = "Constant")]
    pub term: Constant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    #[serde(rename = "@dataType", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(rename = "$text", default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionModel {
    #[serde(rename = "@functionName")]
    pub function_name: String,
    #[serde(rename = "@normalizationMethod", default = "default_normalization")]
    pub normalization_method: String,
    #[serde(rename = "MiningSchema")]
    pub mining_schema: MiningSchema,
    #[serde(rename = "Output", default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Output>,
    #[serde(rename = "RegressionTable", default)]
    pub tables: Vec<RegressionTable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningSchema {
    #[serde(rename = "MiningField", default)]
    pub fields: Vec<MiningField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningField {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@usageType", default, skip_serializing_if = "Option::is_none")]
    pub usage_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    #[serde(rename = "OutputField", default)]
    pub fields: Vec<OutputField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputField {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@optype")]
    pub optype: String,
    #[serde(rename = "@dataType")]
    pub data_type: String,
    #[serde(rename = "@feature")]
    pub feature: String,
    #[serde(rename = "@value", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTable {
    #[serde(rename = "@intercept", default)]
    pub intercept: f64,
    #[serde(rename = "@targetCategory")]
    pub target_category: String,
    #[serde(rename = "NumericPredictor", default)]
    pub predictors: Vec<NumericPredictor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericPredictor {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@exponent", default = "default_exponent", skip_serializing_if = "is_unit_exponent")]
    pub exponent: i32,
    #[serde(rename = "@coefficient")]
    pub coefficient: f64,
}

fn default_local_term_weights() -> String {
    "termFrequency".to_string()
}

fn default_word_separator() -> String {
    r"\s+".to_string()
}

fn default_tokenize() -> bool {
    true
}

fn default_normalization() -> String {
    "none".to_string()
}

fn default_exponent() -> i32 {
    1
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_unit_exponent(exponent: &i32) -> bool {
    *exponent == 1
}

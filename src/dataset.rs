//! ラベル付き文書データセットの読み込み。
//!
//! ヘッダーなしの2列CSV（`Category`, `Content`）を位置で解釈する。
use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
};

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub const CATEGORY_COLUMN: &str = "Category";
pub const CONTENT_COLUMN: &str = "Content";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset file not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("failed to open dataset {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed CSV record {record}: {source}")]
    Csv {
        record: usize,
        #[source]
        source: csv::Error,
    },
    #[error("record {record} has no Category column")]
    MissingColumn { record: usize },
    #[error("dataset contains no records")]
    Empty,
}

/// 1文書分のレコード。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub category: String,
    pub content: String,
}

impl Record {
    #[must_use]
    pub fn new(category: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            content: content.into(),
        }
    }
}

/// 読み込み順を保持した文書集合。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    records: Vec<Record>,
}

impl Dataset {
    /// CSVファイルからデータセットを読み込む。
    ///
    /// # Errors
    /// ファイルが存在しない、CSVとして壊れている、またはレコードが1件もない場合はエラーを返す。
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                DatasetError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                DatasetError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let dataset = Self::from_reader(BufReader::new(file))?;
        info!(
            path = %path.display(),
            records = dataset.len(),
            categories = dataset.categories().len(),
            "dataset loaded"
        );
        Ok(dataset)
    }

    /// 任意のリーダーからヘッダーなしCSVを読み込む。
    ///
    /// 2列目が欠けている行は空の本文として扱い、3列目以降は無視する。
    ///
    /// # Errors
    /// CSVの解析に失敗した場合、カテゴリ列がない場合、レコードが空の場合はエラーを返す。
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut records = Vec::new();
        for (index, result) in csv_reader.records().enumerate() {
            let record = index + 1;
            let row = result.map_err(|source| DatasetError::Csv { record, source })?;
            let category = row
                .get(0)
                .ok_or(DatasetError::MissingColumn { record })?
                .to_string();
            let content = row.get(1).unwrap_or_default().to_string();
            records.push(Record { category, content });
        }

        if records.is_empty() {
            return Err(DatasetError::Empty);
        }
        Ok(Self { records })
    }

    #[must_use]
    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    /// 本文列を文字列として返す。
    #[must_use]
    pub fn contents(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.content.as_str()).collect()
    }

    #[must_use]
    pub fn categories(&self) -> Categories {
        Categories::from_labels(self.records.iter().map(|r| r.category.as_str()))
    }

    /// カテゴリ集合と、各レコードのカテゴリ番号を返す。
    #[must_use]
    pub fn encoded_labels(&self) -> (Categories, Vec<usize>) {
        let categories = self.categories();
        let labels = self
            .records
            .iter()
            .filter_map(|r| categories.index_of(&r.category))
            .collect();
        (categories, labels)
    }
}

/// ソート済みのカテゴリ名一覧。ラベルはこの一覧への添字で表す。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Categories {
    names: Vec<String>,
}

impl Categories {
    #[must_use]
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = labels
            .into_iter()
            .map(|label| label.as_ref().to_string())
            .collect();
        names.sort_unstable();
        names.dedup();
        Self { names }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names
            .binary_search_by(|candidate| candidate.as_str().cmp(name))
            .ok()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_headerless_two_column_csv() {
        let raw = "BILL,aa bb cc\nBINDER,dd ee\nBILL,ff\n";
        let dataset = Dataset::from_reader(raw.as_bytes()).expect("dataset parses");

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.get(1), Some(&Record::new("BINDER", "dd ee")));
        assert_eq!(dataset.categories().names(), &["BILL", "BINDER"]);
    }

    #[test]
    fn missing_content_becomes_empty_text() {
        let raw = "BILL,aa\nPOLICY CHANGE\n";
        let dataset = Dataset::from_reader(raw.as_bytes()).expect("dataset parses");

        assert_eq!(dataset.get(1).map(|r| r.content.as_str()), Some(""));
    }

    #[test]
    fn encoded_labels_follow_sorted_categories() {
        let dataset = Dataset::from_records(vec![
            Record::new("c", "x"),
            Record::new("a", "y"),
            Record::new("b", "z"),
            Record::new("a", "w"),
        ]);

        let (categories, labels) = dataset.encoded_labels();

        assert_eq!(categories.names(), &["a", "b", "c"]);
        assert_eq!(labels, vec![2, 0, 1, 0]);
    }

    #[test]
    fn empty_input_is_rejected() {
        let error = Dataset::from_reader("".as_bytes()).expect_err("empty dataset");
        assert!(matches!(error, DatasetError::Empty));
    }

    #[test]
    fn missing_file_reports_not_found() {
        let error = Dataset::from_csv_path("/definitely/not/here.csv").expect_err("missing file");
        assert!(matches!(error, DatasetError::NotFound { .. }));
    }
}

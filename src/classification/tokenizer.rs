//! 区切り文字の正規表現で本文をトークン列に分割する。
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// 既定の単語区切り。空白の連続。
pub const DEFAULT_WORD_SEPARATOR: &str = r"\s+";

fn normalize_text(input: &str) -> String {
    input.nfc().collect::<String>()
}

/// トークン両端のASCII句読点を取り除く。
#[must_use]
pub fn strip_punctuation(token: &str) -> &str {
    token.trim_matches(|c: char| c.is_ascii_punctuation())
}

/// 正規表現ベースのトークナイザ。
///
/// 入力をNFC正規化・前後空白除去したうえで区切り文字で分割し、
/// 各トークンの両端の句読点を削って空トークンを捨てる。
/// 大文字小文字の扱いは呼び出し側（ベクトライザ）が決める。
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Splitter {
    separator: Regex,
}

impl Splitter {
    /// # Errors
    /// 正規表現として不正なパターンの場合はエラーを返す。
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            separator: Regex::new(pattern)?,
        })
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        self.separator.as_str()
    }

    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        let normalized = normalize_text(text);
        self.separator
            .split(normalized.trim())
            .map(strip_punctuation)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Default for Splitter {
    fn default() -> Self {
        Self {
            separator: Regex::new(DEFAULT_WORD_SEPARATOR).expect("compile word separator"),
        }
    }
}

impl PartialEq for Splitter {
    fn eq(&self, other: &Self) -> bool {
        self.pattern() == other.pattern()
    }
}

impl fmt::Debug for Splitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Splitter")
            .field("separator", &self.pattern())
            .finish()
    }
}

impl TryFrom<String> for Splitter {
    type Error = regex::Error;

    fn try_from(pattern: String) -> Result<Self, Self::Error> {
        Self::new(&pattern)
    }
}

impl From<Splitter> for String {
    fn from(splitter: Splitter) -> Self {
        splitter.pattern().to_string()
    }
}

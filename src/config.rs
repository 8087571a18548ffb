use std::{env, net::SocketAddr, num::NonZeroUsize, path::PathBuf};

use thiserror::Error;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

pub const DEFAULT_DATASET_PATH: &str = "./document-classification-test/shuffled-full-set-hashed.csv";
pub const DEFAULT_NATIVE_ARTIFACT: &str = "model.pkl";
pub const DEFAULT_PMML_ARTIFACT: &str = "doc_classify.pmml";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    dataset_path: PathBuf,
    native_artifact_path: PathBuf,
    pmml_artifact_path: PathBuf,
    cv_folds: usize,
    test_size: f64,
    random_seed: u64,
    select_k: NonZeroUsize,
    top_terms: usize,
    smoke_row: usize,
    interactive: bool,
    api_bind: SocketAddr,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// 環境変数から実験・配信の設定値を読み込み、検証する。
    ///
    /// 必須の環境変数はなく、未設定の項目は既定値になる。
    ///
    /// # Errors
    /// 数値／アドレスのパースや範囲検証に失敗した場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let dataset_path = parse_path("DOC_CLASSIFIER_DATASET_PATH", DEFAULT_DATASET_PATH);
        let native_artifact_path =
            parse_path("DOC_CLASSIFIER_NATIVE_ARTIFACT", DEFAULT_NATIVE_ARTIFACT);
        let pmml_artifact_path = parse_path("DOC_CLASSIFIER_PMML_ARTIFACT", DEFAULT_PMML_ARTIFACT);

        // Evaluation settings
        let cv_folds = parse_usize("DOC_CLASSIFIER_CV_FOLDS", 5)?;
        if cv_folds < 2 {
            return Err(ConfigError::Invalid {
                name: "DOC_CLASSIFIER_CV_FOLDS",
                source: anyhow::anyhow!("at least 2 folds are required, got {cv_folds}"),
            });
        }
        let test_size = parse_fraction("DOC_CLASSIFIER_TEST_SIZE", 0.2)?;
        let random_seed = parse_u64("DOC_CLASSIFIER_RANDOM_SEED", 0)?;

        // Export settings
        let select_k = parse_non_zero_usize("DOC_CLASSIFIER_SELECT_K", 1000)?;
        let top_terms = parse_usize("DOC_CLASSIFIER_TOP_TERMS", 2)?;
        let smoke_row = parse_usize("DOC_CLASSIFIER_SMOKE_ROW", 13605)?;

        let interactive = parse_bool("DOC_CLASSIFIER_INTERACTIVE", true)?;
        let api_bind = parse_socket_addr("DOC_CLASSIFIER_API_BIND", "0.0.0.0:8080")?;

        Ok(Self {
            dataset_path,
            native_artifact_path,
            pmml_artifact_path,
            cv_folds,
            test_size,
            random_seed,
            select_k,
            top_terms,
            smoke_row,
            interactive,
            api_bind,
        })
    }

    #[must_use]
    pub fn with_pmml_artifact_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.pmml_artifact_path = path.into();
        self
    }

    #[must_use]
    pub fn with_api_bind(mut self, bind: SocketAddr) -> Self {
        self.api_bind = bind;
        self
    }

    #[must_use]
    pub fn dataset_path(&self) -> &PathBuf {
        &self.dataset_path
    }

    #[must_use]
    pub fn native_artifact_path(&self) -> &PathBuf {
        &self.native_artifact_path
    }

    #[must_use]
    pub fn pmml_artifact_path(&self) -> &PathBuf {
        &self.pmml_artifact_path
    }

    #[must_use]
    pub fn cv_folds(&self) -> usize {
        self.cv_folds
    }

    #[must_use]
    pub fn test_size(&self) -> f64 {
        self.test_size
    }

    #[must_use]
    pub fn random_seed(&self) -> u64 {
        self.random_seed
    }

    #[must_use]
    pub fn select_k(&self) -> NonZeroUsize {
        self.select_k
    }

    #[must_use]
    pub fn top_terms(&self) -> usize {
        self.top_terms
    }

    #[must_use]
    pub fn smoke_row(&self) -> usize {
        self.smoke_row
    }

    #[must_use]
    pub fn interactive(&self) -> bool {
        self.interactive
    }

    #[must_use]
    pub fn api_bind(&self) -> SocketAddr {
        self.api_bind
    }
}

fn parse_path(name: &'static str, default: &str) -> PathBuf {
    env::var(name).map_or_else(|_| PathBuf::from(default), PathBuf::from)
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<SocketAddr>()
        .map_err(|error| ConfigError::Invalid {
            name,
            source: anyhow::Error::new(error),
        })
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let value = parse_usize(name, default)?;
    NonZeroUsize::new(value).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("must be greater than zero"),
    })
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_fraction(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.parse::<f64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    if !(parsed > 0.0 && parsed < 1.0) {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("value must be strictly between 0 and 1, got {raw}"),
        });
    }
    Ok(parsed)
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("invalid boolean value: {raw}"),
        }),
    }
}

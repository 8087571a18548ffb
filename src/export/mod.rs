//! 学習済みパイプラインの成果物書き出し。
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::{
    classification::{TextPipeline, pipeline::TextPipelineError},
    pmml::PmmlError,
};

mod native;
mod portable;

pub use native::{NATIVE_FORMAT_VERSION, NativeArtifact, NativeExporter};
pub use portable::PmmlExporter;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write artifact {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode native artifact: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode native artifact: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("native artifact format {found} is not supported (expected {expected})")]
    IncompatibleFormat { found: u32, expected: u32 },
    #[error(transparent)]
    Pipeline(#[from] TextPipelineError),
    #[error(transparent)]
    Pmml(#[from] PmmlError),
    #[error("pipeline cannot be expressed as PMML: {0}")]
    Unsupported(String),
}

/// 書き出した成果物の情報。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactInfo {
    pub format: &'static str,
    pub path: PathBuf,
    pub bytes: u64,
}

/// 学習済みパイプラインを1つの形式で書き出す。
pub trait ArtifactExporter {
    fn format(&self) -> &'static str;

    fn path(&self) -> &Path;

    /// # Errors
    /// 変換・書き込みに失敗した場合はエラーを返す。
    fn export(&self, pipeline: &TextPipeline) -> Result<ArtifactInfo, ExportError>;
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError + '_ {
    move |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

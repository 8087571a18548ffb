//! bincode によるネイティブ成果物。
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ArtifactExporter, ArtifactInfo, ExportError, io_error};
use crate::classification::TextPipeline;

pub const NATIVE_FORMAT_VERSION: u32 = 1;

/// 学習済みパイプラインとそのメタデータ。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeArtifact {
    pub format_version: u32,
    pub crate_version: String,
    pub trained_at: DateTime<Utc>,
    pub pipeline: TextPipeline,
}

/// 書き出し用の借用版。フィールド順は [`NativeArtifact`] と一致させる。
#[derive(Serialize)]
struct ArtifactRef<'a> {
    format_version: u32,
    crate_version: &'a str,
    trained_at: DateTime<Utc>,
    pipeline: &'a TextPipeline,
}

#[derive(Debug, Clone)]
pub struct NativeExporter {
    path: PathBuf,
}

impl NativeExporter {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 書き出した成果物を読み戻す。
    ///
    /// # Errors
    /// 読み込み・復号に失敗した場合、または形式の版が異なる場合はエラーを返す。
    pub fn read(path: impl AsRef<Path>) -> Result<NativeArtifact, ExportError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(io_error(path))?;
        let mut reader = BufReader::new(file);
        let artifact: NativeArtifact =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;
        if artifact.format_version != NATIVE_FORMAT_VERSION {
            return Err(ExportError::IncompatibleFormat {
                found: artifact.format_version,
                expected: NATIVE_FORMAT_VERSION,
            });
        }
        Ok(artifact)
    }
}

impl ArtifactExporter for NativeExporter {
    fn format(&self) -> &'static str {
        "native"
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn export(&self, pipeline: &TextPipeline) -> Result<ArtifactInfo, ExportError> {
        let artifact = ArtifactRef {
            format_version: NATIVE_FORMAT_VERSION,
            crate_version: env!("CARGO_PKG_VERSION"),
            trained_at: Utc::now(),
            pipeline,
        };

        let bytes = {
            let file = File::create(&self.path).map_err(io_error(&self.path))?;
            let mut writer = BufWriter::new(file);
            let written =
                bincode::serde::encode_into_std_write(&artifact, &mut writer, bincode::config::standard())?;
            writer.flush().map_err(io_error(&self.path))?;
            written as u64
        };

        info!(path = %self.path.display(), bytes, "native artifact written");
        Ok(ArtifactInfo {
            format: self.format(),
            path: self.path.clone(),
            bytes,
        })
    }
}

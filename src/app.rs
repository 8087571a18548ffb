use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::{api, config::Config, observability::Telemetry, pmml::PmmlModel};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

/// 採点 API が共有する読み取り専用の部品。
pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    model: Arc<PmmlModel>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn model(&self) -> Arc<PmmlModel> {
        Arc::clone(&self.registry.model)
    }
}

impl ComponentRegistry {
    /// 設定にある PMML 成果物を読み込み、テレメトリを初期化する。
    ///
    /// # Errors
    /// テレメトリの初期化、またはモデルの読み込みに失敗した場合はエラーを返す。
    pub fn build(config: Config) -> Result<Self> {
        let telemetry = Telemetry::new()?;
        let model = load_model(config.pmml_artifact_path())?;
        Ok(Self::from_parts(config, telemetry, model))
    }

    /// 読み込み済みのモデルから組み立てる。
    #[must_use]
    pub fn from_parts(config: Config, telemetry: Telemetry, model: PmmlModel) -> Self {
        telemetry
            .metrics()
            .model_terms
            .set(i64::try_from(model.term_count()).unwrap_or(i64::MAX));
        Self {
            config: Arc::new(config),
            telemetry,
            model: Arc::new(model),
        }
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn model(&self) -> &PmmlModel {
        &self.model
    }
}

fn load_model(path: &Path) -> Result<PmmlModel> {
    PmmlModel::from_file(path)
        .with_context(|| format!("failed to load PMML model from {}", path.display()))
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state).layer(TraceLayer::new_for_http())
}

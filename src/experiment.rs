//! 読み込み → 特徴抽出 → モデル比較 → 評価 → 書き出し の5段を順に実行する。
//!
//! 各段は明示的な入出力の構造体を受け渡し、図は [`ReportSink`] に渡す。
use std::path::{Path, PathBuf};

use ndarray::{Array2, Axis};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::{
    classification::{
        Classifier, CorrelatedTerms, FeatureError, LogisticParams, LogisticRegression, ModelError,
        ModelSpec, PipelineConfig, Prediction, SelectionError, Splitter, TextPipeline,
        TfidfVectorizer, VectorizerConfig, most_correlated_terms, pipeline::TextPipelineError,
    },
    config::{Config, ConfigError},
    dataset::{Categories, Dataset, DatasetError},
    evaluation::{
        ClassificationMetrics, ConfusionMatrix, CvEntry, EvaluationError, NormalizedConfusion,
        accuracy, compare_models, cross_val_score, train_test_split,
    },
    export::{ArtifactExporter, ArtifactInfo, ExportError, NativeExporter, PmmlExporter},
    pmml::{PmmlError, PmmlModel},
    report::{BoxStats, ReportError, ReportSink, summarize},
};

/// 再読み込みした PMML と学習済みパイプラインの確率の許容差。
pub const SMOKE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    TextPipeline(#[from] TextPipelineError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Pmml(#[from] PmmlError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("smoke row {row} is outside the dataset of {len} rows")]
    RowOutOfRange { row: usize, len: usize },
    #[error("reloaded PMML model disagrees with the fitted pipeline by {delta} (tolerance {tolerance})")]
    PortableMismatch { delta: f64, tolerance: f64 },
    #[error("reloaded PMML model predicted unknown category `{0}`")]
    UnknownCategory(String),
}

/// 実験1回分の設定。
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentConfig {
    pub dataset_path: PathBuf,
    pub native_artifact_path: PathBuf,
    pub pmml_artifact_path: PathBuf,
    pub cv_folds: usize,
    pub test_size: f64,
    pub random_seed: u64,
    pub top_terms: usize,
    pub smoke_row: usize,
    pub exploratory: VectorizerConfig,
    /// 配布用パイプライン（`select_k` を含む）。
    pub export: PipelineConfig,
}

impl ExperimentConfig {
    /// 既定値で、成果物を `artifact_dir` に書き出す設定。
    #[must_use]
    pub fn new(dataset_path: impl Into<PathBuf>, artifact_dir: impl AsRef<Path>) -> Self {
        let artifact_dir = artifact_dir.as_ref();
        Self {
            dataset_path: dataset_path.into(),
            native_artifact_path: artifact_dir.join(crate::config::DEFAULT_NATIVE_ARTIFACT),
            pmml_artifact_path: artifact_dir.join(crate::config::DEFAULT_PMML_ARTIFACT),
            cv_folds: 5,
            test_size: 0.2,
            random_seed: 0,
            top_terms: 2,
            smoke_row: 13605,
            exploratory: VectorizerConfig::exploratory(),
            export: PipelineConfig::export(1000),
        }
    }

    /// # Errors
    /// 環境変数の検証に失敗した場合はエラーを返す。
    pub fn from_env() -> Result<Self, PipelineError> {
        Ok(Self::from(&Config::from_env()?))
    }
}

impl From<&Config> for ExperimentConfig {
    fn from(config: &Config) -> Self {
        Self {
            dataset_path: config.dataset_path().clone(),
            native_artifact_path: config.native_artifact_path().clone(),
            pmml_artifact_path: config.pmml_artifact_path().clone(),
            cv_folds: config.cv_folds(),
            test_size: config.test_size(),
            random_seed: config.random_seed(),
            top_terms: config.top_terms(),
            smoke_row: config.smoke_row(),
            exploratory: VectorizerConfig::exploratory(),
            export: PipelineConfig::export(config.select_k().get()),
        }
    }
}

/// 読み込み段の出力。
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub dataset: Dataset,
    pub categories: Categories,
    pub labels: Vec<usize>,
}

/// 特徴抽出段の出力。
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub features: Array2<f64>,
    pub feature_names: Vec<String>,
    pub correlated_terms: Vec<CorrelatedTerms>,
}

impl FeatureSet {
    /// `(文書数, 語彙数)`
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.features.dim()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub entries: Vec<CvEntry>,
    pub summary: Vec<(String, BoxStats)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    /// 評価側に回した行番号（元データ基準）。
    pub held_out: Vec<usize>,
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
    pub normalized: NormalizedConfusion,
    pub metrics: ClassificationMetrics,
    /// 学習側での交差検証。
    pub cv_scores: Vec<f64>,
    pub cv_mean: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SmokeTest {
    pub row: usize,
    pub expected: Prediction,
    pub reloaded: Prediction,
    pub max_delta: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub native: ArtifactInfo,
    pub pmml: ArtifactInfo,
    pub smoke: SmokeTest,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    pub run_id: Uuid,
    pub shape: (usize, usize),
    pub comparison: ComparisonReport,
    pub evaluation: EvaluationReport,
    pub export: ExportReport,
}

/// 実験の実行器。
pub struct Experiment<S: ReportSink> {
    config: ExperimentConfig,
    sink: S,
}

impl<S: ReportSink> Experiment<S> {
    #[must_use]
    pub fn new(config: ExperimentConfig, sink: S) -> Self {
        Self { config, sink }
    }

    #[must_use]
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    #[must_use]
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// 5段を順に実行する。最初に失敗した段で中断する。
    ///
    /// # Errors
    /// いずれかの段が失敗した場合はその段のエラーを返す。
    pub fn run(&mut self) -> Result<ExperimentReport, PipelineError> {
        let run_id = Uuid::now_v7();
        let span = info_span!("experiment", run_id = %run_id);
        let _guard = span.enter();
        info!(dataset = %self.config.dataset_path.display(), "experiment started");

        let loaded = self.load()?;
        let features = self.extract(&loaded)?;
        let comparison = self.compare(&features, &loaded.labels)?;
        let evaluation = self.evaluate(&features, &loaded)?;
        let export = self.export(&loaded)?;

        info!(
            held_out_accuracy = evaluation.accuracy,
            smoke_category = %export.smoke.reloaded.category,
            "experiment finished"
        );
        Ok(ExperimentReport {
            run_id,
            shape: features.shape(),
            comparison,
            evaluation,
            export,
        })
    }

    /// # Errors
    /// CSV の読み込みに失敗した場合はエラーを返す。
    pub fn load(&self) -> Result<LoadedData, PipelineError> {
        let dataset = Dataset::from_csv_path(&self.config.dataset_path)?;
        let (categories, labels) = dataset.encoded_labels();
        info!(rows = dataset.len(), categories = categories.len(), "labels encoded");
        Ok(LoadedData {
            dataset,
            categories,
            labels,
        })
    }

    /// 探索用 TF-IDF 行列を作り、カテゴリごとの相関語を報告する。
    ///
    /// # Errors
    /// 語彙が作れない場合、または報告先への出力に失敗した場合はエラーを返す。
    pub fn extract(&mut self, loaded: &LoadedData) -> Result<FeatureSet, PipelineError> {
        let contents = loaded.dataset.contents();
        let mut vectorizer = TfidfVectorizer::new(self.config.exploratory.clone(), Splitter::default());
        let features = vectorizer.fit_transform(&contents)?;
        let feature_names = vectorizer.feature_names()?.to_vec();
        info!(rows = features.nrows(), columns = features.ncols(), "feature matrix built");

        let correlated_terms = most_correlated_terms(
            features.view(),
            &loaded.labels,
            &loaded.categories,
            &feature_names,
            self.config.top_terms,
        )?;
        self.sink.correlated_terms(&correlated_terms)?;

        Ok(FeatureSet {
            features,
            feature_names,
            correlated_terms,
        })
    }

    /// # Errors
    /// 交差検証に失敗した場合、または報告先への出力に失敗した場合はエラーを返す。
    pub fn compare(&mut self, features: &FeatureSet, labels: &[usize]) -> Result<ComparisonReport, PipelineError> {
        let entries = compare_models(
            &ModelSpec::comparison_suite(),
            features.features.view(),
            labels,
            self.config.cv_folds,
            self.config.random_seed,
        )?;
        self.sink.model_comparison(&entries)?;
        let summary = summarize(&entries);
        Ok(ComparisonReport { entries, summary })
    }

    /// ホールドアウト評価と学習側の交差検証。
    ///
    /// # Errors
    /// 分割・学習・集計のいずれか、または報告先への出力に失敗した場合はエラーを返す。
    pub fn evaluate(&mut self, features: &FeatureSet, loaded: &LoadedData) -> Result<EvaluationReport, PipelineError> {
        let labels = &loaded.labels;
        let split = train_test_split(labels.len(), self.config.test_size, self.config.random_seed)?;

        let x_train = features.features.select(Axis(0), &split.train);
        let y_train: Vec<usize> = split.train.iter().map(|&row| labels[row]).collect();
        let x_test = features.features.select(Axis(0), &split.test);
        let y_test: Vec<usize> = split.test.iter().map(|&row| labels[row]).collect();

        let mut model = LogisticRegression::new(LogisticParams::default());
        model.fit(x_train.view(), &y_train)?;
        let predicted = model.predict(x_test.view())?;

        let held_out_accuracy = accuracy(&y_test, &predicted)?;
        let confusion = ConfusionMatrix::from_labels(&y_test, &predicted, loaded.categories.len())?;
        let normalized = confusion.normalized();
        let metrics = ClassificationMetrics::from(&confusion);
        info!(
            test = y_test.len(),
            accuracy = held_out_accuracy,
            macro_f1 = metrics.macro_f1,
            "held-out evaluation finished"
        );

        let seed = self.config.random_seed;
        let cv_scores = cross_val_score(
            || ModelSpec::LogisticRegression.build(seed),
            x_train.view(),
            &y_train,
            self.config.cv_folds,
        )?;
        let cv_mean = cv_scores.iter().sum::<f64>() / cv_scores.len() as f64;

        self.sink.confusion_heatmap(&loaded.categories, &normalized)?;

        Ok(EvaluationReport {
            held_out: split.test,
            accuracy: held_out_accuracy,
            confusion,
            normalized,
            metrics,
            cv_scores,
            cv_mean,
        })
    }

    /// 全データで配布用パイプラインを学習し、両形式で書き出して PMML を検証する。
    ///
    /// # Errors
    /// 学習・書き出し・再読み込みのいずれかに失敗した場合、
    /// または再読み込みしたモデルの確率が許容差を超えて異なる場合はエラーを返す。
    pub fn export(&mut self, loaded: &LoadedData) -> Result<ExportReport, PipelineError> {
        let contents = loaded.dataset.contents();
        let pipeline = TextPipeline::fit(
            &self.config.export,
            &contents,
            &loaded.labels,
            loaded.categories.clone(),
        )?;

        let native = NativeExporter::new(&self.config.native_artifact_path).export(&pipeline)?;
        let pmml_exporter = PmmlExporter::new(&self.config.pmml_artifact_path);
        let pmml = pmml_exporter.export(&pipeline)?;

        let reloaded_model = PmmlModel::from_file(pmml_exporter.path())?;
        let smoke = smoke_test(&pipeline, &reloaded_model, loaded, self.config.smoke_row)?;
        info!(
            row = smoke.row,
            category = %smoke.reloaded.category,
            confidence = smoke.reloaded.confidence,
            max_delta = smoke.max_delta,
            "PMML smoke test passed"
        );

        Ok(ExportReport { native, pmml, smoke })
    }
}

/// 1行を両方のモデルで採点し、カテゴリと確率の一致を確かめる。
///
/// # Errors
/// 行が範囲外、未知のカテゴリ、または確率差が [`SMOKE_TOLERANCE`] を超える場合はエラーを返す。
pub fn smoke_test(
    pipeline: &TextPipeline,
    model: &PmmlModel,
    loaded: &LoadedData,
    row: usize,
) -> Result<SmokeTest, PipelineError> {
    let record = loaded.dataset.get(row).ok_or(PipelineError::RowOutOfRange {
        row,
        len: loaded.dataset.len(),
    })?;
    let expected = pipeline.score_document(&record.content)?;
    let reloaded = model.predict(&record.content)?;
    if !loaded.categories.contains(&reloaded.category) {
        return Err(PipelineError::UnknownCategory(reloaded.category));
    }

    let mut max_delta: f64 = 0.0;
    for (category, probability) in &expected.probabilities {
        let other = reloaded
            .probability_of(category)
            .ok_or_else(|| PipelineError::UnknownCategory(category.clone()))?;
        max_delta = max_delta.max((other - probability).abs());
    }
    if max_delta > SMOKE_TOLERANCE {
        warn!(row, max_delta, "PMML model disagrees with the fitted pipeline");
        return Err(PipelineError::PortableMismatch {
            delta: max_delta,
            tolerance: SMOKE_TOLERANCE,
        });
    }
    Ok(SmokeTest {
        row,
        expected,
        reloaded,
        max_delta,
    })
}

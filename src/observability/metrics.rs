/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Histogram, IntGauge, Registry, register_counter_with_registry,
    register_histogram_with_registry, register_int_gauge_with_registry,
};
use std::sync::Arc;

/// 採点 API のメトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    pub predictions_total: Counter,
    pub prediction_failures_total: Counter,
    pub prediction_duration: Histogram,
    pub model_terms: IntGauge,
}

impl Metrics {
    /// # Errors
    /// 同名のメトリクスが登録済みの場合はエラーを返す。
    pub fn new(registry: &Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            predictions_total: register_counter_with_registry!(
                "doc_classifier_predictions_total",
                "Total number of documents scored",
                registry
            )?,
            prediction_failures_total: register_counter_with_registry!(
                "doc_classifier_prediction_failures_total",
                "Number of rejected or failed prediction requests",
                registry
            )?,
            prediction_duration: register_histogram_with_registry!(
                "doc_classifier_prediction_duration_seconds",
                "Time spent scoring one document",
                vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5],
                registry
            )?,
            model_terms: register_int_gauge_with_registry!(
                "doc_classifier_model_terms",
                "Number of tf-idf terms in the loaded PMML model",
                registry
            )?,
        })
    }
}

//! 実験結果の可視化・出力先。
//!
//! 対話端末では図を描画してキー入力を待ち、非対話環境ではログに同じ内容を出す。
use std::io;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::{
    classification::CorrelatedTerms,
    dataset::Categories,
    evaluation::{CvEntry, NormalizedConfusion},
};

mod terminal;

pub use terminal::TerminalSink;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Io(#[from] io::Error),
}

/// 実験の各段が結果を渡す先。
pub trait ReportSink {
    /// # Errors
    /// 出力に失敗した場合はエラーを返す。
    fn correlated_terms(&mut self, terms: &[CorrelatedTerms]) -> Result<(), ReportError>;

    /// 交差検証結果の箱ひげ図＋個別点。
    ///
    /// # Errors
    /// 出力に失敗した場合はエラーを返す。
    fn model_comparison(&mut self, entries: &[CvEntry]) -> Result<(), ReportError>;

    /// 行 = 正解、列 = 予測 のヒートマップ。
    ///
    /// # Errors
    /// 出力に失敗した場合はエラーを返す。
    fn confusion_heatmap(
        &mut self,
        categories: &Categories,
        normalized: &NormalizedConfusion,
    ) -> Result<(), ReportError>;
}

/// ログだけに出力するシンク。
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessSink;

impl ReportSink for HeadlessSink {
    fn correlated_terms(&mut self, terms: &[CorrelatedTerms]) -> Result<(), ReportError> {
        for entry in terms {
            info!(
                category = %entry.category,
                unigrams = ?entry.unigrams,
                bigrams = ?entry.bigrams,
                "most correlated terms"
            );
        }
        Ok(())
    }

    fn model_comparison(&mut self, entries: &[CvEntry]) -> Result<(), ReportError> {
        for (model, stats) in summarize(entries) {
            info!(
                model = %model,
                min = stats.min,
                q1 = stats.q1,
                median = stats.median,
                q3 = stats.q3,
                max = stats.max,
                mean = stats.mean,
                "model comparison"
            );
        }
        Ok(())
    }

    fn confusion_heatmap(
        &mut self,
        categories: &Categories,
        normalized: &NormalizedConfusion,
    ) -> Result<(), ReportError> {
        for (name, row) in categories.iter().zip(&normalized.rows) {
            match row {
                Some(values) => info!(category = %name, row = ?values, "normalized confusion row"),
                None => info!(category = %name, "normalized confusion row has no support"),
            }
        }
        Ok(())
    }
}

/// 箱ひげ図用の要約統計量。四分位は線形補間。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoxStats {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
}

impl BoxStats {
    #[must_use]
    pub fn from_scores(scores: &[f64]) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }
        let mut sorted = scores.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
        Some(Self {
            min: sorted[0],
            q1: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q3: quantile(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
            mean,
        })
    }
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// モデル名の出現順に分割ごとの正解率をまとめる。
#[must_use]
pub fn summarize(entries: &[CvEntry]) -> Vec<(String, BoxStats)> {
    let mut grouped: Vec<(String, Vec<f64>)> = Vec::new();
    for entry in entries {
        match grouped.iter_mut().find(|(name, _)| *name == entry.model_name) {
            Some((_, scores)) => scores.push(entry.accuracy),
            None => grouped.push((entry.model_name.clone(), vec![entry.accuracy])),
        }
    }
    grouped
        .into_iter()
        .filter_map(|(name, scores)| BoxStats::from_scores(&scores).map(|stats| (name, stats)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(model: &str, fold_idx: usize, accuracy: f64) -> CvEntry {
        CvEntry {
            model_name: model.to_string(),
            fold_idx,
            accuracy,
        }
    }

    #[test]
    fn box_stats_interpolate_quartiles() {
        let stats = BoxStats::from_scores(&[0.9, 0.7, 0.8, 1.0, 0.6]).expect("stats");
        assert!((stats.min - 0.6).abs() < 1e-12);
        assert!((stats.q1 - 0.7).abs() < 1e-12);
        assert!((stats.median - 0.8).abs() < 1e-12);
        assert!((stats.q3 - 0.9).abs() < 1e-12);
        assert!((stats.mean - 0.8).abs() < 1e-12);

        let even = BoxStats::from_scores(&[1.0, 2.0, 3.0, 4.0]).expect("stats");
        assert!((even.q1 - 1.75).abs() < 1e-12);
        assert!((even.median - 2.5).abs() < 1e-12);
        assert!(BoxStats::from_scores(&[]).is_none());
    }

    #[test]
    fn summarize_keeps_model_order() {
        let entries = vec![
            entry("LinearSVC", 0, 0.8),
            entry("MultinomialNB", 0, 0.6),
            entry("LinearSVC", 1, 0.9),
        ];
        let summary = summarize(&entries);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].0, "LinearSVC");
        assert!((summary[0].1.mean - 0.85).abs() < 1e-12);
        assert_eq!(summary[1].0, "MultinomialNB");
    }

    #[test]
    fn headless_sink_accepts_every_report() {
        let mut sink = HeadlessSink;
        let categories = Categories::from_labels(["a", "b"]);
        let normalized = NormalizedConfusion {
            rows: vec![Some(vec![100.0, 0.0]), None],
        };
        sink.correlated_terms(&[]).expect("terms");
        sink.model_comparison(&[entry("LinearSVC", 0, 1.0)]).expect("comparison");
        sink.confusion_heatmap(&categories, &normalized).expect("heatmap");
    }
}

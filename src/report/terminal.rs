//! 端末への描画。
use console::{Alignment, Key, Term, pad_str, style};

use super::{BoxStats, ReportError, ReportSink, summarize};
use crate::{
    classification::CorrelatedTerms,
    dataset::Categories,
    evaluation::{CvEntry, NormalizedConfusion},
};

const PLOT_WIDTH: usize = 48;
const LABEL_WIDTH: usize = 20;
const CELL_WIDTH: usize = 6;

/// 標準出力の端末に図を描くシンク。
///
/// `interactive` かつ端末に接続されている場合、図ごとにキー入力を待つ。
#[derive(Debug)]
pub struct TerminalSink {
    term: Term,
    interactive: bool,
}

impl TerminalSink {
    #[must_use]
    pub fn new(interactive: bool) -> Self {
        Self {
            term: Term::stdout(),
            interactive,
        }
    }

    fn emit(&self, lines: &[String]) -> Result<(), ReportError> {
        for line in lines {
            self.term.write_line(line)?;
        }
        self.pause()
    }

    fn pause(&self) -> Result<(), ReportError> {
        if !(self.interactive && self.term.is_term()) {
            return Ok(());
        }
        self.term
            .write_line(&style("press any key to continue").dim().to_string())?;
        loop {
            match self.term.read_key()? {
                Key::Unknown => {}
                _ => break,
            }
        }
        Ok(())
    }
}

impl ReportSink for TerminalSink {
    fn correlated_terms(&mut self, terms: &[CorrelatedTerms]) -> Result<(), ReportError> {
        let mut lines = Vec::with_capacity(terms.len() * 3);
        for entry in terms {
            lines.push(format!("# '{}':", style(&entry.category).bold()));
            lines.push(format!("  . Most correlated unigrams: {}", entry.unigrams.join(", ")));
            lines.push(format!("  . Most correlated bigrams: {}", entry.bigrams.join(", ")));
        }
        self.term.write_line(&style("Most correlated terms").underlined().to_string())?;
        for line in &lines {
            self.term.write_line(line)?;
        }
        Ok(())
    }

    fn model_comparison(&mut self, entries: &[CvEntry]) -> Result<(), ReportError> {
        let mut lines = vec![style("Cross-validation accuracy").underlined().to_string()];
        lines.extend(render_comparison(entries));
        self.emit(&lines)
    }

    fn confusion_heatmap(
        &mut self,
        categories: &Categories,
        normalized: &NormalizedConfusion,
    ) -> Result<(), ReportError> {
        let mut lines = vec![
            style("Confusion matrix (% of true label, rows = true, columns = predicted)")
                .underlined()
                .to_string(),
        ];
        lines.extend(render_heatmap(categories, normalized));
        self.emit(&lines)
    }
}

/// 全モデル共通の軸で箱ひげ図と各分割の点を描く。
pub(crate) fn render_comparison(entries: &[CvEntry]) -> Vec<String> {
    let summary = summarize(entries);
    let (low, high) = summary.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, s)| {
        (lo.min(s.min), hi.max(s.max))
    });
    if summary.is_empty() {
        return vec!["(no cross-validation results)".to_string()];
    }
    let span = if high > low { high - low } else { 1.0 };
    let column = |value: f64| (((value - low) / span) * (PLOT_WIDTH - 1) as f64).round() as usize;

    let mut lines = Vec::with_capacity(summary.len() * 2 + 1);
    for (model, stats) in &summary {
        let label = pad_str(model, LABEL_WIDTH, Alignment::Left, Some("…"));
        lines.push(format!("{label} {}  mean {:.4}", box_line(stats, &column), stats.mean));

        let mut strip = vec![' '; PLOT_WIDTH];
        for entry in entries.iter().filter(|entry| entry.model_name == *model) {
            strip[column(entry.accuracy).min(PLOT_WIDTH - 1)] = 'o';
        }
        let strip: String = strip.into_iter().collect();
        lines.push(format!("{} {strip}", " ".repeat(LABEL_WIDTH)));
    }
    lines.push(format!(
        "{} {:<width$.4}{:>.4}",
        " ".repeat(LABEL_WIDTH),
        low,
        high,
        width = PLOT_WIDTH - 6
    ));
    lines
}

fn box_line(stats: &BoxStats, column: &impl Fn(f64) -> usize) -> String {
    let mut cells = vec![' '; PLOT_WIDTH];
    let (min, q1, median, q3, max) = (
        column(stats.min),
        column(stats.q1),
        column(stats.median),
        column(stats.q3),
        column(stats.max),
    );
    for cell in cells.iter_mut().take(max + 1).skip(min) {
        *cell = '-';
    }
    for cell in cells.iter_mut().take(q3 + 1).skip(q1) {
        *cell = '=';
    }
    cells[min.min(PLOT_WIDTH - 1)] = '|';
    cells[max.min(PLOT_WIDTH - 1)] = '|';
    cells[q1.min(PLOT_WIDTH - 1)] = '[';
    cells[q3.min(PLOT_WIDTH - 1)] = ']';
    cells[median.min(PLOT_WIDTH - 1)] = '#';
    cells.into_iter().collect()
}

/// 行 = 正解、列 = 予測。列見出しはカテゴリ番号。
pub(crate) fn render_heatmap(categories: &Categories, normalized: &NormalizedConfusion) -> Vec<String> {
    let mut lines = Vec::with_capacity(categories.len() + 2);
    let header: String = (0..categories.len())
        .map(|index| format!("{index:>CELL_WIDTH$}"))
        .collect();
    lines.push(format!("{} {header}", " ".repeat(LABEL_WIDTH + 4)));

    for (index, name) in categories.iter().enumerate() {
        let label = pad_str(name, LABEL_WIDTH, Alignment::Left, Some("…"));
        let cells: String = match normalized.row(index) {
            Some(values) => values.iter().map(|&value| heat_cell(value)).collect(),
            None => format!("{:>CELL_WIDTH$}", "n/a").repeat(categories.len()),
        };
        lines.push(format!("{index:>3} {label} {cells}"));
    }
    lines
}

fn heat_cell(value: f64) -> String {
    let text = format!("{value:>CELL_WIDTH$.1}");
    if value >= 50.0 {
        style(text).green().bold().to_string()
    } else if value >= 10.0 {
        style(text).yellow().to_string()
    } else if value > 0.0 {
        style(text).red().dim().to_string()
    } else {
        style(format!("{:>CELL_WIDTH$}", ".")).dim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_plot_has_two_lines_per_model_and_an_axis() {
        let entries: Vec<CvEntry> = ["LinearSVC", "MultinomialNB"]
            .iter()
            .flat_map(|model| {
                (0..5).map(move |fold_idx| CvEntry {
                    model_name: (*model).to_string(),
                    fold_idx,
                    accuracy: 0.7 + fold_idx as f64 * 0.05,
                })
            })
            .collect();

        let lines = render_comparison(&entries);

        assert_eq!(lines.len(), 5);
        assert!(console::strip_ansi_codes(&lines[0]).starts_with("LinearSVC"));
        assert_eq!(console::strip_ansi_codes(&lines[1]).matches('o').count(), 5);
    }

    #[test]
    fn heatmap_marks_rows_without_support() {
        let categories = Categories::from_labels(["a", "b"]);
        let normalized = NormalizedConfusion {
            rows: vec![Some(vec![75.0, 25.0]), None],
        };

        let lines = render_heatmap(&categories, &normalized);

        assert_eq!(lines.len(), 3);
        let first = console::strip_ansi_codes(&lines[1]).to_string();
        assert!(first.contains("75.0") && first.contains("25.0"));
        assert!(console::strip_ansi_codes(&lines[2]).contains("n/a"));
    }

    #[test]
    fn empty_comparison_renders_placeholder() {
        assert_eq!(render_comparison(&[]), vec!["(no cross-validation results)".to_string()]);
    }
}

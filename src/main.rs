use anyhow::Context;
use tracing::error;

use doc_classifier::{
    config::Config,
    experiment::{Experiment, ExperimentConfig, ExperimentReport},
    observability,
    report::{HeadlessSink, ReportSink, TerminalSink},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(|s| s.as_str())
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                column = location.column(),
                message,
                "panic occurred"
            );
        } else {
            error!(
                thread = thread_name,
                message, "panic occurred without location information"
            );
        }
    }));

    observability::tracing::init().context("failed to initialize tracing")?;
    let config = Config::from_env().context("failed to load configuration")?;
    let interactive = config.interactive();
    let experiment_config = ExperimentConfig::from(&config);

    let report = tokio::task::spawn_blocking(move || {
        if interactive {
            run(experiment_config, TerminalSink::new(true))
        } else {
            run(experiment_config, HeadlessSink)
        }
    })
    .await
    .context("experiment task panicked")??;

    print_summary(&report);
    Ok(())
}

fn run<S: ReportSink>(config: ExperimentConfig, sink: S) -> anyhow::Result<ExperimentReport> {
    Experiment::new(config, sink)
        .run()
        .context("document classification experiment failed")
}

fn print_summary(report: &ExperimentReport) {
    let (rows, columns) = report.shape;
    println!("Feature matrix shape: ({rows}, {columns})");
    for (model, stats) in &report.comparison.summary {
        println!("CV accuracy {model}: mean {:.4} (min {:.4}, max {:.4})", stats.mean, stats.min, stats.max);
    }

    let evaluation = &report.evaluation;
    let scores: Vec<String> = evaluation.cv_scores.iter().map(|score| format!("{score:.4}")).collect();
    println!(
        "Training-split CV accuracy: mean {:.4}, scores [{}]",
        evaluation.cv_mean,
        scores.join(", ")
    );
    println!(
        "Held-out accuracy: {:.4} ({} of {})",
        evaluation.accuracy,
        evaluation.confusion.correct(),
        evaluation.confusion.total()
    );

    let smoke = &report.export.smoke;
    println!(
        "PMML prediction for row {}: {} (p = {:.4})",
        smoke.row, smoke.reloaded.category, smoke.reloaded.confidence
    );
}

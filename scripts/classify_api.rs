use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result, bail};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};

use doc_classifier::{
    app::{ComponentRegistry, build_router},
    config::Config,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = parse_args(Config::from_env().context("failed to load configuration")?)?;
    let registry = ComponentRegistry::build(config).context("failed to build component registry")?;
    let bind_addr = registry.config().api_bind();
    info!(
        categories = ?registry.model().categories(),
        terms = registry.model().term_count(),
        "PMML model ready"
    );
    let router = build_router(registry);

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {bind_addr}"))?;
    info!(%bind_addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;

    info!("server shutdown complete");
    Ok(())
}

/// コマンドライン引数で環境変数の設定を上書きする。
fn parse_args(mut config: Config) -> Result<Config> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--model" => {
                let value = args.next().context("--model requires a path argument")?;
                config = config.with_pmml_artifact_path(PathBuf::from(value));
            }
            "--bind" => {
                let value = args.next().context("--bind requires an address (e.g. 0.0.0.0:8080)")?;
                let parsed = value
                    .parse::<SocketAddr>()
                    .context("--bind must be a socket address")?;
                config = config.with_api_bind(parsed);
            }
            "--help" => {
                print_usage();
                process::exit(0);
            }
            _ => {
                bail!("unknown argument: {}", arg);
            }
        }
    }
    Ok(config)
}

fn print_usage() {
    eprintln!(
        "Usage: classify_api [--model <doc_classify.pmml>] [--bind <addr>]\n\
         \n\
         Serves predictions from a PMML document classifier.\n\
         Defaults come from DOC_CLASSIFIER_PMML_ARTIFACT and DOC_CLASSIFIER_API_BIND."
    );
}

async fn shutdown_signal() {
    if let Err(error) = signal::ctrl_c().await {
        warn!(%error, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

use anyhow::{Context, Error, Result};
use once_cell::sync::OnceCell;
use opentelemetry::{KeyValue, global, trace::TracerProvider};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    trace::{RandomIdGenerator, Sampler, SdkTracer, SdkTracerProvider},
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

const SERVICE_NAME: &str = "doc-classifier";

/// Tracing サブスクライバを一度だけ初期化する。
///
/// ログは JSON で標準エラーに出す（標準出力は実験結果の行に使う）。
/// `OTEL_EXPORTER_OTLP_ENDPOINT` が設定されていれば OTLP にもスパンを送る。
///
/// # Errors
/// サブスクライバの初期化に失敗した場合はエラーを返す。
pub fn init() -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json();

        let otel_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();
        let (tracer, otel_error) = match otel_endpoint.as_deref().map(init_tracer) {
            Some(Ok(tracer)) => (Some(tracer), None),
            Some(Err(error)) => (None, Some(error)),
            None => (None, None),
        };
        let otel_enabled = tracer.is_some();
        let otel_layer = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .try_init()
            .map_err(|e: tracing_subscriber::util::TryInitError| Error::msg(e.to_string()))?;

        match (otel_endpoint, otel_error) {
            (Some(endpoint), None) => {
                info!(otel_enabled, endpoint = %endpoint, "tracing initialized with OpenTelemetry");
            }
            (_, Some(error)) => {
                warn!(otel_enabled, error = %error, "tracing initialized without OpenTelemetry (init failed)");
            }
            (None, None) => info!(otel_enabled, "standard tracing initialized"),
        }
        Ok::<(), Error>(())
    })?;
    Ok(())
}

/// `OTEL_SAMPLING_RATIO` を [0, 1] に丸める。未設定・不正値は 1.0。
fn sampling_ratio() -> f64 {
    std::env::var("OTEL_SAMPLING_RATIO")
        .ok()
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|ratio| ratio.is_finite())
        .map_or(1.0, |ratio| ratio.clamp(0.0, 1.0))
}

/// OTLP エクスポーター経由の OpenTelemetry トレーサー。実験の各段と API のスパンを送る。
fn init_tracer(endpoint: &str) -> Result<SdkTracer> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .context("failed to build OTLP span exporter")?;

    let resource = Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", SERVICE_NAME),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])
        .build();

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(Sampler::TraceIdRatioBased(sampling_ratio()))
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    let tracer = tracer_provider.tracer(SERVICE_NAME);
    global::set_tracer_provider(tracer_provider);

    Ok(tracer)
}

//! yeelo-telemetry: トレーシング・構造化ログ・Prometheus メトリクスの初期化ライブラリ。
//!
//! サーバーは起動直後に [`init_telemetry`] を呼び出し、終了時に [`shutdown`] を呼び出す。

pub mod metrics;
pub mod middleware;

#[cfg(any(feature = "axum-layer", test))]
pub use middleware::MetricsLayer;


use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{trace as sdktrace, Resource};
use tracing_subscriber::{
    fmt, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// TelemetryConfig は telemetry ライブラリの初期化設定を保持する。
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub version: String,
    pub environment: String,
    pub trace_endpoint: Option<String>,
    pub sample_rate: f64,
    pub log_level: String,
    /// ログ出力フォーマット。"text" の場合はプレーンテキスト、それ以外は JSON。
    pub log_format: String,
}

impl TelemetryConfig {
    /// ログをプレーンテキストで出力するかを返す。
    pub fn is_text_format(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("text")
    }
}

/// init_telemetry は OpenTelemetry TracerProvider と tracing-subscriber を初期化する。
/// trace_endpoint が指定されている場合、OTLP gRPC エクスポータを設定する。
pub fn init_telemetry(cfg: &TelemetryConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let tracer = if let Some(ref endpoint) = cfg.trace_endpoint {
        let exporter = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;
        let provider = sdktrace::TracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .with_sampler(sdktrace::Sampler::TraceIdRatioBased(cfg.sample_rate))
            .with_resource(Resource::new(vec![
                KeyValue::new("service.name", cfg.service_name.clone()),
                KeyValue::new("service.version", cfg.version.clone()),
                KeyValue::new("deployment.environment", cfg.environment.clone()),
            ]))
            .build();
        let tracer = provider.tracer("yeelo");
        global::set_tracer_provider(provider);
        Some(tracer)
    } else {
        None
    };

    let filter = EnvFilter::try_new(&cfg.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let telemetry_layer = tracer.map(|t| tracing_opentelemetry::layer().with_tracer(t));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(telemetry_layer);

    if cfg.is_text_format() {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    }

    Ok(())
}

/// shutdown は OpenTelemetry TracerProvider をシャットダウンし、未送信スパンをフラッシュする。
pub fn shutdown() {
    global::shutdown_tracer_provider();
}

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Metrics は Prometheus メトリクスのヘルパー構造体である。
/// RED メソッド（Rate, Errors, Duration）の HTTP メトリクスに加え、
/// DB クエリ、アウトボックス配信、販売・在庫の業務メトリクスを提供する。
pub struct Metrics {
    pub http_requests_total: CounterVec,
    pub http_request_duration: HistogramVec,
    pub db_query_duration: HistogramVec,
    pub outbox_published_total: IntCounterVec,
    pub outbox_failed_total: IntCounterVec,
    pub sales_invoices_total: IntCounterVec,
    pub stock_movements_total: IntCounterVec,
    registry: Registry,
}

/// デフォルトのヒストグラムバケット。
const DEFAULT_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

impl Metrics {
    /// new は Prometheus メトリクスを初期化して返す。
    /// service_name はメトリクスの service ラベルに使用される。
    pub fn new(service_name: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests")
                .const_label("service", service_name),
            &["method", "path", "status"],
        )?;

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "Histogram of HTTP request latency",
            )
            .const_label("service", service_name)
            .buckets(DEFAULT_BUCKETS.to_vec()),
            &["method", "path"],
        )?;

        let db_query_duration = HistogramVec::new(
            HistogramOpts::new(
                "db_query_duration_seconds",
                "Histogram of database query latency",
            )
            .const_label("service", service_name)
            .buckets(DEFAULT_BUCKETS.to_vec()),
            &["query_name", "table"],
        )?;

        let outbox_published_total = IntCounterVec::new(
            Opts::new(
                "outbox_messages_published_total",
                "Total number of outbox messages published",
            )
            .const_label("service", service_name),
            &["topic"],
        )?;

        let outbox_failed_total = IntCounterVec::new(
            Opts::new(
                "outbox_messages_failed_total",
                "Total number of outbox publish failures",
            )
            .const_label("service", service_name),
            &["topic"],
        )?;

        let sales_invoices_total = IntCounterVec::new(
            Opts::new("sales_invoices_total", "Total number of sales invoices by status")
                .const_label("service", service_name),
            &["status"],
        )?;

        let stock_movements_total = IntCounterVec::new(
            Opts::new("stock_movements_total", "Total number of stock movements")
                .const_label("service", service_name),
            &["movement_type"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(db_query_duration.clone()))?;
        registry.register(Box::new(outbox_published_total.clone()))?;
        registry.register(Box::new(outbox_failed_total.clone()))?;
        registry.register(Box::new(sales_invoices_total.clone()))?;
        registry.register(Box::new(stock_movements_total.clone()))?;

        Ok(Self {
            http_requests_total,
            http_request_duration,
            db_query_duration,
            outbox_published_total,
            outbox_failed_total,
            sales_invoices_total,
            stock_movements_total,
            registry,
        })
    }

    /// record_http_request は HTTP リクエストカウンタをインクリメントする。
    pub fn record_http_request(&self, method: &str, path: &str, status: &str) {
        self.http_requests_total
            .with_label_values(&[method, path, status])
            .inc();
    }

    /// record_http_duration は HTTP リクエストのレイテンシをヒストグラムに記録する。
    pub fn record_http_duration(&self, method: &str, path: &str, duration_secs: f64) {
        self.http_request_duration
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// record_db_query_duration は DB クエリのレイテンシをヒストグラムに記録する。
    pub fn record_db_query_duration(&self, query_name: &str, table: &str, duration_secs: f64) {
        self.db_query_duration
            .with_label_values(&[query_name, table])
            .observe(duration_secs);
    }

    pub fn record_outbox_published(&self, topic: &str) {
        self.outbox_published_total.with_label_values(&[topic]).inc();
    }

    pub fn record_outbox_failed(&self, topic: &str) {
        self.outbox_failed_total.with_label_values(&[topic]).inc();
    }

    /// record_sales_invoice は販売伝票の件数をステータス別に記録する。
    pub fn record_sales_invoice(&self, status: &str) {
        self.sales_invoices_total.with_label_values(&[status]).inc();
    }

    /// record_stock_movement は在庫移動の件数を移動種別ごとに記録する。
    pub fn record_stock_movement(&self, movement_type: &str, count: u64) {
        self.stock_movements_total
            .with_label_values(&[movement_type])
            .inc_by(count);
    }

    /// gather_metrics は Prometheus テキストフォーマットでメトリクスを返す。
    /// /metrics エンドポイントのハンドラで使用する。
    pub fn gather_metrics(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

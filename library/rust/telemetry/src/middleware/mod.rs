use std::sync::Arc;

use crate::metrics::Metrics;

#[cfg(any(feature = "axum-layer", test))]
mod http_layer;

#[cfg(any(feature = "axum-layer", test))]
pub use http_layer::MetricsLayer;

/// 計測対象外のパス。ヘルスチェックとスクレイプのリクエストで系列を汚さない。
const UNMETERED_PATHS: &[&str] = &["/healthz", "/readyz", "/metrics"];

/// RequestRecorder は完了した HTTP リクエストを Prometheus とログに記録する。
#[derive(Clone)]
pub struct RequestRecorder {
    metrics: Arc<Metrics>,
}

impl RequestRecorder {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }

    /// route は [`route_label`] が返したラベルを渡す。
    pub fn record(&self, method: &str, route: &str, status: u16, duration_secs: f64) {
        self.metrics
            .record_http_request(method, route, &status.to_string());
        self.metrics.record_http_duration(method, route, duration_secs);

        if status >= 500 {
            tracing::error!(
                http.method = method,
                http.route = route,
                http.status_code = status,
                duration_secs,
                "request failed"
            );
        } else {
            tracing::debug!(
                http.method = method,
                http.route = route,
                http.status_code = status,
                duration_secs,
                "request completed"
            );
        }
    }
}

/// ルーターのどのルートにも一致しなかったリクエストのラベル。
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// route_label は計測用のラベルを返す。計測対象外のパスは None。
///
/// ラベルはルーターが一致させたルートのテンプレート（`/api/v1/masters/{entity}` など）で、
/// 生のパスは使わない。一致しなかったリクエストはすべて [`UNMATCHED_ROUTE`] にまとめる。
pub fn route_label(path: &str, matched_route: Option<&str>) -> Option<String> {
    if UNMETERED_PATHS.contains(&path) {
        return None;
    }
    Some(matched_route.unwrap_or(UNMATCHED_ROUTE).to_string())
}

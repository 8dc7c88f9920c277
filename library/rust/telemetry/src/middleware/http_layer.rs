use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::extract::MatchedPath;
use http::{Method, Request, Response};
use pin_project_lite::pin_project;
use tower::{Layer, Service};

use crate::metrics::Metrics;
use crate::middleware::{route_label, RequestRecorder};

/// ERP の axum Router に掛ける計測レイヤー。
///
/// `Router::layer` で掛けること。ルーティング後に挿入される [`MatchedPath`] をラベルに使うため、
/// Router の外側を包むとすべて `unmatched` になる。
///
/// ```ignore
/// let app = Router::new().route("/api/v1/masters/{entity}", get(list))
///     .layer(MetricsLayer::new(metrics.clone()));
/// ```
#[derive(Clone)]
pub struct MetricsLayer {
    recorder: RequestRecorder,
}

impl MetricsLayer {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            recorder: RequestRecorder::new(metrics),
        }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            recorder: self.recorder.clone(),
        }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    recorder: RequestRecorder,
}

/// 計測対象リクエストのラベルと開始時刻。
struct Pending {
    method: Method,
    route: String,
    started: Instant,
    recorder: RequestRecorder,
}

impl Pending {
    fn finish(self, status: u16) {
        let elapsed = self.started.elapsed().as_secs_f64();
        self.recorder
            .record(self.method.as_str(), &self.route, status, elapsed);
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for MetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = MetricsFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // ラベルはリクエスト受付時に確定させる（inner が URI を書き換えても影響しない）
        let matched = req.extensions().get::<MatchedPath>().map(MatchedPath::as_str);
        let pending = route_label(req.uri().path(), matched).map(|route| Pending {
            method: req.method().clone(),
            route,
            started: Instant::now(),
            recorder: self.recorder.clone(),
        });

        MetricsFuture {
            inner: self.inner.call(req),
            pending,
        }
    }
}

pin_project! {
    pub struct MetricsFuture<F> {
        #[pin]
        inner: F,
        pending: Option<Pending>,
    }
}

impl<F, ResBody, E> Future for MetricsFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let output = std::task::ready!(this.inner.poll(cx));
        if let Some(pending) = this.pending.take() {
            // inner のエラーは 500 として数える
            let status = output.as_ref().map_or(500, |resp| resp.status().as_u16());
            pending.finish(status);
        }
        Poll::Ready(output)
    }
}

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::{Duration, Instant};

/// Process metrics exposed on `/metrics`.
pub struct MetricsService {
    registry: Registry,
    request_duration: HistogramVec,
    errors: IntCounterVec,
    ingestions: IntCounterVec,
    books_created: IntCounter,
    enrichment_lookups: IntCounterVec,
    billing_events: IntCounterVec,
}

impl MetricsService {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let request_duration = HistogramVec::new(
            HistogramOpts::new("request_duration_seconds", "HTTP request latency"),
            &["endpoint"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("errors_total", "Error responses by class"),
            &["type"],
        )?;
        let ingestions = IntCounterVec::new(
            Opts::new("ingestions_total", "Ingestion runs by outcome"),
            &["outcome"],
        )?;
        let books_created = IntCounter::new("books_created_total", "Books persisted")?;
        let enrichment_lookups = IntCounterVec::new(
            Opts::new("enrichment_lookups_total", "Catalog lookups by result"),
            &["result"],
        )?;
        let billing_events = IntCounterVec::new(
            Opts::new("billing_events_total", "Billing webhook events by type"),
            &["event"],
        )?;

        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(ingestions.clone()))?;
        registry.register(Box::new(books_created.clone()))?;
        registry.register(Box::new(enrichment_lookups.clone()))?;
        registry.register(Box::new(billing_events.clone()))?;

        Ok(Self {
            registry,
            request_duration,
            errors,
            ingestions,
            books_created,
            enrichment_lookups,
            billing_events,
        })
    }

    pub fn record_request_duration(&self, duration: Duration, endpoint: &str) {
        self.request_duration
            .with_label_values(&[endpoint])
            .observe(duration.as_secs_f64());
    }

    pub fn record_error(&self, error_type: &str) {
        self.errors.with_label_values(&[error_type]).inc();
    }

    /// `outcome` is `created` or an ingest error kind.
    pub fn record_ingestion(&self, outcome: &str) {
        self.ingestions.with_label_values(&[outcome]).inc();
    }

    pub fn record_books_created(&self, count: u64) {
        self.books_created.inc_by(count);
    }

    pub fn record_enrichment(&self, matched: usize, unmatched: usize) {
        self.enrichment_lookups
            .with_label_values(&["matched"])
            .inc_by(matched as u64);
        self.enrichment_lookups
            .with_label_values(&["unmatched"])
            .inc_by(unmatched as u64);
    }

    pub fn record_billing_event(&self, event_type: &str) {
        self.billing_events.with_label_values(&[event_type]).inc();
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Records the elapsed time for `endpoint` when dropped.
pub struct RequestTimer<'a> {
    metrics: &'a MetricsService,
    start: Instant,
    endpoint: String,
}

impl<'a> RequestTimer<'a> {
    pub fn new(metrics: &'a MetricsService, endpoint: String) -> Self {
        Self {
            metrics,
            start: Instant::now(),
            endpoint,
        }
    }
}

impl Drop for RequestTimer<'_> {
    fn drop(&mut self) {
        self.metrics
            .record_request_duration(self.start.elapsed(), &self.endpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_recorded_series() {
        let metrics = MetricsService::new().unwrap();
        metrics.record_ingestion("created");
        metrics.record_books_created(3);
        metrics.record_error("client_error");
        {
            let _timer = RequestTimer::new(&metrics, "POST /api/ingest".to_string());
        }

        let text = metrics.render().unwrap();
        assert!(text.contains("ingestions_total{outcome=\"created\"} 1"));
        assert!(text.contains("books_created_total 3"));
        assert!(text.contains("errors_total{type=\"client_error\"} 1"));
        assert!(text.contains("request_duration_seconds_count{endpoint=\"POST /api/ingest\"} 1"));
    }

    #[test]
    fn test_services_do_not_share_registries() {
        let first = MetricsService::new().unwrap();
        let second = MetricsService::new().unwrap();
        first.record_books_created(2);

        assert!(second.render().unwrap().contains("books_created_total 0"));
    }
}

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry, Encoder,
    IntCounter, IntCounterVec, Registry, TextEncoder,
};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static HTTP_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec_with_registry!(
        "railops_http_requests_total",
        "HTTP requests by method and status",
        &["method", "status"],
        REGISTRY
    )
    .expect("metric registration is infallible at start-up")
});

pub static RECORDS_SCORED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter_with_registry!(
        "railops_records_scored_total",
        "Assessment records written by the scoring engine",
        REGISTRY
    )
    .expect("metric registration is infallible at start-up")
});

pub static SYNC_TASKS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec_with_registry!(
        "railops_sync_tasks_total",
        "Schedule sync tasks by terminal status",
        &["status"],
        REGISTRY
    )
    .expect("metric registration is infallible at start-up")
});

pub fn observe_request(method: &str, status: u16) {
    HTTP_REQUESTS
        .with_label_values(&[method, &status.to_string()])
        .inc();
}

/// Prometheus text exposition for GET /metrics.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("metrics encoding failed: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_text_exposition() {
        observe_request("GET", 200);
        RECORDS_SCORED.inc();
        let text = render();
        assert!(text.contains("railops_http_requests_total"));
        assert!(text.contains("railops_records_scored_total"));
    }
}

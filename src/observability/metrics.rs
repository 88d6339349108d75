use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_total: IntCounterVec,
    pub dispatch_queue_depth: IntGauge,
    pub dispatch_latency_seconds: HistogramVec,
    pub assignments_expired_total: IntCounter,
    pub active_assignments: IntGauge,
    pub couriers_on_shift: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_total = IntCounterVec::new(
            Opts::new("dispatch_total", "Dispatch attempts by outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_total metric");

        let dispatch_queue_depth =
            IntGauge::new("dispatch_queue_depth", "Orders waiting for dispatch")
                .expect("valid dispatch_queue_depth metric");

        let dispatch_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of dispatch processing in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let assignments_expired_total = IntCounter::new(
            "assignments_expired_total",
            "Assignments timed out by the expiry sweeper",
        )
        .expect("valid assignments_expired_total metric");

        let active_assignments =
            IntGauge::new("active_assignments", "Assignments currently holding an order")
                .expect("valid active_assignments metric");

        let couriers_on_shift = IntGauge::new("couriers_on_shift", "Couriers with an open shift")
            .expect("valid couriers_on_shift metric");

        registry
            .register(Box::new(dispatch_total.clone()))
            .expect("register dispatch_total");
        registry
            .register(Box::new(dispatch_queue_depth.clone()))
            .expect("register dispatch_queue_depth");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(assignments_expired_total.clone()))
            .expect("register assignments_expired_total");
        registry
            .register(Box::new(active_assignments.clone()))
            .expect("register active_assignments");
        registry
            .register(Box::new(couriers_on_shift.clone()))
            .expect("register couriers_on_shift");

        Self {
            registry,
            dispatch_total,
            dispatch_queue_depth,
            dispatch_latency_seconds,
            assignments_expired_total,
            active_assignments,
            couriers_on_shift,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

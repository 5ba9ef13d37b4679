use prometheus::{Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatches_total: IntCounterVec,
    pub trips_awaiting_dispatch: IntGauge,
    pub dispatch_latency_seconds: HistogramVec,
    pub trip_offers_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatches_total = IntCounterVec::new(
            Opts::new("dispatches_total", "Total dispatch runs by outcome"),
            &["outcome"],
        )
        .expect("valid dispatches_total metric");

        let trips_awaiting_dispatch = IntGauge::new(
            "trips_awaiting_dispatch",
            "Current number of trips queued for dispatch",
        )
        .expect("valid trips_awaiting_dispatch metric");

        let dispatch_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of one dispatch run in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let trip_offers_total = IntCounterVec::new(
            Opts::new("trip_offers_total", "Trip offers sent to drivers by result"),
            &["result"],
        )
        .expect("valid trip_offers_total metric");

        registry
            .register(Box::new(dispatches_total.clone()))
            .expect("register dispatches_total");
        registry
            .register(Box::new(trips_awaiting_dispatch.clone()))
            .expect("register trips_awaiting_dispatch");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(trip_offers_total.clone()))
            .expect("register trip_offers_total");

        Self {
            registry,
            dispatches_total,
            trips_awaiting_dispatch,
            dispatch_latency_seconds,
            trip_offers_total,
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

use crate::shared::error::{DaemonError, DaemonResult};
use prometheus::{
    opts, Counter, CounterVec, Encoder, Histogram, HistogramOpts, Registry, TextEncoder,
};

pub struct ObservabilityRepository {
    registry: Registry,
    outcome_total: CounterVec,
    handle_error_total: CounterVec,
    rejected_request_total: Counter,
    reboot_total: CounterVec,
    remote_command_total: CounterVec,
    handle_latency_seconds: Histogram,
}

impl ObservabilityRepository {
    pub fn new() -> DaemonResult<Self> {
        let registry = Registry::new();

        let outcome_total = CounterVec::new(
            opts!("adjoin_outcome_total", "Domain join outcomes by kind"),
            &["outcome"],
        )
        .map_err(metrics_error)?;
        let handle_error_total = CounterVec::new(
            opts!(
                "adjoin_handle_error_total",
                "Requests aborted by a collaborator fault"
            ),
            &["code"],
        )
        .map_err(metrics_error)?;
        let rejected_request_total = Counter::with_opts(opts!(
            "adjoin_rejected_request_total",
            "Malformed request payloads"
        ))
        .map_err(metrics_error)?;
        let reboot_total = CounterVec::new(
            opts!("adjoin_reboot_total", "Reboot attempts by channel and result"),
            &["channel", "result"],
        )
        .map_err(metrics_error)?;
        let remote_command_total = CounterVec::new(
            opts!(
                "adjoin_remote_command_total",
                "Remote command batches by purpose"
            ),
            &["purpose"],
        )
        .map_err(metrics_error)?;
        let handle_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "adjoin_handle_latency_seconds",
                "Time to handle one domain join request (seconds)",
            )
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(outcome_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(handle_error_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(rejected_request_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(reboot_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(remote_command_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(handle_latency_seconds.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            outcome_total,
            handle_error_total,
            rejected_request_total,
            reboot_total,
            remote_command_total,
            handle_latency_seconds,
        })
    }

    pub fn inc_outcome(&self, outcome: &str) {
        self.outcome_total.with_label_values(&[outcome]).inc();
    }

    pub fn inc_handle_error(&self, code: &str) {
        self.handle_error_total.with_label_values(&[code]).inc();
    }

    pub fn inc_rejected_request(&self) {
        self.rejected_request_total.inc();
    }

    pub fn inc_reboot(&self, channel: &str, result: &str) {
        self.reboot_total.with_label_values(&[channel, result]).inc();
    }

    pub fn inc_remote_command(&self, purpose: &str) {
        self.remote_command_total.with_label_values(&[purpose]).inc();
    }

    pub fn observe_handle_latency(&self, seconds: f64) {
        self.handle_latency_seconds.observe(seconds);
    }

    pub fn outcome_count(&self, outcome: &str) -> u64 {
        self.outcome_total.with_label_values(&[outcome]).get() as u64
    }

    pub fn reboot_count(&self, channel: &str, result: &str) -> u64 {
        self.reboot_total.with_label_values(&[channel, result]).get() as u64
    }

    pub fn remote_command_count(&self, purpose: &str) -> u64 {
        self.remote_command_total.with_label_values(&[purpose]).get() as u64
    }

    pub fn render_metrics(&self) -> DaemonResult<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder
            .encode(&families, &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(metrics_error)
    }
}

fn metrics_error(error: impl std::fmt::Display) -> DaemonError {
    DaemonError::Metrics(error.to_string())
}

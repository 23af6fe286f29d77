use crate::features::observability::repo::ObservabilityRepository;
use crate::shared::error::DaemonResult;
use crate::shared::types::{CommandPurpose, JoinOutcome, RebootChannel};
use std::sync::Arc;

#[derive(Clone)]
pub struct ObservabilityService {
    repo: Arc<ObservabilityRepository>,
}

impl ObservabilityService {
    pub fn new(repo: Arc<ObservabilityRepository>) -> Self {
        Self { repo }
    }

    pub fn record_outcome(&self, outcome: JoinOutcome) {
        self.repo.inc_outcome(outcome.as_str());
    }

    pub fn record_handle_error(&self, code: &str) {
        self.repo.inc_handle_error(code);
    }

    pub fn record_rejected_request(&self) {
        self.repo.inc_rejected_request();
    }

    pub fn record_reboot(&self, channel: RebootChannel, succeeded: bool) {
        self.repo
            .inc_reboot(channel.as_str(), if succeeded { "ok" } else { "error" });
    }

    pub fn record_remote_command(&self, purpose: CommandPurpose) {
        self.repo.inc_remote_command(purpose.as_str());
    }

    pub fn record_handle_latency(&self, seconds: f64) {
        self.repo.observe_handle_latency(seconds);
    }

    pub fn outcome_count(&self, outcome: JoinOutcome) -> u64 {
        self.repo.outcome_count(outcome.as_str())
    }

    /// Reboot attempts on `channel`, whatever their result.
    pub fn reboot_attempts(&self, channel: RebootChannel) -> u64 {
        self.repo.reboot_count(channel.as_str(), "ok")
            + self.repo.reboot_count(channel.as_str(), "error")
    }

    pub fn remote_command_count(&self, purpose: CommandPurpose) -> u64 {
        self.repo.remote_command_count(purpose.as_str())
    }

    pub fn render_metrics(&self) -> DaemonResult<String> {
        self.repo.render_metrics()
    }
}

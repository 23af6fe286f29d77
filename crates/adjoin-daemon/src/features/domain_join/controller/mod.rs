use crate::features::domain_join::service::DomainJoinService;
use crate::features::observability::service::ObservabilityService;
use crate::shared::error::DaemonError;
use crate::shared::types::{Disposition, JoinRequest};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Entry point for queue messages: parses, runs the reconciler and decides what
/// happens to the message.
pub struct DomainJoinController {
    service: Arc<DomainJoinService>,
    metrics: ObservabilityService,
}

impl DomainJoinController {
    pub fn new(service: Arc<DomainJoinService>, metrics: ObservabilityService) -> Self {
        Self { service, metrics }
    }

    /// Handle a raw message body
    pub async fn handle_message(&self, body: &str) -> Disposition {
        match JoinRequest::from_json(body) {
            Ok(request) => self.handle_request(&request).await,
            Err(e) => {
                let e = DaemonError::from(e);
                warn!(error = %e, "Rejecting malformed domain join request");
                self.metrics.record_rejected_request();
                Disposition::Reject
            }
        }
    }

    pub async fn handle_request(&self, request: &JoinRequest) -> Disposition {
        let span = info_span!(
            "domain_join",
            attempt_id = %Uuid::new_v4(),
            instance_id = %request.instance_id(),
        );

        async {
            info!(
                instance_name = %request.instance_name(),
                domain = %request.domain(),
                "Received domain join request"
            );
            let started = Instant::now();
            let result = self.service.handle(request).await;
            self.metrics
                .record_handle_latency(started.elapsed().as_secs_f64());

            match result {
                Ok(outcome) => {
                    self.metrics.record_outcome(outcome);
                    let disposition = outcome.disposition();
                    info!(%outcome, ?disposition, "Domain join request handled");
                    disposition
                }
                Err(e) => {
                    self.metrics.record_handle_error(e.code());
                    if e.is_retryable() {
                        warn!(error = %e, "Domain join request failed; will be redelivered");
                        Disposition::Redeliver
                    } else {
                        error!(error = %e, "Domain join request cannot be processed");
                        Disposition::Reject
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

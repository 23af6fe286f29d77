use crate::features::observability::service::ObservabilityService;
use crate::shared::error::DaemonResult;

/// Read side of the metrics, used by the HTTP endpoint.
pub struct ObservabilityController {
    service: ObservabilityService,
}

impl ObservabilityController {
    pub fn new(service: ObservabilityService) -> Self {
        Self { service }
    }

    pub fn render_metrics(&self) -> DaemonResult<String> {
        self.service.render_metrics()
    }
}

//! Work that runs beside a list view: the periodic refresh, and backend jobs
//! whose results only show up in a later fetch.

use std::{sync::Arc, time::Duration};

use serde_json::Value;
use shared::{
    domain::{ResourceKind, ResourceRow},
    protocol::GenerateReportRequest,
};
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::{ControllerError, DeriveStats, Operation, ResourceListController, TransportError};

/// Out-of-band backend jobs. The trigger returns once the job is queued; the
/// backend sends no completion notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendJob {
    CollectMessages,
    CollectMetrics,
    GenerateReport { message_id: i64 },
}

impl BackendJob {
    pub const fn resource(&self) -> ResourceKind {
        match self {
            Self::CollectMessages => ResourceKind::Messages,
            Self::CollectMetrics => ResourceKind::Metrics,
            Self::GenerateReport { .. } => ResourceKind::Reports,
        }
    }

    pub const fn action(&self) -> &'static str {
        match self {
            Self::CollectMessages | Self::CollectMetrics => "collect",
            Self::GenerateReport { .. } => "generate",
        }
    }

    fn body(&self) -> Result<Option<Value>, serde_json::Error> {
        match self {
            Self::CollectMessages | Self::CollectMetrics => Ok(None),
            Self::GenerateReport { message_id } => serde_json::to_value(GenerateReportRequest {
                message_id: *message_id,
            })
            .map(Some),
        }
    }
}

/// Stops the periodic refresh when dropped.
pub struct AutoRefreshHandle {
    task: JoinHandle<()>,
}

impl AutoRefreshHandle {
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for AutoRefreshHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<R: ResourceRow + DeriveStats> ResourceListController<R> {
    /// Reloads every `period`, starting one period from now. The task holds
    /// only a weak reference and ends once the controller is gone.
    pub fn spawn_auto_refresh(self: &Arc<Self>, period: Duration) -> AutoRefreshHandle {
        let controller = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                debug!(resource = Self::resource(), "auto refresh tick");
                // Failures are already reported through the event channel.
                let _ = controller.reload().await;
            }
        });
        AutoRefreshHandle { task }
    }

    /// Starts a backend job for this resource and schedules a reload after
    /// `refetch_after`, since nothing announces when the job is done.
    pub async fn trigger_job(
        self: &Arc<Self>,
        job: &BackendJob,
        refetch_after: Duration,
    ) -> Result<(), ControllerError> {
        if job.resource() != R::KIND {
            return Err(self.fail(ControllerError::InvalidQuery {
                operation: Operation::Job,
                reason: format!(
                    "{} job belongs to {}, not {}",
                    job.action(),
                    job.resource(),
                    R::KIND
                ),
            }));
        }
        let job_failed = |source: TransportError| ControllerError::JobFailed {
            resource: Self::resource(),
            job: job.action(),
            source,
        };
        let body = job
            .body()
            .map_err(|err| self.fail(job_failed(err.into())))?;
        {
            let _busy = self.busy();
            self.endpoint
                .trigger(job.action(), body)
                .await
                .map_err(|source| self.fail(job_failed(source)))?;
        }
        info!(
            resource = Self::resource(),
            job = job.action(),
            refetch_after_ms = refetch_after.as_millis() as u64,
            "backend job triggered"
        );
        self.spawn_resync(Some(refetch_after));
        Ok(())
    }
}

use shared::{
    domain::{InvestmentReport, ReportStatus, ResourceRow, RowId},
    protocol::ReportAuditRequest,
};
use tracing::info;

use crate::{ControllerError, Operation, ResourceListController};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditDecision {
    Approve,
    Reject { reason: String },
}

impl AuditDecision {
    const fn status(&self) -> ReportStatus {
        match self {
            Self::Approve => ReportStatus::Approved,
            Self::Reject { .. } => ReportStatus::Rejected,
        }
    }
}

impl ResourceListController<InvestmentReport> {
    pub async fn approve(&self, id: &RowId, auditor: &str) -> Result<(), ControllerError> {
        self.audit(id, auditor, AuditDecision::Approve).await
    }

    pub async fn reject(
        &self,
        id: &RowId,
        auditor: &str,
        reason: impl Into<String>,
    ) -> Result<(), ControllerError> {
        self.audit(
            id,
            auditor,
            AuditDecision::Reject {
                reason: reason.into(),
            },
        )
        .await
    }

    /// Records an audit verdict with a partial update, then re-fetches.
    /// Reports already audited on the cached page are refused locally;
    /// reports not on the page are left to the backend to judge.
    pub async fn audit(
        &self,
        id: &RowId,
        auditor: &str,
        decision: AuditDecision,
    ) -> Result<(), ControllerError> {
        let cached_status = self
            .snapshot()
            .await
            .data
            .iter()
            .find(|report| report.row_id() == id)
            .map(|report| report.status);
        if let Some(status) = cached_status {
            if status != Some(ReportStatus::Pending) {
                return Err(self.fail(ControllerError::InvalidQuery {
                    operation: Operation::Audit,
                    reason: format!("report {id} is not awaiting audit"),
                }));
            }
        }

        let request = ReportAuditRequest {
            id: id.clone(),
            status: decision.status(),
            audit_by: auditor.to_string(),
            reject_reason: match &decision {
                AuditDecision::Approve => String::new(),
                AuditDecision::Reject { reason } => reason.clone(),
            },
        };
        let body = serde_json::to_value(&request)
            .map_err(|err| self.mutation_failed(Operation::Audit, err.into()))?;
        {
            let _busy = self.busy();
            self.endpoint
                .update(body)
                .await
                .map_err(|source| self.mutation_failed(Operation::Audit, source))?;
        }
        info!(
            id = %id,
            status = request.status.label(),
            auditor,
            "report audited"
        );
        self.resync().await;
        Ok(())
    }
}

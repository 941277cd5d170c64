//! Offline POS queue replay
//!
//! The browser queues checkouts while the network is down and posts them in a
//! batch once it reconnects. Each entry is applied on its own; idempotency is
//! provided by the entry's `client_reference`.

use serde::{Deserialize, Serialize};
use shared::OfflineSyncOutcome;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::sale::{CheckoutInput, SaleService};

/// Largest batch accepted in one request
pub const MAX_SYNC_BATCH: usize = 100;

/// Offline sync service
#[derive(Clone)]
pub struct OfflineSyncService {
    sales: SaleService,
}

/// Queued checkouts from one device
#[derive(Debug, Deserialize)]
pub struct SyncBatch {
    pub device_id: Option<String>,
    pub sales: Vec<CheckoutInput>,
}

/// Outcome for one queued checkout
#[derive(Debug, Serialize)]
pub struct SyncEntryResult {
    pub client_reference: Option<Uuid>,
    #[serde(flatten)]
    pub outcome: OfflineSyncOutcome,
}

/// Batch outcome
#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub applied: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub results: Vec<SyncEntryResult>,
}

impl SyncReport {
    fn from_results(results: Vec<SyncEntryResult>) -> Self {
        let mut report = SyncReport {
            applied: 0,
            duplicates: 0,
            failed: 0,
            results: Vec::new(),
        };
        for result in &results {
            match result.outcome {
                OfflineSyncOutcome::Applied { .. } => report.applied += 1,
                OfflineSyncOutcome::Duplicate { .. } => report.duplicates += 1,
                OfflineSyncOutcome::Failed { .. } => report.failed += 1,
            }
        }
        report.results = results;
        report
    }
}

impl OfflineSyncService {
    pub fn new(sales: SaleService) -> Self {
        Self { sales }
    }

    /// Replay queued checkouts in order; one failure does not stop the batch
    pub async fn sync(&self, actor: &AuthUser, batch: SyncBatch) -> AppResult<SyncReport> {
        if batch.sales.is_empty() {
            return Err(AppError::validation("sales", "Nothing to sync"));
        }
        if batch.sales.len() > MAX_SYNC_BATCH {
            return Err(AppError::validation(
                "sales",
                format!("At most {} queued sales per request", MAX_SYNC_BATCH),
            ));
        }

        let mut results = Vec::with_capacity(batch.sales.len());
        for entry in batch.sales {
            let client_reference = entry.client_reference;
            let outcome = match client_reference {
                None => failed(&AppError::validation(
                    "client_reference",
                    "Queued sales must carry a client reference",
                )),
                Some(_) => match self.sales.checkout(actor, entry).await {
                    Ok(done) if done.duplicate => OfflineSyncOutcome::Duplicate {
                        sale_id: done.sale.id,
                        receipt_number: done.sale.receipt_number,
                    },
                    Ok(done) => OfflineSyncOutcome::Applied {
                        sale_id: done.sale.id,
                        receipt_number: done.sale.receipt_number,
                    },
                    Err(e) => {
                        tracing::warn!(
                            client_reference = ?client_reference,
                            error = %e,
                            "queued sale could not be applied"
                        );
                        failed(&e)
                    }
                },
            };
            results.push(SyncEntryResult {
                client_reference,
                outcome,
            });
        }

        let report = SyncReport::from_results(results);
        tracing::info!(
            cashier_id = %actor.user_id,
            device_id = batch.device_id.as_deref().unwrap_or("unknown"),
            applied = report.applied,
            duplicates = report.duplicates,
            failed = report.failed,
            "offline sales synced"
        );
        Ok(report)
    }
}

fn failed(err: &AppError) -> OfflineSyncOutcome {
    OfflineSyncOutcome::Failed {
        code: err.code().to_string(),
        message: err.public_message(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_outcomes() {
        let id = Uuid::new_v4();
        let report = SyncReport::from_results(vec![
            SyncEntryResult {
                client_reference: Some(Uuid::new_v4()),
                outcome: OfflineSyncOutcome::Applied {
                    sale_id: id,
                    receipt_number: "RCP-20240101-000001".into(),
                },
            },
            SyncEntryResult {
                client_reference: Some(Uuid::new_v4()),
                outcome: OfflineSyncOutcome::Duplicate {
                    sale_id: id,
                    receipt_number: "RCP-20240101-000001".into(),
                },
            },
            SyncEntryResult {
                client_reference: None,
                outcome: failed(&AppError::InsufficientStock("Cola".into())),
            },
        ]);
        assert_eq!((report.applied, report.duplicates, report.failed), (1, 1, 1));
    }

    #[test]
    fn failed_entry_serializes_flat() {
        let entry = SyncEntryResult {
            client_reference: None,
            outcome: failed(&AppError::validation("lines", "cart is empty")),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["outcome"], "FAILED");
        assert_eq!(json["code"], "VALIDATION_ERROR");
    }
}

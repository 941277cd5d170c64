//! Stock reconciliation models and approval workflow
//!
//! A reconciliation proposes corrections between the system-recorded stock of
//! one or more products and a physical count. It moves through
//! `DRAFT -> PENDING -> APPROVED | REJECTED`; approval is the only step that
//! touches live stock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use super::{Action, Resource, UserRole};
use crate::types::round_money;

/// Reconciliation workflow status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
}

text_enum!(ReconciliationStatus, "reconciliation status", {
    Draft => "DRAFT",
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
});

/// Workflow actions that move a reconciliation between statuses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationAction {
    Submit,
    Approve,
    Reject,
}

impl std::fmt::Display for ReconciliationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconciliationAction::Submit => f.write_str("submit"),
            ReconciliationAction::Approve => f.write_str("approve"),
            ReconciliationAction::Reject => f.write_str("reject"),
        }
    }
}

impl ReconciliationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReconciliationStatus::Approved | ReconciliationStatus::Rejected)
    }

    /// Title, notes and items may only change while in draft
    pub fn is_editable(&self) -> bool {
        matches!(self, ReconciliationStatus::Draft)
    }

    /// Resolve the status reached by applying `action`
    pub fn apply(self, action: ReconciliationAction) -> Result<Self, ReconciliationError> {
        use ReconciliationAction::*;
        use ReconciliationStatus::*;

        match (self, action) {
            (Draft, Submit) => Ok(Pending),
            (Pending, Approve) => Ok(Approved),
            (Pending, Reject) => Ok(Rejected),
            (from, action) => Err(ReconciliationError::InvalidTransition { from, action }),
        }
    }
}

/// Rule violations raised by the reconciliation workflow
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconciliationError {
    #[error("cannot {action} a reconciliation in {from} status")]
    InvalidTransition {
        from: ReconciliationStatus,
        action: ReconciliationAction,
    },

    #[error("reconciliation is {0} and can no longer be modified")]
    NotEditable(ReconciliationStatus),

    #[error("only the creator may modify this reconciliation")]
    NotCreator,

    #[error("your role may not delete reconciliations")]
    DeleteNotPermitted,

    #[error("only an administrator may approve or reject reconciliations")]
    ApproverRequired,

    #[error("reconciliation must contain at least one item")]
    NoItems,

    #[error("product {0} appears more than once")]
    DuplicateProduct(Uuid),

    #[error("physical count cannot be negative")]
    NegativeCount,

    #[error("a rejection reason is required")]
    RejectionReasonRequired,

    #[error("applying discrepancy {discrepancy} to product {product_id} with stock {current} would make stock negative")]
    NegativeStock {
        product_id: Uuid,
        current: i32,
        discrepancy: i32,
    },
}

/// A stock reconciliation with its items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReconciliation {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: ReconciliationStatus,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub items: Vec<ReconciliationItem>,
    pub summary: ReconciliationSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One product line of a reconciliation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_sku: String,
    pub system_count: i32,
    pub physical_count: i32,
    pub discrepancy: i32,
    pub unit_cost: Decimal,
    pub estimated_impact: Decimal,
    pub reason: Option<String>,
}

/// Counted values for one product before they are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountLine {
    pub product_id: Uuid,
    pub system_count: i32,
    pub physical_count: i32,
}

impl CountLine {
    pub fn new(
        product_id: Uuid,
        system_count: i32,
        physical_count: i32,
    ) -> Result<Self, ReconciliationError> {
        if physical_count < 0 {
            return Err(ReconciliationError::NegativeCount);
        }
        Ok(Self {
            product_id,
            system_count,
            physical_count,
        })
    }

    /// Physical count minus system count
    pub fn discrepancy(&self) -> i32 {
        self.physical_count - self.system_count
    }

    /// Financial effect of the discrepancy at `unit_cost`
    pub fn estimated_impact(&self, unit_cost: Decimal) -> Decimal {
        round_money(Decimal::from(self.discrepancy()) * unit_cost)
    }
}

/// Aggregate figures over a reconciliation's items
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationSummary {
    pub item_count: usize,
    pub surplus_units: i64,
    pub shortage_units: i64,
    pub net_discrepancy: i64,
    pub total_impact: Decimal,
}

impl ReconciliationSummary {
    pub fn from_items(items: &[ReconciliationItem]) -> Self {
        items.iter().fold(Self::default(), |mut acc, item| {
            acc.item_count += 1;
            let d = i64::from(item.discrepancy);
            if d > 0 {
                acc.surplus_units += d;
            } else {
                acc.shortage_units += -d;
            }
            acc.net_discrepancy += d;
            acc.total_impact += item.estimated_impact;
            acc
        })
    }
}

/// Reject input where the same product is counted twice
pub fn ensure_unique_products(product_ids: &[Uuid]) -> Result<(), ReconciliationError> {
    let mut seen = HashSet::with_capacity(product_ids.len());
    for id in product_ids {
        if !seen.insert(*id) {
            return Err(ReconciliationError::DuplicateProduct(*id));
        }
    }
    Ok(())
}

/// A draft may only be changed by the user who created it
pub fn ensure_can_edit(
    status: ReconciliationStatus,
    created_by: Uuid,
    actor: Uuid,
) -> Result<(), ReconciliationError> {
    if !status.is_editable() {
        return Err(ReconciliationError::NotEditable(status));
    }
    if created_by != actor {
        return Err(ReconciliationError::NotCreator);
    }
    Ok(())
}

/// Any draft may be deleted by a role holding the reconciliation delete
/// permission, whoever created it. Other roles may not delete, even their own.
pub fn ensure_can_delete(
    status: ReconciliationStatus,
    actor_role: UserRole,
) -> Result<(), ReconciliationError> {
    if !status.is_editable() {
        return Err(ReconciliationError::NotEditable(status));
    }
    if !actor_role.can(Resource::Reconciliation, Action::Delete) {
        return Err(ReconciliationError::DeleteNotPermitted);
    }
    Ok(())
}

/// Validate a workflow step for the acting user and return the new status
pub fn authorize_transition(
    status: ReconciliationStatus,
    action: ReconciliationAction,
    created_by: Uuid,
    actor: Uuid,
    actor_role: UserRole,
    item_count: usize,
) -> Result<ReconciliationStatus, ReconciliationError> {
    let next = status.apply(action)?;
    match action {
        ReconciliationAction::Submit => {
            if created_by != actor {
                return Err(ReconciliationError::NotCreator);
            }
            if item_count == 0 {
                return Err(ReconciliationError::NoItems);
            }
        }
        ReconciliationAction::Approve | ReconciliationAction::Reject => {
            if actor_role != UserRole::Admin {
                return Err(ReconciliationError::ApproverRequired);
            }
        }
    }
    Ok(next)
}

/// Stock level after applying a reconciliation discrepancy
pub fn apply_discrepancy(
    product_id: Uuid,
    current: i32,
    discrepancy: i32,
) -> Result<i32, ReconciliationError> {
    match current.checked_add(discrepancy) {
        Some(next) if next >= 0 => Ok(next),
        _ => Err(ReconciliationError::NegativeStock {
            product_id,
            current,
            discrepancy,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn happy_path_transitions() {
        let s = ReconciliationStatus::Draft;
        let s = s.apply(ReconciliationAction::Submit).unwrap();
        assert_eq!(s, ReconciliationStatus::Pending);
        assert_eq!(
            s.apply(ReconciliationAction::Approve).unwrap(),
            ReconciliationStatus::Approved
        );
        assert_eq!(
            s.apply(ReconciliationAction::Reject).unwrap(),
            ReconciliationStatus::Rejected
        );
    }

    #[test]
    fn terminal_states_reject_everything() {
        for status in [ReconciliationStatus::Approved, ReconciliationStatus::Rejected] {
            assert!(status.is_terminal());
            for action in [
                ReconciliationAction::Submit,
                ReconciliationAction::Approve,
                ReconciliationAction::Reject,
            ] {
                assert!(status.apply(action).is_err());
            }
        }
    }

    #[test]
    fn draft_cannot_be_approved_directly() {
        let err = ReconciliationStatus::Draft
            .apply(ReconciliationAction::Approve)
            .unwrap_err();
        assert_eq!(
            err,
            ReconciliationError::InvalidTransition {
                from: ReconciliationStatus::Draft,
                action: ReconciliationAction::Approve,
            }
        );
    }

    #[test]
    fn discrepancy_and_impact() {
        let line = CountLine::new(Uuid::new_v4(), 10, 7).unwrap();
        assert_eq!(line.discrepancy(), -3);
        assert_eq!(
            line.estimated_impact(Decimal::from_str("2.50").unwrap()),
            Decimal::from_str("-7.50").unwrap()
        );
        assert_eq!(
            CountLine::new(Uuid::new_v4(), 3, -1).unwrap_err(),
            ReconciliationError::NegativeCount
        );
    }

    #[test]
    fn only_creator_submits_and_only_admin_resolves() {
        let creator = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert_eq!(
            authorize_transition(
                ReconciliationStatus::Draft,
                ReconciliationAction::Submit,
                creator,
                other,
                UserRole::Admin,
                1
            ),
            Err(ReconciliationError::NotCreator)
        );
        assert_eq!(
            authorize_transition(
                ReconciliationStatus::Draft,
                ReconciliationAction::Submit,
                creator,
                creator,
                UserRole::Staff,
                0
            ),
            Err(ReconciliationError::NoItems)
        );
        assert_eq!(
            authorize_transition(
                ReconciliationStatus::Pending,
                ReconciliationAction::Approve,
                creator,
                other,
                UserRole::Manager,
                1
            ),
            Err(ReconciliationError::ApproverRequired)
        );
        assert_eq!(
            authorize_transition(
                ReconciliationStatus::Pending,
                ReconciliationAction::Approve,
                creator,
                other,
                UserRole::Admin,
                1
            ),
            Ok(ReconciliationStatus::Approved)
        );
    }

    #[test]
    fn edit_rules() {
        let creator = Uuid::new_v4();
        assert!(ensure_can_edit(ReconciliationStatus::Draft, creator, creator).is_ok());
        assert_eq!(
            ensure_can_edit(ReconciliationStatus::Draft, creator, Uuid::new_v4()),
            Err(ReconciliationError::NotCreator)
        );
        assert_eq!(
            ensure_can_edit(ReconciliationStatus::Pending, creator, creator),
            Err(ReconciliationError::NotEditable(ReconciliationStatus::Pending))
        );
        assert!(ensure_can_delete(ReconciliationStatus::Draft, UserRole::Manager).is_ok());
        assert_eq!(
            ensure_can_delete(ReconciliationStatus::Draft, UserRole::Staff),
            Err(ReconciliationError::DeleteNotPermitted)
        );
    }

    #[test]
    fn duplicate_products_rejected() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(ensure_unique_products(&[a, b]).is_ok());
        assert_eq!(
            ensure_unique_products(&[a, b, a]),
            Err(ReconciliationError::DuplicateProduct(a))
        );
    }

    #[test]
    fn apply_discrepancy_guards_negative_stock() {
        let id = Uuid::new_v4();
        assert_eq!(apply_discrepancy(id, 10, -4), Ok(6));
        assert_eq!(apply_discrepancy(id, 10, 5), Ok(15));
        assert!(apply_discrepancy(id, 2, -3).is_err());
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            ReconciliationStatus::Draft,
            ReconciliationStatus::Pending,
            ReconciliationStatus::Approved,
            ReconciliationStatus::Rejected,
        ] {
            assert_eq!(ReconciliationStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(ReconciliationStatus::from_str("draft").is_err());
    }
}

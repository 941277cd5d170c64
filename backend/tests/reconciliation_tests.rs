//! Stock reconciliation workflow tests
//!
//! Property and unit tests for:
//! - status transitions (DRAFT -> PENDING -> APPROVED / REJECTED)
//! - who may submit, approve, reject and delete
//! - discrepancy arithmetic and its application to stock
//!
//! The database tests run the service against a migrated PostgreSQL pool
//! named by `DATABASE_URL`; run them with `cargo test -- --ignored`.

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    apply_discrepancy, authorize_transition, ensure_can_delete, ensure_can_edit,
    ensure_unique_products, CountLine, ReconciliationAction, ReconciliationError,
    ReconciliationItem, ReconciliationStatus, ReconciliationSummary, UserRole,
};
use uuid::Uuid;

// ============================================================================
// Property Test Strategies
// ============================================================================

fn status_strategy() -> impl Strategy<Value = ReconciliationStatus> {
    prop_oneof![
        Just(ReconciliationStatus::Draft),
        Just(ReconciliationStatus::Pending),
        Just(ReconciliationStatus::Approved),
        Just(ReconciliationStatus::Rejected),
    ]
}

fn action_strategy() -> impl Strategy<Value = ReconciliationAction> {
    prop_oneof![
        Just(ReconciliationAction::Submit),
        Just(ReconciliationAction::Approve),
        Just(ReconciliationAction::Reject),
    ]
}

fn role_strategy() -> impl Strategy<Value = UserRole> {
    prop_oneof![
        Just(UserRole::Admin),
        Just(UserRole::Manager),
        Just(UserRole::Staff),
    ]
}

/// Unit cost with two decimal places
fn cost_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..100_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn item(system: i32, physical: i32, unit_cost: Decimal) -> ReconciliationItem {
    let line = CountLine::new(Uuid::new_v4(), system, physical).unwrap();
    ReconciliationItem {
        id: Uuid::new_v4(),
        product_id: line.product_id,
        product_name: "Item".into(),
        product_sku: "SKU-1".into(),
        system_count: system,
        physical_count: physical,
        discrepancy: line.discrepancy(),
        unit_cost,
        estimated_impact: line.estimated_impact(unit_cost),
        reason: None,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_happy_path_to_approval() {
        let creator = Uuid::new_v4();
        let admin = Uuid::new_v4();

        let pending = authorize_transition(
            ReconciliationStatus::Draft,
            ReconciliationAction::Submit,
            creator,
            creator,
            UserRole::Staff,
            3,
        )
        .unwrap();
        assert_eq!(pending, ReconciliationStatus::Pending);

        let approved = authorize_transition(
            pending,
            ReconciliationAction::Approve,
            creator,
            admin,
            UserRole::Admin,
            3,
        )
        .unwrap();
        assert_eq!(approved, ReconciliationStatus::Approved);
    }

    #[test]
    fn test_empty_draft_cannot_be_submitted() {
        let creator = Uuid::new_v4();
        let err = authorize_transition(
            ReconciliationStatus::Draft,
            ReconciliationAction::Submit,
            creator,
            creator,
            UserRole::Manager,
            0,
        )
        .unwrap_err();
        assert_eq!(err, ReconciliationError::NoItems);
    }

    #[test]
    fn test_only_creator_submits() {
        let err = authorize_transition(
            ReconciliationStatus::Draft,
            ReconciliationAction::Submit,
            Uuid::new_v4(),
            Uuid::new_v4(),
            UserRole::Admin,
            1,
        )
        .unwrap_err();
        assert_eq!(err, ReconciliationError::NotCreator);
    }

    #[test]
    fn test_manager_cannot_approve() {
        let err = authorize_transition(
            ReconciliationStatus::Pending,
            ReconciliationAction::Approve,
            Uuid::new_v4(),
            Uuid::new_v4(),
            UserRole::Manager,
            1,
        )
        .unwrap_err();
        assert_eq!(err, ReconciliationError::ApproverRequired);
    }

    #[test]
    fn test_admin_may_approve_own_reconciliation() {
        let admin = Uuid::new_v4();
        let next = authorize_transition(
            ReconciliationStatus::Pending,
            ReconciliationAction::Approve,
            admin,
            admin,
            UserRole::Admin,
            1,
        );
        assert_eq!(next, Ok(ReconciliationStatus::Approved));
    }

    #[test]
    fn test_edit_and_delete_rules() {
        let creator = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(ensure_can_edit(ReconciliationStatus::Draft, creator, creator).is_ok());
        assert_eq!(
            ensure_can_edit(ReconciliationStatus::Draft, creator, other),
            Err(ReconciliationError::NotCreator)
        );
        assert_eq!(
            ensure_can_edit(ReconciliationStatus::Pending, creator, creator),
            Err(ReconciliationError::NotEditable(ReconciliationStatus::Pending))
        );

        assert!(ensure_can_delete(ReconciliationStatus::Draft, UserRole::Admin).is_ok());
        assert!(ensure_can_delete(ReconciliationStatus::Draft, UserRole::Manager).is_ok());
        assert_eq!(
            ensure_can_delete(ReconciliationStatus::Draft, UserRole::Staff),
            Err(ReconciliationError::DeleteNotPermitted)
        );
        assert_eq!(
            ensure_can_delete(ReconciliationStatus::Approved, UserRole::Admin),
            Err(ReconciliationError::NotEditable(ReconciliationStatus::Approved))
        );
    }

    #[test]
    fn test_duplicate_products_rejected() {
        let id = Uuid::new_v4();
        assert_eq!(
            ensure_unique_products(&[id, Uuid::new_v4(), id]),
            Err(ReconciliationError::DuplicateProduct(id))
        );
    }

    #[test]
    fn test_negative_physical_count_rejected() {
        assert_eq!(
            CountLine::new(Uuid::new_v4(), 5, -1),
            Err(ReconciliationError::NegativeCount)
        );
    }

    #[test]
    fn test_summary_splits_surplus_and_shortage() {
        let cost = Decimal::new(250, 2);
        let items = vec![item(10, 12, cost), item(10, 7, cost), item(4, 4, cost)];
        let summary = ReconciliationSummary::from_items(&items);

        assert_eq!(summary.item_count, 3);
        assert_eq!(summary.surplus_units, 2);
        assert_eq!(summary.shortage_units, 3);
        assert_eq!(summary.net_discrepancy, -1);
        assert_eq!(summary.total_impact, Decimal::new(-250, 2));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        /// Terminal statuses accept no further action
        #[test]
        fn prop_terminal_statuses_are_final(
            status in prop_oneof![
                Just(ReconciliationStatus::Approved),
                Just(ReconciliationStatus::Rejected),
            ],
            action in action_strategy(),
            role in role_strategy(),
        ) {
            let actor = Uuid::new_v4();
            let result = authorize_transition(status, action, actor, actor, role, 5);
            let is_invalid_transition = matches!(result, Err(ReconciliationError::InvalidTransition { .. }));
            prop_assert!(is_invalid_transition);
        }

        /// Every successful transition lands on the status `apply` predicts
        #[test]
        fn prop_authorized_transition_matches_state_machine(
            status in status_strategy(),
            action in action_strategy(),
            role in role_strategy(),
            items in 0usize..5,
        ) {
            let actor = Uuid::new_v4();
            if let Ok(next) = authorize_transition(status, action, actor, actor, role, items) {
                prop_assert_eq!(Ok(next), status.apply(action));
                prop_assert_ne!(next, ReconciliationStatus::Draft);
            }
        }

        /// Only administrators can reach APPROVED or REJECTED
        #[test]
        fn prop_decisions_require_admin(
            action in prop_oneof![Just(ReconciliationAction::Approve), Just(ReconciliationAction::Reject)],
            role in role_strategy(),
        ) {
            let result = authorize_transition(
                ReconciliationStatus::Pending,
                action,
                Uuid::new_v4(),
                Uuid::new_v4(),
                role,
                1,
            );
            prop_assert_eq!(result.is_ok(), role == UserRole::Admin);
        }

        /// Discrepancy is physical minus system and impact scales with cost
        #[test]
        fn prop_discrepancy_and_impact(
            system in 0i32..10_000,
            physical in 0i32..10_000,
            unit_cost in cost_strategy(),
        ) {
            let line = CountLine::new(Uuid::new_v4(), system, physical).unwrap();
            prop_assert_eq!(line.discrepancy(), physical - system);
            prop_assert_eq!(
                line.estimated_impact(unit_cost),
                Decimal::from(physical - system) * unit_cost
            );
        }

        /// Approval moves stock by the discrepancy and never below zero
        #[test]
        fn prop_applied_discrepancy_keeps_stock_non_negative(
            current in 0i32..10_000,
            discrepancy in -20_000i32..20_000,
        ) {
            let product = Uuid::new_v4();
            match apply_discrepancy(product, current, discrepancy) {
                Ok(next) => {
                    prop_assert!(next >= 0);
                    prop_assert_eq!(next, current + discrepancy);
                }
                Err(e) => {
                    prop_assert!(current + discrepancy < 0);
                    let is_negative_stock = matches!(e, ReconciliationError::NegativeStock { .. });
                    prop_assert!(is_negative_stock);
                }
            }
        }

        /// Counting stock unchanged since the snapshot reproduces the physical count
        #[test]
        fn prop_approval_on_unchanged_stock_matches_count(
            system in 0i32..10_000,
            physical in 0i32..10_000,
        ) {
            let line = CountLine::new(Uuid::new_v4(), system, physical).unwrap();
            let after = apply_discrepancy(line.product_id, system, line.discrepancy()).unwrap();
            prop_assert_eq!(after, physical);
        }

        /// Summary net discrepancy is the sum of the items
        #[test]
        fn prop_summary_net_is_sum(counts in prop::collection::vec((0i32..500, 0i32..500), 0..20)) {
            let items: Vec<_> = counts
                .iter()
                .map(|(s, p)| item(*s, *p, Decimal::ONE))
                .collect();
            let summary = ReconciliationSummary::from_items(&items);
            let expected: i64 = counts.iter().map(|(s, p)| i64::from(p - s)).sum();
            prop_assert_eq!(summary.net_discrepancy, expected);
            prop_assert_eq!(summary.surplus_units - summary.shortage_units, expected);
            prop_assert_eq!(summary.item_count, counts.len());
        }
    }
}

// ============================================================================
// Database Tests
// ============================================================================

#[cfg(test)]
mod database_tests {
    use super::*;
    use retail_pos_backend::{
        config::EmailConfig,
        error::AppError,
        external::EmailClient,
        middleware::AuthUser,
        services::{
            reconciliation::{
                ApproveInput, CountInput, CreateReconciliationInput, RejectInput,
                UpdateReconciliationInput,
            },
            NotificationService, ReconciliationService,
        },
        MIGRATOR,
    };
    use sqlx::{postgres::PgPoolOptions, PgPool};

    async fn pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .expect("connect");
        MIGRATOR.run(&pool).await.expect("migrate");
        pool
    }

    fn service(db: &PgPool) -> ReconciliationService {
        let email = EmailClient::new(&EmailConfig {
            api_endpoint: "http://127.0.0.1:1/emails".into(),
            api_key: None,
            from_address: "store@test.local".into(),
        });
        ReconciliationService::new(db.clone(), NotificationService::new(db.clone(), email))
    }

    async fn user(db: &PgPool, role: UserRole) -> AuthUser {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO users (name, email, password_hash, role) VALUES ($1, $2, 'unused', $3) RETURNING id",
        )
        .bind(format!("{} tester", role))
        .bind(format!("{}@test.local", Uuid::new_v4()))
        .bind(role.as_str())
        .fetch_one(db)
        .await
        .expect("insert user");
        AuthUser { user_id, role }
    }

    async fn product(db: &PgPool, stock: i32) -> Uuid {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO products (name, sku, cost_price, selling_price, stock_quantity)
            VALUES ('Counted Item', $1, 2.50, 4.00, $2)
            RETURNING id
            "#,
        )
        .bind(format!("T-{}", Uuid::new_v4().simple()))
        .bind(stock)
        .fetch_one(db)
        .await
        .expect("insert product")
    }

    async fn stock_of(db: &PgPool, product_id: Uuid) -> i32 {
        sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_one(db)
            .await
            .expect("stock")
    }

    async fn movements_of(db: &PgPool, product_id: Uuid) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements WHERE product_id = $1")
            .bind(product_id)
            .fetch_one(db)
            .await
            .expect("movements")
    }

    fn counts(lines: &[(Uuid, i32)]) -> CreateReconciliationInput {
        CreateReconciliationInput {
            title: "Shelf count".into(),
            description: None,
            notes: None,
            items: lines
                .iter()
                .map(|&(product_id, physical_count)| CountInput {
                    product_id,
                    physical_count,
                    reason: None,
                })
                .collect(),
        }
    }

    fn rejection() -> RejectInput {
        RejectInput {
            reason: "Recount aisle 4".into(),
        }
    }

    #[tokio::test]
    #[ignore] // Requires database connection
    async fn test_only_approval_changes_stock() {
        let db = pool().await;
        let svc = service(&db);
        let staff = user(&db, UserRole::Staff).await;
        let admin = user(&db, UserRole::Admin).await;
        let a = product(&db, 10).await;
        let b = product(&db, 4).await;

        let approved = svc.create(&staff, counts(&[(a, 7), (b, 6)])).await.unwrap();
        svc.submit(&staff, approved.id).await.unwrap();

        let rejected = svc.create(&staff, counts(&[(a, 0)])).await.unwrap();
        svc.submit(&staff, rejected.id).await.unwrap();
        let rejected = svc.reject(&admin, rejected.id, rejection()).await.unwrap();
        assert_eq!(rejected.status, ReconciliationStatus::Rejected);

        assert_eq!(stock_of(&db, a).await, 10);
        assert_eq!(stock_of(&db, b).await, 4);
        assert_eq!(movements_of(&db, a).await, 0);

        let approved = svc
            .approve(&admin, approved.id, ApproveInput::default())
            .await
            .unwrap();
        assert_eq!(approved.status, ReconciliationStatus::Approved);
        assert_eq!(approved.approved_by, Some(admin.user_id));
        assert_eq!(stock_of(&db, a).await, 7);
        assert_eq!(stock_of(&db, b).await, 6);
        assert_eq!(movements_of(&db, a).await, 1);
        assert_eq!(movements_of(&db, b).await, 1);
    }

    #[tokio::test]
    #[ignore] // Requires database connection
    async fn test_approval_is_all_or_nothing() {
        let db = pool().await;
        let svc = service(&db);
        let staff = user(&db, UserRole::Staff).await;
        let admin = user(&db, UserRole::Admin).await;
        let surplus = product(&db, 10).await;
        let shortage = product(&db, 5).await;

        let rec = svc
            .create(&staff, counts(&[(surplus, 12), (shortage, 0)]))
            .await
            .unwrap();
        svc.submit(&staff, rec.id).await.unwrap();

        // Sales after the count leave too little stock to absorb the shortage.
        sqlx::query("UPDATE products SET stock_quantity = 2 WHERE id = $1")
            .bind(shortage)
            .execute(&db)
            .await
            .unwrap();

        let result = svc.approve(&admin, rec.id, ApproveInput::default()).await;
        assert!(matches!(result, Err(AppError::InsufficientStock(_))), "{:?}", result);

        assert_eq!(stock_of(&db, surplus).await, 10);
        assert_eq!(stock_of(&db, shortage).await, 2);
        assert_eq!(movements_of(&db, surplus).await, 0);
        assert_eq!(svc.get(rec.id).await.unwrap().status, ReconciliationStatus::Pending);
    }

    #[tokio::test]
    #[ignore] // Requires database connection
    async fn test_submitted_reconciliation_is_frozen() {
        let db = pool().await;
        let svc = service(&db);
        let staff = user(&db, UserRole::Staff).await;
        let manager = user(&db, UserRole::Manager).await;
        let item = product(&db, 3).await;

        let rec = svc.create(&staff, counts(&[(item, 1)])).await.unwrap();
        svc.submit(&staff, rec.id).await.unwrap();

        let update = UpdateReconciliationInput {
            title: Some("Recount".into()),
            description: None,
            notes: None,
            items: Some(vec![CountInput {
                product_id: item,
                physical_count: 2,
                reason: None,
            }]),
        };
        let result = svc.update(&staff, rec.id, update).await;
        assert!(matches!(result, Err(AppError::InvalidStateTransition(_))), "{:?}", result);

        let result = svc.delete(&manager, rec.id).await;
        assert!(matches!(result, Err(AppError::InvalidStateTransition(_))), "{:?}", result);

        let current = svc.get(rec.id).await.unwrap();
        assert_eq!(current.title, "Shelf count");
        assert_eq!(current.items[0].physical_count, 1);
    }

    #[tokio::test]
    #[ignore] // Requires database connection
    async fn test_concurrent_decisions_have_one_winner() {
        let db = pool().await;
        let svc = service(&db);
        let staff = user(&db, UserRole::Staff).await;
        let first = user(&db, UserRole::Admin).await;
        let second = user(&db, UserRole::Admin).await;
        let item = product(&db, 8).await;

        let rec = svc.create(&staff, counts(&[(item, 5)])).await.unwrap();
        svc.submit(&staff, rec.id).await.unwrap();

        let (approved, rejected) = tokio::join!(
            svc.approve(&first, rec.id, ApproveInput::default()),
            svc.reject(&second, rec.id, rejection()),
        );

        let final_status = match (&approved, &rejected) {
            (Ok(_), Err(AppError::InvalidStateTransition(_))) => ReconciliationStatus::Approved,
            (Err(AppError::InvalidStateTransition(_)), Ok(_)) => ReconciliationStatus::Rejected,
            other => panic!("expected exactly one decision to win, got {:?}", other),
        };
        assert_eq!(svc.get(rec.id).await.unwrap().status, final_status);

        let expected_stock = if final_status == ReconciliationStatus::Approved { 5 } else { 8 };
        assert_eq!(stock_of(&db, item).await, expected_stock);

        let again = svc.approve(&first, rec.id, ApproveInput::default()).await;
        assert!(matches!(again, Err(AppError::InvalidStateTransition(_))), "{:?}", again);
    }
}

//! Point-of-sale pricing and receipt tests
//!
//! Property and unit tests for:
//! - cart totals (discount before tax, two-decimal rounding)
//! - payment settlement and change
//! - thermal receipt layout at 32 and 48 columns
//! - idempotent checkout against a migrated database (`DATABASE_URL`, ignored
//!   by default)

use chrono::{NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    compute_totals, format_receipt_number, render_receipt, settle_payment, CartError, CartLine,
    PaperWidth, PaymentMethod, Sale, SaleLine, SaleStatus, StoreInfo,
};
use std::str::FromStr;
use uuid::Uuid;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn cart_line(quantity: i32, unit_price: Decimal) -> CartLine {
    CartLine {
        product_id: Uuid::new_v4(),
        name: "Item".into(),
        quantity,
        unit_price,
    }
}

fn store() -> StoreInfo {
    StoreInfo {
        name: "Corner Mart".into(),
        address: Some("12 Market Street, Springfield".into()),
        phone: Some("+1 555 0100".into()),
        currency: "USD".into(),
        footer: None,
    }
}

fn sale(lines: Vec<SaleLine>, status: SaleStatus) -> Sale {
    let subtotal: Decimal = lines.iter().map(|l| l.line_total).sum();
    Sale {
        id: Uuid::new_v4(),
        receipt_number: "RCP-20240315-000042".into(),
        client_reference: None,
        status,
        cashier_id: Uuid::new_v4(),
        cashier_name: "Jordan".into(),
        customer_name: None,
        payment_method: PaymentMethod::Cash,
        subtotal,
        discount: Decimal::ZERO,
        tax: Decimal::ZERO,
        total: subtotal,
        amount_tendered: subtotal + dec("5"),
        change_due: dec("5"),
        lines,
        sold_at: Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap(),
        voided_at: None,
        void_reason: None,
    }
}

fn sale_line(name: &str, quantity: i32, unit_price: Decimal) -> SaleLine {
    SaleLine {
        id: Uuid::new_v4(),
        product_id: Uuid::new_v4(),
        product_name: name.into(),
        sku: "SKU-001".into(),
        quantity,
        unit_price,
        line_total: unit_price * Decimal::from(quantity),
    }
}

// ============================================================================
// Property Test Strategies
// ============================================================================

fn price_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn cart_strategy() -> impl Strategy<Value = Vec<CartLine>> {
    prop::collection::vec(
        (1i32..50, price_strategy()).prop_map(|(q, p)| cart_line(q, p)),
        1..10,
    )
}

fn tax_rate_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=2500).prop_map(|bp| Decimal::new(bp, 4))
}

fn width_strategy() -> impl Strategy<Value = PaperWidth> {
    prop_oneof![Just(PaperWidth::Narrow), Just(PaperWidth::Wide)]
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_discount_applies_before_tax() {
        let lines = vec![cart_line(2, dec("10.00")), cart_line(1, dec("5.50"))];
        let totals = compute_totals(&lines, dec("5.50"), dec("0.10")).unwrap();

        assert_eq!(totals.subtotal, dec("25.50"));
        assert_eq!(totals.tax, dec("2.00"));
        assert_eq!(totals.total, dec("22.00"));
    }

    #[test]
    fn test_tax_rounds_half_away_from_zero() {
        let totals = compute_totals(&[cart_line(1, dec("0.05"))], Decimal::ZERO, dec("0.10")).unwrap();
        assert_eq!(totals.tax, dec("0.01"));
    }

    #[test]
    fn test_cart_errors() {
        assert_eq!(compute_totals(&[], Decimal::ZERO, Decimal::ZERO), Err(CartError::Empty));

        let zero = cart_line(0, dec("1.00"));
        assert_eq!(
            compute_totals(&[zero.clone()], Decimal::ZERO, Decimal::ZERO),
            Err(CartError::NonPositiveQuantity(zero.product_id))
        );

        let lines = vec![cart_line(1, dec("3.00"))];
        assert_eq!(
            compute_totals(&lines, dec("3.01"), Decimal::ZERO),
            Err(CartError::InvalidDiscount)
        );
        assert_eq!(
            compute_totals(&lines, dec("-1"), Decimal::ZERO),
            Err(CartError::InvalidDiscount)
        );
    }

    #[test]
    fn test_sub_cent_amounts_rejected() {
        let lines = vec![cart_line(1, dec("10.00"))];
        assert_eq!(
            compute_totals(&lines, dec("0.005"), dec("0.10")),
            Err(CartError::InvalidDiscount)
        );
        assert_eq!(
            settle_payment(PaymentMethod::Cash, Some(dec("20.001")), dec("11.00")),
            Err(CartError::InvalidAmount)
        );
        assert_eq!(
            settle_payment(PaymentMethod::Cash, Some(dec("-5")), Decimal::ZERO),
            Err(CartError::InvalidAmount)
        );
        // trailing zeros are fine
        let totals = compute_totals(&lines, dec("0.500"), dec("0.10")).unwrap();
        assert_eq!(totals.total, dec("10.45"));
    }

    #[test]
    fn test_full_discount_gives_zero_total() {
        let lines = vec![cart_line(1, dec("3.00"))];
        let totals = compute_totals(&lines, dec("3.00"), dec("0.07")).unwrap();
        assert_eq!(totals.total, Decimal::ZERO);
    }

    #[test]
    fn test_cash_change_and_card_exact() {
        let cash = settle_payment(PaymentMethod::Cash, Some(dec("20")), dec("17.25")).unwrap();
        assert_eq!(cash.change_due, dec("2.75"));

        let exact = settle_payment(PaymentMethod::Cash, None, dec("17.25")).unwrap();
        assert_eq!(exact.amount_tendered, dec("17.25"));

        let card = settle_payment(PaymentMethod::Card, Some(dec("100")), dec("17.25")).unwrap();
        assert_eq!(card.amount_tendered, dec("17.25"));
        assert_eq!(card.change_due, Decimal::ZERO);

        assert!(matches!(
            settle_payment(PaymentMethod::Cash, Some(dec("10")), dec("17.25")),
            Err(CartError::InsufficientPayment { .. })
        ));
    }

    #[test]
    fn test_receipt_number_format() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(format_receipt_number(date, 42), "RCP-20240315-000042");
    }

    #[test]
    fn test_receipt_contents() {
        let s = sale(vec![sale_line("Sparkling Water 500ml", 3, dec("1.20"))], SaleStatus::Completed);
        let text = render_receipt(&store(), &s, PaperWidth::Wide);

        assert!(text.contains("CORNER MART"));
        assert!(text.contains("RCP-20240315-000042"));
        assert!(text.contains("Sparkling Water 500ml"));
        assert!(text.contains("3.60"));
        assert!(text.contains("TOTAL (USD)"));
        assert!(text.contains("Change"));
        assert!(!text.contains("VOIDED"));
    }

    #[test]
    fn test_long_item_name_takes_one_line() {
        let name = "Extra Virgin Olive Oil Cold Pressed Family Size 2 Litre Bottle";
        let s = sale(vec![sale_line(name, 1, dec("14.99"))], SaleStatus::Completed);
        let text = render_receipt(&store(), &s, PaperWidth::Narrow);

        let expected: String = name.chars().take(32).collect();
        let lines: Vec<&str> = text.lines().collect();
        let at = lines.iter().position(|l| *l == expected).unwrap();
        assert!(lines[at + 1].starts_with("  1 x 14.99"));
        assert!(!text.contains("Bottle"));
    }

    #[test]
    fn test_voided_receipt_is_marked() {
        let mut s = sale(vec![sale_line("Cola", 1, dec("2.00"))], SaleStatus::Voided);
        s.void_reason = Some("Wrong item scanned".into());
        let text = render_receipt(&store(), &s, PaperWidth::Narrow);

        assert!(text.contains("*** VOIDED ***"));
        assert!(text.contains("Wrong item scanned"));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        /// total = subtotal - discount + tax, and subtotal is the sum of lines
        #[test]
        fn prop_totals_are_consistent(
            lines in cart_strategy(),
            discount_pct in 0u32..=100,
            tax_rate in tax_rate_strategy(),
        ) {
            let subtotal: Decimal = lines.iter().map(CartLine::line_total).sum();
            let discount = (subtotal * Decimal::from(discount_pct) / Decimal::from(100)).round_dp(2);
            let totals = compute_totals(&lines, discount, tax_rate).unwrap();

            prop_assert_eq!(totals.subtotal, subtotal);
            prop_assert_eq!(totals.total, totals.subtotal - totals.discount + totals.tax);
            prop_assert!(totals.tax >= Decimal::ZERO);
            prop_assert!(totals.total >= Decimal::ZERO);
            prop_assert!(totals.tax.scale() <= 2);
        }

        /// Cash change is exactly tendered minus total
        #[test]
        fn prop_cash_change(total in price_strategy(), extra in 0i64..100_000) {
            let tendered = total + Decimal::new(extra, 2);
            let tender = settle_payment(PaymentMethod::Cash, Some(tendered), total).unwrap();
            prop_assert_eq!(tender.change_due, tendered - total);
            prop_assert_eq!(tender.amount_tendered - tender.change_due, total);
        }

        /// No receipt line is wider than the paper
        #[test]
        fn prop_receipt_lines_fit_paper(
            width in width_strategy(),
            names in prop::collection::vec("[A-Za-z0-9 ]{1,80}", 1..6),
            quantity in 1i32..1000,
            price in price_strategy(),
            customer in proptest::option::of("[A-Za-z ]{1,60}"),
        ) {
            let lines = names.iter().map(|n| sale_line(n, quantity, price)).collect();
            let mut s = sale(lines, SaleStatus::Completed);
            s.customer_name = customer;
            let text = render_receipt(&store(), &s, width);

            for line in text.lines() {
                prop_assert!(
                    line.chars().count() <= width.columns(),
                    "line too wide for {} columns: {:?}", width.columns(), line
                );
            }
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
        external::EmailClient,
        middleware::AuthUser,
        services::{
            sale::{CheckoutInput, CheckoutLineInput},
            NotificationService, SaleService,
        },
        MIGRATOR,
    };
    use shared::UserRole;
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

    fn sales(db: &PgPool) -> SaleService {
        let email = EmailClient::new(&EmailConfig {
            api_endpoint: "http://127.0.0.1:1/emails".into(),
            api_key: None,
            from_address: "store@test.local".into(),
        });
        SaleService::new(
            db.clone(),
            NotificationService::new(db.clone(), email),
            dec("0.10"),
        )
    }

    #[tokio::test]
    #[ignore] // Requires database connection
    async fn test_checkout_is_idempotent_on_client_reference() {
        let db = pool().await;
        let svc = sales(&db);

        let cashier = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO users (name, email, password_hash, role) VALUES ('Till 1', $1, 'unused', 'STAFF') RETURNING id",
        )
        .bind(format!("{}@test.local", Uuid::new_v4()))
        .fetch_one(&db)
        .await
        .unwrap();
        let cashier = AuthUser {
            user_id: cashier,
            role: UserRole::Staff,
        };

        let product = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO products (name, sku, cost_price, selling_price, stock_quantity)
            VALUES ('Cola 330ml', $1, 0.60, 1.50, 10)
            RETURNING id
            "#,
        )
        .bind(format!("T-{}", Uuid::new_v4().simple()))
        .fetch_one(&db)
        .await
        .unwrap();

        let reference = Uuid::new_v4();
        let input = CheckoutInput {
            lines: vec![CheckoutLineInput {
                product_id: product,
                quantity: 2,
            }],
            discount: None,
            payment_method: PaymentMethod::Cash,
            amount_tendered: Some(dec("5.00")),
            customer_name: None,
            client_reference: Some(reference),
            sold_at: None,
        };

        let first = svc.checkout(&cashier, input.clone()).await.unwrap();
        assert!(!first.duplicate);
        assert_eq!(first.sale.total, dec("3.30"));
        assert_eq!(first.sale.change_due, dec("1.70"));
        assert_eq!(first.sale.cashier_name, "Till 1");
        assert_eq!(first.sale.lines.len(), 1);

        let replay = svc.checkout(&cashier, input).await.unwrap();
        assert!(replay.duplicate);
        assert_eq!(replay.sale.id, first.sale.id);
        assert_eq!(replay.sale.receipt_number, first.sale.receipt_number);

        let stock: i32 = sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1")
            .bind(product)
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(stock, 8);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales WHERE client_reference = $1")
            .bind(reference)
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(count, 1);

        // What checkout reports matches what a later read returns.
        let stored = svc.get(first.sale.id).await.unwrap();
        assert_eq!(stored.lines, first.sale.lines);
        assert_eq!(stored.total, first.sale.total);
    }
}

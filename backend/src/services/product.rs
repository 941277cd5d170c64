//! Product catalog service
//!
//! Stock levels are read-only here: they change through sales, purchase
//! order receipts and approved reconciliations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    PaginatedResponse, Pagination, Product, StockMovement, StockMovementType, StockStatus,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{map_unique_violation, AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::stock::{record_movement, NewMovement};

/// Product service
#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
}

/// Product with joined names and derived stock status
#[derive(Debug, Clone, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub stock_status: StockStatus,
    pub category_name: Option<String>,
    pub brand_name: Option<String>,
    pub supplier_name: Option<String>,
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    sku: String,
    barcode: Option<String>,
    description: Option<String>,
    category_id: Option<Uuid>,
    brand_id: Option<Uuid>,
    supplier_id: Option<Uuid>,
    cost_price: Decimal,
    selling_price: Decimal,
    stock_quantity: i32,
    reorder_level: i32,
    unit: String,
    image_url: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    category_name: Option<String>,
    brand_name: Option<String>,
    supplier_name: Option<String>,
}

impl From<ProductRow> for ProductView {
    fn from(row: ProductRow) -> Self {
        let product = Product {
            id: row.id,
            name: row.name,
            sku: row.sku,
            barcode: row.barcode,
            description: row.description,
            category_id: row.category_id,
            brand_id: row.brand_id,
            supplier_id: row.supplier_id,
            cost_price: row.cost_price,
            selling_price: row.selling_price,
            stock_quantity: row.stock_quantity,
            reorder_level: row.reorder_level,
            unit: row.unit,
            image_url: row.image_url,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        ProductView {
            stock_status: product.stock_status(),
            product,
            category_name: row.category_name,
            brand_name: row.brand_name,
            supplier_name: row.supplier_name,
        }
    }
}

#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    product_id: Uuid,
    movement_type: String,
    quantity: i32,
    quantity_after: i32,
    reference_type: Option<String>,
    reference_id: Option<Uuid>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl MovementRow {
    fn into_movement(self) -> AppResult<StockMovement> {
        Ok(StockMovement {
            id: self.id,
            product_id: self.product_id,
            movement_type: self.movement_type.parse()?,
            quantity: self.quantity,
            quantity_after: self.quantity_after,
            reference_type: self.reference_type,
            reference_id: self.reference_id,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

/// Input for creating a product
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    pub sku: String,
    pub barcode: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    #[validate(range(min = 0, message = "Initial stock cannot be negative"))]
    pub initial_stock: Option<i32>,
    #[validate(range(min = 0, message = "Reorder level cannot be negative"))]
    pub reorder_level: Option<i32>,
    #[validate(length(min = 1, max = 20))]
    pub unit: Option<String>,
    #[validate(url(message = "Invalid image URL"))]
    pub image_url: Option<String>,
}

/// Input for updating a product; stock is not editable
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    #[validate(range(min = 0, message = "Reorder level cannot be negative"))]
    pub reorder_level: Option<i32>,
    #[validate(length(min = 1, max = 20))]
    pub unit: Option<String>,
    #[validate(url(message = "Invalid image URL"))]
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
    /// Present only to reject direct stock edits with a clear message
    pub stock_quantity: Option<i32>,
}

/// Product list filter
#[derive(Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub low_stock: Option<bool>,
    pub include_inactive: Option<bool>,
}

/// What a delete request did
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    /// Product has history and was deactivated instead
    Deactivated,
}

const PRODUCT_SELECT: &str = r#"
    SELECT p.id, p.name, p.sku, p.barcode, p.description, p.category_id, p.brand_id,
           p.supplier_id, p.cost_price, p.selling_price, p.stock_quantity, p.reorder_level,
           p.unit, p.image_url, p.is_active, p.created_at, p.updated_at,
           c.name AS category_name, b.name AS brand_name, s.name AS supplier_name
    FROM products p
    LEFT JOIN categories c ON c.id = p.category_id
    LEFT JOIN brands b ON b.id = p.brand_id
    LEFT JOIN suppliers s ON s.id = p.supplier_id
"#;

const PRODUCT_FILTER: &str = r#"
    WHERE ($1::text IS NULL
           OR p.name ILIKE '%' || $1 || '%'
           OR p.sku ILIKE '%' || $1 || '%'
           OR p.barcode = $1)
      AND ($2::uuid IS NULL OR p.category_id = $2)
      AND ($3::uuid IS NULL OR p.brand_id = $3)
      AND ($4::uuid IS NULL OR p.supplier_id = $4)
      AND (NOT $5 OR p.stock_quantity <= p.reorder_level)
      AND ($6 OR p.is_active)
"#;

impl ProductService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Search and filter products
    pub async fn list(
        &self,
        filter: &ProductFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<ProductView>> {
        let search = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let low_stock = filter.low_stock.unwrap_or(false);
        let include_inactive = filter.include_inactive.unwrap_or(false);

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM products p {PRODUCT_FILTER}"
        ))
        .bind(search)
        .bind(filter.category_id)
        .bind(filter.brand_id)
        .bind(filter.supplier_id)
        .bind(low_stock)
        .bind(include_inactive)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "{PRODUCT_SELECT} {PRODUCT_FILTER} ORDER BY p.name LIMIT $7 OFFSET $8"
        ))
        .bind(search)
        .bind(filter.category_id)
        .bind(filter.brand_id)
        .bind(filter.supplier_id)
        .bind(low_stock)
        .bind(include_inactive)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows.into_iter().map(ProductView::from).collect();
        Ok(PaginatedResponse::new(data, pagination, total as u64))
    }

    /// Active products at or below their reorder level, emptiest first
    pub async fn low_stock(&self) -> AppResult<Vec<ProductView>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r#"{PRODUCT_SELECT}
            WHERE p.is_active AND p.stock_quantity <= p.reorder_level
            ORDER BY p.stock_quantity, p.name"#
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(ProductView::from).collect())
    }

    pub async fn get(&self, id: Uuid) -> AppResult<ProductView> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("{PRODUCT_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))?;
        Ok(row.into())
    }

    /// Barcode scan lookup for the POS; inactive products are hidden
    pub async fn get_by_barcode(&self, barcode: &str) -> AppResult<ProductView> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "{PRODUCT_SELECT} WHERE p.barcode = $1 AND p.is_active"
        ))
        .bind(barcode.trim())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;
        Ok(row.into())
    }

    /// Create a product, recording opening stock as an INITIAL movement
    pub async fn create(&self, actor: &AuthUser, input: CreateProductInput) -> AppResult<ProductView> {
        input.validate()?;
        let sku = shared::normalize_sku(&input.sku);
        shared::validate_sku(&sku).map_err(|m| AppError::validation("sku", m))?;
        let barcode = normalize_barcode(input.barcode.as_deref())?;
        validate_prices(input.cost_price, input.selling_price)?;
        if shared::is_below_cost(input.cost_price, input.selling_price) {
            tracing::warn!(sku = %sku, "product selling price is below cost");
        }

        self.ensure_unique_codes(None, Some(&sku), barcode.as_deref())
            .await?;

        let initial_stock = input.initial_stock.unwrap_or(0);
        let mut tx = self.db.begin().await?;

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO products (
                name, sku, barcode, description, category_id, brand_id, supplier_id,
                cost_price, selling_price, stock_quantity, reorder_level, unit, image_url
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
            "#,
        )
        .bind(input.name.trim())
        .bind(&sku)
        .bind(&barcode)
        .bind(&input.description)
        .bind(input.category_id)
        .bind(input.brand_id)
        .bind(input.supplier_id)
        .bind(input.cost_price)
        .bind(input.selling_price)
        .bind(initial_stock)
        .bind(input.reorder_level.unwrap_or(0))
        .bind(input.unit.as_deref().unwrap_or("pcs"))
        .bind(&input.image_url)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_reference_error(e, "sku"))?;

        if initial_stock > 0 {
            record_movement(
                &mut tx,
                &NewMovement {
                    product_id: id,
                    movement_type: StockMovementType::Initial,
                    quantity: initial_stock,
                    quantity_after: initial_stock,
                    reference_type: Some("product"),
                    reference_id: Some(id),
                    created_by: Some(actor.user_id),
                },
            )
            .await?;
        }

        tx.commit().await?;
        tracing::info!(product_id = %id, sku = %sku, initial_stock, "product created");

        self.get(id).await
    }

    /// Update catalog fields
    pub async fn update(&self, id: Uuid, input: UpdateProductInput) -> AppResult<ProductView> {
        if input.stock_quantity.is_some() {
            return Err(AppError::validation(
                "stock_quantity",
                "Stock cannot be edited directly; use a stock reconciliation or purchase order",
            ));
        }
        input.validate()?;

        let current = self.get(id).await?.product;
        let sku = match &input.sku {
            Some(raw) => {
                let sku = shared::normalize_sku(raw);
                shared::validate_sku(&sku).map_err(|m| AppError::validation("sku", m))?;
                Some(sku)
            }
            None => None,
        };
        let barcode = normalize_barcode(input.barcode.as_deref())?;
        validate_prices(
            input.cost_price.unwrap_or(current.cost_price),
            input.selling_price.unwrap_or(current.selling_price),
        )?;
        self.ensure_unique_codes(Some(id), sku.as_deref(), barcode.as_deref())
            .await?;

        sqlx::query(
            r#"
            UPDATE products SET
                name = COALESCE($2, name),
                sku = COALESCE($3, sku),
                barcode = COALESCE($4, barcode),
                description = COALESCE($5, description),
                category_id = COALESCE($6, category_id),
                brand_id = COALESCE($7, brand_id),
                supplier_id = COALESCE($8, supplier_id),
                cost_price = COALESCE($9, cost_price),
                selling_price = COALESCE($10, selling_price),
                reorder_level = COALESCE($11, reorder_level),
                unit = COALESCE($12, unit),
                image_url = COALESCE($13, image_url),
                is_active = COALESCE($14, is_active),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(input.name.as_deref().map(str::trim))
        .bind(&sku)
        .bind(&barcode)
        .bind(&input.description)
        .bind(input.category_id)
        .bind(input.brand_id)
        .bind(input.supplier_id)
        .bind(input.cost_price)
        .bind(input.selling_price)
        .bind(input.reorder_level)
        .bind(&input.unit)
        .bind(&input.image_url)
        .bind(input.is_active)
        .execute(&self.db)
        .await
        .map_err(|e| map_reference_error(e, "sku"))?;

        self.get(id).await
    }

    /// Delete a product, or deactivate it when it has transaction history
    pub async fn delete(&self, id: Uuid) -> AppResult<DeleteOutcome> {
        let has_history = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(SELECT 1 FROM sale_lines WHERE product_id = $1)
                OR EXISTS(SELECT 1 FROM purchase_order_lines WHERE product_id = $1)
                OR EXISTS(SELECT 1 FROM stock_reconciliation_items WHERE product_id = $1)
            "#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;

        let result = if has_history {
            sqlx::query("UPDATE products SET is_active = false, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .execute(&self.db)
                .await?
        } else {
            sqlx::query("DELETE FROM products WHERE id = $1")
                .bind(id)
                .execute(&self.db)
                .await?
        };

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let outcome = if has_history {
            DeleteOutcome::Deactivated
        } else {
            DeleteOutcome::Deleted
        };
        tracing::info!(product_id = %id, ?outcome, "product removed");
        Ok(outcome)
    }

    /// Stock ledger for a product, newest first
    pub async fn movements(
        &self,
        product_id: Uuid,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<StockMovement>> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM stock_movements WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, product_id, movement_type, quantity, quantity_after,
                   reference_type, reference_id, created_by, created_at
            FROM stock_movements
            WHERE product_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(product_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows
            .into_iter()
            .map(MovementRow::into_movement)
            .collect::<AppResult<Vec<_>>>()?;
        Ok(PaginatedResponse::new(data, pagination, total as u64))
    }

    async fn ensure_unique_codes(
        &self,
        exclude_id: Option<Uuid>,
        sku: Option<&str>,
        barcode: Option<&str>,
    ) -> AppResult<()> {
        if let Some(sku) = sku {
            let taken = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM products WHERE sku = $1 AND ($2::uuid IS NULL OR id <> $2))",
            )
            .bind(sku)
            .bind(exclude_id)
            .fetch_one(&self.db)
            .await?;
            if taken {
                return Err(AppError::DuplicateEntry("sku".to_string()));
            }
        }
        if let Some(barcode) = barcode {
            let taken = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM products WHERE barcode = $1 AND ($2::uuid IS NULL OR id <> $2))",
            )
            .bind(barcode)
            .bind(exclude_id)
            .fetch_one(&self.db)
            .await?;
            if taken {
                return Err(AppError::DuplicateEntry("barcode".to_string()));
            }
        }
        Ok(())
    }
}

fn normalize_barcode(barcode: Option<&str>) -> AppResult<Option<String>> {
    match barcode.map(str::trim).filter(|b| !b.is_empty()) {
        Some(code) => {
            shared::validate_barcode(code).map_err(|m| AppError::validation("barcode", m))?;
            Ok(Some(code.to_string()))
        }
        None => Ok(None),
    }
}

fn validate_prices(cost_price: Decimal, selling_price: Decimal) -> AppResult<()> {
    shared::validate_price(cost_price).map_err(|m| AppError::validation("cost_price", m))?;
    shared::validate_price(selling_price).map_err(|m| AppError::validation("selling_price", m))?;
    Ok(())
}

/// Unknown category, brand or supplier ids surface as validation errors
fn map_reference_error(err: sqlx::Error, unique_field: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_foreign_key_violation() {
            let field = match db_err.constraint() {
                Some(c) if c.contains("category") => "category_id",
                Some(c) if c.contains("brand") => "brand_id",
                Some(c) if c.contains("supplier") => "supplier_id",
                _ => "reference",
            };
            return AppError::validation(field, format!("Unknown {}", field));
        }
    }
    map_unique_violation(err, unique_field)
}

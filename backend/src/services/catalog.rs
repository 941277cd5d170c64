//! Catalog reference data: categories, brands and suppliers

use chrono::{DateTime, Utc};
use serde::Deserialize;
use shared::{Brand, Category, PaginatedResponse, Pagination, Supplier};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{map_unique_violation, AppError, AppResult};

/// Named lookup tables that products reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Category,
    Brand,
}

impl LookupKind {
    fn table(&self) -> &'static str {
        match self {
            LookupKind::Category => "categories",
            LookupKind::Brand => "brands",
        }
    }

    fn product_column(&self) -> &'static str {
        match self {
            LookupKind::Category => "category_id",
            LookupKind::Brand => "brand_id",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            LookupKind::Category => "Category",
            LookupKind::Brand => "Brand",
        }
    }
}

/// Category and brand service
#[derive(Clone)]
pub struct LookupService {
    db: PgPool,
    kind: LookupKind,
}

/// Category or brand row
#[derive(Debug, Clone, FromRow)]
pub struct LookupRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<LookupRow> for Category {
    fn from(row: LookupRow) -> Self {
        Category {
            id: row.id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<LookupRow> for Brand {
    fn from(row: LookupRow) -> Self {
        Brand {
            id: row.id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Input for creating or updating a category or brand
#[derive(Debug, Deserialize, Validate)]
pub struct LookupInput {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,
}

/// Optional name search for list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct NameFilter {
    pub search: Option<String>,
}

impl LookupService {
    pub fn categories(db: PgPool) -> Self {
        Self {
            db,
            kind: LookupKind::Category,
        }
    }

    pub fn brands(db: PgPool) -> Self {
        Self {
            db,
            kind: LookupKind::Brand,
        }
    }

    pub async fn list<T: From<LookupRow>>(
        &self,
        filter: &NameFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<T>> {
        let search = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let table = self.kind.table();

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM {table} WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%')"
        ))
        .bind(search)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, LookupRow>(&format!(
            r#"
            SELECT id, name, description, created_at, updated_at
            FROM {table}
            WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%')
            ORDER BY name
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows.into_iter().map(T::from).collect();
        Ok(PaginatedResponse::new(data, pagination, total as u64))
    }

    pub async fn get<T: From<LookupRow>>(&self, id: Uuid) -> AppResult<T> {
        let row = sqlx::query_as::<_, LookupRow>(&format!(
            "SELECT id, name, description, created_at, updated_at FROM {} WHERE id = $1",
            self.kind.table()
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(self.kind.label().to_string()))?;
        Ok(T::from(row))
    }

    pub async fn create<T: From<LookupRow>>(&self, input: LookupInput) -> AppResult<T> {
        input.validate()?;

        let row = sqlx::query_as::<_, LookupRow>(&format!(
            r#"
            INSERT INTO {} (name, description)
            VALUES ($1, $2)
            RETURNING id, name, description, created_at, updated_at
            "#,
            self.kind.table()
        ))
        .bind(input.name.trim())
        .bind(&input.description)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_unique_violation(e, "name"))?;

        tracing::info!(kind = self.kind.label(), id = %row.id, name = %row.name, "catalog entry created");
        Ok(T::from(row))
    }

    pub async fn update<T: From<LookupRow>>(&self, id: Uuid, input: LookupInput) -> AppResult<T> {
        input.validate()?;

        let row = sqlx::query_as::<_, LookupRow>(&format!(
            r#"
            UPDATE {} SET name = $2, description = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, description, created_at, updated_at
            "#,
            self.kind.table()
        ))
        .bind(id)
        .bind(input.name.trim())
        .bind(&input.description)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_unique_violation(e, "name"))?
        .ok_or_else(|| AppError::NotFound(self.kind.label().to_string()))?;

        Ok(T::from(row))
    }

    /// Delete an entry that no product references
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let in_use = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM products WHERE {} = $1",
            self.kind.product_column()
        ))
        .bind(id)
        .fetch_one(&self.db)
        .await?;

        if in_use > 0 {
            return Err(AppError::conflict(
                self.kind.table(),
                format!(
                    "{} is used by {} product(s) and cannot be deleted",
                    self.kind.label(),
                    in_use
                ),
            ));
        }

        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", self.kind.table()))
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| map_unique_violation(e, self.kind.table()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(self.kind.label().to_string()));
        }
        Ok(())
    }
}

/// Supplier service
#[derive(Clone)]
pub struct SupplierService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct SupplierRow {
    id: Uuid,
    name: String,
    contact_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SupplierRow> for Supplier {
    fn from(row: SupplierRow) -> Self {
        Supplier {
            id: row.id,
            name: row.name,
            contact_name: row.contact_name,
            email: row.email,
            phone: row.phone,
            address: row.address,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Input for creating or updating a supplier
#[derive(Debug, Deserialize, Validate)]
pub struct SupplierInput {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(max = 200))]
    pub contact_name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
}

const SUPPLIER_COLUMNS: &str =
    "id, name, contact_name, email, phone, address, created_at, updated_at";

impl SupplierService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        filter: &NameFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<Supplier>> {
        let search = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM suppliers WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%')",
        )
        .bind(search)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, SupplierRow>(&format!(
            r#"
            SELECT {SUPPLIER_COLUMNS} FROM suppliers
            WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%')
            ORDER BY name
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows.into_iter().map(Supplier::from).collect();
        Ok(PaginatedResponse::new(data, pagination, total as u64))
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Supplier> {
        let row = sqlx::query_as::<_, SupplierRow>(&format!(
            "SELECT {SUPPLIER_COLUMNS} FROM suppliers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Supplier".to_string()))?;
        Ok(row.into())
    }

    pub async fn create(&self, input: SupplierInput) -> AppResult<Supplier> {
        input.validate()?;

        let row = sqlx::query_as::<_, SupplierRow>(&format!(
            r#"
            INSERT INTO suppliers (name, contact_name, email, phone, address)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {SUPPLIER_COLUMNS}
            "#
        ))
        .bind(input.name.trim())
        .bind(&input.contact_name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(supplier_id = %row.id, name = %row.name, "supplier created");
        Ok(row.into())
    }

    pub async fn update(&self, id: Uuid, input: SupplierInput) -> AppResult<Supplier> {
        input.validate()?;

        let row = sqlx::query_as::<_, SupplierRow>(&format!(
            r#"
            UPDATE suppliers SET
                name = $2, contact_name = $3, email = $4, phone = $5, address = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {SUPPLIER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(input.name.trim())
        .bind(&input.contact_name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Supplier".to_string()))?;

        Ok(row.into())
    }

    /// Delete a supplier with no products or purchase orders
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let in_use = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(SELECT 1 FROM products WHERE supplier_id = $1)
                OR EXISTS(SELECT 1 FROM purchase_orders WHERE supplier_id = $1)
            "#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;

        if in_use {
            return Err(AppError::conflict(
                "suppliers",
                "Supplier is referenced by products or purchase orders and cannot be deleted",
            ));
        }

        let result = sqlx::query("DELETE FROM suppliers WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Supplier".to_string()));
        }
        Ok(())
    }
}

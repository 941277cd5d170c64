//! User management service

use chrono::{DateTime, Utc};
use serde::Deserialize;
use shared::{PaginatedResponse, Pagination, User, UserRole};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{map_unique_violation, AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::auth::hash_password;

/// User service
#[derive(Clone)]
pub struct UserService {
    db: PgPool,
}

/// User row from database
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub fn into_user(self) -> AppResult<User> {
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            role: self.role.parse()?,
            is_active: self.is_active,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Input for creating a user
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserInput {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub password: String,
    pub role: UserRole,
}

/// Input for updating a user
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserInput {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

/// Filter for listing users
#[derive(Debug, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, is_active, last_login_at, created_at, updated_at";

impl UserService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List users
    pub async fn list(
        &self,
        filter: &UserFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<User>> {
        let role = filter.role.map(|r| r.as_str());
        let search = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM users
            WHERE ($1::text IS NULL OR role = $1)
              AND ($2::bool IS NULL OR is_active = $2)
              AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%' OR email ILIKE '%' || $3 || '%')
            "#,
        )
        .bind(role)
        .bind(filter.is_active)
        .bind(search)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE ($1::text IS NULL OR role = $1)
              AND ($2::bool IS NULL OR is_active = $2)
              AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%' OR email ILIKE '%' || $3 || '%')
            ORDER BY name
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(role)
        .bind(filter.is_active)
        .bind(search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let users = rows
            .into_iter()
            .map(UserRow::into_user)
            .collect::<AppResult<Vec<_>>>()?;
        Ok(PaginatedResponse::new(users, pagination, total as u64))
    }

    /// Get a user by ID
    pub async fn get(&self, id: Uuid) -> AppResult<User> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?
            .into_user()
    }

    /// Create a user account
    pub async fn create(&self, input: CreateUserInput) -> AppResult<User> {
        input.validate()?;
        shared::validate_password(&input.password)
            .map_err(|m| AppError::validation("password", m))?;

        let email = input.email.trim().to_lowercase();
        let password_hash = hash_password(&input.password)?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(input.name.trim())
        .bind(&email)
        .bind(&password_hash)
        .bind(input.role.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_unique_violation(e, "email"))?;

        tracing::info!(user_id = %row.id, role = %input.role, "user created");
        row.into_user()
    }

    /// Update name, role or active flag
    pub async fn update(
        &self,
        actor: &AuthUser,
        id: Uuid,
        input: UpdateUserInput,
    ) -> AppResult<User> {
        input.validate()?;
        check_self_update(actor, id, &input)?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                role = COALESCE($3, role),
                is_active = COALESCE($4, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(input.name.as_deref().map(str::trim))
        .bind(input.role.map(|r| r.as_str()))
        .bind(input.is_active)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        if input.is_active == Some(false) {
            self.revoke_refresh_tokens(id).await?;
        }

        tracing::info!(user_id = %id, updated_by = %actor.user_id, "user updated");
        row.into_user()
    }

    /// Set a new password and revoke outstanding refresh tokens
    pub async fn reset_password(&self, id: Uuid, new_password: &str) -> AppResult<()> {
        shared::validate_password(new_password).map_err(|m| AppError::validation("password", m))?;
        let password_hash = hash_password(new_password)?;

        let result =
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(&password_hash)
                .execute(&self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User".to_string()));
        }

        self.revoke_refresh_tokens(id).await?;
        tracing::info!(user_id = %id, "password reset");
        Ok(())
    }

    async fn revoke_refresh_tokens(&self, user_id: Uuid) -> AppResult<()> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

/// An administrator cannot lock themselves out
fn check_self_update(actor: &AuthUser, id: Uuid, input: &UpdateUserInput) -> AppResult<()> {
    if actor.user_id != id {
        return Ok(());
    }
    if input.is_active == Some(false) {
        return Err(AppError::Forbidden(
            "You cannot deactivate your own account".to_string(),
        ));
    }
    if matches!(input.role, Some(role) if role != actor.role) {
        return Err(AppError::Forbidden("You cannot change your own role".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role: UserRole::Admin,
        }
    }

    fn update(role: Option<UserRole>, is_active: Option<bool>) -> UpdateUserInput {
        UpdateUserInput {
            name: None,
            role,
            is_active,
        }
    }

    #[test]
    fn admin_cannot_demote_or_deactivate_self() {
        let actor = admin();
        assert!(check_self_update(&actor, actor.user_id, &update(Some(UserRole::Staff), None)).is_err());
        assert!(check_self_update(&actor, actor.user_id, &update(None, Some(false))).is_err());
        assert!(check_self_update(&actor, actor.user_id, &update(Some(UserRole::Admin), Some(true))).is_ok());
    }

    #[test]
    fn admin_can_change_others() {
        let actor = admin();
        assert!(check_self_update(&actor, Uuid::new_v4(), &update(Some(UserRole::Staff), Some(false))).is_ok());
    }
}

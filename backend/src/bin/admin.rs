//! Retail POS - administrative commands
//!
//! ```text
//! rpos-admin migrate
//! rpos-admin seed
//! rpos-admin create-admin <email> <name>
//! ```
//!
//! `seed` and `create-admin` read the password from `RPOS_ADMIN_PASSWORD`.

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use shared::{UserRole, DEFAULT_CATEGORIES};
use sqlx::PgPool;

use retail_pos_backend::{
    connect_database, init_tracing, services::auth::hash_password, Config, MIGRATOR,
};

#[derive(Parser)]
#[command(name = "rpos-admin", version, about = "Retail POS administration")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending database migrations
    Migrate,
    /// Migrate, then insert default categories and the first administrator
    Seed {
        #[arg(long, env = "RPOS_ADMIN_EMAIL")]
        email: String,
        #[arg(long, env = "RPOS_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an administrator account
    CreateAdmin {
        email: String,
        name: String,
        #[arg(long, env = "RPOS_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load()?;
    init_tracing(&config.log_format);
    let db = connect_database(&config.database)
        .await
        .context("connecting to database")?;

    match cli.command {
        Command::Migrate => {
            MIGRATOR.run(&db).await.context("running migrations")?;
            tracing::info!("Migrations completed");
        }
        Command::Seed { email, password } => {
            check_password(&password)?;
            MIGRATOR.run(&db).await.context("running migrations")?;
            let created = seed_categories(&db).await?;
            tracing::info!(created, "Default categories seeded");

            if ensure_admin(&db, &email, "Administrator", &password).await? {
                tracing::info!(email = %email, "Initial admin created");
            } else {
                tracing::info!(email = %email, "Admin already exists; left unchanged");
            }
        }
        Command::CreateAdmin {
            email,
            name,
            password,
        } => {
            shared::validate_email(&email).map_err(|e| anyhow!("{}: {}", email, e))?;
            check_password(&password)?;
            if !ensure_admin(&db, &email, &name, &password).await? {
                bail!("a user with email {} already exists", email);
            }
            tracing::info!(email = %email, "Admin created");
        }
    }

    Ok(())
}

fn check_password(password: &str) -> anyhow::Result<()> {
    shared::validate_password(password).map_err(|e| anyhow!("RPOS_ADMIN_PASSWORD: {}", e))
}

async fn seed_categories(db: &PgPool) -> anyhow::Result<u64> {
    let mut created = 0;
    for (name, description) in DEFAULT_CATEGORIES {
        let result = sqlx::query(
            r#"
            INSERT INTO categories (name, description)
            SELECT $1, $2
            WHERE NOT EXISTS (SELECT 1 FROM categories WHERE LOWER(name) = LOWER($1))
            "#,
        )
        .bind(name)
        .bind(description)
        .execute(db)
        .await?;
        created += result.rows_affected();
    }
    Ok(created)
}

/// Insert an active admin unless the email is taken; true when inserted
async fn ensure_admin(db: &PgPool, email: &str, name: &str, password: &str) -> anyhow::Result<bool> {
    let password_hash = hash_password(password).map_err(|e| anyhow!(e.to_string()))?;
    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password_hash, role)
        SELECT $1, LOWER($2), $3, $4
        WHERE NOT EXISTS (SELECT 1 FROM users WHERE LOWER(email) = LOWER($2))
        "#,
    )
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(UserRole::Admin.as_str())
    .execute(db)
    .await?;
    Ok(result.rows_affected() == 1)
}

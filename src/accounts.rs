use axum::extract::Path;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// One row per unique email. Never deleted by this subsystem.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub credits: i64,
    pub free_trial_used: bool,
    pub total_spent: i64,
    pub total_followups_created: i64,
    pub payment_customer_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Upsert keyed on email. The no-op `DO UPDATE` makes the insert return the
/// existing row under a concurrent first-touch race, so both racers observe
/// the same id. On conflict the row lock is held for the rest of the
/// transaction when called with one.
pub async fn get_or_create<'a, E>(executor: E, email: &str, display_name: &str) -> AppResult<Account>
where
    E: sqlx::Executor<'a, Database = Postgres>,
{
    let account = sqlx::query_as::<_, Account>(
        r#"
        INSERT INTO accounts (id, email, display_name)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(display_name)
    .fetch_one(executor)
    .await?;
    Ok(account)
}

/// Row lock for the duration of the surrounding transaction. Every
/// balance-affecting write takes this lock first so that entitlement checks
/// and their consumption serialize per account.
pub async fn lock(tx: &mut Transaction<'_, Postgres>, account_id: Uuid) -> AppResult<Account> {
    let account =
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::NotFound)?;
    Ok(account)
}

pub async fn fetch_by_email(pool: &PgPool, email: &str) -> AppResult<Option<Account>> {
    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(account)
}

#[derive(Debug, Serialize)]
pub struct BalanceInfo {
    pub email: String,
    pub credits: i64,
    pub free_trial_used: bool,
    pub total_followups_created: i64,
}

pub async fn get_account(
    Extension(pool): Extension<PgPool>,
    Path(email): Path<String>,
) -> AppResult<Json<BalanceInfo>> {
    let account = fetch_by_email(&pool, &email).await?.ok_or(AppError::NotFound)?;
    Ok(Json(BalanceInfo {
        email: account.email,
        credits: account.credits,
        free_trial_used: account.free_trial_used,
        total_followups_created: account.total_followups_created,
    }))
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tokio::time::{sleep, Duration};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Purchase,
    Usage,
    FreeTrial,
    Refund,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Purchase => "purchase",
            EntryKind::Usage => "usage",
            EntryKind::FreeTrial => "free_trial",
            EntryKind::Refund => "refund",
        }
    }
}

/// Append-only record of one balance-affecting event, carrying the balance
/// snapshot taken inside the same transaction that moved it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub delta: i64,
    pub balance_after: i64,
    pub kind: String,
    pub reference_id: Uuid,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

async fn append(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    delta: i64,
    balance_after: i64,
    kind: EntryKind,
    reference_id: Uuid,
    description: &str,
) -> AppResult<LedgerEntry> {
    let entry = sqlx::query_as::<_, LedgerEntry>(
        r#"
        INSERT INTO ledger_entries (id, account_id, delta, balance_after, kind, reference_id, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(account_id)
    .bind(delta)
    .bind(balance_after)
    .bind(kind.as_str())
    .bind(reference_id)
    .bind(description)
    .fetch_one(&mut *tx)
    .await?;
    Ok(entry)
}

/// Credit a purchase: bump the balance and the monetary accumulator, stamp
/// the payment customer reference on first sight, and append the `purchase`
/// entry with the post-grant balance. Caller holds the account row lock.
pub async fn grant(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    credits: i64,
    amount_paid: i64,
    customer_ref: Option<&str>,
    reference_id: Uuid,
    description: &str,
) -> AppResult<LedgerEntry> {
    if credits < 0 {
        return Err(AppError::Invariant(format!(
            "grant with negative credits {credits} for account {account_id}"
        )));
    }
    let balance_after: i64 = sqlx::query_scalar(
        r#"
        UPDATE accounts
        SET credits = credits + $2,
            total_spent = total_spent + $3,
            payment_customer_ref = COALESCE(payment_customer_ref, $4)
        WHERE id = $1
        RETURNING credits
        "#,
    )
    .bind(account_id)
    .bind(credits)
    .bind(amount_paid)
    .bind(customer_ref)
    .fetch_one(&mut *tx)
    .await?;
    append(
        tx,
        account_id,
        credits,
        balance_after,
        EntryKind::Purchase,
        reference_id,
        description,
    )
    .await
}

/// Consume one paid credit. The `credits > 0` guard backs up the resolver's
/// decision; failing it means the check and the consumption were not atomic,
/// which the row lock is supposed to rule out.
pub async fn debit(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    reference_id: Uuid,
    description: &str,
) -> AppResult<LedgerEntry> {
    let balance_after: Option<i64> = sqlx::query_scalar(
        "UPDATE accounts SET credits = credits - 1 WHERE id = $1 AND credits > 0 RETURNING credits",
    )
    .bind(account_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(balance_after) = balance_after else {
        return Err(AppError::Invariant(format!(
            "debit on account {account_id} without available credits"
        )));
    };
    append(
        tx,
        account_id,
        -1,
        balance_after,
        EntryKind::Usage,
        reference_id,
        description,
    )
    .await
}

/// Consume the one-time free trial. Zero delta; the entry exists so the
/// ledger carries the full entitlement history. The flag only ever flips
/// false to true.
pub async fn mark_free_trial(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    reference_id: Uuid,
    description: &str,
) -> AppResult<LedgerEntry> {
    let balance_after: Option<i64> = sqlx::query_scalar(
        "UPDATE accounts SET free_trial_used = TRUE WHERE id = $1 AND free_trial_used = FALSE RETURNING credits",
    )
    .bind(account_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(balance_after) = balance_after else {
        return Err(AppError::Invariant(format!(
            "free trial already consumed for account {account_id}"
        )));
    };
    append(
        tx,
        account_id,
        0,
        balance_after,
        EntryKind::FreeTrial,
        reference_id,
        description,
    )
    .await
}

pub async fn entries_for_account(pool: &PgPool, account_id: Uuid) -> AppResult<Vec<LedgerEntry>> {
    let entries = sqlx::query_as::<_, LedgerEntry>(
        "SELECT * FROM ledger_entries WHERE account_id = $1 ORDER BY created_at, id",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;
    Ok(entries)
}

/// Postgres serialization failure (40001) and deadlock (40P01) abort one of
/// two racing transactions; those are safe to retry from the top.
pub fn is_retryable(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
        }
        _ => false,
    }
}

pub async fn conflict_backoff(attempt: u32) {
    sleep(Duration::from_millis(25 * u64::from(attempt + 1))).await;
}

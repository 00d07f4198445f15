use std::sync::Arc;

use anyhow::anyhow;
use sqlx::PgPool;
use tokio::sync::mpsc::{channel, Sender};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::accounts;
use crate::catalog;
use crate::config;
use crate::error::{AppError, AppResult};
use crate::ledger;
use crate::notifier::{purchase_confirmation, Notifier};

use super::models::{CompletedCheckout, Purchase};

#[derive(Debug)]
pub enum ReconciliationJob {
    CheckoutCompleted(CompletedCheckout),
}

/// Enqueue interface handed to the webhook handler so the HTTP response does
/// not block on the grant transaction.
#[derive(Clone)]
pub struct ReconciliationHandle {
    sender: Sender<ReconciliationJob>,
}

impl ReconciliationHandle {
    pub async fn dispatch(&self, job: ReconciliationJob) -> anyhow::Result<()> {
        self.sender
            .send(job)
            .await
            .map_err(|err| anyhow!("failed to enqueue payment reconciliation job: {err}"))
    }
}

#[derive(Debug)]
pub enum ReconcileOutcome {
    Granted {
        purchase: Purchase,
        balance_after: i64,
        email: String,
        display_name: String,
    },
    Duplicate {
        session_ref: String,
    },
}

/// Turn one verified checkout-completion event into ledger state. Safe under
/// redelivery: the whole grant hinges on winning the insert into `purchases`,
/// whose session-reference uniqueness is enforced by the database, not by a
/// prior read.
pub async fn reconcile(pool: &PgPool, checkout: &CompletedCheckout) -> AppResult<ReconcileOutcome> {
    if checkout.customer_email.as_deref().unwrap_or("").is_empty() {
        return Err(AppError::BadRequest(format!(
            "checkout session {} carries no customer email",
            checkout.session_ref
        )));
    }

    let max_retries = *config::LEDGER_TX_MAX_RETRIES;
    let mut attempt = 0;
    loop {
        match reconcile_once(pool, checkout).await {
            Ok(outcome) => return Ok(outcome),
            Err(AppError::Db(err)) if ledger::is_retryable(&err) && attempt < max_retries => {
                warn!(?err, attempt, session = %checkout.session_ref, "grant transaction aborted; retrying");
                ledger::conflict_backoff(attempt).await;
                attempt += 1;
            }
            Err(AppError::Db(err)) if ledger::is_retryable(&err) => {
                return Err(AppError::TransientStore(format!(
                    "grant for session {} kept conflicting after {max_retries} retries",
                    checkout.session_ref
                )));
            }
            Err(err) => return Err(err),
        }
    }
}

async fn reconcile_once(
    pool: &PgPool,
    checkout: &CompletedCheckout,
) -> AppResult<ReconcileOutcome> {
    let email = checkout.customer_email.as_deref().unwrap_or_default();
    let display_name = checkout.customer_name.as_deref().unwrap_or("Customer");
    let amount_paid = checkout.amount_paid();
    let package = catalog::lookup(amount_paid);

    let mut tx = pool.begin().await?;

    // The upsert row-locks the account for the rest of the transaction, so
    // concurrent grants and debits for the same account serialize here.
    let account = accounts::get_or_create(&mut tx, email, display_name).await?;

    let purchase = sqlx::query_as::<_, Purchase>(
        r#"
        INSERT INTO purchases (
            id, account_id, payment_intent_ref, payment_session_ref,
            package_type, amount_paid, credits_granted, status
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, 'completed')
        ON CONFLICT (payment_session_ref) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(account.id)
    .bind(checkout.payment_intent_ref.as_deref())
    .bind(&checkout.session_ref)
    .bind(package.package_type.as_str())
    .bind(amount_paid)
    .bind(package.credits)
    .fetch_optional(&mut tx)
    .await?;

    let Some(purchase) = purchase else {
        tx.rollback().await?;
        return Ok(ReconcileOutcome::Duplicate {
            session_ref: checkout.session_ref.clone(),
        });
    };

    let entry = ledger::grant(
        &mut tx,
        account.id,
        purchase.credits_granted,
        amount_paid,
        checkout.customer_ref.as_deref(),
        purchase.id,
        &format!(
            "Purchased {} package ({} credits)",
            purchase.package_type, purchase.credits_granted
        ),
    )
    .await?;

    tx.commit().await?;

    info!(
        account = %account.id,
        session = %purchase.payment_session_ref,
        credits = purchase.credits_granted,
        balance = entry.balance_after,
        "payment reconciled into ledger"
    );

    Ok(ReconcileOutcome::Granted {
        purchase,
        balance_after: entry.balance_after,
        email: email.to_string(),
        display_name: display_name.to_string(),
    })
}

/// Confirmation mail is best effort. A delivery failure never unwinds the
/// grant that already committed.
pub async fn notify_granted(notifier: &dyn Notifier, outcome: &ReconcileOutcome) {
    let ReconcileOutcome::Granted {
        purchase,
        balance_after,
        email,
        display_name,
    } = outcome
    else {
        return;
    };
    let mail = purchase_confirmation(
        email,
        display_name,
        &purchase.package_type,
        purchase.credits_granted,
        purchase.amount_paid,
        *balance_after,
    );
    if let Err(err) = notifier.deliver(&mail).await {
        warn!(?err, %email, "purchase confirmation delivery failed");
    }
}

pub fn start_reconciliation_worker(
    pool: PgPool,
    notifier: Arc<dyn Notifier>,
) -> ReconciliationHandle {
    let (tx, mut rx) = channel(64);
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            match job {
                ReconciliationJob::CheckoutCompleted(checkout) => {
                    match reconcile(&pool, &checkout).await {
                        Ok(ReconcileOutcome::Duplicate { session_ref }) => {
                            info!(session = %session_ref, "payment session already reconciled; no-op");
                        }
                        Ok(outcome) => notify_granted(notifier.as_ref(), &outcome).await,
                        Err(err) => {
                            error!(?err, session = %checkout.session_ref, "payment reconciliation failed");
                        }
                    }
                }
            }
        }
    });
    ReconciliationHandle { sender: tx }
}

use axum::extract::Path;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::accounts;
use crate::config;
use crate::entitlement::{self, Decision};
use crate::error::{AppError, AppResult};
use crate::generator::{Generator, PromptContext};
use crate::ledger;
use crate::notifier::{followup_email, Notifier};

pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_GENERATED: &str = "generated";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_EMAIL_FAILED: &str = "email_failed";
pub const STATUS_GENERATION_FAILED: &str = "generation_failed";

/// One row per generation request. Mutated only by this workflow; terminal
/// statuses are never rewritten.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Submission {
    pub id: Uuid,
    pub account_id: Uuid,
    pub status: String,
    pub is_free_trial: bool,
    pub credits_used: i64,
    pub generated_artifact: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Typed request boundary. Validated once here; the core never re-checks
/// individual fields.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub name: String,
    pub email: String,
    pub business_type: String,
    pub language: String,
    pub client_info: String,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub template_type: Option<String>,
}

impl SubmitRequest {
    pub fn validate(&self) -> AppResult<()> {
        let required = [
            ("name", &self.name),
            ("email", &self.email),
            ("business_type", &self.business_type),
            ("language", &self.language),
            ("client_info", &self.client_info),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AppError::BadRequest(format!("missing required field: {field}")));
            }
        }
        Ok(())
    }

    fn prompt_context(&self) -> PromptContext {
        PromptContext {
            name: self.name.clone(),
            client_name: self.client_name.clone(),
            client_info: self.client_info.clone(),
            language: self.language.clone(),
            business_type: self.business_type.clone(),
            template_type: self.template_type.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStatus {
    Allowed,
    PaymentRequired,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub status: SubmitStatus,
    pub is_free_trial_used: bool,
    pub remaining_credits: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<Uuid>,
}

#[derive(Debug)]
enum Claim {
    /// The submission id doubles as the reservation token: the consuming
    /// ledger entry references it, committed in the same transaction.
    Allowed {
        submission: Submission,
        decision: Decision,
        remaining_credits: i64,
    },
    Denied,
}

/// Entitlement check and consumption as one atomic unit. The account row
/// lock keeps two concurrent attempts from both observing the free trial or
/// the last credit; a serialization abort retries from the top.
async fn claim_entitlement(pool: &PgPool, request: &SubmitRequest) -> AppResult<Claim> {
    let account = accounts::get_or_create(pool, &request.email, &request.name).await?;

    let max_retries = *config::LEDGER_TX_MAX_RETRIES;
    let mut attempt = 0;
    loop {
        match claim_once(pool, account.id).await {
            Ok(claim) => return Ok(claim),
            Err(AppError::Db(err)) if ledger::is_retryable(&err) && attempt < max_retries => {
                warn!(?err, attempt, account = %account.id, "entitlement transaction aborted; retrying");
                ledger::conflict_backoff(attempt).await;
                attempt += 1;
            }
            Err(AppError::Db(err)) if ledger::is_retryable(&err) => {
                return Err(AppError::TransientStore(format!(
                    "entitlement claim for account {} kept conflicting after {max_retries} retries",
                    account.id
                )));
            }
            Err(err) => return Err(err),
        }
    }
}

async fn claim_once(pool: &PgPool, account_id: Uuid) -> AppResult<Claim> {
    let mut tx = pool.begin().await?;

    let account = accounts::lock(&mut tx, account_id).await?;
    let decision = entitlement::resolve(&account);
    if !decision.is_allowed() {
        tx.rollback().await?;
        return Ok(Claim::Denied);
    }

    let is_free_trial = decision == Decision::AllowFree;
    let credits_used: i64 = if is_free_trial { 0 } else { 1 };
    let submission = sqlx::query_as::<_, Submission>(
        r#"
        INSERT INTO submissions (id, account_id, status, is_free_trial, credits_used)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(account.id)
    .bind(STATUS_PROCESSING)
    .bind(is_free_trial)
    .bind(credits_used)
    .fetch_one(&mut tx)
    .await?;

    let entry = if is_free_trial {
        ledger::mark_free_trial(&mut tx, account.id, submission.id, "Free trial follow-up").await?
    } else {
        ledger::debit(&mut tx, account.id, submission.id, "Follow-up generation").await?
    };

    sqlx::query(
        "UPDATE accounts SET total_followups_created = total_followups_created + 1 WHERE id = $1",
    )
    .bind(account.id)
    .execute(&mut tx)
    .await?;

    tx.commit().await?;

    info!(
        account = %account.id,
        submission = %submission.id,
        ?decision,
        balance = entry.balance_after,
        "entitlement consumed"
    );

    Ok(Claim::Allowed {
        submission,
        decision,
        remaining_credits: entry.balance_after,
    })
}

/// One end-to-end attempt. Entitlement is consumed before generation is even
/// tried, so a crash mid-generation leaves a consistent ledger; neither a
/// generator nor a notifier failure refunds the spent entitlement.
pub async fn process(
    pool: &PgPool,
    generator: &dyn Generator,
    notifier: &dyn Notifier,
    request: SubmitRequest,
) -> AppResult<SubmitResponse> {
    request.validate()?;

    let claim = claim_entitlement(pool, &request).await?;
    let Claim::Allowed {
        submission,
        decision,
        remaining_credits,
    } = claim
    else {
        return Ok(SubmitResponse {
            status: SubmitStatus::PaymentRequired,
            is_free_trial_used: true,
            remaining_credits: 0,
            submission_id: None,
        });
    };

    // No transaction is held across the external calls below.
    let artifact = match generator.generate(&request.prompt_context()).await {
        Ok(artifact) => artifact,
        Err(err) => {
            set_status(pool, submission.id, STATUS_GENERATION_FAILED).await?;
            return Err(AppError::BadGateway(format!("generation failed: {err}")));
        }
    };

    sqlx::query("UPDATE submissions SET generated_artifact = $2, status = $3 WHERE id = $1")
        .bind(submission.id)
        .bind(&artifact)
        .bind(STATUS_GENERATED)
        .execute(pool)
        .await?;

    let mail = followup_email(&request.email, request.client_name.as_deref(), &artifact);
    match notifier.deliver(&mail).await {
        Ok(()) => {
            sqlx::query(
                "UPDATE submissions SET status = $2, completed_at = NOW() WHERE id = $1",
            )
            .bind(submission.id)
            .bind(STATUS_COMPLETED)
            .execute(pool)
            .await?;
        }
        Err(err) => {
            // The artifact was generated and stored, so the unit of value was
            // delivered; the credit stays spent.
            warn!(?err, submission = %submission.id, "artifact delivery failed");
            set_status(pool, submission.id, STATUS_EMAIL_FAILED).await?;
        }
    }

    info!(submission = %submission.id, ?decision, "submission attempt finished");
    Ok(SubmitResponse {
        status: SubmitStatus::Allowed,
        is_free_trial_used: true,
        remaining_credits,
        submission_id: Some(submission.id),
    })
}

async fn set_status(pool: &PgPool, submission_id: Uuid, status: &str) -> AppResult<()> {
    sqlx::query("UPDATE submissions SET status = $2 WHERE id = $1")
        .bind(submission_id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn fetch(pool: &PgPool, submission_id: Uuid) -> AppResult<Option<Submission>> {
    let submission =
        sqlx::query_as::<_, Submission>("SELECT * FROM submissions WHERE id = $1")
            .bind(submission_id)
            .fetch_optional(pool)
            .await?;
    Ok(submission)
}

pub async fn submit(
    Extension(pool): Extension<PgPool>,
    Extension(generator): Extension<Arc<dyn Generator>>,
    Extension(notifier): Extension<Arc<dyn Notifier>>,
    Json(request): Json<SubmitRequest>,
) -> AppResult<(StatusCode, Json<SubmitResponse>)> {
    let response = process(&pool, generator.as_ref(), notifier.as_ref(), request).await?;
    let code = match response.status {
        SubmitStatus::Allowed => StatusCode::OK,
        SubmitStatus::PaymentRequired => StatusCode::PAYMENT_REQUIRED,
    };
    Ok((code, Json(response)))
}

pub async fn get_submission(
    Extension(pool): Extension<PgPool>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Submission>> {
    let submission = fetch(&pool, id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(submission))
}

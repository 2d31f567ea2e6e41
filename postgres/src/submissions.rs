//! Submission rows: append-only apart from the viewed flag.

use crate::{backend, PgStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use formgate_core::form::traversal::AnswerValue;
use formgate_core::store::{StoreError, SubmissionStore};
use formgate_core::submission::Submission;
use formgate_core::types::{BindingId, OfferingId, StepId, SubmissionId, TemplateId};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct SubmissionRow {
    id: Uuid,
    template_id: Uuid,
    offering_id: Option<Uuid>,
    binding_id: Option<Uuid>,
    answers: serde_json::Value,
    customer_name: Option<String>,
    customer_phone: String,
    is_viewed: bool,
    created_at: DateTime<Utc>,
}

impl SubmissionRow {
    fn into_submission(self) -> Result<Submission, StoreError> {
        let answers: BTreeMap<StepId, AnswerValue> =
            serde_json::from_value(self.answers).map_err(backend)?;
        Ok(Submission {
            id: SubmissionId::from_uuid(self.id),
            template_id: TemplateId::from_uuid(self.template_id),
            offering_id: self.offering_id.map(OfferingId::from_uuid),
            binding_id: self.binding_id.map(BindingId::from_uuid),
            answers,
            customer_name: self.customer_name,
            customer_phone: self.customer_phone,
            is_viewed: self.is_viewed,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl SubmissionStore for PgStore {
    async fn insert(&self, submission: &Submission) -> Result<(), StoreError> {
        let answers = serde_json::to_value(&submission.answers).map_err(backend)?;
        sqlx::query(
            r"
            INSERT INTO submissions
                (id, template_id, offering_id, binding_id, answers,
                 customer_name, customer_phone, is_viewed, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(submission.id.as_uuid())
        .bind(submission.template_id.as_uuid())
        .bind(submission.offering_id.as_ref().map(OfferingId::as_uuid))
        .bind(submission.binding_id.as_ref().map(BindingId::as_uuid))
        .bind(answers)
        .bind(submission.customer_name.as_deref())
        .bind(&submission.customer_phone)
        .bind(submission.is_viewed)
        .bind(submission.created_at)
        .execute(self.pool())
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn mark_viewed(&self, id: SubmissionId) -> Result<bool, StoreError> {
        let updated = sqlx::query("UPDATE submissions SET is_viewed = TRUE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.pool())
            .await
            .map_err(backend)?;
        Ok(updated.rows_affected() > 0)
    }

    async fn by_template(&self, template_id: TemplateId) -> Result<Vec<Submission>, StoreError> {
        let rows = sqlx::query_as::<_, SubmissionRow>(
            r"
            SELECT id, template_id, offering_id, binding_id, answers,
                   customer_name, customer_phone, is_viewed, created_at
            FROM submissions
            WHERE template_id = $1
            ORDER BY created_at DESC
            ",
        )
        .bind(template_id.as_uuid())
        .fetch_all(self.pool())
        .await
        .map_err(backend)?;
        rows.into_iter().map(SubmissionRow::into_submission).collect()
    }
}

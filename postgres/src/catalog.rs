//! Catalog queries: templates, offerings, bindings, token resolution.

use crate::{backend, PgStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use formgate_core::form::graph::{FormGraph, FormTemplate};
use formgate_core::store::{FormBinding, FormCatalog, Offering, ResolvedForm, StoreError};
use formgate_core::types::{BindingId, OfferingId, ShareToken, TemplateId};
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: Uuid,
    name: String,
    graph: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TemplateRow {
    fn into_template(self) -> Result<FormTemplate, StoreError> {
        let graph: FormGraph = serde_json::from_value(self.graph).map_err(backend)?;
        Ok(FormTemplate {
            id: TemplateId::from_uuid(self.id),
            name: self.name,
            graph,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OfferingRow {
    id: Uuid,
    template_id: Uuid,
    name: String,
    is_published: bool,
    created_at: DateTime<Utc>,
}

impl From<OfferingRow> for Offering {
    fn from(row: OfferingRow) -> Self {
        Self {
            id: OfferingId::from_uuid(row.id),
            template_id: TemplateId::from_uuid(row.template_id),
            name: row.name,
            is_published: row.is_published,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BindingRow {
    id: Uuid,
    share_token: String,
    template_id: Uuid,
    offering_id: Option<Uuid>,
    stage: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<BindingRow> for FormBinding {
    fn from(row: BindingRow) -> Self {
        Self {
            id: BindingId::from_uuid(row.id),
            share_token: ShareToken::new(row.share_token),
            template_id: TemplateId::from_uuid(row.template_id),
            offering_id: row.offering_id.map(OfferingId::from_uuid),
            stage: row.stage,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl FormCatalog for PgStore {
    async fn insert_template(&self, template: &FormTemplate) -> Result<(), StoreError> {
        let graph = serde_json::to_value(&template.graph).map_err(backend)?;
        sqlx::query(
            r"
            INSERT INTO form_templates (id, name, graph, created_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(template.id.as_uuid())
        .bind(&template.name)
        .bind(graph)
        .bind(template.created_at)
        .execute(self.pool())
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn template(&self, id: TemplateId) -> Result<Option<FormTemplate>, StoreError> {
        let row = sqlx::query_as::<_, TemplateRow>(
            "SELECT id, name, graph, created_at FROM form_templates WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(backend)?;
        row.map(TemplateRow::into_template).transpose()
    }

    async fn insert_offering(&self, offering: &Offering) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO offerings (id, template_id, name, is_published, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(offering.id.as_uuid())
        .bind(offering.template_id.as_uuid())
        .bind(&offering.name)
        .bind(offering.is_published)
        .bind(offering.created_at)
        .execute(self.pool())
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn offering(&self, id: OfferingId) -> Result<Option<Offering>, StoreError> {
        let row = sqlx::query_as::<_, OfferingRow>(
            r"
            SELECT id, template_id, name, is_published, created_at
            FROM offerings WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(backend)?;
        Ok(row.map(Offering::from))
    }

    async fn insert_binding(&self, binding: &FormBinding) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO form_bindings
                (id, share_token, template_id, offering_id, stage, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(binding.id.as_uuid())
        .bind(binding.share_token.as_str())
        .bind(binding.template_id.as_uuid())
        .bind(binding.offering_id.as_ref().map(OfferingId::as_uuid))
        .bind(binding.stage.as_deref())
        .bind(binding.is_active)
        .bind(binding.created_at)
        .execute(self.pool())
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn resolve_share_token(
        &self,
        token: &ShareToken,
    ) -> Result<Option<ResolvedForm>, StoreError> {
        // Priority: stage-specific, then offering-level, then legacy.
        let row = sqlx::query_as::<_, BindingRow>(
            r"
            SELECT id, share_token, template_id, offering_id, stage, is_active, created_at
            FROM form_bindings
            WHERE share_token = $1
            ORDER BY CASE
                WHEN offering_id IS NOT NULL AND stage IS NOT NULL THEN 0
                WHEN offering_id IS NOT NULL THEN 1
                ELSE 2
            END, created_at DESC
            LIMIT 1
            ",
        )
        .bind(token.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(backend)?;

        let Some(binding) = row.map(FormBinding::from) else {
            return Ok(None);
        };
        let Some(template) = self.template(binding.template_id).await? else {
            return Ok(None);
        };
        let offering = match binding.offering_id {
            Some(id) => self.offering(id).await?,
            None => None,
        };
        Ok(Some(ResolvedForm {
            binding,
            template,
            offering,
        }))
    }
}

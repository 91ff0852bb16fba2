//! Medical history CRUD: a per-patient event timeline that can reference the
//! consultation, diagnostic or treatment behind each entry.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};

use crate::api::error::Error;
use crate::api::handlers::auth::auth_context;
use crate::supabase::Supabase;

const MEDICAL_HISTORY: &str = "medical_history";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Consulta,
    Diagnostico,
    Tratamiento,
    Nota,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntryCreate {
    pub patient_id: String,
    pub consultation_id: Option<String>,
    pub diagnostic_id: Option<String>,
    pub treatment_id: Option<String>,
    pub event_type: EventType,
    pub title: String,
    pub description: Option<String>,
    pub event_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntryUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treatment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntryResponse {
    pub id: String,
    pub patient_id: String,
    pub consultation_id: Option<String>,
    pub diagnostic_id: Option<String>,
    pub treatment_id: Option<String>,
    pub event_type: EventType,
    pub title: String,
    pub description: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryListQuery {
    pub patient_id: Option<String>,
}

#[utoipa::path(
    get,
    path = "/medical_history",
    params(HistoryListQuery),
    responses(
        (status = 200, description = "Matching history entries", body = [HistoryEntryResponse]),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "medical_history"
)]
pub async fn list(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Query(query): Query<HistoryListQuery>,
) -> Result<Json<Vec<HistoryEntryResponse>>, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let mut builder = ctx.tables.from(MEDICAL_HISTORY);
    if let Some(patient_id) = &query.patient_id {
        builder = builder.eq("patient_id", patient_id);
    }

    let entries = builder.order_desc("created_at").select().await?;

    Ok(Json(entries))
}

#[utoipa::path(
    get,
    path = "/medical_history/{entry_id}",
    params(("entry_id" = String, Path, description = "History entry id")),
    responses(
        (status = 200, description = "The history entry", body = HistoryEntryResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown entry"),
    ),
    tag = "medical_history"
)]
pub async fn get(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Path(entry_id): Path<String>,
) -> Result<Json<HistoryEntryResponse>, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let entry: Option<HistoryEntryResponse> = ctx
        .tables
        .from(MEDICAL_HISTORY)
        .eq("id", &entry_id)
        .select_one()
        .await?;

    entry
        .map(Json)
        .ok_or_else(|| Error::NotFound("History entry not found".to_string()))
}

#[utoipa::path(
    post,
    path = "/medical_history",
    request_body = HistoryEntryCreate,
    responses(
        (status = 201, description = "Entry created", body = HistoryEntryResponse),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "medical_history"
)]
pub async fn create(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    payload: Option<Json<HistoryEntryCreate>>,
) -> Result<(StatusCode, Json<Value>), Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let Some(Json(data)) = payload else {
        return Err(Error::Validation("Missing payload".to_string()));
    };
    if data.title.is_empty() || data.title.len() > 255 {
        return Err(Error::Validation(
            "title must be 1-255 characters".to_string(),
        ));
    }

    let mut row = serde_json::to_value(&data).map_err(anyhow::Error::from)?;
    row["created_by"] = Value::String(ctx.user_id.clone());

    let mut inserted = ctx.tables.from(MEDICAL_HISTORY).insert(&row).await?;
    if inserted.is_empty() {
        return Err(Error::Validation(
            "History entry was not created".to_string(),
        ));
    }

    Ok((StatusCode::CREATED, Json(inserted.swap_remove(0))))
}

#[utoipa::path(
    put,
    path = "/medical_history/{entry_id}",
    request_body = HistoryEntryUpdate,
    params(("entry_id" = String, Path, description = "History entry id")),
    responses(
        (status = 200, description = "Entry updated", body = HistoryEntryResponse),
        (status = 400, description = "No fields to update"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown entry"),
    ),
    tag = "medical_history"
)]
pub async fn update(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Path(entry_id): Path<String>,
    payload: Option<Json<HistoryEntryUpdate>>,
) -> Result<Json<Value>, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let Some(Json(data)) = payload else {
        return Err(Error::Validation("Missing payload".to_string()));
    };

    let changes = serde_json::to_value(&data).map_err(anyhow::Error::from)?;
    if changes.as_object().is_some_and(Map::is_empty) {
        return Err(Error::Validation("No fields to update".to_string()));
    }

    let mut updated = ctx
        .tables
        .from(MEDICAL_HISTORY)
        .eq("id", &entry_id)
        .update(&changes)
        .await?;

    if updated.is_empty() {
        return Err(Error::NotFound("History entry not found".to_string()));
    }

    Ok(Json(updated.swap_remove(0)))
}

#[utoipa::path(
    delete,
    path = "/medical_history/{entry_id}",
    params(("entry_id" = String, Path, description = "History entry id")),
    responses(
        (status = 204, description = "Entry deleted"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown entry"),
    ),
    tag = "medical_history"
)]
pub async fn delete(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Path(entry_id): Path<String>,
) -> Result<StatusCode, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let deleted = ctx
        .tables
        .from(MEDICAL_HISTORY)
        .eq("id", &entry_id)
        .delete()
        .await?;

    if deleted.is_empty() {
        return Err(Error::NotFound("History entry not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_values() {
        assert_eq!(
            serde_json::to_string(&EventType::Diagnostico).unwrap(),
            "\"diagnostico\""
        );
        assert_eq!(serde_json::to_string(&EventType::Nota).unwrap(), "\"nota\"");
    }

    #[test]
    fn test_create_requires_event_type() {
        let missing = serde_json::from_value::<HistoryEntryCreate>(serde_json::json!({
            "patient_id": "p-1",
            "title": "Primera consulta",
        }));
        assert!(missing.is_err());
    }
}

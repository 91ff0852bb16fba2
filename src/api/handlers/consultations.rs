//! Consultation CRUD: clinical encounters with optional vitals.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};

use crate::api::error::Error;
use crate::api::handlers::auth::auth_context;
use crate::supabase::Supabase;

const CONSULTATIONS: &str = "consultations";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    Programada,
    EnCurso,
    Completada,
    Cancelada,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConsultationCreate {
    pub patient_id: String,
    pub consultation_date: Option<DateTime<Utc>>,
    pub reason: String,
    pub symptoms: Option<String>,
    pub notes: Option<String>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub blood_pressure: Option<String>,
    pub heart_rate: Option<i32>,
    pub temperature_c: Option<f64>,
    #[serde(default = "default_status")]
    pub status: ConsultationStatus,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConsultationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ConsultationStatus>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConsultationResponse {
    pub id: String,
    pub patient_id: String,
    pub consultation_date: Option<DateTime<Utc>>,
    pub reason: String,
    pub symptoms: Option<String>,
    pub notes: Option<String>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub blood_pressure: Option<String>,
    pub heart_rate: Option<i32>,
    pub temperature_c: Option<f64>,
    pub status: ConsultationStatus,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ConsultationListQuery {
    pub patient_id: Option<String>,
    pub status: Option<ConsultationStatus>,
}

fn default_status() -> ConsultationStatus {
    ConsultationStatus::Completada
}

impl ConsultationStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Programada => "programada",
            Self::EnCurso => "en_curso",
            Self::Completada => "completada",
            Self::Cancelada => "cancelada",
        }
    }
}

#[utoipa::path(
    get,
    path = "/consultations",
    params(ConsultationListQuery),
    responses(
        (status = 200, description = "Matching consultations", body = [ConsultationResponse]),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "consultations"
)]
pub async fn list(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Query(query): Query<ConsultationListQuery>,
) -> Result<Json<Vec<ConsultationResponse>>, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let mut builder = ctx.tables.from(CONSULTATIONS);
    if let Some(patient_id) = &query.patient_id {
        builder = builder.eq("patient_id", patient_id);
    }
    if let Some(status) = query.status {
        builder = builder.eq("status", status.as_str());
    }

    let consultations = builder.order_desc("consultation_date").select().await?;

    Ok(Json(consultations))
}

#[utoipa::path(
    get,
    path = "/consultations/{consultation_id}",
    params(("consultation_id" = String, Path, description = "Consultation id")),
    responses(
        (status = 200, description = "The consultation", body = ConsultationResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown consultation"),
    ),
    tag = "consultations"
)]
pub async fn get(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Path(consultation_id): Path<String>,
) -> Result<Json<ConsultationResponse>, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let consultation: Option<ConsultationResponse> = ctx
        .tables
        .from(CONSULTATIONS)
        .eq("id", &consultation_id)
        .select_one()
        .await?;

    consultation
        .map(Json)
        .ok_or_else(|| Error::NotFound("Consultation not found".to_string()))
}

#[utoipa::path(
    post,
    path = "/consultations",
    request_body = ConsultationCreate,
    responses(
        (status = 201, description = "Consultation created", body = ConsultationResponse),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "consultations"
)]
pub async fn create(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    payload: Option<Json<ConsultationCreate>>,
) -> Result<(StatusCode, Json<Value>), Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let Some(Json(data)) = payload else {
        return Err(Error::Validation("Missing payload".to_string()));
    };
    if data.reason.is_empty() {
        return Err(Error::Validation("reason must not be empty".to_string()));
    }

    let mut row = serde_json::to_value(&data).map_err(anyhow::Error::from)?;
    row["created_by"] = Value::String(ctx.user_id.clone());

    let mut inserted = ctx.tables.from(CONSULTATIONS).insert(&row).await?;
    if inserted.is_empty() {
        return Err(Error::Validation(
            "Consultation was not created".to_string(),
        ));
    }

    Ok((StatusCode::CREATED, Json(inserted.swap_remove(0))))
}

#[utoipa::path(
    put,
    path = "/consultations/{consultation_id}",
    request_body = ConsultationUpdate,
    params(("consultation_id" = String, Path, description = "Consultation id")),
    responses(
        (status = 200, description = "Consultation updated", body = ConsultationResponse),
        (status = 400, description = "No fields to update"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown consultation"),
    ),
    tag = "consultations"
)]
pub async fn update(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Path(consultation_id): Path<String>,
    payload: Option<Json<ConsultationUpdate>>,
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
        .from(CONSULTATIONS)
        .eq("id", &consultation_id)
        .update(&changes)
        .await?;

    if updated.is_empty() {
        return Err(Error::NotFound("Consultation not found".to_string()));
    }

    Ok(Json(updated.swap_remove(0)))
}

#[utoipa::path(
    delete,
    path = "/consultations/{consultation_id}",
    params(("consultation_id" = String, Path, description = "Consultation id")),
    responses(
        (status = 204, description = "Consultation deleted"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown consultation"),
    ),
    tag = "consultations"
)]
pub async fn delete(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Path(consultation_id): Path<String>,
) -> Result<StatusCode, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let deleted = ctx
        .tables
        .from(CONSULTATIONS)
        .eq("id", &consultation_id)
        .delete()
        .await?;

    if deleted.is_empty() {
        return Err(Error::NotFound("Consultation not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_values() {
        assert_eq!(
            serde_json::to_string(&ConsultationStatus::EnCurso).unwrap(),
            "\"en_curso\""
        );
        assert_eq!(ConsultationStatus::Programada.as_str(), "programada");
    }

    #[test]
    fn test_create_defaults_to_completada() {
        let data: ConsultationCreate = serde_json::from_value(serde_json::json!({
            "patient_id": "p-1",
            "reason": "Control mensual",
        }))
        .unwrap();

        assert!(matches!(data.status, ConsultationStatus::Completada));
        assert!(data.consultation_date.is_none());
    }

    #[test]
    fn test_update_serializes_only_set_fields() {
        let update = ConsultationUpdate {
            consultation_date: None,
            reason: None,
            symptoms: None,
            notes: Some("Paciente estable".to_string()),
            weight_kg: None,
            height_cm: None,
            blood_pressure: None,
            heart_rate: Some(72),
            temperature_c: None,
            status: Some(ConsultationStatus::Completada),
        };

        let value = serde_json::to_value(&update).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert_eq!(object["heart_rate"], 72);
        assert_eq!(object["status"], "completada");
    }
}

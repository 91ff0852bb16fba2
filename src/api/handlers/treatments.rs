//! Treatment CRUD: prescriptions and procedures, optionally linked to the
//! diagnostic and consultation that motivated them.

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

const TREATMENTS: &str = "treatments";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TreatmentType {
    Medicamento,
    Terapia,
    Cirugia,
    Procedimiento,
    Otro,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TreatmentStatus {
    Activo,
    Completado,
    Suspendido,
    Cancelado,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TreatmentCreate {
    pub patient_id: String,
    pub diagnostic_id: Option<String>,
    pub consultation_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_treatment_type")]
    pub treatment_type: TreatmentType,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_status")]
    pub status: TreatmentStatus,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TreatmentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treatment_type: Option<TreatmentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dosage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TreatmentStatus>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TreatmentResponse {
    pub id: String,
    pub patient_id: String,
    pub diagnostic_id: Option<String>,
    pub consultation_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub treatment_type: TreatmentType,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: TreatmentStatus,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TreatmentListQuery {
    pub patient_id: Option<String>,
    pub status: Option<TreatmentStatus>,
}

fn default_treatment_type() -> TreatmentType {
    TreatmentType::Medicamento
}

fn default_status() -> TreatmentStatus {
    TreatmentStatus::Activo
}

impl TreatmentStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Activo => "activo",
            Self::Completado => "completado",
            Self::Suspendido => "suspendido",
            Self::Cancelado => "cancelado",
        }
    }
}

#[utoipa::path(
    get,
    path = "/treatments",
    params(TreatmentListQuery),
    responses(
        (status = 200, description = "Matching treatments", body = [TreatmentResponse]),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "treatments"
)]
pub async fn list(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Query(query): Query<TreatmentListQuery>,
) -> Result<Json<Vec<TreatmentResponse>>, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let mut builder = ctx.tables.from(TREATMENTS);
    if let Some(patient_id) = &query.patient_id {
        builder = builder.eq("patient_id", patient_id);
    }
    if let Some(status) = query.status {
        builder = builder.eq("status", status.as_str());
    }

    let treatments = builder.order_desc("created_at").select().await?;

    Ok(Json(treatments))
}

#[utoipa::path(
    get,
    path = "/treatments/{treatment_id}",
    params(("treatment_id" = String, Path, description = "Treatment id")),
    responses(
        (status = 200, description = "The treatment", body = TreatmentResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown treatment"),
    ),
    tag = "treatments"
)]
pub async fn get(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Path(treatment_id): Path<String>,
) -> Result<Json<TreatmentResponse>, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let treatment: Option<TreatmentResponse> = ctx
        .tables
        .from(TREATMENTS)
        .eq("id", &treatment_id)
        .select_one()
        .await?;

    treatment
        .map(Json)
        .ok_or_else(|| Error::NotFound("Treatment not found".to_string()))
}

#[utoipa::path(
    post,
    path = "/treatments",
    request_body = TreatmentCreate,
    responses(
        (status = 201, description = "Treatment created", body = TreatmentResponse),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "treatments"
)]
pub async fn create(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    payload: Option<Json<TreatmentCreate>>,
) -> Result<(StatusCode, Json<Value>), Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let Some(Json(data)) = payload else {
        return Err(Error::Validation("Missing payload".to_string()));
    };
    if data.name.is_empty() || data.name.len() > 255 {
        return Err(Error::Validation(
            "name must be 1-255 characters".to_string(),
        ));
    }

    let mut row = serde_json::to_value(&data).map_err(anyhow::Error::from)?;
    row["created_by"] = Value::String(ctx.user_id.clone());

    let mut inserted = ctx.tables.from(TREATMENTS).insert(&row).await?;
    if inserted.is_empty() {
        return Err(Error::Validation("Treatment was not created".to_string()));
    }

    Ok((StatusCode::CREATED, Json(inserted.swap_remove(0))))
}

#[utoipa::path(
    put,
    path = "/treatments/{treatment_id}",
    request_body = TreatmentUpdate,
    params(("treatment_id" = String, Path, description = "Treatment id")),
    responses(
        (status = 200, description = "Treatment updated", body = TreatmentResponse),
        (status = 400, description = "No fields to update"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown treatment"),
    ),
    tag = "treatments"
)]
pub async fn update(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Path(treatment_id): Path<String>,
    payload: Option<Json<TreatmentUpdate>>,
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
        .from(TREATMENTS)
        .eq("id", &treatment_id)
        .update(&changes)
        .await?;

    if updated.is_empty() {
        return Err(Error::NotFound("Treatment not found".to_string()));
    }

    Ok(Json(updated.swap_remove(0)))
}

#[utoipa::path(
    delete,
    path = "/treatments/{treatment_id}",
    params(("treatment_id" = String, Path, description = "Treatment id")),
    responses(
        (status = 204, description = "Treatment deleted"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown treatment"),
    ),
    tag = "treatments"
)]
pub async fn delete(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Path(treatment_id): Path<String>,
) -> Result<StatusCode, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let deleted = ctx
        .tables
        .from(TREATMENTS)
        .eq("id", &treatment_id)
        .delete()
        .await?;

    if deleted.is_empty() {
        return Err(Error::NotFound("Treatment not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_defaults() {
        let data: TreatmentCreate = serde_json::from_value(serde_json::json!({
            "patient_id": "p-1",
            "name": "Losartán 50mg",
        }))
        .unwrap();

        assert!(matches!(data.treatment_type, TreatmentType::Medicamento));
        assert!(matches!(data.status, TreatmentStatus::Activo));
    }

    #[test]
    fn test_wire_values() {
        assert_eq!(
            serde_json::to_string(&TreatmentType::Cirugia).unwrap(),
            "\"cirugia\""
        );
        assert_eq!(TreatmentStatus::Suspendido.as_str(), "suspendido");
    }
}

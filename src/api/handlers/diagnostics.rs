//! Diagnostic CRUD: findings attached to a patient, optionally tied to the
//! consultation they came out of.

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

const DIAGNOSTICS: &str = "diagnostics";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Leve,
    Moderado,
    Grave,
    Critico,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosisType {
    Presuntivo,
    Definitivo,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DiagnosticCreate {
    pub patient_id: String,
    pub consultation_id: Option<String>,
    /// ICD or local catalog code.
    pub code: Option<String>,
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default = "default_diagnosis_type")]
    pub diagnosis_type: DiagnosisType,
    pub diagnosis_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DiagnosticUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnosis_type: Option<DiagnosisType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnosis_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DiagnosticResponse {
    pub id: String,
    pub patient_id: String,
    pub consultation_id: Option<String>,
    pub code: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub diagnosis_type: DiagnosisType,
    pub diagnosis_date: Option<NaiveDate>,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DiagnosticListQuery {
    pub patient_id: Option<String>,
}

fn default_severity() -> Severity {
    Severity::Moderado
}

fn default_diagnosis_type() -> DiagnosisType {
    DiagnosisType::Definitivo
}

#[utoipa::path(
    get,
    path = "/diagnostics",
    params(DiagnosticListQuery),
    responses(
        (status = 200, description = "Matching diagnostics", body = [DiagnosticResponse]),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "diagnostics"
)]
pub async fn list(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Query(query): Query<DiagnosticListQuery>,
) -> Result<Json<Vec<DiagnosticResponse>>, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let mut builder = ctx.tables.from(DIAGNOSTICS);
    if let Some(patient_id) = &query.patient_id {
        builder = builder.eq("patient_id", patient_id);
    }

    let diagnostics = builder.order_desc("created_at").select().await?;

    Ok(Json(diagnostics))
}

#[utoipa::path(
    get,
    path = "/diagnostics/{diagnostic_id}",
    params(("diagnostic_id" = String, Path, description = "Diagnostic id")),
    responses(
        (status = 200, description = "The diagnostic", body = DiagnosticResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown diagnostic"),
    ),
    tag = "diagnostics"
)]
pub async fn get(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Path(diagnostic_id): Path<String>,
) -> Result<Json<DiagnosticResponse>, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let diagnostic: Option<DiagnosticResponse> = ctx
        .tables
        .from(DIAGNOSTICS)
        .eq("id", &diagnostic_id)
        .select_one()
        .await?;

    diagnostic
        .map(Json)
        .ok_or_else(|| Error::NotFound("Diagnostic not found".to_string()))
}

#[utoipa::path(
    post,
    path = "/diagnostics",
    request_body = DiagnosticCreate,
    responses(
        (status = 201, description = "Diagnostic created", body = DiagnosticResponse),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "diagnostics"
)]
pub async fn create(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    payload: Option<Json<DiagnosticCreate>>,
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

    let mut inserted = ctx.tables.from(DIAGNOSTICS).insert(&row).await?;
    if inserted.is_empty() {
        return Err(Error::Validation("Diagnostic was not created".to_string()));
    }

    Ok((StatusCode::CREATED, Json(inserted.swap_remove(0))))
}

#[utoipa::path(
    put,
    path = "/diagnostics/{diagnostic_id}",
    request_body = DiagnosticUpdate,
    params(("diagnostic_id" = String, Path, description = "Diagnostic id")),
    responses(
        (status = 200, description = "Diagnostic updated", body = DiagnosticResponse),
        (status = 400, description = "No fields to update"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown diagnostic"),
    ),
    tag = "diagnostics"
)]
pub async fn update(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Path(diagnostic_id): Path<String>,
    payload: Option<Json<DiagnosticUpdate>>,
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
        .from(DIAGNOSTICS)
        .eq("id", &diagnostic_id)
        .update(&changes)
        .await?;

    if updated.is_empty() {
        return Err(Error::NotFound("Diagnostic not found".to_string()));
    }

    Ok(Json(updated.swap_remove(0)))
}

#[utoipa::path(
    delete,
    path = "/diagnostics/{diagnostic_id}",
    params(("diagnostic_id" = String, Path, description = "Diagnostic id")),
    responses(
        (status = 204, description = "Diagnostic deleted"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown diagnostic"),
    ),
    tag = "diagnostics"
)]
pub async fn delete(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Path(diagnostic_id): Path<String>,
) -> Result<StatusCode, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let deleted = ctx
        .tables
        .from(DIAGNOSTICS)
        .eq("id", &diagnostic_id)
        .delete()
        .await?;

    if deleted.is_empty() {
        return Err(Error::NotFound("Diagnostic not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_defaults() {
        let data: DiagnosticCreate = serde_json::from_value(serde_json::json!({
            "patient_id": "p-1",
            "name": "Hipertensión arterial",
        }))
        .unwrap();

        assert!(matches!(data.severity, Severity::Moderado));
        assert!(matches!(data.diagnosis_type, DiagnosisType::Definitivo));
    }

    #[test]
    fn test_severity_wire_values() {
        assert_eq!(
            serde_json::to_string(&Severity::Critico).unwrap(),
            "\"critico\""
        );
        assert_eq!(
            serde_json::to_string(&DiagnosisType::Presuntivo).unwrap(),
            "\"presuntivo\""
        );
    }
}

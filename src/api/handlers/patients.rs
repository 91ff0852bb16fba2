//! Patient CRUD. Deleting a patient is a soft delete: the row is flagged
//! inactive and drops out of the default listing.

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

const PATIENTS: &str = "patients";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Masculino,
    Femenino,
    Otro,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Cedula,
    Pasaporte,
    TarjetaIdentidad,
    RegistroCivil,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub enum BloodType {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PatientCreate {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    #[serde(default = "default_document_type")]
    pub document_type: DocumentType,
    pub document_number: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub blood_type: Option<BloodType>,
    pub allergies: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PatientUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<DocumentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_type: Option<BloodType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allergies: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_contact_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_contact_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PatientResponse {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub document_type: DocumentType,
    pub document_number: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub blood_type: Option<String>,
    pub allergies: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PatientListQuery {
    /// Case-insensitive match over names and document number.
    pub search: Option<String>,
    pub is_active: Option<bool>,
}

fn default_document_type() -> DocumentType {
    DocumentType::Cedula
}

fn default_true() -> bool {
    true
}

fn validate_create(data: &PatientCreate) -> Result<(), Error> {
    if data.first_name.is_empty() || data.first_name.len() > 100 {
        return Err(Error::Validation(
            "first_name must be 1-100 characters".to_string(),
        ));
    }
    if data.last_name.is_empty() || data.last_name.len() > 100 {
        return Err(Error::Validation(
            "last_name must be 1-100 characters".to_string(),
        ));
    }
    if data.document_number.is_empty() || data.document_number.len() > 30 {
        return Err(Error::Validation(
            "document_number must be 1-30 characters".to_string(),
        ));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/patients",
    params(PatientListQuery),
    responses(
        (status = 200, description = "Matching patients", body = [PatientResponse]),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "patients"
)]
pub async fn list(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Query(query): Query<PatientListQuery>,
) -> Result<Json<Vec<PatientResponse>>, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let mut builder = ctx
        .tables
        .from(PATIENTS)
        .eq("is_active", query.is_active.unwrap_or(true));

    if let Some(search) = &query.search {
        builder = builder.or_ilike(&["first_name", "last_name", "document_number"], search);
    }

    let patients = builder.order_desc("created_at").select().await?;

    Ok(Json(patients))
}

#[utoipa::path(
    get,
    path = "/patients/{patient_id}",
    params(("patient_id" = String, Path, description = "Patient id")),
    responses(
        (status = 200, description = "The patient", body = PatientResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown patient"),
    ),
    tag = "patients"
)]
pub async fn get(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Path(patient_id): Path<String>,
) -> Result<Json<PatientResponse>, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let patient: Option<PatientResponse> = ctx
        .tables
        .from(PATIENTS)
        .eq("id", &patient_id)
        .select_one()
        .await?;

    patient
        .map(Json)
        .ok_or_else(|| Error::NotFound("Patient not found".to_string()))
}

#[utoipa::path(
    post,
    path = "/patients",
    request_body = PatientCreate,
    responses(
        (status = 201, description = "Patient created", body = PatientResponse),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "patients"
)]
pub async fn create(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    payload: Option<Json<PatientCreate>>,
) -> Result<(StatusCode, Json<Value>), Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let Some(Json(data)) = payload else {
        return Err(Error::Validation("Missing payload".to_string()));
    };
    validate_create(&data)?;

    let mut row = serde_json::to_value(&data).map_err(anyhow::Error::from)?;
    row["created_by"] = Value::String(ctx.user_id.clone());

    let mut inserted = ctx.tables.from(PATIENTS).insert(&row).await?;
    if inserted.is_empty() {
        return Err(Error::Validation("Patient was not created".to_string()));
    }

    Ok((StatusCode::CREATED, Json(inserted.swap_remove(0))))
}

#[utoipa::path(
    put,
    path = "/patients/{patient_id}",
    request_body = PatientUpdate,
    params(("patient_id" = String, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Patient updated", body = PatientResponse),
        (status = 400, description = "No fields to update"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown patient"),
    ),
    tag = "patients"
)]
pub async fn update(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Path(patient_id): Path<String>,
    payload: Option<Json<PatientUpdate>>,
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
        .from(PATIENTS)
        .eq("id", &patient_id)
        .update(&changes)
        .await?;

    if updated.is_empty() {
        return Err(Error::NotFound("Patient not found".to_string()));
    }

    Ok(Json(updated.swap_remove(0)))
}

#[utoipa::path(
    delete,
    path = "/patients/{patient_id}",
    params(("patient_id" = String, Path, description = "Patient id")),
    responses(
        (status = 204, description = "Patient deactivated"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown patient"),
    ),
    tag = "patients"
)]
pub async fn delete(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Path(patient_id): Path<String>,
) -> Result<StatusCode, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    // Soft delete keeps the clinical history reachable.
    let deactivated = ctx
        .tables
        .from(PATIENTS)
        .eq("id", &patient_id)
        .update(&serde_json::json!({ "is_active": false }))
        .await?;

    if deactivated.is_empty() {
        return Err(Error::NotFound("Patient not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_serializes_only_set_fields() {
        let update = PatientUpdate {
            first_name: Some("Ana".to_string()),
            last_name: None,
            date_of_birth: None,
            gender: None,
            document_type: None,
            document_number: None,
            email: None,
            phone: None,
            address: None,
            city: None,
            blood_type: Some(BloodType::ONegative),
            allergies: None,
            emergency_contact_name: None,
            emergency_contact_phone: None,
            is_active: None,
        };

        let value = serde_json::to_value(&update).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object["first_name"], "Ana");
        assert_eq!(object["blood_type"], "O-");
    }

    #[test]
    fn test_create_validation_limits() {
        let mut data: PatientCreate = serde_json::from_value(serde_json::json!({
            "first_name": "Ana",
            "last_name": "Pérez",
            "date_of_birth": "1990-04-02",
            "gender": "femenino",
            "document_number": "12345678",
        }))
        .unwrap();

        assert!(matches!(data.document_type, DocumentType::Cedula));
        assert!(validate_create(&data).is_ok());

        data.first_name = "x".repeat(101);
        assert!(validate_create(&data).is_err());
    }

    #[test]
    fn test_enum_wire_values() {
        assert_eq!(
            serde_json::to_string(&DocumentType::TarjetaIdentidad).unwrap(),
            "\"tarjeta_identidad\""
        );
        assert_eq!(serde_json::to_string(&Gender::Otro).unwrap(), "\"otro\"");
        assert_eq!(
            serde_json::to_string(&BloodType::AbPositive).unwrap(),
            "\"AB+\""
        );
    }
}

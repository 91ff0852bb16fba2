//! OpenAPI document served at `/docs` through Swagger UI.

use utoipa::OpenApi;

use super::handlers::{
    auth::{login, roles, types, users},
    consultations, diagnostics, medical_history, patients, treatments,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        login::login,
        login::verify_otp,
        login::refresh,
        login::sign_up,
        users::me,
        users::list_users,
        users::create_user,
        users::update_user,
        users::delete_user,
        patients::list,
        patients::get,
        patients::create,
        patients::update,
        patients::delete,
        consultations::list,
        consultations::get,
        consultations::create,
        consultations::update,
        consultations::delete,
        diagnostics::list,
        diagnostics::get,
        diagnostics::create,
        diagnostics::update,
        diagnostics::delete,
        treatments::list,
        treatments::get,
        treatments::create,
        treatments::update,
        treatments::delete,
        medical_history::list,
        medical_history::get,
        medical_history::create,
        medical_history::update,
        medical_history::delete,
    ),
    components(schemas(
        roles::Role,
        types::LoginRequest,
        types::VerifyOtpRequest,
        types::RefreshRequest,
        types::SignUpRequest,
        types::LoginResponse,
        types::CreateUserRequest,
        types::UpdateUserRequest,
        types::UserListItem,
        types::MeResponse,
        types::MutationResponse,
        patients::Gender,
        patients::DocumentType,
        patients::BloodType,
        patients::PatientCreate,
        patients::PatientUpdate,
        patients::PatientResponse,
        consultations::ConsultationStatus,
        consultations::ConsultationCreate,
        consultations::ConsultationUpdate,
        consultations::ConsultationResponse,
        diagnostics::Severity,
        diagnostics::DiagnosisType,
        diagnostics::DiagnosticCreate,
        diagnostics::DiagnosticUpdate,
        diagnostics::DiagnosticResponse,
        treatments::TreatmentType,
        treatments::TreatmentStatus,
        treatments::TreatmentCreate,
        treatments::TreatmentUpdate,
        treatments::TreatmentResponse,
        medical_history::EventType,
        medical_history::HistoryEntryCreate,
        medical_history::HistoryEntryUpdate,
        medical_history::HistoryEntryResponse,
    )),
    tags(
        (name = "auth", description = "Login sequence and user management"),
        (name = "patients", description = "Patient records"),
        (name = "consultations", description = "Clinical encounters"),
        (name = "diagnostics", description = "Diagnostic findings"),
        (name = "treatments", description = "Prescriptions and procedures"),
        (name = "medical_history", description = "Per-patient event timeline"),
    ),
    info(
        title = "careplus",
        description = "Clinical records backend on top of Supabase"
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document_lists_all_surfaces() {
        let doc = ApiDoc::openapi();

        for path in [
            "/auth/login",
            "/auth/verify-otp",
            "/auth/refresh",
            "/auth/sign_up",
            "/auth/me",
            "/auth/users",
            "/patients",
            "/consultations",
            "/diagnostics",
            "/treatments",
            "/medical_history",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing path: {path}");
        }
    }
}

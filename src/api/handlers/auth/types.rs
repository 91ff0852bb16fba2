//! Request/response payloads for the auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::roles::Role;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyOtpRequest {
    pub user_id: String,
    pub code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
}

/// Shared response for the login sequence endpoints. The access token is only
/// present once verification succeeded (or for flows that skip it).
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct LoginResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub success: bool,
    pub requires_verification: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Admin-scoped user creation; the assigned role is policy-checked against
/// the caller.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
    pub specialty: Option<String>,
    pub license_number: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub specialty: Option<String>,
    pub license_number: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserListItem {
    pub user_id: String,
    pub email: String,
    pub role_name: Role,
    pub full_name: String,
    pub specialty: Option<String>,
    pub license_number: Option<String>,
    pub phone: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user_id: String,
    pub email: String,
    pub role_name: Role,
    pub full_name: String,
    pub specialty: Option<String>,
    pub license_number: Option<String>,
    pub phone: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub can_manage_users: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MutationResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

fn default_true() -> bool {
    true
}

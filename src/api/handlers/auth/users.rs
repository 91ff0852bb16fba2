//! User management: profile lookup, listing and the role-gated mutations.
//!
//! Every mutation resolves the caller's role, the target's *current* role and
//! checks the policy for both; updates that change a role additionally check
//! that the new role is assignable. Denials name the missing permission.

use anyhow::anyhow;
use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::api::error::Error;
use crate::supabase::{auth::SignUpError, Supabase, TableClient};

use super::context::auth_context;
use super::roles::{ManageAction, Role};
use super::types::{
    CreateUserRequest, MeResponse, MutationResponse, UpdateUserRequest, UserListItem,
};

const USER_ROLES: &str = "user_roles";
const ROLES: &str = "roles";
const USERS_VIEW: &str = "v_users";

// Tables whose rows reference auth users through created_by.
const ATTRIBUTED_TABLES: [&str; 5] = [
    "patients",
    "consultations",
    "diagnostics",
    "treatments",
    "medical_history",
];

/// Look up a user's role through the user_roles -> roles join.
async fn role_of(tables: &TableClient, user_id: &str) -> Result<Role, Error> {
    let row: Option<Value> = tables
        .from(USER_ROLES)
        .columns("roles(name)")
        .eq("user_id", user_id)
        .select_one()
        .await?;

    let row = row.ok_or_else(|| Error::NotFound("User not found".to_string()))?;

    let name = row["roles"]["name"]
        .as_str()
        .ok_or_else(|| Error::Unexpected(anyhow!("user_roles row missing role name")))?;

    name.parse()
        .map_err(|err: String| Error::Unexpected(anyhow!(err)))
}

async fn role_id(tables: &TableClient, role: Role) -> Result<Value, Error> {
    let row: Option<Value> = tables
        .from(ROLES)
        .columns("id")
        .eq("name", role.as_str())
        .select_one()
        .await?;

    row.map(|row| row["id"].clone())
        .ok_or_else(|| Error::Validation(format!("Role '{role}' not found in the system")))
}

/// The authenticated user's own profile, including the resolved role.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Authenticated profile", body = MeResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "No profile for this user"),
    ),
    tag = "auth"
)]
pub async fn me(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
) -> Result<Json<MeResponse>, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let profile: Option<MeResponse> = ctx
        .tables
        .from(USERS_VIEW)
        .eq("user_id", &ctx.user_id)
        .select_one()
        .await?;

    profile
        .map(Json)
        .ok_or_else(|| Error::NotFound("User profile not found".to_string()))
}

/// List all accounts. Restricted to admin and superadmin callers.
#[utoipa::path(
    get,
    path = "/auth/users",
    responses(
        (status = 200, description = "All accounts", body = [UserListItem]),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller may not view the user list"),
    ),
    tag = "auth"
)]
pub async fn list_users(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
) -> Result<Json<Vec<UserListItem>>, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let caller_role = role_of(&ctx.tables, &ctx.user_id).await?;
    if !matches!(caller_role, Role::Superadmin | Role::Admin) {
        return Err(Error::Forbidden(
            "You cannot view the user list".to_string(),
        ));
    }

    let users = ctx
        .tables
        .from(USERS_VIEW)
        .order_desc("created_at")
        .select()
        .await?;

    Ok(Json(users))
}

/// Create an account with an assigned role. The caller must be allowed both
/// to create accounts of that role and to assign it.
#[utoipa::path(
    post,
    path = "/auth/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Account created", body = MutationResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller may not create this role"),
        (status = 409, description = "Email already registered"),
    ),
    tag = "auth"
)]
pub async fn create_user(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    payload: Option<Json<CreateUserRequest>>,
) -> Result<(StatusCode, Json<MutationResponse>), Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let Some(Json(request)) = payload else {
        return Err(Error::Validation("Missing payload".to_string()));
    };

    let caller_role = role_of(&ctx.tables, &ctx.user_id).await?;

    if !caller_role.can_manage(request.role, ManageAction::Create) {
        return Err(Error::Forbidden(format!(
            "You cannot create users with role '{}'",
            request.role
        )));
    }
    if !caller_role.can_manage(request.role, ManageAction::Assign) {
        return Err(Error::Forbidden(format!(
            "You cannot assign role '{}'",
            request.role
        )));
    }

    let user = match supabase
        .admin_auth()
        .admin_create_user(&request.email, &request.password)
        .await
    {
        Ok(user) => user,
        Err(SignUpError::Duplicate) => {
            return Err(Error::Conflict(
                "This email is already registered".to_string(),
            ));
        }
        Err(SignUpError::Other(err)) => return Err(Error::Unexpected(err)),
    };

    // Profile + role assignment rows are written with the service client; the
    // new user has no session yet.
    let service = supabase.service_table_client();
    let role_id = role_id(&service, request.role).await?;

    service
        .from(USER_ROLES)
        .insert(&json!({
            "user_id": user.id,
            "role_id": role_id,
            "full_name": request.full_name,
            "specialty": request.specialty,
            "license_number": request.license_number,
            "phone": request.phone,
            "is_active": true,
        }))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MutationResponse {
            success: true,
            message: "User created".to_string(),
            user_id: Some(user.id),
        }),
    ))
}

/// Edit an account. Checks the target's current role, and separately the new
/// role when the update reassigns it.
#[utoipa::path(
    put,
    path = "/auth/users/{target_user_id}",
    request_body = UpdateUserRequest,
    params(("target_user_id" = String, Path, description = "Account to edit")),
    responses(
        (status = 200, description = "Account updated", body = MutationResponse),
        (status = 400, description = "No fields to update"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller may not edit this account"),
        (status = 404, description = "Unknown account"),
    ),
    tag = "auth"
)]
pub async fn update_user(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Path(target_user_id): Path<String>,
    payload: Option<Json<UpdateUserRequest>>,
) -> Result<Json<MutationResponse>, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    let Some(Json(request)) = payload else {
        return Err(Error::Validation("Missing payload".to_string()));
    };

    let caller_role = role_of(&ctx.tables, &ctx.user_id).await?;
    if caller_role.managed_roles().is_empty() {
        return Err(Error::Forbidden("You cannot edit users".to_string()));
    }

    let target_role = role_of(&ctx.tables, &target_user_id).await?;
    if !caller_role.can_manage(target_role, ManageAction::Edit) {
        return Err(Error::Forbidden(format!(
            "You cannot edit users with role '{target_role}'"
        )));
    }

    let mut changes = Map::new();
    if let Some(full_name) = request.full_name {
        changes.insert("full_name".to_string(), Value::String(full_name));
    }
    if let Some(specialty) = request.specialty {
        changes.insert("specialty".to_string(), Value::String(specialty));
    }
    if let Some(license_number) = request.license_number {
        changes.insert("license_number".to_string(), Value::String(license_number));
    }
    if let Some(phone) = request.phone {
        changes.insert("phone".to_string(), Value::String(phone));
    }
    if let Some(is_active) = request.is_active {
        changes.insert("is_active".to_string(), Value::Bool(is_active));
    }

    if let Some(new_role) = request.role {
        // Changing the role is a second, independent permission.
        if !caller_role.can_manage(new_role, ManageAction::Assign) {
            let allowed = caller_role
                .assignable_roles()
                .iter()
                .map(|role| role.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::Forbidden(format!(
                "You cannot assign role '{new_role}'. Allowed roles: {allowed}"
            )));
        }

        let role_id = role_id(&ctx.tables, new_role).await?;
        changes.insert("role_id".to_string(), role_id);
    }

    if changes.is_empty() {
        return Err(Error::Validation("No fields to update".to_string()));
    }

    let updated = ctx
        .tables
        .from(USER_ROLES)
        .eq("user_id", &target_user_id)
        .update(&Value::Object(changes))
        .await?;

    if updated.is_empty() {
        return Err(Error::NotFound("User not found".to_string()));
    }

    Ok(Json(MutationResponse {
        success: true,
        message: "User updated".to_string(),
        user_id: Some(target_user_id),
    }))
}

/// Delete an account. Self-deletion is always denied; clinical rows keep
/// their data but lose the `created_by` attribution.
#[utoipa::path(
    delete,
    path = "/auth/users/{target_user_id}",
    params(("target_user_id" = String, Path, description = "Account to delete")),
    responses(
        (status = 200, description = "Account deleted", body = MutationResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller may not delete this account"),
        (status = 404, description = "Unknown account"),
    ),
    tag = "auth"
)]
pub async fn delete_user(
    headers: HeaderMap,
    supabase: Extension<Supabase>,
    Path(target_user_id): Path<String>,
) -> Result<Json<MutationResponse>, Error> {
    let ctx = auth_context(&headers, &supabase).await?;

    if ctx.user_id == target_user_id {
        return Err(Error::Forbidden(
            "You cannot delete your own account".to_string(),
        ));
    }

    let caller_role = role_of(&ctx.tables, &ctx.user_id).await?;
    if caller_role.managed_roles().is_empty() {
        return Err(Error::Forbidden("You cannot delete users".to_string()));
    }

    let target_role = role_of(&ctx.tables, &target_user_id).await?;
    if !caller_role.can_manage(target_role, ManageAction::Delete) {
        return Err(Error::Forbidden(format!(
            "You cannot delete users with role '{target_role}'"
        )));
    }

    let service = supabase.service_table_client();

    // Detach attribution before removing the account; rows stay behind.
    for table in ATTRIBUTED_TABLES {
        if let Err(err) = service
            .from(table)
            .eq("created_by", &target_user_id)
            .update(&json!({ "created_by": Value::Null }))
            .await
        {
            warn!("Failed to detach created_by in {table}: {err}");
        }
    }

    service
        .from(USER_ROLES)
        .eq("user_id", &target_user_id)
        .delete()
        .await?;

    // Seed accounts may have no auth user; absence is tolerated there.
    supabase
        .admin_auth()
        .admin_delete_user(&target_user_id)
        .await?;

    Ok(Json(MutationResponse {
        success: true,
        message: "User deleted".to_string(),
        user_id: Some(target_user_id),
    }))
}

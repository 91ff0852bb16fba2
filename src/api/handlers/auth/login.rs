//! The two-step login sequence plus session refresh and self-registration.
//!
//! Step 1 (`/auth/login`) verifies password credentials, parks the issued
//! access token inside a verification record and emails a 6-digit code.
//! Step 2 (`/auth/verify-otp`) checks the code and releases the token.

use axum::{extract::Extension, Json};
use tracing::{debug, error};

use crate::api::email::EmailSender;
use crate::api::error::Error;
use crate::api::handlers::valid_email;
use crate::supabase::{auth::SignUpError, Supabase};

use super::otp::{self, OtpRejection, VerifyOutcome};
use super::types::{LoginRequest, LoginResponse, RefreshRequest, SignUpRequest, VerifyOtpRequest};

/// Step 1 of the login: verify credentials and email a verification code.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials accepted, code sent", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
    ),
    tag = "auth"
)]
pub async fn login(
    supabase: Extension<Supabase>,
    email_sender: Extension<EmailSender>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Json<LoginResponse>, Error> {
    let Some(Json(request)) = payload else {
        return Err(Error::Validation("Missing payload".to_string()));
    };

    if !valid_email(&request.email) || request.password.is_empty() {
        return Err(Error::Unauthenticated);
    }

    let session = match supabase.auth().sign_in(&request.email, &request.password).await {
        Ok(session) => session,
        Err(err) => {
            debug!("sign-in rejected: {err}");
            return Err(Error::Unauthenticated);
        }
    };

    // The record is written as the logged-in user so the row-level policy on
    // verification_codes applies.
    let tables = supabase.table_client(&session.access_token);
    let code = otp::issue(&tables, &session.user_id, &session.email, &session.access_token).await?;

    if let Err(err) = email_sender.send(&session.email, &code).await {
        error!("Failed to send verification code: {err}");
        return Err(Error::Unexpected(err));
    }

    Ok(Json(LoginResponse {
        success: true,
        requires_verification: true,
        user_id: Some(session.user_id),
        message: Some("Verification code sent to your email".to_string()),
        ..LoginResponse::default()
    }))
}

/// Step 2 of the login: check the code and release the access token.
#[utoipa::path(
    post,
    path = "/auth/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Code accepted, token released", body = LoginResponse),
        (status = 400, description = "Missing, expired, exhausted or wrong code"),
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    supabase: Extension<Supabase>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> Result<Json<LoginResponse>, Error> {
    let Some(Json(request)) = payload else {
        return Err(Error::Validation("Missing payload".to_string()));
    };

    // The caller holds no token yet; the lookup runs under the service role.
    let tables = supabase.service_table_client();

    match otp::verify(&tables, &request.user_id, &request.code).await? {
        VerifyOutcome::Valid { access_token } => Ok(Json(LoginResponse {
            token: Some(access_token),
            success: true,
            message: Some("Verification successful".to_string()),
            ..LoginResponse::default()
        })),
        VerifyOutcome::Rejected(rejection) => Err(Error::Validation(rejection_detail(&rejection))),
    }
}

/// Exchange a refresh token for a new session.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New session issued", body = LoginResponse),
        (status = 401, description = "Invalid or expired refresh token"),
    ),
    tag = "auth"
)]
pub async fn refresh(
    supabase: Extension<Supabase>,
    payload: Option<Json<RefreshRequest>>,
) -> Result<Json<LoginResponse>, Error> {
    let Some(Json(request)) = payload else {
        return Err(Error::Validation("Missing payload".to_string()));
    };

    let session = match supabase.auth().refresh(&request.refresh_token).await {
        Ok(session) => session,
        Err(err) => {
            debug!("refresh rejected: {err}");
            return Err(Error::Unauthenticated);
        }
    };

    Ok(Json(LoginResponse {
        token: Some(session.access_token),
        refresh_token: Some(session.refresh_token),
        success: true,
        message: Some("Token refreshed".to_string()),
        ..LoginResponse::default()
    }))
}

/// Self-service registration with email + password.
#[utoipa::path(
    post,
    path = "/auth/sign_up",
    request_body = SignUpRequest,
    responses(
        (status = 200, description = "Account created", body = LoginResponse),
        (status = 400, description = "Registration rejected"),
        (status = 409, description = "Email already registered"),
    ),
    tag = "auth"
)]
pub async fn sign_up(
    supabase: Extension<Supabase>,
    payload: Option<Json<SignUpRequest>>,
) -> Result<Json<LoginResponse>, Error> {
    let Some(Json(request)) = payload else {
        return Err(Error::Validation("Missing payload".to_string()));
    };

    if !valid_email(&request.email) {
        return Err(Error::Validation("Invalid email address".to_string()));
    }

    let result = match supabase.auth().sign_up(&request.email, &request.password).await {
        Ok(result) => result,
        Err(SignUpError::Duplicate) => {
            return Err(Error::Conflict(
                "This email is already registered. Try logging in.".to_string(),
            ));
        }
        Err(SignUpError::Other(err)) => {
            debug!("sign-up rejected: {err}");
            return Err(Error::Validation(
                "Could not create the account. Check your details.".to_string(),
            ));
        }
    };

    if result.needs_confirmation {
        return Ok(Json(LoginResponse {
            success: true,
            requires_verification: true,
            user_id: Some(result.user_id),
            message: Some(
                "Account created. Confirm your email before logging in.".to_string(),
            ),
            ..LoginResponse::default()
        }));
    }

    Ok(Json(LoginResponse {
        token: result.access_token,
        success: true,
        user_id: Some(result.user_id),
        message: Some("Account created".to_string()),
        ..LoginResponse::default()
    }))
}

fn rejection_detail(rejection: &OtpRejection) -> String {
    match rejection {
        OtpRejection::NotFound => "Code expired or not found. Log in again.".to_string(),
        OtpRejection::AttemptsExhausted => {
            "Maximum attempts reached. Log in again.".to_string()
        }
        OtpRejection::CodeMismatch { remaining } => {
            format!("Incorrect code. {remaining} attempts remaining.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_details() {
        assert_eq!(
            rejection_detail(&OtpRejection::NotFound),
            "Code expired or not found. Log in again."
        );
        assert_eq!(
            rejection_detail(&OtpRejection::AttemptsExhausted),
            "Maximum attempts reached. Log in again."
        );
        assert_eq!(
            rejection_detail(&OtpRejection::CodeMismatch { remaining: 3 }),
            "Incorrect code. 3 attempts remaining."
        );
    }

    #[test]
    fn test_exhaustion_and_not_found_hide_retry_hints() {
        // Only mismatches reveal the remaining budget; the other rejections
        // point back to a fresh login.
        for rejection in [OtpRejection::NotFound, OtpRejection::AttemptsExhausted] {
            let detail = rejection_detail(&rejection);
            assert!(detail.contains("Log in again"));
            assert!(!detail.contains("remaining"));
        }
    }
}

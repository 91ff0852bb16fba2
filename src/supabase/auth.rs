//! GoTrue client: password sign-in, sign-up, session refresh, token-to-user
//! resolution and service-role admin operations.

use anyhow::{anyhow, Result};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

/// An issued session: the tokens plus the identity they belong to.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub email: String,
}

/// Outcome of a self-service registration. When email confirmation is enabled
/// on the project no session is issued until the address is confirmed.
#[derive(Debug, Clone)]
pub struct SignUp {
    pub access_token: Option<String>,
    pub user_id: String,
    pub email: String,
    pub needs_confirmation: bool,
}

#[derive(Debug)]
pub enum SignUpError {
    /// The email address is already registered.
    Duplicate,
    Other(anyhow::Error),
}

/// Identity resolved from an access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

/// Result of resolving a bearer token. `Expired` is kept distinct so callers
/// can tell the client to refresh instead of logging in again.
#[derive(Debug)]
pub enum UserLookup {
    User(AuthUser),
    Expired,
    Invalid,
}

#[derive(Debug, Clone)]
pub struct AuthClient {
    http: Client,
    auth_url: String,
    apikey: SecretString,
}

impl AuthClient {
    pub(crate) fn new(http: Client, auth_url: String, apikey: SecretString) -> Self {
        Self {
            http,
            auth_url,
            apikey,
        }
    }

    /// Verify password credentials and obtain a session.
    /// # Errors
    /// Returns an error on transport failure or invalid credentials.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let url = format!("{}/token?grant_type=password", self.auth_url);

        let response = self
            .http
            .post(&url)
            .header("apikey", self.apikey.expose_secret())
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body: Value = response.json().await.unwrap_or(Value::Null);

            return Err(anyhow!(
                "{} - {}, {}",
                url,
                status,
                gotrue_error_message(&body)
            ));
        }

        session_from_response(response.json().await?)
    }

    /// Exchange a refresh token for a new session.
    /// # Errors
    /// Returns an error on transport failure or an invalid/expired refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session> {
        let url = format!("{}/token?grant_type=refresh_token", self.auth_url);

        let response = self
            .http
            .post(&url)
            .header("apikey", self.apikey.expose_secret())
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body: Value = response.json().await.unwrap_or(Value::Null);

            return Err(anyhow!(
                "{} - {}, {}",
                url,
                status,
                gotrue_error_message(&body)
            ));
        }

        session_from_response(response.json().await?)
    }

    /// Register a new account with email + password.
    /// # Errors
    /// `SignUpError::Duplicate` when the address is already registered.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp, SignUpError> {
        let url = format!("{}/signup", self.auth_url);

        let response = self
            .http
            .post(&url)
            .header("apikey", self.apikey.expose_secret())
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| SignUpError::Other(e.into()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| SignUpError::Other(e.into()))?;

        if !status.is_success() {
            let message = gotrue_error_message(&body);
            if message.to_lowercase().contains("already registered")
                || body["error_code"].as_str() == Some("user_already_exists")
            {
                return Err(SignUpError::Duplicate);
            }
            return Err(SignUpError::Other(anyhow!("{} - {}, {}", url, status, message)));
        }

        // A session is only present when confirmation is disabled; otherwise
        // GoTrue returns the bare user and the account stays pending.
        let (user, access_token) = if body["access_token"].is_string() {
            (&body["user"], body["access_token"].as_str().map(String::from))
        } else {
            (&body, None)
        };

        let user_id = user["id"]
            .as_str()
            .ok_or_else(|| SignUpError::Other(anyhow!("sign-up response missing user id")))?
            .to_string();

        Ok(SignUp {
            needs_confirmation: access_token.is_none(),
            email: user["email"].as_str().unwrap_or_default().to_string(),
            user_id,
            access_token,
        })
    }

    /// Resolve an access token to its user.
    /// # Errors
    /// Returns an error only on transport failure; invalid or expired tokens
    /// are reported through `UserLookup`.
    pub async fn get_user(&self, token: &str) -> Result<UserLookup> {
        let url = format!("{}/user", self.auth_url);

        let response = self
            .http
            .get(&url)
            .header("apikey", self.apikey.expose_secret())
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body: Value = response.json().await.unwrap_or(Value::Null);

            if token_expired(&body) {
                return Ok(UserLookup::Expired);
            }

            debug!("token rejected: {}", gotrue_error_message(&body));

            return Ok(UserLookup::Invalid);
        }

        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);

            return Err(anyhow!(
                "{} - {}, {}",
                url,
                status,
                gotrue_error_message(&body)
            ));
        }

        let body: Value = response.json().await?;
        let id = body["id"]
            .as_str()
            .ok_or_else(|| anyhow!("user response missing id"))?
            .to_string();

        Ok(UserLookup::User(AuthUser {
            id,
            email: body["email"].as_str().unwrap_or_default().to_string(),
        }))
    }

    /// Create a user with the admin API, skipping email confirmation.
    /// Requires the service-role key.
    /// # Errors
    /// `SignUpError::Duplicate` when the address is already registered.
    pub async fn admin_create_user(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, SignUpError> {
        let url = format!("{}/admin/users", self.auth_url);

        let response = self
            .http
            .post(&url)
            .header("apikey", self.apikey.expose_secret())
            .bearer_auth(self.apikey.expose_secret())
            .json(&json!({
                "email": email,
                "password": password,
                "email_confirm": true,
            }))
            .send()
            .await
            .map_err(|e| SignUpError::Other(e.into()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| SignUpError::Other(e.into()))?;

        if !status.is_success() {
            let message = gotrue_error_message(&body);
            if message.to_lowercase().contains("already been registered")
                || body["error_code"].as_str() == Some("email_exists")
            {
                return Err(SignUpError::Duplicate);
            }
            return Err(SignUpError::Other(anyhow!("{} - {}, {}", url, status, message)));
        }

        let id = body["id"]
            .as_str()
            .ok_or_else(|| SignUpError::Other(anyhow!("admin create response missing id")))?
            .to_string();

        Ok(AuthUser {
            id,
            email: body["email"].as_str().unwrap_or_default().to_string(),
        })
    }

    /// Delete a user with the admin API. Requires the service-role key.
    /// # Errors
    /// Returns an error on transport failure or a non-success status other
    /// than 404 (absent users are tolerated: seed data may never have existed
    /// in GoTrue).
    pub async fn admin_delete_user(&self, user_id: &str) -> Result<()> {
        let url = format!("{}/admin/users/{}", self.auth_url, user_id);

        let response = self
            .http
            .delete(&url)
            .header("apikey", self.apikey.expose_secret())
            .bearer_auth(self.apikey.expose_secret())
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!("auth user {} not found, skipping", user_id);
            return Ok(());
        }

        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);

            return Err(anyhow!(
                "{} - {}, {}",
                url,
                status,
                gotrue_error_message(&body)
            ));
        }

        Ok(())
    }
}

fn gotrue_error_message(body: &Value) -> &str {
    body["msg"]
        .as_str()
        .or_else(|| body["message"].as_str())
        .or_else(|| body["error_description"].as_str())
        .unwrap_or("")
}

fn token_expired(body: &Value) -> bool {
    if matches!(
        body["error_code"].as_str(),
        Some("session_expired" | "bad_jwt_expired")
    ) {
        return true;
    }

    gotrue_error_message(body).to_lowercase().contains("expired")
}

fn session_from_response(body: Value) -> Result<Session> {
    let access_token = body["access_token"]
        .as_str()
        .ok_or_else(|| anyhow!("session response missing access_token"))?
        .to_string();

    let refresh_token = body["refresh_token"]
        .as_str()
        .ok_or_else(|| anyhow!("session response missing refresh_token"))?
        .to_string();

    Ok(Session {
        access_token,
        refresh_token,
        user_id: body["user"]["id"].as_str().unwrap_or_default().to_string(),
        email: body["user"]["email"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_response() {
        let session = session_from_response(json!({
            "access_token": "at",
            "refresh_token": "rt",
            "user": { "id": "u-1", "email": "doc@careplus.dev" }
        }))
        .unwrap();

        assert_eq!(session.access_token, "at");
        assert_eq!(session.refresh_token, "rt");
        assert_eq!(session.user_id, "u-1");
        assert_eq!(session.email, "doc@careplus.dev");
    }

    #[test]
    fn test_session_from_response_missing_token() {
        assert!(session_from_response(json!({ "refresh_token": "rt" })).is_err());
    }

    #[test]
    fn test_token_expired_detection() {
        assert!(token_expired(&json!({ "error_code": "session_expired" })));
        assert!(token_expired(&json!({ "msg": "JWT expired" })));
        assert!(!token_expired(&json!({ "msg": "invalid signature" })));
    }
}

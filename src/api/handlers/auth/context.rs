//! Auth-context resolution: bearer credential to identity plus a scoped
//! table client. Resolved once per request; downstream code never re-derives
//! identity from the token.

use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::api::error::Error;
use crate::supabase::{auth::UserLookup, Supabase, TableClient};

/// Authenticated caller context. The table client carries the caller's bearer
/// token, so row-level security applies to every query made through it.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub email: String,
    pub token: String,
    pub tables: TableClient,
}

/// Resolve the `Authorization: Bearer` header into an [`AuthContext`].
/// # Errors
/// `Unauthenticated` for missing/malformed/rejected credentials; `Expired`
/// when the identity service reports token expiry, so clients know to use the
/// refresh flow instead of logging in again.
pub async fn auth_context(headers: &HeaderMap, supabase: &Supabase) -> Result<AuthContext, Error> {
    let token = bearer_token(headers).ok_or(Error::Unauthenticated)?;

    match supabase.auth().get_user(token).await? {
        UserLookup::User(user) => Ok(AuthContext {
            user_id: user.id,
            email: user.email,
            token: token.to_string(),
            tables: supabase.table_client(token),
        }),
        UserLookup::Expired => Err(Error::Expired),
        UserLookup::Invalid => Err(Error::Unauthenticated),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();

    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));
    }

    #[test]
    fn test_bearer_token_missing_or_malformed() {
        let headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(bearer_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}

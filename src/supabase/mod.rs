pub mod auth;
pub mod table;

pub use auth::AuthClient;
pub use table::TableClient;

use crate::cli::globals::GlobalArgs;
use anyhow::{anyhow, Result};
use reqwest::Client;
use secrecy::SecretString;
use url::Url;

/// Normalize the project base URL and append an API endpoint.
pub fn endpoint_url(base_url: &str, endpoint: &str) -> Result<String> {
    let url = Url::parse(base_url)?;

    let scheme = url.scheme();

    let host = url
        .host()
        .ok_or_else(|| anyhow!("Error parsing URL: no host specified"))?
        .to_owned();

    let port = match url.port() {
        Some(p) => p,
        None => match scheme {
            "http" => 80,
            "https" => 443,
            _ => return Err(anyhow!("Error parsing URL: unsupported scheme {}", scheme)),
        },
    };

    Ok(format!("{scheme}://{host}:{port}{endpoint}"))
}

/// Handle to a Supabase project. Scoped clients are built per request: table
/// access under the anon key carries the caller's bearer token so row-level
/// security applies; the service-role variants bypass it.
#[derive(Debug, Clone)]
pub struct Supabase {
    http: Client,
    rest_url: String,
    auth_url: String,
    anon_key: SecretString,
    service_role_key: SecretString,
}

impl Supabase {
    /// Build the project handle from the runtime configuration.
    /// # Errors
    /// Returns an error if the project URL cannot be parsed or the HTTP client
    /// cannot be constructed.
    pub fn new(globals: &GlobalArgs) -> Result<Self> {
        let http = Client::builder().user_agent(crate::APP_USER_AGENT).build()?;

        Ok(Self {
            http,
            rest_url: endpoint_url(&globals.supabase_url, "/rest/v1")?,
            auth_url: endpoint_url(&globals.supabase_url, "/auth/v1")?,
            anon_key: globals.anon_key.clone(),
            service_role_key: globals.service_role_key.clone(),
        })
    }

    /// GoTrue client under the anon key (sign-in, sign-up, refresh, get-user).
    #[must_use]
    pub fn auth(&self) -> AuthClient {
        AuthClient::new(self.http.clone(), self.auth_url.clone(), self.anon_key.clone())
    }

    /// GoTrue admin client under the service-role key (create/delete users).
    #[must_use]
    pub fn admin_auth(&self) -> AuthClient {
        AuthClient::new(
            self.http.clone(),
            self.auth_url.clone(),
            self.service_role_key.clone(),
        )
    }

    /// Table client acting as the given user; row-level security applies.
    #[must_use]
    pub fn table_client(&self, bearer: &str) -> TableClient {
        TableClient::new(
            self.http.clone(),
            self.rest_url.clone(),
            self.anon_key.clone(),
            SecretString::from(bearer.to_string()),
        )
    }

    /// Table client under the service-role key; bypasses row-level security.
    #[must_use]
    pub fn service_table_client(&self) -> TableClient {
        TableClient::new(
            self.http.clone(),
            self.rest_url.clone(),
            self.service_role_key.clone(),
            self.service_role_key.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        let url = endpoint_url("https://project.supabase.co", "/rest/v1").unwrap();
        assert_eq!(url, "https://project.supabase.co:443/rest/v1");

        let url = endpoint_url("http://localhost:54321", "/auth/v1").unwrap();
        assert_eq!(url, "http://localhost:54321/auth/v1");
    }

    #[test]
    fn test_endpoint_url_rejects_bad_scheme() {
        assert!(endpoint_url("ftp://project.supabase.co", "/rest/v1").is_err());
        assert!(endpoint_url("not a url", "/rest/v1").is_err());
    }
}

//! Thin PostgREST client: filtered reads and mutations over named tables.
//!
//! Only the operators this service uses are modeled (`eq`, `gte`, `or=ilike`
//! search, ordering, limits). Mutations ask for `return=representation` so
//! callers can distinguish "no row matched" from success without a second
//! round-trip; the OTP verifier also relies on it for its compare-and-swap
//! attempt counting.

use anyhow::{anyhow, Result};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct TableClient {
    http: Client,
    rest_url: String,
    apikey: SecretString,
    bearer: SecretString,
}

impl TableClient {
    pub(crate) fn new(
        http: Client,
        rest_url: String,
        apikey: SecretString,
        bearer: SecretString,
    ) -> Self {
        Self {
            http,
            rest_url,
            apikey,
            bearer,
        }
    }

    /// Start a query against a named table.
    #[must_use]
    pub fn from(&self, table: &str) -> QueryBuilder<'_> {
        QueryBuilder {
            client: self,
            table: table.to_string(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", self.apikey.expose_secret())
            .bearer_auth(self.bearer.expose_secret())
    }

    async fn execute(&self, request: RequestBuilder, url: &str) -> Result<Value> {
        let response = self.authed(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let json_response: Value = response.json().await.unwrap_or(Value::Null);

            return Err(anyhow!(
                "{} - {}, {}",
                url,
                status,
                json_response["message"].as_str().unwrap_or("")
            ));
        }

        // 204 No Content has an empty body
        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(Value::Array(Vec::new()));
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

#[derive(Debug)]
pub struct QueryBuilder<'a> {
    client: &'a TableClient,
    table: String,
    columns: String,
    filters: Vec<(String, String)>,
    order: Option<String>,
    limit: Option<u32>,
}

impl QueryBuilder<'_> {
    /// Restrict the selected columns; supports PostgREST embedded resources
    /// such as `roles(name)`.
    #[must_use]
    pub fn columns(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    #[must_use]
    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters
            .push((column.to_string(), format!("eq.{}", value.to_string())));
        self
    }

    #[must_use]
    pub fn gte(mut self, column: &str, value: impl ToString) -> Self {
        self.filters
            .push((column.to_string(), format!("gte.{}", value.to_string())));
        self
    }

    /// Case-insensitive substring search across several columns.
    #[must_use]
    pub fn or_ilike(mut self, columns: &[&str], term: &str) -> Self {
        let disjuncts = columns
            .iter()
            .map(|column| format!("{column}.ilike.*{term}*"))
            .collect::<Vec<_>>()
            .join(",");
        self.filters.push(("or".to_string(), format!("({disjuncts})")));
        self
    }

    #[must_use]
    pub fn order_desc(mut self, column: &str) -> Self {
        self.order = Some(format!("{column}.desc"));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    fn table_url(&self) -> String {
        format!("{}/{}", self.client.rest_url, self.table)
    }

    fn query_params(&self, with_select: bool) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if with_select {
            params.push(("select".to_string(), self.columns.clone()));
        }
        params.extend(self.filters.iter().cloned());
        if let Some(order) = &self.order {
            params.push(("order".to_string(), order.clone()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// Fetch all matching rows.
    /// # Errors
    /// Returns an error on transport failure or a non-success PostgREST status.
    pub async fn select<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        let url = self.table_url();
        let request = self
            .client
            .http
            .get(&url)
            .query(&self.query_params(true));

        debug!("select {}", url);

        let value = self.client.execute(request, &url).await?;

        Ok(serde_json::from_value(value)?)
    }

    /// Fetch the first matching row, if any.
    /// # Errors
    /// Returns an error on transport failure or a non-success PostgREST status.
    pub async fn select_one<T: DeserializeOwned>(mut self) -> Result<Option<T>> {
        self.limit = Some(1);

        let mut rows: Vec<T> = self.select().await?;

        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows.swap_remove(0)))
        }
    }

    /// Insert a row, returning the stored representation.
    /// # Errors
    /// Returns an error on transport failure or a non-success PostgREST status.
    pub async fn insert(self, row: &Value) -> Result<Vec<Value>> {
        let url = self.table_url();
        let request = self
            .client
            .http
            .post(&url)
            .header("Prefer", "return=representation")
            .json(row);

        debug!("insert into {}", url);

        let value = self.client.execute(request, &url).await?;

        Ok(serde_json::from_value(value)?)
    }

    /// Update matching rows, returning the rows actually updated. An empty
    /// result means no row matched the filters.
    /// # Errors
    /// Returns an error on transport failure or a non-success PostgREST status.
    pub async fn update(self, changes: &Value) -> Result<Vec<Value>> {
        let url = self.table_url();
        let request = self
            .client
            .http
            .patch(&url)
            .query(&self.query_params(false))
            .header("Prefer", "return=representation")
            .json(changes);

        debug!("update {}", url);

        let value = self.client.execute(request, &url).await?;

        Ok(serde_json::from_value(value)?)
    }

    /// Delete matching rows, returning the rows removed.
    /// # Errors
    /// Returns an error on transport failure or a non-success PostgREST status.
    pub async fn delete(self) -> Result<Vec<Value>> {
        let url = self.table_url();
        let request = self
            .client
            .http
            .delete(&url)
            .query(&self.query_params(false))
            .header("Prefer", "return=representation");

        debug!("delete from {}", url);

        let value = self.client.execute(request, &url).await?;

        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TableClient {
        TableClient::new(
            Client::new(),
            "https://project.supabase.co:443/rest/v1".to_string(),
            SecretString::from("anon".to_string()),
            SecretString::from("token".to_string()),
        )
    }

    #[test]
    fn test_filters_serialize_in_order() {
        let client = client();
        let query = client
            .from("verification_codes")
            .eq("user_id", "u-1")
            .eq("used", false)
            .gte("expires_at", "2026-01-01T00:00:00Z")
            .order_desc("created_at")
            .limit(1);

        assert_eq!(
            query.query_params(true),
            vec![
                ("select".to_string(), "*".to_string()),
                ("user_id".to_string(), "eq.u-1".to_string()),
                ("used".to_string(), "eq.false".to_string()),
                (
                    "expires_at".to_string(),
                    "gte.2026-01-01T00:00:00Z".to_string()
                ),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_or_ilike_search() {
        let client = client();
        let query = client
            .from("patients")
            .or_ilike(&["first_name", "last_name", "document_number"], "perez");

        assert_eq!(
            query.query_params(false),
            vec![(
                "or".to_string(),
                "(first_name.ilike.*perez*,last_name.ilike.*perez*,document_number.ilike.*perez*)"
                    .to_string()
            )]
        );
    }

    #[test]
    fn test_table_url() {
        let client = client();
        let query = client.from("patients");
        assert_eq!(
            query.table_url(),
            "https://project.supabase.co:443/rest/v1/patients"
        );
    }
}

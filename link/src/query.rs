//! PostgREST transport: the HTTP implementation of [`Backend`].

use std::time::Instant;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::{
    auth::AuthProvider,
    backend::Backend,
    error::{Result, VeneredLinkError},
    models::Table,
    table_query::TableQuery,
};

const PREFER_REPRESENTATION: &str = "return=representation";
const PREFER_MERGE: &str = "resolution=merge-duplicates,return=representation";

/// Error body PostgREST returns on 4xx/5xx.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

impl PostgrestError {
    fn describe(self) -> Option<String> {
        let mut message = self.message?;
        if let Some(code) = self.code {
            message = format!("{} [{}]", message, code);
        }
        if let Some(details) = self.details.filter(|d| !d.is_empty()) {
            message = format!("{}: {}", message, details);
        }
        if let Some(hint) = self.hint.filter(|h| !h.is_empty()) {
            message = format!("{} (hint: {})", message, hint);
        }
        Some(message)
    }
}

/// Executes table queries and RPCs via HTTP, retrying connect errors and
/// timeouts with a linear backoff.
#[derive(Clone)]
pub struct RestBackend {
    base_url: String,
    http_client: reqwest::Client,
    auth: AuthProvider,
    max_retries: u32,
}

impl RestBackend {
    pub(crate) fn new(
        base_url: String,
        http_client: reqwest::Client,
        auth: AuthProvider,
        max_retries: u32,
    ) -> Self {
        Self {
            base_url,
            http_client,
            auth,
            max_retries,
        }
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, function)
    }

    fn request(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        prefer: Option<&str>,
        body: Option<&JsonValue>,
    ) -> Result<reqwest::RequestBuilder> {
        let mut builder = self.http_client.request(method, url).query(query);
        if let Some(prefer) = prefer {
            builder = builder.header("Prefer", prefer);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.auth.apply_to_request(builder)
    }

    /// Send with retry; non-success statuses become `ServerError`.
    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        prefer: Option<&str>,
        body: Option<&JsonValue>,
    ) -> Result<reqwest::Response> {
        let mut retries = 0;
        let overall_start = Instant::now();

        loop {
            // Request builders with bodies cannot be cloned, so rebuild per attempt
            let req_builder = self.request(method.clone(), url, query, prefer, body)?;
            let attempt_start = Instant::now();
            debug!(
                "[LINK_HTTP] Sending {} to {} (attempt {}/{})",
                method,
                url,
                retries + 1,
                self.max_retries + 1
            );

            match req_builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    let http_duration_ms = attempt_start.elapsed().as_millis();
                    debug!(
                        "[LINK_HTTP] Response received: status={} duration_ms={}",
                        status, http_duration_ms
                    );

                    if status.is_success() {
                        return Ok(response);
                    }

                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    let error_message = serde_json::from_str::<PostgrestError>(&error_text)
                        .ok()
                        .and_then(PostgrestError::describe)
                        .unwrap_or(error_text);

                    warn!(
                        "[LINK_HTTP] Server error: status={} message=\"{}\" duration_ms={}",
                        status, error_message, http_duration_ms
                    );
                    return Err(VeneredLinkError::ServerError {
                        status_code: status.as_u16(),
                        message: error_message,
                    });
                },
                Err(e)
                    if retries < self.max_retries
                        && retry_allowed(&method, e.is_timeout(), e.is_connect()) =>
                {
                    warn!(
                        "[LINK_HTTP] Retriable error (attempt {}/{}): {} duration_ms={}",
                        retries + 1,
                        self.max_retries + 1,
                        e,
                        attempt_start.elapsed().as_millis()
                    );
                    retries += 1;
                    tokio::time::sleep(tokio::time::Duration::from_millis(100 * retries as u64))
                        .await;
                },
                Err(e) => {
                    warn!(
                        "[LINK_HTTP] Fatal error: {} total_ms={}",
                        e,
                        overall_start.elapsed().as_millis()
                    );
                    return Err(e.into());
                },
            }
        }
    }

    async fn rows(response: reqwest::Response) -> Result<Vec<JsonValue>> {
        match response.json::<JsonValue>().await? {
            JsonValue::Array(rows) => Ok(rows),
            JsonValue::Null => Ok(Vec::new()),
            single => Ok(vec![single]),
        }
    }
}

/// A refused connection never reached the server, so any method may retry.
/// A timeout may have been applied already, so only methods that are safe to
/// repeat retry on it.
fn retry_allowed(method: &Method, timed_out: bool, connect_failed: bool) -> bool {
    if connect_failed {
        return true;
    }
    timed_out && matches!(*method, Method::GET | Method::HEAD | Method::PATCH)
}

/// Total from a `Content-Range` header: `0-9/42` or `*/42`.
pub(crate) fn parse_content_range(header: &str) -> Option<u64> {
    let (_, total) = header.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// Filters only: PATCH, DELETE and HEAD ignore ordering and projection.
fn filter_pairs(query: &TableQuery) -> Vec<(String, String)> {
    TableQuery {
        columns: Vec::new(),
        order: None,
        limit: None,
        ..query.clone()
    }
    .to_query_pairs()
}

#[async_trait]
impl Backend for RestBackend {
    async fn select(&self, query: &TableQuery) -> Result<Vec<JsonValue>> {
        let url = self.table_url(query.table);
        let response = self
            .send(Method::GET, &url, &query.to_query_pairs(), None, None)
            .await?;
        Self::rows(response).await
    }

    async fn count(&self, query: &TableQuery) -> Result<u64> {
        let url = self.table_url(query.table);
        let mut pairs = filter_pairs(query);
        pairs.insert(0, ("select".to_string(), "id".to_string()));
        let response = self
            .send(Method::HEAD, &url, &pairs, Some("count=exact"), None)
            .await?;

        let header = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                VeneredLinkError::SerializationError("missing Content-Range header".into())
            })?;
        parse_content_range(header).ok_or_else(|| {
            VeneredLinkError::SerializationError(format!("bad Content-Range: {}", header))
        })
    }

    async fn insert(&self, table: Table, rows: Vec<JsonValue>) -> Result<Vec<JsonValue>> {
        let body = JsonValue::Array(rows);
        let response = self
            .send(
                Method::POST,
                &self.table_url(table),
                &[],
                Some(PREFER_REPRESENTATION),
                Some(&body),
            )
            .await?;
        Self::rows(response).await
    }

    async fn upsert(
        &self,
        table: Table,
        rows: Vec<JsonValue>,
        on_conflict: &[&str],
    ) -> Result<Vec<JsonValue>> {
        let body = JsonValue::Array(rows);
        let query = if on_conflict.is_empty() {
            Vec::new()
        } else {
            vec![("on_conflict".to_string(), on_conflict.join(","))]
        };
        let response = self
            .send(
                Method::POST,
                &self.table_url(table),
                &query,
                Some(PREFER_MERGE),
                Some(&body),
            )
            .await?;
        Self::rows(response).await
    }

    async fn update(&self, query: &TableQuery, patch: JsonValue) -> Result<Vec<JsonValue>> {
        let response = self
            .send(
                Method::PATCH,
                &self.table_url(query.table),
                &filter_pairs(query),
                Some(PREFER_REPRESENTATION),
                Some(&patch),
            )
            .await?;
        Self::rows(response).await
    }

    async fn delete(&self, query: &TableQuery) -> Result<u64> {
        let response = self
            .send(
                Method::DELETE,
                &self.table_url(query.table),
                &filter_pairs(query),
                Some(PREFER_REPRESENTATION),
                None,
            )
            .await?;
        Ok(Self::rows(response).await?.len() as u64)
    }

    async fn rpc(&self, function: &str, args: JsonValue) -> Result<JsonValue> {
        let response = self
            .send(Method::POST, &self.rpc_url(function), &[], None, Some(&args))
            .await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(JsonValue::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_retries_only_repeatable_methods() {
        assert!(retry_allowed(&Method::GET, true, false));
        assert!(retry_allowed(&Method::HEAD, true, false));
        assert!(retry_allowed(&Method::PATCH, true, false));
        assert!(!retry_allowed(&Method::POST, true, false));
        assert!(!retry_allowed(&Method::DELETE, true, false));
    }

    #[test]
    fn test_connect_failure_retries_any_method() {
        assert!(retry_allowed(&Method::POST, false, true));
        assert!(retry_allowed(&Method::DELETE, false, true));
        assert!(!retry_allowed(&Method::POST, false, false));
        assert!(!retry_allowed(&Method::GET, false, false));
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("*/42"), Some(42));
        assert_eq!(parse_content_range("0-9/120"), Some(120));
        assert_eq!(parse_content_range("0-9/*"), None);
        assert_eq!(parse_content_range("garbage"), None);
    }

    #[test]
    fn test_filter_pairs_drop_order_and_limit() {
        let query = TableQuery::new(Table::Messages)
            .columns(&["id"])
            .eq("receiver_id", "me")
            .order("created_at", false)
            .limit(5);
        assert_eq!(
            filter_pairs(&query),
            vec![("receiver_id".to_string(), "eq.me".to_string())]
        );
    }

    #[test]
    fn test_postgrest_error_description() {
        let err: PostgrestError = serde_json::from_str(
            r#"{"message":"duplicate key","code":"23505","details":"Key exists","hint":null}"#,
        )
        .unwrap();
        assert_eq!(
            err.describe().as_deref(),
            Some("duplicate key [23505]: Key exists")
        );
    }

    #[test]
    fn test_request_carries_prefer_and_auth() {
        let backend = RestBackend::new(
            "http://localhost:54321".into(),
            reqwest::Client::new(),
            AuthProvider::session("anon", "tok"),
            3,
        );
        let request = backend
            .request(
                Method::PATCH,
                &backend.table_url(Table::Notifications),
                &[("id".into(), "eq.n1".into())],
                Some(PREFER_REPRESENTATION),
                Some(&serde_json::json!({"read": true})),
            )
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            request.url().as_str(),
            "http://localhost:54321/rest/v1/notifications?id=eq.n1"
        );
        assert_eq!(request.headers()["prefer"], PREFER_REPRESENTATION);
        assert_eq!(request.headers()["apikey"], "anon");
    }
}

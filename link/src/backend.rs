//! The data seam every reducer and service talks to.
//!
//! [`RestBackend`](crate::RestBackend) implements it over HTTP and
//! [`MemoryBackend`](crate::MemoryBackend) in process. Rows cross the seam as
//! JSON and are decoded into typed models with the helpers below.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::{Result, VeneredLinkError};
use crate::models::Table;
use crate::table_query::TableQuery;

/// Row storage operations, executed under the caller's identity.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Rows matching `query`, honoring order, limit and projection.
    async fn select(&self, query: &TableQuery) -> Result<Vec<JsonValue>>;

    /// Number of rows matching the filters of `query`.
    async fn count(&self, query: &TableQuery) -> Result<u64>;

    /// Insert rows, returning them as stored.
    async fn insert(&self, table: Table, rows: Vec<JsonValue>) -> Result<Vec<JsonValue>>;

    /// Insert or merge on the `on_conflict` columns.
    async fn upsert(
        &self,
        table: Table,
        rows: Vec<JsonValue>,
        on_conflict: &[&str],
    ) -> Result<Vec<JsonValue>>;

    /// Apply `patch` to every row matching `query`, returning the new images.
    async fn update(&self, query: &TableQuery, patch: JsonValue) -> Result<Vec<JsonValue>>;

    /// Delete rows matching `query`, returning how many went away.
    async fn delete(&self, query: &TableQuery) -> Result<u64>;

    /// Call a database function.
    async fn rpc(&self, function: &str, args: JsonValue) -> Result<JsonValue>;
}

/// Select and decode every row.
pub async fn fetch_rows<T: DeserializeOwned>(
    backend: &dyn Backend,
    query: &TableQuery,
) -> Result<Vec<T>> {
    backend
        .select(query)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(VeneredLinkError::from))
        .collect()
}

/// Select at most one row; `None` when nothing matches.
pub async fn fetch_optional<T: DeserializeOwned>(
    backend: &dyn Backend,
    query: TableQuery,
) -> Result<Option<T>> {
    let rows = backend.select(&query.limit(1)).await?;
    match rows.into_iter().next() {
        Some(row) => Ok(Some(serde_json::from_value(row)?)),
        None => Ok(None),
    }
}

/// Insert one row and decode what the backend stored.
pub async fn insert_row<N: Serialize + ?Sized, T: DeserializeOwned>(
    backend: &dyn Backend,
    table: Table,
    row: &N,
) -> Result<T> {
    let stored = backend.insert(table, vec![serde_json::to_value(row)?]).await?;
    first_row(table, stored)
}

/// Upsert one row and decode what the backend stored.
pub async fn upsert_row<N: Serialize + ?Sized, T: DeserializeOwned>(
    backend: &dyn Backend,
    table: Table,
    row: &N,
    on_conflict: &[&str],
) -> Result<T> {
    let stored = backend
        .upsert(table, vec![serde_json::to_value(row)?], on_conflict)
        .await?;
    first_row(table, stored)
}

/// Call an RPC and decode its result.
pub async fn call_rpc<T: DeserializeOwned>(
    backend: &dyn Backend,
    function: &str,
    args: JsonValue,
) -> Result<T> {
    Ok(serde_json::from_value(backend.rpc(function, args).await?)?)
}

fn first_row<T: DeserializeOwned>(table: Table, rows: Vec<JsonValue>) -> Result<T> {
    let row = rows.into_iter().next().ok_or_else(|| {
        VeneredLinkError::InternalError(format!("{} write returned no representation", table))
    })?;
    Ok(serde_json::from_value(row)?)
}

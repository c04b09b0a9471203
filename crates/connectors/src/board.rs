//! Board system GraphQL client.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::debug;

use hirebill_core::gateway::{Board, ExternalSystem, StatusColumn, UpstreamError};
use hirebill_core::sync_record::{BoardUpdate, SyncRecord};
use hirebill_shared::config::BoardConfig;
use hirebill_shared::types::{BoardItemId, JobId};

use crate::http::{build_client, error_text, read_json, send_error};
use crate::retry::RetryPolicy;

const SYSTEM: ExternalSystem = ExternalSystem::Board;
const API_VERSION: &str = "2024-10";
const UPDATE_PAGE_SIZE: u32 = 100;

const FIND_ITEM: &str = r"query ($board: ID!, $column: String!, $value: String!, $cols: [String!]) {
  items_page_by_column_values(board_id: $board, limit: 1, columns: [{column_id: $column, column_values: [$value]}]) {
    items { id name column_values(ids: $cols) { id text } }
  }
}";

const SET_STATUS: &str = r"mutation ($board: ID!, $item: ID!, $column: String!, $label: String!) {
  change_simple_column_value(board_id: $board, item_id: $item, column_id: $column, value: $label) { id }
}";

const CREATE_UPDATE: &str = r"mutation ($item: ID!, $body: String!) {
  create_update(item_id: $item, body: $body) { id }
}";

const LIST_UPDATES: &str = r"query ($item: ID!, $limit: Int!) {
  items(ids: [$item]) { updates(limit: $limit) { id body text_body created_at } }
}";

/// Board client.
#[derive(Debug, Clone)]
pub struct BoardClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    board_id: String,
    job_column_id: String,
    deposit_status_column: String,
    excess_status_column: String,
    retry: RetryPolicy,
}

impl BoardClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` if the HTTP client cannot be built.
    pub fn new(config: &BoardConfig) -> Result<Self, UpstreamError> {
        Ok(Self {
            http: build_client(SYSTEM, config.timeout_secs)?,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            board_id: config.board_id.clone(),
            job_column_id: config.job_column_id.clone(),
            deposit_status_column: config.deposit_status_column.clone(),
            excess_status_column: config.excess_status_column.clone(),
            retry: RetryPolicy::from(config),
        })
    }

    fn column_id(&self, column: StatusColumn) -> &str {
        match column {
            StatusColumn::Deposit => &self.deposit_status_column,
            StatusColumn::Excess => &self.excess_status_column,
        }
    }

    async fn execute(&self, query: &str, variables: Value) -> Result<Value, UpstreamError> {
        let response = self
            .http
            .post(&self.api_url)
            .header("Authorization", &self.api_key)
            .header("API-Version", API_VERSION)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| send_error(SYSTEM, &e))?;
        let (_, body) = read_json(SYSTEM, response).await?;
        graphql_data(body)
    }
}

/// Unwraps `data`, mapping GraphQL-level errors onto HTTP-like statuses so
/// retry classification works the same way.
fn graphql_data(body: Value) -> Result<Value, UpstreamError> {
    let has_errors = body
        .get("errors")
        .and_then(Value::as_array)
        .is_some_and(|errors| !errors.is_empty())
        || body.get("error_message").is_some();
    if has_errors {
        let message = error_text(&body).unwrap_or_else(|| "unspecified GraphQL error".to_string());
        let lower = message.to_lowercase();
        let status = if lower.contains("complexity") || lower.contains("rate limit") {
            429
        } else {
            400
        };
        return Err(UpstreamError::http(SYSTEM, status, message));
    }
    body.get("data")
        .cloned()
        .ok_or_else(|| UpstreamError::http(SYSTEM, 200, "response has no data"))
}

fn parse_item(item: &Value, deposit_column: &str, excess_column: &str) -> Option<SyncRecord> {
    let id = item.get("id").and_then(Value::as_str)?;
    let column_text = |column: &str| {
        item.get("column_values")
            .and_then(Value::as_array)
            .and_then(|values| {
                values
                    .iter()
                    .find(|v| v.get("id").and_then(Value::as_str) == Some(column))
            })
            .and_then(|v| v.get("text").and_then(Value::as_str))
            .filter(|t| !t.is_empty())
            .map(ToString::to_string)
    };
    Some(SyncRecord {
        item_id: BoardItemId::new(id),
        name: item
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        deposit_status: column_text(deposit_column),
        excess_status: column_text(excess_column),
    })
}

fn parse_updates(data: &Value) -> Vec<BoardUpdate> {
    data.pointer("/items/0/updates")
        .and_then(Value::as_array)
        .map(|updates| {
            updates
                .iter()
                .filter_map(|u| {
                    let id = u.get("id").and_then(Value::as_str)?.to_string();
                    let body = u
                        .get("text_body")
                        .or_else(|| u.get("body"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let created_at = u
                        .get("created_at")
                        .and_then(Value::as_str)
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&Utc));
                    Some(BoardUpdate {
                        id,
                        body,
                        created_at,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

impl Board for BoardClient {
    async fn find_item(&self, job_id: &JobId) -> Result<Option<SyncRecord>, UpstreamError> {
        let variables = json!({
            "board": self.board_id,
            "column": self.job_column_id,
            "value": job_id.as_str(),
            "cols": [self.deposit_status_column, self.excess_status_column],
        });
        let data = self
            .retry
            .run("board.find_item", || self.execute(FIND_ITEM, variables.clone()))
            .await?;
        let item = data
            .pointer("/items_page_by_column_values/items/0")
            .and_then(|item| {
                parse_item(item, &self.deposit_status_column, &self.excess_status_column)
            });
        debug!(job_id = %job_id, found = item.is_some(), "board item lookup");
        Ok(item)
    }

    async fn set_status(
        &self,
        item_id: &BoardItemId,
        column: StatusColumn,
        label: &str,
    ) -> Result<(), UpstreamError> {
        let variables = json!({
            "board": self.board_id,
            "item": item_id.as_str(),
            "column": self.column_id(column),
            "label": label,
        });
        self.retry
            .run("board.set_status", || self.execute(SET_STATUS, variables.clone()))
            .await?;
        debug!(item_id = %item_id, label, "board status set");
        Ok(())
    }

    async fn post_update(&self, item_id: &BoardItemId, body: &str) -> Result<(), UpstreamError> {
        let variables = json!({ "item": item_id.as_str(), "body": body });
        self.execute(CREATE_UPDATE, variables).await?;
        Ok(())
    }

    async fn list_updates(&self, item_id: &BoardItemId) -> Result<Vec<BoardUpdate>, UpstreamError> {
        let variables = json!({ "item": item_id.as_str(), "limit": UPDATE_PAGE_SIZE });
        let data = self.execute(LIST_UPDATES, variables).await?;
        Ok(parse_updates(&data))
    }
}

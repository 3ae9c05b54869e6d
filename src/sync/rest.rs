use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;

use super::store::TaskStore;
use crate::core::task::{NewTask, Task, TaskId, TaskPatch, UserId};
use crate::error::StoreError;

/// PostgREST media type that makes the server return exactly one object,
/// or 406 when the filter matched no rows.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Base URL and credentials of the hosted backend, shared by the task store
/// and the attachment storage client.
#[derive(Clone)]
pub struct Endpoint {
    base_url: String,
    api_key: String,
    access_token: Option<String>,
    http: Client,
}

impl Endpoint {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            access_token: None,
            http,
        })
    }

    /// Use a signed-in user's JWT instead of the anonymous key for
    /// authorization. The key is still sent as `apikey`.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .header(AUTHORIZATION, format!("Bearer {}", bearer))
    }
}

#[derive(Serialize)]
struct NewTaskRow<'a> {
    #[serde(flatten)]
    task: &'a NewTask,
    user_id: &'a UserId,
}

#[derive(Serialize)]
struct PatchRow<'a> {
    #[serde(flatten)]
    patch: &'a TaskPatch,
    updated_at: DateTime<Utc>,
}

/// Task store backed by a PostgREST table.
#[derive(Clone)]
pub struct RestTaskStore {
    endpoint: Endpoint,
    table: String,
}

impl RestTaskStore {
    pub fn new(endpoint: Endpoint, table: impl Into<String>) -> Self {
        Self {
            endpoint,
            table: table.into(),
        }
    }

    fn table_path(&self) -> String {
        format!("rest/v1/{}", self.table)
    }

    pub(crate) fn list_request(&self, user: &UserId) -> RequestBuilder {
        self.endpoint
            .request(Method::GET, &self.table_path())
            .query(&[
                ("select", "*".to_string()),
                ("user_id", eq(user.as_str())),
                ("order", "due_date.asc".to_string()),
            ])
    }

    pub(crate) fn create_request(&self, user: &UserId, task: &NewTask) -> RequestBuilder {
        self.endpoint
            .request(Method::POST, &self.table_path())
            .header("Prefer", "return=representation")
            .header(ACCEPT, SINGLE_OBJECT)
            .json(&NewTaskRow {
                task,
                user_id: user,
            })
    }

    pub(crate) fn update_request(
        &self,
        user: &UserId,
        id: TaskId,
        patch: &TaskPatch,
        expected_updated_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> RequestBuilder {
        let mut filters = vec![("id", eq(id)), ("user_id", eq(user.as_str()))];
        if let Some(ts) = expected_updated_at {
            filters.push((
                "updated_at",
                eq(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            ));
        }
        self.endpoint
            .request(Method::PATCH, &self.table_path())
            .query(&filters)
            .header("Prefer", "return=representation")
            .header(ACCEPT, SINGLE_OBJECT)
            .json(&PatchRow {
                patch,
                updated_at: now,
            })
    }

    pub(crate) fn delete_request(&self, user: &UserId, id: TaskId) -> RequestBuilder {
        self.endpoint
            .request(Method::DELETE, &self.table_path())
            .query(&[("id", eq(id)), ("user_id", eq(user.as_str()))])
            .header("Prefer", "return=representation")
            .header(ACCEPT, SINGLE_OBJECT)
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{}", value)
}

/// Turn a non-success response into a [`StoreError`]. `missing` is the
/// error to report when a single-object request matched no rows.
async fn error_for(resp: Response, missing: StoreError) -> StoreError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    if status == StatusCode::NOT_ACCEPTABLE || status == StatusCode::NOT_FOUND {
        return missing;
    }
    StoreError::from_status(status.as_u16(), text)
}

async fn read_task(resp: Response) -> Result<Task, StoreError> {
    let text = resp.text().await?;
    serde_json::from_str(&text).map_err(|e| StoreError::Decode(format!("{}: {}", e, text)))
}

#[async_trait]
impl TaskStore for RestTaskStore {
    async fn list(&self, user: &UserId) -> Result<Vec<Task>, StoreError> {
        let resp = self.list_request(user).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(StoreError::from_status(status.as_u16(), text));
        }
        let text = resp.text().await?;
        let tasks: Vec<Task> = serde_json::from_str(&text)
            .map_err(|e| StoreError::Decode(format!("task listing: {}", e)))?;
        log::debug!("Listed {} tasks for {}", tasks.len(), user);
        Ok(tasks)
    }

    async fn create(&self, user: &UserId, task: &NewTask) -> Result<Task, StoreError> {
        let resp = self.create_request(user, task).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(StoreError::from_status(status.as_u16(), text));
        }
        read_task(resp).await
    }

    async fn update(
        &self,
        user: &UserId,
        id: TaskId,
        patch: &TaskPatch,
        expected_updated_at: Option<DateTime<Utc>>,
    ) -> Result<Task, StoreError> {
        let resp = self
            .update_request(user, id, patch, expected_updated_at, Utc::now())
            .send()
            .await?;
        if !resp.status().is_success() {
            // With the guard in place a miss can be a stale timestamp or a
            // missing row; report the former.
            let missing = if expected_updated_at.is_some() {
                StoreError::Conflict(id)
            } else {
                StoreError::NotFound(id)
            };
            return Err(error_for(resp, missing).await);
        }
        read_task(resp).await
    }

    async fn delete(&self, user: &UserId, id: TaskId) -> Result<(), StoreError> {
        let resp = self.delete_request(user, id).send().await?;
        if !resp.status().is_success() {
            return Err(error_for(resp, StoreError::NotFound(id)).await);
        }
        Ok(())
    }
}

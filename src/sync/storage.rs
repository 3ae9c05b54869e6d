use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder};
use uuid::Uuid;

use super::rest::Endpoint;
use super::store::{Attachment, AttachmentStore, sanitize_file_name};
use crate::core::task::{TaskId, UserId};
use crate::error::StoreError;

/// Uploads task attachments to a public object storage bucket.
#[derive(Clone)]
pub struct StorageClient {
    endpoint: Endpoint,
    bucket: String,
}

impl StorageClient {
    pub fn new(endpoint: Endpoint, bucket: impl Into<String>) -> Self {
        Self {
            endpoint,
            bucket: bucket.into(),
        }
    }

    /// Object key: `<user>/<task>/<uuid>-<name>`. The uuid keeps repeated
    /// uploads of the same file name from overwriting each other.
    pub(crate) fn object_path(&self, user: &UserId, task: TaskId, file_name: &str) -> String {
        format!(
            "{}/{}/{}-{}",
            sanitize_file_name(user.as_str()),
            task,
            Uuid::new_v4(),
            sanitize_file_name(file_name)
        )
    }

    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.endpoint.base_url(),
            self.bucket,
            path
        )
    }

    pub(crate) fn upload_request(&self, path: &str, bytes: Vec<u8>) -> RequestBuilder {
        self.endpoint
            .request(
                Method::POST,
                &format!("storage/v1/object/{}/{}", self.bucket, path),
            )
            .header(CONTENT_TYPE, "application/octet-stream")
            .header("x-upsert", "true")
            .body(bytes)
    }
}

#[async_trait]
impl AttachmentStore for StorageClient {
    async fn upload(
        &self,
        user: &UserId,
        task: TaskId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Attachment, StoreError> {
        let path = self.object_path(user, task, file_name);
        let size = bytes.len();
        let resp = self.upload_request(&path, bytes).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(StoreError::from_status(status.as_u16(), text));
        }
        log::info!("Uploaded {} ({} bytes) for task {}", path, size, task);
        Ok(Attachment {
            file_name: file_name.to_string(),
            file_url: self.public_url(&path),
        })
    }
}

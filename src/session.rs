use chrono::{DateTime, Utc};

use crate::config::FocusConfig;
use crate::core::task::UserId;
use crate::error::SessionError;
use crate::sync::TaskSync;
use crate::sync::memory::{MemoryAttachmentStore, MemoryTaskStore};
use crate::sync::rest::{Endpoint, RestTaskStore};
use crate::sync::storage::StorageClient;
use crate::sync::store::{AttachmentStore, TaskStore};

/// Everything scoped to one signed-in user. Created at sign-in, consumed at
/// sign-out; the task cache goes with it.
pub struct Session<S, A> {
    sync: TaskSync<S, A>,
    started: DateTime<Utc>,
}

pub type RemoteSession = Session<RestTaskStore, StorageClient>;
pub type DemoSession = Session<MemoryTaskStore, MemoryAttachmentStore>;

impl<S: TaskStore, A: AttachmentStore> Session<S, A> {
    /// Start a session and load the user's tasks.
    pub async fn start(sync: TaskSync<S, A>) -> Result<Self, SessionError> {
        sync.refresh_tasks().await?;
        log::info!("Session started for {}", sync.user());
        Ok(Self {
            sync,
            started: Utc::now(),
        })
    }

    pub fn user(&self) -> &UserId {
        self.sync.user()
    }

    pub fn tasks(&self) -> &TaskSync<S, A> {
        &self.sync
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    pub async fn sign_out(self) {
        log::info!(
            "Session for {} ended, dropping {} cached tasks",
            self.sync.user(),
            self.sync.len().await
        );
    }
}

impl RemoteSession {
    /// Sign in against the hosted backend named in `config`.
    pub async fn sign_in(
        config: &FocusConfig,
        user: UserId,
        access_token: Option<String>,
    ) -> Result<Self, SessionError> {
        config.require_store()?;
        let mut endpoint =
            Endpoint::new(&config.store_url, &config.api_key, config.request_timeout())?;
        if let Some(token) = access_token {
            endpoint = endpoint.with_access_token(token);
        }
        let store = RestTaskStore::new(endpoint.clone(), config.tasks_table.clone());
        let storage = StorageClient::new(endpoint, config.attachments_bucket.clone());
        let sync = TaskSync::new(user, store, storage).reject_stale_writes(config.reject_stale_writes);
        Self::start(sync).await
    }
}

impl DemoSession {
    /// Offline session over the in-memory store, seeded with starter tasks.
    pub async fn demo(user: UserId) -> Result<Self, SessionError> {
        let store = MemoryTaskStore::new().with_sample_tasks(&user).await;
        Self::start(TaskSync::new(user, store, MemoryAttachmentStore::new())).await
    }
}

//! Queue lock gateway backed by the queueing engine's HTTP API.
//!
//! - acquire: `PUT {base}/locks/{queue}` with `{"owner": ..}`
//! - release: `DELETE {base}/locks/{queue}`; a 404 means already released

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use url::Url;

use crate::config::schema::QueueLockConfig;
use crate::queue_lock::{QueueLockError, QueueLockGateway, QueueLockResult};

#[derive(Serialize)]
struct LockBody<'a> {
    owner: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpQueueLockGateway {
    client: reqwest::Client,
    base: Url,
}

impl HttpQueueLockGateway {
    pub fn new(base: Url, timeout: Duration) -> QueueLockResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    pub fn from_config(config: &QueueLockConfig) -> QueueLockResult<Self> {
        let base = Url::parse(&config.base_url)?;
        Self::new(base, Duration::from_millis(config.timeout_ms))
    }

    /// URL of the lock resource of `queue`.
    pub fn lock_url(&self, queue: &str) -> QueueLockResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| QueueLockError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push("locks")
            .push(queue);
        Ok(url)
    }
}

#[async_trait]
impl QueueLockGateway for HttpQueueLockGateway {
    async fn acquire_lock(&self, queue: &str, owner: &str) -> QueueLockResult<()> {
        let response = self
            .client
            .put(self.lock_url(queue)?)
            .json(&LockBody { owner })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueueLockError::Rejected {
                queue: queue.to_string(),
                status: status.as_u16(),
            });
        }
        tracing::debug!(queue = %queue, owner = %owner, "Queue lock acquired");
        Ok(())
    }

    async fn release_lock(&self, queue: &str) -> QueueLockResult<()> {
        let response = self.client.delete(self.lock_url(queue)?).send().await?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(QueueLockError::Rejected {
                queue: queue.to_string(),
                status: status.as_u16(),
            });
        }
        tracing::debug!(queue = %queue, "Queue lock released");
        Ok(())
    }
}

//! An HTTP/JSON client for the discovery service (§4.3): worker
//! registration, task-roster lookup, and per-task key fetch/invalidation.
//!
//! Grounded on `examples/original_source/ec262/discovery.py`'s
//! `register_worker`/`get_tasks`/`_crypt_data`/`invalidate_data`, built with
//! the `reqwest` + `anyhow::Context` idiom of
//! `lgn-provers/src/params/mod.rs::download_file`.

use std::collections::HashMap;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::crypto;
use crate::crypto::KEY_LEN;
use crate::error::DiscoveryError;

const DEFAULT_TTL_SECS: u64 = 60;
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerRegistration {
    pub worker_id: String,
    pub port: u16,
    pub ttl: u64,
}

/// `task_id -> [worker_addr, ...]`, as handed back by `POST /tasks` (§4.3).
pub type TaskRoster = HashMap<String, Vec<String>>;

#[derive(Debug, Deserialize)]
struct InsufficientCreditsBody {
    available_credits: u64,
    needed_credits: u64,
}

#[derive(Debug, Deserialize)]
struct KeyBody {
    key: String,
}

/// Whether fetching a task's key settles it (§4.6): the worker's `encrypt`
/// path must not consume the task, since the foreman still needs to fetch
/// the winning replica's key once the vote is tallied.
enum KeyFetch {
    NonConsuming,
    Consuming,
}

#[derive(Debug, Deserialize)]
struct CreditsBody {
    credits: u64,
}

pub struct DiscoveryClient {
    base_url: String,
    http: reqwest::Client,
}

impl DiscoveryClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    /// Registers (or re-registers) this worker, returning the lease the
    /// service granted it.
    pub async fn register_worker(&self, port: u16) -> Result<WorkerRegistration, DiscoveryError> {
        #[derive(Serialize)]
        struct Body {
            port: u16,
            ttl: u64,
        }
        let response = self
            .http
            .post(format!("{}/workers", self.base_url))
            .json(&Body {
                port,
                ttl: DEFAULT_TTL_SECS,
            })
            .send()
            .await?;
        debug!(status = %response.status(), "register_worker");
        Self::decode(response).await
    }

    /// Asks for a roster of replica assignments for `num_tasks` tasks.
    pub async fn get_tasks(&self, num_tasks: u32) -> Result<TaskRoster, DiscoveryError> {
        #[derive(Serialize)]
        struct Body {
            n: u32,
        }
        let response = self
            .http
            .post(format!("{}/tasks", self.base_url))
            .json(&Body { n: num_tasks })
            .send()
            .await?;
        if response.status().as_u16() == 406 {
            let body: InsufficientCreditsBody = response.json().await?;
            return Err(DiscoveryError::InsufficientCredits {
                available: body.available_credits,
                needed: body.needed_credits,
            });
        }
        Self::decode(response).await
    }

    /// Fetches the per-task key over a non-consuming `GET` and encrypts
    /// `plaintext` under it. Used by the worker: the key must remain valid
    /// for the foreman to fetch again once it tallies the vote.
    pub async fn encrypt_for_task(
        &self,
        task_id: &str,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, DiscoveryError> {
        let key = self.fetch_key(task_id, KeyFetch::NonConsuming).await?;
        Ok(crypto::encrypt(&key, plaintext))
    }

    /// Fetches the per-task key over a consuming `DELETE /tasks/<id>?valid=1`
    /// and decrypts `ciphertext` with it. Only call this once a vote
    /// majority has been reached (§4.6) — the discovery service settles the
    /// task's credits on this call.
    pub async fn decrypt_for_task(
        &self,
        task_id: &str,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, DiscoveryError> {
        let key = self.fetch_key(task_id, KeyFetch::Consuming).await?;
        Ok(crypto::decrypt(&key, ciphertext)?)
    }

    /// Invalidates the task's data, refunding its credits, and returns the
    /// caller's new credit balance (§4.6, no-majority path).
    pub async fn invalidate_data(&self, task_id: &str) -> Result<u64, DiscoveryError> {
        let response = self
            .http
            .delete(format!("{}/tasks/{task_id}", self.base_url))
            .json(&serde_json::json!({ "valid": 0 }))
            .send()
            .await?;
        let body: CreditsBody = Self::decode(response).await?;
        Ok(body.credits)
    }

    /// `GET` fetches the key without settling the task; `DELETE ?valid=1`
    /// fetches it and marks the task accepted, per `discovery.py`'s
    /// `method = 'get' if encrypt else 'delete'` (§4.6).
    async fn fetch_key(
        &self,
        task_id: &str,
        mode: KeyFetch,
    ) -> Result<[u8; KEY_LEN], DiscoveryError> {
        let response = match mode {
            KeyFetch::NonConsuming => {
                self.http
                    .get(format!("{}/tasks/{task_id}", self.base_url))
                    .send()
                    .await?
            },
            KeyFetch::Consuming => {
                self.http
                    .delete(format!("{}/tasks/{task_id}", self.base_url))
                    .json(&serde_json::json!({ "valid": 1 }))
                    .send()
                    .await?
            },
        };
        if response.status().as_u16() == 404 {
            return Err(DiscoveryError::UnknownTask {
                task_id: task_id.to_owned(),
            });
        }
        let body: KeyBody = Self::decode(response).await?;
        let decoded = BASE64
            .decode(body.key)
            .map_err(|_| DiscoveryError::MalformedKey { expected: KEY_LEN })?;
        decoded
            .try_into()
            .map_err(|_| DiscoveryError::MalformedKey { expected: KEY_LEN })
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, DiscoveryError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DiscoveryError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

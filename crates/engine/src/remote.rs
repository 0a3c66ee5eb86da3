//! REST adapter for the external transfer engine.
//!
//! Wraps the engine's HTTP API (submission, status, exceptions) using
//! [`reqwest`]. The engine exposes accumulator-style counters per task;
//! the names consumed here are `numRead`, `numWrite`, and `nErrors`.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::EngineError;

/// Accumulator counter: total records read.
pub const COUNTER_READ: &str = "numRead";

/// Accumulator counter: total records written (before error deduction).
pub const COUNTER_WRITE: &str = "numWrite";

/// Accumulator counter: records that failed to write.
pub const COUNTER_ERRORS: &str = "nErrors";

/// State of a submitted task, parsed case-insensitively.
///
/// Anything the adapter does not recognize is treated as still running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Finished,
    Failed,
    Canceled,
    Running(String),
}

impl TaskState {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "finished" => TaskState::Finished,
            "failed" => TaskState::Failed,
            "canceled" => TaskState::Canceled,
            _ => TaskState::Running(raw.to_string()),
        }
    }
}

/// One named accumulator exposed by the engine for a task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskCounter {
    pub name: String,
    pub value: i64,
}

/// Task state plus its current counters.
#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub state: TaskState,
    pub counters: Vec<TaskCounter>,
}

impl TaskStatus {
    /// Value of a named counter, zero when absent.
    pub fn counter(&self, name: &str) -> i64 {
        self.counters
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value)
            .unwrap_or(0)
    }
}

/// The contract the lifecycle requires from the external engine.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Submit a transfer. Returns the engine-assigned task id.
    async fn submit(
        &self,
        job_id: &str,
        reader_spec: &serde_json::Value,
        writer_spec: &serde_json::Value,
        options: &serde_json::Value,
    ) -> Result<String, EngineError>;

    /// Current state and counters for a task.
    async fn status(&self, task_id: &str) -> Result<TaskStatus, EngineError>;

    /// Error messages reported for a failed task, newest first.
    async fn exceptions(&self, task_id: &str) -> Result<Vec<String>, EngineError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Errors from the transfer engine REST layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The engine returned a non-2xx status code.
    #[error("transfer engine API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    state: String,
    #[serde(default)]
    counters: Vec<TaskCounter>,
}

#[derive(Debug, Deserialize)]
struct ExceptionsResponse {
    #[serde(default, rename = "all-exceptions")]
    all_exceptions: Vec<TaskException>,
}

#[derive(Debug, Deserialize)]
struct TaskException {
    exception: String,
}

/// HTTP client for the external transfer engine.
pub struct HttpExecutionEngine {
    client: reqwest::Client,
    base_url: String,
}

impl HttpExecutionEngine {
    /// Create a client for an engine instance.
    ///
    /// * `base_url` - Base HTTP URL, e.g. `http://host:8081`.
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`EngineApiError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, EngineApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(EngineApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, EngineApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn submit_inner(
        &self,
        job_id: &str,
        reader_spec: &serde_json::Value,
        writer_spec: &serde_json::Value,
        options: &serde_json::Value,
    ) -> Result<String, EngineApiError> {
        let body = serde_json::json!({
            "job_id": job_id,
            "reader": reader_spec,
            "writer": writer_spec,
            "options": options,
        });

        let response = self
            .client
            .post(format!("{}/v1/transfers", self.base_url))
            .json(&body)
            .send()
            .await?;

        let parsed: SubmitResponse = Self::parse_response(response).await?;
        Ok(parsed.task_id)
    }

    async fn status_inner(&self, task_id: &str) -> Result<TaskStatus, EngineApiError> {
        let response = self
            .client
            .get(format!("{}/v1/transfers/{}/status", self.base_url, task_id))
            .send()
            .await?;

        let parsed: StatusResponse = Self::parse_response(response).await?;
        Ok(TaskStatus {
            state: TaskState::parse(&parsed.state),
            counters: parsed.counters,
        })
    }

    async fn exceptions_inner(&self, task_id: &str) -> Result<Vec<String>, EngineApiError> {
        let response = self
            .client
            .get(format!(
                "{}/v1/transfers/{}/exceptions",
                self.base_url, task_id
            ))
            .send()
            .await?;

        let parsed: ExceptionsResponse = Self::parse_response(response).await?;
        Ok(parsed
            .all_exceptions
            .into_iter()
            .map(|e| e.exception)
            .collect())
    }
}

#[async_trait]
impl ExecutionEngine for HttpExecutionEngine {
    async fn submit(
        &self,
        job_id: &str,
        reader_spec: &serde_json::Value,
        writer_spec: &serde_json::Value,
        options: &serde_json::Value,
    ) -> Result<String, EngineError> {
        self.submit_inner(job_id, reader_spec, writer_spec, options)
            .await
            .map_err(|e| EngineError::Submission(e.to_string()))
    }

    async fn status(&self, task_id: &str) -> Result<TaskStatus, EngineError> {
        self.status_inner(task_id)
            .await
            .map_err(|e| EngineError::Poll(e.to_string()))
    }

    async fn exceptions(&self, task_id: &str) -> Result<Vec<String>, EngineError> {
        self.exceptions_inner(task_id)
            .await
            .map_err(|e| EngineError::Poll(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

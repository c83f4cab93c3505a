//! RPC session over a shim's private socket
//!
//! Length-prefixed JSON frames, one request in flight at a time; interleaved
//! callers queue on the session lock. `close` is idempotent, shuts the
//! underlying connection, and runs the registered close hook exactly once.
//! The wire layout is private to this module; the rest of the crate sees
//! only the typed stub.

use crate::task::Mount;
use chrono::{DateTime, Utc};
use keel_foundation::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::Mutex;

/// Upper bound on a single frame body
const MAX_FRAME_LEN: u32 = 4 * 1024 * 1024;

#[derive(Serialize)]
struct RequestFrame<'a, T> {
    method: &'a str,
    payload: &'a T,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct ResponseFrame<T> {
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

type CloseHook = Box<dyn FnOnce() + Send>;

/// One RPC session bound to one shim
pub struct ShimClient {
    /// Connection; taken on close, all later calls fail
    stream: Mutex<Option<UnixStream>>,

    /// Runs exactly once, when the session closes
    on_close: std::sync::Mutex<Option<CloseHook>>,
}

impl ShimClient {
    /// Wrap a connected stream in a session
    pub fn new(stream: UnixStream) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
            on_close: std::sync::Mutex::new(None),
        }
    }

    /// Register a hook to run when the session closes
    pub fn on_close(&self, hook: impl FnOnce() + Send + 'static) {
        if let Ok(mut slot) = self.on_close.lock() {
            *slot = Some(Box::new(hook));
        }
    }

    /// One request, one response
    ///
    /// Transport failures and remote-reported failures are surfaced
    /// verbatim; nothing is retried at this layer.
    pub async fn unary<Req, Resp>(&self, method: &str, payload: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| Error::transport(format!("session closed before {} call", method)))?;

        let body = serde_json::to_vec(&RequestFrame { method, payload })?;
        stream
            .write_u32(body.len() as u32)
            .await
            .map_err(|e| Error::transport(format!("{}: write failed: {}", method, e)))?;
        stream
            .write_all(&body)
            .await
            .map_err(|e| Error::transport(format!("{}: write failed: {}", method, e)))?;

        let len = stream
            .read_u32()
            .await
            .map_err(|e| Error::transport(format!("{}: read failed: {}", method, e)))?;
        if len > MAX_FRAME_LEN {
            return Err(Error::transport(format!(
                "{}: response frame of {} bytes exceeds limit",
                method, len
            )));
        }
        let mut buf = vec![0u8; len as usize];
        stream
            .read_exact(&mut buf)
            .await
            .map_err(|e| Error::transport(format!("{}: read failed: {}", method, e)))?;

        let response: ResponseFrame<Resp> = serde_json::from_slice(&buf)?;
        if let Some(message) = response.error {
            return Err(Error::remote(method, message));
        }
        response
            .result
            .ok_or_else(|| Error::transport(format!("{}: response carried no result", method)))
    }

    /// Close the session and the underlying connection; idempotent
    pub async fn close(&self) {
        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.shutdown().await;
            let hook = self.on_close.lock().ok().and_then(|mut slot| slot.take());
            if let Some(hook) = hook {
                hook();
            }
        }
    }

    /// Whether the session has been closed
    pub async fn is_closed(&self) -> bool {
        self.stream.lock().await.is_none()
    }
}

// ============================================================================
// Typed stub
// ============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct CreateTaskRequest {
    pub id: String,
    pub bundle: String,
    pub stdin: String,
    pub stdout: String,
    pub stderr: String,
    pub terminal: bool,
    pub checkpoint: Option<String>,
    pub rootfs: Vec<Mount>,
    pub options: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateTaskResponse {
    pub pid: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteTaskRequest {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteTaskResponse {
    pub exit_status: u32,
    pub exited_at: DateTime<Utc>,
}

/// Typed task operations over a session
pub(crate) struct TaskClient {
    client: Arc<ShimClient>,
}

impl TaskClient {
    pub fn new(client: Arc<ShimClient>) -> Self {
        Self { client }
    }

    pub async fn create(&self, request: CreateTaskRequest) -> Result<CreateTaskResponse> {
        self.client.unary("create", &request).await
    }

    pub async fn delete(&self, request: DeleteTaskRequest) -> Result<DeleteTaskResponse> {
        self.client.unary("delete", &request).await
    }
}

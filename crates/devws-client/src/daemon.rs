//! Local provider daemon over a unix socket.
//!
//! The daemon speaks HTTP/1.1 on a unix domain socket. Every connection
//! starts with a single identification byte before the HTTP traffic so
//! the daemon can multiplex other protocols on the same socket.

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::HOST;
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::time::timeout;

use devws_core::{
    SessionResult, StatusOptions, UpOptions, WorkspaceConfig, WorkspaceStatus, WorkspaceStore,
};

use crate::error::ClientError;
use crate::lock::LockState;

/// First byte on every connection, identifying us as an HTTP client.
pub const CLIENT_PREFIX_BYTE: u8 = 0x01;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ROUTE_STATUS: &str = "/status";
const ROUTE_GET_WORKSPACE: &str = "/workspace/get";
const ROUTE_LIST_WORKSPACES: &str = "/workspace/list";
const ROUTE_CREATE_WORKSPACE: &str = "/workspace/create";
const ROUTE_UPDATE_WORKSPACE: &str = "/workspace/update";
const ROUTE_UP: &str = "/workspace/up";
const ROUTE_SHUTDOWN: &str = "/shutdown";

/// Daemon self-reported state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A workspace as tracked by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceInstance {
    pub uid: String,
    #[serde(default)]
    pub name: String,
    /// Lifecycle phase, e.g. "running" or "stopped". Absent while the
    /// daemon is still reconciling the workspace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// HTTP client for one provider's daemon socket.
#[derive(Debug, Clone)]
pub struct LocalDaemonClient {
    socket_path: PathBuf,
    provider: String,
}

impl LocalDaemonClient {
    #[must_use]
    pub fn new(socket_path: impl Into<PathBuf>, provider: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
            provider: provider.into(),
        }
    }

    /// Query the daemon's own status.
    ///
    /// # Errors
    /// Returns `DaemonUnavailable` when the socket cannot be reached.
    pub async fn status(&self, debug: bool) -> Result<DaemonStatus, ClientError> {
        let path = if debug {
            format!("{ROUTE_STATUS}?debug=true")
        } else {
            ROUTE_STATUS.to_string()
        };
        let body = self.request(Method::GET, &path, None).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Fetch a single workspace. `None` when the daemon does not know it.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success response.
    pub async fn get_workspace(
        &self,
        uid: &str,
    ) -> Result<Option<WorkspaceInstance>, ClientError> {
        let path = format!("{ROUTE_GET_WORKSPACE}?uid={uid}");
        let body = self.request(Method::GET, &path, None).await?;
        if body.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&body)?))
    }

    /// List workspaces, optionally filtered by owner.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success response.
    pub async fn list_workspaces(
        &self,
        owner: Option<&str>,
    ) -> Result<Vec<WorkspaceInstance>, ClientError> {
        let path = match owner {
            Some(owner) => format!("{ROUTE_LIST_WORKSPACES}?owner={owner}"),
            None => ROUTE_LIST_WORKSPACES.to_string(),
        };
        let body = self.request(Method::GET, &path, None).await?;
        if body.is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Register a workspace with the daemon.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success response.
    pub async fn create_workspace(
        &self,
        instance: &WorkspaceInstance,
    ) -> Result<WorkspaceInstance, ClientError> {
        let body = self
            .request_json(Method::POST, ROUTE_CREATE_WORKSPACE, instance)
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Update a workspace the daemon already tracks.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success response.
    pub async fn update_workspace(
        &self,
        instance: &WorkspaceInstance,
    ) -> Result<WorkspaceInstance, ClientError> {
        let body = self
            .request_json(Method::POST, ROUTE_UPDATE_WORKSPACE, instance)
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Run a full up session inside the daemon and return its result.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success response.
    pub async fn up(&self, options: &UpOptions) -> Result<SessionResult, ClientError> {
        let body = self.request_json(Method::POST, ROUTE_UP, options).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Ask the daemon to shut down.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success response.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.request(Method::GET, ROUTE_SHUTDOWN, None).await?;
        Ok(())
    }

    async fn request_json<T: Serialize>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
    ) -> Result<Bytes, ClientError> {
        let body = serde_json::to_vec(payload)?;
        self.request(method, path, Some(body)).await
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, ClientError> {
        timeout(REQUEST_TIMEOUT, self.request_inner(method, path, body))
            .await
            .map_err(|_| ClientError::DaemonUnavailable {
                provider: self.provider.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no response within {}s", REQUEST_TIMEOUT.as_secs()),
                ),
            })?
    }

    async fn request_inner(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, ClientError> {
        let stream = self.connect().await?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await?;
        tokio::spawn(async move {
            if let Err(err) = conn.await {
                tracing::debug!("daemon connection closed: {err}");
            }
        });

        let request = Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, "daemon")
            .body(Full::new(Bytes::from(body.unwrap_or_default())))?;

        let response = sender.send_request(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();

        if status.is_success() {
            Ok(bytes)
        } else {
            Err(ClientError::DaemonRequest {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).trim().to_string(),
            })
        }
    }

    async fn connect(&self) -> Result<UnixStream, ClientError> {
        let unavailable = |source| ClientError::DaemonUnavailable {
            provider: self.provider.clone(),
            source,
        };
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(unavailable)?;
        stream
            .write_all(&[CLIENT_PREFIX_BYTE])
            .await
            .map_err(unavailable)?;
        Ok(stream)
    }
}

/// Workspace backend that delegates sessions to the provider's daemon.
pub struct DaemonClient {
    workspace: WorkspaceConfig,
    store: WorkspaceStore,
    daemon: LocalDaemonClient,
    lock: LockState,
}

impl DaemonClient {
    #[must_use]
    pub fn new(
        workspace: WorkspaceConfig,
        store: WorkspaceStore,
        daemon: LocalDaemonClient,
        lock: LockState,
    ) -> Self {
        Self {
            workspace,
            store,
            daemon,
            lock,
        }
    }

    #[must_use]
    pub fn workspace(&self) -> &WorkspaceConfig {
        &self.workspace
    }

    #[must_use]
    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    #[must_use]
    pub fn lock(&self) -> &LockState {
        &self.lock
    }

    #[must_use]
    pub fn daemon(&self) -> &LocalDaemonClient {
        &self.daemon
    }

    /// Run an up session through the daemon.
    ///
    /// # Errors
    /// Returns an error when the daemon is unreachable or rejects the
    /// session.
    pub async fn up(&self, options: &UpOptions) -> Result<SessionResult, ClientError> {
        let mut options = options.clone();
        if options.id.is_empty() {
            options.id.clone_from(&self.workspace.id);
        }
        self.daemon.up(&options).await
    }

    /// Current workspace status as seen by the daemon.
    ///
    /// # Errors
    /// Returns an error when the daemon is unreachable or reports a phase
    /// no backend is expected to produce.
    pub async fn status(&self, _options: &StatusOptions) -> Result<WorkspaceStatus, ClientError> {
        let Some(instance) = self.daemon.get_workspace(&self.workspace.uid).await? else {
            return Ok(WorkspaceStatus::NotFound);
        };
        match instance.phase {
            // phase not yet reported, the daemon is still reconciling
            None => Ok(WorkspaceStatus::Busy),
            Some(phase) => Ok(phase.parse()?),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;

    use super::*;

    /// Serve one canned HTTP response, asserting the prefix byte.
    async fn serve_once(listener: UnixListener, status: &str, body: &str) {
        let (mut stream, _) = listener.accept().await.unwrap();

        let mut prefix = [0u8; 1];
        stream.read_exact(&mut prefix).await.unwrap();
        assert_eq!(prefix[0], CLIENT_PREFIX_BYTE);

        // drain the request head plus any content-length body
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            if let Some(head_end) = find_head_end(&buf) {
                let head = String::from_utf8_lossy(&buf[..head_end]);
                let expected = content_length(&head);
                if buf.len() >= head_end + 4 + expected {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }

        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
    }

    fn find_head_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }

    fn content_length(head: &str) -> usize {
        head.lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse().ok())?
            })
            .unwrap_or(0)
    }

    fn client(dir: &tempfile::TempDir) -> (LocalDaemonClient, UnixListener) {
        let socket = dir.path().join("daemon.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        (LocalDaemonClient::new(socket, "test-provider"), listener)
    }

    #[tokio::test]
    async fn status_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (client, listener) = client(&dir);

        let server = tokio::spawn(async move {
            serve_once(listener, "200 OK", r#"{"state":"running"}"#).await;
        });

        let status = client.status(false).await.unwrap();
        assert_eq!(status.state, "running");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_workspace_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let (client, listener) = client(&dir);

        let server = tokio::spawn(async move {
            serve_once(listener, "200 OK", "").await;
        });

        assert!(client.get_workspace("w-123").await.unwrap().is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn empty_list_body_is_empty_vec() {
        let dir = tempfile::tempdir().unwrap();
        let (client, listener) = client(&dir);

        let server = tokio::spawn(async move {
            serve_once(listener, "200 OK", "").await;
        });

        assert!(client.list_workspaces(None).await.unwrap().is_empty());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn up_posts_options_and_parses_result() {
        let dir = tempfile::tempdir().unwrap();
        let (client, listener) = client(&dir);

        let server = tokio::spawn(async move {
            serve_once(
                listener,
                "200 OK",
                r#"{"substitution_context":{"container_workspace_folder":"/workspace"}}"#,
            )
            .await;
        });

        let options = UpOptions {
            id: "w1".to_string(),
            ..UpOptions::default()
        };
        let result = client.up(&options).await.unwrap();
        assert_eq!(
            result.substitution_context.container_workspace_folder,
            "/workspace"
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn error_response_carries_status_and_message() {
        let dir = tempfile::tempdir().unwrap();
        let (client, listener) = client(&dir);

        let server = tokio::spawn(async move {
            serve_once(listener, "500 Internal Server Error", "boom").await;
        });

        let err = client.status(false).await.unwrap_err();
        match err {
            ClientError::DaemonRequest { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_socket_names_the_provider() {
        let dir = tempfile::tempdir().unwrap();
        let client = LocalDaemonClient::new(dir.path().join("missing.sock"), "test-provider");

        let err = client.status(false).await.unwrap_err();
        match err {
            ClientError::DaemonUnavailable { provider, .. } => {
                assert_eq!(provider, "test-provider");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

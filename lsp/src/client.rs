//! Language client — one process transport plus the LSP handshake.
//!
//! Holding a [`LanguageClient`] is proof of a completed handshake:
//! construction spawns the server, performs `initialize`/`initialized`, and
//! stores the negotiated capabilities. There is no two-phase init.

use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::protocol;
use crate::transport::Transport;
use crate::types::{LspError, ServerDescriptor};

/// Default deadline for ordinary requests when the caller supplies none.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Servers can be slow to come up (cold caches, project scans).
const INIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct LanguageClient {
    descriptor: ServerDescriptor,
    transport: Transport,
    capabilities: Value,
}

impl LanguageClient {
    /// Spawn the descriptor's server and complete the LSP handshake.
    pub async fn start(
        descriptor: ServerDescriptor,
        workspace_root: &Path,
    ) -> Result<Self, LspError> {
        let root_uri = protocol::path_to_file_uri(workspace_root)?;
        let transport = Transport::spawn(
            &descriptor.language,
            &descriptor.command,
            &descriptor.args,
            workspace_root,
        )
        .await?;
        Self::handshake(transport, descriptor, &root_uri).await
    }

    /// `initialize` with the fixed broad capability set, then `initialized`.
    pub(crate) async fn handshake(
        transport: Transport,
        descriptor: ServerDescriptor,
        root_uri: &str,
    ) -> Result<Self, LspError> {
        let params = protocol::initialize_params(root_uri, &descriptor.init_options);
        let init_result = match transport
            .send_request("initialize", Some(params), INIT_TIMEOUT)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                transport.shutdown().await;
                return Err(e);
            }
        };

        let capabilities = init_result
            .get("capabilities")
            .cloned()
            .unwrap_or(Value::Null);

        if let Some(info) = init_result.get("serverInfo") {
            tracing::info!(
                server = %descriptor.language,
                name = info.get("name").and_then(|v| v.as_str()).unwrap_or("unknown"),
                version = info.get("version").and_then(|v| v.as_str()).unwrap_or(""),
                "language server initialized"
            );
        }

        if let Err(e) = transport
            .send_notification("initialized", Some(serde_json::json!({})))
            .await
        {
            transport.shutdown().await;
            return Err(e);
        }

        Ok(Self {
            descriptor,
            transport,
            capabilities,
        })
    }

    #[must_use]
    pub fn language(&self) -> &str {
        &self.descriptor.language
    }

    #[must_use]
    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    /// Capabilities the server returned at initialize time.
    #[must_use]
    pub fn capabilities(&self) -> &Value {
        &self.capabilities
    }

    /// True while the handshake's process is still alive. The multiplexer
    /// uses this as the reuse-or-recreate gate.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.transport.is_alive()
    }

    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, LspError> {
        self.transport.send_request(method, params, timeout).await
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), LspError> {
        self.transport.send_notification(method, params).await
    }

    /// Register a push-notification listener keyed by method name.
    pub async fn subscribe(&self, method: &str) -> mpsc::UnboundedReceiver<Value> {
        self.transport.subscribe(method).await
    }

    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
    }
}

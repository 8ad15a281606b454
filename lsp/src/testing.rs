//! In-memory scripted servers for exercising the client stack without
//! spawning real language server processes.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::client::LanguageClient;
use crate::codec::{FrameReader, FrameWriter};
use crate::transport::Transport;
use crate::types::ServerDescriptor;

/// Start a transport whose far end is a scripted server: every request is
/// answered by `respond(method)`, every notification is forwarded to the
/// returned channel as `(method, params)`.
pub(crate) fn scripted_transport(
    name: &str,
    respond: impl Fn(&str) -> Result<Value, (i64, String)> + Send + 'static,
) -> (Transport, mpsc::UnboundedReceiver<(String, Value)>) {
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);
    let (client_read, client_write) = tokio::io::split(client_io);
    let (server_read, server_write) = tokio::io::split(server_io);
    let transport = Transport::start_io(name, client_read, client_write, None);

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut reader = FrameReader::new(server_read);
        let mut writer = FrameWriter::new(server_write);
        while let Ok(Some(frame)) = reader.read_frame().await {
            let method = frame
                .get("method")
                .and_then(Value::as_str)
                .map(str::to_string);
            match (frame.get("id").and_then(Value::as_u64), method) {
                (Some(id), Some(method)) => {
                    let reply = match respond(&method) {
                        Ok(result) => serde_json::json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "result": result
                        }),
                        Err((code, message)) => serde_json::json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "error": { "code": code, "message": message }
                        }),
                    };
                    if writer.write_frame(&reply).await.is_err() {
                        break;
                    }
                }
                (None, Some(method)) => {
                    let params = frame.get("params").cloned().unwrap_or(Value::Null);
                    let _ = tx.send((method, params));
                }
                _ => {}
            }
        }
    });

    (transport, rx)
}

/// A ready client for `language`, backed by a scripted server that answers
/// `initialize` with a minimal capability set and everything else with null.
pub(crate) async fn memory_client(
    language: &str,
) -> (LanguageClient, mpsc::UnboundedReceiver<(String, Value)>) {
    let (transport, rx) = scripted_transport(language, |method| {
        if method == "initialize" {
            Ok(serde_json::json!({ "capabilities": { "textDocumentSync": 1 } }))
        } else {
            Ok(Value::Null)
        }
    });

    let descriptor = ServerDescriptor {
        language: language.to_string(),
        command: "unused".to_string(),
        args: Vec::new(),
        extensions: Vec::new(),
        init_options: Value::Null,
    };

    let client = LanguageClient::handshake(transport, descriptor, "file:///workspace")
        .await
        .expect("scripted handshake succeeds");
    (client, rx)
}

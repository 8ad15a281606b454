//! Process transport — bidirectional JSON-RPC over one child process's
//! standard streams, independent of LSP semantics.
//!
//! The transport owns a reader task and a writer task wired to the child's
//! stdout/stdin through the [`crate::codec`] framing layer. Requests are
//! correlated to responses purely by id; every request carries its own
//! deadline. Push notifications are republished to listeners registered per
//! method name.
//!
//! Construction is generic over `AsyncRead`/`AsyncWrite` so the correlation
//! and shutdown machinery can be exercised against in-memory streams;
//! [`Transport::spawn`] wires in a real child process.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::codec::{FrameReader, FrameWriter};
use crate::protocol::{Notification, Request};
use crate::types::LspError;

const WRITER_CHANNEL_CAPACITY: usize = 64;

/// Deadline for the best-effort `shutdown` request.
const SHUTDOWN_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Grace period between `exit` and killing the process.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

enum WriterCommand {
    Send(Value),
    Shutdown,
}

enum IncomingFrame {
    Response {
        id: u64,
        body: Value,
    },
    ServerRequest {
        id: Value,
        method: String,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, LspError>>>>>;
type ListenerMap = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Value>>>>;

fn parse_incoming(frame: &Value) -> Option<IncomingFrame> {
    let id = frame.get("id");
    let method = frame
        .get("method")
        .and_then(|m| m.as_str())
        .map(String::from);
    let has_result_or_error = frame.get("result").is_some() || frame.get("error").is_some();

    match (id, method, has_result_or_error) {
        (Some(id_val), None, true) => Some(IncomingFrame::Response {
            id: id_val.as_u64()?,
            body: frame.clone(),
        }),
        (Some(id_val), Some(method), _) => Some(IncomingFrame::ServerRequest {
            id: id_val.clone(),
            method,
        }),
        (None, Some(method), _) => Some(IncomingFrame::Notification {
            method,
            params: frame.get("params").cloned(),
        }),
        _ => None,
    }
}

/// One child process plus the framing, correlation, and dispatch machinery
/// around its standard streams.
#[derive(Debug)]
pub(crate) struct Transport {
    name: String,
    writer_tx: mpsc::Sender<WriterCommand>,
    pending: PendingMap,
    listeners: ListenerMap,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    shutdown_started: AtomicBool,
    child: Mutex<Option<Child>>,
    #[allow(dead_code)]
    reader_handle: tokio::task::JoinHandle<()>,
    #[allow(dead_code)]
    writer_handle: tokio::task::JoinHandle<()>,
}

impl Transport {
    /// Spawn the configured command and wire its stdio into a transport.
    ///
    /// Fails if the executable cannot be resolved on PATH or refuses to
    /// spawn; callers treat this as terminal for the attempt.
    pub async fn spawn(
        name: &str,
        command: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<Self, LspError> {
        let resolved = which::which(command).map_err(|e| LspError::Spawn {
            command: command.to_string(),
            message: e.to_string(),
        })?;

        let mut cmd = Command::new(&resolved);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| LspError::Spawn {
            command: command.to_string(),
            message: e.to_string(),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| LspError::Spawn {
            command: command.to_string(),
            message: "no stdin handle".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| LspError::Spawn {
            command: command.to_string(),
            message: "no stdout handle".to_string(),
        })?;

        // Server logs arrive on stderr; keep them out of the protocol stream.
        if let Some(stderr) = child.stderr.take() {
            let stderr_name = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server = %stderr_name, "stderr: {line}");
                }
            });
        }

        Ok(Self::start_io(name, stdout, stdin, Some(child)))
    }

    /// Start the reader/writer tasks over an arbitrary stream pair.
    pub(crate) fn start_io<R, W>(name: &str, reader: R, writer: W, child: Option<Child>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let listeners: ListenerMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        let writer_name = name.to_string();
        let writer_handle = tokio::spawn(async move {
            let mut writer = FrameWriter::new(writer);
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send(frame) => {
                        if let Err(e) = writer.write_frame(&frame).await {
                            tracing::warn!(server = %writer_name, "write error: {e}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let reader_pending = pending.clone();
        let reader_listeners = listeners.clone();
        let reader_alive = alive.clone();
        let reader_writer_tx = writer_tx.clone();
        let reader_name = name.to_string();
        let reader_handle = tokio::spawn(async move {
            let mut reader = FrameReader::new(reader);
            loop {
                match reader.read_frame().await {
                    Ok(Some(frame)) => {
                        Self::dispatch_frame(
                            &frame,
                            &reader_pending,
                            &reader_listeners,
                            &reader_writer_tx,
                            &reader_name,
                        )
                        .await;
                    }
                    Ok(None) => {
                        tracing::info!(server = %reader_name, "server closed stdout");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(server = %reader_name, "reader error: {e}");
                        break;
                    }
                }
            }
            // The stream is gone: every in-flight request fails now, and the
            // transport is no longer usable.
            reader_alive.store(false, Ordering::SeqCst);
            Self::fail_pending(&reader_pending, || LspError::ProcessExited).await;
        });

        Self {
            name: name.to_string(),
            writer_tx,
            pending,
            listeners,
            next_id: AtomicU64::new(1),
            alive,
            shutdown_started: AtomicBool::new(false),
            child: Mutex::new(child),
            reader_handle,
            writer_handle,
        }
    }

    async fn dispatch_frame(
        frame: &Value,
        pending: &Mutex<HashMap<u64, oneshot::Sender<Result<Value, LspError>>>>,
        listeners: &Mutex<HashMap<String, mpsc::UnboundedSender<Value>>>,
        writer_tx: &mpsc::Sender<WriterCommand>,
        name: &str,
    ) {
        let Some(incoming) = parse_incoming(frame) else {
            tracing::trace!(server = %name, "ignoring malformed JSON-RPC frame");
            return;
        };

        match incoming {
            IncomingFrame::Response { id, body } => {
                let sender = pending.lock().await.remove(&id);
                match sender {
                    Some(tx) => {
                        let result = if let Some(error) = body.get("error") {
                            Err(LspError::Rpc {
                                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                                message: error
                                    .get("message")
                                    .and_then(Value::as_str)
                                    .unwrap_or("unknown error")
                                    .to_string(),
                            })
                        } else {
                            Ok(body.get("result").cloned().unwrap_or(Value::Null))
                        };
                        let _ = tx.send(result);
                    }
                    // Usually a late reply to a request that already timed out.
                    None => {
                        tracing::debug!(server = %name, id, "response for unknown request id");
                    }
                }
            }
            IncomingFrame::ServerRequest { id, method } => {
                // Servers send client/registerCapability, workDoneProgress/create,
                // etc. Answer with an empty success so the server never blocks.
                tracing::debug!(server = %name, %method, "answering server request with null");
                let response = serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": null
                });
                let _ = writer_tx.send(WriterCommand::Send(response)).await;
            }
            IncomingFrame::Notification { method, params } => {
                let listener = listeners.lock().await.get(&method).cloned();
                if let Some(tx) = listener {
                    let _ = tx.send(params.unwrap_or(Value::Null));
                } else {
                    tracing::trace!(server = %name, %method, "unclaimed notification");
                }
            }
        }
    }

    async fn fail_pending(pending: &PendingMap, err: impl Fn() -> LspError) {
        let drained: Vec<_> = pending.lock().await.drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(err()));
        }
    }

    /// Send a request and await its response or the deadline.
    ///
    /// The pending entry is removed on timeout; a response arriving later is
    /// logged as an unknown id and dropped.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, LspError> {
        if !self.is_alive() {
            return Err(LspError::NotRunning);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request::new(id, method, params);
        let frame = serde_json::to_value(&request)
            .map_err(|e| LspError::Io(std::io::Error::other(e)))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self.writer_tx.send(WriterCommand::Send(frame)).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(LspError::NotRunning);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            // Pending entry dropped without a reply: the reader task is gone.
            Ok(Err(_)) => Err(LspError::ProcessExited),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(LspError::Timeout {
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Fire-and-forget framed write; no id, no pending tracking.
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), LspError> {
        if !self.is_alive() {
            return Err(LspError::NotRunning);
        }
        let notification = Notification::new(method, params);
        let frame = serde_json::to_value(&notification)
            .map_err(|e| LspError::Io(std::io::Error::other(e)))?;
        self.writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| LspError::NotRunning)
    }

    /// Register a listener for push notifications of one method. The params
    /// of each matching notification arrive on the returned channel.
    pub async fn subscribe(&self, method: &str) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self
            .listeners
            .lock()
            .await
            .insert(method.to_string(), tx)
            .is_some()
        {
            tracing::warn!(server = %self.name, %method, "replacing existing notification listener");
        }
        rx
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Best-effort LSP goodbye, then forced termination.
    ///
    /// Idempotent and safe to call on an already-dead process. All still
    /// pending requests reject with [`LspError::ShutDown`].
    pub async fn shutdown(&self) {
        eprintln!("DBG shutdown: enter");
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            eprintln!("DBG shutdown: already started, return");
            return;
        }
        eprintln!("DBG shutdown: before shutdown request, alive={}", self.is_alive());

        if self.is_alive()
            && self
                .send_request("shutdown", None, SHUTDOWN_REQUEST_TIMEOUT)
                .await
                .is_ok()
        {
            let _ = self.send_notification("exit", None).await;
        }

        eprintln!("DBG shutdown: after shutdown req/exit");
        self.alive.store(false, Ordering::SeqCst);
        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;
        eprintln!("DBG shutdown: sent writer shutdown, before fail_pending");
        Self::fail_pending(&self.pending, || LspError::ShutDown).await;
        eprintln!("DBG shutdown: after fail_pending, before child lock");

        let mut child_slot = self.child.lock().await;
        if let Some(mut child) = child_slot.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, child.wait())
                .await
                .is_err()
            {
                tracing::debug!(server = %self.name, "server did not exit in time, killing");
                let _ = child.kill().await;
            }
        }
    }
}

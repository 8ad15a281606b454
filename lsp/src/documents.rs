//! Document synchronizer — keeps each language server's view of a file's
//! text consistent with a local record.
//!
//! Notifications for a given file are strictly ordered open → change* →
//! close; the store enforces the contract by rejecting updates and closes on
//! documents it does not track.

use std::collections::HashMap;
use std::path::Path;

use tokio::sync::Mutex;

use crate::client::LanguageClient;
use crate::protocol;
use crate::types::LspError;

/// One tracked document. The version strictly increases; the text always
/// matches the last notification sent to the owning client.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    uri: String,
    language_id: String,
    version: i32,
    text: String,
}

impl DocumentRecord {
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[must_use]
    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    #[must_use]
    pub fn version(&self) -> i32 {
        self.version
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Open-document table, keyed by URI. The multiplexer owns one store shared
/// across all language clients; records remember their owning language.
#[derive(Default)]
pub struct DocumentStore {
    documents: Mutex<HashMap<String, DocumentRecord>>,
}

impl DocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the file and send `textDocument/didOpen` at version 1.
    ///
    /// Idempotent: an already-open document is left untouched — no version
    /// bump, no resent didOpen. Returns the document URI.
    pub async fn open(&self, client: &LanguageClient, path: &Path) -> Result<String, LspError> {
        let uri = protocol::path_to_file_uri(path)?;

        if self.documents.lock().await.contains_key(&uri) {
            tracing::debug!(%uri, "document already open");
            return Ok(uri);
        }

        let text = tokio::fs::read_to_string(path).await?;
        let record = DocumentRecord {
            uri: uri.clone(),
            language_id: client.language().to_string(),
            version: 1,
            text,
        };
        let params =
            protocol::did_open_params(&uri, &record.language_id, record.version, &record.text);

        {
            let mut docs = self.documents.lock().await;
            if docs.contains_key(&uri) {
                return Ok(uri);
            }
            docs.insert(uri.clone(), record);
        }

        if let Err(e) = client.notify("textDocument/didOpen", Some(params)).await {
            self.documents.lock().await.remove(&uri);
            return Err(e);
        }

        tracing::debug!(%uri, "opened document");
        Ok(uri)
    }

    /// Mirror new text into the server with a full-document
    /// `textDocument/didChange`. With no text supplied, the file is re-read
    /// from disk. Fails if the document is not open.
    pub async fn update(
        &self,
        client: &LanguageClient,
        path: &Path,
        new_text: Option<String>,
    ) -> Result<(), LspError> {
        let uri = protocol::path_to_file_uri(path)?;

        let text = match new_text {
            Some(text) => text,
            None => tokio::fs::read_to_string(path).await?,
        };

        let params = {
            let mut docs = self.documents.lock().await;
            let record = docs
                .get_mut(&uri)
                .ok_or_else(|| LspError::DocumentNotOpen { uri: uri.clone() })?;
            record.version += 1;
            record.text = text;
            protocol::did_change_params(&uri, record.version, &record.text)
        };

        client.notify("textDocument/didChange", Some(params)).await
    }

    /// Remove the record and send `textDocument/didClose`. Fails if the
    /// document is not open.
    pub async fn close(&self, client: &LanguageClient, path: &Path) -> Result<(), LspError> {
        let uri = protocol::path_to_file_uri(path)?;

        if self.documents.lock().await.remove(&uri).is_none() {
            return Err(LspError::DocumentNotOpen { uri });
        }

        client
            .notify("textDocument/didClose", Some(protocol::did_close_params(&uri)))
            .await
    }

    /// Send didClose for every document owned by `client` and drop the
    /// records. Used during shutdown and restart; notification failures are
    /// logged, not propagated.
    pub async fn close_all_for(&self, client: &LanguageClient) {
        let mut uris: Vec<String> = {
            let mut docs = self.documents.lock().await;
            let matching: Vec<String> = docs
                .iter()
                .filter(|(_, record)| record.language_id == client.language())
                .map(|(uri, _)| uri.clone())
                .collect();
            for uri in &matching {
                docs.remove(uri);
            }
            matching
        };
        uris.sort_unstable();

        for uri in uris {
            if let Err(e) = client
                .notify("textDocument/didClose", Some(protocol::did_close_params(&uri)))
                .await
            {
                tracing::debug!(%uri, "didClose during close_all failed: {e}");
            }
        }
    }

    pub async fn is_open(&self, path: &Path) -> bool {
        match protocol::path_to_file_uri(path) {
            Ok(uri) => self.documents.lock().await.contains_key(&uri),
            Err(_) => false,
        }
    }

    pub async fn get(&self, path: &Path) -> Option<DocumentRecord> {
        let uri = protocol::path_to_file_uri(path).ok()?;
        self.documents.lock().await.get(&uri).cloned()
    }

    /// All tracked URIs, sorted.
    pub async fn open_uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.documents.lock().await.keys().cloned().collect();
        uris.sort_unstable();
        uris
    }

    /// Drop every record without notifying anyone. Used after the owning
    /// clients are already gone.
    pub(crate) async fn clear(&self) {
        self.documents.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_client;
    use serde_json::Value;
    use tokio::sync::mpsc;

    struct Fixture {
        _dir: tempfile::TempDir,
        path: std::path::PathBuf,
    }

    fn write_fixture(name: &str, content: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        Fixture { _dir: dir, path }
    }

    /// Drain the handshake's "initialized" notification.
    async fn skip_handshake(wire: &mut mpsc::UnboundedReceiver<(String, Value)>) {
        let (method, _) = wire.recv().await.unwrap();
        assert_eq!(method, "initialized");
    }

    #[tokio::test]
    async fn test_open_sends_did_open_at_version_one() {
        let (client, mut wire) = memory_client("rust").await;
        skip_handshake(&mut wire).await;
        let fixture = write_fixture("main.rs", "fn main() {}");

        let store = DocumentStore::new();
        let uri = store.open(&client, &fixture.path).await.unwrap();

        let (method, params) = wire.recv().await.unwrap();
        assert_eq!(method, "textDocument/didOpen");
        assert_eq!(params["textDocument"]["uri"], uri);
        assert_eq!(params["textDocument"]["languageId"], "rust");
        assert_eq!(params["textDocument"]["version"], 1);
        assert_eq!(params["textDocument"]["text"], "fn main() {}");

        let record = store.get(&fixture.path).await.unwrap();
        assert_eq!(record.version(), 1);
        assert_eq!(record.text(), "fn main() {}");
    }

    #[tokio::test]
    async fn test_open_twice_is_idempotent() {
        let (client, mut wire) = memory_client("rust").await;
        skip_handshake(&mut wire).await;
        let fixture = write_fixture("main.rs", "fn main() {}");

        let store = DocumentStore::new();
        let first = store.open(&client, &fixture.path).await.unwrap();
        let second = store.open(&client, &fixture.path).await.unwrap();
        assert_eq!(first, second);

        // Exactly one didOpen on the wire; the version stayed at 1.
        let (method, _) = wire.recv().await.unwrap();
        assert_eq!(method, "textDocument/didOpen");
        assert!(wire.try_recv().is_err());
        assert_eq!(store.get(&fixture.path).await.unwrap().version(), 1);
    }

    #[tokio::test]
    async fn test_update_increments_version_and_sends_full_text() {
        let (client, mut wire) = memory_client("rust").await;
        skip_handshake(&mut wire).await;
        let fixture = write_fixture("lib.rs", "old");

        let store = DocumentStore::new();
        store.open(&client, &fixture.path).await.unwrap();
        wire.recv().await.unwrap(); // didOpen

        store
            .update(&client, &fixture.path, Some("new text".to_string()))
            .await
            .unwrap();

        let (method, params) = wire.recv().await.unwrap();
        assert_eq!(method, "textDocument/didChange");
        assert_eq!(params["textDocument"]["version"], 2);
        assert_eq!(params["contentChanges"][0]["text"], "new text");
        assert_eq!(store.get(&fixture.path).await.unwrap().text(), "new text");
    }

    #[tokio::test]
    async fn test_update_without_text_rereads_disk() {
        let (client, mut wire) = memory_client("rust").await;
        skip_handshake(&mut wire).await;
        let fixture = write_fixture("lib.rs", "before");

        let store = DocumentStore::new();
        store.open(&client, &fixture.path).await.unwrap();
        wire.recv().await.unwrap(); // didOpen

        std::fs::write(&fixture.path, "after").unwrap();
        store.update(&client, &fixture.path, None).await.unwrap();

        let (_, params) = wire.recv().await.unwrap();
        assert_eq!(params["contentChanges"][0]["text"], "after");
    }

    #[tokio::test]
    async fn test_update_unopened_is_contract_violation() {
        let (client, _wire) = memory_client("rust").await;
        let fixture = write_fixture("lib.rs", "x");

        let store = DocumentStore::new();
        let err = store
            .update(&client, &fixture.path, Some("y".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, LspError::DocumentNotOpen { .. }));
    }

    #[tokio::test]
    async fn test_close_unopened_is_contract_violation() {
        let (client, _wire) = memory_client("rust").await;
        let fixture = write_fixture("lib.rs", "x");

        let store = DocumentStore::new();
        let err = store.close(&client, &fixture.path).await.unwrap_err();
        assert!(matches!(err, LspError::DocumentNotOpen { .. }));
    }

    #[tokio::test]
    async fn test_open_change_close_ordering() {
        let (client, mut wire) = memory_client("rust").await;
        skip_handshake(&mut wire).await;
        let fixture = write_fixture("lib.rs", "v1");

        let store = DocumentStore::new();
        store.open(&client, &fixture.path).await.unwrap();
        store
            .update(&client, &fixture.path, Some("v2".to_string()))
            .await
            .unwrap();
        store.close(&client, &fixture.path).await.unwrap();

        let methods: Vec<String> = [
            wire.recv().await.unwrap().0,
            wire.recv().await.unwrap().0,
            wire.recv().await.unwrap().0,
        ]
        .into();
        assert_eq!(
            methods,
            vec![
                "textDocument/didOpen",
                "textDocument/didChange",
                "textDocument/didClose"
            ]
        );
        assert!(!store.is_open(&fixture.path).await);
    }

    #[tokio::test]
    async fn test_close_all_for_only_touches_owning_language() {
        let (rust_client, mut rust_wire) = memory_client("rust").await;
        let (python_client, mut python_wire) = memory_client("python").await;
        skip_handshake(&mut rust_wire).await;
        skip_handshake(&mut python_wire).await;

        let rust_file = write_fixture("lib.rs", "rust code");
        let python_file = write_fixture("app.py", "python code");

        let store = DocumentStore::new();
        store.open(&rust_client, &rust_file.path).await.unwrap();
        store.open(&python_client, &python_file.path).await.unwrap();
        rust_wire.recv().await.unwrap(); // didOpen
        python_wire.recv().await.unwrap(); // didOpen

        store.close_all_for(&rust_client).await;

        let (method, _) = rust_wire.recv().await.unwrap();
        assert_eq!(method, "textDocument/didClose");
        assert!(python_wire.try_recv().is_err());

        assert!(!store.is_open(&rust_file.path).await);
        assert!(store.is_open(&python_file.path).await);
    }

    #[tokio::test]
    async fn test_open_uris_sorted() {
        let (client, _wire) = memory_client("rust").await;
        let dir = tempfile::tempdir().unwrap();
        let b = dir.path().join("b.rs");
        let a = dir.path().join("a.rs");
        std::fs::write(&b, "b").unwrap();
        std::fs::write(&a, "a").unwrap();

        let store = DocumentStore::new();
        store.open(&client, &b).await.unwrap();
        store.open(&client, &a).await.unwrap();

        let uris = store.open_uris().await;
        assert_eq!(uris.len(), 2);
        assert!(uris[0] < uris[1]);
    }
}

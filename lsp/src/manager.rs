//! Client multiplexer — the public facade of the LSP subsystem.
//!
//! Maps a file's extension to a language, lazily creates and caches at most
//! one [`LanguageClient`] per language, and exposes the uniform per-file
//! request operation the tool layer and the indexing pipeline consume.
//!
//! Creation races resolve by first-writer-wins: a once-cell slot is
//! installed under the map lock before the asynchronous start begins, so
//! concurrent callers awaiting the same language converge on one instance.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};

use crate::client::{DEFAULT_REQUEST_TIMEOUT, LanguageClient};
use crate::documents::{DocumentRecord, DocumentStore};
use crate::types::{LspError, ServerDescriptor, builtin_descriptors};

type ClientSlot = Arc<OnceCell<Arc<LanguageClient>>>;

/// Build extension → registry-index map. Ownership is many-to-one; the
/// earliest descriptor wins duplicate claims.
fn build_extension_map(registry: &[ServerDescriptor]) -> HashMap<String, usize> {
    let mut extension_map = HashMap::new();
    for (index, descriptor) in registry.iter().enumerate() {
        for ext in &descriptor.extensions {
            if let Some(&existing) = extension_map.get(ext) {
                let existing: &ServerDescriptor = &registry[existing];
                tracing::warn!(
                    "extension '{ext}' claimed by both '{}' and '{}', keeping '{}'",
                    existing.language,
                    descriptor.language,
                    existing.language,
                );
                continue;
            }
            extension_map.insert(ext.clone(), index);
        }
    }
    extension_map
}

pub struct LspManager {
    workspace_root: PathBuf,
    registry: Vec<ServerDescriptor>,
    extension_map: HashMap<String, usize>,
    clients: Mutex<HashMap<String, ClientSlot>>,
    documents: DocumentStore,
}

impl LspManager {
    /// Manager over the built-in server catalog.
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self::with_registry(workspace_root, builtin_descriptors())
    }

    #[must_use]
    pub fn with_registry(
        workspace_root: impl Into<PathBuf>,
        registry: Vec<ServerDescriptor>,
    ) -> Self {
        let extension_map = build_extension_map(&registry);
        Self {
            workspace_root: workspace_root.into(),
            registry,
            extension_map,
            clients: Mutex::new(HashMap::new()),
            documents: DocumentStore::new(),
        }
    }

    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Every file extension some registered server owns, sorted.
    #[must_use]
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.extension_map.keys().cloned().collect();
        extensions.sort_unstable();
        extensions
    }

    fn descriptor_index(&self, path: &Path) -> Result<usize, LspError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        self.extension_map
            .get(&extension)
            .copied()
            .ok_or(LspError::UnsupportedExtension { extension })
    }

    /// A ready client for the file's language, starting one if none exists
    /// or the cached one is no longer ready.
    pub async fn client_for_file(&self, path: &Path) -> Result<Arc<LanguageClient>, LspError> {
        let index = self.descriptor_index(path)?;
        self.client_for_language(index).await
    }

    async fn client_for_language(&self, index: usize) -> Result<Arc<LanguageClient>, LspError> {
        let descriptor = &self.registry[index];
        loop {
            let slot: ClientSlot = {
                let mut clients = self.clients.lock().await;
                clients
                    .entry(descriptor.language.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new()))
                    .clone()
            };

            let started = slot
                .get_or_try_init(|| async {
                    tracing::info!(language = %descriptor.language, "starting language server");
                    LanguageClient::start(descriptor.clone(), &self.workspace_root)
                        .await
                        .map(Arc::new)
                })
                .await;

            match started {
                Ok(client) if client.is_ready() => return Ok(client.clone()),
                Ok(stale) => {
                    // Process died since creation: drop this generation's slot
                    // (if it is still the installed one) and recreate.
                    let stale = stale.clone();
                    tracing::info!(
                        language = %descriptor.language,
                        "cached client no longer ready, recreating"
                    );
                    let mut clients = self.clients.lock().await;
                    if let Some(current) = clients.get(&descriptor.language)
                        && Arc::ptr_eq(current, &slot)
                    {
                        clients.remove(&descriptor.language);
                    }
                    drop(clients);
                    stale.shutdown().await;
                }
                Err(e) => {
                    // Remove the failed slot so the next caller can retry.
                    let mut clients = self.clients.lock().await;
                    if let Some(current) = clients.get(&descriptor.language)
                        && Arc::ptr_eq(current, &slot)
                    {
                        clients.remove(&descriptor.language);
                    }
                    return Err(e);
                }
            }
        }
    }

    /// The uniform request operation: route by extension, make sure the
    /// document is open (servers assume document state exists before
    /// position-based requests), then delegate to the owning client.
    pub async fn send_request(
        &self,
        path: &Path,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, LspError> {
        let client = self.client_for_file(path).await?;
        self.documents.open(&client, path).await?;
        client
            .request(method, params, timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT))
            .await
    }

    /// Open a document on its owning client. Returns the document URI.
    pub async fn open_document(&self, path: &Path) -> Result<String, LspError> {
        let client = self.client_for_file(path).await?;
        self.documents.open(&client, path).await
    }

    /// Open the document only if it is not already tracked.
    pub async fn ensure_document_open(&self, path: &Path) -> Result<String, LspError> {
        if let Some(record) = self.documents.get(path).await {
            return Ok(record.uri().to_string());
        }
        self.open_document(path).await
    }

    /// Mirror new text (or the file's current content) into the server.
    pub async fn update_document(
        &self,
        path: &Path,
        new_text: Option<String>,
    ) -> Result<(), LspError> {
        let client = self.client_for_file(path).await?;
        self.documents.update(&client, path, new_text).await
    }

    pub async fn close_document(&self, path: &Path) -> Result<(), LspError> {
        let client = self.client_for_file(path).await?;
        self.documents.close(&client, path).await
    }

    pub async fn is_document_open(&self, path: &Path) -> bool {
        self.documents.is_open(path).await
    }

    pub async fn document(&self, path: &Path) -> Option<DocumentRecord> {
        self.documents.get(path).await
    }

    /// URIs of every tracked open document, sorted.
    pub async fn open_documents(&self) -> Vec<String> {
        self.documents.open_uris().await
    }

    /// Languages with a live, ready client, sorted.
    pub async fn active_clients(&self) -> Vec<String> {
        let clients = self.clients.lock().await;
        let mut languages: Vec<String> = clients
            .iter()
            .filter(|(_, slot)| slot.get().is_some_and(|c| c.is_ready()))
            .map(|(language, _)| language.clone())
            .collect();
        languages.sort_unstable();
        languages
    }

    /// Close every tracked document on its owning client, shut every client
    /// down concurrently, and clear all caches. Individual failures are
    /// tolerated; the next request after shutdown lazily recreates clients.
    pub async fn shutdown(&self) {
        let slots: Vec<(String, ClientSlot)> = {
            let mut clients = self.clients.lock().await;
            clients.drain().collect()
        };

        let mut started: Vec<(String, Arc<LanguageClient>)> = slots
            .into_iter()
            .filter_map(|(language, slot)| slot.get().map(|c| (language, c.clone())))
            .collect();
        started.sort_by(|a, b| a.0.cmp(&b.0));

        for (_, client) in &started {
            self.documents.close_all_for(client).await;
        }

        let mut join_set = tokio::task::JoinSet::new();
        for (language, client) in started {
            join_set.spawn(async move {
                tracing::info!(language = %language, "shutting down language server");
                client.shutdown().await;
            });
        }
        while join_set.join_next().await.is_some() {}

        self.documents.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> Vec<ServerDescriptor> {
        serde_json::from_value(serde_json::json!([
            {
                "language": "rust",
                "command": "rust-analyzer",
                "extensions": ["rs"]
            },
            {
                "language": "python",
                "command": "pylsp",
                "extensions": ["py", "pyi"]
            }
        ]))
        .unwrap()
    }

    #[test]
    fn test_extension_map_built_correctly() {
        let manager = LspManager::with_registry("/w", test_registry());
        assert_eq!(manager.descriptor_index(Path::new("/w/a.rs")).unwrap(), 0);
        assert_eq!(manager.descriptor_index(Path::new("/w/a.py")).unwrap(), 1);
        assert_eq!(manager.descriptor_index(Path::new("/w/a.pyi")).unwrap(), 1);
    }

    #[test]
    fn test_extension_lookup_is_case_insensitive() {
        let manager = LspManager::with_registry("/w", test_registry());
        assert_eq!(manager.descriptor_index(Path::new("/w/MAIN.RS")).unwrap(), 0);
    }

    #[test]
    fn test_unsupported_extension_is_typed_error() {
        let manager = LspManager::with_registry("/w", test_registry());
        let err = manager
            .descriptor_index(Path::new("/w/readme.xyz"))
            .unwrap_err();
        assert!(err.is_unsupported_extension());
        assert!(err.to_string().contains("xyz"));
    }

    #[test]
    fn test_no_extension_is_unsupported() {
        let manager = LspManager::with_registry("/w", test_registry());
        let err = manager.descriptor_index(Path::new("/w/Makefile")).unwrap_err();
        assert!(err.is_unsupported_extension());
    }

    #[test]
    fn test_extension_overlap_first_registration_wins() {
        let registry: Vec<ServerDescriptor> = serde_json::from_value(serde_json::json!([
            { "language": "a", "command": "a-ls", "extensions": ["rs"] },
            { "language": "b", "command": "b-ls", "extensions": ["rs"] }
        ]))
        .unwrap();
        let manager = LspManager::with_registry("/w", registry);
        assert_eq!(manager.descriptor_index(Path::new("/w/x.rs")).unwrap(), 0);
    }

    #[test]
    fn test_supported_extensions_sorted() {
        let manager = LspManager::with_registry("/w", test_registry());
        assert_eq!(manager.supported_extensions(), vec!["py", "pyi", "rs"]);
    }

    #[test]
    fn test_builtin_registry_covers_common_extensions() {
        let manager = LspManager::new("/w");
        let extensions = manager.supported_extensions();
        for ext in ["rs", "py", "go", "ts", "c", "cpp", "sh"] {
            assert!(extensions.contains(&ext.to_string()), "missing {ext}");
        }
    }

    #[tokio::test]
    async fn test_active_clients_initially_empty() {
        let manager = LspManager::with_registry("/w", test_registry());
        assert!(manager.active_clients().await.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_without_clients_is_noop() {
        let manager = LspManager::with_registry("/w", test_registry());
        manager.shutdown().await;
        assert!(manager.active_clients().await.is_empty());
        assert!(manager.open_documents().await.is_empty());
    }

    #[tokio::test]
    async fn test_request_for_unsupported_file_fails_without_spawn() {
        let manager = LspManager::with_registry("/w", test_registry());
        let err = manager
            .send_request(Path::new("/w/a.xyz"), "textDocument/hover", None, None)
            .await
            .unwrap_err();
        assert!(err.is_unsupported_extension());
    }
}

//! JSON-RPC message types, LSP parameter builders, and path/URI conversion.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::types::LspError;

#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Notification {
    pub fn new(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.to_string(),
            params,
        }
    }
}

/// The fixed, generous capability set sent at initialize time. No dynamic
/// registration; servers that want more are politely refused elsewhere.
pub(crate) fn initialize_params(
    root_uri: &str,
    init_options: &serde_json::Value,
) -> serde_json::Value {
    serde_json::json!({
        "processId": std::process::id(),
        "rootUri": root_uri,
        "capabilities": {
            "textDocument": {
                "synchronization": {
                    "dynamicRegistration": false,
                    "willSave": false,
                    "willSaveWaitUntil": false,
                    "didSave": false
                },
                "completion": {
                    "completionItem": {
                        "snippetSupport": true,
                        "commitCharactersSupport": true,
                        "documentationFormat": ["markdown", "plaintext"]
                    }
                },
                "hover": {
                    "contentFormat": ["markdown", "plaintext"]
                },
                "definition": {
                    "linkSupport": true
                },
                "references": {},
                "documentSymbol": {
                    "hierarchicalDocumentSymbolSupport": true
                },
                "codeAction": {
                    "codeActionLiteralSupport": {
                        "codeActionKind": {
                            "valueSet": [
                                "quickfix",
                                "refactor",
                                "refactor.extract",
                                "refactor.inline",
                                "refactor.rewrite",
                                "source",
                                "source.organizeImports"
                            ]
                        }
                    }
                },
                "formatting": {},
                "rangeFormatting": {},
                "rename": {
                    "prepareSupport": true
                }
            },
            "workspace": {
                "symbol": {},
                "workspaceFolders": true
            }
        },
        "initializationOptions": init_options,
        "workspaceFolders": [{
            "uri": root_uri,
            "name": "workspace"
        }]
    })
}

pub(crate) fn did_open_params(
    uri: &str,
    language_id: &str,
    version: i32,
    text: &str,
) -> serde_json::Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri,
            "languageId": language_id,
            "version": version,
            "text": text
        }
    })
}

/// Full-document sync: a single content change carrying the entire new text.
pub(crate) fn did_change_params(uri: &str, version: i32, text: &str) -> serde_json::Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri,
            "version": version
        },
        "contentChanges": [{
            "text": text
        }]
    })
}

pub(crate) fn did_close_params(uri: &str) -> serde_json::Value {
    serde_json::json!({
        "textDocument": { "uri": uri }
    })
}

/// Convert an absolute path to a `file://` URI.
pub fn path_to_file_uri(path: &Path) -> Result<String, LspError> {
    url::Url::from_file_path(path)
        .map(String::from)
        .map_err(|()| LspError::InvalidPath {
            path: path.to_path_buf(),
        })
}

/// Convert a `file://` URI back to a path. Returns `None` for non-file URIs.
#[must_use]
pub fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    url::Url::parse(uri)
        .ok()
        .and_then(|u| u.to_file_path().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_params_has_required_fields() {
        let params = initialize_params("file:///workspace", &serde_json::Value::Null);
        assert!(params["processId"].is_number());
        assert_eq!(params["rootUri"], "file:///workspace");
        let text_document = &params["capabilities"]["textDocument"];
        assert_eq!(
            text_document["documentSymbol"]["hierarchicalDocumentSymbolSupport"],
            true
        );
        assert_eq!(
            text_document["completion"]["completionItem"]["snippetSupport"],
            true
        );
        assert_eq!(text_document["rename"]["prepareSupport"], true);
        assert_eq!(params["workspaceFolders"][0]["uri"], "file:///workspace");
    }

    #[test]
    fn test_initialize_params_carries_server_options() {
        let options = serde_json::json!({ "cargo": { "allFeatures": true } });
        let params = initialize_params("file:///w", &options);
        assert_eq!(
            params["initializationOptions"]["cargo"]["allFeatures"],
            true
        );
    }

    #[test]
    fn test_did_open_params() {
        let params = did_open_params("file:///test.rs", "rust", 1, "fn main() {}");
        assert_eq!(params["textDocument"]["uri"], "file:///test.rs");
        assert_eq!(params["textDocument"]["languageId"], "rust");
        assert_eq!(params["textDocument"]["version"], 1);
        assert_eq!(params["textDocument"]["text"], "fn main() {}");
    }

    #[test]
    fn test_did_change_params_is_full_sync() {
        let params = did_change_params("file:///test.rs", 2, "fn main() { 42 }");
        assert_eq!(params["textDocument"]["version"], 2);
        let changes = params["contentChanges"].as_array().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0]["text"], "fn main() { 42 }");
        assert!(changes[0].get("range").is_none());
    }

    #[test]
    fn test_did_close_params() {
        let params = did_close_params("file:///test.rs");
        assert_eq!(params["textDocument"]["uri"], "file:///test.rs");
    }

    #[test]
    fn test_path_to_file_uri_and_back() {
        #[cfg(windows)]
        let path = PathBuf::from(r"C:\Users\test\src\main.rs");
        #[cfg(not(windows))]
        let path = PathBuf::from("/home/test/src/main.rs");

        let uri = path_to_file_uri(&path).expect("should create URI");
        let roundtrip = file_uri_to_path(&uri).expect("should parse back to path");
        assert_eq!(roundtrip, path);
    }

    #[test]
    fn test_path_to_file_uri_rejects_relative() {
        let err = path_to_file_uri(Path::new("src/main.rs")).unwrap_err();
        assert!(err.to_string().contains("src/main.rs"));
    }

    #[test]
    fn test_file_uri_to_path_invalid_uri() {
        assert!(file_uri_to_path("not-a-uri").is_none());
    }

    #[test]
    fn test_file_uri_to_path_non_file_scheme() {
        assert!(file_uri_to_path("https://example.com/test.rs").is_none());
    }

    #[test]
    fn test_request_serialization_with_params() {
        let req = Request::new(
            42,
            "initialize",
            Some(serde_json::json!({"rootUri": "file:///"})),
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 42);
        assert_eq!(json["method"], "initialize");
        assert!(json["params"]["rootUri"].is_string());
    }

    #[test]
    fn test_request_serialization_without_params() {
        let req = Request::new(1, "shutdown", None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 1);
        assert_eq!(json["method"], "shutdown");
        assert!(
            json.get("params").is_none(),
            "params must be omitted, not null"
        );
    }

    #[test]
    fn test_notification_serialization_without_params() {
        let notif = Notification::new("exit", None);
        let json = serde_json::to_value(&notif).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["method"], "exit");
        assert!(json.get("id").is_none());
        assert!(
            json.get("params").is_none(),
            "params must be omitted, not null"
        );
    }
}

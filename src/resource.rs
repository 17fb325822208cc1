//! Resource model: one document fragment extracted from an input file
//! or stream, plus its derived signature.

use std::sync::OnceLock;

use serde_json::Value;

use crate::error::SignatureError;

/// Marker appended to names derived from `metadata.generateName`, to
/// distinguish them from literal `metadata.name` values.
pub const GENERATE_NAME_MARKER: &str = "{{ generateName }}";

/// The (Kind, Version, Namespace, Name) tuple identifying a resource's
/// type and identity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    pub kind: String,
    pub version: String,
    pub namespace: String,
    pub name: String,
}

impl Signature {
    /// The `apiVersion/Kind` encoding, usable in skip/reject sets
    /// alongside the raw kind.
    pub fn group_version_kind(&self) -> String {
        format!("{}/{}", self.version, self.kind)
    }

    /// Derive a signature from an already-parsed document. Missing or
    /// non-string fields yield empty strings rather than errors; an
    /// empty kind is classified downstream.
    pub fn from_value(doc: &Value) -> Self {
        let kind = doc
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let version = doc
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let metadata = doc.get("metadata");
        let field = |name: &str| -> String {
            metadata
                .and_then(|m| m.get(name))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let namespace = field("namespace");
        let mut name = field("name");
        let generate_name = field("generateName");
        if !generate_name.is_empty() {
            name = generate_name + GENERATE_NAME_MARKER;
        }

        Signature {
            kind,
            version,
            namespace,
            name,
        }
    }
}

/// A single document within an input file or stream.
///
/// Created by discovery, handed to exactly one validation worker via a
/// channel, never mutated afterwards except to memoize its signature.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Origin identifier: the file path or stream name
    pub path: String,
    /// Raw content of this one document, already split on separators
    pub bytes: Vec<u8>,
    sig: OnceLock<std::result::Result<Signature, SignatureError>>,
}

impl Resource {
    pub fn new(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes,
            sig: OnceLock::new(),
        }
    }

    /// True when the document body contains no content at all
    pub fn is_empty(&self) -> bool {
        self.bytes.iter().all(|b| b.is_ascii_whitespace())
    }

    /// Compute the resource signature, parsing the raw bytes.
    ///
    /// The outcome is memoized, failure included; repeated calls never
    /// re-parse. A malformed document yields a parse error, not a panic.
    pub fn signature(&self) -> Result<&Signature, SignatureError> {
        self.sig
            .get_or_init(|| {
                serde_yaml::from_slice::<Value>(&self.bytes)
                    .map(|doc| Signature::from_value(&doc))
                    .map_err(|e| SignatureError::Parse(e.to_string()))
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Derive and memoize the signature from a document the caller
    /// already parsed, avoiding a second unmarshal.
    pub fn signature_from_value(&self, doc: &Value) -> Signature {
        match self.sig.get_or_init(|| Ok(Signature::from_value(doc))) {
            Ok(sig) => sig.clone(),
            // A memoized failure cannot hold the derived value
            Err(_) => Signature::from_value(doc),
        }
    }

    /// The memoized signature, if one was successfully computed
    pub fn cached_signature(&self) -> Option<&Signature> {
        self.sig.get().and_then(|sig| sig.as_ref().ok())
    }
}

/// Split raw file content into one segment per YAML document.
///
/// A separator is a line consisting of `---` alone. Empty input yields
/// zero segments; separator-only input yields empty segments, which
/// are later classified as Empty because they lack a kind.
pub fn split_documents(data: &[u8]) -> Vec<Vec<u8>> {
    let mut docs = Vec::new();
    let mut current: Vec<u8> = Vec::new();

    for line in data.split_inclusive(|&b| b == b'\n') {
        let mut trimmed: &[u8] = line;
        if let Some(s) = trimmed.strip_suffix(b"\n") {
            trimmed = s;
        }
        if let Some(s) = trimmed.strip_suffix(b"\r") {
            trimmed = s;
        }
        if trimmed == b"---" {
            docs.push(std::mem::take(&mut current));
        } else {
            current.extend_from_slice(line);
        }
    }

    if !current.is_empty() {
        docs.push(current);
    }

    docs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_from_manifest() {
        let res = Resource::new(
            "deployment.yaml",
            b"apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n  namespace: prod\n"
                .to_vec(),
        );
        let sig = res.signature().unwrap();
        assert_eq!(sig.kind, "Deployment");
        assert_eq!(sig.version, "apps/v1");
        assert_eq!(sig.namespace, "prod");
        assert_eq!(sig.name, "web");
        assert_eq!(sig.group_version_kind(), "apps/v1/Deployment");
    }

    #[test]
    fn test_signature_is_deterministic_and_memoized() {
        let res = Resource::new(
            "cm.yaml",
            b"apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\n".to_vec(),
        );
        let first = res.signature().unwrap().clone();
        let second = res.signature().unwrap();
        assert_eq!(&first, second);
        // memoized: both calls return the same stored instance
        assert!(std::ptr::eq(res.signature().unwrap(), res.signature().unwrap()));
    }

    #[test]
    fn test_signature_generate_name_marker() {
        let res = Resource::new(
            "job.yaml",
            b"apiVersion: batch/v1\nkind: Job\nmetadata:\n  generateName: import-\n".to_vec(),
        );
        let sig = res.signature().unwrap();
        assert_eq!(sig.name, format!("import-{}", GENERATE_NAME_MARKER));
    }

    #[test]
    fn test_signature_missing_fields_are_empty() {
        let res = Resource::new("x.yaml", b"data:\n  key: value\n".to_vec());
        let sig = res.signature().unwrap();
        assert_eq!(sig.kind, "");
        assert_eq!(sig.version, "");
        assert_eq!(sig.name, "");
    }

    #[test]
    fn test_signature_malformed_document_errors() {
        let res = Resource::new("bad.yaml", b"kind: [unclosed\n  - x: {\n".to_vec());
        assert!(res.signature().is_err());
    }

    #[test]
    fn test_signature_parse_failure_is_memoized() {
        let res = Resource::new("bad.yaml", b"kind: [unclosed\n  - x: {\n".to_vec());
        let first = res.signature().unwrap_err();
        let second = res.signature().unwrap_err();
        assert_eq!(first, second);
        // a memoized failure is not a usable signature
        assert!(res.cached_signature().is_none());
    }

    #[test]
    fn test_split_three_documents() {
        let docs = split_documents(b"doc1\n---\ndoc2\n---\ndoc3");
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0], b"doc1\n");
        assert_eq!(docs[1], b"doc2\n");
        assert_eq!(docs[2], b"doc3");
    }

    #[test]
    fn test_split_empty_input_yields_nothing() {
        assert!(split_documents(b"").is_empty());
    }

    #[test]
    fn test_split_separator_only_yields_empty_segments() {
        let docs = split_documents(b"---\n---\n");
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.is_empty()));
    }

    #[test]
    fn test_split_leading_separator_yields_empty_first_segment() {
        let docs = split_documents(b"---\nkind: Pod\n");
        assert_eq!(docs.len(), 2);
        assert!(docs[0].is_empty());
        assert_eq!(docs[1], b"kind: Pod\n");
    }

    #[test]
    fn test_split_crlf_separator() {
        let docs = split_documents(b"a\r\n---\r\nb\r\n");
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0], b"a\r\n");
        assert_eq!(docs[1], b"b\r\n");
    }

    #[test]
    fn test_empty_resource_detection() {
        assert!(Resource::new("x", b"".to_vec()).is_empty());
        assert!(Resource::new("x", b"  \n\t\n".to_vec()).is_empty());
        assert!(!Resource::new("x", b"kind: Pod".to_vec()).is_empty());
    }
}

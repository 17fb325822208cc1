//! Resource discovery: walks file trees or reads a stream, splits
//! multi-document files, and emits one [`Resource`] per document over
//! a channel. Unreadable paths are reported on a separate error
//! channel instead of terminating the walk.

use std::path::{Path, PathBuf};

use regex::Regex;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, ValidationError};
use crate::resource::{split_documents, Resource};

/// A path that could not be read or walked
#[derive(Debug)]
pub struct DiscoveryError {
    pub path: PathBuf,
    pub error: std::io::Error,
}

/// File-tree walker with a name filter and optional ignore patterns
pub struct Discovery {
    ignore_patterns: Vec<Regex>,
}

impl Discovery {
    pub fn new() -> Self {
        Self {
            ignore_patterns: Vec::new(),
        }
    }

    /// Compile regex patterns for paths to skip during the walk
    pub fn with_ignore_patterns(patterns: &[String]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let re = Regex::new(pattern).map_err(|e| {
                ValidationError::Config(format!("invalid ignore pattern '{}': {}", pattern, e))
            })?;
            compiled.push(re);
        }
        Ok(Self {
            ignore_patterns: compiled,
        })
    }

    fn is_candidate(path: &Path) -> bool {
        matches!(
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .as_deref(),
            Some("yaml") | Some("yml") | Some("json")
        )
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.ignore_patterns.iter().any(|re| re.is_match(&path_str))
    }

    /// Walk the given root paths, sending one resource per document and
    /// one error per unreadable path.
    ///
    /// Stops enumerating promptly once the cancellation token is
    /// observed; the caller closes the channels by dropping the senders
    /// when this returns, so downstream consumers never deadlock.
    pub async fn from_files(
        &self,
        paths: &[PathBuf],
        token: &CancellationToken,
        resources: &Sender<Resource>,
        errors: &Sender<DiscoveryError>,
    ) {
        for root in paths {
            if token.is_cancelled() {
                debug!("discovery cancelled");
                return;
            }

            let metadata = match tokio::fs::metadata(root).await {
                Ok(m) => m,
                Err(e) => {
                    let _ = errors
                        .send(DiscoveryError {
                            path: root.clone(),
                            error: e,
                        })
                        .await;
                    continue;
                }
            };

            if metadata.is_dir() {
                self.walk_dir(root, token, resources, errors).await;
            } else {
                self.process_file(root, token, resources, errors).await;
            }
        }
    }

    /// Read an entire input stream (usually stdin) and emit one
    /// resource per document, all tagged with the stream name.
    pub async fn from_reader<R>(
        &self,
        name: &str,
        mut reader: R,
        token: &CancellationToken,
        resources: &Sender<Resource>,
        errors: &Sender<DiscoveryError>,
    ) where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf).await {
            let _ = errors
                .send(DiscoveryError {
                    path: PathBuf::from(name),
                    error: e,
                })
                .await;
            return;
        }

        for doc in split_documents(&buf) {
            if token.is_cancelled() {
                return;
            }
            if resources.send(Resource::new(name, doc)).await.is_err() {
                return;
            }
        }
    }

    fn walk_dir<'a>(
        &'a self,
        dir: &'a Path,
        token: &'a CancellationToken,
        resources: &'a Sender<Resource>,
        errors: &'a Sender<DiscoveryError>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let mut read_dir = match tokio::fs::read_dir(dir).await {
                Ok(rd) => rd,
                Err(e) => {
                    // The walk of this directory failed structurally
                    let _ = errors
                        .send(DiscoveryError {
                            path: dir.to_path_buf(),
                            error: e,
                        })
                        .await;
                    return;
                }
            };

            loop {
                if token.is_cancelled() {
                    debug!("discovery cancelled");
                    return;
                }

                let entry = match read_dir.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => return,
                    Err(e) => {
                        let _ = errors
                            .send(DiscoveryError {
                                path: dir.to_path_buf(),
                                error: e,
                            })
                            .await;
                        return;
                    }
                };

                let path = entry.path();
                let file_type = match entry.file_type().await {
                    Ok(ft) => ft,
                    Err(e) => {
                        let _ = errors.send(DiscoveryError { path, error: e }).await;
                        continue;
                    }
                };

                if file_type.is_dir() {
                    self.walk_dir(&path, token, resources, errors).await;
                } else if file_type.is_file() {
                    self.process_file(&path, token, resources, errors).await;
                }
            }
        })
    }

    async fn process_file(
        &self,
        path: &Path,
        token: &CancellationToken,
        resources: &Sender<Resource>,
        errors: &Sender<DiscoveryError>,
    ) {
        if !Self::is_candidate(path) || self.is_ignored(path) {
            return;
        }

        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) => {
                let _ = errors
                    .send(DiscoveryError {
                        path: path.to_path_buf(),
                        error: e,
                    })
                    .await;
                return;
            }
        };

        let origin = path.to_string_lossy().to_string();
        for doc in split_documents(&bytes) {
            if token.is_cancelled() {
                return;
            }
            if resources.send(Resource::new(origin.clone(), doc)).await.is_err() {
                // All receivers are gone; nothing left to discover for
                return;
            }
        }
    }
}

impl Default for Discovery {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    async fn collect(
        discovery: &Discovery,
        roots: &[PathBuf],
    ) -> (Vec<Resource>, Vec<DiscoveryError>) {
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1024);
        let (etx, mut erx) = mpsc::channel(64);

        discovery.from_files(roots, &token, &tx, &etx).await;
        drop(tx);
        drop(etx);

        let mut resources = Vec::new();
        while let Some(r) = rx.recv().await {
            resources.push(r);
        }
        let mut errors = Vec::new();
        while let Some(e) = erx.recv().await {
            errors.push(e);
        }
        (resources, errors)
    }

    #[tokio::test]
    async fn test_discovers_yaml_and_json_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.yaml"), "kind: Pod\n").unwrap();
        std::fs::write(dir.path().join("b.yml"), "kind: Service\n").unwrap();
        std::fs::write(dir.path().join("c.json"), "{\"kind\": \"ConfigMap\"}\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a manifest\n").unwrap();

        let (resources, errors) = collect(&Discovery::new(), &[dir.path().to_path_buf()]).await;
        assert_eq!(resources.len(), 3);
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_multi_document_file_splits_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("multi.yaml");
        std::fs::write(&file, "kind: A\n---\nkind: B\n---\nkind: C\n").unwrap();

        let (resources, _) = collect(&Discovery::new(), &[file.clone()]).await;
        assert_eq!(resources.len(), 3);
        for r in &resources {
            assert_eq!(r.path, file.to_string_lossy());
        }
        assert_eq!(resources[0].bytes, b"kind: A\n");
        assert_eq!(resources[1].bytes, b"kind: B\n");
        assert_eq!(resources[2].bytes, b"kind: C\n");
    }

    #[tokio::test]
    async fn test_empty_file_yields_no_resources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.yaml"), "").unwrap();

        let (resources, errors) = collect(&Discovery::new(), &[dir.path().to_path_buf()]).await;
        assert!(resources.is_empty());
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_nested_directories_are_walked() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub/deep")).unwrap();
        std::fs::write(dir.path().join("sub/a.yaml"), "kind: A\n").unwrap();
        std::fs::write(dir.path().join("sub/deep/b.yaml"), "kind: B\n").unwrap();

        let (resources, _) = collect(&Discovery::new(), &[dir.path().to_path_buf()]).await;
        assert_eq!(resources.len(), 2);
    }

    #[tokio::test]
    async fn test_ignore_patterns_skip_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.yaml"), "kind: A\n").unwrap();
        std::fs::write(dir.path().join("skip-me.yaml"), "kind: B\n").unwrap();

        let discovery = Discovery::with_ignore_patterns(&["skip-.*".to_string()]).unwrap();
        let (resources, _) = collect(&discovery, &[dir.path().to_path_buf()]).await;
        assert_eq!(resources.len(), 1);
        assert!(resources[0].path.ends_with("keep.yaml"));
    }

    #[tokio::test]
    async fn test_invalid_ignore_pattern_is_config_error() {
        let result = Discovery::with_ignore_patterns(&["[unclosed".to_string()]);
        assert!(matches!(result, Err(ValidationError::Config(_))));
    }

    #[tokio::test]
    async fn test_missing_root_reports_discovery_error() {
        let (resources, errors) = collect(
            &Discovery::new(),
            &[PathBuf::from("/nonexistent/manifests")],
        )
        .await;
        assert!(resources.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, PathBuf::from("/nonexistent/manifests"));
    }

    #[tokio::test]
    async fn test_cancellation_stops_enumeration() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..20 {
            std::fs::write(dir.path().join(format!("f{}.yaml", i)), "kind: A\n").unwrap();
        }

        let token = CancellationToken::new();
        token.cancel();
        let (tx, mut rx) = mpsc::channel(1024);
        let (etx, _erx) = mpsc::channel(64);

        Discovery::new()
            .from_files(&[dir.path().to_path_buf()], &token, &tx, &etx)
            .await;
        drop(tx);

        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_from_reader_splits_stream() {
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(64);
        let (etx, _erx) = mpsc::channel(8);

        let input: &[u8] = b"kind: A\n---\nkind: B\n";
        Discovery::new()
            .from_reader("stdin", input, &token, &tx, &etx)
            .await;
        drop(tx);

        let mut resources = Vec::new();
        while let Some(r) = rx.recv().await {
            resources.push(r);
        }
        assert_eq!(resources.len(), 2);
        assert!(resources.iter().all(|r| r.path == "stdin"));
    }
}

//! Concurrent validation pipeline: a discovery task feeds a bounded
//! channel of resources, a pool of workers validates them, and a single
//! consumer writes results to the output sink. Discovery errors travel
//! on their own channel and are folded into the result stream.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::discovery::Discovery;
use crate::error::{Result, ValidationError};
use crate::output::Output;
use crate::resource::Resource;
use crate::validator::{ValidationResult, Validator};

/// Where resources come from
pub enum Input {
    Paths(Vec<PathBuf>),
    Stdin,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Number of concurrent validation workers
    pub workers: usize,
    /// Stop scheduling new work after the first failing result
    pub fail_fast: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            fail_fast: false,
        }
    }
}

/// Run the full pipeline to completion.
///
/// Returns `Ok(true)` when every resource validated cleanly (skipped
/// and empty resources do not count against success), `Ok(false)` when
/// any result was invalid or errored. The output sink is flushed
/// exactly once, after the last result.
pub async fn run(
    input: Input,
    discovery: Discovery,
    validator: Validator,
    mut output: Box<dyn Output>,
    opts: PipelineOptions,
    token: CancellationToken,
) -> Result<bool> {
    let workers = opts.workers.max(1);
    let (res_tx, res_rx) = mpsc::channel::<Resource>(workers * 4);
    let (err_tx, mut err_rx) = mpsc::channel::<crate::discovery::DiscoveryError>(16);
    let (out_tx, mut out_rx) = mpsc::channel::<ValidationResult>(workers * 4);

    let validator = Arc::new(validator);

    // Discovery closes the resource and error channels by dropping the
    // senders when it returns.
    let discovery_token = token.clone();
    let discovery_handle = tokio::spawn(async move {
        match input {
            Input::Paths(paths) => {
                discovery
                    .from_files(&paths, &discovery_token, &res_tx, &err_tx)
                    .await;
            }
            Input::Stdin => {
                discovery
                    .from_reader("stdin", tokio::io::stdin(), &discovery_token, &res_tx, &err_tx)
                    .await;
            }
        }
    });

    // Workers pull from a shared receiver; the channel itself is the
    // work queue.
    let shared_rx = Arc::new(Mutex::new(res_rx));
    let mut worker_handles = Vec::with_capacity(workers);
    for id in 0..workers {
        let rx = Arc::clone(&shared_rx);
        let validator = Arc::clone(&validator);
        let out_tx = out_tx.clone();
        let token = token.clone();
        worker_handles.push(tokio::spawn(async move {
            loop {
                let resource = tokio::select! {
                    _ = token.cancelled() => {
                        debug!(worker = id, "worker cancelled");
                        break;
                    }
                    resource = async { rx.lock().await.recv().await } => {
                        match resource {
                            Some(r) => r,
                            None => break,
                        }
                    }
                };
                let result = validator.validate_resource(resource).await;
                if out_tx.send(result).await.is_err() {
                    break;
                }
            }
        }));
    }

    // Discovery errors become Error results. A failed walk also aborts
    // the rest of the run.
    let forwarder_token = token.clone();
    let forwarder_out = out_tx.clone();
    let forwarder_handle = tokio::spawn(async move {
        while let Some(err) = err_rx.recv().await {
            let path = err.path.to_string_lossy().to_string();
            let message = ValidationError::Discovery {
                path: path.clone(),
                details: err.error.to_string(),
            }
            .to_string();
            let result = ValidationResult::error(Resource::new(path, Vec::new()), message);
            if forwarder_out.send(result).await.is_err() {
                break;
            }
            forwarder_token.cancel();
        }
    });

    // The result channel closes once every worker and the forwarder
    // have dropped their senders.
    drop(out_tx);

    let mut success = true;
    let mut halted = false;
    while let Some(result) = out_rx.recv().await {
        if result.status.is_failure() {
            success = false;
        }
        if halted {
            // Keep draining so workers never block on a full channel
            continue;
        }
        output.write(&result)?;
        if !success && opts.fail_fast {
            debug!("first failure observed, cancelling remaining work");
            token.cancel();
            halted = true;
        }
    }
    output.flush()?;

    if let Err(e) = discovery_handle.await {
        error!("discovery task failed: {}", e);
    }
    for joined in futures::future::join_all(worker_handles).await {
        if let Err(e) = joined {
            error!("validation worker failed: {}", e);
        }
    }
    if let Err(e) = forwarder_handle.await {
        error!("error forwarder failed: {}", e);
    }

    Ok(success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Output;
    use crate::registry::{EmbeddedRegistry, RegistrySet};
    use crate::validator::{ValidationStatus, ValidatorOptions};
    use std::sync::Mutex as StdMutex;

    /// Sink that records statuses and flush calls for assertions
    #[derive(Clone, Default)]
    struct CollectingOutput {
        written: Arc<StdMutex<Vec<(String, ValidationStatus, Option<String>)>>>,
        flushes: Arc<StdMutex<usize>>,
    }

    impl Output for CollectingOutput {
        fn write(&mut self, result: &ValidationResult) -> Result<()> {
            self.written.lock().unwrap().push((
                result.resource.path.clone(),
                result.status,
                result.message.clone(),
            ));
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            *self.flushes.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn embedded_validator() -> Validator {
        Validator::new(
            RegistrySet::new(vec![Box::new(EmbeddedRegistry::new(false))]),
            ValidatorOptions::default(),
        )
    }

    async fn run_on_paths(
        paths: Vec<PathBuf>,
        opts: PipelineOptions,
    ) -> (bool, CollectingOutput) {
        let sink = CollectingOutput::default();
        let success = run(
            Input::Paths(paths),
            Discovery::new(),
            embedded_validator(),
            Box::new(sink.clone()),
            opts,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        (success, sink)
    }

    #[tokio::test]
    async fn test_all_valid_resources_succeed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("cm.yaml"),
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("ns.yaml"),
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: b\n",
        )
        .unwrap();

        let (success, sink) =
            run_on_paths(vec![dir.path().to_path_buf()], PipelineOptions::default()).await;
        assert!(success);
        let written = sink.written.lock().unwrap();
        assert_eq!(written.len(), 2);
        assert!(written.iter().all(|(_, s, _)| *s == ValidationStatus::Valid));
        assert_eq!(*sink.flushes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_schema_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("w.yaml"), "apiVersion: v1\nkind: Widget\n").unwrap();

        let (success, sink) =
            run_on_paths(vec![dir.path().to_path_buf()], PipelineOptions::default()).await;
        assert!(!success);
        let written = sink.written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].1, ValidationStatus::Error);
    }

    #[tokio::test]
    async fn test_multi_document_file_produces_one_result_each() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("multi.yaml"),
            "apiVersion: v1\nkind: ConfigMap\n---\napiVersion: v1\nkind: Namespace\n---\n",
        )
        .unwrap();

        let (success, sink) =
            run_on_paths(vec![dir.path().to_path_buf()], PipelineOptions::default()).await;
        assert!(success);
        // Two valid documents and the trailing empty segment
        let written = sink.written.lock().unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(
            written
                .iter()
                .filter(|(_, s, _)| *s == ValidationStatus::Valid)
                .count(),
            2
        );
        assert_eq!(
            written
                .iter()
                .filter(|(_, s, _)| *s == ValidationStatus::Empty)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_unreadable_root_reports_error_result() {
        let (success, sink) = run_on_paths(
            vec![PathBuf::from("/nonexistent/manifests")],
            PipelineOptions::default(),
        )
        .await;
        assert!(!success);
        let written = sink.written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].1, ValidationStatus::Error);
        let message = written[0].2.as_deref().unwrap();
        assert!(message.starts_with("failed processing /nonexistent/manifests:"));
    }

    #[tokio::test]
    async fn test_fail_fast_still_flushes_once() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..10 {
            std::fs::write(
                dir.path().join(format!("w{}.yaml", i)),
                "apiVersion: v1\nkind: Widget\n",
            )
            .unwrap();
        }

        let (success, sink) = run_on_paths(
            vec![dir.path().to_path_buf()],
            PipelineOptions {
                workers: 2,
                fail_fast: true,
            },
        )
        .await;
        assert!(!success);
        assert_eq!(*sink.flushes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_single_worker_preserves_file_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("multi.yaml"),
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: first\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: second\n",
        )
        .unwrap();

        let (_, sink) = run_on_paths(
            vec![dir.path().join("multi.yaml")],
            PipelineOptions {
                workers: 1,
                fail_fast: false,
            },
        )
        .await;
        let written = sink.written.lock().unwrap();
        assert_eq!(written.len(), 2);
    }
}

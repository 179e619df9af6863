use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytesize::ByteSize;
use tokio::io::AsyncRead;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::config::Config;
use crate::error::UploadError;
use crate::services::chunker::StreamChunker;
use crate::services::retry;
use crate::services::session::{PartDescriptor, SessionStore};
use crate::services::staging::SealedChunk;
use crate::services::uploader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub parts: usize,
    pub bytes: u64,
}

/// Owns the shared abort signal and the fan-out of one upload task per chunk.
///
/// Receivers are held in chunk-index order so completion can rebuild the
/// ascending part list no matter which uploads finished first.
pub struct UploadCoordinator {
    session: Arc<dyn SessionStore>,
    upload_id: String,
    retries: u32,
    abort: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
    results: Vec<oneshot::Receiver<PartDescriptor>>,
    staged: Vec<PathBuf>,
}

impl UploadCoordinator {
    pub fn new(session: Arc<dyn SessionStore>, upload_id: String, retries: u32) -> Self {
        Self {
            session,
            upload_id,
            retries,
            abort: Arc::new(AtomicBool::new(false)),
            tasks: Vec::new(),
            results: Vec::new(),
            staged: Vec::new(),
        }
    }

    /// The abort signal is monotonic: once true it is never reset.
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    /// Remember a staging path for the shutdown sweep.
    pub fn track(&mut self, path: &Path) {
        self.staged.push(path.to_path_buf());
    }

    /// Spawn the upload task for a completed chunk.
    pub fn dispatch(&mut self, chunk: SealedChunk) {
        info!(
            "chunk {}: dispatching part {} ({})",
            chunk.index(),
            chunk.part_number(),
            ByteSize::b(chunk.len())
        );
        let (tx, rx) = oneshot::channel();
        let task = uploader::spawn_part_upload(
            self.session.clone(),
            self.upload_id.clone(),
            chunk,
            self.retries,
            self.abort.clone(),
            tx,
        );
        self.tasks.push(task);
        self.results.push(rx);
    }

    /// Wait for every dispatched upload task to finish, success or not.
    async fn join(&mut self) {
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                error!("upload task failed to join: {}", err);
                self.abort.store(true, Ordering::Release);
            }
        }
    }

    /// Join all uploads, then either finalize the session or abort it.
    pub async fn finish(&mut self) -> Result<UploadSummary, UploadError> {
        self.join().await;

        if self.is_aborted() {
            self.abort_session().await;
            return Err(UploadError::Aborted);
        }

        // Drain results in chunk-index order, not completion order; the part
        // list must be the ascending part-number sequence.
        let receivers = std::mem::take(&mut self.results);
        let mut parts = Vec::with_capacity(receivers.len());
        for (index, receiver) in receivers.into_iter().enumerate() {
            match receiver.await {
                Ok(part) => parts.push(part),
                Err(_) => {
                    error!("chunk {}: uploader exited without a result", index);
                    self.abort_session().await;
                    return Err(UploadError::Aborted);
                }
            }
        }

        info!("finalizing multipart upload ({} parts)", parts.len());
        let completion = retry::with_backoff("complete multipart upload", self.retries, || {
            self.session.complete(&self.upload_id, &parts)
        })
        .await;

        match completion {
            Ok(()) => Ok(UploadSummary {
                parts: parts.len(),
                bytes: parts.iter().map(|part| part.size).sum(),
            }),
            Err(err) => {
                error!("{}", err);
                self.abort_session().await;
                Err(err)
            }
        }
    }

    /// Fatal path: give up without waiting for in-flight uploads.
    pub async fn abandon(&mut self) {
        self.abort.store(true, Ordering::Release);
        self.abort_session().await;
    }

    async fn abort_session(&self) {
        warn!("aborting multipart upload {}", self.upload_id);
        if let Err(err) = self.session.abort(&self.upload_id).await {
            error!(
                "failed to abort multipart upload {}: {:#}",
                self.upload_id, err
            );
        }
    }

    /// Remove any staging file still on disk. Uploaders clean up their own
    /// chunks, so finding one here indicates a bug.
    pub async fn sweep_staging(&self) {
        for (index, path) in self.staged.iter().enumerate() {
            if tokio::fs::metadata(path).await.is_ok() {
                warn!(
                    "temporary file found (cleaning up): {} (chunk {})",
                    path.display(),
                    index
                );
                if let Err(err) = tokio::fs::remove_file(path).await {
                    error!("failed to remove {}: {}", path.display(), err);
                }
            }
        }
    }
}

/// Drive the whole pipeline: establish the session, chunk the stream,
/// join the uploads, then complete or abort. This is the only place the
/// session's abort operation is ever reached.
pub async fn run<R>(
    config: &Config,
    session: Arc<dyn SessionStore>,
    mut input: R,
) -> Result<UploadSummary, UploadError>
where
    R: AsyncRead + Unpin,
{
    let upload_id = retry::with_backoff("create multipart upload", config.retries, || {
        session.create()
    })
    .await?;
    info!("multipart upload session established: {}", upload_id);

    let mut coordinator = UploadCoordinator::new(session, upload_id, config.retries);
    let chunker = StreamChunker::new(config);

    let outcome = match chunker.run(&mut input, &mut coordinator).await {
        Ok(total) => {
            info!("input stream fully consumed ({})", ByteSize::b(total));
            coordinator.finish().await
        }
        // An uploader raised the abort signal: let in-flight uploads run
        // out, then finish() observes the signal and aborts the session.
        Err(UploadError::Aborted) => coordinator.finish().await,
        // Staging corruption, read overflow, stream failure: stop
        // immediately, best-effort abort, no further chunk processing.
        Err(err) => {
            error!("fatal: {}", err);
            coordinator.abandon().await;
            Err(err)
        }
    };

    coordinator.sweep_staging().await;
    outcome
}

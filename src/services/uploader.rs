use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytesize::ByteSize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::services::retry;
use crate::services::session::{PartDescriptor, SessionStore};
use crate::services::staging::SealedChunk;

/// Upload one sealed chunk as its numbered part, concurrently with every
/// other chunk and with the chunker's continued reading.
///
/// On success the staging file is removed immediately and the descriptor is
/// published on the chunk's result channel. Exhausting the retry budget
/// raises the shared abort signal instead; aborting the session itself is
/// left to the coordinator so it happens exactly once.
pub fn spawn_part_upload(
    session: Arc<dyn SessionStore>,
    upload_id: String,
    chunk: SealedChunk,
    budget: u32,
    abort: Arc<AtomicBool>,
    result: oneshot::Sender<PartDescriptor>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let index = chunk.index();
        info!(
            "chunk {}: starting upload ({}; size: {})",
            index,
            chunk.path().display(),
            ByteSize::b(chunk.len())
        );

        let what = format!("chunk {}: part {} upload", index, chunk.part_number());
        let attempt = retry::with_backoff(&what, budget, || {
            session.upload_part(&upload_id, chunk.part_number(), chunk.path())
        })
        .await;

        match attempt {
            Ok(part) => {
                info!(
                    "chunk {}: upload success (part: {}, etag: {}, size: {})",
                    index,
                    part.part_number,
                    part.etag,
                    ByteSize::b(part.size)
                );
                if let Err(err) = chunk.remove().await {
                    warn!(
                        "chunk {}: failed to remove staging file {}: {}",
                        index,
                        chunk.path().display(),
                        err
                    );
                }
                let _ = result.send(part);
            }
            Err(err) => {
                error!("{}", err);
                error!("chunk {}: raising multipart error", index);
                abort.store(true, Ordering::Release);
            }
        }
    })
}

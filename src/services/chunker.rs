use bytesize::ByteSize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::info;

use crate::coordinator::UploadCoordinator;
use crate::core::config::Config;
use crate::error::UploadError;
use crate::services::staging::StagedChunk;

/// Fixed read increment for draining the input stream, independent of the
/// configured chunk size.
pub const READ_INCREMENT: usize = 10_000;

/// Sequentially splits the input stream into staged chunks of exactly the
/// configured size (only the final chunk may be smaller) and hands each
/// completed chunk to the coordinator for dispatch.
pub struct StreamChunker {
    chunk_size: u64,
    read_limit: Option<u64>,
}

impl StreamChunker {
    pub fn new(config: &Config) -> Self {
        // With a declared input size, precompute how many read increments the
        // stream should ever take; anything past that is a misconfiguration.
        let read_limit = config
            .expected_size
            .map(|expected| expected.div_ceil(READ_INCREMENT as u64));
        Self {
            chunk_size: config.chunk_size,
            read_limit,
        }
    }

    /// Consume the stream to the end, returning total bytes read.
    pub async fn run<R>(
        &self,
        input: &mut R,
        coordinator: &mut UploadCoordinator,
    ) -> Result<u64, UploadError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = vec![0u8; READ_INCREMENT];
        let mut current = StagedChunk::create(0)?;
        coordinator.track(current.path());

        let mut reads: u64 = 0;
        let mut total: u64 = 0;

        loop {
            let n = input
                .read(&mut buffer)
                .await
                .map_err(|source| UploadError::StreamRead { source })?;
            if n == 0 {
                break;
            }
            reads += 1;

            if coordinator.is_aborted() {
                return Err(UploadError::Aborted);
            }
            if let Some(limit) = self.read_limit {
                if reads > limit {
                    return Err(UploadError::ReadOverflow { reads, limit });
                }
            }

            // An increment may straddle a chunk boundary; split it so every
            // chunk except the last is exactly chunk_size bytes.
            let mut offset = 0;
            while offset < n {
                let room = (self.chunk_size - current.len()) as usize;
                let take = room.min(n - offset);
                current.append(&buffer[offset..offset + take]).await?;
                total += take as u64;
                offset += take;

                if current.len() == self.chunk_size {
                    let next = StagedChunk::create(current.index() + 1)?;
                    coordinator.track(next.path());
                    let full = std::mem::replace(&mut current, next);
                    coordinator.dispatch(full.seal().await?);
                    info!("total bytes staged so far: {}", ByteSize::b(total));
                }
            }
        }

        if current.is_empty() {
            // the stream ended exactly on a chunk boundary
            current.discard().await;
        } else {
            coordinator.dispatch(current.seal().await?);
        }

        Ok(total)
    }
}

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::UploadError;

/// An open staging file accumulating one chunk of the input stream.
///
/// The file is kept on disk rather than RAII-deleted so removal stays an
/// explicit pipeline event: the uploader removes it on success, the chunker
/// discards an empty trailing chunk, and the coordinator sweeps anything
/// left behind at shutdown.
pub struct StagedChunk {
    index: u64,
    file: File,
    path: PathBuf,
    written: u64,
}

impl StagedChunk {
    pub fn create(index: u64) -> Result<Self, UploadError> {
        let (file, path) = tempfile::Builder::new()
            .prefix(&format!("sluice-chunk-{}-", index))
            .tempfile()
            .and_then(|staged| staged.keep().map_err(|err| err.error))
            .map_err(|source| UploadError::Staging { index, source })?;
        info!("chunk {}: staging file: {}", index, path.display());

        Ok(Self {
            index,
            file: File::from_std(file),
            path,
            written: 0,
        })
    }

    /// Append bytes, then verify the on-disk size against the running total.
    pub async fn append(&mut self, data: &[u8]) -> Result<(), UploadError> {
        let index = self.index;
        self.file
            .write_all(data)
            .await
            .map_err(|source| UploadError::Staging { index, source })?;
        self.file
            .sync_data()
            .await
            .map_err(|source| UploadError::Staging { index, source })?;
        self.written += data.len() as u64;

        let on_disk = tokio::fs::metadata(&self.path)
            .await
            .map_err(|source| UploadError::Staging { index, source })?
            .len();
        if on_disk != self.written {
            return Err(UploadError::StagingSizeMismatch {
                index,
                written: self.written,
                on_disk,
            });
        }
        Ok(())
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Close the write handle and freeze the chunk for upload.
    pub async fn seal(self) -> Result<SealedChunk, UploadError> {
        let StagedChunk {
            index,
            file,
            path,
            written,
        } = self;
        file.sync_all()
            .await
            .map_err(|source| UploadError::Staging { index, source })?;
        drop(file);

        Ok(SealedChunk {
            index,
            path,
            len: written,
        })
    }

    /// Best-effort removal of a chunk that will never be uploaded.
    pub async fn discard(self) {
        debug!("chunk {}: discarding empty staging file", self.index);
        drop(self.file);
        if let Err(err) = tokio::fs::remove_file(&self.path).await {
            warn!(
                "chunk {}: failed to discard staging file {}: {}",
                self.index,
                self.path.display(),
                err
            );
        }
    }
}

/// A completed chunk, closed for writing and ready to upload as one part.
pub struct SealedChunk {
    index: u64,
    path: PathBuf,
    len: u64,
}

impl SealedChunk {
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Part numbers are 1-based where chunk indices are 0-based.
    pub fn part_number(&self) -> i32 {
        (self.index + 1) as i32
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub async fn remove(&self) -> std::io::Result<()> {
        tokio::fs::remove_file(&self.path).await
    }
}

//! Partial data files.
//!
//! Verified segment bytes are written in place into `<target>.dctmp` and
//! the file is renamed onto the target once the whole tree checks out.

use std::io::SeekFrom;
use std::path::Path;

use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use dcq_core::{DownloadError, DownloadResult};

fn io_error(err: &std::io::Error) -> DownloadError {
    DownloadError::from_io_error(err)
}

/// Create the parent directory of `path` if it does not exist.
async fn ensure_parent(path: &Path) -> DownloadResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(|e| io_error(&e))?;
    }
    Ok(())
}

/// Write `data` at `offset` of the partial file, creating it if needed.
pub async fn write_at(partial: &Path, offset: u64, data: &[u8]) -> DownloadResult<()> {
    ensure_parent(partial).await?;
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(partial)
        .await
        .map_err(|e| io_error(&e))?;
    file.seek(SeekFrom::Start(offset))
        .await
        .map_err(|e| io_error(&e))?;
    file.write_all(data).await.map_err(|e| io_error(&e))?;
    file.flush().await.map_err(|e| io_error(&e))?;
    Ok(())
}

/// Move a completed partial file onto its target.
///
/// The partial file is sized to `size` first, so an item whose verified
/// tail block was written last still ends at the right length.
pub async fn finalize(partial: &Path, target: &Path, size: u64) -> DownloadResult<()> {
    ensure_parent(target).await?;
    let file = OpenOptions::new()
        .write(true)
        .open(partial)
        .await
        .map_err(|e| io_error(&e))?;
    file.set_len(size).await.map_err(|e| io_error(&e))?;
    file.sync_all().await.map_err(|e| io_error(&e))?;
    drop(file);
    fs::rename(partial, target).await.map_err(|e| io_error(&e))
}

/// Create an empty target file.
pub async fn create_empty(target: &Path) -> DownloadResult<()> {
    ensure_parent(target).await?;
    fs::File::create(target)
        .await
        .map(|_| ())
        .map_err(|e| io_error(&e))
}

/// Delete a partial file. A missing file is not an error.
pub async fn remove(partial: &Path) -> DownloadResult<()> {
    match fs::remove_file(partial).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error(&e)),
    }
}

//! Durable storage for accepted uploads.
//!
//! One file per accepted part, written under a single destination directory.
//! No index or manifest is kept; the directory listing is the catalog.
//! Stored names are deterministic enough to stay human-traceable (original
//! stem plus a coarse time bucket) and carry a random token so concurrent
//! requests never need cross-request coordination to avoid collisions.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::errors::Error;

/// Width of the coarse time bucket in stored names, in seconds. Roughly
/// 2.8 hours per bucket, enough for directory listings to sort by upload
/// session.
const TIME_BUCKET_SECS: i64 = 10_000;

/// Length of the random collision-avoidance token.
const TOKEN_LEN: usize = 6;

/// Handle to the destination directory for uploads.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    /// Ensure the destination directory exists and return a store rooted
    /// there. Failure here means the service cannot accept any upload.
    pub async fn prepare(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(Error::Storage)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the destination file for one part. The file stays pending
    /// until [`PendingFile::persist`] and can be removed without trace via
    /// [`PendingFile::discard`].
    pub async fn create(&self, original_name: &str) -> io::Result<PendingFile> {
        let name = stored_name(original_name);
        let path = self.root.join(&name);
        let file = fs::File::create(&path).await?;
        debug!(original_name, stored_name = %name, "created destination file");
        Ok(PendingFile { name, path, file })
    }
}

/// A destination file that has been created but not yet committed.
#[derive(Debug)]
pub struct PendingFile {
    name: String,
    path: PathBuf,
    file: fs::File,
}

impl PendingFile {
    pub fn stored_name(&self) -> &str {
        &self.name
    }

    pub async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await
    }

    /// Flush and commit the file, returning its stored name. On failure the
    /// partial file is removed before the error is returned.
    pub async fn persist(mut self) -> io::Result<String> {
        let flushed = match self.file.flush().await {
            Ok(()) => self.file.sync_all().await,
            Err(e) => Err(e),
        };
        match flushed {
            Ok(()) => Ok(self.name),
            Err(e) => {
                self.discard().await;
                Err(e)
            }
        }
    }

    /// Remove the partially written file. Used when a part is rejected or
    /// aborted mid-copy so no partial artifacts are left behind.
    pub async fn discard(self) {
        drop(self.file);
        if let Err(e) = fs::remove_file(&self.path).await {
            warn!(path = %self.path.display(), error = %e, "failed to remove discarded upload");
        }
    }
}

/// Build the stored name `{stem}_{bucket}-{token}{ext}` for an original
/// file name.
fn stored_name(original_name: &str) -> String {
    let sanitized = sanitize_file_name(original_name);
    let path = Path::new(&sanitized);

    let stem = path.file_stem().and_then(|s| s.to_str()).filter(|s| !s.is_empty()).unwrap_or("upload");
    let ext = path.extension().and_then(|e| e.to_str()).map(|e| format!(".{e}")).unwrap_or_default();

    let bucket = Utc::now().timestamp() / TIME_BUCKET_SECS;
    let token: String = rand::thread_rng().sample_iter(&Alphanumeric).take(TOKEN_LEN).map(char::from).collect();

    format!("{stem}_{bucket}-{token}{ext}")
}

/// Reduce a client-supplied file name to a safe basename: directory
/// components are stripped, leading dots removed, and anything outside
/// `[A-Za-z0-9._-]` replaced.
fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name).file_name().and_then(|n| n.to_str()).unwrap_or("");

    base.trim_start_matches('.')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}

//! On-disk home of generated images.
//!
//! Files are only ever written, never cleaned up here.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::constants::PUBLIC_IMAGE_PREFIX;

/// Directory that generated images are written to and served from.
#[derive(Clone, Debug)]
pub struct ImageStore {
    root: PathBuf,
}

/// A file written by [ImageStore::persist].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredImage {
    /// Where it landed on disk.
    pub path: PathBuf,
    /// URL path the browser can load it from, eg `/images/generated-1700000000000.png`.
    pub public_url: String,
}

impl ImageStore {
    /// Store rooted at `root`, which is created by [ImageStore::init].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The image directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the image directory if it doesn't exist yet.
    pub async fn init(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Public URL for a file name in this store.
    pub fn public_url(&self, file_name: &str) -> String {
        format!("{}/{}", PUBLIC_IMAGE_PREFIX, file_name)
    }

    /// Writes `bytes` to `file_name`, replacing any file already there.
    pub async fn persist(&self, file_name: &str, bytes: &[u8]) -> io::Result<StoredImage> {
        let path = self.root.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(StoredImage {
            path,
            public_url: self.public_url(file_name),
        })
    }
}

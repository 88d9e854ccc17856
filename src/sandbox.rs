//! Ephemeral working directories for package tarballs.
//!
//! Each scanned package gets its own tempdir holding the downloaded
//! tarball and its extracted tree. The directory is fully torn down
//! before the next package, with permissions normalized first so that
//! read-only files shipped inside a tarball cannot block deletion.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// One package's isolated scratch space. Dropped after the scan.
pub struct Workspace {
    dir: TempDir,
    root: PathBuf,
}

impl Workspace {
    /// Root of the extracted package contents.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        normalize_permissions(self.dir.path());
        // TempDir removes the tree itself.
    }
}

#[cfg(unix)]
fn normalize_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    for entry in WalkDir::new(path).into_iter().flatten() {
        let mode = if entry.file_type().is_dir() { 0o755 } else { 0o644 };
        let _ = std::fs::set_permissions(entry.path(), std::fs::Permissions::from_mode(mode));
    }
}

#[cfg(not(unix))]
fn normalize_permissions(path: &Path) {
    for entry in WalkDir::new(path).into_iter().flatten() {
        if let Ok(metadata) = entry.metadata() {
            let mut permissions = metadata.permissions();
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            let _ = std::fs::set_permissions(entry.path(), permissions);
        }
    }
}

/// Downloads and extracts one package tarball into a fresh [`Workspace`].
///
/// The download is the one step whose failure aborts the package's scan:
/// without the artifact there is nothing to detect against. An oversized
/// tarball counts as a failure.
pub async fn fetch_package(
    client: &reqwest::Client,
    tarball_url: &str,
    max_bytes: u64,
    extract_timeout: Duration,
) -> Result<Workspace> {
    let dir = TempDir::with_prefix("regwatch-").context("failed to create scratch directory")?;
    let tarball_path = dir.path().join("package.tgz");

    let response = client
        .get(tarball_url)
        .send()
        .await
        .context("tarball download failed")?
        .error_for_status()
        .context("tarball download returned an error status")?;

    if let Some(length) = response.content_length() {
        if length > max_bytes {
            bail!("tarball is {} bytes, over the {} byte cap", length, max_bytes);
        }
    }

    let body = response
        .bytes()
        .await
        .context("failed to read tarball body")?;
    if body.len() as u64 > max_bytes {
        bail!("tarball is {} bytes, over the {} byte cap", body.len(), max_bytes);
    }
    tokio::fs::write(&tarball_path, &body)
        .await
        .context("failed to write tarball to scratch directory")?;
    debug!(bytes = body.len(), url = tarball_url, "downloaded tarball");

    let extract_dir = dir.path().join("contents");
    tokio::fs::create_dir(&extract_dir)
        .await
        .context("failed to create extraction directory")?;

    extract(&tarball_path, &extract_dir, extract_timeout).await?;

    // npm tarballs wrap everything in a single "package/" directory; use
    // it as the root when present.
    let package_dir = extract_dir.join("package");
    let root = if package_dir.is_dir() {
        package_dir
    } else {
        extract_dir
    };

    Ok(Workspace { dir, root })
}

async fn extract(tarball: &Path, dest: &Path, timeout: Duration) -> Result<()> {
    let child = Command::new("tar")
        .arg("-xzf")
        .arg(tarball)
        .arg("-C")
        .arg(dest)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Ok(result) => result.context("failed to execute tar. Is tar installed?")?,
        Err(_) => bail!("tarball extraction timed out after {:?}", timeout),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, "tar exited with an error");
        bail!("tarball extraction failed: {}", stderr.trim());
    }
    Ok(())
}

//! Named byte-blob store the engine reads inputs from and writes outputs to.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use sidebyside_common::error::{ComposeError, ComposeResult};

/// Flat, name-addressed staging store.
///
/// Names are bare file names; nested paths are rejected.
#[async_trait::async_trait]
pub trait Workspace: Send + Sync {
    /// Store `bytes` under `name`, replacing any previous blob.
    async fn write(&self, name: &str, bytes: &[u8]) -> ComposeResult<()>;

    /// Read back a blob. Fails with `OutputNotFound` if it does not exist.
    async fn read(&self, name: &str) -> ComposeResult<Vec<u8>>;

    /// Delete a blob. Removing a missing blob is not an error.
    async fn remove(&self, name: &str) -> ComposeResult<()>;
}

/// Reject names that could escape the workspace or collide with temp files.
pub fn validate_name(name: &str) -> ComposeResult<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0'])
    {
        return Err(ComposeError::invalid_input(format!(
            "Invalid workspace name: {name:?}"
        )));
    }
    Ok(())
}

static TEMPORARY_SEQ: AtomicU64 = AtomicU64::new(0);

/// Directory-backed workspace.
///
/// Writes land in a hidden `.partial` file first and are renamed into place,
/// so readers only ever see complete blobs.
///
/// A workspace made with [`DirWorkspace::temporary`] owns its directory and
/// deletes it on drop. One opened at a given path leaves it in place.
#[derive(Debug)]
pub struct DirWorkspace {
    root: PathBuf,
    owned: bool,
}

impl DirWorkspace {
    /// Open (creating if needed) a workspace rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> ComposeResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root, owned: false })
    }

    /// Create a fresh directory under the system temp dir, removed on drop.
    ///
    /// Names are `<prefix>-<pid>-<seq>`, unique within and across processes.
    pub async fn temporary(prefix: &str) -> ComposeResult<Self> {
        let seq = TEMPORARY_SEQ.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!("{prefix}-{}-{seq}", std::process::id()));
        tokio::fs::create_dir(&root).await?;
        Ok(Self { root, owned: true })
    }

    /// Workspace root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, name: &str) -> ComposeResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

impl Drop for DirWorkspace {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => tracing::debug!(root = %self.root.display(), "Removed temporary workspace"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                root = %self.root.display(),
                error = %e,
                "Failed to remove temporary workspace"
            ),
        }
    }
}

#[async_trait::async_trait]
impl Workspace for DirWorkspace {
    async fn write(&self, name: &str, bytes: &[u8]) -> ComposeResult<()> {
        let target = self.path_of(name)?;
        let partial = self.root.join(format!(".{name}.partial"));
        tokio::fs::write(&partial, bytes).await?;
        tokio::fs::rename(&partial, &target).await?;
        tracing::debug!(name, bytes = bytes.len(), "Staged workspace blob");
        Ok(())
    }

    async fn read(&self, name: &str) -> ComposeResult<Vec<u8>> {
        let path = self.path_of(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ComposeError::output_not_found(name))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, name: &str) -> ComposeResult<()> {
        let path = self.path_of(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process workspace for engines that keep media in memory.
#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous read, for engines running inside a blocking section.
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        let blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs.get(name).cloned()
    }

    /// Synchronous write counterpart of [`MemoryWorkspace::get`].
    pub fn put(&self, name: &str, bytes: Vec<u8>) {
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs.insert(name.to_string(), bytes);
    }
}

#[async_trait::async_trait]
impl Workspace for MemoryWorkspace {
    async fn write(&self, name: &str, bytes: &[u8]) -> ComposeResult<()> {
        validate_name(name)?;
        self.put(name, bytes.to_vec());
        Ok(())
    }

    async fn read(&self, name: &str) -> ComposeResult<Vec<u8>> {
        validate_name(name)?;
        self.get(name)
            .ok_or_else(|| ComposeError::output_not_found(name))
    }

    async fn remove(&self, name: &str) -> ComposeResult<()> {
        validate_name(name)?;
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "sidebyside-workspace-test-{tag}-{}",
            std::process::id()
        ))
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("before.mp4").is_ok());
        assert!(validate_name("label_font.ttf").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../etc/passwd").is_err());
        assert!(validate_name("nested/output.gif").is_err());
        assert!(validate_name(".output.gif.partial").is_err());
    }

    #[tokio::test]
    async fn test_dir_workspace_overwrites_and_reads_back() {
        let root = scratch_dir("overwrite");
        let ws = DirWorkspace::open(&root).await.unwrap();

        ws.write("before.mp4", b"first").await.unwrap();
        ws.write("before.mp4", b"second").await.unwrap();
        assert_eq!(ws.read("before.mp4").await.unwrap(), b"second");

        let leftovers: Vec<_> = std::fs::read_dir(&root)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_dir_workspace_missing_output() {
        let root = scratch_dir("missing");
        let ws = DirWorkspace::open(&root).await.unwrap();

        let err = ws.read("output.gif").await.unwrap_err();
        assert!(matches!(err, ComposeError::OutputNotFound { ref name } if name == "output.gif"));

        ws.remove("output.gif").await.unwrap();
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_temporary_workspace_is_removed_on_drop() {
        let first = DirWorkspace::temporary("sidebyside-workspace-test").await.unwrap();
        let second = DirWorkspace::temporary("sidebyside-workspace-test").await.unwrap();
        assert_ne!(first.root(), second.root());

        first.write("output.gif", b"gif").await.unwrap();
        let root = first.root().to_path_buf();
        assert!(root.join("output.gif").is_file());

        drop(first);
        assert!(!root.exists());
        assert!(second.root().is_dir());
    }

    #[tokio::test]
    async fn test_opened_workspace_survives_drop() {
        let root = scratch_dir("kept");
        let ws = DirWorkspace::open(&root).await.unwrap();
        ws.write("before.mp4", b"clip").await.unwrap();
        drop(ws);

        assert!(root.join("before.mp4").is_file());
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_memory_workspace_remove_is_idempotent() {
        let ws = MemoryWorkspace::new();
        ws.write("output.mp4", b"data").await.unwrap();
        ws.remove("output.mp4").await.unwrap();
        ws.remove("output.mp4").await.unwrap();
        assert!(matches!(
            ws.read("output.mp4").await,
            Err(ComposeError::OutputNotFound { .. })
        ));
    }
}

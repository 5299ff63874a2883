use super::ObjectStore;
use crate::error::{StepError, StepResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Filesystem-backed object store rooted at a directory.
///
/// Objects live at `root/<bucket>/<key>`. Writes go through a temp file and a
/// rename so a reader never sees a half-copied object.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }

    /// Keys currently stored in a bucket, sorted
    pub fn list(&self, bucket: &str) -> std::io::Result<Vec<String>> {
        let bucket_root = self.root.join(bucket);
        let mut keys = Vec::new();
        if bucket_root.exists() {
            collect_keys(&bucket_root, &bucket_root, &mut keys)?;
        }
        keys.sort();
        Ok(keys)
    }
}

fn collect_keys(base: &Path, dir: &Path, keys: &mut Vec<String>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_keys(base, &path, keys)?;
        } else if let Ok(relative) = path.strip_prefix(base) {
            keys.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, bucket: &str, key: &str, local_path: &Path) -> StepResult<String> {
        let target = self.object_path(bucket, key);
        let staging = target.with_extension("uploading");

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StepError::local_io(&format!("create {}", parent.display()), e))?;
        }

        if let Err(error) = tokio::fs::copy(local_path, &staging).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(StepError::local_io(
                &format!("copy {} to object store", local_path.display()),
                error,
            ));
        }

        if let Err(error) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(StepError::local_io(
                &format!("publish {}", target.display()),
                error,
            ));
        }

        Ok(format!("file://{}", target.display()))
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

//! JSON File Cause Store
//!
//! Durable `CauseRepository` adapter: records live in memory and the full set
//! is rewritten to a JSON file on every mutation (write to a temp file, then
//! rename, so a crash never leaves a half-written file behind).
//!
//! A mutation reaches memory only after its file write succeeded, so a failed
//! write leaves both the file and the in-memory view as they were.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

use super::memory::InMemoryCauseRepository;
use crate::domain::{Cause, CauseId, CauseRepository};
use crate::error::{Error, Result};

/// File-backed cause store
pub struct JsonFileCauseRepository {
    path: PathBuf,
    records: InMemoryCauseRepository,
    write_lock: Mutex<()>,
}

impl JsonFileCauseRepository {
    /// Open the store at `path`, loading existing records if the file exists.
    #[instrument(skip_all)]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let causes: Vec<Cause> = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Vec::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(Error::Store(format!(
                    "Failed to read store file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        info!(path = %path.display(), "Loaded {} causes from store file", causes.len());

        Ok(Self {
            path,
            records: InMemoryCauseRepository::with_causes(causes)?,
            write_lock: Mutex::new(()),
        })
    }

    /// Replace the file contents with `causes`.
    async fn write_file(&self, causes: &[Cause]) -> Result<()> {
        let json = serde_json::to_vec_pretty(causes)?;
        let tmp = self.path.with_extension("json.tmp");

        let written = match tokio::fs::write(&tmp, json).await {
            Ok(()) => tokio::fs::rename(&tmp, &self.path).await,
            Err(e) => Err(e),
        };

        written.map_err(|e| {
            error!(path = %self.path.display(), error = %e, "Store file write failed");
            Error::Store(format!(
                "Failed to write store file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!(path = %self.path.display(), "Store file flushed");
        Ok(())
    }
}

#[async_trait]
impl CauseRepository for JsonFileCauseRepository {
    async fn find_all(&self) -> Result<Vec<Cause>> {
        self.records.find_all().await
    }

    async fn find_by_id(&self, id: CauseId) -> Result<Option<Cause>> {
        self.records.find_by_id(id).await
    }

    async fn save(&self, cause: Cause) -> Result<Cause> {
        let _write = self.write_lock.lock().await;

        // The peeked id stays free while the write lock is held
        let staged = self.records.assign_id(cause)?;
        let mut next = self.records.snapshot();
        next.retain(|c| c.id != staged.id);
        next.push(staged.clone());
        next.sort_by_key(|c| c.id);

        self.write_file(&next).await?;
        self.records.save(staged).await
    }

    async fn delete_by_id(&self, id: CauseId) -> Result<bool> {
        let _write = self.write_lock.lock().await;

        let mut next = self.records.snapshot();
        let before = next.len();
        next.retain(|c| c.id != Some(id));

        if next.len() != before {
            self.write_file(&next).await?;
        }
        self.records.delete_by_id(id).await
    }

    async fn count(&self) -> Result<usize> {
        self.records.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileCauseRepository::open(dir.path().join("causes.json"))
            .await
            .unwrap();

        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("causes.json");

        let repo = JsonFileCauseRepository::open(&path).await.unwrap();
        let a = repo.save(Cause::new("a").with_total(1.25)).await.unwrap();
        let b = repo.save(Cause::new("b")).await.unwrap();
        repo.delete_by_id(a.id.unwrap()).await.unwrap();
        drop(repo);

        let reopened = JsonFileCauseRepository::open(&path).await.unwrap();
        assert_eq!(reopened.find_all().await.unwrap(), vec![b]);

        // Sequence resumes after the largest persisted id
        let c = reopened.save(Cause::new("c")).await.unwrap();
        assert_eq!(c.id, Some(CauseId(3)));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("causes.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let result = JsonFileCauseRepository::open(&path).await;
        assert!(matches!(result, Err(crate::Error::Json(_))));
    }

    #[tokio::test]
    async fn test_failed_save_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("missing_dir");
        let repo = JsonFileCauseRepository::open(parent.join("causes.json"))
            .await
            .unwrap();

        let result = repo.save(Cause::new("ghost")).await;

        assert!(matches!(result, Err(Error::Store(_))));
        assert!(repo.find_all().await.unwrap().is_empty());

        // Once the directory exists the id that failed is handed out again
        tokio::fs::create_dir(&parent).await.unwrap();
        let saved = repo.save(Cause::new("real")).await.unwrap();
        assert_eq!(saved.id, Some(CauseId(1)));
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_record() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("store");
        tokio::fs::create_dir(&parent).await.unwrap();
        let repo = JsonFileCauseRepository::open(parent.join("causes.json"))
            .await
            .unwrap();
        let saved = repo.save(Cause::new("kept")).await.unwrap();

        tokio::fs::remove_dir_all(&parent).await.unwrap();
        let result = repo.delete_by_id(saved.id.unwrap()).await;

        assert!(matches!(result, Err(Error::Store(_))));
        assert_eq!(repo.find_all().await.unwrap(), vec![saved]);
    }

    #[tokio::test]
    async fn test_failed_update_keeps_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("store");
        tokio::fs::create_dir(&parent).await.unwrap();
        let repo = JsonFileCauseRepository::open(parent.join("causes.json"))
            .await
            .unwrap();
        let saved = repo.save(Cause::new("v1")).await.unwrap();

        tokio::fs::remove_dir_all(&parent).await.unwrap();
        let mut changed = saved.clone();
        changed.name = "v2".to_string();

        assert!(repo.save(changed).await.is_err());
        assert_eq!(
            repo.find_by_id(saved.id.unwrap()).await.unwrap(),
            Some(saved)
        );
    }
}

//! Seed Data Loader
//!
//! Reads an initial set of causes from a JSON or YAML file (chosen by file
//! extension) and writes them into a store at startup.

use std::path::Path;

use tracing::{info, instrument};

use crate::domain::{Cause, CauseRepository};
use crate::error::{Error, Result};

/// Parse a seed file. `.yaml`/`.yml` are read as YAML, everything else as JSON.
#[instrument]
pub async fn load_seed_file(path: &Path) -> Result<Vec<Cause>> {
    let bytes = tokio::fs::read(path).await?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );

    let causes: Vec<Cause> = if is_yaml {
        serde_yaml::from_slice(&bytes)?
    } else {
        serde_json::from_slice(&bytes)?
    };

    Ok(causes)
}

/// Write `causes` into `repo`, skipping any whose id is already present.
///
/// Returns how many causes were inserted.
#[instrument(skip_all, fields(count = causes.len()))]
pub async fn seed_repository<R: CauseRepository + ?Sized>(
    repo: &R,
    causes: Vec<Cause>,
) -> Result<usize> {
    let mut inserted = 0;
    for cause in causes {
        if let Some(id) = cause.id {
            if repo.find_by_id(id).await?.is_some() {
                continue;
            }
        }
        if cause.name.trim().is_empty() {
            return Err(Error::Validation(
                "seed causes must have a non-empty name".to_string(),
            ));
        }
        repo.save(cause).await?;
        inserted += 1;
    }

    info!("Seeded {} causes", inserted);
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryCauseRepository;
    use crate::domain::CauseId;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_load_json_seed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        tokio::fs::write(
            &path,
            r#"[{"id": 1, "name": "drought", "frequency": 3, "total": 10.5},
                {"name": "flood"}]"#,
        )
        .await
        .unwrap();

        let causes = load_seed_file(&path).await.unwrap();

        assert_eq!(causes.len(), 2);
        assert_eq!(causes[0].id, Some(CauseId(1)));
        assert_eq!(causes[0].total, 10.5);
        assert!(causes[1].id.is_none());
    }

    #[tokio::test]
    async fn test_load_yaml_seed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.yaml");
        tokio::fs::write(
            &path,
            "- name: drought\n  description: dry\n  frequency: 2\n- name: fire\n",
        )
        .await
        .unwrap();

        let causes = load_seed_file(&path).await.unwrap();

        assert_eq!(causes.len(), 2);
        assert_eq!(causes[0].description, "dry");
        assert_eq!(causes[1].name, "fire");
    }

    #[tokio::test]
    async fn test_seed_skips_existing_ids() {
        let repo = InMemoryCauseRepository::with_causes(vec![Cause::new("kept").with_id(1)]).unwrap();

        let inserted = seed_repository(
            &repo,
            vec![Cause::new("dup").with_id(1), Cause::new("new")],
        )
        .await
        .unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(repo.count().await.unwrap(), 2);
        assert_eq!(
            repo.find_by_id(CauseId(1)).await.unwrap().unwrap().name,
            "kept"
        );
    }

    #[tokio::test]
    async fn test_seed_rejects_unnamed_cause() {
        let repo = InMemoryCauseRepository::new();

        let result = seed_repository(&repo, vec![Cause::new("  ")]).await;

        assert_matches!(result, Err(Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_seed_with_largest_id_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        tokio::fs::write(&path, format!(r#"[{{"id": {}, "name": "edge"}}]"#, i64::MAX))
            .await
            .unwrap();
        let repo = InMemoryCauseRepository::new();

        let causes = load_seed_file(&path).await.unwrap();
        let result = seed_repository(&repo, causes).await;

        assert_matches!(result, Err(Error::Validation(_)));
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}

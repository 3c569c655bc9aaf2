use async_trait::async_trait;
use shared_types::{Acknowledgement, CollectionResult, FileGroup, SourcePath};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use walkdir::{DirEntry, WalkDir};

use super::{Backend, BackendError, CollectionReport};
use crate::runtime::PushChannel;

/// Knobs for the filesystem walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectOptions {
    /// `None` walks the whole tree
    pub max_depth: Option<usize>,
    pub follow_links: bool,
    pub include_hidden: bool,
}

/// Currently selected collection root. Every validation starts a new
/// generation; a walk only reports if its generation is still current.
#[derive(Debug, Default)]
struct Selection {
    root: Option<PathBuf>,
    generation: u64,
}

/// Filesystem backend. Collection runs on the blocking pool and reports on the
/// `collection_completed` push channel.
pub struct LocalBackend {
    options: CollectOptions,
    completions: PushChannel<CollectionReport>,
    selection: Arc<Mutex<Selection>>,
}

impl LocalBackend {
    pub fn new(options: CollectOptions, completions: PushChannel<CollectionReport>) -> Self {
        Self {
            options,
            completions,
            selection: Arc::default(),
        }
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn validate_source(&self, path: SourcePath) -> Result<SourcePath, BackendError> {
        let generation = {
            let mut selection = self.selection.lock().await;
            selection.generation += 1;
            selection.root = None;
            selection.generation
        };

        let canonical = tokio::fs::canonicalize(path.as_str())
            .await
            .map_err(|e| BackendError::Rejected {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        let mut selection = self.selection.lock().await;
        if selection.generation != generation {
            tracing::debug!(source = %canonical.display(), "Validation superseded by a newer source");
            return Err(BackendError::Rejected {
                path: path.to_string(),
                reason: "superseded by a newer source".to_string(),
            });
        }
        tracing::info!(source = %canonical.display(), generation, "Source validated");
        let validated = SourcePath::new(canonical.display().to_string());
        selection.root = Some(canonical);
        Ok(validated)
    }

    async fn begin_collection(&self) -> Result<Acknowledgement, BackendError> {
        let (root, generation) = {
            let selection = self.selection.lock().await;
            let root = selection.root.clone().ok_or(BackendError::NoSourceSelected)?;
            (root, selection.generation)
        };

        tokio::fs::metadata(&root)
            .await
            .map_err(|e| BackendError::Unreadable {
                path: root.display().to_string(),
                reason: e.to_string(),
            })?;

        let options = self.options.clone();
        let completions = self.completions.clone();
        let selection = Arc::clone(&self.selection);
        tokio::spawn(async move {
            let walk_root = root.clone();
            let outcome =
                match tokio::task::spawn_blocking(move || collect_files(&walk_root, &options)).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(root = %root.display(), error = %e, "Collection task panicked");
                        Err(BackendError::Unavailable {
                            reason: format!("collection task failed: {e}"),
                        })
                    }
                };
            let source = SourcePath::new(root.display().to_string());
            let report = CollectionReport { source, outcome };
            publish_if_current(&selection, generation, &completions, report).await;
        });

        Ok(Acknowledgement::now())
    }
}

/// Publish `report` unless a newer source was validated since the walk began.
async fn publish_if_current(
    selection: &Mutex<Selection>,
    generation: u64,
    completions: &PushChannel<CollectionReport>,
    report: CollectionReport,
) -> bool {
    let current = selection.lock().await.generation;
    if current != generation {
        tracing::debug!(
            source = %report.source,
            generation,
            current,
            "Discarding collection of a superseded source"
        );
        return false;
    }

    match &report.outcome {
        Ok(result) => tracing::info!(
            source = %report.source,
            file_count = result.file_count,
            groups = result.file_groups.len(),
            "Collection finished"
        ),
        Err(e) => tracing::warn!(source = %report.source, error = %e, "Collection failed"),
    }
    completions.publish(report);
    true
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Walk `root` and group files sharing a directory and stem.
///
/// A single file root yields one group. An unreadable root fails the whole
/// collection; unreadable entries below it are skipped with a warning.
pub fn collect_files(root: &Path, options: &CollectOptions) -> Result<CollectionResult, BackendError> {
    let mut walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .sort_by_file_name();
    if let Some(depth) = options.max_depth {
        walker = walker.max_depth(depth);
    }

    let include_hidden = options.include_hidden;
    let mut groups: BTreeMap<(PathBuf, String), Vec<String>> = BTreeMap::new();
    let mut file_count = 0u64;

    for entry in walker
        .into_iter()
        .filter_entry(|e| include_hidden || !is_hidden(e))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(BackendError::Unreadable {
                    path: root.display().to_string(),
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        groups
            .entry((dir, stem))
            .or_default()
            .push(path.display().to_string());
        file_count += 1;
    }

    let file_groups = groups
        .into_iter()
        .map(|((dir, stem), paths)| FileGroup {
            key: dir.join(stem).display().to_string(),
            paths,
        })
        .collect();

    Ok(CollectionResult {
        file_count,
        file_groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("IMG_1.jpg"), b"jpg").unwrap();
        fs::write(dir.path().join("IMG_1.xmp"), b"xmp").unwrap();
        fs::write(dir.path().join("IMG_2.jpg"), b"jpg").unwrap();
        fs::write(dir.path().join(".DS_Store"), b"junk").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("IMG_3.cr2"), b"raw").unwrap();
        dir
    }

    #[test]
    fn test_groups_by_directory_and_stem() {
        let dir = fixture();
        let result = collect_files(dir.path(), &CollectOptions::default()).unwrap();

        assert_eq!(result.file_count, 4);
        assert_eq!(result.file_groups.len(), 3);
        let first = &result.file_groups[0];
        assert!(first.key.ends_with("IMG_1"));
        assert_eq!(first.paths.len(), 2);
        assert!(first.paths[0].ends_with("IMG_1.jpg"));
        assert!(first.paths[1].ends_with("IMG_1.xmp"));
    }

    #[test]
    fn test_hidden_files_opt_in() {
        let dir = fixture();
        let options = CollectOptions {
            include_hidden: true,
            ..Default::default()
        };
        let result = collect_files(dir.path(), &options).unwrap();
        assert_eq!(result.file_count, 5);
    }

    #[test]
    fn test_max_depth_limits_walk() {
        let dir = fixture();
        let options = CollectOptions {
            max_depth: Some(1),
            ..Default::default()
        };
        let result = collect_files(dir.path(), &options).unwrap();
        assert_eq!(result.file_count, 3);
        assert!(result.file_groups.iter().all(|g| !g.key.contains("nested")));
    }

    #[test]
    fn test_single_file_root() {
        let dir = fixture();
        let result = collect_files(&dir.path().join("IMG_2.jpg"), &CollectOptions::default()).unwrap();
        assert_eq!(result.file_count, 1);
        assert_eq!(result.file_groups.len(), 1);
    }

    #[tokio::test]
    async fn test_validate_rejects_missing_path() {
        let backend = LocalBackend::new(
            CollectOptions::default(),
            PushChannel::new("collection_completed", 4),
        );
        let err = backend
            .validate_source(SourcePath::from("/definitely/not/here"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_collection_requires_validated_source() {
        let backend = LocalBackend::new(
            CollectOptions::default(),
            PushChannel::new("collection_completed", 4),
        );
        let err = backend.begin_collection().await.unwrap_err();
        assert_eq!(err, BackendError::NoSourceSelected);
    }

    #[tokio::test]
    async fn test_collection_result_is_pushed() {
        let dir = fixture();
        let completions = PushChannel::new("collection_completed", 4);
        let (mut rx, _guard) = completions.subscribe();
        let backend = LocalBackend::new(CollectOptions::default(), completions);

        let path = dir.path().display().to_string();
        backend.validate_source(SourcePath::new(path)).await.unwrap();
        backend.begin_collection().await.unwrap();

        let report = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.outcome.unwrap().file_count, 4);
    }

    #[test]
    fn test_missing_root_fails_collection() {
        let dir = fixture();
        let missing = dir.path().join("gone");
        let err = collect_files(&missing, &CollectOptions::default()).unwrap_err();
        match err {
            BackendError::Unreadable { path, .. } => assert_eq!(path, missing.display().to_string()),
            other => panic!("expected Unreadable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_superseded_collection_is_not_published() {
        let first = fixture();
        let second = fixture();
        let completions = PushChannel::new("collection_completed", 4);
        let (mut rx, _guard) = completions.subscribe();
        let backend = LocalBackend::new(CollectOptions::default(), completions.clone());

        let first_source = backend
            .validate_source(SourcePath::new(first.path().display().to_string()))
            .await
            .unwrap();
        let first_generation = backend.selection.lock().await.generation;
        let second_source = backend
            .validate_source(SourcePath::new(second.path().display().to_string()))
            .await
            .unwrap();

        // a walk of the first root finishing after the second was selected
        let stale = CollectionReport::succeeded(
            first_source,
            collect_files(first.path(), &CollectOptions::default()).unwrap(),
        );
        assert!(!publish_if_current(&backend.selection, first_generation, &completions, stale).await);

        backend.begin_collection().await.unwrap();
        let report = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.source, second_source);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_root_removed_before_walk_is_reported_as_failure() {
        let dir = fixture();
        let root = dir.path().join("nested");
        let completions = PushChannel::new("collection_completed", 4);
        let (mut rx, _guard) = completions.subscribe();
        let backend = LocalBackend::new(CollectOptions::default(), completions.clone());

        let source = backend
            .validate_source(SourcePath::new(root.display().to_string()))
            .await
            .unwrap();
        let generation = backend.selection.lock().await.generation;
        fs::remove_dir_all(&root).unwrap();

        let outcome = collect_files(Path::new(source.as_str()), &CollectOptions::default());
        let report = CollectionReport { source: source.clone(), outcome };
        assert!(publish_if_current(&backend.selection, generation, &completions, report).await);

        let report = rx.recv().await.unwrap();
        assert_eq!(report.source, source);
        assert!(matches!(report.outcome, Err(BackendError::Unreadable { .. })));
    }
}

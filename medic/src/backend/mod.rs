//! Backend collaborators - path validation, file collection and push sources
//!
//! The orchestration core only sees the [`Backend`] trait and the push
//! channels bundled in [`Host`]. Two implementations are provided:
//! [`LocalBackend`] walks the real filesystem, [`ScriptedBackend`] is an
//! in-memory double driven by tests.

mod local;
mod scripted;

use async_trait::async_trait;
use serde::Serialize;
use shared_types::{Acknowledgement, CollectionResult, SourcePath};
use std::sync::Arc;

use crate::runtime::PushChannel;

pub use local::{CollectOptions, LocalBackend};
pub use scripted::{BackendCall, ScriptedBackend};

/// OS push channel name
pub const PATH_DROPPED: &str = "path_dropped";
/// Backend push channel name
pub const COLLECTION_COMPLETED: &str = "collection_completed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendError {
    #[error("{path} was rejected: {reason}")]
    Rejected { path: String, reason: String },
    #[error("no source has been validated")]
    NoSourceSelected,
    #[error("cannot read {path}: {reason}")]
    Unreadable { path: String, reason: String },
    #[error("backend unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Payload of the `collection_completed` push channel.
///
/// Tagged with the root that was walked, so a report for a source that is no
/// longer selected can be told apart from the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionReport {
    pub source: SourcePath,
    pub outcome: Result<CollectionResult, BackendError>,
}

impl CollectionReport {
    pub fn succeeded(source: SourcePath, result: CollectionResult) -> Self {
        Self {
            source,
            outcome: Ok(result),
        }
    }

    pub fn failed(source: SourcePath, error: BackendError) -> Self {
        Self {
            source,
            outcome: Err(error),
        }
    }
}

/// Commands the orchestration core issues to the backend.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Check a dropped path; on success the backend remembers it as the
    /// collection root.
    async fn validate_source(&self, path: SourcePath) -> Result<SourcePath, BackendError>;

    /// Start collecting files under the validated source. The result, success
    /// or failure, arrives later on the `collection_completed` push channel.
    async fn begin_collection(&self) -> Result<Acknowledgement, BackendError>;
}

/// Collaborators shared by every machine of a session.
#[derive(Clone)]
pub struct Host {
    pub backend: Arc<dyn Backend>,
    /// OS drag-and-drop notifications
    pub drops: PushChannel<Vec<String>>,
    pub completions: PushChannel<CollectionReport>,
}

impl Host {
    pub fn new(
        backend: Arc<dyn Backend>,
        drops: PushChannel<Vec<String>>,
        completions: PushChannel<CollectionReport>,
    ) -> Self {
        Self {
            backend,
            drops,
            completions,
        }
    }

    /// Filesystem-backed host with fresh push channels.
    pub fn local(options: CollectOptions, capacity: usize) -> Self {
        let drops = PushChannel::new(PATH_DROPPED, capacity);
        let completions = PushChannel::new(COLLECTION_COMPLETED, capacity);
        let backend = LocalBackend::new(options, completions.clone());
        Self::new(Arc::new(backend), drops, completions)
    }

    /// Host around the scripted double; returns the double for steering.
    pub fn scripted(capacity: usize) -> (Self, ScriptedBackend) {
        let drops = PushChannel::new(PATH_DROPPED, capacity);
        let completions = PushChannel::new(COLLECTION_COMPLETED, capacity);
        let backend = ScriptedBackend::new(completions.clone());
        (Self::new(Arc::new(backend.clone()), drops, completions), backend)
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("drops", &self.drops)
            .field("completions", &self.completions)
            .finish_non_exhaustive()
    }
}

use async_trait::async_trait;
use shared_types::{Acknowledgement, CollectionResult, SourcePath};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use super::{Backend, BackendError, CollectionReport};
use crate::runtime::PushChannel;

/// A call the scripted backend received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    ValidateSource(SourcePath),
    BeginCollection,
}

#[derive(Debug, Default)]
struct Script {
    rejections: HashMap<String, String>,
    collection_failure: Option<BackendError>,
    selected: Option<SourcePath>,
    calls: Vec<BackendCall>,
}

/// In-memory backend for tests.
///
/// Validation echoes the path back unless told to reject it. Collection only
/// acknowledges; the test decides when (and whether) to push a report on the
/// completions channel.
#[derive(Clone)]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
    gate: watch::Sender<bool>,
    completions: PushChannel<CollectionReport>,
}

impl ScriptedBackend {
    pub fn new(completions: PushChannel<CollectionReport>) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            script: Arc::default(),
            gate,
            completions,
        }
    }

    fn with_script<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut script = match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut script)
    }

    pub fn reject(&self, path: impl Into<String>, reason: impl Into<String>) {
        self.with_script(|s| s.rejections.insert(path.into(), reason.into()));
    }

    /// Make the next `begin_collection` calls fail outright.
    pub fn fail_collection(&self, error: BackendError) {
        self.with_script(|s| s.collection_failure = Some(error));
    }

    /// Keep validation requests outstanding until [`Self::release_validations`].
    pub fn hold_validations(&self) {
        self.gate.send_replace(false);
    }

    pub fn release_validations(&self) {
        self.gate.send_replace(true);
    }

    /// Push a result for the selected source as the real backend would once
    /// done. Returns how many listeners received it.
    pub fn complete_collection(&self, result: CollectionResult) -> usize {
        self.report_selected(|source| CollectionReport::succeeded(source, result))
    }

    /// Push a failure for the selected source, as when the walk breaks after
    /// `begin_collection` was acknowledged.
    pub fn abort_collection(&self, error: BackendError) -> usize {
        self.report_selected(|source| CollectionReport::failed(source, error))
    }

    /// Push an arbitrary report, e.g. one for a source that is no longer selected.
    pub fn push_report(&self, report: CollectionReport) -> usize {
        self.completions.publish(report)
    }

    fn report_selected(&self, report: impl FnOnce(SourcePath) -> CollectionReport) -> usize {
        match self.selected() {
            Some(source) => self.completions.publish(report(source)),
            None => {
                tracing::debug!("No source selected; collection report not pushed");
                0
            }
        }
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.with_script(|s| s.calls.clone())
    }

    pub fn selected(&self) -> Option<SourcePath> {
        self.with_script(|s| s.selected.clone())
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn validate_source(&self, path: SourcePath) -> Result<SourcePath, BackendError> {
        self.with_script(|s| s.calls.push(BackendCall::ValidateSource(path.clone())));

        let mut gate = self.gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(BackendError::Unavailable {
                reason: "backend shut down".to_string(),
            });
        }

        self.with_script(|s| match s.rejections.get(path.as_str()) {
            Some(reason) => Err(BackendError::Rejected {
                path: path.to_string(),
                reason: reason.clone(),
            }),
            None => {
                s.selected = Some(path.clone());
                Ok(path.clone())
            }
        })
    }

    async fn begin_collection(&self) -> Result<Acknowledgement, BackendError> {
        self.with_script(|s| {
            s.calls.push(BackendCall::BeginCollection);
            if let Some(error) = s.collection_failure.clone() {
                return Err(error);
            }
            if s.selected.is_none() {
                return Err(BackendError::NoSourceSelected);
            }
            Ok(Acknowledgement::now())
        })
    }
}

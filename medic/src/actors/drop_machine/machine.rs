use serde::Serialize;
use shared_types::{
    Acknowledgement, CollectionResult, DropOutput, Notice, NoticeKind, SourcePath,
};
use std::sync::Arc;
use strum::IntoStaticStr;

use crate::backend::{Backend, BackendError, CollectionReport, Host};
use crate::runtime::{
    ChildFailure, Effects, InvariantViolation, Invoke, Listen, Machine, PushChannel, StateNode,
    Transition,
};

// ============================================================================
// States, Context & Events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DropState {
    Idle,
    Validating,
    Collecting,
    Done,
}

impl StateNode for DropState {
    fn path(&self) -> Vec<&'static str> {
        vec![(*self).into()]
    }

    fn is_final(&self) -> bool {
        matches!(self, DropState::Done)
    }
}

/// Owned by the drop machine; discarded when it stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DropContext {
    pub source: Option<SourcePath>,
    pub validated_source: Option<SourcePath>,
    pub collection: Option<CollectionResult>,
}

impl DropContext {
    pub fn files_count(&self) -> Option<u64> {
        self.collection.as_ref().map(|c| c.file_count)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropEvent {
    InputDropped { paths: Vec<String> },
    Cancel,
    SourceValidated(SourcePath),
    ValidationFailed(BackendError),
    /// Reply of `begin_collection`; informational only
    CollectionStarted(Acknowledgement),
    /// `begin_collection` was refused or its task died
    CollectionFailed(BackendError),
    /// Pushed on `collection_completed`
    CollectionReported(CollectionReport),
}

/// Sent to the invoking parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropSignal {
    NavigateIntro,
}

// ============================================================================
// Guards & Actions
// ============================================================================

fn single_path(_: &DropContext, event: &DropEvent) -> bool {
    matches!(event, DropEvent::InputDropped { paths } if paths.len() == 1)
}

fn reports_validated_source(ctx: &DropContext, event: &DropEvent) -> bool {
    matches!(event, DropEvent::CollectionReported(report)
        if ctx.validated_source.as_ref() == Some(&report.source))
}

fn collected_validated_source(ctx: &DropContext, event: &DropEvent) -> bool {
    reports_validated_source(ctx, event)
        && matches!(event, DropEvent::CollectionReported(report) if report.outcome.is_ok())
}

fn assign_source(ctx: &mut DropContext, event: &DropEvent, _: &mut Effects<DropMachine>) {
    if let DropEvent::InputDropped { paths } = event {
        if let [path] = paths.as_slice() {
            ctx.source = Some(SourcePath::new(path.clone()));
            ctx.validated_source = None;
        }
    }
}

fn warn_drop_count(_: &mut DropContext, event: &DropEvent, effects: &mut Effects<DropMachine>) {
    if let DropEvent::InputDropped { paths } = event {
        effects.notify(Notice::warning(
            NoticeKind::UserInput,
            format!("Drop exactly one path ({} dropped)", paths.len()),
        ));
    }
}

fn assign_validated(ctx: &mut DropContext, event: &DropEvent, _: &mut Effects<DropMachine>) {
    if let DropEvent::SourceValidated(path) = event {
        ctx.validated_source = Some(path.clone());
    }
}

fn surface_validation_error(_: &mut DropContext, event: &DropEvent, effects: &mut Effects<DropMachine>) {
    if let DropEvent::ValidationFailed(err) = event {
        effects.notify(Notice::error(
            NoticeKind::Validation,
            format!("Source rejected: {err}"),
        ));
    }
}

fn log_acknowledgement(ctx: &mut DropContext, event: &DropEvent, _: &mut Effects<DropMachine>) {
    if let DropEvent::CollectionStarted(ack) = event {
        tracing::debug!(
            source = ?ctx.validated_source,
            accepted_at = %ack.accepted_at,
            "Collection acknowledged; waiting for push"
        );
    }
}

fn assign_collection(ctx: &mut DropContext, event: &DropEvent, _: &mut Effects<DropMachine>) {
    if let DropEvent::CollectionReported(CollectionReport {
        outcome: Ok(result), ..
    }) = event
    {
        ctx.collection = Some(result.clone());
    }
}

fn surface_collection_error(ctx: &mut DropContext, event: &DropEvent, effects: &mut Effects<DropMachine>) {
    let error = match event {
        DropEvent::CollectionFailed(err) => Some(err),
        DropEvent::CollectionReported(CollectionReport { outcome: Err(err), .. }) => Some(err),
        _ => None,
    };
    if let Some(err) = error {
        effects.notify(Notice::error(
            NoticeKind::Collection,
            format!("Collection failed: {err}"),
        ));
    }
    ctx.source = None;
    ctx.validated_source = None;
}

fn discard_foreign_report(ctx: &mut DropContext, event: &DropEvent, _: &mut Effects<DropMachine>) {
    if let DropEvent::CollectionReported(report) = event {
        tracing::debug!(
            reported = %report.source,
            validated = ?ctx.validated_source,
            "Ignoring collection report for another source"
        );
    }
}

fn navigate_intro(_: &mut DropContext, _: &DropEvent, effects: &mut Effects<DropMachine>) {
    effects.send_parent(DropSignal::NavigateIntro);
}

fn task_panicked(failure: ChildFailure) -> BackendError {
    BackendError::Unavailable {
        reason: failure.to_string(),
    }
}

// ============================================================================
// Machine
// ============================================================================

/// Drop acquisition definition. Holds only its collaborators; all mutable
/// state lives in [`DropContext`].
pub struct DropMachine {
    backend: Arc<dyn Backend>,
    drops: PushChannel<Vec<String>>,
    completions: PushChannel<CollectionReport>,
}

impl DropMachine {
    pub fn new(host: &Host) -> Self {
        Self {
            backend: Arc::clone(&host.backend),
            drops: host.drops.clone(),
            completions: host.completions.clone(),
        }
    }
}

impl Machine for DropMachine {
    type State = DropState;
    type Context = DropContext;
    type Event = DropEvent;
    type Input = ();
    type Output = DropOutput;
    type Signal = DropSignal;

    const ID: &'static str = "drop";

    fn initial(&self, _: ()) -> (DropState, DropContext) {
        (DropState::Idle, DropContext::default())
    }

    fn transitions(&self, state: &DropState, event: &DropEvent) -> Vec<Transition<Self>> {
        use DropState::*;

        let mut candidates = match (state, event) {
            (Idle | Validating, DropEvent::InputDropped { .. }) => vec![
                Transition::to(Validating).when(single_path).then(assign_source),
                Transition::stay().then(warn_drop_count),
            ],
            (Validating, DropEvent::SourceValidated(_)) => {
                vec![Transition::to(Collecting).then(assign_validated)]
            }
            (Validating, DropEvent::ValidationFailed(_)) => {
                vec![Transition::stay().then(surface_validation_error)]
            }
            (Collecting, DropEvent::CollectionStarted(_)) => {
                vec![Transition::stay().then(log_acknowledgement)]
            }
            (Collecting, DropEvent::CollectionReported(_)) => vec![
                Transition::to(Done)
                    .when(collected_validated_source)
                    .then(assign_collection),
                Transition::to(Idle)
                    .when(reports_validated_source)
                    .then(surface_collection_error),
                Transition::stay().then(discard_foreign_report),
            ],
            (Collecting, DropEvent::CollectionFailed(_)) => {
                vec![Transition::to(Idle).then(surface_collection_error)]
            }
            _ => Vec::new(),
        };

        if matches!(event, DropEvent::Cancel) && !state.is_final() {
            candidates.push(Transition::stay().then(navigate_intro));
        }
        candidates
    }

    fn invoke(
        &self,
        node: &[&'static str],
        ctx: &DropContext,
    ) -> Result<Vec<Invoke<Self>>, InvariantViolation> {
        let backend = Arc::clone(&self.backend);
        match node {
            ["validating"] => {
                let source = ctx.source.clone().ok_or_else(|| {
                    InvariantViolation::new(Self::ID, "validating without a dropped source")
                })?;
                Ok(vec![Invoke::task(
                    "validate_source",
                    async move { backend.validate_source(source).await },
                    DropEvent::SourceValidated,
                    DropEvent::ValidationFailed,
                )
                .on_error(|failure| DropEvent::ValidationFailed(task_panicked(failure)))])
            }
            ["collecting"] => Ok(vec![Invoke::task(
                "begin_collection",
                async move { backend.begin_collection().await },
                DropEvent::CollectionStarted,
                DropEvent::CollectionFailed,
            )
            .on_error(|failure| DropEvent::CollectionFailed(task_panicked(failure)))]),
            _ => Ok(Vec::new()),
        }
    }

    fn listeners(&self) -> Vec<Listen<Self>> {
        vec![
            Listen::on(&self.drops, |paths| DropEvent::InputDropped { paths }),
            Listen::on(&self.completions, DropEvent::CollectionReported),
        ]
    }

    fn output(&self, ctx: &DropContext) -> Result<DropOutput, InvariantViolation> {
        let validated_source = ctx.validated_source.clone().ok_or_else(|| {
            InvariantViolation::new(Self::ID, "done without a validated source")
        })?;
        let collection = ctx
            .collection
            .clone()
            .ok_or_else(|| InvariantViolation::new(Self::ID, "done without a files count"))?;

        Ok(DropOutput {
            validated_source,
            files_count: collection.file_count,
            file_groups: collection.file_groups,
        })
    }
}

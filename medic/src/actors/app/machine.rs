use serde::Serialize;
use shared_types::{DropOutput, FileGroup, Notice, NoticeKind, RenameInput, SourcePath};
use std::convert::Infallible;

use crate::actors::drop_machine::{DropMachine, DropSignal};
use crate::actors::rename::{RenameWorkflowActor, RenameWorkflowArguments};
use crate::backend::Host;
use crate::runtime::{
    ChildFailure, Effects, InvariantViolation, Invoke, Machine, StateNode, Transition,
};

// ============================================================================
// States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenameStep {
    Drop,
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    Intro,
    Rename(RenameStep),
    Deduplicate,
}

impl StateNode for AppState {
    fn path(&self) -> Vec<&'static str> {
        match self {
            AppState::Intro => vec!["intro"],
            AppState::Rename(RenameStep::Drop) => vec!["rename", "drop"],
            AppState::Rename(RenameStep::Page) => vec!["rename", "page"],
            AppState::Deduplicate => vec!["deduplicate"],
        }
    }
}

// ============================================================================
// Context
// ============================================================================

/// Session data shared by the workflows.
///
/// The three fields only change together: filled from a completed drop, or
/// cleared when the user goes back to acquisition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppContext {
    source: Option<SourcePath>,
    file_groups: Option<Vec<FileGroup>>,
    files_count: Option<u64>,
}

impl AppContext {
    pub fn replace_with(&mut self, output: &DropOutput) {
        *self = Self {
            source: Some(output.validated_source.clone()),
            file_groups: Some(output.file_groups.clone()),
            files_count: Some(output.files_count),
        };
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn source(&self) -> Option<&SourcePath> {
        self.source.as_ref()
    }

    pub fn file_groups(&self) -> Option<&[FileGroup]> {
        self.file_groups.as_deref()
    }

    pub fn files_count(&self) -> Option<u64> {
        self.files_count
    }

    /// Copy handed to the rename workflow. Every field must be present.
    pub fn rename_input(&self) -> Result<RenameInput, InvariantViolation> {
        match (&self.source, &self.file_groups, self.files_count) {
            (Some(source), Some(file_groups), Some(files_count)) => Ok(RenameInput {
                source: source.clone(),
                file_groups: file_groups.clone(),
                files_count,
            }),
            _ => Err(InvariantViolation::new(
                AppMachine::ID,
                "rename handoff with incomplete session context",
            )),
        }
    }
}

// ============================================================================
// Events & Actions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    NavigateRename,
    NavigateDeduplicate,
    NavigateIntro,
    NavigateToDrop,
    DropCompleted(DropOutput),
    DropFailed(ChildFailure),
}

fn store_drop_output(ctx: &mut AppContext, event: &AppEvent, _: &mut Effects<AppMachine>) {
    if let AppEvent::DropCompleted(output) = event {
        ctx.replace_with(output);
    }
}

fn clear_session(ctx: &mut AppContext, _: &AppEvent, _: &mut Effects<AppMachine>) {
    ctx.clear();
}

fn surface_drop_failure(_: &mut AppContext, event: &AppEvent, effects: &mut Effects<AppMachine>) {
    if let AppEvent::DropFailed(failure) = event {
        effects.notify(Notice::error(
            NoticeKind::Workflow,
            format!("Drop workflow stopped unexpectedly: {}", failure.reason),
        ));
    }
}

fn drop_signal(signal: DropSignal) -> AppEvent {
    match signal {
        DropSignal::NavigateIntro => AppEvent::NavigateIntro,
    }
}

// ============================================================================
// Machine
// ============================================================================

pub struct AppMachine {
    host: Host,
}

impl AppMachine {
    pub fn new(host: Host) -> Self {
        Self { host }
    }
}

impl Machine for AppMachine {
    type State = AppState;
    type Context = AppContext;
    type Event = AppEvent;
    type Input = ();
    type Output = ();
    type Signal = Infallible;

    const ID: &'static str = "app";

    fn initial(&self, _: ()) -> (AppState, AppContext) {
        (AppState::Intro, AppContext::default())
    }

    fn transitions(&self, state: &AppState, event: &AppEvent) -> Vec<Transition<Self>> {
        use AppState::*;
        use RenameStep::*;

        match (state, event) {
            (Intro, AppEvent::NavigateRename) => {
                vec![Transition::to(Rename(Drop)).then(clear_session)]
            }
            (Intro, AppEvent::NavigateDeduplicate) => vec![Transition::to(Deduplicate)],
            (Rename(Drop), AppEvent::DropCompleted(_)) => {
                vec![Transition::to(Rename(Page)).then(store_drop_output)]
            }
            // fresh drop child; the failed one is gone
            (Rename(Drop), AppEvent::DropFailed(_)) => {
                vec![Transition::to(Rename(Drop)).then(surface_drop_failure)]
            }
            (Rename(Page), AppEvent::NavigateToDrop) => {
                vec![Transition::to(Rename(Drop)).then(clear_session)]
            }
            (Rename(_), AppEvent::NavigateIntro) => vec![Transition::to(Intro)],
            (Deduplicate, AppEvent::NavigateIntro) => vec![Transition::to(Intro)],
            _ => Vec::new(),
        }
    }

    fn invoke(
        &self,
        node: &[&'static str],
        ctx: &AppContext,
    ) -> Result<Vec<Invoke<Self>>, InvariantViolation> {
        match node {
            ["rename", "drop"] => Ok(vec![Invoke::machine(
                "drop",
                DropMachine::new(&self.host),
                (),
                drop_signal,
                AppEvent::DropCompleted,
            )
            .on_error(AppEvent::DropFailed)]),
            ["rename", "page"] => Ok(vec![Invoke::actor(
                "rename",
                RenameWorkflowActor,
                RenameWorkflowArguments {
                    input: ctx.rename_input()?,
                },
            )]),
            _ => Ok(Vec::new()),
        }
    }

    fn output(&self, _: &AppContext) -> Result<(), InvariantViolation> {
        Ok(())
    }
}

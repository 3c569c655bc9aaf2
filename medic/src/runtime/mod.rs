//! Hierarchical state-machine runtime on top of ractor
//!
//! A [`Machine`] is a pure definition: states, transitions with guards and
//! actions, children invoked per state node, and listeners that live as long
//! as the machine. [`MachineActor`] hosts one definition inside a ractor actor,
//! so every machine instance gets a FIFO inbox and processes one event to
//! completion before the next is dequeued.
//!
//! # Architecture
//!
//! ```text
//! MachineActor<App>
//! ├── MachineActor<Drop>          (invoked on entering rename.drop)
//! │   ├── ListenerActor           (whole lifetime, one per push channel)
//! │   └── AsyncTaskActor          (invoked on entering validating/collecting)
//! └── RenameWorkflowActor         (invoked on entering rename.page)
//! ```
//!
//! Children are spawned linked to their host. Results travel back as
//! `MachineMsg::Invoked` messages tagged with an [`InvocationId`]; once the
//! host leaves the state that owns an invocation, anything it still sends is
//! discarded. Failures surface through ractor supervision events.

mod handle;
mod invoke;
mod listener;
mod machine_actor;
mod observer;
mod task;


use ractor::ActorRef;
use serde::Serialize;
use shared_types::Notice;
use std::fmt::Debug;
use std::time::Duration;

pub use handle::MachineHandle;
pub use invoke::{Inbox, Invoke};
pub use listener::{Listen, ListenerActor, ListenerArgs, ListenerMsg, PushChannel, SubscriptionGuard};
pub use machine_actor::{
    ChildReport, InvokedChild, MachineActor, MachineArgs, MachineMsg, MachineState, ParentLink,
};
pub use observer::Observer;
pub use task::{AsyncTaskActor, TaskArgs, TaskMsg};

// ============================================================================
// Definitions
// ============================================================================

/// A state value that knows its position in the state hierarchy.
pub trait StateNode: Clone + Debug + PartialEq + Serialize + Send + Sync + 'static {
    /// Node names from the root to this leaf, e.g. `["rename", "drop"]`.
    fn path(&self) -> Vec<&'static str>;

    fn is_final(&self) -> bool {
        false
    }

    fn dotted(&self) -> String {
        self.path().join(".")
    }
}

/// Finite-state machine definition hosted by [`MachineActor`].
pub trait Machine: Send + Sync + Sized + 'static {
    type State: StateNode;
    type Context: Clone + Debug + Serialize + Send + Sync + 'static;
    type Event: Debug + Send + Sync + 'static;
    type Input: Send + 'static;
    type Output: Clone + Debug + Serialize + Send + Sync + 'static;
    /// Events this machine can send to the actor that invoked it.
    type Signal: Debug + Send + Sync + 'static;

    /// Stable identifier used in logs and inspections.
    const ID: &'static str;

    fn initial(&self, input: Self::Input) -> (Self::State, Self::Context);

    /// Candidate transitions for `event` in `state`, in declaration order.
    ///
    /// Candidates of the leaf come first, followed by those declared on its
    /// ancestors and on the machine root. The first enabled candidate wins.
    fn transitions(&self, state: &Self::State, event: &Self::Event) -> Vec<Transition<Self>>;

    /// Children invoked when the state node at `node` is entered.
    fn invoke(
        &self,
        _node: &[&'static str],
        _context: &Self::Context,
    ) -> Result<Vec<Invoke<Self>>, InvariantViolation> {
        Ok(Vec::new())
    }

    /// Listeners subscribed for the whole life of the machine.
    fn listeners(&self) -> Vec<Listen<Self>> {
        Vec::new()
    }

    /// Output computed from the final context.
    fn output(&self, context: &Self::Context) -> Result<Self::Output, InvariantViolation>;
}

pub type Guard<M> = fn(&<M as Machine>::Context, &<M as Machine>::Event) -> bool;
pub type Action<M> =
    fn(&mut <M as Machine>::Context, &<M as Machine>::Event, &mut Effects<M>);

/// One candidate transition: optional guard, optional target, actions.
pub struct Transition<M: Machine> {
    guard: Option<Guard<M>>,
    target: Option<M::State>,
    actions: Vec<Action<M>>,
}

impl<M: Machine> Transition<M> {
    /// Transition to `target`. A target equal to the current state re-enters it.
    pub fn to(target: M::State) -> Self {
        Self {
            guard: None,
            target: Some(target),
            actions: Vec::new(),
        }
    }

    /// Target-less transition: actions run, state and invocations are untouched.
    pub fn stay() -> Self {
        Self {
            guard: None,
            target: None,
            actions: Vec::new(),
        }
    }

    pub fn when(mut self, guard: Guard<M>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn then(mut self, action: Action<M>) -> Self {
        self.actions.push(action);
        self
    }

    pub fn target(&self) -> Option<&M::State> {
        self.target.as_ref()
    }

    pub fn is_enabled(&self, context: &M::Context, event: &M::Event) -> bool {
        self.guard.map_or(true, |guard| guard(context, event))
    }

    /// Run the actions against `context` and hand back the target and effects.
    pub fn apply(self, context: &mut M::Context, event: &M::Event) -> (Option<M::State>, Effects<M>) {
        let mut effects = Effects::default();
        for action in &self.actions {
            action(context, event, &mut effects);
        }
        (self.target, effects)
    }
}

/// Pick the first enabled candidate for `event`; `None` means the event is dropped.
pub fn select<M: Machine>(
    machine: &M,
    state: &M::State,
    context: &M::Context,
    event: &M::Event,
) -> Option<Transition<M>> {
    machine
        .transitions(state, event)
        .into_iter()
        .find(|candidate| candidate.is_enabled(context, event))
}

/// Side effects recorded by transition actions, flushed after the transition.
pub struct Effects<M: Machine> {
    signals: Vec<M::Signal>,
    notices: Vec<Notice>,
}

impl<M: Machine> Default for Effects<M> {
    fn default() -> Self {
        Self {
            signals: Vec::new(),
            notices: Vec::new(),
        }
    }
}

impl<M: Machine> Effects<M> {
    pub fn send_parent(&mut self, signal: M::Signal) {
        self.signals.push(signal);
    }

    pub fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    pub fn signals(&self) -> &[M::Signal] {
        &self.signals
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub(crate) fn into_parts(self) -> (Vec<M::Signal>, Vec<Notice>) {
        (self.signals, self.notices)
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// What a UI reads after every processed event.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot<S, C, O> {
    pub machine: &'static str,
    pub actor_id: String,
    pub state: S,
    /// Dotted state path, e.g. `rename.page`
    pub path: String,
    pub context: C,
    /// Set once the machine reached its final state
    pub output: Option<O>,
    pub events_processed: u64,
}

pub type MachineSnapshot<M> =
    Snapshot<<M as Machine>::State, <M as Machine>::Context, <M as Machine>::Output>;

impl<S, C, O> Snapshot<S, C, O> {
    /// True when the machine is in `path` or one of its descendants.
    pub fn matches(&self, path: &str) -> bool {
        self.path == path
            || (self.path.starts_with(path) && self.path[path.len()..].starts_with('.'))
    }

    pub fn is_done(&self) -> bool {
        self.output.is_some()
    }
}

// ============================================================================
// Identifiers & Errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InvocationId(pub(crate) u64);

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "inv-{}", self.0)
    }
}

/// Error value carried to the host when an invoked child fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildFailure {
    pub name: &'static str,
    pub reason: String,
}

impl std::fmt::Display for ChildFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.name, self.reason)
    }
}

/// A programming invariant does not hold. Always fatal for the machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{machine} invariant violated: {detail}")]
pub struct InvariantViolation {
    pub machine: &'static str,
    pub detail: String,
}

impl InvariantViolation {
    pub fn new(machine: &'static str, detail: impl Into<String>) -> Self {
        Self {
            machine,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to spawn {machine}: {reason}")]
    Spawn { machine: &'static str, reason: String },
    #[error("messaging error: {0}")]
    Messaging(String),
    #[error("timed out after {waited:?} waiting on {machine}")]
    Timeout {
        machine: &'static str,
        waited: Duration,
    },
    #[error("{0} has stopped")]
    Stopped(&'static str),
}

// ============================================================================
// Operations
// ============================================================================

/// Enqueue `event` on a machine's inbox.
pub fn send<M: Machine>(actor: &ActorRef<MachineMsg<M>>, event: M::Event) -> Result<(), RuntimeError> {
    actor
        .cast(MachineMsg::Event(event))
        .map_err(|e| RuntimeError::Messaging(e.to_string()))
}

/// Ask a running machine for its current snapshot.
pub async fn snapshot_of<M: Machine>(
    actor: &ActorRef<MachineMsg<M>>,
) -> Result<MachineSnapshot<M>, RuntimeError> {
    ractor::call!(actor, MachineMsg::GetSnapshot).map_err(|e| RuntimeError::Messaging(e.to_string()))
}

/// Children currently invoked by a running machine.
pub async fn invoked_children<M: Machine>(
    actor: &ActorRef<MachineMsg<M>>,
) -> Result<Vec<InvokedChild>, RuntimeError> {
    ractor::call!(actor, MachineMsg::GetInvoked).map_err(|e| RuntimeError::Messaging(e.to_string()))
}

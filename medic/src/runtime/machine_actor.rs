//! MachineActor - hosts one [`Machine`] definition as a ractor actor
//!
//! The actor owns the machine's state value and context, the cells of every
//! invoked child and listener, and the link to its parent. All mutation
//! happens inside `handle`, one message at a time.

use async_trait::async_trait;
use chrono::Utc;
use ractor::{Actor, ActorCell, ActorProcessingErr, ActorRef, RpcReplyPort, SupervisionEvent};
use shared_types::Inspection;
use std::sync::Arc;
use tokio::sync::watch;

use super::invoke::Inbox;
use super::{
    select, ChildFailure, InvocationId, Machine, MachineSnapshot, Observer, Snapshot, StateNode,
};

/// Messages handled by MachineActor
pub enum MachineMsg<M: Machine> {
    /// Event from the UI, a listener, or a parent
    Event(M::Event),
    /// Event produced by an invoked child
    Invoked {
        invocation: InvocationId,
        event: M::Event,
    },
    GetSnapshot(RpcReplyPort<MachineSnapshot<M>>),
    GetInvoked(RpcReplyPort<Vec<InvokedChild>>),
}

impl<M: Machine> std::fmt::Debug for MachineMsg<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineMsg::Event(event) => f.debug_tuple("Event").field(event).finish(),
            MachineMsg::Invoked { invocation, event } => f
                .debug_struct("Invoked")
                .field("invocation", invocation)
                .field("event", event)
                .finish(),
            MachineMsg::GetSnapshot(_) => f.write_str("GetSnapshot"),
            MachineMsg::GetInvoked(_) => f.write_str("GetInvoked"),
        }
    }
}

/// An actor currently invoked by a machine.
#[derive(Debug, Clone)]
pub struct InvokedChild {
    pub name: &'static str,
    pub invocation: InvocationId,
    pub cell: ActorCell,
}

/// What a child machine reports to its parent.
pub enum ChildReport<M: Machine> {
    Signal(M::Signal),
    Done(M::Output),
}

/// Addressable handle to the parent, fixed when the child is spawned.
pub struct ParentLink<M: Machine> {
    deliver: Arc<dyn Fn(ChildReport<M>) + Send + Sync>,
}

impl<M: Machine> Clone for ParentLink<M> {
    fn clone(&self) -> Self {
        Self {
            deliver: Arc::clone(&self.deliver),
        }
    }
}

impl<M: Machine> ParentLink<M> {
    pub fn new(deliver: impl Fn(ChildReport<M>) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn report(&self, report: ChildReport<M>) {
        (self.deliver)(report)
    }
}

/// Arguments for spawning MachineActor
pub struct MachineArgs<M: Machine> {
    pub input: M::Input,
    pub parent: Option<ParentLink<M>>,
    pub observer: Observer,
    /// Receives a snapshot after every processed event (root machines)
    pub snapshots: Option<watch::Sender<Option<MachineSnapshot<M>>>>,
}

struct ActiveInvocation<M: Machine> {
    id: InvocationId,
    name: &'static str,
    /// Length of the state path that owns this invocation
    depth: usize,
    cell: ActorCell,
    on_error: Option<fn(ChildFailure) -> M::Event>,
}

/// State for MachineActor
pub struct MachineState<M: Machine> {
    value: M::State,
    context: M::Context,
    output: Option<M::Output>,
    parent: Option<ParentLink<M>>,
    observer: Observer,
    snapshots: Option<watch::Sender<Option<MachineSnapshot<M>>>>,
    invocations: Vec<ActiveInvocation<M>>,
    listeners: Vec<(&'static str, ActorCell)>,
    next_invocation: u64,
    events_processed: u64,
}

/// Actor that runs a machine definition
pub struct MachineActor<M: Machine> {
    machine: M,
}

impl<M: Machine> MachineActor<M> {
    pub fn new(machine: M) -> Self {
        Self { machine }
    }
}

#[async_trait]
impl<M: Machine> Actor for MachineActor<M> {
    type Msg = MachineMsg<M>;
    type State = MachineState<M>;
    type Arguments = MachineArgs<M>;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(machine = M::ID, actor_id = %myself.get_id(), "Machine starting");

        let (value, context) = self.machine.initial(args.input);
        let mut state = MachineState {
            value,
            context,
            output: None,
            parent: args.parent,
            observer: args.observer,
            snapshots: args.snapshots,
            invocations: Vec::new(),
            listeners: Vec::new(),
            next_invocation: 0,
            events_processed: 0,
        };

        // Listeners subscribe before the first event can be processed, so a
        // push published right after spawn is never missed.
        if let Err(e) = self.start(&myself, &mut state).await {
            self.release_children(&mut state, "machine failed to start");
            return Err(e);
        }

        self.publish(&myself, &state);
        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            MachineMsg::Event(event) => self.dispatch_or_release(&myself, state, event).await?,
            MachineMsg::Invoked { invocation, event } => {
                if state.invocations.iter().any(|active| active.id == invocation) {
                    self.dispatch_or_release(&myself, state, event).await?;
                } else {
                    tracing::debug!(
                        machine = M::ID,
                        %invocation,
                        event = ?event,
                        "Discarding result of an invocation that is no longer active"
                    );
                }
            }
            MachineMsg::GetSnapshot(reply) => {
                let _ = reply.send(self.snapshot(&myself, state));
            }
            MachineMsg::GetInvoked(reply) => {
                let children = state
                    .invocations
                    .iter()
                    .map(|active| InvokedChild {
                        name: active.name,
                        invocation: active.id,
                        cell: active.cell.clone(),
                    })
                    .collect();
                let _ = reply.send(children);
            }
        }
        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        event: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match event {
            SupervisionEvent::ActorFailed(cell, err) => {
                let failed = cell.get_id();
                if let Some(pos) = state
                    .invocations
                    .iter()
                    .position(|active| active.cell.get_id() == failed)
                {
                    let invocation = state.invocations.remove(pos);
                    tracing::error!(
                        machine = M::ID,
                        child = invocation.name,
                        invocation = %invocation.id,
                        error = %err,
                        "Invoked child failed"
                    );
                    if let Some(on_error) = invocation.on_error {
                        let failure = ChildFailure {
                            name: invocation.name,
                            reason: err.to_string(),
                        };
                        self.dispatch_or_release(&myself, state, on_error(failure)).await?;
                    }
                } else if let Some(pos) = state
                    .listeners
                    .iter()
                    .position(|(_, cell)| cell.get_id() == failed)
                {
                    let (name, _) = state.listeners.remove(pos);
                    tracing::error!(machine = M::ID, listener = name, error = %err, "Listener failed");
                    self.release_children(state, "listener failed");
                    return Err(ActorProcessingErr::from(format!(
                        "listener {name} failed: {err}"
                    )));
                }
            }
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                tracing::debug!(
                    machine = M::ID,
                    child = %cell.get_id(),
                    reason = ?reason,
                    "Child terminated"
                );
            }
            _ => {}
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        self.release_children(state, "host machine stopped");
        tracing::info!(
            machine = M::ID,
            actor_id = %myself.get_id(),
            state = %state.value.dotted(),
            "Machine stopped"
        );
        Ok(())
    }
}

impl<M: Machine> MachineActor<M> {
    async fn start(
        &self,
        myself: &ActorRef<MachineMsg<M>>,
        state: &mut MachineState<M>,
    ) -> Result<(), ActorProcessingErr> {
        for listen in self.machine.listeners() {
            let name = listen.name();
            let cell = listen
                .spawn(myself.clone())
                .await
                .map_err(ActorProcessingErr::from)?;
            tracing::debug!(machine = M::ID, listener = name, "Listener subscribed");
            state.listeners.push((name, cell));
        }

        let path = state.value.path();
        self.enter(myself, state, 0, &path).await
    }

    /// A failed dispatch is fatal; children are released before the error surfaces.
    async fn dispatch_or_release(
        &self,
        myself: &ActorRef<MachineMsg<M>>,
        state: &mut MachineState<M>,
        event: M::Event,
    ) -> Result<(), ActorProcessingErr> {
        let result = self.dispatch(myself, state, event).await;
        if result.is_err() {
            self.release_children(state, "machine failed");
        }
        result
    }

    /// Process one event to completion.
    async fn dispatch(
        &self,
        myself: &ActorRef<MachineMsg<M>>,
        state: &mut MachineState<M>,
        event: M::Event,
    ) -> Result<(), ActorProcessingErr> {
        if state.output.is_some() {
            tracing::debug!(machine = M::ID, event = ?event, "Ignoring event after final state");
            return Ok(());
        }
        state.events_processed += 1;

        let Some(transition) = select(&self.machine, &state.value, &state.context, &event) else {
            tracing::debug!(
                machine = M::ID,
                state = %state.value.dotted(),
                event = ?event,
                "No enabled transition; event dropped"
            );
            self.publish(myself, state);
            return Ok(());
        };

        let (target, effects) = transition.apply(&mut state.context, &event);
        if let Some(target) = target {
            self.transition_to(myself, state, target).await?;
        }

        let (signals, notices) = effects.into_parts();
        for notice in notices {
            state.observer.notify(notice);
        }
        for signal in signals {
            match &state.parent {
                Some(parent) => parent.report(ChildReport::Signal(signal)),
                None => tracing::debug!(machine = M::ID, signal = ?signal, "No parent; signal dropped"),
            }
        }

        if state.value.is_final() {
            self.finish(myself, state)
        } else {
            self.publish(myself, state);
            Ok(())
        }
    }

    async fn transition_to(
        &self,
        myself: &ActorRef<MachineMsg<M>>,
        state: &mut MachineState<M>,
        target: M::State,
    ) -> Result<(), ActorProcessingErr> {
        let from = state.value.path();
        let to = target.path();
        let mut common = from
            .iter()
            .zip(to.iter())
            .take_while(|(a, b)| a == b)
            .count();
        if from == to {
            // self-targeted transition re-enters the leaf
            common = common.saturating_sub(1);
        }

        self.exit(state, common);
        tracing::info!(
            machine = M::ID,
            from = %from.join("."),
            to = %to.join("."),
            "State transition"
        );
        state.value = target;
        self.enter(myself, state, common, &to).await
    }

    /// Stop every invocation owned by a node deeper than `depth`.
    fn exit(&self, state: &mut MachineState<M>, depth: usize) {
        state.invocations.retain(|active| {
            if active.depth > depth {
                tracing::debug!(
                    machine = M::ID,
                    child = active.name,
                    invocation = %active.id,
                    "Stopping invoked child on state exit"
                );
                active.cell.stop(Some("state exited".to_string()));
                false
            } else {
                true
            }
        });
    }

    /// Invoke children for every node of `path` below the common prefix.
    async fn enter(
        &self,
        myself: &ActorRef<MachineMsg<M>>,
        state: &mut MachineState<M>,
        common: usize,
        path: &[&'static str],
    ) -> Result<(), ActorProcessingErr> {
        for depth in (common + 1)..=path.len() {
            let invokes = self
                .machine
                .invoke(&path[..depth], &state.context)
                .map_err(|violation| {
                    tracing::error!(machine = M::ID, error = %violation, "Cannot invoke children");
                    ActorProcessingErr::from(violation)
                })?;

            for invoke in invokes {
                state.next_invocation += 1;
                let id = InvocationId(state.next_invocation);
                let name = invoke.name();
                let on_error = invoke.error_handler();
                let inbox = Inbox::new(myself.clone(), id, state.observer.clone());
                let cell = invoke.spawn(inbox).await.map_err(ActorProcessingErr::from)?;
                tracing::debug!(machine = M::ID, child = name, invocation = %id, "Invoked child");
                state.invocations.push(ActiveInvocation {
                    id,
                    name,
                    depth,
                    cell,
                    on_error,
                });
            }
        }
        Ok(())
    }

    fn finish(
        &self,
        myself: &ActorRef<MachineMsg<M>>,
        state: &mut MachineState<M>,
    ) -> Result<(), ActorProcessingErr> {
        let output = self.machine.output(&state.context).map_err(|violation| {
            tracing::error!(
                machine = M::ID,
                error = %violation,
                "Final state reached with an invalid context"
            );
            ActorProcessingErr::from(violation)
        })?;

        state.output = Some(output.clone());
        self.publish(myself, state);
        if let Some(parent) = &state.parent {
            parent.report(ChildReport::Done(output));
        }
        tracing::info!(machine = M::ID, actor_id = %myself.get_id(), "Machine reached final state");
        myself.stop(Some("final state reached".to_string()));
        Ok(())
    }

    fn release_children(&self, state: &mut MachineState<M>, reason: &str) {
        for active in state.invocations.drain(..) {
            active.cell.stop(Some(reason.to_string()));
        }
        for (name, cell) in state.listeners.drain(..) {
            tracing::debug!(machine = M::ID, listener = name, "Stopping listener");
            cell.stop(Some(reason.to_string()));
        }
    }

    fn snapshot(&self, myself: &ActorRef<MachineMsg<M>>, state: &MachineState<M>) -> MachineSnapshot<M> {
        Snapshot {
            machine: M::ID,
            actor_id: myself.get_id().to_string(),
            state: state.value.clone(),
            path: state.value.dotted(),
            context: state.context.clone(),
            output: state.output.clone(),
            events_processed: state.events_processed,
        }
    }

    fn publish(&self, myself: &ActorRef<MachineMsg<M>>, state: &MachineState<M>) {
        let snapshot = self.snapshot(myself, state);
        let context = serde_json::to_value(&snapshot.context).unwrap_or_else(|e| {
            tracing::warn!(machine = M::ID, error = %e, "Context is not JSON-serializable");
            serde_json::Value::Null
        });
        state.observer.inspect(Inspection {
            machine: M::ID.to_string(),
            actor_id: snapshot.actor_id.clone(),
            state: snapshot.path.clone(),
            context,
            done: snapshot.is_done(),
            events_processed: snapshot.events_processed,
            timestamp: Utc::now(),
        });
        if let Some(snapshots) = &state.snapshots {
            snapshots.send_replace(Some(snapshot));
        }
    }
}

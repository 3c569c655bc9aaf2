use ractor::{Actor, ActorRef};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::machine_actor::{MachineActor, MachineArgs, MachineMsg, ParentLink};
use super::{InvokedChild, Machine, MachineSnapshot, Observer, RuntimeError};

/// Owner's handle to a spawned machine.
///
/// Snapshots are published on a watch channel after every processed event,
/// so readers never block the machine's inbox.
pub struct MachineHandle<M: Machine> {
    actor: ActorRef<MachineMsg<M>>,
    join: Option<JoinHandle<()>>,
    snapshots: watch::Receiver<Option<MachineSnapshot<M>>>,
}

impl<M: Machine> MachineHandle<M> {
    pub async fn spawn(machine: M, input: M::Input, observer: Observer) -> Result<Self, RuntimeError> {
        Self::start(machine, input, observer, None).await
    }

    /// Spawn with a parent link, as if invoked by another machine.
    pub async fn spawn_with_parent(
        machine: M,
        input: M::Input,
        observer: Observer,
        parent: ParentLink<M>,
    ) -> Result<Self, RuntimeError> {
        Self::start(machine, input, observer, Some(parent)).await
    }

    async fn start(
        machine: M,
        input: M::Input,
        observer: Observer,
        parent: Option<ParentLink<M>>,
    ) -> Result<Self, RuntimeError> {
        let (tx, rx) = watch::channel(None);
        let (actor, join) = Actor::spawn(
            None,
            MachineActor::new(machine),
            MachineArgs {
                input,
                parent,
                observer,
                snapshots: Some(tx),
            },
        )
        .await
        .map_err(|e| RuntimeError::Spawn {
            machine: M::ID,
            reason: e.to_string(),
        })?;

        Ok(Self {
            actor,
            join: Some(join),
            snapshots: rx,
        })
    }

    pub fn actor(&self) -> &ActorRef<MachineMsg<M>> {
        &self.actor
    }

    pub fn send(&self, event: M::Event) -> Result<(), RuntimeError> {
        super::send(&self.actor, event)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Option<MachineSnapshot<M>> {
        self.snapshots.borrow().clone()
    }

    /// Snapshot taken inside the actor, after every event queued before this call.
    pub async fn query(&self) -> Result<MachineSnapshot<M>, RuntimeError> {
        super::snapshot_of(&self.actor).await
    }

    pub async fn invoked(&self) -> Result<Vec<InvokedChild>, RuntimeError> {
        super::invoked_children(&self.actor).await
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<MachineSnapshot<M>>> {
        self.snapshots.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl Fn(&MachineSnapshot<M>) -> bool,
        within: Duration,
    ) -> Result<MachineSnapshot<M>, RuntimeError> {
        let mut rx = self.snapshots.clone();
        let waited = tokio::time::timeout(
            within,
            rx.wait_for(|snapshot| snapshot.as_ref().is_some_and(&predicate)),
        )
        .await;

        match waited {
            Ok(Ok(snapshot)) => snapshot.clone().ok_or(RuntimeError::Stopped(M::ID)),
            Ok(Err(_)) => Err(RuntimeError::Stopped(M::ID)),
            Err(_) => Err(RuntimeError::Timeout {
                machine: M::ID,
                waited: within,
            }),
        }
    }

    /// Stop the machine and wait for its children to be released.
    pub async fn stop(&mut self) {
        self.actor.stop(Some("handle stopped".to_string()));
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                tracing::warn!(machine = M::ID, error = %e, "Machine task did not shut down cleanly");
            }
        }
    }
}

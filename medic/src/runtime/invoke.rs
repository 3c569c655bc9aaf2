//! Children a machine invokes while one of its state nodes is active.

use futures::future::{BoxFuture, FutureExt};
use ractor::{Actor, ActorCell, ActorRef, SpawnErr};
use std::future::Future;

use super::machine_actor::{ChildReport, MachineActor, MachineArgs, MachineMsg, ParentLink};
use super::task::{AsyncTaskActor, TaskArgs};
use super::{ChildFailure, InvocationId, Machine, Observer};

/// Return address handed to an invoked child.
///
/// Everything delivered through an inbox is tagged with the invocation it
/// belongs to, so the host can drop it once that invocation has ended.
pub struct Inbox<M: Machine> {
    host: ActorRef<MachineMsg<M>>,
    invocation: InvocationId,
    observer: Observer,
}

impl<M: Machine> Clone for Inbox<M> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            invocation: self.invocation,
            observer: self.observer.clone(),
        }
    }
}

impl<M: Machine> Inbox<M> {
    pub(crate) fn new(host: ActorRef<MachineMsg<M>>, invocation: InvocationId, observer: Observer) -> Self {
        Self {
            host,
            invocation,
            observer,
        }
    }

    pub fn invocation(&self) -> InvocationId {
        self.invocation
    }

    pub fn deliver(&self, event: M::Event) {
        let msg = MachineMsg::Invoked {
            invocation: self.invocation,
            event,
        };
        if let Err(e) = self.host.cast(msg) {
            tracing::debug!(
                machine = M::ID,
                invocation = %self.invocation,
                error = %e,
                "Host gone; invoked result dropped"
            );
        }
    }

    /// Cell children are linked under.
    pub fn supervisor(&self) -> ActorCell {
        self.host.get_cell()
    }

    pub fn observer(&self) -> &Observer {
        &self.observer
    }
}

type SpawnFn<M> = Box<dyn FnOnce(Inbox<M>) -> BoxFuture<'static, Result<ActorCell, SpawnErr>> + Send>;

/// A child to spawn when a state node is entered.
pub struct Invoke<M: Machine> {
    name: &'static str,
    spawn: SpawnFn<M>,
    on_error: Option<fn(ChildFailure) -> M::Event>,
}

impl<M: Machine> Invoke<M> {
    /// Run a one-shot async request. Its outcome comes back as exactly one event.
    pub fn task<F, T, E>(
        name: &'static str,
        request: F,
        on_done: fn(T) -> M::Event,
        on_error: fn(E) -> M::Event,
    ) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let request: BoxFuture<'static, M::Event> = Box::pin(async move {
            match request.await {
                Ok(value) => on_done(value),
                Err(err) => on_error(err),
            }
        });

        Self {
            name,
            spawn: Box::new(move |inbox: Inbox<M>| {
                async move {
                    let supervisor = inbox.supervisor();
                    let (actor, _handle) = Actor::spawn_linked(
                        None,
                        AsyncTaskActor::<M>::default(),
                        TaskArgs {
                            name,
                            inbox,
                            request,
                        },
                        supervisor,
                    )
                    .await?;
                    Ok(actor.get_cell())
                }
                .boxed()
            }),
            on_error: None,
        }
    }

    /// Run another machine as a child. `on_signal` maps what the child sends
    /// to its parent; `on_done` maps the child's output.
    pub fn machine<C: Machine>(
        name: &'static str,
        child: C,
        input: C::Input,
        on_signal: fn(C::Signal) -> M::Event,
        on_done: fn(C::Output) -> M::Event,
    ) -> Self {
        Self {
            name,
            spawn: Box::new(move |inbox: Inbox<M>| {
                async move {
                    let supervisor = inbox.supervisor();
                    let observer = inbox.observer().clone();
                    let parent = ParentLink::<C>::new(move |report| match report {
                        ChildReport::Signal(signal) => inbox.deliver(on_signal(signal)),
                        ChildReport::Done(output) => inbox.deliver(on_done(output)),
                    });
                    let (actor, _handle) = Actor::spawn_linked(
                        None,
                        MachineActor::new(child),
                        MachineArgs {
                            input,
                            parent: Some(parent),
                            observer,
                            snapshots: None,
                        },
                        supervisor,
                    )
                    .await?;
                    Ok(actor.get_cell())
                }
                .boxed()
            }),
            on_error: None,
        }
    }

    /// Run a plain actor for as long as the node is active.
    pub fn actor<A>(name: &'static str, actor: A, args: A::Arguments) -> Self
    where
        A: Actor,
    {
        Self {
            name,
            spawn: Box::new(move |inbox: Inbox<M>| {
                async move {
                    let (actor, _handle) =
                        Actor::spawn_linked(None, actor, args, inbox.supervisor()).await?;
                    Ok(actor.get_cell())
                }
                .boxed()
            }),
            on_error: None,
        }
    }

    /// Event raised on the host when the child fails.
    pub fn on_error(mut self, handler: fn(ChildFailure) -> M::Event) -> Self {
        self.on_error = Some(handler);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn error_handler(&self) -> Option<fn(ChildFailure) -> M::Event> {
        self.on_error
    }

    pub(crate) async fn spawn(self, inbox: Inbox<M>) -> Result<ActorCell, SpawnErr> {
        (self.spawn)(inbox).await
    }
}

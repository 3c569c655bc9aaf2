//! AsyncTaskActor - runs one async request and reports its outcome as an event
//!
//! The request runs on its own tokio task and is never aborted: the collaborator
//! gets no cancellation. Once the actor is stopped its outcome has nowhere to
//! go, and anything already delivered is discarded by the host's invocation
//! check.

use async_trait::async_trait;
use futures::future::BoxFuture;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use std::marker::PhantomData;

use super::invoke::Inbox;
use super::Machine;

pub struct AsyncTaskActor<M: Machine> {
    _machine: PhantomData<fn() -> M>,
}

impl<M: Machine> Default for AsyncTaskActor<M> {
    fn default() -> Self {
        Self {
            _machine: PhantomData,
        }
    }
}

pub struct TaskArgs<M: Machine> {
    pub name: &'static str,
    pub inbox: Inbox<M>,
    pub request: BoxFuture<'static, M::Event>,
}

pub enum TaskMsg<M: Machine> {
    Resolved(M::Event),
    /// The request panicked
    Aborted(String),
}

pub struct TaskState<M: Machine> {
    name: &'static str,
    inbox: Inbox<M>,
}

#[async_trait]
impl<M: Machine> Actor for AsyncTaskActor<M> {
    type Msg = TaskMsg<M>;
    type State = TaskState<M>;
    type Arguments = TaskArgs<M>;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!(
            machine = M::ID,
            task = args.name,
            invocation = %args.inbox.invocation(),
            "Task starting"
        );

        let request = tokio::spawn(args.request);
        tokio::spawn(async move {
            let msg = match request.await {
                Ok(event) => TaskMsg::Resolved(event),
                Err(e) => TaskMsg::Aborted(e.to_string()),
            };
            let _ = myself.cast(msg);
        });

        Ok(TaskState {
            name: args.name,
            inbox: args.inbox,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            TaskMsg::Resolved(event) => {
                tracing::debug!(machine = M::ID, task = state.name, event = ?event, "Task resolved");
                state.inbox.deliver(event);
                myself.stop(Some("task resolved".to_string()));
                Ok(())
            }
            TaskMsg::Aborted(reason) => Err(ActorProcessingErr::from(format!(
                "task {} aborted: {}",
                state.name, reason
            ))),
        }
    }
}

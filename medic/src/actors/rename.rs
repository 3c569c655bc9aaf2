//! RenameWorkflowActor - downstream rename workflow
//!
//! Owns a copy of the session data handed over by the app machine. The
//! rename pipeline itself lives elsewhere; this actor is the handoff point.

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use shared_types::RenameInput;

#[derive(Debug, Default)]
pub struct RenameWorkflowActor;

#[derive(Debug, Clone)]
pub struct RenameWorkflowArguments {
    pub input: RenameInput,
}

pub struct RenameWorkflowState {
    input: RenameInput,
}

#[derive(Debug)]
pub enum RenameWorkflowMsg {
    GetInput { reply: RpcReplyPort<RenameInput> },
}

#[async_trait]
impl Actor for RenameWorkflowActor {
    type Msg = RenameWorkflowMsg;
    type State = RenameWorkflowState;
    type Arguments = RenameWorkflowArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            actor_id = %myself.get_id(),
            source = %args.input.source,
            files_count = args.input.files_count,
            groups = args.input.file_groups.len(),
            "RenameWorkflowActor starting"
        );
        Ok(RenameWorkflowState { input: args.input })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            RenameWorkflowMsg::GetInput { reply } => {
                let _ = reply.send(state.input.clone());
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(actor_id = %myself.get_id(), "RenameWorkflowActor stopped");
        Ok(())
    }
}

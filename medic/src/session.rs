//! Session - the UI-facing facade over one app machine tree
//!
//! The UI writes [`UiCommand`]s and reads snapshots, notices and inspections.
//! Nothing else crosses this boundary.

use ractor::ActorRef;
use serde::Serialize;
use shared_types::{Inspection, Notice, RenameInput, UiCommand};
use tokio::sync::broadcast;
use tokio::time::Duration;

use crate::actors::{
    AppEvent, AppMachine, DropEvent, DropMachine, RenameWorkflowMsg,
};
use crate::backend::Host;
use crate::config::Config;
use crate::runtime::{self, MachineHandle, MachineMsg, MachineSnapshot, Observer, RuntimeError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("no drop acquisition is active")]
    NoDropActive,
    #[error("no rename workflow is active")]
    NoRenameActive,
}

/// What a UI renders: the app machine plus the active drop child, if any.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub app: MachineSnapshot<AppMachine>,
    pub drop: Option<MachineSnapshot<DropMachine>>,
}

pub struct Session {
    app: MachineHandle<AppMachine>,
    host: Host,
    observer: Observer,
}

impl Session {
    pub async fn start(host: Host, observer: Observer) -> Result<Self, SessionError> {
        let app = MachineHandle::spawn(AppMachine::new(host.clone()), (), observer.clone()).await?;
        tracing::info!(actor_id = %app.actor().get_id(), "Session started");
        Ok(Self {
            app,
            host,
            observer,
        })
    }

    /// Session on the local filesystem backend.
    pub async fn local(config: &Config) -> Result<Self, SessionError> {
        let host = Host::local(config.collect_options(), config.push_capacity);
        Self::start(host, Observer::new(config.notice_capacity)).await
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.observer.subscribe_notices()
    }

    pub fn inspections(&self) -> broadcast::Receiver<Inspection> {
        self.observer.subscribe_inspections()
    }

    /// Route one UI command to the machine that handles it.
    pub async fn dispatch(&self, command: UiCommand) -> Result<(), SessionError> {
        tracing::debug!(command = ?command, "Dispatching UI command");
        match command {
            UiCommand::InputDropped { paths } => {
                if self.host.drops.publish(paths) == 0 {
                    tracing::debug!("Drop ignored; no acquisition is listening");
                }
            }
            UiCommand::Cancel => match self.drop_machine().await {
                // a drop child that already finished is still listed until the app moves on
                Ok(drop) => {
                    if let Err(e) = runtime::send(&drop, DropEvent::Cancel) {
                        tracing::debug!(error = %e, "Cancel ignored; acquisition already stopped");
                    }
                }
                Err(SessionError::NoDropActive) => {
                    tracing::debug!("Cancel ignored; no acquisition is active");
                }
                Err(e) => return Err(e),
            },
            UiCommand::NavigateRename => self.app.send(AppEvent::NavigateRename)?,
            UiCommand::NavigateDeduplicate => self.app.send(AppEvent::NavigateDeduplicate)?,
            UiCommand::NavigateToDrop => self.app.send(AppEvent::NavigateToDrop)?,
            UiCommand::NavigateIntro => self.app.send(AppEvent::NavigateIntro)?,
        }
        Ok(())
    }

    pub async fn drop_machine(&self) -> Result<ActorRef<MachineMsg<DropMachine>>, SessionError> {
        self.app
            .invoked()
            .await?
            .into_iter()
            .find(|child| child.name == "drop")
            .map(|child| child.cell.into())
            .ok_or(SessionError::NoDropActive)
    }

    pub async fn rename_workflow(&self) -> Result<ActorRef<RenameWorkflowMsg>, SessionError> {
        self.app
            .invoked()
            .await?
            .into_iter()
            .find(|child| child.name == "rename")
            .map(|child| child.cell.into())
            .ok_or(SessionError::NoRenameActive)
    }

    /// Input the active rename workflow was started with.
    pub async fn rename_input(&self) -> Result<RenameInput, SessionError> {
        let rename = self.rename_workflow().await?;
        ractor::call!(rename, |reply| RenameWorkflowMsg::GetInput { reply })
            .map_err(|e| SessionError::Runtime(RuntimeError::Messaging(e.to_string())))
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let app = self.app.query().await?;
        let drop = match self.drop_machine().await {
            Ok(drop) => runtime::snapshot_of(&drop).await.ok(),
            Err(_) => None,
        };
        Ok(SessionSnapshot { app, drop })
    }

    /// Wait until the app machine reaches a state matching `path`.
    pub async fn wait_for_path(
        &self,
        path: &str,
        within: Duration,
    ) -> Result<MachineSnapshot<AppMachine>, SessionError> {
        Ok(self.app.wait_for(|s| s.matches(path), within).await?)
    }

    pub async fn shutdown(mut self) {
        self.app.stop().await;
        tracing::info!("Session stopped");
    }
}

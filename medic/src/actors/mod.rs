//! Session actors: the app machine, the drop machine and the rename workflow

pub mod app;
pub mod drop_machine;
pub mod rename;

pub use app::{AppContext, AppEvent, AppMachine, AppState, RenameStep};
pub use drop_machine::{DropContext, DropEvent, DropMachine, DropSignal, DropState};
pub use rename::{RenameWorkflowActor, RenameWorkflowArguments, RenameWorkflowMsg};

//! AppMachine - root navigation machine of a session
//!
//! Owns the session's [`AppContext`] and hosts the workflows as invoked
//! children.
//!
//! ## State Machine
//!
//! ```text
//! Intro ──navigate_rename──────> Rename ┌ Drop ─────drop done────> Page ┐
//!   │                                   └ <──────navigate_to_drop─────── ┘
//!   │                              │
//!   │  <─────navigate_intro────────┘   (also bubbled up by a drop cancel)
//!   │
//!   └──navigate_deduplicate──> Deduplicate ──navigate_intro──> Intro
//! ```
//!
//! | Node          | Invoked child                         |
//! |---------------|---------------------------------------|
//! | `rename.drop` | [`DropMachine`](super::DropMachine)   |
//! | `rename.page` | [`RenameWorkflowActor`](super::RenameWorkflowActor) |

mod machine;


pub use machine::{AppContext, AppEvent, AppMachine, AppState, RenameStep};

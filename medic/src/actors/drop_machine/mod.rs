//! DropMachine - acquires one dropped path, validates it and collects its files
//!
//! Runs as a child of the app machine while `rename.drop` is active and
//! finishes with a [`DropOutput`](shared_types::DropOutput).
//!
//! ## State Machine
//!
//! ```text
//! Idle ──drop(1 path)──> Validating ──validated──> Collecting ──collection pushed──> Done
//!  ^                      │  ^    │                    │
//!  │                      │  └────┘ re-drop / reject   │
//!  └──────────────────────┴──────── collection failed ─┘
//! ```
//!
//! Drops arrive on the `path_dropped` push channel, collection results on
//! `collection_completed`; both listeners live as long as the machine.
//! A collection report only counts when it names the validated source;
//! reports for any other root are ignored.
//! `Cancel` in any non-final state asks the parent to navigate to the intro
//! and otherwise leaves the machine untouched.

mod machine;


pub use machine::{DropContext, DropEvent, DropMachine, DropSignal, DropState};

//! Medic session core
//!
//! Event-driven orchestration of the media workflows: a drop of one path is
//! validated, its files are collected by the backend, and the result is
//! handed to the rename workflow. Every piece is a ractor actor; the two
//! workflow controllers are hierarchical state machines hosted by
//! [`runtime::MachineActor`].

pub mod actors;
pub mod backend;
pub mod cli;
pub mod config;
pub mod runtime;
pub mod session;

pub use session::{Session, SessionError, SessionSnapshot};

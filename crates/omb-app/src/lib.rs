//! Application layer of onemanband.
//!
//! Sessions (worktrees, projects, scratch terminals) own tabs; each tab is
//! backed by a PTY from [`omb_pty::PtySupervisor`]. This crate ties the
//! supervisor to the tab store: it routes PTY events to the tab that
//! spawned them, decides which signals reach the session chrome, keeps
//! track of the terminal that owns copy and paste, and coalesces resizes.
//!
//! The UI shell calls into [`commands`] and consumes [`ipc`] events.

pub mod cleanup;
pub mod commands;
pub mod config;
pub mod ipc;
pub mod pump;
pub mod registry;
pub mod resize;
pub mod router;
pub mod state;
pub mod task_status;
pub mod terminal;

pub use config::AppConfig;
pub use state::{AppState, TabPhase};

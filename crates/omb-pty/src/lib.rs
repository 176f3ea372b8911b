//! omb-pty: pseudo-terminal supervision for onemanband.
//!
//! Spawns agent, shell and task processes inside PTYs, streams their output
//! as [`PtyEvent`]s and reports exactly one exit per PTY.
//!
//! # Architecture
//!
//! - [`PtyHandle`] - Low-level PTY process management (spawn, write, resize).
//! - [`PtySupervisor`] - Owns every live PTY; one reader and one reaper
//!   thread per PTY push events into a [`PtyEventSink`].
//! - [`LaunchConfig`] - Resolves a [`PtyKind`] to the command to run.
//! - [`SignalScanner`] - Picks titles, cwd changes and notifications out of
//!   the output stream.
//! - [`PidFile`] - Records child pids so a crashed instance's children can
//!   be killed later.

pub mod events;
pub mod io_thread;
pub mod launch;
pub mod pids;
pub mod pty;
pub mod signals;
pub mod supervisor;

pub use events::{ExitInfo, PtyEvent, PtyEventSink, PtyId};
pub use io_thread::ProcessState;
pub use launch::{LaunchConfig, LaunchSpec, PtyKind};
pub use pids::PidFile;
pub use pty::{PtyError, PtyHandle, SpawnError};
pub use signals::{SignalScanner, TerminalSignal};
pub use supervisor::{PtyInfo, PtySupervisor, SpawnRequest};

use std::io::{Read, Write};
use std::path::PathBuf;

use portable_pty::{native_pty_system, Child, ChildKiller, MasterPty, PtySize};
use thiserror::Error;

use crate::launch::LaunchSpec;

/// Reasons a PTY could not be started. No pty id is handed out and no child
/// process outlives any of these.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("working directory {} does not exist or is not a directory", .0.display())]
    InvalidDirectory(PathBuf),

    #[error("no task named {0:?} is configured")]
    UnknownTask(String),

    #[error("failed to open pty: {0}")]
    OpenPty(#[source] anyhow::Error),

    #[error("failed to spawn {program}: {source}")]
    SpawnCommand {
        program: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to clone pty reader: {0}")]
    CloneReader(#[source] anyhow::Error),

    #[error("failed to take pty writer: {0}")]
    TakeWriter(#[source] anyhow::Error),

    #[error("failed to start pty thread: {0}")]
    Thread(#[source] std::io::Error),
}

/// Errors from operations on a live PTY.
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("pty I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pty resize failed: {0}")]
    Resize(#[source] anyhow::Error),
}

/// The master side of a PTY: resizing and writing user input.
///
/// The reader and the child are split off at spawn time so that blocking
/// reads and waits can run on their own threads without holding this handle.
pub struct PtyHandle {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
}

/// Everything produced by a successful spawn.
pub struct SpawnedPty {
    pub handle: PtyHandle,
    pub reader: Box<dyn Read + Send>,
    pub child: Box<dyn Child + Send + Sync>,
}

impl PtyHandle {
    /// Open a PTY at `cols` x `rows` and start `spec` inside it.
    ///
    /// The window size is set before the child is started, so its first
    /// frame is laid out for the real geometry.
    pub fn spawn(spec: &LaunchSpec, cols: u16, rows: u16) -> Result<SpawnedPty, SpawnError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(pty_size(cols, rows))
            .map_err(SpawnError::OpenPty)?;

        let mut child = pair
            .slave
            .spawn_command(spec.command_builder())
            .map_err(|source| SpawnError::SpawnCommand {
                program: spec.program.clone(),
                source,
            })?;

        // Our copy of the slave must be closed or the reader never sees EOF.
        drop(pair.slave);

        let reader = match pair.master.try_clone_reader() {
            Ok(reader) => reader,
            Err(e) => {
                reap(child.as_mut());
                return Err(SpawnError::CloneReader(e));
            }
        };

        let writer = match pair.master.take_writer() {
            Ok(writer) => writer,
            Err(e) => {
                reap(child.as_mut());
                return Err(SpawnError::TakeWriter(e));
            }
        };

        Ok(SpawnedPty {
            handle: Self {
                master: pair.master,
                writer,
            },
            reader,
            child,
        })
    }

    /// Resize the PTY to new dimensions.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        self.master
            .resize(pty_size(cols, rows))
            .map_err(PtyError::Resize)
    }

    /// Write bytes to the PTY master (user input -> child).
    pub fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }
}

fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Kill and wait for a child that will never be handed out.
fn reap(child: &mut (dyn Child + Send + Sync)) {
    if let Err(e) = ChildKiller::kill(child) {
        log::debug!("[Pty] kill during spawn rollback failed: {e}");
    }
    let _ = child.wait();
}

/// Returns the user's default shell, falling back to `/bin/sh`.
pub fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/sh".to_string())
}

//! Events pushed by the supervisor to whoever consumes PTY output.

use tokio::sync::mpsc;

use crate::signals::TerminalSignal;

/// Opaque, process-unique PTY identifier. Ids are never reused.
pub type PtyId = u64;

/// How a child process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: u32,
    /// Name of the terminating signal, if the child was killed by one.
    pub signal: Option<String>,
}

impl ExitInfo {
    pub fn with_code(code: u32) -> Self {
        Self { code, signal: None }
    }

    pub fn success(&self) -> bool {
        self.signal.is_none() && self.code == 0
    }
}

impl From<portable_pty::ExitStatus> for ExitInfo {
    fn from(status: portable_pty::ExitStatus) -> Self {
        Self {
            code: status.exit_code(),
            signal: status.signal().map(str::to_string),
        }
    }
}

/// An event for one PTY.
///
/// Per PTY: zero or more `Output`/`Signal` events in producer order, then
/// exactly one `Exit`. Nothing follows the `Exit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtyEvent {
    Output { pty_id: PtyId, data: Vec<u8> },
    Signal { pty_id: PtyId, signal: TerminalSignal },
    Exit { pty_id: PtyId, info: ExitInfo },
}

impl PtyEvent {
    pub fn pty_id(&self) -> PtyId {
        match self {
            PtyEvent::Output { pty_id, .. }
            | PtyEvent::Signal { pty_id, .. }
            | PtyEvent::Exit { pty_id, .. } => *pty_id,
        }
    }
}

/// Destination for supervisor events. Called from PTY threads, never blocks.
pub trait PtyEventSink: Send + Sync + 'static {
    fn emit(&self, event: PtyEvent);
}

impl PtyEventSink for mpsc::UnboundedSender<PtyEvent> {
    fn emit(&self, event: PtyEvent) {
        // A closed receiver means the app is shutting down.
        let _ = self.send(event);
    }
}

//! Per-PTY background threads.
//!
//! Every PTY gets two dedicated OS threads because both PTY reads and child
//! waits block: a reader that forwards output and a reaper that waits for the
//! child and emits the single exit event. Neither touches any other PTY's
//! state, and both run under `catch_unwind` so a panic stays contained.

use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use portable_pty::Child;

use crate::events::{ExitInfo, PtyEvent, PtyEventSink, PtyId};
use crate::signals::SignalScanner;

/// How long the reaper waits for the reader to hit EOF after the child has
/// been reaped. A grandchild holding the pty open must not delay the exit.
pub const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Lifecycle of a PTY's child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Starting,
    Running,
    Exited,
}

struct GateState {
    process: ProcessState,
    output_open: bool,
    exit_sent: bool,
}

/// Serializes event emission for one PTY.
///
/// Output is only forwarded while the gate is open; kill and exit close it
/// under the same lock, so no output can slip out after either.
pub(crate) struct OutputGate {
    pty_id: PtyId,
    sink: Arc<dyn PtyEventSink>,
    state: Mutex<GateState>,
}

impl OutputGate {
    pub(crate) fn new(pty_id: PtyId, sink: Arc<dyn PtyEventSink>) -> Self {
        Self {
            pty_id,
            sink,
            state: Mutex::new(GateState {
                process: ProcessState::Starting,
                output_open: true,
                exit_sent: false,
            }),
        }
    }

    pub(crate) fn mark_running(&self) {
        let mut state = self.state.lock();
        if state.process == ProcessState::Starting {
            state.process = ProcessState::Running;
        }
    }

    pub(crate) fn process_state(&self) -> ProcessState {
        self.state.lock().process
    }

    /// Forward one chunk and the signals found in it. Returns `false` once
    /// the gate is closed; the chunk is discarded.
    fn forward(&self, data: &[u8], scanner: &mut SignalScanner) -> bool {
        let state = self.state.lock();
        if !state.output_open {
            return false;
        }
        self.sink.emit(PtyEvent::Output {
            pty_id: self.pty_id,
            data: data.to_vec(),
        });
        for signal in scanner.scan(data) {
            self.sink.emit(PtyEvent::Signal {
                pty_id: self.pty_id,
                signal,
            });
        }
        true
    }

    /// Stop forwarding output. Used by kill.
    pub(crate) fn close(&self) {
        self.state.lock().output_open = false;
    }

    /// Emit the exit event if it has not been emitted yet.
    pub(crate) fn finish(&self, info: ExitInfo) -> bool {
        let mut state = self.state.lock();
        state.output_open = false;
        state.process = ProcessState::Exited;
        if state.exit_sent {
            return false;
        }
        state.exit_sent = true;
        self.sink.emit(PtyEvent::Exit {
            pty_id: self.pty_id,
            info,
        });
        true
    }
}

/// Start the read loop for a PTY on a dedicated OS thread.
///
/// `done` is dropped when the loop ends, which tells the reaper the pipe
/// has been drained.
pub(crate) fn start_reader_thread(
    pty_id: PtyId,
    reader: Box<dyn Read + Send>,
    gate: Arc<OutputGate>,
    done: mpsc::Sender<()>,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name(format!("pty-read-{pty_id}"))
        .spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(|| read_loop(pty_id, reader, &gate)));
            if result.is_err() {
                log::error!("[Supervisor] reader for pty {pty_id} panicked");
                gate.close();
            }
            drop(done);
        })
        .map(|_| ())
}

fn read_loop(pty_id: PtyId, mut reader: Box<dyn Read + Send>, gate: &OutputGate) {
    let mut buf = [0u8; 65536];
    let mut scanner = SignalScanner::new();
    let mut discarded = 0usize;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // EIO once the slave side is gone: the pty is closed.
            Err(_) => break,
        };
        if !gate.forward(&buf[..n], &mut scanner) {
            discarded += n;
        }
    }

    if discarded > 0 {
        log::debug!("[Supervisor] discarded {discarded} bytes from closed pty {pty_id}");
    }
}

/// Start the reaper for a PTY on a dedicated OS thread.
///
/// Waits for the child, gives the reader a short grace period to drain,
/// runs `on_exit` (bookkeeping) and then emits the exit event.
pub(crate) fn start_reaper_thread<F>(
    pty_id: PtyId,
    mut child: Box<dyn Child + Send + Sync>,
    gate: Arc<OutputGate>,
    reader_done: mpsc::Receiver<()>,
    on_exit: F,
) -> std::io::Result<()>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(format!("pty-reap-{pty_id}"))
        .spawn(move || {
            let waited = catch_unwind(AssertUnwindSafe(|| child.wait()));
            let info = match waited {
                Ok(Ok(status)) => ExitInfo::from(status),
                Ok(Err(e)) => {
                    log::warn!("[Supervisor] waiting for pty {pty_id} failed: {e}");
                    ExitInfo::with_code(1)
                }
                Err(_) => {
                    log::error!("[Supervisor] reaper for pty {pty_id} panicked while waiting");
                    ExitInfo::with_code(1)
                }
            };

            if let Err(mpsc::RecvTimeoutError::Timeout) = reader_done.recv_timeout(EXIT_DRAIN_GRACE) {
                log::debug!("[Supervisor] pty {pty_id} still open after exit, dropping the rest");
            }

            if catch_unwind(AssertUnwindSafe(on_exit)).is_err() {
                log::error!("[Supervisor] exit bookkeeping for pty {pty_id} panicked");
            }

            log::info!(
                "[Supervisor] pty {pty_id} exited (code {}, signal {:?})",
                info.code,
                info.signal
            );
            gate.finish(info);
        })
        .map(|_| ())
}

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use portable_pty::ChildKiller;

use crate::events::{PtyEventSink, PtyId};
use crate::io_thread::{start_reader_thread, start_reaper_thread, OutputGate, ProcessState};
use crate::launch::{resolve_directory, LaunchConfig, PtyKind};
use crate::pids::PidFile;
use crate::pty::{PtyHandle, SpawnError, SpawnedPty};

/// Time a killed process group gets to handle SIGHUP before SIGKILL.
pub const KILL_GRACE: Duration = Duration::from_millis(100);

/// Parameters for [`PtySupervisor::spawn`].
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// The worktree, project or scratch entity the terminal belongs to.
    pub entity_id: String,
    pub kind: PtyKind,
    pub cols: u16,
    pub rows: u16,
    /// Working directory; the home directory when `None`.
    pub directory: Option<PathBuf>,
    /// Task name, required for [`PtyKind::Task`].
    pub task: Option<String>,
}

impl SpawnRequest {
    pub fn new(entity_id: impl Into<String>, kind: PtyKind, cols: u16, rows: u16) -> Self {
        Self {
            entity_id: entity_id.into(),
            kind,
            cols,
            rows,
            directory: None,
            task: None,
        }
    }

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }
}

/// Snapshot of a live PTY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyInfo {
    pub id: PtyId,
    pub entity_id: String,
    pub kind: PtyKind,
    pub cols: u16,
    pub rows: u16,
    pub state: ProcessState,
    pub pid: Option<u32>,
}

struct PtyEntry {
    entity_id: String,
    kind: PtyKind,
    pid: Option<u32>,
    handle: Mutex<PtyHandle>,
    size: Mutex<(u16, u16)>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    gate: Arc<OutputGate>,
    killed: AtomicBool,
}

struct Inner {
    config: RwLock<LaunchConfig>,
    sink: Arc<dyn PtyEventSink>,
    ptys: Mutex<HashMap<PtyId, Arc<PtyEntry>>>,
    next_id: AtomicU64,
    pid_file: Option<Arc<PidFile>>,
}

/// Owns every live pseudo-terminal: spawns, writes, resizes and kills them,
/// and pushes their output and exit events to the sink.
///
/// Cheap to clone; clones share the same PTYs.
#[derive(Clone)]
pub struct PtySupervisor {
    inner: Arc<Inner>,
}

impl PtySupervisor {
    pub fn new(config: LaunchConfig, sink: impl PtyEventSink) -> Self {
        Self::build(config, Arc::new(sink), None)
    }

    /// Like [`PtySupervisor::new`], recording child pids in `pid_file` for
    /// crash recovery.
    pub fn with_pid_file(config: LaunchConfig, sink: impl PtyEventSink, pid_file: PidFile) -> Self {
        Self::build(config, Arc::new(sink), Some(Arc::new(pid_file)))
    }

    fn build(
        config: LaunchConfig,
        sink: Arc<dyn PtyEventSink>,
        pid_file: Option<Arc<PidFile>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: RwLock::new(config),
                sink,
                ptys: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                pid_file,
            }),
        }
    }

    /// Replace the launch configuration. Affects future spawns only.
    pub fn set_config(&self, config: LaunchConfig) {
        *self.inner.config.write() = config;
    }

    /// Start a process in a new PTY sized `cols` x `rows`.
    ///
    /// Blocks for the fork/exec; run it off the async runtime. On error no
    /// id is handed out and no child is left running.
    pub fn spawn(&self, request: SpawnRequest) -> Result<PtyId, SpawnError> {
        self.spawn_with(request, |_| {})
    }

    /// Like [`PtySupervisor::spawn`], calling `on_id` with the new id before
    /// the PTY can produce any event. Consumers use it to register routing
    /// for the id so no early output is missed.
    ///
    /// `on_id` runs before the reader and reaper threads start, since they
    /// may emit at once. If starting either thread fails, the error is
    /// returned after `on_id` ran: that id is used up (never reused, never
    /// emits) and the caller must undo whatever it registered for it.
    pub fn spawn_with<F>(&self, request: SpawnRequest, on_id: F) -> Result<PtyId, SpawnError>
    where
        F: FnOnce(PtyId),
    {
        let cwd = resolve_directory(request.directory.as_deref())?;
        let spec = self
            .inner
            .config
            .read()
            .resolve(request.kind, request.task.as_deref(), cwd)?;

        let SpawnedPty {
            handle,
            reader,
            mut child,
        } = PtyHandle::spawn(&spec, request.cols, request.rows)?;

        let pid = child.process_id();
        let killer = child.clone_killer();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let gate = Arc::new(OutputGate::new(id, Arc::clone(&self.inner.sink)));

        let entry = Arc::new(PtyEntry {
            entity_id: request.entity_id.clone(),
            kind: request.kind,
            pid,
            handle: Mutex::new(handle),
            size: Mutex::new((request.cols, request.rows)),
            killer,
            gate: Arc::clone(&gate),
            killed: AtomicBool::new(false),
        });

        // Registered before the threads start so the reaper's cleanup
        // always finds it.
        self.inner.ptys.lock().insert(id, Arc::clone(&entry));
        on_id(id);

        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        if let Err(e) = start_reader_thread(id, reader, Arc::clone(&gate), done_tx) {
            self.inner.ptys.lock().remove(&id);
            let _ = child.kill();
            let _ = child.wait();
            return Err(SpawnError::Thread(e));
        }

        if let Some(pid_file) = &self.inner.pid_file {
            if let Some(pid) = pid {
                pid_file.add(pid);
            }
        }

        let weak = Arc::downgrade(&self.inner);
        let on_exit = move || forget(&weak, id, pid);
        if let Err(e) = start_reaper_thread(id, child, Arc::clone(&gate), done_rx, on_exit) {
            // The child went down with the closure; make sure it dies.
            gate.close();
            forget(&Arc::downgrade(&self.inner), id, pid);
            terminate(pid, entry.killer.clone_killer());
            return Err(SpawnError::Thread(e));
        }

        gate.mark_running();
        log::info!(
            "[Supervisor] spawned pty {id} ({} for {}, pid {:?}) {}x{} in {}",
            request.kind,
            request.entity_id,
            pid,
            request.cols,
            request.rows,
            spec.cwd.display()
        );
        Ok(id)
    }

    fn entry(&self, pty_id: PtyId) -> Option<Arc<PtyEntry>> {
        self.inner.ptys.lock().get(&pty_id).cloned()
    }

    /// Forward user input. Unknown or killed ids are ignored.
    pub fn write(&self, pty_id: PtyId, data: &[u8]) {
        let Some(entry) = self.entry(pty_id) else {
            log::debug!("[Supervisor] write to unknown pty {pty_id}, already closed");
            return;
        };
        if entry.killed.load(Ordering::SeqCst) {
            log::debug!("[Supervisor] write to killed pty {pty_id} ignored");
            return;
        }
        let result = entry.handle.lock().write(data);
        if let Err(e) = result {
            log::debug!("[Supervisor] write to pty {pty_id} failed: {e}");
        }
    }

    /// Change the window size. Unknown ids are ignored.
    pub fn resize(&self, pty_id: PtyId, cols: u16, rows: u16) {
        let Some(entry) = self.entry(pty_id) else {
            log::debug!("[Supervisor] resize of unknown pty {pty_id}, already closed");
            return;
        };
        let result = entry.handle.lock().resize(cols, rows);
        match result {
            Ok(()) => *entry.size.lock() = (cols, rows),
            Err(e) => log::debug!("[Supervisor] resize of pty {pty_id} failed: {e}"),
        }
    }

    /// Request termination without waiting for it.
    ///
    /// Output stops immediately; the exit event follows once the child has
    /// been reaped. Calling this again, or after exit, does nothing.
    pub fn kill(&self, pty_id: PtyId) {
        let Some(entry) = self.entry(pty_id) else {
            log::debug!("[Supervisor] kill of unknown pty {pty_id}, already closed");
            return;
        };
        if entry.killed.swap(true, Ordering::SeqCst) {
            log::debug!("[Supervisor] pty {pty_id} already killed");
            return;
        }
        entry.gate.close();

        let pid = entry.pid;
        let killer = entry.killer.clone_killer();
        let spawned = std::thread::Builder::new()
            .name(format!("pty-kill-{pty_id}"))
            .spawn(move || terminate(pid, killer));
        if let Err(e) = spawned {
            log::warn!("[Supervisor] could not start kill thread for pty {pty_id}: {e}");
            if let Some(pid) = pid {
                crate::pids::kill_process_group(pid, crate::pids::Signal::Kill);
            }
        }
        log::info!("[Supervisor] kill requested for pty {pty_id}");
    }

    /// Kill every live PTY. Used on application exit.
    pub fn shutdown(&self) {
        for id in self.live_ids() {
            self.kill(id);
        }
    }

    pub fn info(&self, pty_id: PtyId) -> Option<PtyInfo> {
        let entry = self.entry(pty_id)?;
        let (cols, rows) = *entry.size.lock();
        Some(PtyInfo {
            id: pty_id,
            entity_id: entry.entity_id.clone(),
            kind: entry.kind,
            cols,
            rows,
            state: entry.gate.process_state(),
            pid: entry.pid,
        })
    }

    /// Ids of all PTYs whose exit has not been delivered yet, ascending.
    pub fn live_ids(&self) -> Vec<PtyId> {
        let mut ids: Vec<PtyId> = self.inner.ptys.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Exit bookkeeping, run by the reaper before the exit event goes out.
fn forget(inner: &Weak<Inner>, pty_id: PtyId, pid: Option<u32>) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    inner.ptys.lock().remove(&pty_id);
    if let (Some(pid_file), Some(pid)) = (&inner.pid_file, pid) {
        pid_file.remove(pid);
    }
}

/// Hang up the child's process group, escalating to SIGKILL if anything in
/// it survives the grace period.
fn terminate(pid: Option<u32>, mut killer: Box<dyn ChildKiller + Send + Sync>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        use crate::pids::{is_group_alive, kill_process_group, Signal};

        if kill_process_group(pid, Signal::Hangup) {
            std::thread::sleep(KILL_GRACE);
            if is_group_alive(pid) {
                kill_process_group(pid, Signal::Kill);
            }
            return;
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(e) = killer.kill() {
        log::debug!("[Supervisor] kill failed, process likely gone: {e}");
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for entry in self.ptys.get_mut().values() {
            entry.gate.close();
            let _ = entry.killer.clone_killer().kill();
        }
    }
}

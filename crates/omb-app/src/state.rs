//! Application state shared between controllers and the event pump.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use omb_pty::{ExitInfo, PidFile, PtyEvent, PtyId, PtyKind, PtySupervisor};
use omb_tabs::{SessionId, TabId, TabStore};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::registry::{Clipboard, PtyTerminal, TerminalRegistry};
use crate::resize::ResizeDebouncer;
use crate::router::EventRouter;
use crate::task_status::TaskStatus;

/// Where a tab's terminal is in its life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabPhase {
    /// The tab exists, its process is still starting.
    Loading,
    Ready(PtyId),
    /// The process could not be started.
    Failed(String),
    Exited(ExitInfo),
}

/// Runtime side of a tab, next to its record in the store.
pub struct TabRuntime {
    pub session: SessionId,
    pub kind: PtyKind,
    pub phase: TabPhase,
    pub resize: ResizeDebouncer,
    /// Copy/paste endpoint, once the PTY is up.
    pub terminal: Option<Arc<PtyTerminal>>,
}

/// Everything the controllers need.
pub struct AppState {
    pub config: AppConfig,
    pub supervisor: PtySupervisor,
    /// The single mutation queue for tab state. Lock before `router`.
    pub store: Mutex<TabStore>,
    pub router: EventRouter,
    pub registry: TerminalRegistry,
    pub tabs: Mutex<HashMap<TabId, TabRuntime>>,
    pub task_statuses: Mutex<HashMap<TabId, TaskStatus>>,
    next_tab: AtomicU64,
}

impl AppState {
    /// Build the state. The returned receiver carries supervisor events and
    /// belongs to the event pump.
    pub fn new(
        config: AppConfig,
        clipboard: Arc<dyn Clipboard>,
        pid_file: Option<PidFile>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<PtyEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let supervisor = match pid_file {
            Some(pid_file) => PtySupervisor::with_pid_file(config.launch.clone(), tx, pid_file),
            None => PtySupervisor::new(config.launch.clone(), tx),
        };
        let state = Arc::new(Self {
            config,
            supervisor,
            store: Mutex::new(TabStore::new()),
            router: EventRouter::new(),
            registry: TerminalRegistry::new(clipboard),
            tabs: Mutex::new(HashMap::new()),
            task_statuses: Mutex::new(HashMap::new()),
            next_tab: AtomicU64::new(1),
        });
        (state, rx)
    }

    /// Allocate a process-wide unique tab id.
    pub fn next_tab_id(&self) -> TabId {
        format!("tab-{}", self.next_tab.fetch_add(1, Ordering::Relaxed))
    }

    pub fn resize_window(&self) -> Duration {
        Duration::from_millis(self.config.terminal.resize_debounce_ms)
    }

    pub fn phase(&self, tab: &str) -> Option<TabPhase> {
        self.tabs.lock().get(tab).map(|runtime| runtime.phase.clone())
    }

    pub fn pty_of(&self, tab: &str) -> Option<PtyId> {
        match self.tabs.lock().get(tab)?.phase {
            TabPhase::Ready(pty_id) => Some(pty_id),
            _ => None,
        }
    }

    pub fn task_status(&self, tab: &str) -> Option<TaskStatus> {
        self.task_statuses.lock().get(tab).copied()
    }

    /// Kill every PTY. Called once on exit.
    pub fn shutdown(&self) {
        log::info!("[App] shutting down {} ptys", self.supervisor.live_ids().len());
        self.supervisor.shutdown();
    }
}

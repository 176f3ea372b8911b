//! Commands for terminal tabs: open, type, resize, close.

use std::sync::Arc;

use omb_pty::{PtyKind, SpawnRequest};
use omb_tabs::{Tab, TabId};
use tokio::sync::mpsc;

use crate::ipc::TabEvent;
use crate::pump::closes_on_exit;
use crate::registry::{FocusTerminal, PtyTerminal};
use crate::resize::{ResizeDebouncer, ResizeTarget};
use crate::state::{AppState, TabPhase, TabRuntime};
use crate::task_status::TaskStatus;

use super::CommandError;

/// How to open a tab.
#[derive(Debug, Clone)]
pub struct OpenTabOptions {
    pub kind: PtyKind,
    /// Defaults to the task name, or "Terminal N".
    pub label: Option<String>,
    pub task: Option<String>,
    pub primary: bool,
    /// Initial size; the configured default when `None`.
    pub size: Option<(u16, u16)>,
}

impl OpenTabOptions {
    pub fn new(kind: PtyKind) -> Self {
        Self {
            kind,
            label: None,
            task: None,
            primary: false,
            size: None,
        }
    }

    pub fn task(name: impl Into<String>) -> Self {
        Self {
            task: Some(name.into()),
            ..Self::new(PtyKind::Task)
        }
    }
}

/// A freshly opened tab and its terminal data stream.
pub struct OpenedTab {
    pub tab_id: TabId,
    pub events: mpsc::UnboundedReceiver<TabEvent>,
}

/// Add a tab to `session` and start its process.
///
/// The tab is in the store, marked loading, before the process starts.
/// If the spawn fails the tab stays, marked failed, and the error is
/// returned.
pub async fn open_tab(
    state: &Arc<AppState>,
    session: &str,
    options: OpenTabOptions,
) -> Result<OpenedTab, CommandError> {
    let (cols, rows) = options.size.unwrap_or((
        state.config.terminal.default_cols,
        state.config.terminal.default_rows,
    ));
    let tab_id = state.next_tab_id();

    let directory = {
        let mut store = state.store.lock();
        let directory = store
            .session(session)
            .map(|s| s.directory.clone())
            .ok_or_else(|| CommandError::UnknownSession(session.to_string()))?;
        let label = match (&options.label, &options.task) {
            (Some(label), _) => label.clone(),
            (None, Some(task)) => task.clone(),
            (None, None) => store.next_label(session),
        };
        let mut tab = Tab::new(tab_id.clone(), label);
        if options.primary {
            tab = tab.primary();
        }
        if let Some(task) = &options.task {
            tab = tab.with_task(task.clone());
        }
        store.add_tab(session, tab);
        directory
    };

    let events = state.router.subscribe_tab(&tab_id);
    let target: Arc<dyn ResizeTarget> = Arc::new(state.supervisor.clone());
    state.tabs.lock().insert(
        tab_id.clone(),
        TabRuntime {
            session: session.to_string(),
            kind: options.kind,
            phase: TabPhase::Loading,
            resize: ResizeDebouncer::spawn(target, state.resize_window()),
            terminal: None,
        },
    );
    if options.task.is_some() {
        state
            .task_statuses
            .lock()
            .insert(tab_id.clone(), TaskStatus::Running);
    }

    let mut request = SpawnRequest::new(session, options.kind, cols, rows).directory(directory);
    request.task = options.task.clone();

    let spawn_state = Arc::clone(state);
    let bind_session = session.to_string();
    let bind_tab = tab_id.clone();
    let spawned = tokio::task::spawn_blocking(move || {
        let router = &spawn_state.router;
        spawn_state.supervisor.spawn_with(request, |pty_id| {
            if let Err(e) = router.bind(pty_id, &bind_session, &bind_tab) {
                log::error!("[Commands] {e}");
            }
        })
    })
    .await;

    let spawned = match spawned {
        Ok(result) => result.map_err(CommandError::from),
        Err(e) => Err(CommandError::from(e)),
    };
    let pty_id = match spawned {
        Ok(pty_id) => pty_id,
        Err(e) => {
            log::warn!("[Commands] failed to start tab {tab_id}: {e}");
            if let Some(pty_id) = state.router.release_tab(&tab_id) {
                state.router.unbind(pty_id);
            }
            if let Some(runtime) = state.tabs.lock().get_mut(&tab_id) {
                runtime.phase = TabPhase::Failed(e.to_string());
            }
            state.task_statuses.lock().remove(&tab_id);
            return Err(e);
        }
    };

    let mut tabs = state.tabs.lock();
    let Some(runtime) = tabs.get_mut(&tab_id) else {
        // Closed while loading.
        drop(tabs);
        state.router.release_tab(&tab_id);
        state.supervisor.kill(pty_id);
        return Err(CommandError::TabClosed(tab_id));
    };
    // The process may already be gone; the pump left the tab to us then.
    let exited = runtime.phase != TabPhase::Loading;
    if !exited {
        runtime.phase = TabPhase::Ready(pty_id);
    }
    runtime.terminal = Some(Arc::new(PtyTerminal::new(pty_id, state.supervisor.clone())));
    runtime.resize.attach(pty_id, cols, rows);
    let kind = runtime.kind;
    drop(tabs);

    if exited {
        log::info!("[Commands] tab {tab_id} in {session} exited while starting");
        // The exit event is already queued on `events`.
        if closes_on_exit(state, kind) {
            if let Err(e) = close_tab(state, &tab_id) {
                log::debug!("[Commands] auto-close of {tab_id} skipped: {e}");
            }
        }
    } else {
        log::info!("[Commands] tab {tab_id} in {session} ready on pty {pty_id}");
    }
    Ok(OpenedTab { tab_id, events })
}

/// Send keystrokes to a tab. Input for a tab that is not running is
/// dropped.
pub fn write_input(state: &AppState, tab: &str, data: &[u8]) -> Result<(), CommandError> {
    let phase = state
        .phase(tab)
        .ok_or_else(|| CommandError::UnknownTab(tab.to_string()))?;
    match phase {
        TabPhase::Ready(pty_id) => state.supervisor.write(pty_id, data),
        other => log::debug!("[Commands] input for tab {tab} in phase {other:?} dropped"),
    }
    Ok(())
}

/// Ask for a new size. Bursts are coalesced per tab.
pub fn request_resize(state: &AppState, tab: &str, cols: u16, rows: u16) -> Result<(), CommandError> {
    let tabs = state.tabs.lock();
    let runtime = tabs
        .get(tab)
        .ok_or_else(|| CommandError::UnknownTab(tab.to_string()))?;
    runtime.resize.request(cols, rows);
    Ok(())
}

/// Close a tab, killing its process, and return the session's next active
/// tab.
pub fn close_tab(state: &AppState, tab: &str) -> Result<Option<TabId>, CommandError> {
    let session = state
        .store
        .lock()
        .session_of(tab)
        .map(str::to_string)
        .ok_or_else(|| CommandError::UnknownTab(tab.to_string()))?;

    discard_tab(state, tab);
    let next = state.store.lock().remove_tab(&session, tab);
    log::info!("[Commands] closed tab {tab} in {session}, next active {next:?}");
    Ok(next)
}

/// Tear down everything a tab owns except its store record.
pub(crate) fn discard_tab(state: &AppState, tab: &str) {
    let runtime = state.tabs.lock().remove(tab);
    let bound = state.router.release_tab(tab);

    let pty_id = bound.or_else(|| match runtime.as_ref().map(|r| &r.phase) {
        Some(TabPhase::Ready(pty_id)) => Some(*pty_id),
        _ => None,
    });
    if let Some(pty_id) = pty_id {
        state.supervisor.kill(pty_id);
    }
    if let Some(terminal) = runtime.and_then(|r| r.terminal) {
        let terminal: Arc<dyn FocusTerminal> = terminal;
        state.registry.unregister_active(&terminal);
    }
    state.task_statuses.lock().remove(tab);
}

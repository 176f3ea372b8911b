//! Commands for sessions: worktrees, projects and scratch terminals.

use omb_tabs::{Session, TabId};
use tokio::sync::mpsc;

use crate::commands::terminal::discard_tab;
use crate::ipc::SessionEvent;
use crate::state::AppState;

/// Register a session and subscribe to its signals.
pub fn open_session(state: &AppState, session: Session) -> mpsc::UnboundedReceiver<SessionEvent> {
    let id = session.id.clone();
    if state.store.lock().open_session(session) {
        log::info!("[Commands] opened session {id}");
    }
    state.router.subscribe_session(&id)
}

/// Kill all of a session's terminals and drop its tabs, keeping the
/// session itself.
pub fn clear_session(state: &AppState, session: &str) -> Vec<TabId> {
    let tabs: Vec<TabId> = state
        .store
        .lock()
        .tabs(session)
        .iter()
        .map(|t| t.id.clone())
        .collect();
    for tab in &tabs {
        discard_tab(state, tab);
    }
    state.store.lock().clear_session_tabs(session)
}

/// Kill all of a session's terminals and forget it, e.g. when its
/// worktree is deleted.
pub fn close_session(state: &AppState, session: &str) -> Vec<TabId> {
    let removed = clear_session(state, session);
    state.store.lock().close_session(session);
    state.router.release_session(session);
    log::info!("[Commands] closed session {session} ({} tabs)", removed.len());
    removed
}

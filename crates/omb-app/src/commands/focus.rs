//! Focus, selection and clipboard commands.

use std::sync::Arc;

use crate::registry::FocusTerminal;
use crate::state::AppState;

use super::CommandError;

fn session_of(state: &AppState, tab: &str) -> Result<String, CommandError> {
    state
        .store
        .lock()
        .session_of(tab)
        .map(str::to_string)
        .ok_or_else(|| CommandError::UnknownTab(tab.to_string()))
}

/// A tab's terminal took keyboard focus: it becomes the session's
/// last-active tab and the copy/paste target.
pub fn focus_tab(state: &AppState, tab: &str) -> Result<(), CommandError> {
    let session = session_of(state, tab)?;
    state.store.lock().mark_focused(&session, tab);
    let terminal = state
        .tabs
        .lock()
        .get(tab)
        .and_then(|runtime| runtime.terminal.clone());
    if let Some(terminal) = terminal {
        state.registry.register_active(terminal);
    }
    Ok(())
}

/// A tab's terminal lost focus or unmounted.
pub fn blur_tab(state: &AppState, tab: &str) {
    let terminal = state
        .tabs
        .lock()
        .get(tab)
        .and_then(|runtime| runtime.terminal.clone());
    if let Some(terminal) = terminal {
        let terminal: Arc<dyn FocusTerminal> = terminal;
        state.registry.unregister_active(&terminal);
    }
}

/// Make a tab the visible one in its session and focus it.
pub fn select_tab(state: &AppState, tab: &str) -> Result<(), CommandError> {
    let session = session_of(state, tab)?;
    state.store.lock().set_active_tab(&session, tab);
    focus_tab(state, tab)
}

/// The UI reports what is selected in a tab's terminal.
pub fn set_selection(state: &AppState, tab: &str, selection: Option<String>) {
    if let Some(terminal) = state.tabs.lock().get(tab).and_then(|r| r.terminal.as_ref()) {
        terminal.set_selection(selection);
    }
}

pub fn copy_selection(state: &AppState) -> bool {
    state.registry.copy_from_active()
}

pub fn paste_clipboard(state: &AppState) -> bool {
    state.registry.paste_to_active()
}

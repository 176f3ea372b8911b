//! Event pump that drains supervisor events through the router.
//!
//! One pump per app. Each event is routed while holding the tab store lock,
//! so ambient signals are filtered against the focus state at the moment
//! they arrive. Exits update the tab's phase afterwards, outside the lock.

use std::sync::Arc;

use omb_pty::{PtyEvent, PtyKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::commands::terminal::close_tab;
use crate::router::{Delivery, TabExit};
use crate::state::{AppState, TabPhase};
use crate::task_status::TaskStatus;

/// Start the pump. It stops on a message on `stop_rx`, when the stop
/// sender is dropped, or when the supervisor goes away.
pub fn start_event_pump(
    state: Arc<AppState>,
    mut events: mpsc::UnboundedReceiver<PtyEvent>,
    mut stop_rx: mpsc::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = stop_rx.recv() => return,
            };
            let Some(event) = event else {
                log::debug!("[Pump] supervisor channel closed");
                return;
            };

            let delivery = {
                let store = state.store.lock();
                state.router.route(event, &store)
            };
            if let Delivery::Exited(exit) = delivery {
                handle_exit(&state, exit);
            }
        }
    })
}

fn handle_exit(state: &AppState, exit: TabExit) {
    let TabExit { session, tab, info } = exit;
    log::info!(
        "[Pump] tab {tab} in {session} exited with code {}{}",
        info.code,
        info.signal
            .as_deref()
            .map(|s| format!(" ({s})"))
            .unwrap_or_default()
    );

    let (kind, was_loading) = {
        let mut tabs = state.tabs.lock();
        let Some(runtime) = tabs.get_mut(&tab) else {
            return;
        };
        let was_loading = runtime.phase == TabPhase::Loading;
        runtime.phase = TabPhase::Exited(info.clone());
        (runtime.kind, was_loading)
    };

    if kind == PtyKind::Task {
        state
            .task_statuses
            .lock()
            .insert(tab.clone(), TaskStatus::from_exit(&info));
    }
    // `open_tab` is still finishing this tab and closes it itself.
    if was_loading || !closes_on_exit(state, kind) {
        return;
    }
    if let Err(e) = close_tab(state, &tab) {
        log::debug!("[Pump] auto-close of {tab} skipped: {e}");
    }
}

/// Whether a tab of `kind` goes away when its process exits. Task tabs
/// stay so their status remains visible.
pub(crate) fn closes_on_exit(state: &AppState, kind: PtyKind) -> bool {
    kind != PtyKind::Task && state.config.terminal.auto_close_on_exit
}

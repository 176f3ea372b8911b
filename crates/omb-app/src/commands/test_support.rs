use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use omb_pty::LaunchConfig;
use tokio::sync::mpsc;

use crate::config::{AppConfig, TerminalConfig};
use crate::ipc::TabEvent;
use crate::pump::start_event_pump;
use crate::registry::MemoryClipboard;
use crate::state::AppState;

/// Keeps the event pump of a test app alive.
pub(crate) struct Pump {
    pub clipboard: Arc<MemoryClipboard>,
    _stop: mpsc::Sender<()>,
}

pub(crate) fn test_config() -> AppConfig {
    let tasks = BTreeMap::from([
        ("ok".to_string(), "exit 0".to_string()),
        ("fail".to_string(), "exit 3".to_string()),
        ("slow".to_string(), "sleep 30".to_string()),
    ]);
    AppConfig {
        launch: LaunchConfig {
            main_command: "/bin/sh".to_string(),
            shell: Some("/bin/sh".to_string()),
            tasks,
            env: BTreeMap::new(),
        },
        terminal: TerminalConfig {
            resize_debounce_ms: 50,
            ..TerminalConfig::default()
        },
    }
}

/// App state without a pid file, with its event pump running. Must be
/// called inside a tokio runtime.
pub(crate) fn app() -> (Arc<AppState>, Pump) {
    app_with(test_config())
}

pub(crate) fn app_with(config: AppConfig) -> (Arc<AppState>, Pump) {
    let clipboard = Arc::new(MemoryClipboard::default());
    let (state, events) = AppState::new(config, clipboard.clone(), None);
    let (stop_tx, stop_rx) = mpsc::channel(1);
    start_event_pump(Arc::clone(&state), events, stop_rx);
    (
        state,
        Pump {
            clipboard,
            _stop: stop_tx,
        },
    )
}

/// Read a tab's output until `needle` shows up or `timeout` passes.
pub(crate) async fn collect_output(
    rx: &mut mpsc::UnboundedReceiver<TabEvent>,
    needle: &str,
    timeout: Duration,
) -> String {
    let mut output = String::new();
    let _ = tokio::time::timeout(timeout, async {
        while let Some(event) = rx.recv().await {
            match event {
                TabEvent::Output { data } => {
                    output.push_str(&String::from_utf8_lossy(&data));
                    if output.contains(needle) {
                        return;
                    }
                }
                TabEvent::Exited { .. } => return,
            }
        }
    })
    .await;
    output
}

/// Wait for the tab's exit event, skipping output.
pub(crate) async fn wait_exit(
    rx: &mut mpsc::UnboundedReceiver<TabEvent>,
    timeout: Duration,
) -> Option<TabEvent> {
    tokio::time::timeout(timeout, async {
        while let Some(event) = rx.recv().await {
            if matches!(event, TabEvent::Exited { .. }) {
                return Some(event);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

/// Poll `check` every 20ms until it holds or `timeout` passes.
pub(crate) async fn wait_for(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

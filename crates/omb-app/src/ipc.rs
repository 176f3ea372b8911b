//! Events pushed to the UI.
//!
//! Serialized as tagged JSON, one channel per tab for terminal data and one
//! per session for signals about its tabs.

use std::path::PathBuf;

use omb_pty::ExitInfo;
use omb_tabs::TabId;
use serde::Serialize;

/// Events for one tab's terminal surface.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum TabEvent {
    /// Raw bytes produced by the tab's process.
    Output { data: Vec<u8> },
    /// The tab's process ended. Always the last event of a tab.
    Exited { code: u32, signal: Option<String> },
}

impl From<&ExitInfo> for TabEvent {
    fn from(info: &ExitInfo) -> Self {
        TabEvent::Exited {
            code: info.code,
            signal: info.signal.clone(),
        }
    }
}

/// Events for a session's chrome: tab strip, sidebar, notifications.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// Desktop notification requested by a terminal.
    Notification {
        tab: TabId,
        title: String,
        body: String,
    },
    TitleChanged { tab: TabId, title: String },
    Bell { tab: TabId },
    /// Scratch terminals follow their shell's working directory.
    DirectoryChanged { tab: TabId, path: PathBuf },
}

impl SessionEvent {
    pub fn tab(&self) -> &str {
        match self {
            SessionEvent::Notification { tab, .. }
            | SessionEvent::TitleChanged { tab, .. }
            | SessionEvent::Bell { tab }
            | SessionEvent::DirectoryChanged { tab, .. } => tab,
        }
    }
}

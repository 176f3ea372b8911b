//! Which terminal receives global copy and paste.
//!
//! At most one terminal is registered at a time. Terminals register when
//! they gain focus and unregister when they unmount; an unregister that
//! arrives after a newer terminal registered must not clear it.

use std::sync::Arc;

use omb_pty::{PtyId, PtySupervisor};
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("clipboard unavailable: {0}")]
pub struct ClipboardError(#[from] pub arboard::Error);

/// System clipboard access.
pub trait Clipboard: Send + Sync {
    fn get_text(&self) -> Result<String, ClipboardError>;
    fn set_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// The OS clipboard through `arboard`. A fresh handle per call, since
/// some backends are not `Send`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn get_text(&self) -> Result<String, ClipboardError> {
        Ok(arboard::Clipboard::new()?.get_text()?)
    }

    fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        arboard::Clipboard::new()?.set_text(text)?;
        Ok(())
    }
}

/// A terminal surface that can take part in copy and paste.
pub trait FocusTerminal: Send + Sync {
    /// Currently selected text, if any.
    fn selection(&self) -> Option<String>;
    /// Insert text as if typed. Failures stay inside the terminal.
    fn paste(&self, text: &str);
}

/// Focus-scoped registry of the terminal that owns copy and paste.
pub struct TerminalRegistry {
    active: Mutex<Option<Arc<dyn FocusTerminal>>>,
    clipboard: Arc<dyn Clipboard>,
}

impl TerminalRegistry {
    pub fn new(clipboard: Arc<dyn Clipboard>) -> Self {
        Self {
            active: Mutex::new(None),
            clipboard,
        }
    }

    /// Make `terminal` the target, replacing any previous one.
    pub fn register_active(&self, terminal: Arc<dyn FocusTerminal>) {
        *self.active.lock() = Some(terminal);
    }

    /// Clear the target, but only if it is still `terminal`.
    pub fn unregister_active(&self, terminal: &Arc<dyn FocusTerminal>) -> bool {
        let mut active = self.active.lock();
        match active.as_ref() {
            Some(current) if same_terminal(current, terminal) => {
                *active = None;
                true
            }
            _ => false,
        }
    }

    pub fn has_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Copy the target's selection to the clipboard.
    ///
    /// `false` if nothing is registered, nothing is selected, or the
    /// clipboard refused the text.
    pub fn copy_from_active(&self) -> bool {
        let Some(terminal) = self.active.lock().clone() else {
            return false;
        };
        let Some(text) = terminal.selection().filter(|s| !s.is_empty()) else {
            return false;
        };
        match self.clipboard.set_text(&text) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[Registry] copy failed: {e}");
                false
            }
        }
    }

    /// Paste the clipboard into the target.
    ///
    /// `false` only if nothing is registered.
    pub fn paste_to_active(&self) -> bool {
        let Some(terminal) = self.active.lock().clone() else {
            return false;
        };
        match self.clipboard.get_text() {
            Ok(text) => terminal.paste(&text),
            Err(e) => log::debug!("[Registry] nothing to paste: {e}"),
        }
        true
    }
}

/// Compare by allocation, ignoring vtable pointers.
fn same_terminal(a: &Arc<dyn FocusTerminal>, b: &Arc<dyn FocusTerminal>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// A tab's terminal as seen by the registry: the UI reports the selection,
/// pastes go to the PTY.
pub struct PtyTerminal {
    pty_id: PtyId,
    supervisor: PtySupervisor,
    selection: Mutex<Option<String>>,
}

impl PtyTerminal {
    pub fn new(pty_id: PtyId, supervisor: PtySupervisor) -> Self {
        Self {
            pty_id,
            supervisor,
            selection: Mutex::new(None),
        }
    }

    pub fn set_selection(&self, selection: Option<String>) {
        *self.selection.lock() = selection;
    }
}

impl FocusTerminal for PtyTerminal {
    fn selection(&self) -> Option<String> {
        self.selection.lock().clone()
    }

    fn paste(&self, text: &str) {
        // Line breaks arrive as Enter, like a terminal sends them.
        let data = text.replace("\r\n", "\r").replace('\n', "\r");
        self.supervisor.write(self.pty_id, data.as_bytes());
    }
}

/// In-process clipboard for tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemoryClipboard {
    pub(crate) text: Mutex<Option<String>>,
}

#[cfg(test)]
impl Clipboard for MemoryClipboard {
    fn get_text(&self) -> Result<String, ClipboardError> {
        self.text
            .lock()
            .clone()
            .ok_or(ClipboardError(arboard::Error::ContentNotAvailable))
    }

    fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        *self.text.lock() = Some(text.to_string());
        Ok(())
    }
}

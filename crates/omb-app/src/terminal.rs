//! The controlling terminal of `omb run`.

use crossterm::terminal::{disable_raw_mode, enable_raw_mode, is_raw_mode_enabled, size};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("failed to enable raw mode: {0}")]
    EnableRawMode(#[source] std::io::Error),
}

/// Raw mode for as long as the guard lives, so every keystroke, Ctrl+C
/// included, goes to the child. Restored on drop, panics included.
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    pub fn new() -> Result<Self, TerminalError> {
        enable_raw_mode().map_err(TerminalError::EnableRawMode)?;
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if is_raw_mode_enabled().unwrap_or(true) {
            let _ = disable_raw_mode();
        }
    }
}

/// Current size as `(cols, rows)`, the order the supervisor takes.
pub fn terminal_size() -> Option<(u16, u16)> {
    match size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => Some((cols, rows)),
        Ok(_) => None,
        Err(e) => {
            log::debug!("[Terminal] size unavailable: {e}");
            None
        }
    }
}

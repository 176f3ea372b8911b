//! Crash recovery for PTY children.
//!
//! Each app instance records the pids of its live PTY children in
//! `<dir>/<app pid>.json`. If the app dies without cleaning up, the next
//! instance (or the watchdog) finds the file, sees the recorded owner is
//! gone and kills the orphaned process groups.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// On-disk record for one app instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PidRecord {
    pub pty_pids: Vec<u32>,
    /// Unix timestamp of the last update.
    pub timestamp: u64,
}

/// The pid file of one app instance. Updates are serialized and written
/// atomically (temp file + rename).
pub struct PidFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PidFile {
    /// The pid file for this process inside `dir`.
    pub fn for_current_process(dir: impl AsRef<Path>) -> Self {
        Self::for_instance(dir, std::process::id())
    }

    pub fn for_instance(dir: impl AsRef<Path>, app_pid: u32) -> Self {
        Self {
            path: dir.as_ref().join(format!("{app_pid}.json")),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create (or reset) the file with no recorded pids.
    pub fn init(&self) -> std::io::Result<()> {
        let _guard = self.lock.lock();
        save(&self.path, &PidRecord {
            pty_pids: Vec::new(),
            timestamp: now(),
        })?;
        log::info!("[Cleanup] Initialized pid file {}", self.path.display());
        Ok(())
    }

    pub fn add(&self, pid: u32) {
        let _guard = self.lock.lock();
        let mut record = load(&self.path).unwrap_or_default();
        if record.pty_pids.contains(&pid) {
            return;
        }
        record.pty_pids.push(pid);
        record.timestamp = now();
        if let Err(e) = save(&self.path, &record) {
            log::warn!("[Cleanup] Failed to add pid {pid} to pid file: {e}");
        }
    }

    pub fn remove(&self, pid: u32) {
        let _guard = self.lock.lock();
        let Some(mut record) = load(&self.path) else {
            return;
        };
        record.pty_pids.retain(|&p| p != pid);
        record.timestamp = now();
        if let Err(e) = save(&self.path, &record) {
            log::warn!("[Cleanup] Failed to remove pid {pid} from pid file: {e}");
        }
    }

    pub fn pids(&self) -> Vec<u32> {
        let _guard = self.lock.lock();
        load(&self.path).map(|r| r.pty_pids).unwrap_or_default()
    }

    /// Remove the file on clean shutdown.
    pub fn delete(&self) {
        let _guard = self.lock.lock();
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::info!("[Cleanup] Deleted pid file on clean shutdown"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("[Cleanup] Failed to delete pid file: {e}"),
        }
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn load(path: &Path) -> Option<PidRecord> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn save(path: &Path, record: &PidRecord) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let temp = path.with_extension("json.tmp");
    let content = serde_json::to_string_pretty(record).map_err(std::io::Error::other)?;
    std::fs::write(&temp, content)?;
    std::fs::rename(&temp, path)
}

fn app_pid_from_path(path: &Path) -> Option<u32> {
    path.file_stem()?.to_str()?.parse().ok()
}

/// Kill the children recorded by app instances that are no longer running
/// and delete their pid files. Returns the number of files cleaned up.
///
/// Call before this instance spawns anything.
pub fn cleanup_orphans(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let current = std::process::id();
    let mut cleaned = 0;

    for path in entries.flatten().map(|e| e.path()) {
        if path.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        let Some(app_pid) = app_pid_from_path(&path) else {
            continue;
        };
        if app_pid == current {
            continue;
        }
        if is_process_alive(app_pid) {
            log::info!("[Cleanup] Skipping pid file of running instance {app_pid}");
            continue;
        }
        kill_recorded(&path);
        cleaned += 1;
    }
    cleaned
}

/// Kill every process group listed in a pid file, then delete the file.
pub fn kill_recorded(path: &Path) {
    if let Some(record) = load(path) {
        if !record.pty_pids.is_empty() {
            log::info!(
                "[Cleanup] Found {} orphaned pids in {}",
                record.pty_pids.len(),
                path.display()
            );
        }
        for pid in record.pty_pids {
            if is_process_alive(pid) {
                kill_process_group(pid, Signal::Kill);
                log::info!("[Cleanup] Killed orphaned process {pid}");
            }
        }
    }
    if let Err(e) = std::fs::remove_file(path) {
        log::debug!("[Cleanup] Could not remove {}: {e}", path.display());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Hangup,
    Kill,
}

/// Whether a process with this pid exists.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 only performs the existence and permission check.
    let result = unsafe { libc::kill(pid, 0) };
    result == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    false
}

/// Signal the process group led by `pid`. PTY children lead their own
/// session, so this reaches everything they started.
#[cfg(unix)]
pub fn kill_process_group(pid: u32, signal: Signal) -> bool {
    let Ok(pgid) = i32::try_from(pid) else {
        return false;
    };
    if pgid <= 1 {
        return false;
    }
    let signo = match signal {
        Signal::Hangup => libc::SIGHUP,
        Signal::Kill => libc::SIGKILL,
    };
    // SAFETY: plain syscall with validated arguments.
    unsafe { libc::killpg(pgid, signo) == 0 }
}

#[cfg(not(unix))]
pub fn kill_process_group(_pid: u32, _signal: Signal) -> bool {
    false
}

/// Whether any process of the group led by `pid` still exists.
#[cfg(unix)]
pub fn is_group_alive(pid: u32) -> bool {
    let Ok(pgid) = i32::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 only performs the existence check.
    pgid > 1 && unsafe { libc::killpg(pgid, 0) == 0 }
}

#[cfg(not(unix))]
pub fn is_group_alive(_pid: u32) -> bool {
    false
}

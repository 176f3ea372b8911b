//! Last-resort cleanup of PTY children when the app dies abnormally.
//!
//! Normal shutdown kills every PTY through the supervisor. Two paths cover
//! the rest: a panic hook that kills what this instance recorded in its pid
//! file, and a detached watchdog process that does the same once the app
//! process is gone, e.g. after SIGKILL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use omb_pty::pids;

/// How often the watchdog checks on its parent.
pub const WATCHDOG_POLL: Duration = Duration::from_millis(500);

/// Kill recorded children when the app panics, then run the previous hook.
pub fn install_panic_hook(pid_file: PathBuf) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        log::error!("[Panic] app panicked, killing recorded terminals");
        pids::kill_recorded(&pid_file);
        default_hook(panic_info);
    }));
    log::debug!("[Cleanup] panic hook installed");
}

/// Start `omb watchdog <this pid>` in its own session, detached from our
/// stdio, so it outlives this process.
#[cfg(unix)]
pub fn spawn_watchdog() {
    use std::os::unix::process::CommandExt;
    use std::process::{Command, Stdio};

    let current_pid = std::process::id();
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            log::warn!("[Watchdog] Failed to find own executable: {e}");
            return;
        }
    };

    let mut cmd = Command::new(exe);
    cmd.args(["watchdog", &current_pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    // SAFETY: setsid is async-signal-safe and touches no parent state.
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    match cmd.spawn() {
        Ok(child) => log::info!("[Watchdog] Spawned watchdog {} for {current_pid}", child.id()),
        Err(e) => log::warn!("[Watchdog] Failed to spawn watchdog: {e}"),
    }
}

#[cfg(not(unix))]
pub fn spawn_watchdog() {}

/// Body of `omb watchdog <pid>`: wait for the parent to die, then kill the
/// children it recorded under `pids_dir`.
pub fn run_watchdog(parent_pid: u32, pids_dir: &Path) {
    watch_parent(parent_pid, &pids_dir.join(format!("{parent_pid}.json")), WATCHDOG_POLL);
}

fn watch_parent(parent_pid: u32, pid_file: &Path, poll: Duration) {
    // Let the parent finish starting up.
    std::thread::sleep(poll);
    while pids::is_process_alive(parent_pid) {
        std::thread::sleep(poll);
    }
    if pid_file.exists() {
        log::info!("[Watchdog] parent {parent_pid} died, cleaning up");
        pids::kill_recorded(pid_file);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use omb_pty::PidFile;
    use std::os::unix::process::{CommandExt, ExitStatusExt};
    use std::process::Command;

    #[test]
    fn test_watchdog_kills_children_of_dead_parent() {
        let mut parent = Command::new("sleep").arg("0.2").spawn().unwrap();
        let parent_pid = parent.id();
        let mut orphan = Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let file = PidFile::for_instance(dir.path(), parent_pid);
        file.init().unwrap();
        file.add(orphan.id());

        let path = file.path().to_path_buf();
        let watcher = std::thread::spawn(move || {
            watch_parent(parent_pid, &path, Duration::from_millis(20))
        });
        parent.wait().unwrap();
        watcher.join().unwrap();

        assert!(!file.path().exists());
        assert_eq!(orphan.wait().unwrap().signal(), Some(libc::SIGKILL));
    }

    #[test]
    fn test_watchdog_without_pid_file_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        watch_parent(999_999_999, &dir.path().join("999999999.json"), Duration::from_millis(1));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}

//! omb - run an onemanband terminal from the command line.
//!
//! `omb run` opens a session for a directory, starts one tab in it and
//! attaches the tab to this terminal. `omb watchdog <pid>` is started by
//! `omb run` itself and kills the PTYs of a parent that died abruptly.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use omb_app::commands::sessions::{close_session, open_session};
use omb_app::commands::terminal::{open_tab, request_resize, write_input, OpenTabOptions};
use omb_app::ipc::TabEvent;
use omb_app::registry::SystemClipboard;
use omb_app::{cleanup, config, pump, terminal, AppConfig, AppState};
use omb_pty::{pids, PidFile, PtyKind};
use omb_tabs::{Session, SessionKind};
use tokio::sync::mpsc;

/// Supervised terminals for agents, shells and tasks.
#[derive(Parser, Debug)]
#[command(name = "omb", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a terminal and attach it to this one
    Run {
        /// What to run
        #[arg(long, value_enum, default_value_t = Kind::Shell)]
        kind: Kind,

        /// Working directory (defaults to the current one)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Configured task to run, implies `--kind task`
        #[arg(long)]
        task: Option<String>,
    },

    /// Wait for a parent process to die, then kill its terminals
    #[command(hide = true)]
    Watchdog {
        /// Pid of the process to watch
        pid: u32,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    Main,
    Shell,
    Task,
    Scratch,
}

impl From<Kind> for PtyKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Main => PtyKind::Main,
            Kind::Shell => PtyKind::Shell,
            Kind::Task => PtyKind::Task,
            Kind::Scratch => PtyKind::Scratch,
        }
    }
}

fn init_logging(default_filter: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Watchdog { pid } => {
            init_logging("info");
            cleanup::run_watchdog(pid, &config::pids_dir());
            Ok(())
        }
        Commands::Run { kind, dir, task } => {
            // Log lines would tear through the attached terminal.
            init_logging("warn");
            let kind = if task.is_some() { PtyKind::Task } else { kind.into() };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start runtime")?;
            let code = runtime.block_on(run(kind, dir, task))?;
            // Blocked stdin readers would otherwise hold the runtime open.
            runtime.shutdown_background();
            std::process::exit(code);
        }
    }
}

async fn run(kind: PtyKind, dir: Option<PathBuf>, task: Option<String>) -> anyhow::Result<i32> {
    let pids_dir = config::pids_dir();
    let cleaned = pids::cleanup_orphans(&pids_dir);
    if cleaned > 0 {
        log::info!("[Startup] cleaned up after {cleaned} dead instances");
    }
    let pid_file = PidFile::for_current_process(&pids_dir);
    pid_file
        .init()
        .with_context(|| format!("failed to create {}", pid_file.path().display()))?;
    cleanup::install_panic_hook(pid_file.path().to_path_buf());
    cleanup::spawn_watchdog();

    let directory = match dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("no current directory")?,
    };
    let session_kind = if kind == PtyKind::Scratch {
        SessionKind::Scratch
    } else {
        SessionKind::Project
    };

    let (state, events) = AppState::new(AppConfig::load(), Arc::new(SystemClipboard), Some(pid_file));
    let (stop_tx, stop_rx) = mpsc::channel(1);
    let pump = pump::start_event_pump(Arc::clone(&state), events, stop_rx);

    let session_id = "cli".to_string();
    let _signals = open_session(&state, Session::new(&session_id, session_kind, 0, &directory));

    let mut options = match task {
        Some(name) => OpenTabOptions::task(name),
        None => OpenTabOptions::new(kind),
    };
    options.primary = true;
    options.size = terminal::terminal_size();

    let opened = match open_tab(&state, &session_id, options).await {
        Ok(opened) => opened,
        Err(e) => {
            PidFile::for_current_process(&pids_dir).delete();
            return Err(e.into());
        }
    };
    let code = attach(&state, &opened.tab_id, opened.events).await;

    close_session(&state, &session_id);
    state.shutdown();
    let _ = stop_tx.send(()).await;
    let _ = pump.await;
    PidFile::for_current_process(&pids_dir).delete();
    Ok(code)
}

/// Pump stdin to the tab and its output to stdout until the process exits
/// or we are told to stop. Returns the exit code to report.
async fn attach(
    state: &Arc<AppState>,
    tab: &str,
    mut events: mpsc::UnboundedReceiver<TabEvent>,
) -> i32 {
    let _raw = match terminal::RawModeGuard::new() {
        Ok(guard) => Some(guard),
        Err(e) => {
            log::warn!("[Run] {e}, input is line buffered");
            None
        }
    };

    let (stdin_tx, mut stdin_rx) = mpsc::channel::<Vec<u8>>(64);
    tokio::task::spawn_blocking(move || {
        use std::io::Read;
        let mut stdin = std::io::stdin();
        let mut buf = [0u8; 4096];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if stdin_tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut resizes = window_changes();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(TabEvent::Output { data }) => {
                    let _ = stdout.write_all(&data);
                    let _ = stdout.flush();
                }
                Some(TabEvent::Exited { code, signal }) => {
                    if let Some(signal) = signal {
                        log::info!("[Run] terminal killed by {signal}");
                    }
                    return i32::try_from(code).unwrap_or(1);
                }
                None => return 1,
            },
            Some(data) = stdin_rx.recv() => {
                if let Err(e) = write_input(state, tab, &data) {
                    log::warn!("[Run] {e}");
                }
            }
            Some((cols, rows)) = resizes.recv() => {
                if let Err(e) = request_resize(state, tab, cols, rows) {
                    log::warn!("[Run] {e}");
                }
            }
            _ = &mut shutdown => {
                log::info!("[Run] interrupted, shutting down");
                return 130;
            }
        }
    }
}

/// Window size changes of the controlling terminal.
fn window_changes() -> mpsc::Receiver<(u16, u16)> {
    let (tx, rx) = mpsc::channel(4);
    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigwinch = match signal(SignalKind::window_change()) {
            Ok(s) => s,
            Err(e) => {
                log::debug!("[Run] no SIGWINCH handler: {e}");
                return;
            }
        };
        while sigwinch.recv().await.is_some() {
            if let Some(size) = terminal::terminal_size() {
                if tx.send(size).await.is_err() {
                    break;
                }
            }
        }
    });
    #[cfg(not(unix))]
    drop(tx);
    rx
}

/// Resolves on SIGTERM or SIGHUP. Ctrl+C goes to the child in raw mode,
/// and also ends us when raw mode could not be enabled.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (Ok(mut term), Ok(mut hup)) = (
            signal(SignalKind::terminate()),
            signal(SignalKind::hangup()),
        ) else {
            return std::future::pending().await;
        };
        tokio::select! {
            _ = term.recv() => {}
            _ = hup.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

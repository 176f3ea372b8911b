//! Per-tab resize coalescing.
//!
//! The UI reports container size changes in bursts while the user drags a
//! split or the window. Each tab gets a small task that waits for a quiet
//! period and then issues one resize with the last size requested.

use std::sync::Arc;
use std::time::Duration;

use omb_pty::{PtyId, PtySupervisor};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Receiver of the coalesced resize.
pub trait ResizeTarget: Send + Sync + 'static {
    fn apply_resize(&self, pty_id: PtyId, cols: u16, rows: u16);
}

impl ResizeTarget for PtySupervisor {
    fn apply_resize(&self, pty_id: PtyId, cols: u16, rows: u16) {
        self.resize(pty_id, cols, rows);
    }
}

enum ResizeCommand {
    Request { cols: u16, rows: u16 },
    /// The PTY is up, at the size it was spawned with.
    Attach { pty_id: PtyId, cols: u16, rows: u16 },
}

/// Handle to a tab's debounce task. The task ends when this is dropped.
pub struct ResizeDebouncer {
    tx: mpsc::UnboundedSender<ResizeCommand>,
}

impl ResizeDebouncer {
    /// Start the task on the current tokio runtime.
    pub fn spawn(target: Arc<dyn ResizeTarget>, window: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(target, window, rx));
        Self { tx }
    }

    pub fn request(&self, cols: u16, rows: u16) {
        let _ = self.tx.send(ResizeCommand::Request { cols, rows });
    }

    /// Start forwarding to `pty_id`. A size requested before this is
    /// applied once the current window closes, unless it equals the spawn
    /// size.
    pub fn attach(&self, pty_id: PtyId, cols: u16, rows: u16) {
        let _ = self.tx.send(ResizeCommand::Attach { pty_id, cols, rows });
    }
}

struct Pending {
    pty_id: Option<PtyId>,
    applied: Option<(u16, u16)>,
    wanted: Option<(u16, u16)>,
}

impl Pending {
    fn flush(&mut self, target: &dyn ResizeTarget) {
        let (Some(pty_id), Some(size)) = (self.pty_id, self.wanted) else {
            return;
        };
        self.wanted = None;
        if self.applied == Some(size) {
            return;
        }
        let (cols, rows) = size;
        log::debug!("[Resize] pty {pty_id} -> {cols}x{rows}");
        target.apply_resize(pty_id, cols, rows);
        self.applied = Some(size);
    }
}

async fn run(
    target: Arc<dyn ResizeTarget>,
    window: Duration,
    mut rx: mpsc::UnboundedReceiver<ResizeCommand>,
) {
    let mut pending = Pending {
        pty_id: None,
        applied: None,
        wanted: None,
    };
    let mut deadline: Option<Instant> = None;

    loop {
        let command = match deadline {
            Some(at) => {
                tokio::select! {
                    command = rx.recv() => command,
                    _ = tokio::time::sleep_until(at) => {
                        deadline = None;
                        pending.flush(target.as_ref());
                        continue;
                    }
                }
            }
            None => rx.recv().await,
        };

        match command {
            Some(ResizeCommand::Request { cols, rows }) => {
                pending.wanted = Some((cols, rows));
                deadline = Some(Instant::now() + window);
            }
            Some(ResizeCommand::Attach { pty_id, cols, rows }) => {
                pending.pty_id = Some(pty_id);
                pending.applied = Some((cols, rows));
                if deadline.is_none() {
                    pending.flush(target.as_ref());
                }
            }
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    const WINDOW: Duration = Duration::from_millis(100);

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(PtyId, u16, u16)>>,
    }

    impl ResizeTarget for Recorder {
        fn apply_resize(&self, pty_id: PtyId, cols: u16, rows: u16) {
            self.calls.lock().push((pty_id, cols, rows));
        }
    }

    fn debouncer() -> (ResizeDebouncer, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let debouncer = ResizeDebouncer::spawn(recorder.clone(), WINDOW);
        (debouncer, recorder)
    }

    async fn wait(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_last_size() {
        let (debouncer, recorder) = debouncer();
        debouncer.attach(1, 80, 24);

        debouncer.request(100, 30);
        wait(30).await;
        debouncer.request(110, 35);
        wait(30).await;
        debouncer.request(120, 40);

        wait(50).await;
        assert!(recorder.calls.lock().is_empty());

        wait(100).await;
        assert_eq!(*recorder.calls.lock(), vec![(1, 120, 40)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_each_resize() {
        let (debouncer, recorder) = debouncer();
        debouncer.attach(1, 80, 24);

        debouncer.request(100, 30);
        wait(150).await;
        debouncer.request(90, 30);
        wait(150).await;
        assert_eq!(*recorder.calls.lock(), vec![(1, 100, 30), (1, 90, 30)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_before_attach_wait_for_pty() {
        let (debouncer, recorder) = debouncer();
        debouncer.request(132, 43);
        wait(150).await;
        assert!(recorder.calls.lock().is_empty());

        debouncer.attach(7, 80, 24);
        wait(1).await;
        assert_eq!(*recorder.calls.lock(), vec![(7, 132, 43)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_size_is_not_reapplied() {
        let (debouncer, recorder) = debouncer();
        debouncer.request(80, 24);
        wait(150).await;
        debouncer.attach(7, 80, 24);
        debouncer.request(80, 24);
        wait(150).await;
        assert!(recorder.calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels_pending_resize() {
        let (debouncer, recorder) = debouncer();
        debouncer.attach(1, 80, 24);
        debouncer.request(100, 30);
        drop(debouncer);
        wait(150).await;
        assert!(recorder.calls.lock().is_empty());
    }
}

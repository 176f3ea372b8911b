//! Routes supervisor events to the tab that owns the PTY.
//!
//! A PTY is bound to its tab once, when it is spawned, and the binding is
//! never reassigned. Terminal data goes to the tab's channel. Signals go to
//! the session channel, filtered by kind:
//!
//! - notifications name their origin tab and are always delivered;
//! - titles and bells are ambient and only delivered from the session's
//!   last-active tab, so background tabs can't disturb the foreground;
//! - working-directory changes only matter for scratch sessions.

use std::collections::{HashMap, HashSet};

use omb_pty::{ExitInfo, PtyEvent, PtyId, TerminalSignal};
use omb_tabs::{SessionId, SessionKind, TabId, TabStore};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::ipc::{SessionEvent, TabEvent};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("pty {0} is already bound to a tab")]
    AlreadyBound(PtyId),
}

/// A tab whose process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabExit {
    pub session: SessionId,
    pub tab: TabId,
    pub info: ExitInfo,
}

/// What happened to a routed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Filtered out or addressed to nobody.
    Dropped,
    /// The exit was delivered and the binding released.
    Exited(TabExit),
}

#[derive(Debug, Clone)]
struct Binding {
    session: SessionId,
    tab: TabId,
}

#[derive(Default)]
struct Routes {
    bindings: HashMap<PtyId, Binding>,
    /// PTYs whose tab went away first. Their remaining events are dropped
    /// quietly until the exit arrives.
    retired: HashSet<PtyId>,
    tabs: HashMap<TabId, mpsc::UnboundedSender<TabEvent>>,
    sessions: HashMap<SessionId, Vec<mpsc::UnboundedSender<SessionEvent>>>,
}

/// Event & notification router. Owned by the app state; callers lock the
/// tab store first and pass it in, so the lock order is store -> router.
#[derive(Default)]
pub struct EventRouter {
    routes: Mutex<Routes>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a PTY to the tab that spawned it.
    pub fn bind(&self, pty_id: PtyId, session: &str, tab: &str) -> Result<(), RouterError> {
        let mut routes = self.routes.lock();
        if routes.bindings.contains_key(&pty_id) {
            log::warn!("[Router] refusing to rebind pty {pty_id} to tab {tab}");
            return Err(RouterError::AlreadyBound(pty_id));
        }
        routes.bindings.insert(
            pty_id,
            Binding {
                session: session.to_string(),
                tab: tab.to_string(),
            },
        );
        log::debug!("[Router] bound pty {pty_id} to {session}/{tab}");
        Ok(())
    }

    /// Detach a closing tab: its subscription ends and whatever its PTY
    /// still sends is dropped. Returns the PTY that was bound to it.
    pub fn release_tab(&self, tab: &str) -> Option<PtyId> {
        let mut routes = self.routes.lock();
        routes.tabs.remove(tab);
        let pty_id = routes
            .bindings
            .iter()
            .find(|(_, binding)| binding.tab == tab)
            .map(|(id, _)| *id)?;
        routes.bindings.remove(&pty_id);
        routes.retired.insert(pty_id);
        Some(pty_id)
    }

    /// Forget a PTY that never came up. Used when a spawn fails after the
    /// id was bound.
    pub fn unbind(&self, pty_id: PtyId) {
        let mut routes = self.routes.lock();
        routes.bindings.remove(&pty_id);
        routes.retired.remove(&pty_id);
    }

    pub fn pty_of(&self, tab: &str) -> Option<PtyId> {
        self.routes
            .lock()
            .bindings
            .iter()
            .find(|(_, binding)| binding.tab == tab)
            .map(|(id, _)| *id)
    }

    pub fn tab_of(&self, pty_id: PtyId) -> Option<TabId> {
        self.routes
            .lock()
            .bindings
            .get(&pty_id)
            .map(|binding| binding.tab.clone())
    }

    /// Receive a tab's terminal data. Replaces any earlier subscription.
    pub fn subscribe_tab(&self, tab: &str) -> mpsc::UnboundedReceiver<TabEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.lock().tabs.insert(tab.to_string(), tx);
        rx
    }

    /// Receive a session's signals. Any number of subscribers.
    pub fn subscribe_session(&self, session: &str) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes
            .lock()
            .sessions
            .entry(session.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Drop a session's subscribers, e.g. once it is closed.
    pub fn release_session(&self, session: &str) {
        self.routes.lock().sessions.remove(session);
    }

    /// Route one supervisor event.
    pub fn route(&self, event: PtyEvent, store: &TabStore) -> Delivery {
        let mut routes = self.routes.lock();
        let pty_id = event.pty_id();

        let Some(binding) = routes.bindings.get(&pty_id).cloned() else {
            if routes.retired.contains(&pty_id) {
                if matches!(event, PtyEvent::Exit { .. }) {
                    routes.retired.remove(&pty_id);
                }
            } else {
                log::debug!("[Router] dropping event for unknown pty {pty_id}");
            }
            return Delivery::Dropped;
        };

        match event {
            PtyEvent::Output { data, .. } => routes.send_tab(&binding.tab, TabEvent::Output { data }),
            PtyEvent::Signal { signal, .. } => {
                routes.send_signal(&binding.session, &binding.tab, signal, store)
            }
            PtyEvent::Exit { info, .. } => {
                routes.send_tab(&binding.tab, TabEvent::from(&info));
                routes.bindings.remove(&pty_id);
                Delivery::Exited(TabExit {
                    session: binding.session,
                    tab: binding.tab,
                    info,
                })
            }
        }
    }

    /// Route a signal raised on behalf of a tab from outside its PTY, e.g.
    /// an agent hook asking for attention.
    pub fn route_signal(
        &self,
        session: &str,
        tab: &str,
        signal: TerminalSignal,
        store: &TabStore,
    ) -> Delivery {
        self.routes.lock().send_signal(session, tab, signal, store)
    }
}

impl Routes {
    fn send_tab(&mut self, tab: &str, event: TabEvent) -> Delivery {
        let Some(tx) = self.tabs.get(tab) else {
            return Delivery::Dropped;
        };
        if tx.send(event).is_err() {
            log::debug!("[Router] subscriber of tab {tab} went away");
            self.tabs.remove(tab);
            return Delivery::Dropped;
        }
        Delivery::Delivered
    }

    fn send_signal(
        &mut self,
        session: &str,
        tab: &str,
        signal: TerminalSignal,
        store: &TabStore,
    ) -> Delivery {
        let is_last_active = store.last_active_tab(session) == Some(tab);
        let tab = tab.to_string();

        let event = match signal {
            TerminalSignal::Notification { title, body } => {
                Some(SessionEvent::Notification { tab, title, body })
            }
            TerminalSignal::WorkingDirectory(path) => {
                let is_scratch = store
                    .session(session)
                    .is_some_and(|s| s.kind == SessionKind::Scratch);
                is_scratch.then_some(SessionEvent::DirectoryChanged { tab, path })
            }
            TerminalSignal::Title(title) => {
                is_last_active.then_some(SessionEvent::TitleChanged { tab, title })
            }
            TerminalSignal::Bell => is_last_active.then_some(SessionEvent::Bell { tab }),
        };
        let Some(event) = event else {
            return Delivery::Dropped;
        };

        let Some(subscribers) = self.sessions.get_mut(session) else {
            return Delivery::Dropped;
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.is_empty() {
            return Delivery::Dropped;
        }
        Delivery::Delivered
    }
}

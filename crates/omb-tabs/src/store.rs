use std::collections::HashMap;

use crate::session::{Session, SessionId};
use crate::tab::{Change, Tab, TabId};

/// Tab state of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTabs {
    tabs: Vec<Tab>,
    active: Option<TabId>,
    last_active: Option<TabId>,
    counter: u32,
}

impl SessionTabs {
    /// Tabs in display order.
    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// The most recently focused tab; receives signals that carry no tab
    /// address of their own.
    pub fn last_active(&self) -> Option<&str> {
        self.last_active.as_deref().or(self.active.as_deref())
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    fn index_of(&self, tab_id: &str) -> Option<usize> {
        self.tabs.iter().position(|t| t.id == tab_id)
    }

    fn activate(&mut self, index: usize) {
        let id = self.tabs[index].id.clone();
        self.active = Some(id.clone());
        self.last_active = Some(id);
    }

    fn active_index(&self) -> Option<usize> {
        self.active.as_deref().and_then(|id| self.index_of(id))
    }
}

/// Sessions and their tabs.
///
/// Unknown sessions or tabs are never an error: lookups return `None`,
/// mutators return `false`/[`Change::Unchanged`] and leave the store as is.
#[derive(Debug, Default)]
pub struct TabStore {
    sessions: HashMap<SessionId, Session>,
    tabs: HashMap<SessionId, SessionTabs>,
    /// Tab id -> owning session, for global uniqueness and reverse lookup.
    owners: HashMap<TabId, SessionId>,
}

impl TabStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Session catalogue --

    /// Register a session, replacing the metadata of an existing one.
    /// Returns `true` if the session was not known before.
    pub fn open_session(&mut self, session: Session) -> bool {
        let id = session.id.clone();
        let is_new = self.sessions.insert(id.clone(), session).is_none();
        self.tabs.entry(id).or_default();
        is_new
    }

    /// Forget a session and its tabs. The label counter survives so a
    /// reopened session keeps minting fresh labels.
    pub fn close_session(&mut self, session_id: &str) -> Vec<TabId> {
        let removed = self.clear_session_tabs(session_id);
        if self.sessions.remove(session_id).is_some() {
            log::debug!("[TabStore] closed session {session_id}");
        }
        removed
    }

    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// All sessions, in sidebar order.
    pub fn sessions(&self) -> Vec<&Session> {
        let mut sessions: Vec<&Session> = self.sessions.values().collect();
        sessions.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    /// Assign sidebar positions from `ids`. Unknown ids are skipped;
    /// sessions not listed follow the listed ones in their previous order.
    pub fn reorder_sessions(&mut self, ids: &[SessionId]) {
        let unlisted: Vec<SessionId> = self
            .sessions()
            .into_iter()
            .filter(|s| !ids.contains(&s.id))
            .map(|s| s.id.clone())
            .collect();

        let mut order = 0;
        for id in ids.iter().chain(&unlisted) {
            if let Some(session) = self.sessions.get_mut(id) {
                session.order = order;
                order += 1;
            }
        }
    }

    // -- Tabs --

    pub fn session_tabs(&self, session_id: &str) -> Option<&SessionTabs> {
        self.tabs.get(session_id)
    }

    /// Tabs of a session in display order; empty for unknown sessions.
    pub fn tabs(&self, session_id: &str) -> &[Tab] {
        self.tabs
            .get(session_id)
            .map(SessionTabs::tabs)
            .unwrap_or_default()
    }

    pub fn tab(&self, session_id: &str, tab_id: &str) -> Option<&Tab> {
        self.tabs(session_id).iter().find(|t| t.id == tab_id)
    }

    pub fn active_tab(&self, session_id: &str) -> Option<&str> {
        self.tabs.get(session_id)?.active()
    }

    pub fn last_active_tab(&self, session_id: &str) -> Option<&str> {
        self.tabs.get(session_id)?.last_active()
    }

    /// The session a tab belongs to.
    pub fn session_of(&self, tab_id: &str) -> Option<&str> {
        self.owners.get(tab_id).map(String::as_str)
    }

    /// Append a tab and make it active. A tab id already used in any
    /// session is refused.
    pub fn add_tab(&mut self, session_id: &str, tab: Tab) -> bool {
        if let Some(owner) = self.owners.get(&tab.id) {
            log::debug!("[TabStore] tab {} already exists in {owner}", tab.id);
            return false;
        }
        let state = self.tabs.entry(session_id.to_string()).or_default();
        self.owners.insert(tab.id.clone(), session_id.to_string());
        state.tabs.push(tab);
        state.activate(state.tabs.len() - 1);
        true
    }

    /// Remove a tab and return the session's active tab afterwards.
    ///
    /// When the active tab goes, the tab before it takes over (the new
    /// first tab if it was first). Returns `None` when the session has no
    /// tabs left or did not contain `tab_id`.
    pub fn remove_tab(&mut self, session_id: &str, tab_id: &str) -> Option<TabId> {
        let state = self.tabs.get_mut(session_id)?;
        let index = state.index_of(tab_id)?;
        state.tabs.remove(index);
        self.owners.remove(tab_id);

        if state.active.as_deref() == Some(tab_id) {
            state.active = None;
            if !state.tabs.is_empty() {
                let next = index.saturating_sub(1);
                state.active = Some(state.tabs[next].id.clone());
            }
        }
        if state.last_active.as_deref() == Some(tab_id) {
            state.last_active = state.active.clone();
        }
        if state.tabs.is_empty() {
            state.active = None;
            state.last_active = None;
        }
        state.active.clone()
    }

    pub fn set_active_tab(&mut self, session_id: &str, tab_id: &str) -> bool {
        let Some(state) = self.tabs.get_mut(session_id) else {
            return false;
        };
        let Some(index) = state.index_of(tab_id) else {
            return false;
        };
        state.activate(index);
        true
    }

    /// Record that a tab took keyboard focus without changing the active
    /// tab, e.g. the primary terminal while a drawer tab stays selected.
    pub fn mark_focused(&mut self, session_id: &str, tab_id: &str) -> bool {
        let Some(state) = self.tabs.get_mut(session_id) else {
            return false;
        };
        if state.index_of(tab_id).is_none() {
            return false;
        }
        state.last_active = Some(tab_id.to_string());
        true
    }

    /// Move the tab at `old_index` to `new_index`, keeping the relative
    /// order of all others.
    pub fn reorder_tabs(&mut self, session_id: &str, old_index: usize, new_index: usize) -> bool {
        let Some(state) = self.tabs.get_mut(session_id) else {
            return false;
        };
        let len = state.tabs.len();
        if old_index >= len || new_index >= len {
            return false;
        }
        let tab = state.tabs.remove(old_index);
        state.tabs.insert(new_index, tab);
        true
    }

    /// Next value of the session's label counter. Never repeats.
    pub fn increment_counter(&mut self, session_id: &str) -> u32 {
        let state = self.tabs.entry(session_id.to_string()).or_default();
        state.counter += 1;
        state.counter
    }

    /// Mint a fresh default label, e.g. "Terminal 3".
    pub fn next_label(&mut self, session_id: &str) -> String {
        format!("Terminal {}", self.increment_counter(session_id))
    }

    pub fn prev_tab(&mut self, session_id: &str) -> bool {
        self.step(session_id, false)
    }

    pub fn next_tab(&mut self, session_id: &str) -> bool {
        self.step(session_id, true)
    }

    fn step(&mut self, session_id: &str, forward: bool) -> bool {
        let Some(state) = self.tabs.get_mut(session_id) else {
            return false;
        };
        let len = state.tabs.len();
        if len < 2 {
            return false;
        }
        let target = match (state.active_index(), forward) {
            (Some(i), true) => (i + 1) % len,
            (Some(i), false) => (i + len - 1) % len,
            (None, true) => 0,
            (None, false) => len - 1,
        };
        state.activate(target);
        true
    }

    /// Activate the tab at a 0-based position. Out of range does nothing.
    pub fn select_tab_by_index(&mut self, session_id: &str, index: isize) -> bool {
        let Some(state) = self.tabs.get_mut(session_id) else {
            return false;
        };
        let Ok(index) = usize::try_from(index) else {
            return false;
        };
        if index >= state.tabs.len() {
            return false;
        }
        state.activate(index);
        true
    }

    pub fn update_tab_label(&mut self, session_id: &str, tab_id: &str, label: &str) -> Change {
        let Some(state) = self.tabs.get_mut(session_id) else {
            return Change::Unchanged;
        };
        let Some(tab) = state.tabs.iter_mut().find(|t| t.id == tab_id) else {
            return Change::Unchanged;
        };
        if tab.label == label {
            return Change::Unchanged;
        }
        *tab = Tab {
            label: label.to_string(),
            ..tab.clone()
        };
        Change::Updated
    }

    /// Drop all tabs of one session, returning their ids. The counter is
    /// kept.
    pub fn clear_session_tabs(&mut self, session_id: &str) -> Vec<TabId> {
        let Some(state) = self.tabs.get_mut(session_id) else {
            return Vec::new();
        };
        let removed: Vec<TabId> = state.tabs.drain(..).map(|t| t.id).collect();
        state.active = None;
        state.last_active = None;
        for id in &removed {
            self.owners.remove(id);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionKind;

    const S: &str = "wt-1";

    fn store_with(ids: &[&str]) -> TabStore {
        let mut store = TabStore::new();
        for id in ids {
            assert!(store.add_tab(S, Tab::new(*id, *id)));
        }
        store
    }

    fn order(store: &TabStore) -> Vec<String> {
        store.tabs(S).iter().map(|t| t.id.clone()).collect()
    }

    #[test]
    fn test_add_makes_tab_active() {
        let mut store = TabStore::new();
        assert!(store.add_tab(S, Tab::new("t1", "Terminal 1")));
        assert_eq!(store.active_tab(S), Some("t1"));
        assert!(store.add_tab(S, Tab::new("t2", "Terminal 2")));
        assert_eq!(store.active_tab(S), Some("t2"));
        assert_eq!(store.last_active_tab(S), Some("t2"));
    }

    #[test]
    fn test_remove_active_returns_previous() {
        let mut store = store_with(&["t1", "t2"]);
        assert_eq!(store.remove_tab(S, "t2"), Some("t1".to_string()));
        assert_eq!(store.active_tab(S), Some("t1"));
    }

    #[test]
    fn test_remove_active_in_middle_selects_preceding() {
        let mut store = store_with(&["a", "b", "c", "d"]);
        store.set_active_tab(S, "c");
        assert_eq!(store.remove_tab(S, "c"), Some("b".to_string()));
        assert_eq!(order(&store), vec!["a", "b", "d"]);
    }

    #[test]
    fn test_remove_active_first_selects_new_first() {
        let mut store = store_with(&["a", "b", "c"]);
        store.set_active_tab(S, "a");
        assert_eq!(store.remove_tab(S, "a"), Some("b".to_string()));
    }

    #[test]
    fn test_remove_last_tab_empties_session() {
        let mut store = store_with(&["only"]);
        assert_eq!(store.remove_tab(S, "only"), None);
        let state = store.session_tabs(S).unwrap();
        assert!(state.is_empty());
        assert_eq!(state.active(), None);
        assert_eq!(state.last_active(), None);
    }

    #[test]
    fn test_remove_non_active_keeps_active() {
        let mut store = store_with(&["a", "b", "c", "d"]);
        store.set_active_tab(S, "b");
        for id in ["d", "a", "c"] {
            assert_eq!(store.remove_tab(S, id), Some("b".to_string()));
            assert_eq!(store.active_tab(S), Some("b"));
        }
    }

    #[test]
    fn test_remove_active_repeatedly_walks_back() {
        let ids = ["a", "b", "c", "d", "e"];
        for start in 0..ids.len() {
            let mut store = store_with(&ids);
            store.select_tab_by_index(S, start as isize);
            while let Some(active) = store.active_tab(S).map(str::to_string) {
                let before = order(&store);
                let index = before.iter().position(|id| *id == active).unwrap();
                let expected = match before.len() {
                    1 => None,
                    _ if index == 0 => Some(before[1].clone()),
                    _ => Some(before[index - 1].clone()),
                };
                assert_eq!(store.remove_tab(S, &active), expected);
            }
            assert!(store.tabs(S).is_empty());
        }
    }

    #[test]
    fn test_remove_unknown_is_a_miss() {
        let mut store = store_with(&["a"]);
        assert_eq!(store.remove_tab(S, "zzz"), None);
        assert_eq!(store.remove_tab("other", "a"), None);
        assert_eq!(order(&store), vec!["a"]);
        assert_eq!(store.active_tab(S), Some("a"));
    }

    #[test]
    fn test_tab_ids_are_globally_unique() {
        let mut store = store_with(&["t1"]);
        assert!(!store.add_tab("wt-2", Tab::new("t1", "dup")));
        assert!(store.tabs("wt-2").is_empty());
        assert_eq!(store.session_of("t1"), Some(S));

        // Once removed, the id may be used again.
        store.remove_tab(S, "t1");
        assert!(store.add_tab("wt-2", Tab::new("t1", "again")));
        assert_eq!(store.session_of("t1"), Some("wt-2"));
    }

    #[test]
    fn test_set_active_unknown_tab() {
        let mut store = store_with(&["a", "b"]);
        assert!(!store.set_active_tab(S, "zzz"));
        assert!(!store.set_active_tab("other", "a"));
        assert_eq!(store.active_tab(S), Some("b"));
        assert!(store.set_active_tab(S, "a"));
        assert_eq!(store.active_tab(S), Some("a"));
    }

    #[test]
    fn test_reorder_is_a_stable_move() {
        let mut store = store_with(&["a", "b", "c", "d", "e"]);
        assert!(store.reorder_tabs(S, 1, 3));
        assert_eq!(order(&store), vec!["a", "c", "d", "b", "e"]);
        assert!(store.reorder_tabs(S, 4, 0));
        assert_eq!(order(&store), vec!["e", "a", "c", "d", "b"]);
    }

    #[test]
    fn test_reorder_round_trip_restores_order() {
        let ids = ["a", "b", "c", "d", "e"];
        for i in 0..ids.len() {
            for j in 0..ids.len() {
                if i == j {
                    continue;
                }
                let mut store = store_with(&ids);
                assert!(store.reorder_tabs(S, i, j));
                assert!(store.reorder_tabs(S, j, i));
                assert_eq!(order(&store), ids);
            }
        }
    }

    #[test]
    fn test_reorder_out_of_range() {
        let mut store = store_with(&["a", "b"]);
        assert!(!store.reorder_tabs(S, 0, 2));
        assert!(!store.reorder_tabs(S, 5, 0));
        assert_eq!(order(&store), vec!["a", "b"]);
    }

    #[test]
    fn test_reorder_keeps_active() {
        let mut store = store_with(&["a", "b", "c"]);
        store.set_active_tab(S, "a");
        store.reorder_tabs(S, 0, 2);
        assert_eq!(store.active_tab(S), Some("a"));
    }

    #[test]
    fn test_counter_strictly_increases() {
        let mut store = TabStore::new();
        let mut last = 0;
        for round in 0..5 {
            let n = store.increment_counter(S);
            assert!(n > last);
            last = n;
            let id = format!("t{round}");
            store.add_tab(S, Tab::new(id.clone(), store_label(n)));
            if round % 2 == 0 {
                store.remove_tab(S, &id);
            } else {
                store.clear_session_tabs(S);
            }
        }
        store.close_session(S);
        assert!(store.increment_counter(S) > last);
    }

    fn store_label(n: u32) -> String {
        format!("Terminal {n}")
    }

    #[test]
    fn test_next_label() {
        let mut store = TabStore::new();
        assert_eq!(store.next_label(S), "Terminal 1");
        assert_eq!(store.next_label(S), "Terminal 2");
        assert_eq!(store.next_label("wt-2"), "Terminal 1");
    }

    #[test]
    fn test_prev_next_noop_with_fewer_than_two() {
        let mut store = TabStore::new();
        assert!(!store.next_tab(S));
        assert!(!store.prev_tab(S));
        store.add_tab(S, Tab::new("a", "a"));
        assert!(!store.next_tab(S));
        assert!(!store.prev_tab(S));
        assert_eq!(store.active_tab(S), Some("a"));
    }

    #[test]
    fn test_prev_next_wrap_around() {
        let mut store = store_with(&["a", "b", "c"]);
        assert_eq!(store.active_tab(S), Some("c"));
        assert!(store.next_tab(S));
        assert_eq!(store.active_tab(S), Some("a"));
        assert!(store.prev_tab(S));
        assert_eq!(store.active_tab(S), Some("c"));
        assert!(store.prev_tab(S));
        assert_eq!(store.active_tab(S), Some("b"));
    }

    #[test]
    fn test_select_by_index() {
        let mut store = store_with(&["a", "b", "c"]);
        assert!(store.select_tab_by_index(S, 0));
        assert_eq!(store.active_tab(S), Some("a"));
        assert!(!store.select_tab_by_index(S, -1));
        assert!(!store.select_tab_by_index(S, 3));
        assert!(!store.select_tab_by_index("other", 0));
        assert_eq!(store.active_tab(S), Some("a"));
    }

    #[test]
    fn test_update_label_unchanged_is_noop() {
        let mut store = TabStore::new();
        store.add_tab(S, Tab::new("a", "Terminal 1").primary());
        store.add_tab(S, Tab::new("b", "Terminal 2").with_task("build"));
        let before = store.session_tabs(S).cloned();

        assert_eq!(store.update_tab_label(S, "a", "Terminal 1"), Change::Unchanged);
        assert_eq!(store.update_tab_label(S, "zzz", "x"), Change::Unchanged);
        assert_eq!(store.update_tab_label("other", "a", "x"), Change::Unchanged);
        assert_eq!(store.session_tabs(S).cloned(), before);
    }

    #[test]
    fn test_update_label_touches_only_target() {
        let mut store = TabStore::new();
        store.add_tab(S, Tab::new("a", "Terminal 1").primary());
        store.add_tab(S, Tab::new("b", "Terminal 2").with_task("build"));

        let change = store.update_tab_label(S, "b", "cargo build");
        assert!(change.is_updated());
        assert_eq!(store.tab(S, "a"), Some(&Tab::new("a", "Terminal 1").primary()));
        assert_eq!(
            store.tab(S, "b"),
            Some(&Tab::new("b", "cargo build").with_task("build"))
        );
        assert_eq!(store.active_tab(S), Some("b"));
    }

    #[test]
    fn test_clear_session_is_isolated() {
        let mut store = store_with(&["a", "b"]);
        store.add_tab("wt-2", Tab::new("x", "x"));
        store.increment_counter(S);
        let counter = store.session_tabs(S).unwrap().counter();

        let removed = store.clear_session_tabs(S);
        assert_eq!(removed, vec!["a".to_string(), "b".to_string()]);
        assert!(store.tabs(S).is_empty());
        assert_eq!(store.active_tab(S), None);
        assert_eq!(store.last_active_tab(S), None);
        assert_eq!(store.session_tabs(S).unwrap().counter(), counter);
        assert_eq!(store.session_of("a"), None);

        assert_eq!(store.tabs("wt-2").len(), 1);
        assert_eq!(store.active_tab("wt-2"), Some("x"));
    }

    #[test]
    fn test_mark_focused_moves_only_last_active() {
        let mut store = store_with(&["main", "shell"]);
        assert!(store.mark_focused(S, "main"));
        assert_eq!(store.active_tab(S), Some("shell"));
        assert_eq!(store.last_active_tab(S), Some("main"));
        assert!(!store.mark_focused(S, "zzz"));

        // Removing the focused tab falls back to the active one.
        store.remove_tab(S, "main");
        assert_eq!(store.last_active_tab(S), Some("shell"));
    }

    #[test]
    fn test_session_catalogue() {
        let mut store = TabStore::new();
        assert!(store.open_session(Session::new("p1", SessionKind::Project, 1, "/src/p1")));
        assert!(store.open_session(Session::new("wt-1", SessionKind::Worktree, 0, "/src/p1-wt")));
        assert!(store.open_session(Session::new("scratch-1", SessionKind::Scratch, 2, "/tmp")));
        assert!(!store.open_session(Session::new("p1", SessionKind::Project, 1, "/src/p1")));

        let ids: Vec<&str> = store.sessions().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["wt-1", "p1", "scratch-1"]);

        store.reorder_sessions(&["scratch-1".to_string(), "gone".to_string(), "p1".to_string()]);
        let ids: Vec<&str> = store.sessions().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["scratch-1", "p1", "wt-1"]);
        let orders: Vec<u32> = store.sessions().iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(store.session("scratch-1").map(|s| s.kind), Some(SessionKind::Scratch));
    }

    #[test]
    fn test_partial_reorder_keeps_unlisted_order() {
        let mut store = TabStore::new();
        for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
            store.open_session(Session::new(*id, SessionKind::Worktree, i as u32, "/src"));
        }
        store.reorder_sessions(&["c".to_string()]);
        let ids: Vec<&str> = store.sessions().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_close_session_drops_tabs_and_metadata() {
        let mut store = TabStore::new();
        store.open_session(Session::new(S, SessionKind::Worktree, 0, "/src/wt"));
        store.add_tab(S, Tab::new("a", "a"));
        store.add_tab(S, Tab::new("b", "b"));

        assert_eq!(store.close_session(S), vec!["a".to_string(), "b".to_string()]);
        assert!(store.session(S).is_none());
        assert!(store.tabs(S).is_empty());
        assert_eq!(store.session_of("a"), None);
        assert!(store.close_session(S).is_empty());
    }
}

use serde::{Deserialize, Serialize};

/// Process-wide unique tab identifier.
pub type TabId = String;

/// One terminal surface within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    pub label: String,
    /// The session's main terminal, as opposed to drawer tabs.
    pub is_primary: bool,
    /// Set for tabs running a configured task.
    pub task_name: Option<String>,
}

impl Tab {
    pub fn new(id: impl Into<TabId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            is_primary: false,
            task_name: None,
        }
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task_name = Some(task.into());
        self
    }
}

/// Whether a mutation changed anything. Callers skip re-rendering on
/// `Unchanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Unchanged,
    Updated,
}

impl Change {
    pub fn is_updated(self) -> bool {
        self == Change::Updated
    }
}

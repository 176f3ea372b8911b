use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identifier of a worktree, project or scratch terminal.
pub type SessionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Worktree,
    Project,
    Scratch,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionKind::Worktree => "worktree",
            SessionKind::Project => "project",
            SessionKind::Scratch => "scratch",
        };
        f.write_str(name)
    }
}

/// A terminal-hosting entity shown in the sidebar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub kind: SessionKind,
    /// Position in the sidebar, ascending.
    pub order: u32,
    /// Where the session's terminals start.
    pub directory: PathBuf,
}

impl Session {
    pub fn new(
        id: impl Into<SessionId>,
        kind: SessionKind,
        order: u32,
        directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            order,
            directory: directory.into(),
        }
    }
}

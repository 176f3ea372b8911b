//! What runs inside a PTY: kinds of terminal and how each resolves to a command.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use portable_pty::CommandBuilder;
use serde::{Deserialize, Serialize};

use crate::pty::{default_shell, SpawnError};

/// The kind of terminal a PTY backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PtyKind {
    /// The agent terminal of a worktree or project.
    Main,
    /// An on-demand shell in the drawer.
    Shell,
    /// A configured task command in the drawer.
    Task,
    /// A free-floating shell.
    Scratch,
}

impl fmt::Display for PtyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PtyKind::Main => "main",
            PtyKind::Shell => "shell",
            PtyKind::Task => "task",
            PtyKind::Scratch => "scratch",
        };
        f.write_str(name)
    }
}

/// Commands used for each kind of terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LaunchConfig {
    /// Agent command line for main terminals (e.g. "claude", "aider").
    pub main_command: String,
    /// Shell for shell/scratch terminals and for running tasks. `$SHELL` when unset.
    pub shell: Option<String>,
    /// Task name -> command line, run through `shell -c`.
    pub tasks: BTreeMap<String, String>,
    /// Extra environment for every child.
    pub env: BTreeMap<String, String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            main_command: "claude".to_string(),
            shell: None,
            tasks: BTreeMap::new(),
            env: BTreeMap::new(),
        }
    }
}

impl LaunchConfig {
    fn shell(&self) -> String {
        self.shell
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(default_shell)
    }

    /// Resolve the program, arguments and environment for a terminal.
    pub fn resolve(
        &self,
        kind: PtyKind,
        task: Option<&str>,
        cwd: PathBuf,
    ) -> Result<LaunchSpec, SpawnError> {
        let mut spec = match kind {
            PtyKind::Main => {
                let mut words = self.main_command.split_whitespace().map(str::to_string);
                match words.next() {
                    Some(program) => LaunchSpec::new(program, words.collect::<Vec<_>>(), cwd),
                    None => LaunchSpec::new(self.shell(), Vec::<String>::new(), cwd),
                }
            }
            PtyKind::Shell | PtyKind::Scratch => {
                LaunchSpec::new(self.shell(), Vec::<String>::new(), cwd)
            }
            PtyKind::Task => {
                let name = task.unwrap_or_default();
                let command = self
                    .tasks
                    .get(name)
                    .ok_or_else(|| SpawnError::UnknownTask(name.to_string()))?;
                LaunchSpec::new(self.shell(), ["-c".to_string(), command.clone()], cwd)
            }
        };
        spec.env
            .extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(spec)
    }
}

/// A fully resolved command line ready to run inside a PTY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = String>,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().collect(),
            cwd: cwd.into(),
            env: vec![
                ("TERM".to_string(), "xterm-256color".to_string()),
                ("COLORTERM".to_string(), "truecolor".to_string()),
            ],
        }
    }

    pub(crate) fn command_builder(&self) -> CommandBuilder {
        let mut cmd = CommandBuilder::new(&self.program);
        cmd.args(&self.args);
        cmd.cwd(&self.cwd);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Validate a requested working directory, defaulting to the home directory.
pub fn resolve_directory(directory: Option<&Path>) -> Result<PathBuf, SpawnError> {
    match directory {
        Some(dir) if dir.is_dir() => Ok(dir.to_path_buf()),
        Some(dir) => Err(SpawnError::InvalidDirectory(dir.to_path_buf())),
        None => Ok(dirs::home_dir()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"))),
    }
}

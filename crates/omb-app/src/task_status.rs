use omb_pty::ExitInfo;
use serde::Serialize;

/// Status indicator of a task tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Succeeded,
    Failed,
    /// Ended by a signal, shown as neutral.
    Killed,
}

impl TaskStatus {
    /// 0 succeeded, 1-127 failed, 128 and up (or a signal) killed.
    pub fn from_exit(info: &ExitInfo) -> Self {
        if info.signal.is_some() {
            return TaskStatus::Killed;
        }
        match info.code {
            0 => TaskStatus::Succeeded,
            1..=127 => TaskStatus::Failed,
            _ => TaskStatus::Killed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(TaskStatus::from_exit(&ExitInfo::with_code(0)), TaskStatus::Succeeded);
        assert_eq!(TaskStatus::from_exit(&ExitInfo::with_code(1)), TaskStatus::Failed);
        assert_eq!(TaskStatus::from_exit(&ExitInfo::with_code(127)), TaskStatus::Failed);
        assert_eq!(TaskStatus::from_exit(&ExitInfo::with_code(128)), TaskStatus::Killed);
        assert_eq!(TaskStatus::from_exit(&ExitInfo::with_code(137)), TaskStatus::Killed);
    }

    #[test]
    fn test_signal_means_killed() {
        let info = ExitInfo {
            code: 1,
            signal: Some("Hangup".to_string()),
        };
        assert_eq!(TaskStatus::from_exit(&info), TaskStatus::Killed);
    }
}

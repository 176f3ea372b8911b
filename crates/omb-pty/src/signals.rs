//! Out-of-band signals carried inside terminal output.
//!
//! Programs announce titles (OSC 0/2), their working directory (OSC 7) and
//! desktop notifications (OSC 9, OSC 777) through escape sequences. The
//! scanner runs a `vte` state machine over each output chunk and reports
//! what it saw; the bytes themselves are forwarded untouched.

use std::path::PathBuf;

use url::Url;
use vte::{Parser, Perform};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalSignal {
    Title(String),
    WorkingDirectory(PathBuf),
    Notification { title: String, body: String },
    Bell,
}

/// Stateful scanner, one per PTY. Sequences split across reads are handled.
pub struct SignalScanner {
    parser: Parser,
    collector: Collector,
}

#[derive(Default)]
struct Collector {
    found: Vec<TerminalSignal>,
}

impl SignalScanner {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            collector: Collector::default(),
        }
    }

    pub fn scan(&mut self, bytes: &[u8]) -> Vec<TerminalSignal> {
        self.parser.advance(&mut self.collector, bytes);
        std::mem::take(&mut self.collector.found)
    }
}

impl Default for SignalScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Perform for Collector {
    fn execute(&mut self, byte: u8) {
        if byte == 0x07 {
            self.found.push(TerminalSignal::Bell);
        }
    }

    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        let Some((&command, rest)) = params.split_first() else {
            return;
        };
        let signal = match command {
            b"0" | b"2" => Some(TerminalSignal::Title(join(rest))),
            b"7" => rest.first().and_then(|uri| parse_file_uri(uri)),
            // OSC 9;4 is ConEmu progress reporting, not a notification.
            b"9" if rest.first() != Some(&&b"4"[..]) => Some(TerminalSignal::Notification {
                title: String::new(),
                body: join(rest),
            }),
            b"777" if rest.first() == Some(&&b"notify"[..]) => {
                Some(TerminalSignal::Notification {
                    title: rest.get(1).map(|t| lossy(t)).unwrap_or_default(),
                    body: rest.get(2..).map(join).unwrap_or_default(),
                })
            }
            _ => None,
        };
        if let Some(signal) = signal {
            self.found.push(signal);
        }
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// OSC parameters are split on `;`, which may also appear in the payload.
fn join(parts: &[&[u8]]) -> String {
    parts.iter().map(|p| lossy(p)).collect::<Vec<_>>().join(";")
}

/// `file://host/some/path` -> `/some/path`, percent-decoded. The host is
/// whatever machine the shell runs on and is dropped.
fn parse_file_uri(uri: &[u8]) -> Option<TerminalSignal> {
    let mut url = Url::parse(std::str::from_utf8(uri).ok()?).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    url.set_host(None).ok()?;
    url.to_file_path().ok().map(TerminalSignal::WorkingDirectory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_osc_0_and_2() {
        let mut scanner = SignalScanner::new();
        assert_eq!(
            scanner.scan(b"\x1b]0;My Terminal\x07"),
            vec![TerminalSignal::Title("My Terminal".to_string())]
        );
        assert_eq!(
            scanner.scan(b"\x1b]2;build: ok\x1b\\"),
            vec![TerminalSignal::Title("build: ok".to_string())]
        );
    }

    #[test]
    fn test_title_keeps_semicolons() {
        let mut scanner = SignalScanner::new();
        assert_eq!(
            scanner.scan(b"\x1b]0;a;b\x07"),
            vec![TerminalSignal::Title("a;b".to_string())]
        );
    }

    #[test]
    fn test_sequence_split_across_chunks() {
        let mut scanner = SignalScanner::new();
        assert!(scanner.scan(b"plain text \x1b]2;Half").is_empty());
        assert_eq!(
            scanner.scan(b" Done\x07 more"),
            vec![TerminalSignal::Title("Half Done".to_string())]
        );
    }

    #[test]
    fn test_working_directory_from_osc_7() {
        let mut scanner = SignalScanner::new();
        assert_eq!(
            scanner.scan(b"\x1b]7;file://myhost/home/me/My%20Repo\x07"),
            vec![TerminalSignal::WorkingDirectory(PathBuf::from(
                "/home/me/My Repo"
            ))]
        );
    }

    #[test]
    fn test_notifications_from_osc_9_and_777() {
        let mut scanner = SignalScanner::new();
        assert_eq!(
            scanner.scan(b"\x1b]9;Agent needs input\x07"),
            vec![TerminalSignal::Notification {
                title: String::new(),
                body: "Agent needs input".to_string(),
            }]
        );
        assert_eq!(
            scanner.scan(b"\x1b]777;notify;Claude;Task finished\x07"),
            vec![TerminalSignal::Notification {
                title: "Claude".to_string(),
                body: "Task finished".to_string(),
            }]
        );
    }

    #[test]
    fn test_progress_report_is_not_a_notification() {
        let mut scanner = SignalScanner::new();
        assert!(scanner.scan(b"\x1b]9;4;1;50\x07").is_empty());
    }

    #[test]
    fn test_bell_outside_osc() {
        let mut scanner = SignalScanner::new();
        assert_eq!(scanner.scan(b"ding\x07"), vec![TerminalSignal::Bell]);
        // A BEL terminating an OSC is not a bell.
        assert_eq!(
            scanner.scan(b"\x1b]0;t\x07"),
            vec![TerminalSignal::Title("t".to_string())]
        );
    }

    #[test]
    fn test_plain_output_has_no_signals() {
        let mut scanner = SignalScanner::new();
        assert!(scanner.scan(b"\x1b[31mred\x1b[0m\r\n").is_empty());
    }

    #[test]
    fn test_working_directory_ignores_query_and_fragment() {
        let mut scanner = SignalScanner::new();
        assert_eq!(
            scanner.scan(b"\x1b]7;file:///srv/app%2Dv2?x=1#top\x07"),
            vec![TerminalSignal::WorkingDirectory(PathBuf::from("/srv/app-v2"))]
        );
    }

    #[test]
    fn test_working_directory_needs_file_uri() {
        let mut scanner = SignalScanner::new();
        assert!(scanner.scan(b"\x1b]7;https://example.com/x\x07").is_empty());
        assert!(scanner.scan(b"\x1b]7;/not/a/uri\x07").is_empty());
    }
}

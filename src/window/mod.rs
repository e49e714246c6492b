//! Window observation and input injection.
//!
//! The control loop never talks to a UI toolkit directly. It goes through
//! [`WindowObserver`], which can enumerate candidate windows, read their
//! visible text, focus them, and type into them. The shipped implementation
//! drives tmux panes (see [`tmux::TmuxObserver`]).

pub mod tmux;

use std::fmt;

use regex::Regex;
use thiserror::Error;

/// Opaque reference to the window being driven.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHandle {
    /// Backend-specific identifier (a tmux pane id such as `%3`).
    pub id: String,
    /// Human-readable title, used for matching and log output.
    pub title: String,
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({})", self.title, self.id)
    }
}

/// A window that matched the title pattern during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowCandidate {
    pub handle: WindowHandle,
    /// Whether the window currently exposes an interactive text-entry
    /// element (for tmux: a live pane that is not in copy mode).
    pub accepts_input: bool,
}

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("no window matching /{pattern}/ found")]
    NotFound { pattern: String },
    #[error("window backend unavailable: {0}")]
    Unavailable(String),
    #[error("{action} failed for {window}: {detail}")]
    Command {
        action: &'static str,
        window: String,
        detail: String,
    },
}

pub trait WindowObserver {
    /// All windows whose title matches `pattern`, in enumeration order.
    fn candidates(&self, pattern: &Regex) -> Result<Vec<WindowCandidate>, WindowError>;

    /// Text of every visible text element, in the backend's order. May fail
    /// transiently.
    fn read_texts(&self, window: &WindowHandle) -> Result<Vec<String>, WindowError>;

    fn focus(&self, window: &WindowHandle) -> Result<(), WindowError>;

    /// Type `text` literally, then press `confirm_key` once.
    fn send_text(
        &self,
        window: &WindowHandle,
        text: &str,
        confirm_key: &str,
    ) -> Result<(), WindowError>;

    /// Pick the window to drive: the first candidate that accepts input,
    /// else the first candidate.
    fn discover(&self, pattern: &Regex) -> Result<WindowHandle, WindowError> {
        let candidates = self.candidates(pattern)?;
        pick_candidate(candidates).ok_or_else(|| WindowError::NotFound {
            pattern: pattern.as_str().to_string(),
        })
    }
}

fn pick_candidate(candidates: Vec<WindowCandidate>) -> Option<WindowHandle> {
    let preferred = candidates.iter().position(|c| c.accepts_input).unwrap_or(0);
    candidates
        .into_iter()
        .nth(preferred)
        .map(|candidate| candidate.handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticObserver(Vec<WindowCandidate>);

    impl WindowObserver for StaticObserver {
        fn candidates(&self, pattern: &Regex) -> Result<Vec<WindowCandidate>, WindowError> {
            Ok(self
                .0
                .iter()
                .filter(|c| pattern.is_match(&c.handle.title))
                .cloned()
                .collect())
        }

        fn read_texts(&self, _window: &WindowHandle) -> Result<Vec<String>, WindowError> {
            Ok(vec![])
        }

        fn focus(&self, _window: &WindowHandle) -> Result<(), WindowError> {
            Ok(())
        }

        fn send_text(&self, _: &WindowHandle, _: &str, _: &str) -> Result<(), WindowError> {
            Ok(())
        }
    }

    fn candidate(id: &str, title: &str, accepts_input: bool) -> WindowCandidate {
        WindowCandidate {
            handle: WindowHandle {
                id: id.to_string(),
                title: title.to_string(),
            },
            accepts_input,
        }
    }

    #[test]
    fn discover_prefers_window_accepting_input() {
        let observer = StaticObserver(vec![
            candidate("%1", "Cursor - log", false),
            candidate("%2", "Cursor - agent", true),
        ]);
        let handle = observer.discover(&Regex::new(".*Cursor.*").unwrap()).unwrap();
        assert_eq!(handle.id, "%2");
    }

    #[test]
    fn discover_falls_back_to_first_candidate() {
        let observer = StaticObserver(vec![
            candidate("%1", "Cursor A", false),
            candidate("%2", "Cursor B", false),
        ]);
        let handle = observer.discover(&Regex::new("Cursor").unwrap()).unwrap();
        assert_eq!(handle.id, "%1");
    }

    #[test]
    fn discover_without_candidates_is_not_found() {
        let observer = StaticObserver(vec![candidate("%1", "vim", true)]);
        let err = observer
            .discover(&Regex::new(".*Cursor.*").unwrap())
            .unwrap_err();
        assert!(matches!(err, WindowError::NotFound { .. }));
        assert!(err.to_string().contains(".*Cursor.*"));
    }

    #[test]
    fn handle_display_includes_title_and_id() {
        let handle = WindowHandle {
            id: "%7".into(),
            title: "main:cursor".into(),
        };
        assert_eq!(handle.to_string(), "'main:cursor' (%7)");
    }
}

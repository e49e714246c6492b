//! tmux-backed window observer.
//!
//! A "window" is a tmux pane. Its title is `session:window` followed by the
//! pane title, its visible text is `capture-pane` output (one fragment per
//! non-blank line), and input goes through `send-keys -l` so punctuation and
//! spacing reach the pane untouched.

use std::process::{Command, Output};

use regex::Regex;
use tracing::debug;

use super::{WindowCandidate, WindowError, WindowHandle, WindowObserver};

const PANE_FORMAT: &str =
    "#{pane_id}\t#{session_name}:#{window_name}\t#{pane_title}\t#{pane_dead}\t#{pane_in_mode}";

/// One row of `tmux list-panes -a` output.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PaneRow {
    id: String,
    title: String,
    dead: bool,
    in_mode: bool,
}

#[derive(Debug, Default, Clone)]
pub struct TmuxObserver;

impl TmuxObserver {
    pub fn new() -> Self {
        Self
    }

    /// tmux version string, or an error when tmux is not installed.
    pub fn check() -> Result<String, WindowError> {
        let output = run_tmux(["-V"])?;
        if !output.status.success() {
            return Err(WindowError::Unavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(version = %version, "tmux found");
        Ok(version)
    }
}

fn run_tmux<I, S>(args: I) -> Result<Output, WindowError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    Command::new("tmux").args(args).output().map_err(|e| {
        WindowError::Unavailable(format!(
            "failed to run tmux (install it with `apt install tmux` or `brew install tmux`): {e}"
        ))
    })
}

fn run_checked<I, S>(args: I, action: &'static str, window: &WindowHandle) -> Result<Output, WindowError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let output = run_tmux(args)?;
    if !output.status.success() {
        return Err(WindowError::Command {
            action,
            window: window.to_string(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

fn parse_pane_rows(listing: &str) -> Vec<PaneRow> {
    listing
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let id = fields.next()?.trim();
            let location = fields.next()?.trim();
            let pane_title = fields.next().unwrap_or("").trim();
            let dead = fields.next().unwrap_or("0").trim() == "1";
            let in_mode = fields.next().unwrap_or("0").trim() == "1";
            if id.is_empty() {
                return None;
            }
            let title = if pane_title.is_empty() {
                location.to_string()
            } else {
                format!("{location} {pane_title}")
            };
            Some(PaneRow {
                id: id.to_string(),
                title,
                dead,
                in_mode,
            })
        })
        .collect()
}

/// Non-blank lines of a pane capture, with trailing padding removed.
fn capture_fragments(capture: &str) -> Vec<String> {
    capture
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

impl WindowObserver for TmuxObserver {
    fn candidates(&self, pattern: &Regex) -> Result<Vec<WindowCandidate>, WindowError> {
        let output = run_tmux(["list-panes", "-a", "-F", PANE_FORMAT])?;
        if !output.status.success() {
            // No server running means no panes, not a broken backend.
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no server running") || stderr.contains("error connecting") {
                return Ok(Vec::new());
            }
            return Err(WindowError::Unavailable(stderr.trim().to_string()));
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        Ok(parse_pane_rows(&listing)
            .into_iter()
            .filter(|row| pattern.is_match(&row.title))
            .map(|row| WindowCandidate {
                accepts_input: !row.dead && !row.in_mode,
                handle: WindowHandle {
                    id: row.id,
                    title: row.title,
                },
            })
            .collect())
    }

    fn read_texts(&self, window: &WindowHandle) -> Result<Vec<String>, WindowError> {
        let output = run_checked(
            ["capture-pane", "-p", "-J", "-t", window.id.as_str()],
            "capture-pane",
            window,
        )?;
        Ok(capture_fragments(&String::from_utf8_lossy(&output.stdout)))
    }

    fn focus(&self, window: &WindowHandle) -> Result<(), WindowError> {
        run_checked(
            ["select-window", "-t", window.id.as_str()],
            "select-window",
            window,
        )?;
        run_checked(
            ["select-pane", "-t", window.id.as_str()],
            "select-pane",
            window,
        )?;
        Ok(())
    }

    fn send_text(
        &self,
        window: &WindowHandle,
        text: &str,
        confirm_key: &str,
    ) -> Result<(), WindowError> {
        if !text.is_empty() {
            run_checked(
                ["send-keys", "-t", window.id.as_str(), "-l", "--", text],
                "send-keys",
                window,
            )?;
        }
        // The confirm key is a tmux key name (e.g. Enter), never literal.
        run_checked(
            ["send-keys", "-t", window.id.as_str(), confirm_key],
            "send-keys",
            window,
        )?;
        debug!(window = %window, text_len = text.len(), confirm_key, "sent keys");
        Ok(())
    }
}

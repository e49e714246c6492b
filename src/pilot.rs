//! Control loop: watch, classify, ask, type.
//!
//! ```text
//! STARTING   → discover the target window (fatal if none)
//! POLLING    → read the visible text; on failure back off and read again
//! RESPONDING → awaiting input or idle: build conversation, query, type answer
//! STOPPED    → running flag cleared by the termination handler
//! ```
//!
//! Busy snapshots skip the query and poll again after a short backoff. The
//! loop is strictly sequential, so at most one query is ever in flight. The
//! running flag is checked at the top of each cycle and while sleeping; an
//! in-flight query or dispatch always completes first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::classifier::{ScreenState, TextClassifier};
use crate::dispatch::ActionDispatcher;
use crate::llm::LanguageModel;
use crate::log::{ActivityLog, LogEvent};
use crate::prompt;
use crate::window::{WindowHandle, WindowObserver};

/// Longest uninterrupted sleep between checks of the running flag.
const PAUSE_SLICE: Duration = Duration::from_millis(100);

/// Everything the loop needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct PilotConfig {
    pub title_pattern: Regex,
    /// Full system instructions, document included.
    pub system_prompt: String,
    /// Directive used when the window is idle.
    pub continuation: String,
    pub busy_marker: String,
    pub confirm_key: String,
    /// Pause after every query cycle.
    pub interval: Duration,
    /// Pause while the window reports itself busy.
    pub busy_backoff: Duration,
    /// Pause after a failed read.
    pub read_retry: Duration,
}

/// Counters for one run, printed on exit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PilotReport {
    /// Snapshots that were read and classified.
    pub cycles: u64,
    pub dispatched: u64,
    /// Queries that produced no usable answer.
    pub skipped: u64,
    pub read_failures: u64,
    pub dispatch_failures: u64,
}

/// Sleep for `duration`, returning early once `running` is cleared.
pub fn pause(duration: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + duration;
    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(PAUSE_SLICE));
    }
}

fn record(activity: Option<&ActivityLog>, event: LogEvent) {
    if let Some(log) = activity {
        if let Err(e) = log.log(event) {
            warn!(error = %e, "failed to write activity log");
        }
    }
}

fn notice(message: &str) {
    println!(
        "\x1b[36m[autopilot]\x1b[0m [{}] {message}",
        chrono::Local::now().format("%H:%M:%S")
    );
}

/// Discover the target window and drive it until `running` is cleared.
///
/// Only discovery failure is returned as an error; everything after that is
/// logged and absorbed so the loop keeps going.
pub fn run(
    config: &PilotConfig,
    observer: &dyn WindowObserver,
    model: &dyn LanguageModel,
    activity: Option<&ActivityLog>,
    running: &AtomicBool,
) -> Result<PilotReport> {
    let window = observer
        .discover(&config.title_pattern)
        .context("window discovery failed")?;
    if let Err(e) = observer.focus(&window) {
        warn!(window = %window, error = %e, "initial focus failed");
    }
    notice(&format!("using window {window}"));
    info!(window = %window, "control loop starting");
    record(
        activity,
        LogEvent::SessionStarted {
            window: window.to_string(),
        },
    );

    let classifier = TextClassifier::new(config.busy_marker.as_str());
    let dispatcher = ActionDispatcher::new(observer, config.confirm_key.as_str());
    let mut report = PilotReport::default();

    while running.load(Ordering::Relaxed) {
        let texts = match observer.read_texts(&window) {
            Ok(texts) => texts,
            Err(e) => {
                report.read_failures += 1;
                debug!(error = %e, "window read failed; retrying");
                record(activity, LogEvent::ReadFailed { error: e.to_string() });
                pause(config.read_retry, running);
                continue;
            }
        };
        report.cycles += 1;

        let state = classifier.classify(&texts);
        debug!(state = state.label(), fragments = texts.len(), "classified snapshot");

        let directive = match &state {
            ScreenState::Busy => {
                pause(config.busy_backoff, running);
                continue;
            }
            ScreenState::AwaitingInput(prompt) => prompt.as_str(),
            ScreenState::Idle => config.continuation.as_str(),
        };

        respond(
            config,
            &window,
            &texts,
            &state,
            directive,
            model,
            &dispatcher,
            activity,
            &mut report,
        );
        pause(config.interval, running);
    }

    notice("automation stopped");
    info!(?report, "control loop stopped");
    record(
        activity,
        LogEvent::SessionEnded {
            cycles: report.cycles,
            dispatched: report.dispatched,
            skipped: report.skipped,
        },
    );
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
fn respond(
    config: &PilotConfig,
    window: &WindowHandle,
    texts: &[String],
    state: &ScreenState,
    directive: &str,
    model: &dyn LanguageModel,
    dispatcher: &ActionDispatcher<'_>,
    activity: Option<&ActivityLog>,
    report: &mut PilotReport,
) {
    let conversation = prompt::build(
        &config.system_prompt,
        &prompt::session_text(texts),
        directive,
    );
    record(
        activity,
        LogEvent::QuerySent {
            state: state.label().to_string(),
            directive: directive.to_string(),
        },
    );

    let answer = match model.query(&conversation) {
        Ok(answer) if !answer.is_empty() => answer,
        Ok(_) => {
            report.skipped += 1;
            debug!("model returned no answer; skipping cycle");
            record(
                activity,
                LogEvent::QuerySkipped {
                    reason: "no answer from any endpoint".to_string(),
                },
            );
            return;
        }
        Err(e) => {
            report.skipped += 1;
            warn!(error = %e, "query failed");
            notice(&format!("query failed: {e}"));
            record(activity, LogEvent::QuerySkipped { reason: e.to_string() });
            return;
        }
    };

    match dispatcher.act(window, &answer) {
        Ok(()) => {
            report.dispatched += 1;
            info!(state = state.label(), answer = %answer, "answer typed");
            if matches!(state, ScreenState::AwaitingInput(_)) {
                notice("responded to input");
            } else {
                notice("nudged idle session");
            }
            record(
                activity,
                LogEvent::ActionDispatched {
                    state: state.label().to_string(),
                    text: answer,
                },
            );
        }
        Err(e) => {
            report.dispatch_failures += 1;
            warn!(error = %e, "failed to type answer");
            notice(&format!("could not type answer: {e}"));
            record(activity, LogEvent::DispatchFailed { error: e.to_string() });
        }
    }
}

//! Turns a generated answer into keystrokes in the target window.

use crate::window::{WindowError, WindowHandle, WindowObserver};

/// Default key pressed after the answer text.
pub const DEFAULT_CONFIRM_KEY: &str = "Enter";

pub struct ActionDispatcher<'a> {
    observer: &'a dyn WindowObserver,
    confirm_key: String,
}

impl<'a> ActionDispatcher<'a> {
    pub fn new(observer: &'a dyn WindowObserver, confirm_key: impl Into<String>) -> Self {
        Self {
            observer,
            confirm_key: confirm_key.into(),
        }
    }

    /// Focus `window`, type `text` exactly as given, then press the confirm
    /// key once. Errors are returned to the caller, never swallowed.
    pub fn act(&self, window: &WindowHandle, text: &str) -> Result<(), WindowError> {
        self.observer.focus(window)?;
        self.observer.send_text(window, text, &self.confirm_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use std::sync::Mutex;

    use crate::window::WindowCandidate;

    #[derive(Default)]
    struct RecordingObserver {
        calls: Mutex<Vec<String>>,
        fail_focus: bool,
    }

    impl WindowObserver for RecordingObserver {
        fn candidates(&self, _: &Regex) -> Result<Vec<WindowCandidate>, WindowError> {
            Ok(vec![])
        }

        fn read_texts(&self, _: &WindowHandle) -> Result<Vec<String>, WindowError> {
            Ok(vec![])
        }

        fn focus(&self, window: &WindowHandle) -> Result<(), WindowError> {
            if self.fail_focus {
                return Err(WindowError::Command {
                    action: "select-pane",
                    window: window.to_string(),
                    detail: "can't find pane".into(),
                });
            }
            self.calls.lock().unwrap().push(format!("focus {}", window.id));
            Ok(())
        }

        fn send_text(&self, window: &WindowHandle, text: &str, key: &str) -> Result<(), WindowError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("send {} [{text}] {key}", window.id));
            Ok(())
        }
    }

    fn window() -> WindowHandle {
        WindowHandle {
            id: "%1".into(),
            title: "work:cursor".into(),
        }
    }

    #[test]
    fn focuses_then_sends_text_with_confirm_key() {
        let observer = RecordingObserver::default();
        let dispatcher = ActionDispatcher::new(&observer, DEFAULT_CONFIRM_KEY);

        dispatcher.act(&window(), "  y  and   n ").unwrap();

        let calls = observer.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec!["focus %1".to_string(), "send %1 [  y  and   n ] Enter".to_string()]
        );
    }

    #[test]
    fn focus_failure_propagates_and_skips_typing() {
        let observer = RecordingObserver {
            fail_focus: true,
            ..Default::default()
        };
        let dispatcher = ActionDispatcher::new(&observer, "Enter");

        let err = dispatcher.act(&window(), "y").unwrap_err();
        assert!(err.to_string().contains("can't find pane"));
        assert!(observer.calls.lock().unwrap().is_empty());
    }
}

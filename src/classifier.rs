//! Screen-state classification.
//!
//! Looks at the text fragments currently visible in the observed window and
//! decides what the assistant on the other side is doing:
//!
//! ```text
//! AWAITING INPUT → a fragment reads like a question or an "enter ..." prompt
//! BUSY           → a fragment carries the busy marker (e.g. "Generating")
//! IDLE           → neither
//! ```
//!
//! The input check always wins over the busy check, so a prompt shown next to
//! a stale spinner still gets answered.

/// Default marker the assistant renders while it is producing output.
pub const DEFAULT_BUSY_MARKER: &str = "Generating";

/// What the observed window is doing right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenState {
    /// Nothing is happening; the loop should nudge the assistant along.
    Idle,
    /// The assistant is still producing output.
    Busy,
    /// The assistant is asking for input. Carries the fragment exactly as
    /// the observer returned it.
    AwaitingInput(String),
}

impl ScreenState {
    pub fn label(&self) -> &'static str {
        match self {
            ScreenState::Idle => "idle",
            ScreenState::Busy => "busy",
            ScreenState::AwaitingInput(_) => "awaiting-input",
        }
    }
}

/// Stateless classifier over a snapshot of visible text.
#[derive(Debug, Clone)]
pub struct TextClassifier {
    busy_marker: String,
}

impl Default for TextClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_BUSY_MARKER)
    }
}

impl TextClassifier {
    pub fn new(busy_marker: impl Into<String>) -> Self {
        Self {
            busy_marker: busy_marker.into(),
        }
    }

    pub fn busy_marker(&self) -> &str {
        &self.busy_marker
    }

    /// Classify one snapshot. Fragment order is the observer's enumeration
    /// order; the first input-looking fragment wins.
    pub fn classify<S: AsRef<str>>(&self, fragments: &[S]) -> ScreenState {
        if let Some(prompt) = fragments
            .iter()
            .map(AsRef::as_ref)
            .find(|text| looks_like_input_prompt(text))
        {
            return ScreenState::AwaitingInput(prompt.to_string());
        }

        // An empty marker would match every fragment.
        if !self.busy_marker.is_empty()
            && fragments
                .iter()
                .any(|text| text.as_ref().contains(self.busy_marker.as_str()))
        {
            return ScreenState::Busy;
        }

        ScreenState::Idle
    }
}

fn looks_like_input_prompt(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    normalized.ends_with('?') || normalized.starts_with("enter")
}

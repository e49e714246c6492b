//! Conversation construction for the LLM backend.
//!
//! Every query is the same two-turn shape: the fixed system instructions
//! (with the project document appended) and one user turn that carries the
//! whole visible session plus the directive for this cycle. The directive is
//! either the prompt the assistant is showing, or the continuation text when
//! the assistant sits idle.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default system instructions. The startup document is appended after a
/// blank line.
pub const DEFAULT_PREAMBLE: &str = "You are the autonomous Cursor assistant. Your role is to monitor the Cursor \
command-line interface, detect when input is required, and respond with the **bare minimum** \
required input only (e.g. 'y' or 'n'). Do not add any extra text, explanations, or commentary; \
keep all outputs as short as possible.";

/// Default directive used when the assistant is idle.
pub const DEFAULT_CONTINUATION: &str =
    "Continue according to readme.md and make decisions on your own.";

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Ordered turns, serialized as the `messages` array of a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }
}

/// Build the conversation for one cycle.
pub fn build(system_prompt: &str, session_text: &str, directive: &str) -> Conversation {
    Conversation {
        turns: vec![
            Turn {
                role: Role::System,
                content: system_prompt.to_string(),
            },
            Turn {
                role: Role::User,
                content: format!("Session:\n{session_text}\nUser: {directive}"),
            },
        ],
    }
}

/// Render a conversation as a single prompt for completion-style backends.
pub fn flatten(conversation: &Conversation) -> String {
    conversation
        .turns
        .iter()
        .map(|turn| format!("{}: {}", turn.role, turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Join visible fragments into the session text shown to the model.
pub fn session_text<S: AsRef<str>>(fragments: &[S]) -> String {
    fragments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compose the system instructions from the fixed preamble and the startup
/// document, which is appended verbatim.
pub fn system_instructions(preamble: &str, document: &str) -> String {
    format!("{preamble}\n\n{document}")
}

/// Read the startup document. Invalid UTF-8 is replaced rather than
/// rejected.
pub fn load_document(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read startup document {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_produces_system_then_user() {
        let conv = build("S", "line 1\nline 2", "Continue?");
        let turns = conv.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::System);
        assert_eq!(turns[0].content, "S");
        assert_eq!(turns[1].role, Role::User);
        assert_eq!(turns[1].content, "Session:\nline 1\nline 2\nUser: Continue?");
    }

    #[test]
    fn flatten_renders_role_prefixes() {
        let conv = Conversation {
            turns: vec![
                Turn {
                    role: Role::System,
                    content: "S".into(),
                },
                Turn {
                    role: Role::User,
                    content: "U".into(),
                },
            ],
        };
        assert_eq!(flatten(&conv), "system: S\nuser: U");
    }

    #[test]
    fn flattened_build_keeps_session_and_directive_verbatim() {
        let cases = [
            ("sys", "", ""),
            ("sys", "a\n\n  b  ", "Enter name:"),
            ("", "Generating…\tübung", "  spaced   directive  "),
            ("sys: user:", "user: fake turn", "system: also fake"),
        ];
        for (sys, session, directive) in cases {
            let flat = flatten(&build(sys, session, directive));
            assert!(flat.contains(session), "session missing from {flat:?}");
            assert!(flat.contains(directive), "directive missing from {flat:?}");
        }
    }

    #[test]
    fn conversation_serializes_as_message_array() {
        let conv = build("S", "x", "y");
        let value = serde_json::to_value(&conv).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["role"], "system");
        assert_eq!(value[1]["role"], "user");
        assert_eq!(value[1]["content"], "Session:\nx\nUser: y");
    }

    #[test]
    fn session_text_joins_with_newlines() {
        assert_eq!(session_text(&["a", "b", "c"]), "a\nb\nc");
        let empty: [&str; 0] = [];
        assert_eq!(session_text(&empty), "");
    }

    #[test]
    fn system_instructions_append_document() {
        let sys = system_instructions("Be brief.", "# Readme\nBuild it.");
        assert_eq!(sys, "Be brief.\n\n# Readme\nBuild it.");
    }

    #[test]
    fn load_document_reads_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("readme.md");
        std::fs::write(&path, "hello\n").unwrap();
        assert_eq!(load_document(&path).unwrap(), "hello\n");
    }

    #[test]
    fn load_document_tolerates_invalid_utf8() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("readme.md");
        std::fs::write(&path, b"ok \xff end").unwrap();
        let doc = load_document(&path).unwrap();
        assert!(doc.starts_with("ok "));
        assert!(doc.ends_with(" end"));
    }

    #[test]
    fn load_document_missing_file_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_document(&tmp.path().join("nope.md")).unwrap_err();
        assert!(err.to_string().contains("startup document"));
    }
}

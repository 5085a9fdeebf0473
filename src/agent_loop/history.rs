//! Conversation history and the image-downgrade pass (spec §4.2 "Agent Loop
//! / Interpreter — ConversationTurn", §9 "Image downgrade").
//!
//! Corresponds to `local_interpreter/coordinator/context.rs`'s turn buffer,
//! which keeps ordered `Text`/`Image` content parts per turn and, once a
//! newer user turn arrives, replaces any earlier screenshot with a small
//! text placeholder so the LLM context doesn't grow unbounded with stale
//! images.

use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// One part of a possibly multi-part turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { mime: String, data_base64: String },
}

/// A turn's content: either a plain string (the common case) or an
/// ordered list of parts (used when a screenshot artifact is attached).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Plain(String),
    Parts(Vec<ContentPart>),
}

/// A single turn in the conversation fed to the LLM orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: Content,
}

impl ConversationTurn {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Plain(text.into()),
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Plain(text.into()),
        }
    }

    pub fn tool_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Content::Plain(text.into()),
        }
    }

    pub fn user_with_image(text: impl Into<String>, mime: impl Into<String>, data_base64: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::Image {
                    mime: mime.into(),
                    data_base64: data_base64.into(),
                },
            ]),
        }
    }
}

/// The accumulating conversation, with a bound on how many historical
/// screenshots are kept verbatim.
#[derive(Debug, Default)]
pub struct History {
    turns: Vec<ConversationTurn>,
}

impl History {
    pub fn new() -> Self {
        Self { turns: Vec::new() }
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Replace every `Image` part in turns older than the most recent user
    /// turn with a short placeholder. Turns whose content is a plain string
    /// are untouched (there is nothing to downgrade), matching the
    /// resolution in SPEC_FULL §9 ("Image downgrade ... only inspects the
    /// ordered-content-part variant").
    pub fn downgrade_stale_images(&mut self) {
        let Some(last_user_idx) = self
            .turns
            .iter()
            .enumerate()
            .rev()
            .find(|(_, t)| t.role == Role::User)
            .map(|(i, _)| i)
        else {
            return;
        };

        for turn in self.turns[..last_user_idx].iter_mut() {
            if let Content::Parts(parts) = &mut turn.content {
                for part in parts.iter_mut() {
                    if matches!(part, ContentPart::Image { .. }) {
                        *part = ContentPart::Text {
                            text: "[screenshot omitted]".to_string(),
                        };
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downgrade_replaces_images_before_latest_user_turn() {
        let mut history = History::new();
        history.push(ConversationTurn::user_with_image("look", "image/png", "AAA"));
        history.push(ConversationTurn::assistant_text("ok"));
        history.push(ConversationTurn::user_text("now what"));

        history.downgrade_stale_images();

        let Content::Parts(parts) = &history.turns()[0].content else {
            panic!("expected parts");
        };
        assert!(matches!(parts[1], ContentPart::Text { .. }));
    }

    #[test]
    fn downgrade_is_noop_for_plain_string_turns() {
        let mut history = History::new();
        history.push(ConversationTurn::user_text("hi"));
        history.push(ConversationTurn::user_text("again"));
        let before = history.turns().to_vec();
        history.downgrade_stale_images();
        assert_eq!(history.turns(), before.as_slice());
    }

    #[test]
    fn downgrade_keeps_image_in_latest_user_turn() {
        let mut history = History::new();
        history.push(ConversationTurn::user_with_image("look", "image/png", "AAA"));
        history.downgrade_stale_images();
        let Content::Parts(parts) = &history.turns()[0].content else {
            panic!("expected parts");
        };
        assert!(matches!(parts[1], ContentPart::Image { .. }));
    }
}

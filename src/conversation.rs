/*
 * Enclave - Sandboxed Tool-Calling Agent
 * File Path: src/conversation.rs
 * Responsibility: Append-only conversation transcript shared by the agent loop.
 */

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
    Tool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    FunctionCall {
        id: Option<String>,
        name: String,
        args: Value,
        /// Opaque token some Gemini models require to be echoed back.
        thought_signature: Option<String>,
    },
    FunctionResponse {
        id: Option<String>,
        name: String,
        response: Value,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect()
    }
}

/// Ordered transcript of one CLI run.
///
/// Turns can only be appended; nothing hands out mutable access to a turn
/// once it is in the transcript.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn {
                role: Role::User,
                parts: vec![Part::text(prompt)],
            }],
        }
    }

    pub fn push_model(&mut self, parts: Vec<Part>) {
        self.push(Role::Model, parts);
    }

    /// Bundle every tool result of one model turn into a single tool turn.
    pub fn push_tool_results(&mut self, parts: Vec<Part>) {
        self.push(Role::Tool, parts);
    }

    fn push(&mut self, role: Role, parts: Vec<Part>) {
        self.turns.push(Turn { role, parts });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

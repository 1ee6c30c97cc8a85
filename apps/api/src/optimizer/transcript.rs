//! Conversation transcript owned by one optimization run.

use thiserror::Error;

use crate::llm_client::{Role, Turn};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("transcript out of order: expected a {expected:?} turn, got {got:?}")]
pub struct TranscriptError {
    pub expected: Role,
    pub got: Role,
}

/// Ordered turns exchanged with the generator. Starts with a user turn and
/// strictly alternates user/assistant; it only ever grows.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> Result<(), TranscriptError> {
        self.push(Role::User, content.into())
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) -> Result<(), TranscriptError> {
        self.push(Role::Assistant, content.into())
    }

    fn push(&mut self, role: Role, content: String) -> Result<(), TranscriptError> {
        let expected = self.next_role();
        if role != expected {
            return Err(TranscriptError {
                expected,
                got: role,
            });
        }
        self.turns.push(Turn { role, content });
        Ok(())
    }

    fn next_role(&self) -> Role {
        match self.turns.last() {
            Some(Turn {
                role: Role::User, ..
            }) => Role::Assistant,
            _ => Role::User,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }
}

//! FIFO buffer of pending commands.
//!
//! The queue has no priorities and does no de-duplication. Keeping redundant
//! reads out of it is the producer's job.

use std::collections::VecDeque;

use crate::command::Command;

/// Strict FIFO queue of [`Command`]s awaiting dispatch.
#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: VecDeque<Command>,
}

impl CommandQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `command` at the tail.
    pub fn push(&mut self, command: Command) {
        self.commands.push_back(command);
    }

    /// Remove and return the head.
    pub fn pop(&mut self) -> Option<Command> {
        self.commands.pop_front()
    }

    /// Whether no command is waiting.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of waiting commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Remove every waiting command, head first.
    pub fn drain(&mut self) -> impl Iterator<Item = Command> + '_ {
        self.commands.drain(..)
    }
}

impl Extend<Command> for CommandQueue {
    fn extend<I: IntoIterator<Item = Command>>(&mut self, iter: I) {
        self.commands.extend(iter);
    }
}

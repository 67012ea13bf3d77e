// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command-buffer state published from the GPU thread to clients.

use parking_lot::{Condvar, Mutex};

/// Why a command buffer stopped accepting commands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Everything is fine.
    #[default]
    NoError,
    /// A command header had size zero.
    InvalidSize,
    /// A command or put offset ran past the end of the ring.
    OutOfBounds,
    /// The decoder did not recognise a command.
    UnknownCommand,
    /// The decoder rejected a command's arguments.
    InvalidArguments,
    /// The decoder ran out of memory.
    OutOfMemory,
    /// The GL context is gone.
    LostContext,
}

/// Why the GL context was lost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ContextLostReason {
    /// Not lost.
    #[default]
    Unknown,
    /// This context caused a GPU reset.
    Guilty,
    /// Another context caused a GPU reset.
    Innocent,
    /// The service tore the context down (connection loss, shutdown).
    Destroyed,
    /// A command stream error forced the context lost.
    CommandStream,
}

/// Snapshot of a command buffer's progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandBufferState {
    /// Offset (in entries) of the next command the service will read.
    pub get_offset: u32,
    /// Last token set through a `SetToken` command.
    pub token: i32,
    /// Sticky error; once set the buffer processes nothing more.
    pub error: ErrorKind,
    /// Reason attached to [`ErrorKind::LostContext`].
    pub context_lost_reason: ContextLostReason,
    /// Bumped on every publish so clients can tell stale snapshots apart.
    pub generation: u32,
}

impl CommandBufferState {
    /// Returns whether the buffer is in an error state.
    #[must_use]
    pub fn is_lost(&self) -> bool {
        self.error != ErrorKind::NoError
    }
}

/// State shared between the GPU thread (writer) and client waiters.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    state: Mutex<CommandBufferState>,
    changed: Condvar,
}

impl SharedState {
    pub(crate) fn get(&self) -> CommandBufferState {
        *self.state.lock()
    }

    /// Publishes a new snapshot and wakes waiters.
    pub(crate) fn publish(&self, mut next: CommandBufferState) {
        let mut state = self.state.lock();
        next.generation = state.generation.wrapping_add(1);
        *state = next;
        self.changed.notify_all();
    }

    /// Blocks until `done` holds for the current state or the buffer is lost.
    pub(crate) fn wait_until(
        &self,
        mut done: impl FnMut(&CommandBufferState) -> bool,
    ) -> CommandBufferState {
        let mut state = self.state.lock();
        while !done(&state) && !state.is_lost() {
            self.changed.wait(&mut state);
        }
        *state
    }
}

/// Returns whether `value` lies in the ring range `[start, end]`, which may
/// wrap.
pub(crate) fn in_range(start: u32, end: u32, value: u32) -> bool {
    if start <= end {
        start <= value && value <= end
    } else {
        start <= value || value <= end
    }
}

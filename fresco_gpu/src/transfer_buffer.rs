// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Registry of client shared-memory regions referenced by commands.

use hashbrown::HashMap;

use crate::error::{CommandBufferError, Result};
use crate::shared_memory::SharedMemory;

/// Transfer buffers registered by one client, keyed by client-chosen id.
#[derive(Debug, Default)]
pub struct TransferBufferManager {
    buffers: HashMap<i32, SharedMemory>,
    max_bytes: usize,
}

impl TransferBufferManager {
    /// Creates an empty registry whose buffers may be at most `max_bytes`.
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            max_bytes,
        }
    }

    /// Registers `memory` under `id`.
    pub fn register(&mut self, id: i32, memory: SharedMemory) -> Result<()> {
        if id <= 0 {
            return Err(CommandBufferError::InvalidTransferBufferId(id));
        }
        if memory.len() > self.max_bytes {
            return Err(CommandBufferError::TransferBufferTooLarge {
                size: memory.len(),
                limit: self.max_bytes,
            });
        }
        if self.buffers.contains_key(&id) {
            return Err(CommandBufferError::DuplicateTransferBuffer(id));
        }
        self.buffers.insert(id, memory);
        Ok(())
    }

    /// Removes the buffer registered under `id`.
    pub fn destroy(&mut self, id: i32) -> Result<SharedMemory> {
        self.buffers
            .remove(&id)
            .ok_or(CommandBufferError::UnknownTransferBuffer(id))
    }

    /// Looks up a buffer.
    #[must_use]
    pub fn get(&self, id: i32) -> Option<&SharedMemory> {
        self.buffers.get(&id)
    }

    /// Number of registered buffers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Drops every registration.
    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}

// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ordering fences between independent command buffers.
//!
//! A [`SyncPoint`] is inserted into one command buffer's stream and retired by
//! the GPU thread once every command issued before it has executed. Other
//! command buffers (and the display compositor) wait on it before touching
//! resources that the first buffer produced.
//!
//! A [`SyncToken`] names the fence that guards a
//! [`TransferableResource`](crate::resource::TransferableResource): whoever
//! consumes the resource must wait for the token before reading, and whoever
//! returns it attaches a fresh token that the producer waits on before
//! reusing it.

use core::fmt;

/// A process-unique ordering fence.
///
/// Zero is reserved and never issued; it doubles as "no fence".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SyncPoint(pub u32);

impl SyncPoint {
    /// The reserved "no fence" value.
    pub const NONE: Self = Self(0);

    /// Returns whether this is a real fence.
    #[inline]
    #[must_use]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for SyncPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncPoint({})", self.0)
    }
}

/// Which kind of command buffer issued a [`SyncToken`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CommandBufferNamespace {
    /// No namespace; used by empty tokens.
    #[default]
    Invalid,
    /// A command buffer serviced in the GPU process.
    GpuIo,
    /// An in-process command buffer.
    InProcess,
}

/// Identifies a command buffer within its namespace.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CommandBufferId(pub u64);

impl fmt::Debug for CommandBufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandBufferId({})", self.0)
    }
}

/// Fence guarding access to a GPU resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SyncToken {
    /// The issuing command buffer's namespace.
    pub namespace: CommandBufferNamespace,
    /// The issuing command buffer.
    pub command_buffer_id: CommandBufferId,
    /// The sync point that must retire before the resource may be touched.
    pub sync_point: SyncPoint,
}

impl SyncToken {
    /// Creates a token for a sync point issued by the given command buffer.
    #[inline]
    #[must_use]
    pub const fn new(
        namespace: CommandBufferNamespace,
        command_buffer_id: CommandBufferId,
        sync_point: SyncPoint,
    ) -> Self {
        Self {
            namespace,
            command_buffer_id,
            sync_point,
        }
    }

    /// Returns whether the token carries a fence at all.
    ///
    /// An empty token means the resource is usable immediately.
    #[inline]
    #[must_use]
    pub const fn has_data(&self) -> bool {
        self.sync_point.is_some() && !matches!(self.namespace, CommandBufferNamespace::Invalid)
    }
}

/// Answers whether a sync point has been retired.
///
/// Implemented by the GPU service's sync-point manager. Frame-side code uses
/// this to decide when a returned resource may be handed back to the client.
pub trait SyncPointQuery {
    /// Returns `true` once `sync_point` has been retired (or was never issued).
    fn is_retired(&self, sync_point: SyncPoint) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_token_has_no_data() {
        assert!(!SyncToken::default().has_data());
    }

    #[test]
    fn token_needs_namespace_and_sync_point() {
        let id = CommandBufferId(4);
        assert!(!SyncToken::new(CommandBufferNamespace::GpuIo, id, SyncPoint::NONE).has_data());
        assert!(!SyncToken::new(CommandBufferNamespace::Invalid, id, SyncPoint(3)).has_data());
        assert!(SyncToken::new(CommandBufferNamespace::GpuIo, id, SyncPoint(3)).has_data());
    }
}

// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command stream wire format.
//!
//! The ring buffer is an array of 32-bit entries. Every command starts with a
//! [`CommandHeader`] entry followed by `size - 1` argument entries:
//!
//! ```text
//!  31         21 20                  0
//! ┌─────────────┬─────────────────────┐
//! │  command id │ size (incl. header) │   header entry
//! └─────────────┴─────────────────────┘
//!  args[0] .. args[size - 2]
//! ```
//!
//! A command never straddles the end of the ring: the writer pads the tail
//! with a [`NOOP`] and continues at entry 0.
//!
//! Ids below [`FIRST_DECODER_COMMAND`] are common commands handled by the
//! driver itself; everything else goes to the
//! [`CommandDecoder`](crate::decoder::CommandDecoder).

use crate::shared_memory::SharedMemory;

/// Skip `size` entries.
pub const NOOP: u32 = 0;
/// Set the client-visible token to `args[0]`.
pub const SET_TOKEN: u32 = 1;
/// First id routed to the decoder.
pub const FIRST_DECODER_COMMAND: u32 = 256;

const SIZE_BITS: u32 = 21;
const SIZE_MASK: u32 = (1 << SIZE_BITS) - 1;

/// Largest encodable command size in entries.
pub const MAX_COMMAND_SIZE: u32 = SIZE_MASK;
/// Largest encodable command id.
pub const MAX_COMMAND_ID: u32 = (1 << (32 - SIZE_BITS)) - 1;

/// Packed command header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommandHeader {
    /// Command size in entries, including this header.
    pub size: u32,
    /// Command id.
    pub command: u32,
}

impl CommandHeader {
    /// Creates a header.
    ///
    /// # Panics
    ///
    /// Panics if `size` or `command` do not fit their bit fields.
    #[must_use]
    pub const fn new(command: u32, size: u32) -> Self {
        assert!(size <= MAX_COMMAND_SIZE, "command size out of range");
        assert!(command <= MAX_COMMAND_ID, "command id out of range");
        Self { size, command }
    }

    /// Packs into a single entry.
    #[must_use]
    pub const fn encode(self) -> u32 {
        (self.command << SIZE_BITS) | self.size
    }

    /// Unpacks an entry.
    #[must_use]
    pub const fn decode(entry: u32) -> Self {
        Self {
            size: entry & SIZE_MASK,
            command: entry >> SIZE_BITS,
        }
    }
}

/// Client-side helper that appends commands to a ring buffer.
///
/// The writer tracks only the put offset; callers are responsible for not
/// overrunning commands the service has not consumed yet (e.g. by waiting
/// for the get offset before wrapping).
#[derive(Debug)]
pub struct CommandWriter {
    ring: SharedMemory,
    entries: u32,
    put: u32,
}

impl CommandWriter {
    /// Wraps a ring buffer, starting at entry 0.
    #[must_use]
    pub fn new(ring: SharedMemory) -> Self {
        let entries = ring.entry_count();
        Self {
            ring,
            entries,
            put: 0,
        }
    }

    /// Current put offset, to be passed to `flush`.
    #[must_use]
    pub fn put_offset(&self) -> u32 {
        self.put
    }

    /// Appends a command and returns the new put offset.
    ///
    /// # Panics
    ///
    /// Panics if the command cannot fit in the ring at all.
    pub fn push(&mut self, command: u32, args: &[u32]) -> u32 {
        let size = u32::try_from(args.len() + 1).unwrap_or(u32::MAX);
        assert!(size < self.entries, "command larger than ring buffer");

        if self.put + size > self.entries {
            let pad = self.entries - self.put;
            self.ring
                .write_entries(self.put, &[CommandHeader::new(NOOP, pad).encode()]);
            self.put = 0;
        }

        let mut words = Vec::with_capacity(args.len() + 1);
        words.push(CommandHeader::new(command, size).encode());
        words.extend_from_slice(args);
        self.ring.write_entries(self.put, &words);
        self.put = (self.put + size) % self.entries;
        self.put
    }

    /// Appends a `SetToken` command.
    #[expect(
        clippy::cast_sign_loss,
        reason = "tokens travel as raw entry bits"
    )]
    pub fn set_token(&mut self, token: i32) -> u32 {
        self.push(SET_TOKEN, &[token as u32])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_packs_size_and_command() {
        let header = CommandHeader::new(300, 5);
        let decoded = CommandHeader::decode(header.encode());
        assert_eq!(decoded, header);
        assert_eq!(header.encode() & 0x1f_ffff, 5);
    }

    #[test]
    fn writer_pads_tail_before_wrapping() {
        // 8 entries.
        let ring = SharedMemory::new(32);
        let mut writer = CommandWriter::new(ring.clone());

        assert_eq!(writer.push(FIRST_DECODER_COMMAND, &[1, 2, 3, 4]), 5);
        // 4 entries do not fit in the remaining 3: pad and wrap.
        assert_eq!(writer.push(FIRST_DECODER_COMMAND, &[7, 8, 9]), 4);

        let pad = ring.read_entries(5, 1).expect("in bounds")[0];
        assert_eq!(CommandHeader::decode(pad), CommandHeader::new(NOOP, 3));
        let head = ring.read_entries(0, 1).expect("in bounds")[0];
        assert_eq!(
            CommandHeader::decode(head),
            CommandHeader::new(FIRST_DECODER_COMMAND, 4)
        );
    }

    #[test]
    #[should_panic(expected = "command larger than ring buffer")]
    fn oversized_command_panics() {
        let mut writer = CommandWriter::new(SharedMemory::new(8));
        writer.push(FIRST_DECODER_COMMAND, &[0; 4]);
    }
}

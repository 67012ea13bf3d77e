// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Memory regions shared between a client and the GPU service.
//!
//! In a multi-process build these would be OS shared-memory mappings. Here a
//! [`SharedMemory`] is a reference-counted, lock-protected byte buffer: the
//! client writes commands and upload data into it, the GPU thread reads them.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Size of one command-buffer entry in bytes.
pub const ENTRY_SIZE: usize = 4;

/// A byte region visible to both client and service.
///
/// Cloning is cheap (Arc bump); all clones view the same bytes.
#[derive(Clone)]
pub struct SharedMemory {
    bytes: Arc<Mutex<Box<[u8]>>>,
    len: usize,
}

impl fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMemory")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl SharedMemory {
    /// Allocates a zero-filled region of `len` bytes.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(vec![0_u8; len].into_boxed_slice())),
            len,
        }
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` for a zero-length region.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of whole command entries the region holds.
    #[must_use]
    pub fn entry_count(&self) -> u32 {
        u32::try_from(self.len / ENTRY_SIZE).unwrap_or(u32::MAX)
    }

    /// Copies `data` into the region at byte `offset`.
    ///
    /// Returns `false` (and writes nothing) if the range is out of bounds.
    pub fn write(&self, offset: usize, data: &[u8]) -> bool {
        let Some(end) = offset.checked_add(data.len()) else {
            return false;
        };
        let mut bytes = self.bytes.lock();
        match bytes.get_mut(offset..end) {
            Some(dst) => {
                dst.copy_from_slice(data);
                true
            }
            None => false,
        }
    }

    /// Copies `len` bytes starting at byte `offset`, if in bounds.
    #[must_use]
    pub fn read(&self, offset: usize, len: usize) -> Option<Vec<u8>> {
        let end = offset.checked_add(len)?;
        self.bytes.lock().get(offset..end).map(<[u8]>::to_vec)
    }

    /// Writes little-endian entries starting at entry index `entry`.
    pub fn write_entries(&self, entry: u32, values: &[u32]) -> bool {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.write(entry as usize * ENTRY_SIZE, &bytes)
    }

    /// Reads `count` little-endian entries starting at entry index `entry`.
    #[must_use]
    pub fn read_entries(&self, entry: u32, count: u32) -> Option<Vec<u32>> {
        let bytes = self.read(entry as usize * ENTRY_SIZE, count as usize * ENTRY_SIZE)?;
        Some(
            bytes
                .chunks_exact(ENTRY_SIZE)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_bytes() {
        let a = SharedMemory::new(16);
        let b = a.clone();
        assert!(a.write_entries(1, &[0xdead_beef]));
        assert_eq!(b.read_entries(1, 1), Some(vec![0xdead_beef]));
    }

    #[test]
    fn out_of_bounds_access_is_refused() {
        let mem = SharedMemory::new(8);
        assert!(!mem.write(6, &[1, 2, 3]));
        assert_eq!(mem.read(4, 8), None);
        assert_eq!(mem.read_entries(2, 1), None);
        assert_eq!(mem.entry_count(), 2);
    }
}

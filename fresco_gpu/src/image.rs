// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Client-created GPU images.
//!
//! Images wrap a client-provided buffer (e.g. a scan-out capable buffer) so
//! that decoder commands can bind it as a texture.

use fresco_core::overlay::BufferFormat;
use hashbrown::HashMap;

use crate::error::{CommandBufferError, Result};
use crate::shared_memory::SharedMemory;

/// Describes an image to create.
#[derive(Clone, Debug)]
pub struct ImageDescriptor {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Buffer layout.
    pub format: BufferFormat,
    /// GL internal format the image is bound as.
    pub internal_format: u32,
    /// Backing pixels.
    pub buffer: SharedMemory,
}

/// Images owned by one command buffer, keyed by client-chosen id.
#[derive(Debug, Default)]
pub struct ImageRegistry {
    images: HashMap<i32, ImageDescriptor>,
}

impl ImageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an image.
    pub fn create(&mut self, id: i32, descriptor: ImageDescriptor) -> Result<()> {
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(CommandBufferError::EmptyImage(id));
        }
        if self.images.contains_key(&id) {
            return Err(CommandBufferError::DuplicateImage(id));
        }
        self.images.insert(id, descriptor);
        Ok(())
    }

    /// Removes an image.
    pub fn destroy(&mut self, id: i32) -> Result<()> {
        self.images
            .remove(&id)
            .map(|_| ())
            .ok_or(CommandBufferError::UnknownImage(id))
    }

    /// Looks up an image.
    #[must_use]
    pub fn get(&self, id: i32) -> Option<&ImageDescriptor> {
        self.images.get(&id)
    }

    /// Number of live images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Returns `true` when there are no images.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Drops every image.
    pub fn clear(&mut self) {
        self.images.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(width: u32) -> ImageDescriptor {
        ImageDescriptor {
            width,
            height: 16,
            format: BufferFormat::Bgra8888,
            internal_format: 0x1908,
            buffer: SharedMemory::new(width as usize * 16 * 4),
        }
    }

    #[test]
    fn create_and_destroy() {
        let mut images = ImageRegistry::new();
        assert_eq!(images.create(1, descriptor(16)), Ok(()));
        assert_eq!(
            images.create(1, descriptor(16)),
            Err(CommandBufferError::DuplicateImage(1))
        );
        assert_eq!(images.destroy(1), Ok(()));
        assert_eq!(images.destroy(1), Err(CommandBufferError::UnknownImage(1)));
    }

    #[test]
    fn empty_images_are_refused() {
        let mut images = ImageRegistry::new();
        assert_eq!(
            images.create(2, descriptor(0)),
            Err(CommandBufferError::EmptyImage(2))
        );
        assert!(images.is_empty());
    }
}

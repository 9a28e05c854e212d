use std::sync::Arc;

use crate::error::{FramemixError, FramemixResult};

/// An immutable source image: premultiplied RGBA8 pixels, row-major, no
/// padding between rows.
#[derive(Clone, Debug)]
pub struct SourceImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl SourceImage {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> FramemixResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| FramemixError::allocation("source image size overflow"))?;
        if data.len() != expected {
            return Err(FramemixError::invalid_state(
                "source image data length must equal width * height * 4",
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }
}

/// A thread-safe shared handle to a [`SourceImage`].
///
/// Cloning retains the image; dropping releases it. One image may back
/// placements in several concurrently executing jobs, so the refcount is
/// atomic and pixel access is read-only.
#[derive(Clone, Debug)]
pub struct SharedImage(Arc<SourceImage>);

impl SharedImage {
    pub fn new(image: SourceImage) -> Self {
        Self(Arc::new(image))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn pixels(&self) -> &[u8] {
        self.0.pixels()
    }

    /// Number of live handles to the underlying image, this one included.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

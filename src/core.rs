use crate::error::{FramemixError, FramemixResult};

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> FramemixResult<Self> {
        if width == 0 || height == 0 {
            return Err(FramemixError::invalid_state(
                "Canvas dimensions must be > 0",
            ));
        }
        Ok(Self { width, height })
    }

    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Pixel layout of an output frame buffer.
///
/// Source images are always premultiplied RGBA8; the format only controls
/// how composited pixels are stored in the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PixelFormat {
    Rgba8,
    Bgra8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }
}

/// Submission-order key for a composition job.
///
/// Serials are assigned at `begin`, strictly increase per scheduler
/// instance, and define the order in which completion callbacks fire.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct JobSerial(pub u64);

impl JobSerial {
    pub(crate) fn next(self) -> JobSerial {
        JobSerial(self.0 + 1)
    }
}

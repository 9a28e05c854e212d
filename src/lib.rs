#![forbid(unsafe_code)]

pub mod compose;
pub mod core;
pub mod error;
pub mod image;
pub mod job;
pub mod scheduler;

pub use compose::{Compositor, CpuCompositor, FrameBuffer};
pub use core::{Canvas, JobSerial, PixelFormat};
pub use error::{FramemixError, FramemixResult};
pub use image::{SharedImage, SourceImage};
pub use job::{FrameCallback, JobContext, SubframePlacement};
pub use scheduler::{FrameScheduler, SchedulerConfig};

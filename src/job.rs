use std::any::Any;

use crate::{
    compose::FrameBuffer,
    core::{Canvas, JobSerial, PixelFormat},
    error::FramemixError,
    image::SharedImage,
};

/// One sub-image placed on the output canvas.
///
/// The destination rectangle may extend past the canvas (including negative
/// offsets); the compositor clips it. Copying a placement into a job clones
/// the [`SharedImage`] handle, which retains the underlying pixels until the
/// job is delivered and freed.
#[derive(Clone, Debug)]
pub struct SubframePlacement {
    pub image: SharedImage,
    /// Destination x offset in canvas pixels.
    pub x: i32,
    /// Destination y offset in canvas pixels.
    pub y: i32,
    /// Destination width the image is scaled to.
    pub width: u32,
    /// Destination height the image is scaled to.
    pub height: u32,
}

/// Opaque per-job caller state, handed back to the completion callback.
pub type JobContext = Box<dyn Any + Send>;

/// Completion callback for one job.
///
/// The frame buffer is lent for the duration of the call only and freed as
/// soon as the callback returns; copy the pixels inside the callback to keep
/// them longer. The context is moved back to the caller.
pub type FrameCallback =
    Box<dyn FnOnce(Result<&FrameBuffer, &FramemixError>, JobContext) + Send + 'static>;

/// A composition job, exclusively owned by the scheduler from `begin` until
/// delivery. It moves by value: caller thread -> worker -> delivery thread.
pub(crate) struct FrameJob {
    pub(crate) serial: JobSerial,
    pub(crate) canvas: Canvas,
    pub(crate) format: PixelFormat,
    pub(crate) placements: Vec<SubframePlacement>,
    pub(crate) context: JobContext,
    pub(crate) callback: Option<FrameCallback>,
    pub(crate) outcome: Option<Result<FrameBuffer, FramemixError>>,
}

impl FrameJob {
    pub(crate) fn new(
        serial: JobSerial,
        canvas: Canvas,
        format: PixelFormat,
        context: JobContext,
    ) -> Self {
        Self {
            serial,
            canvas,
            format,
            placements: Vec::new(),
            context,
            callback: None,
            outcome: None,
        }
    }

    /// Invokes the callback and consumes the job, releasing every retained
    /// image reference and the output buffer on return.
    pub(crate) fn deliver(mut self) {
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| Err(FramemixError::compositing("job was never composed")));
        if let Some(callback) = self.callback.take() {
            callback(outcome.as_ref(), self.context);
        }
    }
}

impl std::fmt::Debug for FrameJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameJob")
            .field("serial", &self.serial)
            .field("canvas", &self.canvas)
            .field("format", &self.format)
            .field("placements", &self.placements.len())
            .field("composed", &self.outcome.is_some())
            .finish()
    }
}

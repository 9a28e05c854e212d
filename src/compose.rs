use crate::{
    core::{Canvas, PixelFormat},
    error::{FramemixError, FramemixResult},
    job::SubframePlacement,
};

/// A composited output frame.
///
/// Owned by its job until delivery, then lent to the completion callback and
/// freed when the callback returns.
#[derive(Clone, Debug)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl FrameBuffer {
    /// Allocates a zeroed buffer sized to `canvas` in `format`.
    ///
    /// Size arithmetic is checked and the reservation is fallible, so an
    /// oversized or unsatisfiable request surfaces as
    /// [`FramemixError::Allocation`] instead of aborting the process.
    pub fn alloc(canvas: Canvas, format: PixelFormat) -> FramemixResult<Self> {
        let len = (canvas.width as usize)
            .checked_mul(canvas.height as usize)
            .and_then(|v| v.checked_mul(format.bytes_per_pixel()))
            .ok_or_else(|| FramemixError::allocation("frame buffer size overflow"))?;

        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| FramemixError::allocation(format!("frame buffer reserve failed: {e}")))?;
        data.resize(len, 0);

        Ok(Self {
            width: canvas.width,
            height: canvas.height,
            format,
            data,
        })
    }
}

/// Produces one output frame from an ordered placement list.
///
/// Implementations must be safe to invoke concurrently from multiple worker
/// threads on independent inputs and must not mutate the placements' images.
pub trait Compositor: Send + Sync {
    fn compose(
        &self,
        canvas: Canvas,
        format: PixelFormat,
        placements: &[SubframePlacement],
    ) -> FramemixResult<FrameBuffer>;
}

/// Default CPU compositor: nearest-neighbor scaling plus premultiplied-alpha
/// `over` blending, placements painted in list order.
#[derive(Clone, Debug, Default)]
pub struct CpuCompositor {
    /// Optional canvas clear color applied before painting. Premultiplied
    /// RGBA8, like source pixels: placements blend over it with `over`.
    pub clear_rgba: Option<[u8; 4]>,
}

impl CpuCompositor {
    pub fn new(clear_rgba: Option<[u8; 4]>) -> Self {
        Self { clear_rgba }
    }
}

impl Compositor for CpuCompositor {
    #[tracing::instrument(skip(self, placements), fields(placements = placements.len()))]
    fn compose(
        &self,
        canvas: Canvas,
        format: PixelFormat,
        placements: &[SubframePlacement],
    ) -> FramemixResult<FrameBuffer> {
        let mut frame = FrameBuffer::alloc(canvas, format)?;

        if let Some(clear) = self.clear_rgba {
            for px in frame.data.chunks_exact_mut(4) {
                px.copy_from_slice(&clear);
            }
        }

        // Pixels stay RGBA while painting; Bgra8 swizzles once at the end.
        for placement in placements {
            blit_scaled(&mut frame.data, canvas, placement);
        }

        if format == PixelFormat::Bgra8 {
            for px in frame.data.chunks_exact_mut(4) {
                px.swap(0, 2);
            }
        }

        Ok(frame)
    }
}

/// Paints one placement onto the canvas, clipping against its bounds.
fn blit_scaled(dst: &mut [u8], canvas: Canvas, placement: &SubframePlacement) {
    let img = &placement.image;
    if placement.width == 0 || placement.height == 0 || img.width() == 0 || img.height() == 0 {
        return;
    }

    let x0 = placement.x.max(0) as i64;
    let y0 = placement.y.max(0) as i64;
    let x1 = (i64::from(placement.x) + i64::from(placement.width)).min(i64::from(canvas.width));
    let y1 = (i64::from(placement.y) + i64::from(placement.height)).min(i64::from(canvas.height));
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let src = img.pixels();
    for dy in y0..y1 {
        let rel_y = (dy - i64::from(placement.y)) as u64;
        let sy = rel_y * u64::from(img.height()) / u64::from(placement.height);
        for dx in x0..x1 {
            let rel_x = (dx - i64::from(placement.x)) as u64;
            let sx = rel_x * u64::from(img.width()) / u64::from(placement.width);

            let si = ((sy * u64::from(img.width()) + sx) * 4) as usize;
            let di = ((dy as u64 * u64::from(canvas.width) + dx as u64) * 4) as usize;

            let blended = over(
                [dst[di], dst[di + 1], dst[di + 2], dst[di + 3]],
                [src[si], src[si + 1], src[si + 2], src[si + 3]],
            );
            dst[di..di + 4].copy_from_slice(&blended);
        }
    }
}

pub type PremulRgba8 = [u8; 4];

pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }

    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = add_sat_u8(src[i], mul_div255(u16::from(dst[i]), inv));
    }
    out
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

fn add_sat_u8(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}

//! Subject-over-background compositing
//!
//! The subject is scaled so its height is 80% of the background's height,
//! centred horizontally, anchored 20px above the bottom edge and blended
//! with the "over" operator using its own alpha channel as the mask.
//! Subject pixels that land outside the canvas are clipped.

use crate::{
    error::{BgCompositeError, Result},
    types::{CompositeRequest, CompositeResult, Placement, RasterImage},
};
use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgba, Rgba32FImage};
use tracing::{debug, instrument};

/// Scaled subject height as a fraction of the background height
pub const SUBJECT_HEIGHT_RATIO: f64 = 0.8;

/// Gap between the subject's bottom edge and the background's bottom edge
pub const BOTTOM_MARGIN_PX: i64 = 20;

/// Upper bound on the scaled subject's pixel count
pub const MAX_SCALED_PIXELS: u64 = 1 << 28;

/// Stateless compositing routines
pub struct ImageCompositor;

impl ImageCompositor {
    /// Size of the subject after scaling it to 80% of the background height
    ///
    /// # Errors
    /// - `InvalidImage` if either image has a zero dimension
    /// - `InvalidImage` if the scale is not finite or the scaled subject is empty or too large
    pub fn scaled_size(subject: (u32, u32), background: (u32, u32)) -> Result<(u32, u32)> {
        let (subject_width, subject_height) = subject;
        let (background_width, background_height) = background;

        if subject_width == 0 || subject_height == 0 {
            return Err(BgCompositeError::invalid_image(format!(
                "Subject image has a zero dimension ({subject_width}x{subject_height})"
            )));
        }
        if background_width == 0 || background_height == 0 {
            return Err(BgCompositeError::invalid_image(format!(
                "Background image has a zero dimension ({background_width}x{background_height})"
            )));
        }

        let scale = (f64::from(background_height) * SUBJECT_HEIGHT_RATIO) / f64::from(subject_height);
        if !scale.is_finite() || scale <= 0.0 {
            return Err(BgCompositeError::invalid_image(format!(
                "Cannot scale subject: scale factor {scale} is not usable"
            )));
        }

        // Truncation toward zero; both operands are positive so this is floor()
        let new_width = f64::from(subject_width) * scale;
        let new_height = f64::from(subject_height) * scale;
        if new_width >= f64::from(u32::MAX) || new_height >= f64::from(u32::MAX) {
            return Err(BgCompositeError::invalid_image(format!(
                "Scaled subject would be {new_width:.0}x{new_height:.0} pixels"
            )));
        }
        let (new_width, new_height) = (new_width as u32, new_height as u32);

        if new_width == 0 || new_height == 0 {
            return Err(BgCompositeError::invalid_image(format!(
                "Scaled subject would be empty ({new_width}x{new_height}) for a {subject_width}x{subject_height} subject on a {background_width}x{background_height} background"
            )));
        }
        if u64::from(new_width) * u64::from(new_height) > MAX_SCALED_PIXELS {
            return Err(BgCompositeError::invalid_image(format!(
                "Scaled subject would be {new_width}x{new_height} pixels, above the {MAX_SCALED_PIXELS} pixel limit"
            )));
        }

        Ok((new_width, new_height))
    }

    /// Top-left offset of a scaled subject: centred horizontally, bottom-anchored
    ///
    /// Offsets are not clamped and may be negative.
    #[must_use]
    pub fn offsets(scaled: (u32, u32), background: (u32, u32)) -> (i64, i64) {
        let x = (i64::from(background.0) - i64::from(scaled.0)).div_euclid(2);
        let y = i64::from(background.1) - i64::from(scaled.1) - BOTTOM_MARGIN_PX;
        (x, y)
    }

    /// Full placement of a subject on a background
    ///
    /// # Errors
    /// Same conditions as [`ImageCompositor::scaled_size`].
    pub fn compute_placement(subject: (u32, u32), background: (u32, u32)) -> Result<Placement> {
        let (width, height) = Self::scaled_size(subject, background)?;
        let (x, y) = Self::offsets((width, height), background);
        Ok(Placement {
            width,
            height,
            x,
            y,
        })
    }

    /// Composite the request's subject over its background
    ///
    /// # Errors
    /// - `InvalidImage` if the subject has no alpha channel
    /// - `InvalidImage` for zero-sized inputs or degenerate scaling
    #[instrument(
        skip_all,
        fields(
            subject = %format!("{}x{}", request.subject.width(), request.subject.height()),
            background = %format!("{}x{}", request.background.width(), request.background.height())
        )
    )]
    pub fn composite(request: &CompositeRequest) -> Result<CompositeResult> {
        let subject = &request.subject;
        if !subject.color().has_alpha() {
            return Err(BgCompositeError::invalid_image(format!(
                "Subject image has no alpha channel (color type {:?})",
                subject.color()
            )));
        }

        let placement =
            Self::compute_placement(subject.dimensions(), request.background.dimensions())?;
        debug!(
            width = placement.width,
            height = placement.height,
            x = placement.x,
            y = placement.y,
            "Computed subject placement"
        );

        let layer = Self::resize_subject(subject, placement.width, placement.height);
        let mut canvas = request.background.to_rgba8();
        Self::blend_over(&mut canvas, &layer, placement.x, placement.y);

        Ok(CompositeResult {
            image: canvas,
            placement,
        })
    }

    /// Lanczos3 resize to the exact target size; same-size subjects are copied
    ///
    /// Resampling runs on premultiplied alpha so transparent pixels do not
    /// bleed their colour into the subject's edges.
    fn resize_subject(subject: &DynamicImage, width: u32, height: u32) -> RasterImage {
        let rgba = subject.to_rgba8();
        if rgba.dimensions() == (width, height) {
            return rgba;
        }
        let resized =
            image::imageops::resize(&premultiply(&rgba), width, height, FilterType::Lanczos3);
        unpremultiply(&resized)
    }

    /// Blend `layer` onto `canvas` at a signed offset using the layer's alpha
    ///
    /// Colour channels are blended as `round((src * a + dst * (255 - a)) / 255)`;
    /// alpha becomes `a + dst_a * (255 - a) / 255`, so an opaque canvas stays
    /// opaque. Pixels outside the canvas are skipped.
    pub fn blend_over(canvas: &mut RasterImage, layer: &RasterImage, x: i64, y: i64) {
        let (canvas_width, canvas_height) = canvas.dimensions();
        let (layer_width, layer_height) = layer.dimensions();

        let x_start = x.max(0);
        let y_start = y.max(0);
        let x_end = (x + i64::from(layer_width)).min(i64::from(canvas_width));
        let y_end = (y + i64::from(layer_height)).min(i64::from(canvas_height));
        if x_end <= x_start || y_end <= y_start {
            return;
        }

        for canvas_y in y_start..y_end {
            for canvas_x in x_start..x_end {
                let src = layer.get_pixel((canvas_x - x) as u32, (canvas_y - y) as u32);
                let alpha = src[3];
                if alpha == 0 {
                    continue;
                }
                let dst = canvas.get_pixel_mut(canvas_x as u32, canvas_y as u32);
                if alpha == u8::MAX {
                    *dst = *src;
                    continue;
                }
                for (d, &s) in dst.0.iter_mut().zip(src.0.iter()).take(3) {
                    *d = blend_channel(s, *d, alpha);
                }
                dst[3] = blend_alpha(alpha, dst[3]);
            }
        }
    }
}

fn blend_channel(src: u8, dst: u8, alpha: u8) -> u8 {
    let a = u32::from(alpha);
    ((u32::from(src) * a + u32::from(dst) * (255 - a) + 127) / 255) as u8
}

fn blend_alpha(src_alpha: u8, dst_alpha: u8) -> u8 {
    let a = u32::from(src_alpha);
    (a + (u32::from(dst_alpha) * (255 - a) + 127) / 255) as u8
}

fn premultiply(image: &RasterImage) -> Rgba32FImage {
    Rgba32FImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0.map(|c| f32::from(c) / 255.0);
        Rgba([r * a, g * a, b * a, a])
    })
}

fn unpremultiply(image: &Rgba32FImage) -> RasterImage {
    RasterImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = unit_to_u8(a);
        if alpha == 0 {
            return Rgba([0, 0, 0, 0]);
        }
        Rgba([unit_to_u8(r / a), unit_to_u8(g / a), unit_to_u8(b / a), alpha])
    })
}

fn unit_to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Composite `subject` over `background` with the fixed scale and margin
///
/// # Errors
/// See [`ImageCompositor::composite`].
pub fn composite_images(subject: DynamicImage, background: DynamicImage) -> Result<CompositeResult> {
    ImageCompositor::composite(&CompositeRequest::new(subject, background))
}

//! Display-space <-> source-space coordinate mapping.
//!
//! A source image is fitted into a display surface with one uniform scale factor and
//! centered with an integer offset. Everything that draws the image or interprets a
//! pointer position over it goes through [`DisplayTransform`], so the renderer and the
//! selection logic can never disagree about scale.

use crate::geometry::{PointF, RectF, Size};

/// Uniform fit of a source image inside a display surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayTransform {
    pub scale: f64,
    pub offset: (i32, i32),
}

impl DisplayTransform {
    pub const IDENTITY: DisplayTransform = DisplayTransform {
        scale: 1.0,
        offset: (0, 0),
    };

    fn offset_f(&self) -> (f64, f64) {
        (f64::from(self.offset.0), f64::from(self.offset.1))
    }

    /// Size of the scaled image on the display surface.
    pub fn scaled_size(&self, source: Size) -> (f64, f64) {
        (
            f64::from(source.width) * self.scale,
            f64::from(source.height) * self.scale,
        )
    }

    /// Area of the display surface covered by the image.
    pub fn image_rect(&self, source: Size) -> RectF {
        source_to_display(source.bounds(), self)
    }
}

impl Default for DisplayTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// `scale = min(display_w / source_w, display_h / source_h)`, offset centers the result.
///
/// A zero-area display or source yields the identity transform instead of a zero or
/// infinite scale.
pub fn compute_transform(source: Size, display: Size) -> DisplayTransform {
    if source.is_empty() || display.is_empty() {
        return DisplayTransform::IDENTITY;
    }
    let scale_w = f64::from(display.width) / f64::from(source.width);
    let scale_h = f64::from(display.height) / f64::from(source.height);
    let scale = scale_w.min(scale_h);
    if !(scale.is_finite() && scale > 0.0) {
        return DisplayTransform::IDENTITY;
    }

    let scaled_w = f64::from(source.width) * scale;
    let scaled_h = f64::from(source.height) * scale;
    let offset_x = ((f64::from(display.width) - scaled_w) / 2.0).floor() as i32;
    let offset_y = ((f64::from(display.height) - scaled_h) / 2.0).floor() as i32;

    DisplayTransform {
        scale,
        offset: (offset_x, offset_y),
    }
}

pub fn display_to_source(point: PointF, transform: &DisplayTransform) -> PointF {
    let (ox, oy) = transform.offset_f();
    PointF::new(
        (point.x - ox) / transform.scale,
        (point.y - oy) / transform.scale,
    )
}

pub fn source_to_display_point(point: PointF, transform: &DisplayTransform) -> PointF {
    let (ox, oy) = transform.offset_f();
    PointF::new(
        point.x * transform.scale + ox,
        point.y * transform.scale + oy,
    )
}

pub fn source_to_display(rect: RectF, transform: &DisplayTransform) -> RectF {
    let (ox, oy) = transform.offset_f();
    RectF::new(
        rect.x * transform.scale + ox,
        rect.y * transform.scale + oy,
        rect.w * transform.scale,
        rect.h * transform.scale,
    )
}

pub fn display_rect_to_source(rect: RectF, transform: &DisplayTransform) -> RectF {
    let origin = display_to_source(PointF::new(rect.x, rect.y), transform);
    RectF::new(
        origin.x,
        origin.y,
        rect.w / transform.scale,
        rect.h / transform.scale,
    )
}

use serde::{Deserialize, Serialize};

/// Width/height pair in whole pixels (or EMU, for slide layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn bounds(&self) -> RectF {
        RectF::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

impl PointF {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle with floating point origin and extent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RectF {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl RectF {
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Normalized bounding box of two corners, whichever direction the drag went.
    pub fn from_corners(a: PointF, b: PointF) -> Self {
        let x0 = a.x.min(b.x);
        let y0 = a.y.min(b.y);
        Self {
            x: x0,
            y: y0,
            w: (a.x - b.x).abs(),
            h: (a.y - b.y).abs(),
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    pub fn is_empty(&self) -> bool {
        !(self.w > 0.0 && self.h > 0.0)
    }

    pub fn contains(&self, p: PointF) -> bool {
        p.x >= self.x && p.y >= self.y && p.x < self.right() && p.y < self.bottom()
    }

    /// Overlap of two rectangles; `None` when they share no area.
    pub fn intersect(&self, other: &RectF) -> Option<RectF> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 > x0 && y1 > y0 {
            Some(RectF::new(x0, y0, x1 - x0, y1 - y0))
        } else {
            None
        }
    }
}

/// Rectangle in source-space pixel coordinates. Always has positive width and height
/// when produced by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl SourceRect {
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.w)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.h)
    }

    pub fn size(&self) -> Size {
        Size::new(self.w, self.h)
    }

    pub fn to_rect_f(self) -> RectF {
        RectF::new(
            f64::from(self.x),
            f64::from(self.y),
            f64::from(self.w),
            f64::from(self.h),
        )
    }

    /// True when the rectangle has area and lies inside `[0, width) x [0, height)`.
    pub fn fits_within(&self, image: Size) -> bool {
        self.w > 0 && self.h > 0 && self.right() <= image.width && self.bottom() <= image.height
    }

    /// Snap a source-space rectangle to whole pixels and clip it to the image.
    ///
    /// Edges are rounded rather than floored so a rectangle that went through a
    /// display round-trip lands back on the pixel grid it came from. Returns `None`
    /// when nothing of the rectangle is left inside the image.
    pub fn clamp_from(rect: RectF, image: Size) -> Option<SourceRect> {
        if image.is_empty() || !rect.x.is_finite() || !rect.y.is_finite() {
            return None;
        }
        let clipped = rect.intersect(&image.bounds())?;
        let x0 = clipped.x.round() as i64;
        let y0 = clipped.y.round() as i64;
        let x1 = (clipped.right().round() as i64).min(i64::from(image.width));
        let y1 = (clipped.bottom().round() as i64).min(i64::from(image.height));
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(SourceRect::new(
            x0 as u32,
            y0 as u32,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
        ))
    }
}

impl std::fmt::Display for SourceRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.w, self.h, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_normalize_in_every_direction() {
        let expected = RectF::new(10.0, 20.0, 30.0, 40.0);
        let a = PointF::new(10.0, 20.0);
        let b = PointF::new(40.0, 60.0);
        assert_eq!(RectF::from_corners(a, b), expected);
        assert_eq!(RectF::from_corners(b, a), expected);
        assert_eq!(
            RectF::from_corners(PointF::new(40.0, 20.0), PointF::new(10.0, 60.0)),
            expected
        );
        assert_eq!(
            RectF::from_corners(PointF::new(10.0, 60.0), PointF::new(40.0, 20.0)),
            expected
        );
    }

    #[test]
    fn clamp_clips_partial_overlap() {
        let image = Size::new(100, 50);
        let rect = RectF::new(-20.0, 30.0, 60.0, 40.0);
        assert_eq!(
            SourceRect::clamp_from(rect, image),
            Some(SourceRect::new(0, 30, 40, 20))
        );
    }

    #[test]
    fn clamp_rejects_rect_outside_image() {
        let image = Size::new(100, 50);
        assert_eq!(
            SourceRect::clamp_from(RectF::new(120.0, 10.0, 30.0, 30.0), image),
            None
        );
        assert_eq!(
            SourceRect::clamp_from(RectF::new(10.0, 10.0, 0.0, 30.0), image),
            None
        );
    }

    #[test]
    fn clamp_snaps_rounding_noise() {
        let image = Size::new(400, 300);
        let noisy = RectF::new(9.999_999_9, 10.000_000_2, 100.000_000_1, 49.999_999_8);
        assert_eq!(
            SourceRect::clamp_from(noisy, image),
            Some(SourceRect::new(10, 10, 100, 50))
        );
    }

    #[test]
    fn fits_within_checks_far_edges() {
        let image = Size::new(400, 300);
        assert!(SourceRect::new(0, 0, 400, 300).fits_within(image));
        assert!(!SourceRect::new(1, 0, 400, 300).fits_within(image));
        assert!(!SourceRect::new(0, 0, 0, 10).fits_within(image));
    }
}

//! ROI preview: the source image with the selection outlined and labelled.

use font8x8::{UnicodeFonts, BASIC_FONTS, GREEK_FONTS, HIRAGANA_FONTS, LATIN_FONTS};
use image::{DynamicImage, Rgba, RgbaImage};

use crate::geometry::{Size, SourceRect};

/// Red, as the selection rectangle is drawn in the viewer.
pub const ROI_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const HALO_COLOR: Rgba<u8> = Rgba([0, 0, 0, 160]);
const LABEL_BG: Rgba<u8> = Rgba([0, 0, 0, 170]);
const LABEL_FG: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Hollow box for characters the bitmap fonts do not cover (most CJK titles).
const MISSING_GLYPH: [u8; 8] = [0x7E, 0x42, 0x42, 0x42, 0x42, 0x42, 0x7E, 0x00];

/// Draw `rect` over a copy of `source`, with `label` above it when there is room
/// (inside the top edge otherwise). Stroke width and glyph size follow the image size.
pub fn render_roi_overlay(source: &DynamicImage, rect: SourceRect, label: Option<&str>) -> RgbaImage {
    let mut out = source.to_rgba8();
    let (img_w, img_h) = out.dimensions();
    let long_edge = img_w.max(img_h);
    let stroke = (long_edge / 400).clamp(1, 12);

    draw_rect_outline(&mut out, rect, HALO_COLOR, stroke + 2);
    draw_rect_outline(&mut out, rect, ROI_COLOR, stroke);

    if let Some(label) = label.and_then(|text| RoiLabel::new(text, long_edge)) {
        let plate = label.plate_size();
        let (x, y) = label_origin(rect, stroke, plate, Size::new(img_w, img_h));
        shade(&mut out, SourceRect::new(x, y, plate.width, plate.height), LABEL_BG);
        label.draw(&mut out, x + label.pad(), y + label.pad(), LABEL_FG);
    }

    out
}

/// Outline growing outward from the rectangle edge, clipped to the image.
pub fn draw_rect_outline(img: &mut RgbaImage, rect: SourceRect, color: Rgba<u8>, thickness: u32) {
    let (img_w, img_h) = img.dimensions();
    if rect.w == 0 || rect.h == 0 || img_w == 0 || img_h == 0 {
        return;
    }
    let max_x = img_w - 1;
    let max_y = img_h - 1;
    let x0 = rect.x.min(max_x);
    let y0 = rect.y.min(max_y);
    let x1 = (rect.right() - 1).min(max_x);
    let y1 = (rect.bottom() - 1).min(max_y);

    for t in 0..thickness.max(1) {
        let tx0 = x0.saturating_sub(t);
        let ty0 = y0.saturating_sub(t);
        let tx1 = (x1 + t).min(max_x);
        let ty1 = (y1 + t).min(max_y);

        for xx in tx0..=tx1 {
            blend_at(img, xx, ty0, color);
            blend_at(img, xx, ty1, color);
        }
        for yy in (ty0 + 1)..ty1 {
            blend_at(img, tx0, yy, color);
            blend_at(img, tx1, yy, color);
        }
    }
}

/// One line of 8x8 glyphs, scaled by an integer factor.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RoiLabel {
    glyphs: Vec<[u8; 8]>,
    scale: u32,
}

impl RoiLabel {
    /// `None` for blank text. Line breaks in titles are folded into spaces.
    fn new(text: &str, long_edge: u32) -> Option<Self> {
        let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            return None;
        }
        Some(Self {
            glyphs: line.chars().map(glyph_for).collect(),
            scale: (long_edge / 500).clamp(1, 6),
        })
    }

    fn cell(&self) -> u32 {
        8 * self.scale
    }

    fn pad(&self) -> u32 {
        2 * self.scale
    }

    /// Text plus padding on every side.
    fn plate_size(&self) -> Size {
        let pad = 2 * self.pad();
        Size::new(self.glyphs.len() as u32 * self.cell() + pad, self.cell() + pad)
    }

    fn draw(&self, img: &mut RgbaImage, x: u32, y: u32, color: Rgba<u8>) {
        for (idx, glyph) in self.glyphs.iter().enumerate() {
            let left = x + idx as u32 * self.cell();
            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..8u32 {
                    if bits & (1 << col) != 0 {
                        let dot = SourceRect::new(
                            left + col * self.scale,
                            y + row as u32 * self.scale,
                            self.scale,
                            self.scale,
                        );
                        shade(img, dot, color);
                    }
                }
            }
        }
    }
}

fn glyph_for(ch: char) -> [u8; 8] {
    BASIC_FONTS
        .get(ch)
        .or_else(|| LATIN_FONTS.get(ch))
        .or_else(|| GREEK_FONTS.get(ch))
        .or_else(|| HIRAGANA_FONTS.get(ch))
        .unwrap_or(MISSING_GLYPH)
}

/// Top-left corner of the label plate: just above the outline when it fits, else just
/// inside the top edge. Shifted left so a label near the right border stays readable.
fn label_origin(rect: SourceRect, stroke: u32, plate: Size, image: Size) -> (u32, u32) {
    let y = if rect.y >= plate.height + stroke {
        rect.y - stroke - plate.height
    } else {
        (rect.y + stroke).min(image.height.saturating_sub(plate.height))
    };
    let x = rect.x.min(image.width.saturating_sub(plate.width));
    (x, y)
}

/// Composite `color` over the part of `area` inside the image.
fn shade(img: &mut RgbaImage, area: SourceRect, color: Rgba<u8>) {
    let (w, h) = img.dimensions();
    let x1 = area.right().min(w);
    let y1 = area.bottom().min(h);
    for y in area.y.min(y1)..y1 {
        for x in area.x.min(x1)..x1 {
            blend_at(img, x, y, color);
        }
    }
}

fn blend_at(img: &mut RgbaImage, x: u32, y: u32, src: Rgba<u8>) {
    let px = img.get_pixel_mut(x, y);
    *px = composite(*px, src);
}

/// Source-over with straight alpha, in 8-bit integer arithmetic.
fn composite(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = u32::from(src[3]);
    if a == 0 {
        return dst;
    }
    let inv = 255 - a;
    let mix = |d: u8, s: u8| ((u32::from(s) * a + u32::from(d) * inv + 127) / 255) as u8;
    let alpha = (a * 255 + u32::from(dst[3]) * inv + 127) / 255;
    Rgba([
        mix(dst[0], src[0]),
        mix(dst[1], src[1]),
        mix(dst[2], src[2]),
        alpha as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])))
    }

    #[test]
    fn outline_marks_roi_edges_only() {
        let out = render_roi_overlay(&white(200, 100), SourceRect::new(50, 40, 60, 30), None);
        assert_eq!(*out.get_pixel(50, 40), ROI_COLOR);
        assert_eq!(*out.get_pixel(109, 69), ROI_COLOR);
        assert_eq!(*out.get_pixel(80, 55), Rgba([255, 255, 255, 255]));
        assert_eq!(*out.get_pixel(5, 5), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn outline_at_image_border_is_clipped() {
        let mut img = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        draw_rect_outline(&mut img, SourceRect::new(0, 0, 20, 20), ROI_COLOR, 3);
        assert_eq!(*img.get_pixel(0, 0), ROI_COLOR);
        assert_eq!(*img.get_pixel(19, 19), ROI_COLOR);
        assert_eq!(*img.get_pixel(10, 10), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn label_is_drawn_near_the_roi() {
        let source = white(200, 100);
        let plain = render_roi_overlay(&source, SourceRect::new(20, 50, 100, 40), None);
        let labelled = render_roi_overlay(&source, SourceRect::new(20, 50, 100, 40), Some("ROI"));
        let changed = plain
            .enumerate_pixels()
            .filter(|(x, y, px)| labelled.get_pixel(*x, *y) != *px)
            .count();
        assert!(changed > 0);
        // Label sits above the box when there is room.
        assert_ne!(labelled.get_pixel(22, 40), plain.get_pixel(22, 40));
        assert!(render_roi_overlay(&source, SourceRect::new(20, 50, 100, 40), Some("  \n"))
            .pixels()
            .eq(plain.pixels()));
    }

    #[test]
    fn label_moves_inside_at_the_top_and_left_at_the_right_border() {
        let image = Size::new(200, 100);
        let plate = Size::new(40, 12);
        assert_eq!(label_origin(SourceRect::new(20, 50, 10, 10), 1, plate, image), (20, 37));
        assert_eq!(label_origin(SourceRect::new(20, 5, 10, 10), 1, plate, image), (20, 6));
        assert_eq!(label_origin(SourceRect::new(190, 50, 10, 10), 1, plate, image), (160, 37));
    }

    #[test]
    fn plate_fits_one_line_of_glyphs() {
        let label = RoiLabel::new("Station\nA", 1000).unwrap();
        assert_eq!(label.scale, 2);
        assert_eq!(label.glyphs.len(), "Station A".len());
        assert_eq!(label.plate_size(), Size::new(9 * 16 + 8, 16 + 8));
        assert!(RoiLabel::new(" ", 1000).is_none());
    }

    #[test]
    fn uncovered_characters_draw_a_box() {
        assert_eq!(glyph_for('工'), MISSING_GLYPH);
        assert_ne!(glyph_for('é'), MISSING_GLYPH);
        assert_eq!(glyph_for(' '), [0; 8]);
    }

    #[test]
    fn composite_respects_alpha() {
        let dst = Rgba([0, 0, 0, 255]);
        assert_eq!(composite(dst, Rgba([255, 255, 255, 0])), dst);
        assert_eq!(composite(dst, Rgba([200, 100, 50, 255])), Rgba([200, 100, 50, 255]));
        assert_eq!(composite(dst, Rgba([255, 0, 0, 128])), Rgba([128, 0, 0, 255]));
    }
}

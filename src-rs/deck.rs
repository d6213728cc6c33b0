//! Slide-deck writer producing an Office Open XML presentation (`.pptx`).
//!
//! One 16:9 slide per record with a title, the original image, the cropped ROI and a
//! comment. Text is stored as Unicode in the slide XML, so titles and comments in any
//! script reach the document unchanged. Lines are broken here with measured glyph
//! widths, so a viewer with the theme fonts shows the same layout.

use std::fs;
use std::io::{self, Cursor, Seek, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ReportError;
use crate::geometry::Size;
use crate::mapper::compute_transform;

const EMU_PER_IN: i64 = 914_400;
const EMU_PER_PT: f64 = 12_700.0;

/// 13.333 in x 7.5 in, in EMU.
pub const SLIDE_SIZE: Size = Size::new(12_192_000, 6_858_000);

const TITLE_LEFT: i64 = 23 * EMU_PER_IN / 10;
const TITLE_TOP: i64 = EMU_PER_IN / 2;
/// The title box spans from `TITLE_LEFT` to 0.7 in short of the right edge.
const TITLE_INSET: i64 = 3 * EMU_PER_IN;
const TITLE_PT: f64 = 28.0;
const TITLE_MIN_PT: f64 = 18.0;

const IMAGE_TOP: i64 = 18 * EMU_PER_IN / 10;
const IMAGE_HEIGHT: i64 = 3 * EMU_PER_IN;
const ORIGINAL_LEFT: i64 = EMU_PER_IN / 2;
const ORIGINAL_MAX_W: i64 = 6 * EMU_PER_IN;
const CROP_RIGHT_MARGIN: i64 = 15 * EMU_PER_IN / 10;
const CROP_MAX_W: i64 = 5 * EMU_PER_IN;

const COMMENT_LEFT: i64 = EMU_PER_IN / 2;
const COMMENT_TOP: i64 = 52 * EMU_PER_IN / 10;
const COMMENT_INSET: i64 = EMU_PER_IN;
const COMMENT_PT: f64 = 14.0;

const LINE_SPACING: f64 = 1.2;

/// Image data ready to embed in a slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeckImage {
    Jpeg { size: Size, data: Vec<u8> },
    /// Lossless; the slide shows exactly these pixels.
    Png { size: Size, data: Vec<u8> },
}

impl DeckImage {
    /// JPEG rendition no larger than `max_edge` on its long side.
    pub fn jpeg(image: &DynamicImage, max_edge: u32, quality: u8) -> Result<Self, image::ImageError> {
        let (w, h) = image.dimensions();
        let scaled = if w.max(h) > max_edge {
            image.resize(max_edge, max_edge, FilterType::Triangle)
        } else {
            image.clone()
        };
        let rgb = scaled.to_rgb8();
        let mut data = Vec::new();
        JpegEncoder::new_with_quality(&mut data, quality).encode_image(&rgb)?;
        Ok(DeckImage::Jpeg {
            size: Size::new(rgb.width(), rgb.height()),
            data,
        })
    }

    pub fn png(image: &DynamicImage) -> Result<Self, image::ImageError> {
        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
        let mut data = Vec::new();
        rgb.write_to(&mut Cursor::new(&mut data), ImageFormat::Png)?;
        Ok(DeckImage::Png {
            size: Size::new(rgb.width(), rgb.height()),
            data,
        })
    }

    pub fn size(&self) -> Size {
        match self {
            DeckImage::Jpeg { size, .. } | DeckImage::Png { size, .. } => *size,
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            DeckImage::Jpeg { .. } => "jpeg",
            DeckImage::Png { .. } => "png",
        }
    }

    fn data(&self) -> &[u8] {
        match self {
            DeckImage::Jpeg { data, .. } | DeckImage::Png { data, .. } => data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slide {
    pub title: String,
    pub original: Option<DeckImage>,
    pub crop: Option<DeckImage>,
    pub comment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

/// Where a shape lands on the slide, in EMU from the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    x: i64,
    y: i64,
    w: i64,
    h: i64,
}

/// Fit `image` into a box `max_w` wide and `IMAGE_HEIGHT` tall whose anchored edge is
/// at `edge_x`.
fn place(image: Size, edge_x: i64, max_w: i64, align: Align) -> Placement {
    let region = Size::new(max_w as u32, IMAGE_HEIGHT as u32);
    let transform = compute_transform(image, region);
    let (w, h) = transform.scaled_size(image);
    let (w, h) = (w.round() as i64, h.round() as i64);
    let x = match align {
        Align::Left => edge_x,
        Align::Right => edge_x - w,
    };
    Placement {
        x,
        y: IMAGE_TOP + i64::from(transform.offset.1),
        w,
        h,
    }
}

/// Text laid out for one text box.
#[derive(Debug, Clone, PartialEq)]
struct TextBlock {
    pt: f64,
    lines: Vec<String>,
}

impl TextBlock {
    fn height(&self) -> i64 {
        let lines = self.lines.len().max(1) as f64;
        (lines * self.pt * LINE_SPACING * EMU_PER_PT).round() as i64
    }
}

/// Single-line title at 28 pt when it fits, otherwise the largest size down to 18 pt
/// that fits, otherwise wrapped at 18 pt.
fn fit_title(title: &str, box_w: i64) -> TextBlock {
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut pt = TITLE_PT;
    while pt >= TITLE_MIN_PT {
        if text_width(&title, pt) <= box_w {
            return TextBlock {
                pt,
                lines: vec![title],
            };
        }
        pt -= 2.0;
    }
    TextBlock {
        pt: TITLE_MIN_PT,
        lines: wrap_text(&title, TITLE_MIN_PT, box_w),
    }
}

/// Advance widths of Helvetica for `' '..='~'`, in 1/1000 em. Arial, the theme's Latin
/// face, shares these metrics.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

/// Full-width scripts (CJK, Hangul, full-width forms) take a whole em.
fn is_wide(ch: char) -> bool {
    matches!(
        ch as u32,
        0x1100..=0x115F
            | 0x2E80..=0x303E
            | 0x3041..=0xA4CF
            | 0xAC00..=0xD7A3
            | 0xF900..=0xFAFF
            | 0xFE30..=0xFE4F
            | 0xFF00..=0xFF60
            | 0xFFE0..=0xFFE6
            | 0x20000..=0x3FFFD
    )
}

fn glyph_width(ch: char) -> u16 {
    match ch {
        ' '..='~' => HELVETICA_WIDTHS[ch as usize - 0x20],
        _ if is_wide(ch) => 1000,
        _ => 556,
    }
}

/// Rendered width of `text` at `pt`, in EMU.
fn text_width(text: &str, pt: f64) -> i64 {
    let units: u64 = text.chars().map(|ch| u64::from(glyph_width(ch))).sum();
    (units as f64 / 1000.0 * pt * EMU_PER_PT).ceil() as i64
}

/// A piece that is never split unless it alone is wider than a line.
struct Token {
    text: String,
    space_before: bool,
}

/// Words split on whitespace; every wide character is a token of its own, since those
/// scripts break between any two characters.
fn tokens(paragraph: &str) -> Vec<Token> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut space_before = false;
    for ch in paragraph.chars() {
        if ch.is_whitespace() {
            if !current.is_empty() {
                out.push(Token {
                    text: std::mem::take(&mut current),
                    space_before,
                });
            }
            space_before = true;
        } else if is_wide(ch) {
            if !current.is_empty() {
                out.push(Token {
                    text: std::mem::take(&mut current),
                    space_before,
                });
                space_before = false;
            }
            out.push(Token {
                text: ch.to_string(),
                space_before,
            });
            space_before = false;
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        out.push(Token {
            text: current,
            space_before,
        });
    }
    out
}

/// Greedy wrap to `max_w` EMU at `pt`, keeping explicit line breaks. Tokens wider than a
/// line are split between characters.
fn wrap_text(text: &str, pt: f64, max_w: i64) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for token in tokens(paragraph) {
            let joined = if token.space_before && !line.is_empty() {
                format!("{line} {}", token.text)
            } else {
                format!("{line}{}", token.text)
            };
            if text_width(&joined, pt) <= max_w {
                line = joined;
                continue;
            }
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            for ch in token.text.chars() {
                line.push(ch);
                if text_width(&line, pt) > max_w && line.chars().count() > 1 {
                    line.pop();
                    lines.push(std::mem::replace(&mut line, ch.to_string()));
                }
            }
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}

#[derive(Debug, Clone)]
pub struct SlideDeck {
    size: Size,
    slides: Vec<Slide>,
}

impl Default for SlideDeck {
    fn default() -> Self {
        Self::new()
    }
}

impl SlideDeck {
    pub fn new() -> Self {
        Self {
            size: SLIDE_SIZE,
            slides: Vec::new(),
        }
    }

    pub fn push(&mut self, slide: Slide) {
        self.slides.push(slide);
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    /// Write to a temp file beside `path` and rename it into place.
    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        let io_err = |source: io::Error| ReportError::Io {
            path: path.to_path_buf(),
            source,
        };
        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(io_err)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        self.write_to(io::BufWriter::new(tmp.as_file_mut()))
            .map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|err| io_err(err.error))?;
        Ok(())
    }

    pub fn write_to<W: Write + Seek>(&self, out: W) -> io::Result<()> {
        let mut package = Package::new(out);
        let slide_w = i64::from(self.size.width);

        let mut media = 0usize;
        for (idx, slide) in self.slides.iter().enumerate() {
            let mut shapes = String::new();
            let mut rels = vec![Relationship::layout()];
            let mut next_id = 2u32;

            let title = fit_title(&slide.title, slide_w - TITLE_INSET);
            shapes.push_str(&text_box(
                next_id,
                "Title",
                Placement {
                    x: TITLE_LEFT,
                    y: TITLE_TOP,
                    w: slide_w - TITLE_INSET,
                    h: title.height(),
                },
                &title,
            ));
            next_id += 1;

            let regions = [
                (&slide.original, ORIGINAL_LEFT, ORIGINAL_MAX_W, Align::Left),
                (&slide.crop, slide_w - CROP_RIGHT_MARGIN, CROP_MAX_W, Align::Right),
            ];
            for (image, edge_x, max_w, align) in regions {
                let Some(image) = image else {
                    continue;
                };
                media += 1;
                let target = format!("media/image{media}.{}", image.extension());
                package.part(&format!("ppt/{target}"), image.data())?;
                let rel_id = format!("rId{}", rels.len() + 1);
                rels.push(Relationship::image(&rel_id, &format!("../{target}")));
                shapes.push_str(&picture(
                    next_id,
                    &rel_id,
                    place(image.size(), edge_x, max_w, align),
                ));
                next_id += 1;
            }

            let comment_w = slide_w - COMMENT_INSET;
            let comment = TextBlock {
                pt: COMMENT_PT,
                lines: wrap_text(&slide.comment, COMMENT_PT, comment_w),
            };
            if !comment.lines.is_empty() {
                shapes.push_str(&text_box(
                    next_id,
                    "Comment",
                    Placement {
                        x: COMMENT_LEFT,
                        y: COMMENT_TOP,
                        w: comment_w,
                        h: comment.height(),
                    },
                    &comment,
                ));
            }

            let n = idx + 1;
            package.part(&format!("ppt/slides/slide{n}.xml"), slide_xml(&shapes).as_bytes())?;
            package.part(
                &format!("ppt/slides/_rels/slide{n}.xml.rels"),
                relationships_xml(&rels).as_bytes(),
            )?;
        }

        let count = self.slides.len();
        package.part("[Content_Types].xml", content_types_xml(count).as_bytes())?;
        package.part("_rels/.rels", ROOT_RELS.as_bytes())?;
        package.part("ppt/presentation.xml", presentation_xml(self.size, count).as_bytes())?;
        package.part(
            "ppt/_rels/presentation.xml.rels",
            presentation_rels_xml(count).as_bytes(),
        )?;
        package.part("ppt/slideMasters/slideMaster1.xml", SLIDE_MASTER.as_bytes())?;
        package.part(
            "ppt/slideMasters/_rels/slideMaster1.xml.rels",
            SLIDE_MASTER_RELS.as_bytes(),
        )?;
        package.part("ppt/slideLayouts/slideLayout1.xml", SLIDE_LAYOUT.as_bytes())?;
        package.part(
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
            SLIDE_LAYOUT_RELS.as_bytes(),
        )?;
        package.part("ppt/theme/theme1.xml", THEME.as_bytes())?;
        package.finish()
    }
}

/// Zip container with one deflated entry per package part.
struct Package<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: SimpleFileOptions,
}

impl<W: Write + Seek> Package<W> {
    fn new(out: W) -> Self {
        Self {
            zip: ZipWriter::new(out),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
        }
    }

    fn part(&mut self, name: &str, body: &[u8]) -> io::Result<()> {
        self.zip.start_file(name, self.options)?;
        self.zip.write_all(body)
    }

    fn finish(self) -> io::Result<()> {
        let mut out = self.zip.finish()?;
        out.flush()
    }
}

struct Relationship {
    id: String,
    kind: &'static str,
    target: String,
}

impl Relationship {
    fn layout() -> Self {
        Self {
            id: "rId1".to_string(),
            kind: REL_SLIDE_LAYOUT,
            target: "../slideLayouts/slideLayout1.xml".to_string(),
        }
    }

    fn image(id: &str, target: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: REL_IMAGE,
            target: target.to_string(),
        }
    }
}

const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const NS_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

const REL_SLIDE_LAYOUT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout";
const REL_IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const REL_SLIDE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
const REL_SLIDE_MASTER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster";
const REL_THEME: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme";

const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";

/// Escape for element text and attribute values. Control characters XML 1.0 cannot
/// carry are dropped.
fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' => out.push(ch),
            _ if ch.is_control() => {}
            _ => out.push(ch),
        }
    }
    out
}

fn xfrm(at: Placement) -> String {
    format!(
        "<a:xfrm><a:off x=\"{}\" y=\"{}\"/><a:ext cx=\"{}\" cy=\"{}\"/></a:xfrm>",
        at.x, at.y, at.w, at.h
    )
}

fn text_box(id: u32, name: &str, at: Placement, text: &TextBlock) -> String {
    let size = (text.pt * 100.0).round() as u32;
    let mut paragraphs = String::new();
    for line in &text.lines {
        paragraphs.push_str(&format!(
            "<a:p><a:r><a:rPr lang=\"zh-CN\" altLang=\"en-US\" sz=\"{size}\" dirty=\"0\"/>\
             <a:t>{}</a:t></a:r></a:p>",
            xml_escape(line)
        ));
    }
    if paragraphs.is_empty() {
        paragraphs = format!("<a:p><a:endParaRPr lang=\"zh-CN\" sz=\"{size}\"/></a:p>");
    }
    format!(
        "<p:sp><p:nvSpPr><p:cNvPr id=\"{id}\" name=\"{name}\"/><p:cNvSpPr txBox=\"1\"/><p:nvPr/>\
         </p:nvSpPr><p:spPr>{}<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom><a:noFill/>\
         </p:spPr><p:txBody><a:bodyPr wrap=\"square\" lIns=\"0\" tIns=\"0\" rIns=\"0\" bIns=\"0\" \
         rtlCol=\"0\"><a:noAutofit/></a:bodyPr><a:lstStyle/>{paragraphs}</p:txBody></p:sp>",
        xfrm(at)
    )
}

fn picture(id: u32, rel_id: &str, at: Placement) -> String {
    format!(
        "<p:pic><p:nvPicPr><p:cNvPr id=\"{id}\" name=\"Picture {id}\"/><p:cNvPicPr>\
         <a:picLocks noChangeAspect=\"1\"/></p:cNvPicPr><p:nvPr/></p:nvPicPr><p:blipFill>\
         <a:blip r:embed=\"{rel_id}\"/><a:stretch><a:fillRect/></a:stretch></p:blipFill>\
         <p:spPr>{}<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></p:spPr></p:pic>",
        xfrm(at)
    )
}

const GROUP_PROPS: &str = "<p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/>\
     </p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"0\" cy=\"0\"/>\
     <a:chOff x=\"0\" y=\"0\"/><a:chExt cx=\"0\" cy=\"0\"/></a:xfrm></p:grpSpPr>";

fn slide_xml(shapes: &str) -> String {
    format!(
        "{XML_DECL}<p:sld xmlns:a=\"{NS_A}\" xmlns:r=\"{NS_R}\" xmlns:p=\"{NS_P}\"><p:cSld>\
         <p:spTree>{GROUP_PROPS}{shapes}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/>\
         </p:clrMapOvr></p:sld>"
    )
}

fn relationships_xml(rels: &[Relationship]) -> String {
    let mut out = format!("{XML_DECL}<Relationships xmlns=\"{NS_RELS}\">");
    for rel in rels {
        out.push_str(&format!(
            "<Relationship Id=\"{}\" Type=\"{}\" Target=\"{}\"/>",
            rel.id,
            rel.kind,
            xml_escape(&rel.target)
        ));
    }
    out.push_str("</Relationships>");
    out
}

fn content_types_xml(slides: usize) -> String {
    let mut out = format!(
        "{XML_DECL}<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
         <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
         <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
         <Default Extension=\"jpeg\" ContentType=\"image/jpeg\"/>\
         <Default Extension=\"png\" ContentType=\"image/png\"/>\
         <Override PartName=\"/ppt/presentation.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml\"/>\
         <Override PartName=\"/ppt/slideMasters/slideMaster1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml\"/>\
         <Override PartName=\"/ppt/slideLayouts/slideLayout1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml\"/>\
         <Override PartName=\"/ppt/theme/theme1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.theme+xml\"/>"
    );
    for n in 1..=slides {
        out.push_str(&format!(
            "<Override PartName=\"/ppt/slides/slide{n}.xml\" \
             ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.slide+xml\"/>"
        ));
    }
    out.push_str("</Types>");
    out
}

const ROOT_RELS: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"ppt/presentation.xml\"/>\
</Relationships>";

/// rId1 is the master, rId2 the theme, slides follow from rId3.
fn presentation_xml(size: Size, slides: usize) -> String {
    let mut ids = String::new();
    if slides > 0 {
        ids.push_str("<p:sldIdLst>");
        for n in 0..slides {
            ids.push_str(&format!("<p:sldId id=\"{}\" r:id=\"rId{}\"/>", 256 + n, n + 3));
        }
        ids.push_str("</p:sldIdLst>");
    }
    format!(
        "{XML_DECL}<p:presentation xmlns:a=\"{NS_A}\" xmlns:r=\"{NS_R}\" xmlns:p=\"{NS_P}\" \
         saveSubsetFonts=\"1\"><p:sldMasterIdLst><p:sldMasterId id=\"2147483648\" r:id=\"rId1\"/>\
         </p:sldMasterIdLst>{ids}<p:sldSz cx=\"{}\" cy=\"{}\"/><p:notesSz cx=\"6858000\" \
         cy=\"9144000\"/></p:presentation>",
        size.width, size.height
    )
}

fn presentation_rels_xml(slides: usize) -> String {
    let mut rels = vec![
        Relationship {
            id: "rId1".to_string(),
            kind: REL_SLIDE_MASTER,
            target: "slideMasters/slideMaster1.xml".to_string(),
        },
        Relationship {
            id: "rId2".to_string(),
            kind: REL_THEME,
            target: "theme/theme1.xml".to_string(),
        },
    ];
    for n in 1..=slides {
        rels.push(Relationship {
            id: format!("rId{}", n + 2),
            kind: REL_SLIDE,
            target: format!("slides/slide{n}.xml"),
        });
    }
    relationships_xml(&rels)
}

const SLIDE_MASTER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
<p:sldMaster xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" \
xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\" \
xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\">\
<p:cSld><p:bg><p:bgRef idx=\"1001\"><a:schemeClr val=\"bg1\"/></p:bgRef></p:bg><p:spTree>\
<p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr>\
<a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"0\" cy=\"0\"/><a:chOff x=\"0\" y=\"0\"/>\
<a:chExt cx=\"0\" cy=\"0\"/></a:xfrm></p:grpSpPr></p:spTree></p:cSld>\
<p:clrMap bg1=\"lt1\" tx1=\"dk1\" bg2=\"lt2\" tx2=\"dk2\" accent1=\"accent1\" accent2=\"accent2\" \
accent3=\"accent3\" accent4=\"accent4\" accent5=\"accent5\" accent6=\"accent6\" hlink=\"hlink\" \
folHlink=\"folHlink\"/><p:sldLayoutIdLst><p:sldLayoutId id=\"2147483649\" r:id=\"rId1\"/>\
</p:sldLayoutIdLst></p:sldMaster>";

const SLIDE_MASTER_RELS: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout\" Target=\"../slideLayouts/slideLayout1.xml\"/>\
<Relationship Id=\"rId2\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme\" Target=\"../theme/theme1.xml\"/>\
</Relationships>";

const SLIDE_LAYOUT: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
<p:sldLayout xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" \
xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\" \
xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\" type=\"blank\" preserve=\"1\">\
<p:cSld name=\"Blank\"><p:spTree><p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/>\
</p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"0\" cy=\"0\"/>\
<a:chOff x=\"0\" y=\"0\"/><a:chExt cx=\"0\" cy=\"0\"/></a:xfrm></p:grpSpPr></p:spTree></p:cSld>\
<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>";

const SLIDE_LAYOUT_RELS: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster\" Target=\"../slideMasters/slideMaster1.xml\"/>\
</Relationships>";

/// Office-style theme: Arial for Latin text, Microsoft YaHei for East Asian text.
const THEME: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
<a:theme xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" name=\"Report\">\
<a:themeElements><a:clrScheme name=\"Report\">\
<a:dk1><a:sysClr val=\"windowText\" lastClr=\"000000\"/></a:dk1>\
<a:lt1><a:sysClr val=\"window\" lastClr=\"FFFFFF\"/></a:lt1>\
<a:dk2><a:srgbClr val=\"44546A\"/></a:dk2><a:lt2><a:srgbClr val=\"E7E6E6\"/></a:lt2>\
<a:accent1><a:srgbClr val=\"4472C4\"/></a:accent1><a:accent2><a:srgbClr val=\"ED7D31\"/></a:accent2>\
<a:accent3><a:srgbClr val=\"A5A5A5\"/></a:accent3><a:accent4><a:srgbClr val=\"FFC000\"/></a:accent4>\
<a:accent5><a:srgbClr val=\"5B9BD5\"/></a:accent5><a:accent6><a:srgbClr val=\"70AD47\"/></a:accent6>\
<a:hlink><a:srgbClr val=\"0563C1\"/></a:hlink><a:folHlink><a:srgbClr val=\"954F72\"/></a:folHlink>\
</a:clrScheme><a:fontScheme name=\"Report\">\
<a:majorFont><a:latin typeface=\"Arial\"/><a:ea typeface=\"Microsoft YaHei\"/><a:cs typeface=\"\"/></a:majorFont>\
<a:minorFont><a:latin typeface=\"Arial\"/><a:ea typeface=\"Microsoft YaHei\"/><a:cs typeface=\"\"/></a:minorFont>\
</a:fontScheme><a:fmtScheme name=\"Report\"><a:fillStyleLst>\
<a:solidFill><a:schemeClr val=\"phClr\"/></a:solidFill>\
<a:solidFill><a:schemeClr val=\"phClr\"/></a:solidFill>\
<a:solidFill><a:schemeClr val=\"phClr\"/></a:solidFill></a:fillStyleLst><a:lnStyleLst>\
<a:ln w=\"6350\"><a:solidFill><a:schemeClr val=\"phClr\"/></a:solidFill></a:ln>\
<a:ln w=\"12700\"><a:solidFill><a:schemeClr val=\"phClr\"/></a:solidFill></a:ln>\
<a:ln w=\"19050\"><a:solidFill><a:schemeClr val=\"phClr\"/></a:solidFill></a:ln></a:lnStyleLst>\
<a:effectStyleLst><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/>\
</a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle></a:effectStyleLst><a:bgFillStyleLst>\
<a:solidFill><a:schemeClr val=\"phClr\"/></a:solidFill>\
<a:solidFill><a:schemeClr val=\"phClr\"/></a:solidFill>\
<a:solidFill><a:schemeClr val=\"phClr\"/></a:solidFill></a:bgFillStyleLst></a:fmtScheme>\
</a:themeElements></a:theme>";

/// Reading side used by tests across the crate.
#[cfg(test)]
pub(crate) mod testing {
    use std::io::{Cursor, Read};
    use std::path::Path;

    use zip::ZipArchive;

    pub(crate) struct SavedDeck(ZipArchive<Cursor<Vec<u8>>>);

    impl SavedDeck {
        pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
            SavedDeck(ZipArchive::new(Cursor::new(bytes)).unwrap())
        }

        pub(crate) fn open(path: &Path) -> Self {
            Self::from_bytes(std::fs::read(path).unwrap())
        }

        pub(crate) fn has_part(&self, name: &str) -> bool {
            self.0.file_names().any(|n| n == name)
        }

        pub(crate) fn part(&mut self, name: &str) -> Vec<u8> {
            let mut data = Vec::new();
            self.0.by_name(name).unwrap().read_to_end(&mut data).unwrap();
            data
        }

        pub(crate) fn xml(&mut self, name: &str) -> String {
            String::from_utf8(self.part(name)).unwrap()
        }

        pub(crate) fn slide_count(&self) -> usize {
            self.0
                .file_names()
                .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
                .count()
        }

        /// Unescaped `<a:t>` runs of slide `n` (1-based), in document order.
        pub(crate) fn slide_text(&mut self, n: usize) -> Vec<String> {
            let xml = self.xml(&format!("ppt/slides/slide{n}.xml"));
            xml.split("<a:t>")
                .skip(1)
                .filter_map(|rest| rest.split("</a:t>").next())
                .map(|run| {
                    run.replace("&lt;", "<")
                        .replace("&gt;", ">")
                        .replace("&quot;", "\"")
                        .replace("&apos;", "'")
                        .replace("&amp;", "&")
                })
                .collect()
        }

        pub(crate) fn media(&self) -> Vec<String> {
            let mut names: Vec<String> = self
                .0
                .file_names()
                .filter(|n| n.starts_with("ppt/media/"))
                .map(str::to_string)
                .collect();
            names.sort();
            names
        }
    }
}

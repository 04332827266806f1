//! Places a [`Document`] on an A4 page as a flat list of primitives.
//!
//! All coordinates are millimetres from the top-left page corner. The
//! rasterizer scales them to pixels; the PDF overlay converts them to points.

use log::warn;
use serde::Serialize;

use crate::document::{
    palette, BodyContent, BuiltinLogo, Document, ImageSource, LogoSlot, PhotoSlot, Rgb, TextSlot,
};
use crate::fonts::{FontStyle, TextMeasure, PT_TO_MM};

pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;

pub const HEADER_HEIGHT: f32 = 42.3;
pub const BANNER_HEIGHT: f32 = 59.3;
pub const FOOTER_HEIGHT: f32 = 11.6;

pub const LOGO_SIZE: f32 = 29.6;
pub const LOGO_MARGIN: f32 = 8.5;
pub const LOGO_GAP: f32 = 4.2;

pub const PHOTO_WIDTH: f32 = 37.0;
pub const PHOTO_HEIGHT: f32 = 42.3;
const PHOTO_LEFT: f32 = 12.7;
const PHOTO_BORDER: f32 = 1.1;
const ACCENT_WIDTH: f32 = 1.6;

const BODY_PADDING: f32 = 12.7;
const LINE_SPACING: f32 = 1.45;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Rect { x, y, w, h }
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    pub fn inset(&self, by: f32) -> Rect {
        Rect::new(self.x + by, self.y + by, self.w - 2.0 * by, self.h - 2.0 * by)
    }

    pub fn outset(&self, by: f32) -> Rect {
        self.inset(-by)
    }
}

/// How an image fills its box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Fit {
    /// Whole image visible, letterboxed
    Contain,
    /// Box fully covered, overflow cropped
    Cover,
}

/// One line of text, already wrapped and positioned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub baseline: f32,
    pub size_pt: f32,
    pub style: FontStyle,
    pub color: Rgb,
    /// Glyphs outside this box are not painted
    pub clip: Rect,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Primitive {
    Fill { rect: Rect, color: Rgb },
    Frame { rect: Rect, color: Rgb, width: f32 },
    DashedFrame { rect: Rect, color: Rgb, width: f32, dash: f32 },
    Image { rect: Rect, source: ImageSource, fit: Fit },
    Silhouette { rect: Rect, background: Rgb, color: Rgb },
    Emblem { rect: Rect, logo: BuiltinLogo },
    DocumentIcon { rect: Rect, color: Rgb },
    Text(TextRun),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    pub width: f32,
    pub height: f32,
    pub primitives: Vec<Primitive>,
    /// Wrapped lines that did not fit their band and were left out.
    pub dropped_lines: usize,
}

impl Scene {
    pub fn text_runs(&self) -> impl Iterator<Item = &TextRun> {
        self.primitives.iter().filter_map(|p| match p {
            Primitive::Text(run) => Some(run),
            _ => None,
        })
    }
}

/// Band boxes in page order: header, banner, body, footer.
pub fn bands() -> [Rect; 4] {
    let body_top = HEADER_HEIGHT + BANNER_HEIGHT;
    let footer_top = PAGE_HEIGHT_MM - FOOTER_HEIGHT;
    [
        Rect::new(0.0, 0.0, PAGE_WIDTH_MM, HEADER_HEIGHT),
        Rect::new(0.0, HEADER_HEIGHT, PAGE_WIDTH_MM, BANNER_HEIGHT),
        Rect::new(0.0, body_top, PAGE_WIDTH_MM, footer_top - body_top),
        Rect::new(0.0, footer_top, PAGE_WIDTH_MM, FOOTER_HEIGHT),
    ]
}

/// Greedy word wrap. Explicit line breaks are kept, blank lines included.
/// A single word wider than `max_width` is broken between characters.
pub fn wrap_text(
    text: &str,
    measure: &dyn TextMeasure,
    style: FontStyle,
    size_pt: f32,
    max_width: f32,
) -> Vec<String> {
    let fits = |s: &str| measure.width_mm(s, style, size_pt) <= max_width;
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };
            if fits(&candidate) {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if fits(word) {
                current = word.to_string();
                continue;
            }
            for c in word.chars() {
                current.push(c);
                if !fits(&current) && current.chars().count() > 1 {
                    current.pop();
                    lines.push(std::mem::take(&mut current));
                    current.push(c);
                }
            }
        }
        lines.push(current);
    }
    lines
}

struct Builder<'a> {
    measure: &'a dyn TextMeasure,
    primitives: Vec<Primitive>,
    dropped: usize,
}

impl<'a> Builder<'a> {
    fn push(&mut self, primitive: Primitive) {
        self.primitives.push(primitive);
    }

    fn fill(&mut self, rect: Rect, color: Rgb) {
        self.push(Primitive::Fill { rect, color });
    }

    fn drop_lines(&mut self, what: &str, count: usize) {
        if count > 0 {
            warn!("{} line(s) of the {} do not fit on the page and were left out", count, what);
            self.dropped += count;
        }
    }

    fn line_height(size_pt: f32) -> f32 {
        size_pt * PT_TO_MM * LINE_SPACING
    }

    /// Adds one line with its top at `top`. Returns the y below it.
    #[allow(clippy::too_many_arguments)]
    fn text_line(
        &mut self,
        text: &str,
        x: f32,
        top: f32,
        size_pt: f32,
        style: FontStyle,
        color: Rgb,
        clip: Rect,
    ) -> f32 {
        let line_height = Self::line_height(size_pt);
        if !text.is_empty() {
            let size_mm = size_pt * PT_TO_MM;
            self.push(Primitive::Text(TextRun {
                text: text.to_string(),
                x,
                baseline: top + (line_height - size_mm) / 2.0 + size_mm * 0.8,
                size_pt,
                style,
                color,
                clip,
            }));
        }
        top + line_height
    }

    /// Horizontally centered within `area`.
    #[allow(clippy::too_many_arguments)]
    fn centered_line(
        &mut self,
        text: &str,
        area: Rect,
        top: f32,
        size_pt: f32,
        style: FontStyle,
        color: Rgb,
        clip: Rect,
    ) -> f32 {
        let width = self.measure.width_mm(text, style, size_pt);
        let x = area.x + ((area.w - width) / 2.0).max(0.0);
        self.text_line(text, x, top, size_pt, style, color, clip)
    }

    fn logo(&mut self, slot: &LogoSlot, rect: Rect) {
        match &slot.source {
            ImageSource::Builtin(logo) => self.push(Primitive::Emblem { rect, logo: *logo }),
            source => self.push(Primitive::Image {
                rect,
                source: source.clone(),
                fit: Fit::Contain,
            }),
        }
    }

    fn header(&mut self, doc: &Document, band: Rect) {
        self.fill(band, palette::WHITE);
        self.fill(Rect::new(0.0, band.bottom() - 0.4, band.w, 0.4), palette::HEADER_RULE);

        let logo_top = band.y + (band.h - LOGO_SIZE) / 2.0;
        let mut x = LOGO_MARGIN;
        for slot in &doc.header.left_logos {
            self.logo(slot, Rect::new(x, logo_top, LOGO_SIZE, LOGO_SIZE));
            x += LOGO_SIZE + LOGO_GAP;
        }
        let right_x = band.right() - LOGO_MARGIN - LOGO_SIZE;
        self.logo(&doc.header.right_logo, Rect::new(right_x, logo_top, LOGO_SIZE, LOGO_SIZE));

        let text_area = Rect::new(x, band.y, right_x - LOGO_GAP - x, band.h);
        let title_size = 15.0;
        let address_size = 9.0;
        let title_lines = doc
            .header
            .title
            .as_deref()
            .map(|t| wrap_text(t, self.measure, FontStyle::Bold, title_size, text_area.w))
            .unwrap_or_default();
        let address_lines = doc
            .header
            .address
            .as_deref()
            .map(|a| wrap_text(a, self.measure, FontStyle::Regular, address_size, text_area.w))
            .unwrap_or_default();

        let total = title_lines.len() as f32 * Self::line_height(title_size)
            + address_lines.len() as f32 * Self::line_height(address_size);
        let mut y = band.y + ((band.h - total) / 2.0).max(1.0);
        for line in &title_lines {
            y = self.centered_line(
                line,
                text_area,
                y,
                title_size,
                FontStyle::Bold,
                palette::NAVY,
                band,
            );
        }
        for line in &address_lines {
            y = self.centered_line(
                line,
                text_area,
                y,
                address_size,
                FontStyle::Regular,
                palette::BODY_TEXT,
                band,
            );
        }
    }

    fn slot_color(slot: &TextSlot, color: Rgb) -> Rgb {
        if slot.placeholder {
            palette::PLACEHOLDER
        } else {
            color
        }
    }

    fn banner(&mut self, doc: &Document, band: Rect) {
        self.fill(band, palette::NAVY);

        let photo = Rect::new(
            PHOTO_LEFT,
            band.y + (band.h - PHOTO_HEIGHT) / 2.0,
            PHOTO_WIDTH,
            PHOTO_HEIGHT,
        );
        self.fill(photo.outset(PHOTO_BORDER), palette::WHITE);
        match &doc.banner.photo {
            PhotoSlot::Image(image) => self.push(Primitive::Image {
                rect: photo,
                source: ImageSource::Inline(image.clone()),
                fit: Fit::Cover,
            }),
            PhotoSlot::Silhouette => self.push(Primitive::Silhouette {
                rect: photo,
                background: palette::PHOTO_BACKGROUND,
                color: palette::PLACEHOLDER,
            }),
        }

        let accent_x = photo.right() + PHOTO_BORDER + 7.4;
        let accent = Rect::new(accent_x, photo.y + 6.0, ACCENT_WIDTH, photo.h - 12.0);
        self.fill(accent, palette::ACCENT);

        let text_x = accent.right() + 5.0;
        let text_area = Rect::new(text_x, band.y, band.right() - text_x - BODY_PADDING, band.h);
        let name_size = 20.0;
        let designation_size = 12.0;

        let mut name_lines = wrap_text(
            &doc.banner.rank_name.text,
            self.measure,
            FontStyle::Bold,
            name_size,
            text_area.w,
        );
        self.drop_lines("rank and name", name_lines.len().saturating_sub(2));
        name_lines.truncate(2);
        let mut designation_lines = wrap_text(
            &doc.banner.designation.text,
            self.measure,
            FontStyle::Regular,
            designation_size,
            text_area.w,
        );
        self.drop_lines("designation", designation_lines.len().saturating_sub(2));
        designation_lines.truncate(2);

        let total = name_lines.len() as f32 * Self::line_height(name_size)
            + designation_lines.len() as f32 * Self::line_height(designation_size);
        let mut y = band.y + (band.h - total) / 2.0;
        let name_color = Self::slot_color(&doc.banner.rank_name, palette::WHITE);
        for line in &name_lines {
            y = self.text_line(line, text_x, y, name_size, FontStyle::Bold, name_color, text_area);
        }
        let designation_color = Self::slot_color(&doc.banner.designation, palette::DESIGNATION);
        for line in &designation_lines {
            y = self.text_line(
                line,
                text_x,
                y,
                designation_size,
                FontStyle::Regular,
                designation_color,
                text_area,
            );
        }
    }

    fn body(&mut self, doc: &Document, band: Rect) {
        self.fill(band, palette::BODY_BACKGROUND);
        let content = band.inset(BODY_PADDING);

        let heading_size = 18.0;
        let icon_size = heading_size * PT_TO_MM * 1.2;
        let icon = Rect::new(content.x, content.y, icon_size * 0.8, icon_size);
        self.push(Primitive::DocumentIcon {
            rect: icon,
            color: palette::ICON,
        });
        let heading_x = icon.right() + 3.0;
        let mut y = self.text_line(
            &doc.body.heading,
            heading_x,
            content.y,
            heading_size,
            FontStyle::Bold,
            palette::NAVY,
            band,
        );
        y = self.text_line(
            &doc.body.subtitle,
            heading_x,
            y,
            10.0,
            FontStyle::Italic,
            palette::SUBTITLE,
            band,
        );
        y += 2.0;
        self.fill(Rect::new(content.x, y, content.w, 0.5), palette::RULE);
        y += 5.0;

        let text_size = 11.0;
        let text_clip = Rect::new(content.x, y, content.w, content.bottom() - y);
        match &doc.body.content {
            BodyContent::Text(text) => {
                let lines = wrap_text(text, self.measure, FontStyle::Regular, text_size, content.w);
                let room = (content.bottom() - y) / Self::line_height(text_size);
                let room = room.max(0.0) as usize;
                self.drop_lines("job functions", lines.len().saturating_sub(room));
                for line in lines.iter().take(room) {
                    y = self.text_line(
                        line,
                        content.x,
                        y,
                        text_size,
                        FontStyle::Regular,
                        palette::BODY_TEXT,
                        text_clip,
                    );
                }
            }
            BodyContent::Placeholder(text) => {
                let boxed = Rect::new(content.x, y, content.w, 40.0);
                self.push(Primitive::DashedFrame {
                    rect: boxed,
                    color: palette::RULE,
                    width: 0.5,
                    dash: 2.5,
                });
                let icon_h = 9.0;
                let block = icon_h + 2.5 + Self::line_height(text_size);
                let icon_top = boxed.y + (boxed.h - block) / 2.0;
                let icon_w = icon_h * 0.8;
                let icon_x = boxed.x + (boxed.w - icon_w) / 2.0;
                self.push(Primitive::DocumentIcon {
                    rect: Rect::new(icon_x, icon_top, icon_w, icon_h),
                    color: palette::PLACEHOLDER,
                });
                let top = icon_top + icon_h + 2.5;
                self.centered_line(
                    text,
                    boxed,
                    top,
                    text_size,
                    FontStyle::Italic,
                    palette::PLACEHOLDER,
                    boxed,
                );
            }
        }
    }

    fn footer(&mut self, doc: &Document, band: Rect) {
        self.fill(band, palette::NAVY);
        self.fill(Rect::new(band.x, band.y, band.w, 0.8), palette::ACCENT);
        let size = 10.0;
        let top = band.y + 0.8 + (band.h - 0.8 - Self::line_height(size)) / 2.0;
        self.centered_line(
            &doc.footer.tagline,
            band,
            top,
            size,
            FontStyle::Italic,
            palette::ACCENT,
            band,
        );
    }
}

/// Lays out the four bands of `doc` on one A4 page.
pub fn layout(doc: &Document, measure: &dyn TextMeasure) -> Scene {
    let [header, banner, body, footer] = bands();
    let mut builder = Builder {
        measure,
        primitives: Vec::new(),
        dropped: 0,
    };
    builder.header(doc, header);
    builder.banner(doc, banner);
    builder.body(doc, body);
    builder.footer(doc, footer);

    Scene {
        width: PAGE_WIDTH_MM,
        height: PAGE_HEIGHT_MM,
        primitives: builder.primitives,
        dropped_lines: builder.dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, FOOTER_TAGLINE, RANK_NAME_PLACEHOLDER};
    use crate::fonts::ApproxMeasure;
    use crate::model::{Field, ImageRef, RegionalRecord, UnitRecord};

    fn inline(tag: &str) -> ImageRef {
        ImageRef::from_data_uri(format!("data:image/png;base64,{}", tag)).unwrap()
    }

    #[test]
    fn test_bands_tile_the_page() {
        let b = bands();
        assert_eq!(b[0].y, 0.0);
        for pair in b.windows(2) {
            assert!((pair[0].bottom() - pair[1].y).abs() < 1e-4);
        }
        assert!((b[3].bottom() - PAGE_HEIGHT_MM).abs() < 1e-4);
        assert!(b[2].h > 150.0);
    }

    #[test]
    fn test_wrap_keeps_line_breaks_and_blank_lines() {
        let lines = wrap_text("• one\n\n• two", &ApproxMeasure, FontStyle::Regular, 11.0, 180.0);
        assert_eq!(lines, vec!["• one", "", "• two"]);
    }

    #[test]
    fn test_wrap_breaks_long_paragraphs_within_width() {
        let text = "Supervises the daily custodial operations of the facility and \
                    coordinates with regional command on inmate welfare programs";
        let lines = wrap_text(text, &ApproxMeasure, FontStyle::Regular, 11.0, 60.0);
        assert!(lines.len() > 2);
        for line in &lines {
            assert!(ApproxMeasure.width_mm(line, FontStyle::Regular, 11.0) <= 60.0);
        }
        assert_eq!(lines.join(" "), text.split_whitespace().collect::<Vec<_>>().join(" "));
    }

    #[test]
    fn test_wrap_splits_overlong_word() {
        let word = "X".repeat(80);
        let lines = wrap_text(&word, &ApproxMeasure, FontStyle::Regular, 11.0, 30.0);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), word);
    }

    #[test]
    fn test_empty_document_layout() {
        let doc = Document::from_regional(&RegionalRecord::default());
        let scene = layout(&doc, &ApproxMeasure);
        let emblems = scene
            .primitives
            .iter()
            .filter(|p| matches!(p, Primitive::Emblem { .. }))
            .count();
        assert_eq!(emblems, 2);
        assert!(scene
            .primitives
            .iter()
            .any(|p| matches!(p, Primitive::Silhouette { .. })));
        assert!(scene
            .primitives
            .iter()
            .any(|p| matches!(p, Primitive::DashedFrame { .. })));
        let texts: Vec<_> = scene.text_runs().map(|r| r.text.as_str()).collect();
        assert!(texts.contains(&RANK_NAME_PLACEHOLDER));
        assert!(texts.contains(&"JOB DESCRIPTION"));
        assert!(texts.contains(&FOOTER_TAGLINE));

        let frame = scene
            .primitives
            .iter()
            .find_map(|p| match p {
                Primitive::DashedFrame { rect, .. } => Some(*rect),
                _ => None,
            })
            .unwrap();
        let icons: Vec<Rect> = scene
            .primitives
            .iter()
            .filter_map(|p| match p {
                Primitive::DocumentIcon { rect, .. } => Some(*rect),
                _ => None,
            })
            .collect();
        assert_eq!(icons.len(), 2);
        let boxed_icon = icons[1];
        assert!(boxed_icon.y > frame.y && boxed_icon.bottom() < frame.bottom());
        let centre = boxed_icon.x + boxed_icon.w / 2.0;
        assert!((centre - (frame.x + frame.w / 2.0)).abs() < 0.01);
        let placeholder = scene.text_runs().find(|r| r.clip == frame).unwrap();
        assert!(placeholder.baseline > boxed_icon.bottom());
        assert_eq!(scene.dropped_lines, 0);
    }

    #[test]
    fn test_logo_positions() {
        let mut unit = UnitRecord::default();
        unit.set(Field::UnitLogo, inline("VU5J").into()).unwrap();
        let scene = layout(&Document::from_unit(&unit), &ApproxMeasure);
        let logo_rects: Vec<Rect> = scene
            .primitives
            .iter()
            .filter_map(|p| match p {
                Primitive::Emblem { rect, .. } => Some(*rect),
                Primitive::Image { rect, fit: Fit::Contain, .. } => Some(*rect),
                _ => None,
            })
            .collect();
        assert_eq!(logo_rects.len(), 3);
        assert!((logo_rects[0].x - LOGO_MARGIN).abs() < 1e-4);
        assert!((logo_rects[1].x - (LOGO_MARGIN + LOGO_SIZE + LOGO_GAP)).abs() < 1e-4);
        assert!((logo_rects[2].right() - (PAGE_WIDTH_MM - LOGO_MARGIN)).abs() < 1e-4);
        assert!(logo_rects.iter().all(|r| (r.h - LOGO_SIZE).abs() < 1e-4));
    }

    #[test]
    fn test_photo_uses_cover_fit() {
        let mut rec = RegionalRecord::default();
        rec.set(Field::Photo, inline("UEhP").into()).unwrap();
        let scene = layout(&Document::from_regional(&rec), &ApproxMeasure);
        let photo = scene.primitives.iter().find_map(|p| match p {
            Primitive::Image { rect, fit: Fit::Cover, .. } => Some(*rect),
            _ => None,
        });
        let photo = photo.unwrap();
        assert!((photo.w - PHOTO_WIDTH).abs() < 1e-4);
        assert!((photo.h - PHOTO_HEIGHT).abs() < 1e-4);
        assert!(photo.y > HEADER_HEIGHT && photo.bottom() < HEADER_HEIGHT + BANNER_HEIGHT);
    }

    #[test]
    fn test_long_body_is_clipped_to_band() {
        let mut rec = RegionalRecord::default();
        let long = (0..200).map(|i| format!("• duty number {}", i)).collect::<Vec<_>>().join("\n");
        rec.set(Field::JobFunctions, long.into()).unwrap();
        let scene = layout(&Document::from_regional(&rec), &ApproxMeasure);
        let body = bands()[2];
        let body_runs: Vec<_> = scene
            .text_runs()
            .filter(|r| r.text.starts_with("• duty"))
            .collect();
        assert!(!body_runs.is_empty() && body_runs.len() < 200);
        assert!(body_runs.iter().all(|r| r.baseline < body.bottom()));
        assert_eq!(scene.dropped_lines, 200 - body_runs.len());
    }

    #[test]
    fn test_text_runs_stay_inside_their_clip() {
        let mut unit = UnitRecord::default();
        unit.set(Field::JailUnit, "Manila City Jail".into()).unwrap();
        unit.set(Field::Address, "123 Street, Manila City".into()).unwrap();
        let scene = layout(&Document::from_unit(&unit), &ApproxMeasure);
        for run in scene.text_runs() {
            assert!(run.baseline > run.clip.y && run.baseline <= run.clip.bottom(), "{:?}", run);
        }
    }
}

use std::collections::HashMap;
use std::f32::consts::PI;

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage, RgbaImage};
use log::debug;
use rusttype::{point, Scale};

use crate::config::LogoSettings;
use crate::document::{palette, BuiltinLogo, ImageSource, Rgb};
use crate::fonts::{FontSet, PT_TO_MM};
use crate::images::{decode_data_uri, ImageLoader};
use crate::layout::{Fit, Primitive, Rect, Scene, TextRun};
use crate::model::ImageRef;
use crate::pdf::ExportError;

/// CSS reference resolution.
pub const CSS_DPI: f32 = 96.0;

/// Largest bitmap `rasterize` allocates, in bytes.
pub const MAX_RASTER_BYTES: u64 = 256 * 1024 * 1024;

/// The painted page.
pub struct Raster {
    pub image: RgbImage,
    pub scale: f32,
    pub px_per_mm: f32,
    /// Text that could not be painted because no font was available
    pub pending_text: Vec<TextRun>,
}

/// Decoded images for one export, keyed by source.
#[derive(Default)]
pub struct ImageResolver {
    inline: HashMap<String, DynamicImage>,
    builtin: HashMap<BuiltinLogo, DynamicImage>,
}

fn decode_inline(image: &ImageRef) -> Result<DynamicImage, ExportError> {
    let bytes = decode_data_uri(image).map_err(|e| ExportError::Image(e.to_string()))?;
    image::load_from_memory(&bytes).map_err(|e| {
        ExportError::Image(format!("{} image could not be decoded: {}", image.mime_type(), e))
    })
}

impl ImageResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes every image the scene paints. Configured logo overrides are
    /// loaded through `loader`; any failure aborts.
    pub fn prepare(
        scene: &Scene,
        logos: &LogoSettings,
        loader: &mut ImageLoader,
    ) -> Result<Self, ExportError> {
        let mut resolver = ImageResolver::new();
        for primitive in &scene.primitives {
            match primitive {
                Primitive::Image {
                    source: ImageSource::Inline(image),
                    ..
                } => resolver.insert_inline(image)?,
                Primitive::Image {
                    source: ImageSource::Builtin(logo),
                    ..
                }
                | Primitive::Emblem { logo, .. } => {
                    let entry = match logo {
                        BuiltinLogo::Organization => logos.organization.as_deref(),
                        BuiltinLogo::Government => logos.government.as_deref(),
                    };
                    if let (Some(entry), false) = (entry, resolver.builtin.contains_key(logo)) {
                        let data = loader.load(entry)?;
                        let decoded = image::load_from_memory(&data.bytes).map_err(|e| {
                            ExportError::Image(format!("{} could not be decoded: {}", entry, e))
                        })?;
                        resolver.builtin.insert(*logo, decoded);
                    }
                }
                _ => {}
            }
        }
        Ok(resolver)
    }

    pub fn insert_inline(&mut self, image: &ImageRef) -> Result<(), ExportError> {
        if !self.inline.contains_key(image.as_str()) {
            let decoded = decode_inline(image)?;
            self.inline.insert(image.as_str().to_string(), decoded);
        }
        Ok(())
    }

    fn inline(&self, image: &ImageRef) -> Option<&DynamicImage> {
        self.inline.get(image.as_str())
    }

    fn builtin(&self, logo: BuiltinLogo) -> Option<&DynamicImage> {
        self.builtin.get(&logo)
    }
}

/// Pixel box, clamped to the canvas.
#[derive(Debug, Clone, Copy)]
struct PxRect {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl PxRect {
    fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x0 as i64 && x < self.x1 as i64 && y >= self.y0 as i64 && y < self.y1 as i64
    }
}

struct Canvas<'a> {
    image: RgbImage,
    k: f32,
    resolver: &'a ImageResolver,
}

fn mix(dst: u8, src: u8, alpha: f32) -> u8 {
    (dst as f32 + (src as f32 - dst as f32) * alpha).round().clamp(0.0, 255.0) as u8
}

fn circle_coverage(distance: f32, radius: f32) -> f32 {
    (radius - distance + 0.5).clamp(0.0, 1.0)
}

fn point_in_polygon(points: &[(f32, f32)], x: f32, y: f32) -> bool {
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let (xi, yi) = points[i];
        let (xj, yj) = points[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn star_points(cx: f32, cy: f32, outer: f32, inner: f32) -> Vec<(f32, f32)> {
    (0..10)
        .map(|i| {
            let r = if i % 2 == 0 { outer } else { inner };
            let angle = -PI / 2.0 + i as f32 * PI / 5.0;
            (cx + r * angle.cos(), cy + r * angle.sin())
        })
        .collect()
}

impl<'a> Canvas<'a> {
    fn px_rect(&self, rect: Rect) -> PxRect {
        let (w, h) = self.image.dimensions();
        let clamp_x = |v: f32| (v * self.k).round().clamp(0.0, w as f32) as u32;
        let clamp_y = |v: f32| (v * self.k).round().clamp(0.0, h as f32) as u32;
        PxRect {
            x0: clamp_x(rect.x),
            y0: clamp_y(rect.y),
            x1: clamp_x(rect.right()),
            y1: clamp_y(rect.bottom()),
        }
    }

    fn blend(&mut self, x: u32, y: u32, color: Rgb, alpha: f32) {
        if alpha <= 0.0 || x >= self.image.width() || y >= self.image.height() {
            return;
        }
        let px = self.image.get_pixel_mut(x, y);
        px.0 = [
            mix(px.0[0], color.0, alpha),
            mix(px.0[1], color.1, alpha),
            mix(px.0[2], color.2, alpha),
        ];
    }

    fn fill(&mut self, rect: Rect, color: Rgb) {
        let r = self.px_rect(rect);
        for y in r.y0..r.y1 {
            for x in r.x0..r.x1 {
                self.image.put_pixel(x, y, image::Rgb([color.0, color.1, color.2]));
            }
        }
    }

    fn frame(&mut self, rect: Rect, color: Rgb, width: f32) {
        self.fill(Rect::new(rect.x, rect.y, rect.w, width), color);
        self.fill(Rect::new(rect.x, rect.bottom() - width, rect.w, width), color);
        self.fill(Rect::new(rect.x, rect.y, width, rect.h), color);
        self.fill(Rect::new(rect.right() - width, rect.y, width, rect.h), color);
    }

    fn dashed_frame(&mut self, rect: Rect, color: Rgb, width: f32, dash: f32) {
        let dash = dash.max(0.25);
        let step = dash * 2.0;
        let mut x = rect.x;
        while x < rect.right() {
            let len = dash.min(rect.right() - x);
            self.fill(Rect::new(x, rect.y, len, width), color);
            self.fill(Rect::new(x, rect.bottom() - width, len, width), color);
            x += step;
        }
        let mut y = rect.y;
        while y < rect.bottom() {
            let len = dash.min(rect.bottom() - y);
            self.fill(Rect::new(rect.x, y, width, len), color);
            self.fill(Rect::new(rect.right() - width, y, width, len), color);
            y += step;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn blit_rgba(
        &mut self,
        src: &RgbaImage,
        x0: u32,
        y0: u32,
        crop_x: u32,
        crop_y: u32,
        w: u32,
        h: u32,
    ) {
        for dy in 0..h {
            for dx in 0..w {
                let p = src.get_pixel(crop_x + dx, crop_y + dy);
                let alpha = p.0[3] as f32 / 255.0;
                self.blend(x0 + dx, y0 + dy, Rgb(p.0[0], p.0[1], p.0[2]), alpha);
            }
        }
    }

    fn draw_image(&mut self, rect: Rect, img: &DynamicImage, fit: Fit) {
        let target = self.px_rect(rect);
        let (tw, th) = (target.width(), target.height());
        let (sw, sh) = (img.width().max(1) as f32, img.height().max(1) as f32);
        if tw == 0 || th == 0 {
            return;
        }
        let factor = match fit {
            Fit::Contain => (tw as f32 / sw).min(th as f32 / sh),
            Fit::Cover => (tw as f32 / sw).max(th as f32 / sh),
        };
        let dw = ((sw * factor).round() as u32).max(1);
        let dh = ((sh * factor).round() as u32).max(1);
        let resized = imageops::resize(&img.to_rgba8(), dw, dh, FilterType::Triangle);

        match fit {
            Fit::Contain => {
                let x0 = target.x0 + tw.saturating_sub(dw) / 2;
                let y0 = target.y0 + th.saturating_sub(dh) / 2;
                self.blit_rgba(&resized, x0, y0, 0, 0, dw.min(tw), dh.min(th));
            }
            Fit::Cover => {
                let crop_x = dw.saturating_sub(tw) / 2;
                let crop_y = dh.saturating_sub(th) / 2;
                self.blit_rgba(
                    &resized,
                    target.x0,
                    target.y0,
                    crop_x,
                    crop_y,
                    tw.min(dw),
                    th.min(dh),
                );
            }
        }
    }

    /// Head and shoulders over a flat background.
    fn silhouette(&mut self, rect: Rect, background: Rgb, color: Rgb) {
        self.fill(rect, background);
        let r = self.px_rect(rect);
        let (w, h) = (r.width() as f32, r.height() as f32);
        let cx = r.x0 as f32 + w / 2.0;
        let head_cy = r.y0 as f32 + h * 0.38;
        let head_r = w * 0.2;
        let body_cy = r.y0 as f32 + h * 1.0;
        let (body_rx, body_ry) = (w * 0.4, h * 0.36);

        for y in r.y0..r.y1 {
            for x in r.x0..r.x1 {
                let (fx, fy) = (x as f32 + 0.5, y as f32 + 0.5);
                let head_d = ((fx - cx).powi(2) + (fy - head_cy).powi(2)).sqrt();
                let head = circle_coverage(head_d, head_r);
                let nx = (fx - cx) / body_rx;
                let ny = (fy - body_cy) / body_ry;
                let body = if nx * nx + ny * ny <= 1.0 { 1.0 } else { 0.0 };
                self.blend(x, y, color, head.max(body));
            }
        }
    }

    fn emblem(&mut self, rect: Rect, logo: BuiltinLogo) {
        let resolver = self.resolver;
        if let Some(img) = resolver.builtin(logo) {
            self.draw_image(rect, img, Fit::Contain);
            return;
        }

        let r = self.px_rect(rect);
        let radius = r.width().min(r.height()) as f32 / 2.0;
        let cx = r.x0 as f32 + r.width() as f32 / 2.0;
        let cy = r.y0 as f32 + r.height() as f32 / 2.0;
        let star = star_points(cx, cy, radius * 0.5, radius * 0.2);

        for y in r.y0..r.y1 {
            for x in r.x0..r.x1 {
                let (fx, fy) = (x as f32 + 0.5, y as f32 + 0.5);
                let d = ((fx - cx).powi(2) + (fy - cy).powi(2)).sqrt();
                let edge = circle_coverage(d, radius);
                if edge <= 0.0 {
                    continue;
                }
                let color = match logo {
                    BuiltinLogo::Organization => {
                        if d > radius * 0.88 {
                            palette::ACCENT
                        } else if d > radius * 0.78 && d < radius * 0.81 {
                            palette::WHITE
                        } else if point_in_polygon(&star, fx, fy) {
                            palette::ACCENT
                        } else {
                            palette::NAVY
                        }
                    }
                    BuiltinLogo::Government => {
                        let angle = (fy - cy).atan2(fx - cx) + PI;
                        let sector = (angle / (PI / 8.0)).fract();
                        if d > radius * 0.9 {
                            palette::NAVY
                        } else if d < radius * 0.3 {
                            palette::ACCENT
                        } else if d < radius * 0.72 && sector < 0.35 {
                            palette::ACCENT
                        } else {
                            palette::WHITE
                        }
                    }
                };
                self.blend(x, y, color, edge);
            }
        }
    }

    fn document_icon(&mut self, rect: Rect, color: Rgb) {
        let stroke = (rect.w * 0.1).max(0.3);
        self.frame(rect, color, stroke);
        for frac in [0.35, 0.55, 0.75] {
            self.fill(
                Rect::new(rect.x + rect.w * 0.22, rect.y + rect.h * frac, rect.w * 0.56, stroke),
                color,
            );
        }
    }

    fn text(&mut self, fonts: &FontSet, run: &TextRun) {
        let font = fonts.font(run.style);
        let scale = Scale::uniform(run.size_pt * PT_TO_MM * self.k);
        let origin = point(run.x * self.k, run.baseline * self.k);
        let clip = self.px_rect(run.clip);
        let glyphs: Vec<_> = font.layout(&run.text, scale, origin).collect();
        for glyph in glyphs {
            let Some(bb) = glyph.pixel_bounding_box() else {
                continue;
            };
            let mut coverage = Vec::new();
            glyph.draw(|gx, gy, v| {
                coverage.push((bb.min.x as i64 + gx as i64, bb.min.y as i64 + gy as i64, v));
            });
            for (x, y, v) in coverage {
                if clip.contains(x, y) {
                    self.blend(x as u32, y as u32, run.color, v);
                }
            }
        }
    }
}

/// Paints `scene` onto an RGB bitmap at `CSS_DPI * scale`.
///
/// Without `fonts`, text runs are handed back in
/// [`Raster::pending_text`] for the PDF writer to draw.
pub fn rasterize(
    scene: &Scene,
    resolver: &ImageResolver,
    fonts: Option<&FontSet>,
    scale: f32,
) -> Result<Raster, ExportError> {
    let px_per_mm = CSS_DPI / 25.4 * scale;
    let width = (scene.width * px_per_mm).round();
    let height = (scene.height * px_per_mm).round();
    if !width.is_finite() || !height.is_finite() || width < 0.0 || height < 0.0 {
        return Err(ExportError::Encode(format!("invalid raster scale {}", scale)));
    }
    // `as u32` saturates
    let (width, height) = (width as u32, height as u32);
    let bytes = (width as u64)
        .checked_mul(height as u64)
        .and_then(|px| px.checked_mul(3));
    match bytes {
        Some(bytes) if bytes <= MAX_RASTER_BYTES => {}
        _ => {
            return Err(ExportError::Encode(format!(
                "page bitmap of {}x{} px at scale {} is too large",
                width, height, scale
            )));
        }
    }
    debug!("Rasterizing {}x{} px at scale {}", width, height, scale);

    let mut canvas = Canvas {
        image: RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255])),
        k: px_per_mm,
        resolver,
    };
    let mut pending_text = Vec::new();

    for primitive in &scene.primitives {
        match primitive {
            Primitive::Fill { rect, color } => canvas.fill(*rect, *color),
            Primitive::Frame { rect, color, width } => canvas.frame(*rect, *color, *width),
            Primitive::DashedFrame {
                rect,
                color,
                width,
                dash,
            } => canvas.dashed_frame(*rect, *color, *width, *dash),
            Primitive::Image { rect, source, fit } => match source {
                ImageSource::Inline(image) => {
                    let img = resolver.inline(image).ok_or_else(|| {
                        ExportError::Image("image was not decoded before painting".to_string())
                    })?;
                    canvas.draw_image(*rect, img, *fit);
                }
                ImageSource::Builtin(logo) => canvas.emblem(*rect, *logo),
            },
            Primitive::Silhouette {
                rect,
                background,
                color,
            } => canvas.silhouette(*rect, *background, *color),
            Primitive::Emblem { rect, logo } => canvas.emblem(*rect, *logo),
            Primitive::DocumentIcon { rect, color } => canvas.document_icon(*rect, *color),
            Primitive::Text(run) => match fonts {
                Some(fonts) => canvas.text(fonts, run),
                None => pending_text.push(run.clone()),
            },
        }
    }

    Ok(Raster {
        image: canvas.image,
        scale,
        px_per_mm,
        pending_text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::fonts::ApproxMeasure;
    use crate::images::{encode_data_uri, ImageFormat};
    use crate::layout::layout;
    use crate::model::{Field, RegionalRecord};

    fn solid_png(w: u32, h: u32, rgb: [u8; 3]) -> ImageRef {
        let img = RgbImage::from_pixel(w, h, image::Rgb(rgb));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        encode_data_uri(&out.into_inner(), ImageFormat::Png)
    }

    fn scene_with(primitives: Vec<Primitive>) -> Scene {
        Scene {
            width: 20.0,
            height: 20.0,
            primitives,
            dropped_lines: 0,
        }
    }

    #[test]
    fn test_page_size_at_scale_two() {
        let doc = Document::from_regional(&RegionalRecord::default());
        let scene = layout(&doc, &ApproxMeasure);
        let raster = rasterize(&scene, &ImageResolver::new(), None, 2.0).unwrap();
        assert_eq!(raster.image.dimensions(), (1587, 2245));
        assert!(!raster.pending_text.is_empty());
        // banner is navy
        let y = ((42.3 + 5.0) * raster.px_per_mm) as u32;
        assert_eq!(raster.image.get_pixel(5, y).0, [0x10, 0x24, 0x46]);
    }

    #[test]
    fn test_oversized_raster_is_an_error() {
        let doc = Document::from_regional(&RegionalRecord::default());
        let scene = layout(&doc, &ApproxMeasure);
        let result = rasterize(&scene, &ImageResolver::new(), None, 100000.0);
        assert!(matches!(result, Err(ExportError::Encode(_))));
        let result = rasterize(&scene, &ImageResolver::new(), None, f32::INFINITY);
        assert!(matches!(result, Err(ExportError::Encode(_))));
    }

    #[test]
    fn test_fill_and_frame() {
        let scene = scene_with(vec![
            Primitive::Fill {
                rect: Rect::new(0.0, 0.0, 10.0, 10.0),
                color: Rgb(255, 0, 0),
            },
            Primitive::Frame {
                rect: Rect::new(10.0, 10.0, 10.0, 10.0),
                color: Rgb(0, 0, 255),
                width: 1.0,
            },
        ]);
        let raster = rasterize(&scene, &ImageResolver::new(), None, 1.0).unwrap();
        let k = raster.px_per_mm;
        assert_eq!(raster.image.get_pixel((5.0 * k) as u32, (5.0 * k) as u32).0, [255, 0, 0]);
        assert_eq!(raster.image.get_pixel((10.2 * k) as u32, (15.0 * k) as u32).0, [0, 0, 255]);
        assert_eq!(raster.image.get_pixel((15.0 * k) as u32, (15.0 * k) as u32).0, [255, 255, 255]);
    }

    #[test]
    fn test_cover_fills_box_and_contain_letterboxes() {
        let wide = solid_png(40, 10, [0, 200, 0]);
        let mut resolver = ImageResolver::new();
        resolver.insert_inline(&wide).unwrap();
        let scene = scene_with(vec![
            Primitive::Image {
                rect: Rect::new(0.0, 0.0, 10.0, 10.0),
                source: ImageSource::Inline(wide.clone()),
                fit: Fit::Cover,
            },
            Primitive::Image {
                rect: Rect::new(10.0, 10.0, 10.0, 10.0),
                source: ImageSource::Inline(wide),
                fit: Fit::Contain,
            },
        ]);
        let raster = rasterize(&scene, &resolver, None, 2.0).unwrap();
        let k = raster.px_per_mm;
        let at = |x: f32, y: f32| raster.image.get_pixel((x * k) as u32, (y * k) as u32).0;
        assert_eq!(at(1.0, 1.0), [0, 200, 0]);
        assert_eq!(at(9.0, 9.0), [0, 200, 0]);
        assert_eq!(at(15.0, 15.0), [0, 200, 0]);
        assert_eq!(at(15.0, 10.5), [255, 255, 255]);
    }

    #[test]
    fn test_undecodable_inline_image_is_an_error() {
        let broken = ImageRef::from_data_uri("data:image/png;base64,AAAA").unwrap();
        let mut resolver = ImageResolver::new();
        assert!(matches!(resolver.insert_inline(&broken), Err(ExportError::Image(_))));
    }

    #[test]
    fn test_unprepared_image_aborts() {
        let scene = scene_with(vec![Primitive::Image {
            rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            source: ImageSource::Inline(solid_png(2, 2, [0, 0, 0])),
            fit: Fit::Contain,
        }]);
        assert!(rasterize(&scene, &ImageResolver::new(), None, 2.0).is_err());
    }

    #[test]
    fn test_prepare_decodes_document_images() {
        let mut rec = RegionalRecord::default();
        rec.set(Field::Photo, solid_png(3, 4, [10, 20, 30]).into()).unwrap();
        let scene = layout(&Document::from_regional(&rec), &ApproxMeasure);
        let mut loader = ImageLoader::new(None);
        let resolver =
            ImageResolver::prepare(&scene, &LogoSettings::default(), &mut loader).unwrap();
        assert_eq!(resolver.inline.len(), 1);
        assert!(resolver.builtin.is_empty());
    }

    #[test]
    fn test_missing_logo_override_aborts() {
        let scene = layout(&Document::from_regional(&RegionalRecord::default()), &ApproxMeasure);
        let logos = LogoSettings {
            organization: Some("/no/such/logo.png".to_string()),
            government: None,
        };
        let mut loader = ImageLoader::new(None);
        assert!(ImageResolver::prepare(&scene, &logos, &mut loader).is_err());
    }

    #[test]
    fn test_emblems_and_silhouette_paint_something() {
        let scene = scene_with(vec![
            Primitive::Emblem {
                rect: Rect::new(0.0, 0.0, 10.0, 10.0),
                logo: BuiltinLogo::Organization,
            },
            Primitive::Silhouette {
                rect: Rect::new(10.0, 10.0, 10.0, 10.0),
                background: palette::PHOTO_BACKGROUND,
                color: palette::PLACEHOLDER,
            },
        ]);
        let raster = rasterize(&scene, &ImageResolver::new(), None, 2.0).unwrap();
        let k = raster.px_per_mm;
        let center = raster.image.get_pixel((5.0 * k) as u32, (5.0 * k) as u32).0;
        assert_ne!(center, [255, 255, 255]);
        let corner = raster.image.get_pixel((10.3 * k) as u32, (10.3 * k) as u32).0;
        assert_eq!(corner, [0xF1, 0xF5, 0xF9]);
    }

    #[test]
    fn test_point_in_polygon() {
        let square = [(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)];
        assert!(point_in_polygon(&square, 2.0, 2.0));
        assert!(!point_in_polygon(&square, 5.0, 2.0));
        let star = star_points(0.0, 0.0, 10.0, 4.0);
        assert!(point_in_polygon(&star, 0.0, 0.0));
        assert!(!point_in_polygon(&star, 9.0, 9.0));
    }
}

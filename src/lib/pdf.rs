//! PDF export for rendered job descriptions.
//!
//! Export is a raster pipeline: the [`Document`] is laid out into a scene,
//! the scene is painted into one bitmap, and that bitmap becomes the only
//! content of a single A4 page. What prints is exactly what was painted.
//!
//! ```text
//! Document --layout--> Scene --rasterize--> Raster --encode--> PDF bytes --save--> file
//! ```
//!
//! When no TrueType font can be found on the machine, text is not painted
//! into the bitmap. It is written over the image with the PDF built-in
//! Helvetica faces instead, so the page is never left without its labels.
//!
//! Files are written next to their final location and renamed into place,
//! so a failed export leaves nothing behind.

use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use log::{debug, info};
use printpdf::color::Color;
use printpdf::image::RawImage;
use printpdf::xobject::{XObject, XObjectTransform};
use printpdf::{
    BuiltinFont, Layer, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, Pt, TextItem, TextMatrix,
    XObjectId,
};

use crate::config::{clamp_scale, Settings};
use crate::document::Document;
use crate::fonts::{ApproxMeasure, FontSet, FontStyle, TextMeasure};
use crate::images::{ImageError, ImageLoader};
use crate::layout::{layout, Scene, TextRun, PAGE_HEIGHT_MM, PAGE_WIDTH_MM};
use crate::model::PersonnelType;
use crate::raster::{rasterize, ImageResolver, Raster};

/// Errors raised while turning a document into a file.
#[derive(Debug)]
pub enum ExportError {
    /// An image could not be loaded or decoded
    Image(String),
    /// The bitmap could not be embedded
    Encode(String),
    /// Writing the file failed
    Io { path: String, message: String },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Image(msg) => write!(f, "image error: {}", msg),
            ExportError::Encode(msg) => write!(f, "PDF encoding failed: {}", msg),
            ExportError::Io { path, message } => write!(f, "cannot write {}: {}", path, message),
        }
    }
}

impl std::error::Error for ExportError {}

impl From<ImageError> for ExportError {
    fn from(err: ImageError) -> Self {
        ExportError::Image(err.to_string())
    }
}

fn io_error(path: &Path, err: impl fmt::Display) -> ExportError {
    ExportError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// `JobDescription_<VARIANT>_<millis>.pdf`
pub fn export_file_name(variant: PersonnelType, millis: i64) -> String {
    format!("JobDescription_{}_{}.pdf", variant.as_tag(), millis)
}

fn builtin_font(style: FontStyle) -> BuiltinFont {
    match style {
        FontStyle::Regular => BuiltinFont::Helvetica,
        FontStyle::Bold => BuiltinFont::HelveticaBold,
        FontStyle::Italic => BuiltinFont::HelveticaOblique,
    }
}

fn mm_to_pt(mm: f32) -> f32 {
    Mm(mm).into_pt().0
}

/// Text drawn over the page image with the built-in PDF fonts. Runs whose
/// baseline falls outside their clip box are left out.
fn overlay_ops(runs: &[TextRun]) -> Vec<Op> {
    let page_height = mm_to_pt(PAGE_HEIGHT_MM);
    let mut ops = Vec::new();
    for run in runs {
        if run.baseline < run.clip.y || run.baseline > run.clip.bottom() {
            continue;
        }
        let font = builtin_font(run.style);
        ops.push(Op::StartTextSection);
        ops.push(Op::SetFillColor {
            col: Color::Rgb(printpdf::Rgb::new(
                run.color.0 as f32 / 255.0,
                run.color.1 as f32 / 255.0,
                run.color.2 as f32 / 255.0,
                None,
            )),
        });
        ops.push(Op::SetFontSizeBuiltinFont {
            size: Pt(run.size_pt),
            font,
        });
        ops.push(Op::SetTextMatrix {
            matrix: TextMatrix::Translate(
                Pt(mm_to_pt(run.x)),
                Pt(page_height - mm_to_pt(run.baseline)),
            ),
        });
        ops.push(Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text(run.text.clone())],
            font,
        });
        ops.push(Op::EndTextSection);
    }
    ops
}

/// Embeds the bitmap as one image filling an A4 portrait page.
pub fn encode(raster: &Raster) -> Result<Vec<u8>, ExportError> {
    let mut png = Cursor::new(Vec::new());
    raster
        .image
        .write_to(&mut png, image::ImageFormat::Png)
        .map_err(|e| ExportError::Encode(e.to_string()))?;

    let mut doc = PdfDocument::new("Job Description");
    let mut decode_warnings = Vec::new();
    let raw_image = RawImage::decode_from_bytes(png.get_ref(), &mut decode_warnings)
        .map_err(|e| ExportError::Encode(format!("page image rejected: {}", e)))?;
    let (img_w, img_h) = (raw_image.width as f32, raw_image.height as f32);
    let xobj_id = XObjectId::new();
    doc.resources
        .xobjects
        .map
        .insert(xobj_id.clone(), XObject::Image(raw_image));

    let layer_id = doc.add_layer(&Layer::new("Page 1"));
    let mut ops = vec![
        Op::BeginLayer { layer_id },
        Op::UseXobject {
            id: xobj_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(0.0)),
                translate_y: Some(Pt(0.0)),
                scale_x: Some(mm_to_pt(PAGE_WIDTH_MM) / img_w),
                scale_y: Some(mm_to_pt(PAGE_HEIGHT_MM) / img_h),
                rotate: None,
                dpi: Some(72.0),
            },
        },
    ];
    ops.extend(overlay_ops(&raster.pending_text));

    doc.pages
        .push(PdfPage::new(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), ops));
    let mut save_warnings = Vec::new();
    let bytes = doc.save(&PdfSaveOptions::default(), &mut save_warnings);
    debug!("Encoded {}x{} px page into {} bytes", img_w, img_h, bytes.len());
    Ok(bytes)
}

/// Writes `bytes` to `target`.
///
/// An existing directory gets `default_name` inside it; anything else is
/// taken as the file path. The data goes to a hidden sibling first and is
/// renamed into place.
pub fn save(bytes: &[u8], target: &Path, default_name: &str) -> Result<PathBuf, ExportError> {
    let path = if target.is_dir() {
        target.join(default_name)
    } else {
        target.to_path_buf()
    };
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !parent.is_dir() {
        return Err(io_error(&parent, "output directory does not exist"));
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io_error(&path, "not a file path"))?;

    let temp = parent.join(format!(".{}.part", file_name));
    if let Err(e) = fs::write(&temp, bytes) {
        let _ = fs::remove_file(&temp);
        return Err(io_error(&path, e));
    }
    if let Err(e) = fs::rename(&temp, &path) {
        let _ = fs::remove_file(&temp);
        return Err(io_error(&path, e));
    }
    info!("Saved {} ({} bytes)", path.display(), bytes.len());
    Ok(path)
}

/// A saved export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub path: PathBuf,
    pub size: usize,
}

/// Runs the whole pipeline with one configuration.
///
/// Each export uses a fresh [`ImageLoader`], so remote logos are fetched
/// at most once per export and never reused across exports.
pub struct Exporter {
    settings: Settings,
    fonts: Option<FontSet>,
    base_path: Option<PathBuf>,
    output: Option<PathBuf>,
}

impl Exporter {
    /// Creates an exporter and looks up a font for the page text.
    pub fn new(settings: Settings) -> Self {
        let fonts = FontSet::discover(&settings.fonts);
        Exporter {
            settings,
            fonts,
            base_path: None,
            output: None,
        }
    }

    /// Replaces the discovered fonts. `None` forces the built-in PDF font overlay.
    pub fn with_fonts(mut self, fonts: Option<FontSet>) -> Self {
        self.fonts = fonts;
        self
    }

    /// Relative logo paths in the configuration resolve next to this file,
    /// usually the configuration file itself.
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Default target: a directory, or a `.pdf` file.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn fonts(&self) -> Option<&FontSet> {
        self.fonts.as_ref()
    }

    pub fn scale(&self) -> f32 {
        clamp_scale(self.settings.export.scale)
    }

    /// Lays out `doc` with the same metrics the export will use.
    pub fn scene(&self, doc: &Document) -> Scene {
        match &self.fonts {
            Some(fonts) => layout(doc, fonts),
            None => layout(doc, &ApproxMeasure as &dyn TextMeasure),
        }
    }

    /// Renders `doc` into PDF bytes without touching the filesystem.
    pub fn export_bytes(&self, doc: &Document) -> Result<Vec<u8>, ExportError> {
        let scene = self.scene(doc);
        let mut loader = ImageLoader::new(self.base_path.as_deref());
        let resolver = ImageResolver::prepare(&scene, &self.settings.logos, &mut loader)?;
        let raster = rasterize(&scene, &resolver, self.fonts.as_ref(), self.scale())?;
        encode(&raster)
    }

    /// Renders `doc` and saves it under its generated name.
    ///
    /// The target is `out`, else the exporter's output, else the configured
    /// output directory, else the current directory.
    pub fn export_into(
        &self,
        doc: &Document,
        out: Option<&Path>,
    ) -> Result<ExportArtifact, ExportError> {
        let bytes = self.export_bytes(doc)?;
        let name = export_file_name(doc.variant, chrono::Utc::now().timestamp_millis());
        let target = out
            .map(Path::to_path_buf)
            .or_else(|| self.output.clone())
            .or_else(|| self.settings.export.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        let path = save(&bytes, &target, &name)?;
        Ok(ExportArtifact {
            path,
            size: bytes.len(),
        })
    }
}

impl fmt::Debug for Exporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exporter")
            .field("scale", &self.scale())
            .field("fonts", &self.fonts.as_ref().map(|s| s.family.as_str()))
            .field("output", &self.output)
            .finish()
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use fontdb::Database;
use log::{debug, info, warn};
use rusttype::{point, Font, Scale};

use crate::config::FontSettings;

/// Millimetres per PostScript point.
pub const PT_TO_MM: f32 = 25.4 / 72.0;

/// Families tried, in order, when the configuration names none.
pub const PREFERRED_FAMILIES: [&str; 6] = [
    "Tahoma",
    "Verdana",
    "Arial",
    "Helvetica",
    "DejaVu Sans",
    "Liberation Sans",
];

/// Returns common aliases for a font name.
///
/// This allows users to specify "Arial" and have the system try
/// "Helvetica", "Liberation Sans", etc.
fn get_font_aliases(name: &str) -> Vec<&'static str> {
    match name.to_lowercase().as_str() {
        "arial" => vec!["Helvetica", "Liberation Sans", "FreeSans"],
        "helvetica" => vec!["Arial", "Liberation Sans", "FreeSans"],
        "tahoma" => vec!["Verdana", "DejaVu Sans"],
        "verdana" => vec!["DejaVu Sans", "Bitstream Vera Sans"],
        _ => vec![],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum FontStyle {
    Regular,
    Bold,
    Italic,
}

impl FontStyle {
    fn suffixes(&self) -> &[&str] {
        match self {
            FontStyle::Regular => &["", "Regular", "Book"],
            FontStyle::Bold => &["Bold", "Bd", "B"],
            FontStyle::Italic => &["Italic", "Oblique", "It", "I"],
        }
    }
}

/// Measures rendered text width.
pub trait TextMeasure {
    /// Width of `text` in millimetres at `size_pt`.
    fn width_mm(&self, text: &str, style: FontStyle, size_pt: f32) -> f32;
}

/// Width estimate from Helvetica-like average advances, used when no real
/// font is loaded. Values are fractions of the em.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxMeasure;

fn approx_advance(c: char) -> f32 {
    match c {
        ' ' => 0.278,
        'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '\'' | '|' | '!' => 0.24,
        'f' | 't' | 'r' | 'I' | '(' | ')' | '[' | ']' | '-' => 0.333,
        'm' | 'w' => 0.833,
        'M' | 'W' => 0.889,
        '0'..='9' => 0.556,
        '•' => 0.35,
        c if c.is_uppercase() => 0.68,
        c if c.is_lowercase() => 0.53,
        _ => 0.6,
    }
}

impl TextMeasure for ApproxMeasure {
    fn width_mm(&self, text: &str, style: FontStyle, size_pt: f32) -> f32 {
        let em: f32 = text.chars().map(approx_advance).sum();
        let weight = if style == FontStyle::Bold { 1.07 } else { 1.0 };
        em * weight * size_pt * PT_TO_MM
    }
}

/// Regular, bold and italic faces of one family.
///
/// Missing variants reuse the regular face.
pub struct FontSet {
    pub family: String,
    regular: Font<'static>,
    bold: Font<'static>,
    italic: Font<'static>,
}

impl std::fmt::Debug for FontSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontSet").field("family", &self.family).finish()
    }
}

impl FontSet {
    pub fn from_bytes(
        family: &str,
        regular: Vec<u8>,
        bold: Option<Vec<u8>>,
        italic: Option<Vec<u8>>,
    ) -> Option<Self> {
        let regular_font = Font::try_from_vec(regular)?;
        let bold = bold
            .and_then(Font::try_from_vec)
            .unwrap_or_else(|| regular_font.clone());
        let italic = italic
            .and_then(Font::try_from_vec)
            .unwrap_or_else(|| regular_font.clone());
        Some(FontSet {
            family: family.to_string(),
            regular: regular_font,
            bold,
            italic,
        })
    }

    pub fn font(&self, style: FontStyle) -> &Font<'static> {
        match style {
            FontStyle::Regular => &self.regular,
            FontStyle::Bold => &self.bold,
            FontStyle::Italic => &self.italic,
        }
    }

    /// Finds a usable family: configured paths first, then installed fonts.
    pub fn discover(settings: &FontSettings) -> Option<FontSet> {
        let mut names: Vec<&str> = Vec::new();
        if let Some(family) = settings.family.as_deref() {
            names.push(family);
            names.extend(get_font_aliases(family));
        }
        names.extend(PREFERRED_FAMILIES);

        for name in &names {
            if let Some(set) = load_from_paths(name, &settings.paths) {
                info!("Using font '{}' from configured paths", name);
                return Some(set);
            }
        }

        let mut db = Database::new();
        db.load_system_fonts();
        for name in &names {
            if let Some(set) = load_from_database(&db, name) {
                info!("Using system font '{}'", name);
                return Some(set);
            }
        }

        warn!("No usable TrueType font found; text will use the PDF built-in Helvetica");
        None
    }
}

impl TextMeasure for FontSet {
    fn width_mm(&self, text: &str, style: FontStyle, size_pt: f32) -> f32 {
        let font = self.font(style);
        let scale = Scale::uniform(size_pt);
        let width_pt = font
            .layout(text, scale, point(0.0, 0.0))
            .last()
            .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
            .unwrap_or(0.0);
        width_pt * PT_TO_MM
    }
}

fn is_truetype(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map_or(false, |ext| {
            ext.eq_ignore_ascii_case("ttf") || ext.eq_ignore_ascii_case("otf")
        })
}

/// Searches configured directories (or single font files) for one style
/// of a family, trying names such as `DejaVuSans-Bold.ttf` and
/// `dejavu_sans_bold.ttf`.
fn find_variant_in_paths(base_name: &str, style: FontStyle, paths: &[PathBuf]) -> Option<Vec<u8>> {
    let base_raw = base_name.to_lowercase();
    let bases = [
        base_raw.clone(),
        base_raw.replace(' ', ""),
        base_raw.replace(' ', "-"),
        base_raw.replace(' ', "_"),
    ];

    let mut files: Vec<PathBuf> = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
        } else if let Ok(entries) = fs::read_dir(path) {
            files.extend(entries.flatten().map(|e| e.path()));
        }
    }

    for path in files.iter().filter(|p| is_truetype(p)) {
        let Some(stem) = path.file_stem().and_then(|n| n.to_str()) else {
            continue;
        };
        let stem = stem.to_lowercase();
        for suffix in style.suffixes() {
            let suffix = suffix.to_lowercase();
            let hit = bases.iter().any(|base| {
                if suffix.is_empty() {
                    stem == *base
                } else {
                    [
                        format!("{}-{}", base, suffix),
                        format!("{}{}", base, suffix),
                        format!("{}_{}", base, suffix),
                        format!("{} {}", base, suffix),
                    ]
                    .iter()
                    .any(|pattern| stem == *pattern)
                }
            });
            if hit {
                if let Ok(bytes) = fs::read(path) {
                    if Font::try_from_bytes(&bytes).is_some() {
                        debug!("Found {:?} face for '{}' at {}", style, base_name, path.display());
                        return Some(bytes);
                    }
                }
            }
        }
    }
    None
}

fn load_from_paths(name: &str, paths: &[PathBuf]) -> Option<FontSet> {
    if paths.is_empty() {
        return None;
    }
    let regular = find_variant_in_paths(name, FontStyle::Regular, paths)?;
    let bold = find_variant_in_paths(name, FontStyle::Bold, paths);
    let italic = find_variant_in_paths(name, FontStyle::Italic, paths);
    FontSet::from_bytes(name, regular, bold, italic)
}

fn load_from_database(db: &Database, name: &str) -> Option<FontSet> {
    let wanted = name.to_lowercase();
    let mut regular = None;
    let mut bold = None;
    let mut italic = None;

    for face in db.faces() {
        let path = match &face.source {
            fontdb::Source::File(p) => p,
            _ => continue,
        };
        // rusttype cannot read collections directly
        if !is_truetype(path) {
            continue;
        }
        let family_matches = face
            .families
            .iter()
            .any(|(family, _)| family.to_lowercase() == wanted);
        if !family_matches {
            continue;
        }

        let slot = if face.weight.0 >= 600 && face.style == fontdb::Style::Normal {
            &mut bold
        } else if face.weight.0 < 600 && face.style != fontdb::Style::Normal {
            &mut italic
        } else if face.weight.0 < 600 {
            &mut regular
        } else {
            continue;
        };
        if slot.is_none() {
            if let Ok(bytes) = fs::read(path) {
                if Font::try_from_bytes(&bytes).is_some() {
                    *slot = Some(bytes);
                }
            }
        }
    }

    FontSet::from_bytes(name, regular?, bold, italic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_font_aliases() {
        assert!(get_font_aliases("Arial").contains(&"Liberation Sans"));
        assert!(get_font_aliases("TAHOMA").contains(&"Verdana"));
        assert!(get_font_aliases("Unknown Family").is_empty());
    }

    #[test]
    fn test_approx_measure_scales_with_size_and_weight() {
        let m = ApproxMeasure;
        let small = m.width_mm("JOB DESCRIPTION", FontStyle::Regular, 10.0);
        let large = m.width_mm("JOB DESCRIPTION", FontStyle::Regular, 20.0);
        assert!((large - 2.0 * small).abs() < 1e-3);
        let bold = m.width_mm("Warden", FontStyle::Bold, 12.0);
        assert!(bold > m.width_mm("Warden", FontStyle::Regular, 12.0));
        assert_eq!(m.width_mm("", FontStyle::Regular, 12.0), 0.0);
    }

    #[test]
    fn test_approx_measure_is_plausible() {
        // "Hello" in 12pt Helvetica is about 27pt wide
        let w = ApproxMeasure.width_mm("Hello", FontStyle::Regular, 12.0);
        assert!(w > 8.0 && w < 12.0, "width was {}", w);
    }

    #[test]
    fn test_invalid_bytes_are_not_a_font() {
        assert!(FontSet::from_bytes("Broken", vec![0, 1, 2, 3], None, None).is_none());
    }

    #[test]
    fn test_find_variant_in_missing_dir_returns_none() {
        let paths = vec![PathBuf::from("/definitely/not/a/font/dir")];
        assert!(find_variant_in_paths("DejaVu Sans", FontStyle::Regular, &paths).is_none());
        assert!(load_from_paths("DejaVu Sans", &paths).is_none());
    }

    #[test]
    fn test_find_variant_skips_non_font_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("DejaVuSans.ttf"), b"not a font").unwrap();
        std::fs::write(dir.path().join("DejaVuSans.txt"), b"readme").unwrap();
        let paths = vec![dir.path().to_path_buf()];
        assert!(find_variant_in_paths("DejaVu Sans", FontStyle::Regular, &paths).is_none());
    }

    #[test]
    fn test_discovered_font_measures_text() {
        // Only meaningful on machines with at least one of the preferred fonts
        let Some(set) = FontSet::discover(&FontSettings::default()) else {
            return;
        };
        let narrow = set.width_mm("ii", FontStyle::Regular, 12.0);
        let wide = set.width_mm("WW", FontStyle::Regular, 12.0);
        assert!(wide > narrow);
        assert!(set.width_mm("Warden", FontStyle::Bold, 12.0) > 0.0);
    }
}

//! Document model and the pure renderer that builds it.
//!
//! A job description page is four fixed bands stacked top to bottom:
//!
//! ```text
//! +-------------------------------------------+
//! | [org][extra]      OFFICE NAME      [gov]  |  header
//! |                   ADDRESS                 |
//! +-------------------------------------------+
//! | [photo] | RANK & FULL NAME                |  profile banner
//! |         | DESIGNATION                     |
//! +-------------------------------------------+
//! | JOB DESCRIPTION                           |  body
//! | Regional Office Personnel                 |
//! | job functions...                          |
//! +-------------------------------------------+
//! |  "Changing lives Building a Safer Nation" |  footer
//! +-------------------------------------------+
//! ```
//!
//! [`render`] branches on the variant once and produces the same
//! [`Document`] shape for both, so the export path never needs to know
//! which form it came from. Every empty field resolves to a fallback here.

use crate::model::{ImageRef, PersonnelType, RecordRef, RegionalRecord, UnitRecord};
use serde::Serialize;

pub const RANK_NAME_PLACEHOLDER: &str = "RANK & FULL NAME";
pub const DESIGNATION_PLACEHOLDER: &str = "DESIGNATION";
pub const BODY_PLACEHOLDER: &str = "Job functions content will appear here...";
pub const BODY_HEADING: &str = "JOB DESCRIPTION";
pub const FOOTER_TAGLINE: &str = "\"Changing lives Building a Safer Nation\"";

/// 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Fixed palette of the printed page.
pub mod palette {
    use super::Rgb;

    pub const NAVY: Rgb = Rgb(0x10, 0x24, 0x46);
    pub const ACCENT: Rgb = Rgb(0xEA, 0xB3, 0x08);
    pub const WHITE: Rgb = Rgb(0xFF, 0xFF, 0xFF);
    pub const BODY_BACKGROUND: Rgb = Rgb(0xEF, 0xF6, 0xFF);
    pub const RULE: Rgb = Rgb(0xBF, 0xDB, 0xFE);
    pub const DESIGNATION: Rgb = Rgb(0xDB, 0xEA, 0xFE);
    pub const BODY_TEXT: Rgb = Rgb(0x1E, 0x29, 0x3B);
    pub const SUBTITLE: Rgb = Rgb(0x9C, 0xA3, 0xAF);
    pub const PLACEHOLDER: Rgb = Rgb(0x94, 0xA3, 0xB8);
    pub const PHOTO_BACKGROUND: Rgb = Rgb(0xF1, 0xF5, 0xF9);
    pub const HEADER_RULE: Rgb = Rgb(0xF3, 0xF4, 0xF6);
    pub const ICON: Rgb = Rgb(0x1E, 0x40, 0xAF);
}

/// Emblems painted when the record carries no logo of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BuiltinLogo {
    Organization,
    Government,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ImageSource {
    /// An uploaded image
    Inline(ImageRef),
    Builtin(BuiltinLogo),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogoSlot {
    pub label: &'static str,
    pub source: ImageSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub left_logos: Vec<LogoSlot>,
    pub right_logo: LogoSlot,
    pub title: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PhotoSlot {
    Image(ImageRef),
    /// Generic person icon on a light background
    Silhouette,
}

/// Text that is either user content or a placeholder label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSlot {
    pub text: String,
    pub placeholder: bool,
}

impl TextSlot {
    fn uppercase_or(value: &str, placeholder: &str) -> Self {
        if value.trim().is_empty() {
            TextSlot {
                text: placeholder.to_string(),
                placeholder: true,
            }
        } else {
            TextSlot {
                text: value.trim().to_uppercase(),
                placeholder: false,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Banner {
    pub photo: PhotoSlot,
    pub rank_name: TextSlot,
    pub designation: TextSlot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BodyContent {
    /// Preformatted text; line breaks are kept
    Text(String),
    Placeholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Body {
    pub heading: String,
    pub subtitle: String,
    pub content: BodyContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Footer {
    pub tagline: String,
}

/// The rendered page, independent of which variant produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub variant: PersonnelType,
    pub header: Header,
    pub banner: Banner,
    pub body: Body,
    pub footer: Footer,
}

fn optional_upper(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_uppercase())
}

fn logo_or_builtin(
    label: &'static str,
    image: Option<&ImageRef>,
    builtin: BuiltinLogo,
) -> LogoSlot {
    LogoSlot {
        label,
        source: image
            .cloned()
            .map(ImageSource::Inline)
            .unwrap_or(ImageSource::Builtin(builtin)),
    }
}

fn optional_logo(label: &'static str, image: Option<&ImageRef>) -> Option<LogoSlot> {
    image.cloned().map(|img| LogoSlot {
        label,
        source: ImageSource::Inline(img),
    })
}

/// Renders the given record. Pure: identical input gives an identical document.
pub fn render(record: RecordRef<'_>) -> Document {
    let variant = record.variant();
    let base = record.base();

    let (left_logos, right_logo, title, address) = match record {
        RecordRef::Regional(r) => {
            let mut left = vec![logo_or_builtin(
                "Organization Logo",
                r.org_logo.as_ref(),
                BuiltinLogo::Organization,
            )];
            left.extend(optional_logo("Regional Logo", r.regional_logo.as_ref()));
            (
                left,
                logo_or_builtin("Government Logo", r.gov_logo.as_ref(), BuiltinLogo::Government),
                optional_upper(&r.office),
                None,
            )
        }
        RecordRef::Unit(u) => {
            let mut left = vec![logo_or_builtin(
                "Organization Logo",
                u.org_logo.as_ref(),
                BuiltinLogo::Organization,
            )];
            left.extend(optional_logo("Unit Logo", u.unit_logo.as_ref()));
            (
                left,
                logo_or_builtin("Government Logo", u.gov_logo.as_ref(), BuiltinLogo::Government),
                optional_upper(&u.jail_unit),
                optional_upper(&u.address),
            )
        }
    };

    let subtitle = match variant {
        PersonnelType::Regional => "Regional Office Personnel",
        PersonnelType::Unit => "Unit Office Personnel",
    };

    let content = if base.job_functions.trim().is_empty() {
        BodyContent::Placeholder(BODY_PLACEHOLDER.to_string())
    } else {
        BodyContent::Text(base.job_functions.clone())
    };

    Document {
        variant,
        header: Header {
            left_logos,
            right_logo,
            title,
            address,
        },
        banner: Banner {
            photo: base
                .photo
                .clone()
                .map(PhotoSlot::Image)
                .unwrap_or(PhotoSlot::Silhouette),
            rank_name: TextSlot::uppercase_or(&base.rank_name, RANK_NAME_PLACEHOLDER),
            designation: TextSlot::uppercase_or(&base.designation, DESIGNATION_PLACEHOLDER),
        },
        body: Body {
            heading: BODY_HEADING.to_string(),
            subtitle: subtitle.to_string(),
            content,
        },
        footer: Footer {
            tagline: FOOTER_TAGLINE.to_string(),
        },
    }
}

impl Document {
    pub fn from_regional(record: &RegionalRecord) -> Self {
        render(RecordRef::Regional(record))
    }

    pub fn from_unit(record: &UnitRecord) -> Self {
        render(RecordRef::Unit(record))
    }
}

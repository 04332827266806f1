//! The jobdesc library fills in personnel job-description forms and prints them as single-page
//! A4 PDFs. Two form variants exist: a Regional office form and a Unit (jail unit) form. Both
//! share the same page design of a logo header, a profile banner, a job-functions body and a
//! footer.
//!
//! The library keeps the form state, optionally polishes the free-form job functions through an
//! external text service, renders the active form into a [`document::Document`], and exports that
//! document through a raster pipeline so the PDF looks exactly like the preview.
//!
//! Basic usage builds a controller, sets a few fields and exports:
//! ```rust,no_run
//! use jobdesc::config::Settings;
//! use jobdesc::controller::FormController;
//! use jobdesc::model::{Field, PersonnelType};
//! use jobdesc::pdf::Exporter;
//! use std::error::Error;
//!
//! fn example() -> Result<(), Box<dyn Error>> {
//!     let mut form = FormController::new();
//!     form.set_field(PersonnelType::Regional, Field::Office, "Northeast Regional HQ".into())?;
//!     form.set_field(PersonnelType::Regional, Field::RankName, "Director Jane Doe".into())?;
//!
//!     let exporter = Exporter::new(Settings::default()).with_output("out");
//!     let artifact = form.export(&exporter)?;
//!     println!("saved {}", artifact.path.display());
//!     Ok(())
//! }
//! ```
//!
//! Forms can also be read from a TOML file and polished before export:
//! ```rust,no_run
//! use jobdesc::config::ConfigSource;
//! use std::error::Error;
//!
//! fn example_from_file() -> Result<(), Box<dyn Error>> {
//!     let path = jobdesc::export_form_file("form.toml", ".", ConfigSource::Default, true)?;
//!     println!("saved {}", path.display());
//!     Ok(())
//! }
//! ```
//!
//! Settings are read from `jobdescrc.toml`:
//! ```toml
//! [refine]
//! api_key_env = "API_KEY"
//! temperature = 0.3
//!
//! [export]
//! scale = 2.0
//! ```
//!
//! ## Export Flow
//! ```text
//! +-------------+     +----------------+     +----------------+
//! | Form        |     | Document       |     | Scene          |
//! | Controller  | --> | header/banner  | --> | fills, images, | --+
//! | (2 records) |     | body/footer    |     | text runs (mm) |   |
//! +-------------+     +----------------+     +----------------+   |
//!                                                                 |
//! +---------------+     +------------------+     +--------------+ |
//! | Output:       |     | PDF: one A4 page |     | Raster       | |
//! | JobDescription| <-- | one image XObject| <-- | RGB bitmap   | <-+
//! | _<VARIANT>_.. |     | (+ text overlay) |     | 96dpi x scale|
//! +---------------+     +------------------+     +--------------+
//! ```

pub mod config;
pub mod controller;
mod debug;
pub mod document;
pub mod fonts;
pub mod form;
pub mod images;
pub mod layout;
pub mod model;
pub mod pdf;
pub mod raster;
pub mod refine;

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::ConfigSource;
use crate::form::FormError;
use crate::images::ImageError;
use crate::model::FieldError;
use crate::pdf::{ExportError, Exporter};
use crate::refine::Refiner;

/// Represents the errors a caller of the library can see.
#[derive(Debug)]
pub enum JdError {
    /// The form file could not be read or parsed
    Form {
        message: String,
        path: Option<String>,
        suggestion: String,
    },
    /// A field assignment was rejected
    Field { message: String, suggestion: String },
    /// An upload was not a readable JPEG or PNG
    Image { message: String, suggestion: String },
    /// The export pipeline failed; no file was written
    Export {
        message: String,
        path: Option<String>,
        suggestion: Option<String>,
    },
    /// An export is already running
    Busy,
}

impl Error for JdError {}
impl fmt::Display for JdError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JdError::Form {
                message,
                path,
                suggestion,
            } => {
                write!(f, "❌ Form Error: {}", message)?;
                if let Some(p) = path {
                    write!(f, "\n📁 Path: {}", p)?;
                }
                write!(f, "\n💡 Suggestion: {}", suggestion)
            }
            JdError::Field {
                message,
                suggestion,
            } => {
                write!(f, "❌ Field Error: {}", message)?;
                write!(f, "\n💡 Suggestion: {}", suggestion)
            }
            JdError::Image {
                message,
                suggestion,
            } => {
                write!(f, "❌ Image Error: {}", message)?;
                write!(f, "\n💡 Suggestion: {}", suggestion)
            }
            JdError::Export {
                message,
                path,
                suggestion,
            } => {
                write!(f, "❌ Export Error: {}", message)?;
                if let Some(p) = path {
                    write!(f, "\n📁 Path: {}", p)?;
                }
                if let Some(hint) = suggestion {
                    write!(f, "\n💡 Suggestion: {}", hint)?;
                }
                Ok(())
            }
            JdError::Busy => write!(f, "❌ An export is already in progress"),
        }
    }
}

impl From<FieldError> for JdError {
    fn from(err: FieldError) -> Self {
        let suggestion = match &err {
            FieldError::Unknown(_) => format!(
                "Valid fields are: {}",
                model::Field::ALL
                    .iter()
                    .map(|f| f.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            FieldError::NotOnVariant { .. } => {
                "Switch the personnel type with --type, or use a field of the active form"
                    .to_string()
            }
            FieldError::TypeMismatch { field } if field.is_image() => {
                "Use --image for photo and logo fields".to_string()
            }
            FieldError::TypeMismatch { .. } => "Use --set for text fields".to_string(),
        };
        JdError::Field {
            message: err.to_string(),
            suggestion,
        }
    }
}

impl From<ImageError> for JdError {
    fn from(err: ImageError) -> Self {
        JdError::Image {
            message: err.to_string(),
            suggestion: "Upload a JPEG or PNG file (up to 5 MB recommended)".to_string(),
        }
    }
}

impl From<FormError> for JdError {
    fn from(err: FormError) -> Self {
        match err {
            FormError::Read { path, message } => JdError::Form {
                message,
                path: Some(path),
                suggestion: "Check that the form file exists and is readable".to_string(),
            },
            FormError::Parse(message) => JdError::Form {
                message,
                path: None,
                suggestion: "Only 'active', [regional] and [unit] with known field names are allowed"
                    .to_string(),
            },
            FormError::Field(e) => e.into(),
            FormError::Image { field, error } => JdError::Image {
                message: format!("{}: {}", field, error),
                suggestion: "Image entries must point to JPEG or PNG files, relative to the form file"
                    .to_string(),
            },
        }
    }
}

impl From<ExportError> for JdError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Io { path, message } => JdError::Export {
                suggestion: Some(if message.contains("Permission") || message.contains("denied") {
                    "Check that you have write permissions for this location".to_string()
                } else if message.contains("does not exist") {
                    format!("Create the directory first: mkdir -p {}", path)
                } else {
                    "Try a different output path or check available disk space".to_string()
                }),
                message,
                path: Some(path),
            },
            ExportError::Image(message) => JdError::Export {
                message,
                path: None,
                suggestion: Some(
                    "Re-upload the photo and logos; every image must decode as JPEG or PNG"
                        .to_string(),
                ),
            },
            ExportError::Encode(message) => JdError::Export {
                message,
                path: None,
                suggestion: None,
            },
        }
    }
}

/// Loads a form file, optionally refines the active job functions, and exports the active
/// form into `output` (a directory or a `.pdf` path).
///
/// # Arguments
/// * `form_path` - TOML form file
/// * `output` - Target directory or file
/// * `config` - Configuration source (Default, File path, or Embedded TOML)
/// * `polish` - Run the refiner on the active job functions before export
///
/// # Returns
/// * `Ok(PathBuf)` with the written file
/// * `Err(JdError)` if the form, an image, or the export fails
pub fn export_form_file(
    form_path: &str,
    output: &str,
    config: ConfigSource,
    polish: bool,
) -> Result<PathBuf, JdError> {
    let settings = config::load_config_from_source(config);
    let mut controller = form::load_form(Path::new(form_path))?.into_controller();
    if polish {
        controller.request_refine(&Refiner::from_settings(&settings.refine));
    }
    let exporter = Exporter::new(settings).with_output(output);
    Ok(controller.export(&exporter)?.path)
}

/// Renders the active form of a form file straight to PDF bytes.
pub fn form_into_bytes(form_toml: &str, config: ConfigSource) -> Result<Vec<u8>, JdError> {
    let settings = config::load_config_from_source(config);
    let controller = form::parse_form(form_toml, None)?.into_controller();
    let exporter = Exporter::new(settings);
    Ok(exporter.export_bytes(&controller.render())?)
}

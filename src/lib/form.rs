//! TOML form files.
//!
//! ```toml
//! active = "unit"
//!
//! [regional]
//! office = "Northeast Regional HQ"
//! rank_name = "Director Jane Doe"
//! photo = "photo.jpg"
//!
//! [unit]
//! jail_unit = "Manila City Jail"
//! address = "123 Street, Manila City"
//! ```
//!
//! Image entries are paths relative to the form file, URLs, or `data:` URIs.
//! They pass the same JPEG/PNG check as a direct upload.

use std::fmt;
use std::path::Path;

use log::debug;
use serde::Deserialize;

use crate::controller::FormController;
use crate::images::{ImageError, ImageLoader};
use crate::model::{Field, FieldError, FieldValue, PersonnelType, RegionalRecord, UnitRecord};

#[derive(Debug)]
pub enum FormError {
    Read { path: String, message: String },
    Parse(String),
    Field(FieldError),
    Image { field: Field, error: ImageError },
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormError::Read { path, message } => write!(f, "cannot read {}: {}", path, message),
            FormError::Parse(msg) => write!(f, "invalid form file: {}", msg),
            FormError::Field(e) => write!(f, "{}", e),
            FormError::Image { field, error } => write!(f, "{}: {}", field, error),
        }
    }
}

impl std::error::Error for FormError {}

impl From<FieldError> for FormError {
    fn from(err: FieldError) -> Self {
        FormError::Field(err)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegionalEntries {
    office: Option<String>,
    rank_name: Option<String>,
    designation: Option<String>,
    job_functions: Option<String>,
    photo: Option<String>,
    org_logo: Option<String>,
    regional_logo: Option<String>,
    gov_logo: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct UnitEntries {
    jail_unit: Option<String>,
    address: Option<String>,
    rank_name: Option<String>,
    designation: Option<String>,
    job_functions: Option<String>,
    photo: Option<String>,
    unit_logo: Option<String>,
    org_logo: Option<String>,
    gov_logo: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FormFile {
    active: Option<PersonnelType>,
    #[serde(default)]
    regional: RegionalEntries,
    #[serde(default)]
    unit: UnitEntries,
}

/// Both records read from one form file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedForm {
    pub active: Option<PersonnelType>,
    pub regional: RegionalRecord,
    pub unit: UnitRecord,
}

impl LoadedForm {
    /// A controller holding these records, in edit mode.
    pub fn into_controller(self) -> FormController {
        FormController::with_records(self.active.unwrap_or_default(), self.regional, self.unit)
    }
}

type Entry<'a> = (Field, &'a Option<String>);

fn apply<F>(entries: &[Entry<'_>], loader: &mut ImageLoader, mut set: F) -> Result<(), FormError>
where
    F: FnMut(Field, FieldValue) -> Result<(), FieldError>,
{
    for (field, value) in entries {
        let Some(value) = value else {
            continue;
        };
        let value = if field.is_image() {
            if value.trim().is_empty() {
                FieldValue::Image(None)
            } else {
                let image = loader.load_upload(value).map_err(|error| FormError::Image {
                    field: *field,
                    error,
                })?;
                FieldValue::Image(Some(image))
            }
        } else {
            FieldValue::Text(value.clone())
        };
        set(*field, value)?;
    }
    Ok(())
}

/// Parses form TOML. Relative image paths resolve against `form_path`'s directory.
pub fn parse_form(content: &str, form_path: Option<&Path>) -> Result<LoadedForm, FormError> {
    let file: FormFile = toml::from_str(content).map_err(|e| FormError::Parse(e.to_string()))?;
    let mut loader = ImageLoader::new(form_path);

    let mut regional = RegionalRecord::default();
    let r = &file.regional;
    apply(
        &[
            (Field::Office, &r.office),
            (Field::RankName, &r.rank_name),
            (Field::Designation, &r.designation),
            (Field::JobFunctions, &r.job_functions),
            (Field::Photo, &r.photo),
            (Field::OrgLogo, &r.org_logo),
            (Field::RegionalLogo, &r.regional_logo),
            (Field::GovLogo, &r.gov_logo),
        ],
        &mut loader,
        |field, value| regional.set(field, value),
    )?;

    let mut unit = UnitRecord::default();
    let u = &file.unit;
    apply(
        &[
            (Field::JailUnit, &u.jail_unit),
            (Field::Address, &u.address),
            (Field::RankName, &u.rank_name),
            (Field::Designation, &u.designation),
            (Field::JobFunctions, &u.job_functions),
            (Field::Photo, &u.photo),
            (Field::UnitLogo, &u.unit_logo),
            (Field::OrgLogo, &u.org_logo),
            (Field::GovLogo, &u.gov_logo),
        ],
        &mut loader,
        |field, value| unit.set(field, value),
    )?;

    Ok(LoadedForm {
        active: file.active,
        regional,
        unit,
    })
}

/// Reads and parses a form file.
pub fn load_form(path: &Path) -> Result<LoadedForm, FormError> {
    debug!("Loading form {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|e| FormError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    parse_form(&content, Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::tests::tiny_png;
    use std::fs;

    #[test]
    fn test_parse_both_sections() {
        let form = parse_form(
            r#"
active = "unit"

[regional]
office = "Northeast Regional HQ"
rank_name = "Director Jane Doe"
job_functions = """
oversee operations
- review budgets
"""

[unit]
jail_unit = "Manila City Jail"
address = "123 Street, Manila City"
designation = "Warden"
"#,
            None,
        )
        .unwrap();
        assert_eq!(form.active, Some(PersonnelType::Unit));
        assert_eq!(form.regional.office, "Northeast Regional HQ");
        assert_eq!(
            form.regional.base.job_functions,
            "oversee operations\n- review budgets\n"
        );
        assert_eq!(form.unit.jail_unit, "Manila City Jail");
        assert_eq!(form.unit.base.designation, "Warden");

        let controller = form.into_controller();
        assert_eq!(controller.active(), PersonnelType::Unit);
        assert_eq!(controller.active_base().designation, "Warden");
    }

    #[test]
    fn test_empty_form_is_valid() {
        let form = parse_form("", None).unwrap();
        assert_eq!(form, LoadedForm::default());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(matches!(
            parse_form("[regional]\nsalary = \"1\"\n", None),
            Err(FormError::Parse(_))
        ));
        // office belongs to the regional form only
        assert!(parse_form("[unit]\noffice = \"HQ\"\n", None).is_err());
        assert!(parse_form("colour = \"blue\"\n", None).is_err());
    }

    #[test]
    fn test_images_resolve_relative_to_form() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("photo.png"), tiny_png()).unwrap();
        let form_path = dir.path().join("form.toml");
        fs::write(&form_path, "[unit]\nphoto = \"photo.png\"\norg_logo = \"\"\n").unwrap();

        let form = load_form(&form_path).unwrap();
        let photo = form.unit.base.photo.unwrap();
        assert_eq!(photo.mime_type(), "image/png");
        assert!(form.unit.org_logo.is_none());
    }

    #[test]
    fn test_unsupported_image_is_reported_with_field() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("logo.gif"), b"GIF89a....").unwrap();
        let form_path = dir.path().join("form.toml");
        fs::write(&form_path, "[regional]\ngov_logo = \"logo.gif\"\n").unwrap();

        match load_form(&form_path) {
            Err(FormError::Image { field, error }) => {
                assert_eq!(field, Field::GovLogo);
                assert!(matches!(error, ImageError::UnsupportedFormat(_)));
            }
            other => panic!("expected image error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_form(Path::new("/no/such/form.toml")),
            Err(FormError::Read { .. })
        ));
    }
}

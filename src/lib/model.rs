//! Form data model for the two personnel variants.
//!
//! A session always owns one [`RegionalRecord`] and one [`UnitRecord`]. Both
//! start empty and are mutated field by field through [`Field`] /
//! [`FieldValue`] pairs. Every field may stay empty: the renderer has a
//! fallback for each one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which of the two record shapes is being edited, previewed or exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonnelType {
    #[default]
    Regional,
    Unit,
}

impl PersonnelType {
    /// Tag used in export file names (`JobDescription_REGIONAL_...`).
    pub fn as_tag(&self) -> &'static str {
        match self {
            PersonnelType::Regional => "REGIONAL",
            PersonnelType::Unit => "UNIT",
        }
    }
}

impl fmt::Display for PersonnelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl FromStr for PersonnelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regional" | "region" => Ok(PersonnelType::Regional),
            "unit" => Ok(PersonnelType::Unit),
            other => Err(format!(
                "unknown personnel type '{}' (expected 'regional' or 'unit')",
                other
            )),
        }
    }
}

/// An inline image held as a `data:` URI with a base64 payload.
///
/// Only the URI shape is checked here. Whether the payload really decodes
/// to a JPEG or PNG is the upload layer's job, and export re-checks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageRef(String);

impl ImageRef {
    pub fn from_data_uri(uri: impl Into<String>) -> Result<Self, String> {
        let uri = uri.into();
        let Some(rest) = uri.strip_prefix("data:") else {
            return Err("image reference must be a data: URI".to_string());
        };
        match rest.split_once(',') {
            Some((meta, payload)) if meta.ends_with(";base64") && !payload.is_empty() => {
                Ok(ImageRef(uri))
            }
            _ => Err("image data URI must carry a non-empty base64 payload".to_string()),
        }
    }

    /// Builds a reference from a MIME type and an already-encoded payload.
    pub(crate) fn from_parts(mime: &str, base64_payload: &str) -> Self {
        ImageRef(format!("data:{};base64,{}", mime, base64_payload))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// MIME type declared in the URI header, e.g. `image/png`.
    pub fn mime_type(&self) -> &str {
        self.0
            .strip_prefix("data:")
            .and_then(|rest| rest.split(';').next())
            .unwrap_or("")
    }

    /// Base64 payload after the comma.
    pub fn payload(&self) -> &str {
        self.0.split_once(',').map(|(_, p)| p).unwrap_or("")
    }
}

impl TryFrom<String> for ImageRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ImageRef::from_data_uri(value)
    }
}

impl From<ImageRef> for String {
    fn from(value: ImageRef) -> Self {
        value.0
    }
}

/// Fields shared by both variants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BasePersonnelData {
    pub photo: Option<ImageRef>,
    pub rank_name: String,
    pub designation: String,
    pub job_functions: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegionalRecord {
    pub base: BasePersonnelData,
    pub office: String,
    pub org_logo: Option<ImageRef>,
    pub regional_logo: Option<ImageRef>,
    pub gov_logo: Option<ImageRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnitRecord {
    pub base: BasePersonnelData,
    pub unit_logo: Option<ImageRef>,
    pub org_logo: Option<ImageRef>,
    pub gov_logo: Option<ImageRef>,
    pub jail_unit: String,
    pub address: String,
}

/// Every settable field across both variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Office,
    JailUnit,
    Address,
    RankName,
    Designation,
    JobFunctions,
    Photo,
    OrgLogo,
    RegionalLogo,
    UnitLogo,
    GovLogo,
}

impl Field {
    pub const ALL: [Field; 11] = [
        Field::Office,
        Field::JailUnit,
        Field::Address,
        Field::RankName,
        Field::Designation,
        Field::JobFunctions,
        Field::Photo,
        Field::OrgLogo,
        Field::RegionalLogo,
        Field::UnitLogo,
        Field::GovLogo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Office => "office",
            Field::JailUnit => "jail_unit",
            Field::Address => "address",
            Field::RankName => "rank_name",
            Field::Designation => "designation",
            Field::JobFunctions => "job_functions",
            Field::Photo => "photo",
            Field::OrgLogo => "org_logo",
            Field::RegionalLogo => "regional_logo",
            Field::UnitLogo => "unit_logo",
            Field::GovLogo => "gov_logo",
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(
            self,
            Field::Photo | Field::OrgLogo | Field::RegionalLogo | Field::UnitLogo | Field::GovLogo
        )
    }

    pub fn applies_to(&self, variant: PersonnelType) -> bool {
        match self {
            Field::Office | Field::RegionalLogo => variant == PersonnelType::Regional,
            Field::JailUnit | Field::Address | Field::UnitLogo => variant == PersonnelType::Unit,
            _ => true,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        // `bjmp_logo` is the organization logo's historical name
        let normalized = match normalized.as_str() {
            "bjmp_logo" => "org_logo".to_string(),
            "rank" | "name" => "rank_name".to_string(),
            _ => normalized,
        };
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.name() == normalized)
            .ok_or_else(|| FieldError::Unknown(s.to_string()))
    }
}

/// Value written into a field: text for text fields, an optional image for image fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Image(Option<ImageRef>),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Option<ImageRef>> for FieldValue {
    fn from(value: Option<ImageRef>) -> Self {
        FieldValue::Image(value)
    }
}

impl From<ImageRef> for FieldValue {
    fn from(value: ImageRef) -> Self {
        FieldValue::Image(Some(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// The name does not match any field
    Unknown(String),
    /// The field exists, but not on this variant
    NotOnVariant { field: Field, variant: PersonnelType },
    /// Text given to an image field or the other way round
    TypeMismatch { field: Field },
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::Unknown(name) => write!(f, "unknown field '{}'", name),
            FieldError::NotOnVariant { field, variant } => {
                write!(f, "field '{}' does not exist on the {} form", field, variant)
            }
            FieldError::TypeMismatch { field } => {
                if field.is_image() {
                    write!(f, "field '{}' expects an image, not text", field)
                } else {
                    write!(f, "field '{}' expects text, not an image", field)
                }
            }
        }
    }
}

impl std::error::Error for FieldError {}

fn assign_text(slot: &mut String, field: Field, value: FieldValue) -> Result<(), FieldError> {
    match value {
        FieldValue::Text(text) => {
            *slot = text;
            Ok(())
        }
        FieldValue::Image(_) => Err(FieldError::TypeMismatch { field }),
    }
}

fn assign_image(
    slot: &mut Option<ImageRef>,
    field: Field,
    value: FieldValue,
) -> Result<(), FieldError> {
    match value {
        FieldValue::Image(image) => {
            *slot = image;
            Ok(())
        }
        FieldValue::Text(_) => Err(FieldError::TypeMismatch { field }),
    }
}

impl BasePersonnelData {
    /// Handles the shared fields. Returns `None` when `field` is not one of them.
    fn set(&mut self, field: Field, value: FieldValue) -> Option<Result<(), FieldError>> {
        let result = match field {
            Field::RankName => assign_text(&mut self.rank_name, field, value),
            Field::Designation => assign_text(&mut self.designation, field, value),
            Field::JobFunctions => assign_text(&mut self.job_functions, field, value),
            Field::Photo => assign_image(&mut self.photo, field, value),
            _ => return None,
        };
        Some(result)
    }
}

impl RegionalRecord {
    pub fn set(&mut self, field: Field, value: FieldValue) -> Result<(), FieldError> {
        if let Some(result) = self.base.set(field, value.clone()) {
            return result;
        }
        match field {
            Field::Office => assign_text(&mut self.office, field, value),
            Field::OrgLogo => assign_image(&mut self.org_logo, field, value),
            Field::RegionalLogo => assign_image(&mut self.regional_logo, field, value),
            Field::GovLogo => assign_image(&mut self.gov_logo, field, value),
            _ => Err(FieldError::NotOnVariant {
                field,
                variant: PersonnelType::Regional,
            }),
        }
    }
}

impl UnitRecord {
    pub fn set(&mut self, field: Field, value: FieldValue) -> Result<(), FieldError> {
        if let Some(result) = self.base.set(field, value.clone()) {
            return result;
        }
        match field {
            Field::JailUnit => assign_text(&mut self.jail_unit, field, value),
            Field::Address => assign_text(&mut self.address, field, value),
            Field::UnitLogo => assign_image(&mut self.unit_logo, field, value),
            Field::OrgLogo => assign_image(&mut self.org_logo, field, value),
            Field::GovLogo => assign_image(&mut self.gov_logo, field, value),
            _ => Err(FieldError::NotOnVariant {
                field,
                variant: PersonnelType::Unit,
            }),
        }
    }
}

/// Borrowed view of whichever record is active.
#[derive(Debug, Clone, Copy)]
pub enum RecordRef<'a> {
    Regional(&'a RegionalRecord),
    Unit(&'a UnitRecord),
}

impl<'a> RecordRef<'a> {
    pub fn variant(&self) -> PersonnelType {
        match self {
            RecordRef::Regional(_) => PersonnelType::Regional,
            RecordRef::Unit(_) => PersonnelType::Unit,
        }
    }

    pub fn base(&self) -> &'a BasePersonnelData {
        match self {
            RecordRef::Regional(r) => &r.base,
            RecordRef::Unit(u) => &u.base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_URI: &str = "data:image/png;base64,iVBORw0KGgo=";

    #[test]
    fn test_personnel_type_parse_and_tag() {
        assert_eq!("Regional".parse::<PersonnelType>(), Ok(PersonnelType::Regional));
        assert_eq!(" unit ".parse::<PersonnelType>(), Ok(PersonnelType::Unit));
        assert!("office".parse::<PersonnelType>().is_err());
        assert_eq!(PersonnelType::Unit.to_string(), "UNIT");
    }

    #[test]
    fn test_image_ref_shape() {
        let img = ImageRef::from_data_uri(PNG_URI).unwrap();
        assert_eq!(img.mime_type(), "image/png");
        assert_eq!(img.payload(), "iVBORw0KGgo=");

        assert!(ImageRef::from_data_uri("https://example.com/logo.png").is_err());
        assert!(ImageRef::from_data_uri("data:image/png;base64,").is_err());
        assert!(ImageRef::from_data_uri("data:image/png,rawbytes").is_err());
    }

    #[test]
    fn test_field_names_parse() {
        assert_eq!("rank-name".parse::<Field>(), Ok(Field::RankName));
        assert_eq!("JOB_FUNCTIONS".parse::<Field>(), Ok(Field::JobFunctions));
        assert_eq!("bjmp_logo".parse::<Field>(), Ok(Field::OrgLogo));
        assert!(matches!("salary".parse::<Field>(), Err(FieldError::Unknown(_))));
    }

    #[test]
    fn test_regional_set_fields() {
        let mut rec = RegionalRecord::default();
        rec.set(Field::Office, "Northeast Regional HQ".into()).unwrap();
        rec.set(Field::RankName, "Director Jane Doe".into()).unwrap();
        rec.set(Field::RegionalLogo, ImageRef::from_data_uri(PNG_URI).unwrap().into()).unwrap();
        assert_eq!(rec.office, "Northeast Regional HQ");
        assert_eq!(rec.base.rank_name, "Director Jane Doe");
        assert!(rec.regional_logo.is_some());

        rec.set(Field::RegionalLogo, FieldValue::Image(None)).unwrap();
        assert!(rec.regional_logo.is_none());
    }

    #[test]
    fn test_field_not_on_variant() {
        let mut rec = RegionalRecord::default();
        let err = rec.set(Field::JailUnit, "Manila City Jail".into()).unwrap_err();
        assert_eq!(
            err,
            FieldError::NotOnVariant {
                field: Field::JailUnit,
                variant: PersonnelType::Regional
            }
        );

        let mut unit = UnitRecord::default();
        assert!(unit.set(Field::Office, "HQ".into()).is_err());
        assert!(unit.set(Field::RegionalLogo, FieldValue::Image(None)).is_err());
    }

    #[test]
    fn test_type_mismatch_leaves_record_untouched() {
        let mut unit = UnitRecord::default();
        let err = unit.set(Field::Photo, "not an image".into()).unwrap_err();
        assert_eq!(err, FieldError::TypeMismatch { field: Field::Photo });
        assert!(unit.set(Field::Address, FieldValue::Image(None)).is_err());
        assert_eq!(unit, UnitRecord::default());
        assert!(err.to_string().contains("expects an image"));
    }

    #[test]
    fn test_text_fields_accept_any_string() {
        let mut unit = UnitRecord::default();
        unit.set(Field::JobFunctions, "  \n\t odd ✓ input ".into()).unwrap();
        assert_eq!(unit.base.job_functions, "  \n\t odd ✓ input ");
    }
}

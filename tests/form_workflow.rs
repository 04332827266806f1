use jobdesc::controller::RefineOutcome;
use jobdesc::document::{BodyContent, BuiltinLogo, ImageSource, PhotoSlot};
use jobdesc::form::{load_form, parse_form};
use jobdesc::model::{Field, FieldValue, PersonnelType};
use jobdesc::refine::{RefineError, Refiner};
use std::fs;

const FORM: &str = r#"
active = "regional"

[regional]
office = "Northeast Regional HQ"
rank_name = "Director Jane Doe"
designation = "Regional Director"
job_functions = "oversee operations\nreview budgets"

[unit]
jail_unit = "Manila City Jail"
address = "123 Street, Manila City"
"#;

#[test]
fn switching_variants_renders_each_record() {
    let mut form = parse_form(FORM, None).unwrap().into_controller();

    let doc = form.render();
    assert_eq!(doc.variant, PersonnelType::Regional);
    assert_eq!(doc.header.title.as_deref(), Some("NORTHEAST REGIONAL HQ"));
    assert_eq!(doc.header.address, None);
    assert_eq!(doc.banner.rank_name.text, "DIRECTOR JANE DOE");
    assert!(matches!(doc.banner.photo, PhotoSlot::Silhouette));

    form.select_variant(PersonnelType::Unit);
    let doc = form.render();
    assert_eq!(doc.variant, PersonnelType::Unit);
    assert_eq!(doc.header.title.as_deref(), Some("MANILA CITY JAIL"));
    assert_eq!(doc.header.address.as_deref(), Some("123 STREET, MANILA CITY"));
    assert!(doc.banner.rank_name.placeholder);
    assert!(matches!(doc.body.content, BodyContent::Placeholder(_)));
    assert!(matches!(
        doc.header.right_logo.source,
        ImageSource::Builtin(BuiltinLogo::Government)
    ));

    form.select_variant(PersonnelType::Regional);
    assert_eq!(form.regional().base.designation, "Regional Director");
}

#[test]
fn local_polish_then_render_keeps_lines() {
    let mut form = parse_form(FORM, None).unwrap().into_controller();
    assert_eq!(form.request_refine(&Refiner::local()), RefineOutcome::Applied);
    assert_eq!(
        form.regional().base.job_functions,
        "• oversee operations\n• review budgets"
    );
    match form.render().body.content {
        BodyContent::Text(text) => assert_eq!(text.lines().count(), 2),
        other => panic!("expected text body, got {:?}", other),
    }
}

#[test]
fn service_result_is_trimmed_and_stored() {
    let mut form = parse_form(FORM, None).unwrap().into_controller();
    let refiner = Refiner::with_service(|prompt: &str, _: f32| -> Result<String, RefineError> {
        assert!(prompt.contains("oversee operations"));
        Ok("\n• Oversees operations\n• Reviews budgets\n".to_string())
    });
    form.request_refine(&refiner);
    assert_eq!(
        form.regional().base.job_functions,
        "• Oversees operations\n• Reviews budgets"
    );
    assert_eq!(form.unit().base.job_functions, "");
}

#[test]
fn form_file_rejects_field_on_wrong_section() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("form.toml");
    fs::write(&path, "[regional]\njail_unit = \"x\"\n").unwrap();
    let err: jobdesc::JdError = load_form(&path).unwrap_err().into();
    assert!(err.to_string().contains("Form Error"));
}

#[test]
fn cleared_logo_falls_back_to_builtin() {
    let mut form = parse_form(FORM, None).unwrap().into_controller();
    form.set_field(PersonnelType::Regional, Field::OrgLogo, FieldValue::Image(None)).unwrap();
    let doc = form.render();
    assert!(matches!(
        doc.header.left_logos[0].source,
        ImageSource::Builtin(BuiltinLogo::Organization)
    ));
    assert_eq!(doc.header.left_logos[0].label, "Organization Logo");
}

//! Session state behind the form: both records, the active variant, the
//! view mode and the two busy flags.

use log::{debug, info};

use crate::document::{render, Document};
use crate::model::{
    BasePersonnelData, Field, FieldError, FieldValue, PersonnelType, RecordRef, RegionalRecord,
    UnitRecord,
};
use crate::pdf::{ExportArtifact, Exporter};
use crate::refine::Refiner;
use crate::JdError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Form,
    Preview,
}

/// What a refine request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefineOutcome {
    /// Job functions were empty
    Skipped,
    /// A refine is already running
    Busy,
    /// The result was written back
    Applied,
}

/// Proof that a refine is in flight. Returned by
/// [`FormController::begin_refine`] and consumed by
/// [`FormController::finish_refine`].
#[derive(Debug)]
pub struct RefineTicket {
    variant: PersonnelType,
    text: String,
}

impl RefineTicket {
    pub fn variant(&self) -> PersonnelType {
        self.variant
    }

    /// Job functions as they were when the refine started.
    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Default)]
pub struct FormController {
    active: PersonnelType,
    regional: RegionalRecord,
    unit: UnitRecord,
    view: ViewMode,
    refining: bool,
    exporting: bool,
}

impl FormController {
    /// Regional form, edit mode, both records empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from already filled records.
    pub fn with_records(active: PersonnelType, regional: RegionalRecord, unit: UnitRecord) -> Self {
        FormController {
            active,
            regional,
            unit,
            ..Self::default()
        }
    }

    pub fn active(&self) -> PersonnelType {
        self.active
    }

    pub fn view(&self) -> ViewMode {
        self.view
    }

    pub fn is_refining(&self) -> bool {
        self.refining
    }

    pub fn is_exporting(&self) -> bool {
        self.exporting
    }

    pub fn regional(&self) -> &RegionalRecord {
        &self.regional
    }

    pub fn unit(&self) -> &UnitRecord {
        &self.unit
    }

    pub fn active_record(&self) -> RecordRef<'_> {
        match self.active {
            PersonnelType::Regional => RecordRef::Regional(&self.regional),
            PersonnelType::Unit => RecordRef::Unit(&self.unit),
        }
    }

    pub fn active_base(&self) -> &BasePersonnelData {
        self.active_record().base()
    }

    /// Writes one field of either record. The other record is untouched.
    pub fn set_field(
        &mut self,
        variant: PersonnelType,
        field: Field,
        value: FieldValue,
    ) -> Result<(), FieldError> {
        debug!("set {} on {}", field, variant);
        match variant {
            PersonnelType::Regional => self.regional.set(field, value),
            PersonnelType::Unit => self.unit.set(field, value),
        }
    }

    /// Switches the active form. Neither record is cleared.
    pub fn select_variant(&mut self, variant: PersonnelType) {
        self.active = variant;
    }

    pub fn enter_preview(&mut self) {
        self.view = ViewMode::Preview;
    }

    pub fn exit_preview(&mut self) {
        self.view = ViewMode::Form;
    }

    pub fn render(&self) -> Document {
        render(self.active_record())
    }

    /// Marks a refine as started on the active record.
    ///
    /// Returns `None` while another refine runs or when there is nothing to
    /// refine.
    pub fn begin_refine(&mut self) -> Option<RefineTicket> {
        if self.refining {
            return None;
        }
        let text = self.active_base().job_functions.clone();
        if text.trim().is_empty() {
            return None;
        }
        self.refining = true;
        Some(RefineTicket {
            variant: self.active,
            text,
        })
    }

    /// Stores the refined text on the record the ticket was issued for and
    /// clears the busy flag.
    pub fn finish_refine(&mut self, ticket: RefineTicket, refined: String) {
        let base = match ticket.variant {
            PersonnelType::Regional => &mut self.regional.base,
            PersonnelType::Unit => &mut self.unit.base,
        };
        base.job_functions = refined;
        self.refining = false;
    }

    /// Runs `refiner` on the active job functions and writes the result back.
    pub fn request_refine(&mut self, refiner: &Refiner) -> RefineOutcome {
        if self.refining {
            return RefineOutcome::Busy;
        }
        let Some(ticket) = self.begin_refine() else {
            return RefineOutcome::Skipped;
        };
        let refined = refiner.refine(ticket.text());
        self.finish_refine(ticket, refined);
        RefineOutcome::Applied
    }

    /// Exports the active record. View mode and records are left as they were.
    pub fn export(&mut self, exporter: &Exporter) -> Result<ExportArtifact, JdError> {
        if self.exporting {
            return Err(JdError::Busy);
        }
        self.exporting = true;
        let doc = self.render();
        let result = exporter.export_into(&doc, None);
        self.exporting = false;

        let artifact = result.map_err(JdError::from)?;
        info!("Exported {}", artifact.path.display());
        Ok(artifact)
    }

    /// Sets the exporting flag, as a UI does while an export runs elsewhere.
    pub fn begin_export(&mut self) -> bool {
        if self.exporting {
            return false;
        }
        self.exporting = true;
        true
    }

    pub fn finish_export(&mut self) {
        self.exporting = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refine::RefineError;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_initial_state() {
        let c = FormController::new();
        assert_eq!(c.active(), PersonnelType::Regional);
        assert_eq!(c.view(), ViewMode::Form);
        assert!(!c.is_refining());
        assert!(!c.is_exporting());
        assert_eq!(c.regional(), &RegionalRecord::default());
        assert_eq!(c.unit(), &UnitRecord::default());
    }

    #[test]
    fn test_switching_preserves_both_records() {
        let mut c = FormController::new();
        c.set_field(PersonnelType::Regional, Field::Office, "Northeast Regional HQ".into())
            .unwrap();
        c.select_variant(PersonnelType::Unit);
        c.set_field(PersonnelType::Unit, Field::JailUnit, "Manila City Jail".into()).unwrap();
        let regional = c.regional().clone();
        let unit = c.unit().clone();

        c.select_variant(PersonnelType::Regional);
        c.select_variant(PersonnelType::Unit);
        c.select_variant(PersonnelType::Regional);
        assert_eq!(c.regional(), &regional);
        assert_eq!(c.unit(), &unit);
        assert_eq!(c.render().header.title.as_deref(), Some("NORTHEAST REGIONAL HQ"));
    }

    #[test]
    fn test_set_field_rejects_wrong_variant() {
        let mut c = FormController::new();
        assert!(c.set_field(PersonnelType::Regional, Field::Address, "x".into()).is_err());
        assert_eq!(c.regional(), &RegionalRecord::default());
    }

    #[test]
    fn test_preview_toggle_keeps_data() {
        let mut c = FormController::new();
        c.set_field(PersonnelType::Regional, Field::Designation, "Warden".into()).unwrap();
        c.enter_preview();
        assert_eq!(c.view(), ViewMode::Preview);
        c.exit_preview();
        assert_eq!(c.view(), ViewMode::Form);
        assert_eq!(c.regional().base.designation, "Warden");
    }

    #[test]
    fn test_refine_skipped_on_empty_text() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let refiner = Refiner::with_service(move |_: &str, _: f32| -> Result<String, RefineError> {
            counter.set(counter.get() + 1);
            Ok("x".to_string())
        });
        let mut c = FormController::new();
        c.set_field(PersonnelType::Regional, Field::JobFunctions, "   ".into()).unwrap();
        assert_eq!(c.request_refine(&refiner), RefineOutcome::Skipped);
        assert_eq!(calls.get(), 0);
        assert!(!c.is_refining());
    }

    #[test]
    fn test_local_refine_applies_bullets() {
        let mut c = FormController::new();
        c.select_variant(PersonnelType::Unit);
        c.set_field(PersonnelType::Unit, Field::JobFunctions, "task one\ntask two".into()).unwrap();
        assert_eq!(c.request_refine(&Refiner::local()), RefineOutcome::Applied);
        assert_eq!(c.unit().base.job_functions, "• task one\n• task two");
        assert_eq!(c.regional().base.job_functions, "");
        assert!(!c.is_refining());
    }

    #[test]
    fn test_second_refine_while_busy() {
        let mut c = FormController::new();
        c.set_field(PersonnelType::Regional, Field::JobFunctions, "notes".into()).unwrap();
        let ticket = c.begin_refine().unwrap();
        assert!(c.is_refining());
        assert!(c.begin_refine().is_none());
        assert_eq!(c.request_refine(&Refiner::local()), RefineOutcome::Busy);
        c.finish_refine(ticket, "• notes".to_string());
        assert!(!c.is_refining());
        assert_eq!(c.regional().base.job_functions, "• notes");
    }

    #[test]
    fn test_refine_result_goes_to_originating_variant() {
        let mut c = FormController::new();
        c.set_field(PersonnelType::Regional, Field::JobFunctions, "regional notes".into()).unwrap();
        let ticket = c.begin_refine().unwrap();
        assert_eq!(ticket.variant(), PersonnelType::Regional);
        c.select_variant(PersonnelType::Unit);
        c.finish_refine(ticket, "• regional notes".to_string());
        assert_eq!(c.regional().base.job_functions, "• regional notes");
        assert_eq!(c.unit().base.job_functions, "");
    }

    #[test]
    fn test_service_failure_keeps_original() {
        let refiner = Refiner::with_service(|_: &str, _: f32| -> Result<String, RefineError> {
            Err(RefineError::Network("offline".to_string()))
        });
        let mut c = FormController::new();
        c.set_field(PersonnelType::Regional, Field::JobFunctions, "some text".into()).unwrap();
        assert_eq!(c.request_refine(&refiner), RefineOutcome::Applied);
        assert_eq!(c.regional().base.job_functions, "some text");
    }

    #[test]
    fn test_export_while_busy_is_rejected() {
        let mut c = FormController::new();
        assert!(c.begin_export());
        assert!(!c.begin_export());
        let exporter = Exporter::new(crate::config::Settings::default()).with_fonts(None);
        assert!(matches!(c.export(&exporter), Err(JdError::Busy)));
        c.finish_export();
        assert!(!c.is_exporting());
    }
}

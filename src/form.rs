use chrono::NaiveDate;
use thiserror::Error;

use crate::{
    entity::{ColumnKind, Schema},
    record::{DATE_FORMAT, Record, RecordId, Value},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{label} is required")]
    Required { field: usize, label: &'static str },

    #[error("{label} must be a date like 2024-01-31, got {value:?}")]
    InvalidDate {
        field: usize,
        label: &'static str,
        value: String,
    },
}

impl ValidationError {
    /// Index of the offending field.
    pub fn field(&self) -> usize {
        match self {
            ValidationError::Required { field, .. } | ValidationError::InvalidDate { field, .. } => {
                *field
            }
        }
    }
}

/// Result of showing a form to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormOutcome {
    Submitted(Record),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub label: &'static str,
    pub kind: ColumnKind,
    pub required: bool,
    pub text: String,
}

/// Editable copy of one record's fields.
///
/// Every field is edited as text; [`RecordForm::confirm`] turns the texts
/// back into a [`Record`] without trimming or normalizing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordForm {
    schema: &'static Schema,
    target: Option<RecordId>,
    fields: Vec<FormField>,
}

impl RecordForm {
    /// Opens a form seeded from `existing`, or a blank one whose date fields
    /// default to `today`.
    pub fn open(schema: &'static Schema, existing: Option<&Record>, today: NaiveDate) -> Self {
        let fields = schema
            .columns
            .iter()
            .enumerate()
            .map(|(index, column)| {
                let text = match (existing.and_then(|record| record.value(index)), column.kind) {
                    (Some(value), _) => value.display(),
                    (None, ColumnKind::Text) => String::new(),
                    (None, ColumnKind::Date) => today.format(DATE_FORMAT).to_string(),
                };
                FormField {
                    label: column.label,
                    kind: column.kind,
                    required: column.required,
                    text,
                }
            })
            .collect();
        Self {
            schema,
            target: existing.and_then(|record| record.id),
            fields,
        }
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    /// Identity of the record being edited; `None` when creating.
    pub fn target(&self) -> Option<RecordId> {
        self.target
    }

    pub fn is_edit(&self) -> bool {
        self.target.is_some()
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn text(&self, index: usize) -> &str {
        self.fields
            .get(index)
            .map(|field| field.text.as_str())
            .unwrap_or_default()
    }

    pub fn set_text(&mut self, index: usize, text: impl Into<String>) {
        if let Some(field) = self.fields.get_mut(index) {
            field.text = text.into();
        }
    }

    pub fn set(&mut self, column: &str, text: impl Into<String>) {
        if let Some(index) = self.schema.column_index(column) {
            self.set_text(index, text);
        }
    }

    /// Reads every field verbatim into a record. Identity is unset for a new
    /// record and kept for an edited one.
    pub fn confirm(&self) -> Result<Record, ValidationError> {
        let mut values = Vec::with_capacity(self.fields.len());
        for (index, field) in self.fields.iter().enumerate() {
            if field.required && field.text.is_empty() {
                return Err(ValidationError::Required {
                    field: index,
                    label: field.label,
                });
            }
            let value = match field.kind {
                ColumnKind::Text => Value::Text(field.text.clone()),
                ColumnKind::Date => NaiveDate::parse_from_str(&field.text, DATE_FORMAT)
                    .map(Value::Date)
                    .map_err(|_| ValidationError::InvalidDate {
                        field: index,
                        label: field.label,
                        value: field.text.clone(),
                    })?,
            };
            values.push(value);
        }
        Ok(Record {
            id: self.target,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EMPLOYEE, ITEM};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
    }

    #[test]
    fn blank_form_defaults_date_to_today() {
        let form = RecordForm::open(&EMPLOYEE, None, today());
        assert!(!form.is_edit());
        assert_eq!(form.text(0), "");
        assert_eq!(form.text(6), "2024-05-17");
    }

    #[test]
    fn seeded_form_copies_every_field() {
        let mut record = Record::from_pairs(
            &EMPLOYEE,
            &[
                ("full_name", "Ivanov I.I."),
                ("passport_series", "AB"),
                ("company", "Acme"),
                ("start_date", "2020-02-29"),
            ],
            today(),
        );
        record.id = Some(RecordId(4));
        let form = RecordForm::open(&EMPLOYEE, Some(&record), today());
        assert_eq!(form.target(), Some(RecordId(4)));
        assert_eq!(form.text(0), "Ivanov I.I.");
        assert_eq!(form.text(1), "AB");
        assert_eq!(form.text(6), "2020-02-29");
        assert_eq!(form.confirm().unwrap(), record);
    }

    #[test]
    fn confirm_reads_text_verbatim() {
        let mut form = RecordForm::open(&EMPLOYEE, None, today());
        form.set("full_name", "  Petrov  ");
        let record = form.confirm().unwrap();
        assert_eq!(record.id, None);
        assert_eq!(record.text(0), "  Petrov  ");
    }

    #[test]
    fn employee_form_enforces_nothing() {
        let form = RecordForm::open(&EMPLOYEE, None, today());
        assert!(form.confirm().is_ok());
    }

    #[test]
    fn item_form_requires_name_and_description() {
        let mut form = RecordForm::open(&ITEM, None, today());
        assert_eq!(
            form.confirm(),
            Err(ValidationError::Required {
                field: 0,
                label: "Name"
            })
        );
        form.set("name", "Lamp");
        let err = form.confirm().unwrap_err();
        assert_eq!(err.field(), 1);
        form.set("description", "Desk lamp");
        assert!(form.confirm().is_ok());
    }

    #[test]
    fn invalid_date_is_rejected() {
        let mut form = RecordForm::open(&EMPLOYEE, None, today());
        form.set("start_date", "31.12.2023");
        let err = form.confirm().unwrap_err();
        assert_eq!(err.field(), 6);
        assert!(err.to_string().contains("Start date"));
    }
}

use std::fmt;

use chrono::NaiveDate;

use crate::entity::{ColumnKind, Schema};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Store-assigned identity of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Date(NaiveDate),
}

impl Value {
    pub fn kind(&self) -> ColumnKind {
        match self {
            Value::Text(_) => ColumnKind::Text,
            Value::Date(_) => ColumnKind::Date,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            Value::Date(_) => None,
        }
    }

    /// Form and storage representation of the value.
    pub fn display(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(text) => f.write_str(text),
            Value::Date(date) => write!(f, "{}", date.format(DATE_FORMAT)),
        }
    }
}

/// One row of an entity table.
///
/// `values` follows the column order of the entity [`Schema`]. `id` is `None`
/// until the store persists the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: Option<RecordId>,
    pub values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { id: None, values }
    }

    /// Builds an unsaved record from `(column, text)` pairs. Columns that are
    /// not mentioned get an empty text (or `default_date` for date columns).
    pub fn from_pairs(schema: &Schema, pairs: &[(&str, &str)], default_date: NaiveDate) -> Self {
        let values = schema
            .columns
            .iter()
            .map(|column| {
                let text = pairs
                    .iter()
                    .find(|(name, _)| *name == column.name)
                    .map(|(_, value)| *value);
                match column.kind {
                    ColumnKind::Text => Value::Text(text.unwrap_or_default().to_string()),
                    ColumnKind::Date => Value::Date(
                        text.and_then(|raw| NaiveDate::parse_from_str(raw, DATE_FORMAT).ok())
                            .unwrap_or(default_date),
                    ),
                }
            })
            .collect();
        Self::new(values)
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get(&self, schema: &Schema, column: &str) -> Option<&Value> {
        schema
            .column_index(column)
            .and_then(|index| self.values.get(index))
    }

    pub fn text(&self, index: usize) -> &str {
        self.values
            .get(index)
            .and_then(Value::as_text)
            .unwrap_or_default()
    }

    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    /// Field equality, ignoring identity.
    pub fn same_fields(&self, other: &Record) -> bool {
        self.values == other.values
    }

    /// Short human description, used by confirmation prompts.
    pub fn summary(&self, schema: &Schema) -> String {
        let name = self.text(schema.name_column);
        match self.id {
            Some(id) => format!("{name} ({id})"),
            None => name.to_string(),
        }
    }

    /// JSON object keyed by column name, with the identity under `id`.
    pub fn to_json(&self, schema: &Schema) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        if let Some(id) = self.id {
            object.insert("id".to_string(), serde_json::Value::from(id.0));
        }
        for (column, value) in schema.columns.iter().zip(&self.values) {
            object.insert(
                column.name.to_string(),
                serde_json::Value::String(value.display()),
            );
        }
        serde_json::Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EMPLOYEE, ITEM};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn from_pairs_fills_missing_columns() {
        let record = Record::from_pairs(
            &EMPLOYEE,
            &[("full_name", "Ivanov I.I."), ("company", "Acme")],
            date(2024, 3, 1),
        );
        assert_eq!(record.id, None);
        assert_eq!(record.text(0), "Ivanov I.I.");
        assert_eq!(record.text(1), "");
        assert_eq!(
            record.get(&EMPLOYEE, "start_date"),
            Some(&Value::Date(date(2024, 3, 1)))
        );
    }

    #[test]
    fn summary_includes_identity_once_persisted() {
        let record = Record::from_pairs(&ITEM, &[("name", "Lamp")], date(2024, 1, 1));
        assert_eq!(record.summary(&ITEM), "Lamp");
        let record = record.with_id(RecordId(7));
        assert_eq!(record.summary(&ITEM), "Lamp (#7)");
    }

    #[test]
    fn json_uses_column_names() {
        let record = Record::from_pairs(
            &EMPLOYEE,
            &[("full_name", "Petrov"), ("start_date", "2023-12-31")],
            date(2024, 1, 1),
        )
        .with_id(RecordId(3));
        let json = record.to_json(&EMPLOYEE);
        assert_eq!(json["id"], 3);
        assert_eq!(json["full_name"], "Petrov");
        assert_eq!(json["start_date"], "2023-12-31");
    }
}

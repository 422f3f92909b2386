use std::fmt;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// SQL column name.
    pub name: &'static str,
    /// Human label used by the table header and the form.
    pub label: &'static str,
    pub kind: ColumnKind,
    pub required: bool,
}

impl Column {
    const fn text(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            kind: ColumnKind::Text,
            required: false,
        }
    }

    const fn date(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            kind: ColumnKind::Date,
            required: false,
        }
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Describes the single table an entity lives in.
///
/// The schema is static data: column order is the order of values in a
/// [`crate::record::Record`], of headers in the table and of inputs in the
/// form.
#[derive(Debug, PartialEq, Eq)]
pub struct Schema {
    pub entity: Entity,
    pub table: &'static str,
    pub title: &'static str,
    pub columns: &'static [Column],
    /// Column searched by the name filter.
    pub name_column: usize,
    /// Column offered by the category filter, if the entity has one.
    pub category_column: Option<usize>,
    /// Whether the role policy applies to this entity.
    pub role_gated: bool,
}

impl Schema {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn name_column(&self) -> &Column {
        &self.columns[self.name_column]
    }

    pub fn category_column(&self) -> Option<&Column> {
        self.category_column.map(|index| &self.columns[index])
    }

    pub fn required_columns(&self) -> impl Iterator<Item = (usize, &Column)> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.required)
    }

    pub(crate) fn create_table_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|column| format!("{} TEXT NOT NULL", column.name))
            .collect::<Vec<_>>()
            .join(",\n    ");
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    id INTEGER PRIMARY KEY AUTOINCREMENT,\n    {columns}\n);",
            self.table
        )
    }
}

static EMPLOYEE_COLUMNS: [Column; 7] = [
    Column::text("full_name", "Full name"),
    Column::text("passport_series", "Passport series"),
    Column::text("passport_number", "Passport number"),
    Column::text("address", "Address"),
    Column::text("company", "Company"),
    Column::text("position", "Position"),
    Column::date("start_date", "Start date"),
];

static ITEM_COLUMNS: [Column; 2] = [
    Column::text("name", "Name").required(),
    Column::text("description", "Description").required(),
];

pub static EMPLOYEE: Schema = Schema {
    entity: Entity::Employee,
    table: "employees",
    title: "Employees",
    columns: &EMPLOYEE_COLUMNS,
    name_column: 0,
    category_column: Some(4),
    role_gated: true,
};

pub static ITEM: Schema = Schema {
    entity: Entity::Item,
    table: "items",
    title: "Items",
    columns: &ITEM_COLUMNS,
    name_column: 0,
    category_column: None,
    role_gated: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Entity {
    #[default]
    Employee,
    Item,
}

impl Entity {
    pub fn schema(self) -> &'static Schema {
        match self {
            Entity::Employee => &EMPLOYEE,
            Entity::Item => &ITEM,
        }
    }

    pub fn all() -> [Entity; 2] {
        [Entity::Employee, Entity::Item]
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Employee => write!(f, "employee"),
            Entity::Item => write!(f, "item"),
        }
    }
}

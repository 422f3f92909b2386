use crate::{entity::Schema, record::Record};

/// Name of the connection-local SQL function used for case-insensitive
/// matching. Registered by the store on every connection it opens.
pub const CASEFOLD_FN: &str = "casefold";

/// Folds text for case-insensitive comparison. Used both by the SQL function
/// and by the in-memory predicate so they agree on non-ASCII names.
pub fn casefold(text: &str) -> String {
    text.to_lowercase()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    Exact(String),
}

impl CategoryFilter {
    pub fn label(&self) -> &str {
        match self {
            CategoryFilter::All => "all",
            CategoryFilter::Exact(value) => value,
        }
    }
}

/// Search criteria applied to every listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub name_contains: String,
    pub category: CategoryFilter,
}

impl FilterState {
    pub fn new(name_contains: impl Into<String>, category: CategoryFilter) -> Self {
        Self {
            name_contains: name_contains.into(),
            category,
        }
    }

    pub fn by_name(name_contains: impl Into<String>) -> Self {
        Self::new(name_contains, CategoryFilter::All)
    }

    pub fn by_category(value: impl Into<String>) -> Self {
        Self::new(String::new(), CategoryFilter::Exact(value.into()))
    }

    /// The name needle as the store sees it: trimmed and case folded.
    /// `None` means the name predicate is vacuous.
    pub fn name_needle(&self) -> Option<String> {
        let trimmed = self.name_contains.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(casefold(trimmed))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name_needle().is_none() && self.category == CategoryFilter::All
    }

    /// In-memory form of the predicate built by [`ListQuery::build`].
    pub fn matches(&self, schema: &Schema, record: &Record) -> bool {
        if let Some(needle) = self.name_needle()
            && !casefold(record.text(schema.name_column)).contains(&needle)
        {
            return false;
        }
        match (&self.category, schema.category_column) {
            (CategoryFilter::Exact(value), Some(index)) => record.text(index) == value,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Integer(i64),
}

impl rusqlite::ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        match self {
            SqlParam::Text(text) => text.to_sql(),
            SqlParam::Integer(value) => value.to_sql(),
        }
    }
}

/// A parameterized SQL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl ListQuery {
    /// Composes the listing query for `filter`. Rows come back in identity
    /// order so repeated listings of unchanged data are identical.
    pub fn build(schema: &Schema, filter: &FilterState) -> Self {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        if let Some(needle) = filter.name_needle() {
            params.push(SqlParam::Text(needle));
            clauses.push(format!(
                "instr({CASEFOLD_FN}({}), ?{}) > 0",
                schema.name_column().name,
                params.len()
            ));
        }

        if let (CategoryFilter::Exact(value), Some(column)) =
            (&filter.category, schema.category_column())
        {
            params.push(SqlParam::Text(value.clone()));
            clauses.push(format!("{} = ?{}", column.name, params.len()));
        }

        let mut sql = format!("SELECT {} FROM {}", select_list(schema), schema.table);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id");
        Self { sql, params }
    }

    pub fn by_id(schema: &Schema, id: i64) -> Self {
        Self {
            sql: format!(
                "SELECT {} FROM {} WHERE id = ?1",
                select_list(schema),
                schema.table
            ),
            params: vec![SqlParam::Integer(id)],
        }
    }

    pub fn distinct(schema: &Schema, column: &str) -> Self {
        Self {
            sql: format!(
                "SELECT DISTINCT {column} FROM {table} ORDER BY {column}",
                table = schema.table
            ),
            params: Vec::new(),
        }
    }

    pub fn params(&self) -> rusqlite::ParamsFromIter<std::slice::Iter<'_, SqlParam>> {
        rusqlite::params_from_iter(self.params.iter())
    }
}

pub(crate) fn select_list(schema: &Schema) -> String {
    std::iter::once("id")
        .chain(schema.columns.iter().map(|column| column.name))
        .collect::<Vec<_>>()
        .join(", ")
}

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::NaiveDate;
use rusqlite::{Connection, OpenFlags, Row, Transaction, functions::FunctionFlags, types::Type};
use thiserror::Error;

use crate::{
    entity::{ColumnKind, Schema},
    error::{Error, Result},
    query::{self, CASEFOLD_FN, FilterState, ListQuery, SqlParam},
    record::{DATE_FORMAT, Record, RecordId, Value},
};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Gateway operations, carried by every [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Open,
    EnsureSchema,
    List,
    Distinct,
    Get,
    Create,
    Update,
    Delete,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOp::Open => "open",
            StoreOp::EnsureSchema => "ensure schema",
            StoreOp::List => "list",
            StoreOp::Distinct => "distinct values",
            StoreOp::Get => "get",
            StoreOp::Create => "create",
            StoreOp::Update => "update",
            StoreOp::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid database url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: &'static str },

    #[error("cannot prepare database directory {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{operation} failed: {source}")]
    Sqlite {
        operation: StoreOp,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{operation} failed: {reason}")]
    Shape {
        operation: StoreOp,
        reason: String,
    },
}

impl StoreError {
    pub fn operation(&self) -> Option<StoreOp> {
        match self {
            StoreError::Sqlite { operation, .. } | StoreError::Shape { operation, .. } => {
                Some(*operation)
            }
            StoreError::InvalidUrl { .. } | StoreError::Io { .. } => None,
        }
    }

    fn sqlite(operation: StoreOp) -> impl FnOnce(rusqlite::Error) -> StoreError {
        move |source| StoreError::Sqlite { operation, source }
    }
}

/// The record gateway. Implementations hold no connection between calls and
/// apply each mutation atomically.
pub trait RecordStore: Send + Sync {
    fn schema(&self) -> &'static Schema;

    fn list(&self, filter: &FilterState) -> Result<Vec<Record>>;

    /// Distinct values of `column`, sorted.
    fn distinct_values(&self, column: &str) -> Result<Vec<String>>;

    fn get(&self, id: RecordId) -> Result<Record>;

    /// Persists `record` and returns it with its new identity.
    fn create(&self, record: &Record) -> Result<Record>;

    /// Overwrites every field of the record identified by `id`.
    fn update(&self, id: RecordId, record: &Record) -> Result<()>;

    fn delete(&self, id: RecordId) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Parses a connection string: `sqlite://<path>`, `sqlite:<path>` or a
    /// bare path.
    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        let invalid = |reason| StoreError::InvalidUrl {
            url: url.to_string(),
            reason,
        };
        let trimmed = url.trim();
        let path = if let Some(rest) = trimmed.strip_prefix("sqlite://") {
            rest
        } else if let Some(rest) = trimmed.strip_prefix("sqlite:") {
            rest
        } else if trimmed.contains("://") {
            return Err(invalid("only sqlite:// urls are supported"));
        } else {
            trimmed
        };
        if path.is_empty() {
            return Err(invalid("database path is empty"));
        }
        if path == ":memory:" || path.contains("mode=memory") {
            return Err(invalid(
                "in-memory databases are not shared between connections",
            ));
        }
        Ok(Self::new(path))
    }
}

/// SQLite gateway for one entity table. Every call opens its own connection
/// and runs inside a transaction that is rolled back unless committed.
#[derive(Debug)]
pub struct SqliteStore {
    config: StoreConfig,
    schema: &'static Schema,
}

impl SqliteStore {
    /// Opens the store and creates the entity table if it does not exist.
    pub fn open(config: StoreConfig, schema: &'static Schema) -> Result<Self, StoreError> {
        ensure_parent_dir(&config.path)?;
        let store = Self { config, schema };
        store.transaction(StoreOp::EnsureSchema, |tx| {
            tx.execute_batch(&schema.create_table_sql())
        })?;
        tracing::debug!(
            path = %store.config.path.display(),
            table = schema.table,
            "store_ready"
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let connection = Connection::open_with_flags(
            &self.config.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(StoreError::sqlite(StoreOp::Open))?;
        connection
            .busy_timeout(self.config.busy_timeout)
            .map_err(StoreError::sqlite(StoreOp::Open))?;
        connection
            .create_scalar_function(
                CASEFOLD_FN,
                1,
                FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
                |ctx| {
                    let text = ctx.get::<Option<String>>(0)?;
                    Ok(text.map(|text| query::casefold(&text)))
                },
            )
            .map_err(StoreError::sqlite(StoreOp::Open))?;
        Ok(connection)
    }

    fn transaction<T>(
        &self,
        operation: StoreOp,
        f: impl FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let span = tracing::trace_span!("store", op = %operation, table = self.schema.table);
        let _guard = span.enter();
        let mut connection = self.connect()?;
        let result = (|| -> rusqlite::Result<T> {
            let tx = connection.transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })();
        result.map_err(|source| {
            tracing::error!(op = %operation, error = %source, "store_error");
            StoreError::Sqlite { operation, source }
        })
    }

    fn check_shape(&self, operation: StoreOp, record: &Record) -> Result<(), StoreError> {
        if record.values.len() != self.schema.columns.len() {
            return Err(StoreError::Shape {
                operation,
                reason: format!(
                    "expected {} fields, got {}",
                    self.schema.columns.len(),
                    record.values.len()
                ),
            });
        }
        for (column, value) in self.schema.columns.iter().zip(&record.values) {
            if column.kind != value.kind() {
                return Err(StoreError::Shape {
                    operation,
                    reason: format!("field {} has the wrong type", column.name),
                });
            }
        }
        Ok(())
    }

    fn query_records(
        &self,
        operation: StoreOp,
        query: &ListQuery,
    ) -> Result<Vec<Record>, StoreError> {
        let schema = self.schema;
        self.transaction(operation, |tx| {
            let mut statement = tx.prepare(&query.sql)?;
            let rows = statement.query_map(query.params(), |row| read_record(schema, row))?;
            rows.collect()
        })
    }
}

impl RecordStore for SqliteStore {
    fn schema(&self) -> &'static Schema {
        self.schema
    }

    fn list(&self, filter: &FilterState) -> Result<Vec<Record>> {
        let query = ListQuery::build(self.schema, filter);
        tracing::trace!(sql = %query.sql, params = ?query.params, "list");
        let records = self.query_records(StoreOp::List, &query)?;
        tracing::debug!(rows = records.len(), "list_ok");
        Ok(records)
    }

    fn distinct_values(&self, column: &str) -> Result<Vec<String>> {
        if self.schema.column_index(column).is_none() {
            return Err(StoreError::Shape {
                operation: StoreOp::Distinct,
                reason: format!("unknown column {column}"),
            }
            .into());
        }
        let query = ListQuery::distinct(self.schema, column);
        let values = self.transaction(StoreOp::Distinct, |tx| {
            let mut statement = tx.prepare(&query.sql)?;
            let rows = statement.query_map(query.params(), |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;
        Ok(values)
    }

    fn get(&self, id: RecordId) -> Result<Record> {
        let query = ListQuery::by_id(self.schema, id.0);
        self.query_records(StoreOp::Get, &query)?
            .into_iter()
            .next()
            .ok_or(Error::NotFound(id))
    }

    fn create(&self, record: &Record) -> Result<Record> {
        self.check_shape(StoreOp::Create, record)?;
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.schema.table,
            column_list(self.schema),
            placeholders(self.schema.columns.len()),
        );
        let params = text_params(record);
        let id = self.transaction(StoreOp::Create, |tx| {
            tx.execute(&sql, rusqlite::params_from_iter(params.iter()))?;
            Ok(tx.last_insert_rowid())
        })?;
        let id = RecordId(id);
        tracing::debug!(id = id.0, "create_ok");
        Ok(record.clone().with_id(id))
    }

    fn update(&self, id: RecordId, record: &Record) -> Result<()> {
        self.check_shape(StoreOp::Update, record)?;
        let assignments = self
            .schema
            .columns
            .iter()
            .enumerate()
            .map(|(index, column)| format!("{} = ?{}", column.name, index + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE id = ?{}",
            self.schema.table,
            self.schema.columns.len() + 1
        );
        let mut params: Vec<SqlParam> = text_params(record)
            .into_iter()
            .map(SqlParam::Text)
            .collect();
        params.push(SqlParam::Integer(id.0));
        let changed = self.transaction(StoreOp::Update, |tx| {
            tx.execute(&sql, rusqlite::params_from_iter(params.iter()))
        })?;
        if changed == 0 {
            return Err(Error::NotFound(id));
        }
        tracing::debug!(id = id.0, "update_ok");
        Ok(())
    }

    fn delete(&self, id: RecordId) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", self.schema.table);
        let changed = self.transaction(StoreOp::Delete, |tx| tx.execute(&sql, [id.0]))?;
        if changed == 0 {
            return Err(Error::NotFound(id));
        }
        tracing::debug!(id = id.0, "delete_ok");
        Ok(())
    }
}

fn read_record(schema: &Schema, row: &Row<'_>) -> rusqlite::Result<Record> {
    let id = RecordId(row.get(0)?);
    let mut values = Vec::with_capacity(schema.columns.len());
    for (offset, column) in schema.columns.iter().enumerate() {
        let index = offset + 1;
        let text: String = row.get(index)?;
        let value = match column.kind {
            ColumnKind::Text => Value::Text(text),
            ColumnKind::Date => NaiveDate::parse_from_str(&text, DATE_FORMAT)
                .map(Value::Date)
                .map_err(|err| {
                    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
                })?,
        };
        values.push(value);
    }
    Ok(Record {
        id: Some(id),
        values,
    })
}

fn column_list(schema: &Schema) -> String {
    schema
        .columns
        .iter()
        .map(|column| column.name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn text_params(record: &Record) -> Vec<String> {
    record.values.iter().map(Value::display).collect()
}

fn ensure_parent_dir(path: &Path) -> Result<(), StoreError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(parent).map_err(|source| StoreError::Io {
        path: parent.to_path_buf(),
        source,
    })
}

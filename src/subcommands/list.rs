use color_eyre::{Result, eyre::WrapErr};

use rolodex::{query::CategoryFilter, role::Role, store::RecordStore, table::RecordTable};

pub struct Options {
    pub name: Option<String>,
    pub company: Option<String>,
    pub role: Option<Role>,
    pub json: bool,
}

/// Prints the filtered listing without starting the terminal UI.
pub fn command(store: &dyn RecordStore, options: Options) -> Result<()> {
    let schema = store.schema();
    let mut table = RecordTable::new(schema, Some(options.role.unwrap_or(Role::Viewer)));
    if let Some(name) = options.name {
        table.set_name_filter(name);
    }
    if let Some(company) = options.company {
        table.set_category(CategoryFilter::Exact(company));
    }

    let span = tracing::debug_span!("list", table = schema.table, filter = ?table.filter());
    let _guard = span.enter();
    table
        .reload(store)
        .wrap_err_with(|| format!("cannot list {}", schema.table))?;

    let records = table.records();
    if options.json {
        let rows: Vec<_> = records.iter().map(|record| record.to_json(schema)).collect();
        println!("{}", serde_json::to_string(&rows)?);
        return Ok(());
    }

    let header: Vec<&str> = std::iter::once("id")
        .chain(schema.columns.iter().map(|column| column.label))
        .collect();
    println!("{}", header.join(" | "));
    for record in records {
        let id = record.id.map(|id| id.0.to_string()).unwrap_or_default();
        let row: Vec<String> = std::iter::once(id)
            .chain(record.values.iter().map(ToString::to_string))
            .collect();
        println!("{}", row.join(" | "));
    }
    Ok(())
}

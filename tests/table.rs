use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;
use rolodex::{
    Error,
    entity::{EMPLOYEE, ITEM, Schema},
    form::{FormOutcome, RecordForm},
    query::{CategoryFilter, FilterState},
    record::{Record, RecordId, Value},
    role::{Operation, Role},
    store::{RecordStore, SqliteStore, StoreConfig},
    table::{Phase, RecordTable},
};
use tempfile::TempDir;

/// Wraps a real store and counts every call that reaches it.
struct CountingStore {
    inner: SqliteStore,
    calls: AtomicUsize,
    mutations: AtomicUsize,
}

impl CountingStore {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn read(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn write(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

impl RecordStore for CountingStore {
    fn schema(&self) -> &'static Schema {
        self.inner.schema()
    }

    fn list(&self, filter: &FilterState) -> rolodex::Result<Vec<Record>> {
        self.read();
        self.inner.list(filter)
    }

    fn distinct_values(&self, column: &str) -> rolodex::Result<Vec<String>> {
        self.read();
        self.inner.distinct_values(column)
    }

    fn get(&self, id: RecordId) -> rolodex::Result<Record> {
        self.read();
        self.inner.get(id)
    }

    fn create(&self, record: &Record) -> rolodex::Result<Record> {
        self.write();
        self.inner.create(record)
    }

    fn update(&self, id: RecordId, record: &Record) -> rolodex::Result<()> {
        self.write();
        self.inner.update(id, record)
    }

    fn delete(&self, id: RecordId) -> rolodex::Result<()> {
        self.write();
        self.inner.delete(id)
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 20).unwrap()
}

fn store(schema: &'static Schema) -> (TempDir, CountingStore) {
    let dir = tempfile::tempdir().unwrap();
    let inner = SqliteStore::open(StoreConfig::new(dir.path().join("table.db")), schema).unwrap();
    let store = CountingStore {
        inner,
        calls: AtomicUsize::new(0),
        mutations: AtomicUsize::new(0),
    };
    (dir, store)
}

fn seed(store: &CountingStore, rows: &[(&str, &str)]) {
    for (name, company) in rows {
        store
            .inner
            .create(&Record::from_pairs(
                &EMPLOYEE,
                &[("full_name", name), ("company", company)],
                today(),
            ))
            .unwrap();
    }
}

fn fill(
    pairs: &'static [(&'static str, &'static str)],
) -> impl FnOnce(RecordForm) -> Result<FormOutcome, rolodex::form::ValidationError> {
    move |mut form| {
        for (column, text) in pairs {
            form.set(column, *text);
        }
        form.confirm().map(FormOutcome::Submitted)
    }
}

fn names(table: &RecordTable) -> Vec<&str> {
    table.records().iter().map(|record| record.text(0)).collect()
}

#[test]
fn adding_an_employee_lists_it_and_its_company() {
    let (_dir, store) = store(&EMPLOYEE);
    let mut table = RecordTable::new(&EMPLOYEE, Some(Role::Administrator));
    table.reload(&store).unwrap();
    assert!(table.records().is_empty());
    assert!(table.categories().is_empty());

    let saved = table
        .add(
            &store,
            today(),
            fill(&[
                ("full_name", "Ivanov Ivan"),
                ("passport_series", "4500"),
                ("passport_number", "123456"),
                ("company", "Acme"),
                ("start_date", "2023-09-01"),
            ]),
        )
        .unwrap();

    assert!(saved);
    assert_eq!(names(&table), vec!["Ivanov Ivan"]);
    let record = &table.records()[0];
    assert!(record.id.is_some());
    for (column, expected) in [
        ("passport_series", Value::Text("4500".into())),
        ("passport_number", Value::Text("123456".into())),
        ("address", Value::Text(String::new())),
        ("company", Value::Text("Acme".into())),
        ("position", Value::Text(String::new())),
        (
            "start_date",
            Value::Date(NaiveDate::from_ymd_opt(2023, 9, 1).unwrap()),
        ),
    ] {
        assert_eq!(record.get(&EMPLOYEE, column), Some(&expected), "{column}");
    }
    assert_eq!(store.inner.get(record.id.unwrap()).unwrap(), *record);
    assert_eq!(table.categories(), ["Acme".to_string()]);
    assert_eq!(table.selected(), Some(0));
    assert_eq!(table.phase(), Phase::Idle);
}

#[test]
fn category_filter_narrows_the_listing() {
    let (_dir, store) = store(&EMPLOYEE);
    seed(&store, &[("A", "Acme"), ("B", "Globex"), ("C", "Acme")]);
    let mut table = RecordTable::new(&EMPLOYEE, Some(Role::Viewer));

    table.set_category(CategoryFilter::Exact("Acme".into()));
    table.reload(&store).unwrap();
    assert_eq!(names(&table), vec!["A", "C"]);
    assert_eq!(table.categories(), ["Acme".to_string(), "Globex".to_string()]);

    table.set_name_filter("c");
    table.reload(&store).unwrap();
    assert_eq!(names(&table), vec!["C"]);

    table.set_category(CategoryFilter::All);
    table.set_name_filter("");
    table.reload(&store).unwrap();
    assert_eq!(names(&table).len(), 3);
}

#[test]
fn viewer_cannot_delete_and_the_store_is_not_called() {
    let (_dir, store) = store(&EMPLOYEE);
    seed(&store, &[("Ivanov", "Acme")]);
    let mut table = RecordTable::new(&EMPLOYEE, Some(Role::Viewer));
    table.reload(&store).unwrap();
    let calls = store.calls();

    let err = table
        .delete(&store, |_| panic!("no confirmation for a forbidden delete"))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Forbidden {
            operation: Operation::Delete,
            ..
        }
    ));
    assert!(err.is_warning());
    assert_eq!(store.calls(), calls);
    assert_eq!(names(&table), vec!["Ivanov"]);
}

#[test]
fn manager_can_create_but_not_edit() {
    let (_dir, store) = store(&EMPLOYEE);
    seed(&store, &[("Ivanov", "Acme")]);
    let mut table = RecordTable::new(&EMPLOYEE, Some(Role::Manager));
    table.reload(&store).unwrap();

    assert!(
        table
            .add(&store, today(), fill(&[("full_name", "Petrov")]))
            .unwrap()
    );
    let calls = store.calls();
    let err = table
        .edit(&store, today(), |_| panic!("no form for a forbidden edit"))
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden { .. }));
    assert_eq!(store.calls(), calls);
    assert_eq!(names(&table), vec!["Ivanov", "Petrov"]);
}

#[test]
fn editing_the_company_moves_the_record_between_categories() {
    let (_dir, store) = store(&EMPLOYEE);
    seed(&store, &[("Ivanov", "Acme"), ("Petrov", "Acme")]);
    let mut table = RecordTable::new(&EMPLOYEE, Some(Role::Administrator));
    table.reload(&store).unwrap();
    table.select(Some(1));

    let saved = table
        .edit(&store, today(), |mut form| {
            assert!(form.is_edit());
            assert_eq!(form.text(0), "Petrov");
            form.set("company", "Globex");
            form.confirm().map(FormOutcome::Submitted)
        })
        .unwrap();
    assert!(saved);
    assert_eq!(table.selected_record().map(|record| record.text(0)), Some("Petrov"));
    assert_eq!(
        table.categories(),
        ["Acme".to_string(), "Globex".to_string()]
    );

    table.set_category(CategoryFilter::Exact("Acme".into()));
    table.reload(&store).unwrap();
    assert_eq!(names(&table), vec!["Ivanov"]);
}

#[test]
fn edit_uses_the_row_identity_not_its_values() {
    let (_dir, store) = store(&EMPLOYEE);
    // Identical values on both rows.
    seed(&store, &[("Twin", "Acme"), ("Twin", "Acme")]);
    let mut table = RecordTable::new(&EMPLOYEE, Some(Role::Administrator));
    table.reload(&store).unwrap();
    table.select(Some(1));
    let second = table.selected_record().and_then(|record| record.id);

    table
        .edit(&store, today(), fill(&[("company", "Globex")]))
        .unwrap();

    let moved = store
        .inner
        .list(&FilterState::by_category("Globex"))
        .unwrap();
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].id, second);
}

#[test]
fn declined_delete_keeps_the_record() {
    let (_dir, store) = store(&EMPLOYEE);
    seed(&store, &[("Ivanov", "Acme")]);
    let mut table = RecordTable::new(&EMPLOYEE, Some(Role::Administrator));
    table.reload(&store).unwrap();

    let mut prompted = None;
    let deleted = table
        .delete(&store, |target| {
            prompted = Some(target.summary.clone());
            false
        })
        .unwrap();
    assert!(!deleted);
    assert_eq!(prompted.as_deref(), Some("Ivanov (#1)"));
    assert_eq!(store.mutations(), 0);
    assert_eq!(store.inner.list(&FilterState::default()).unwrap().len(), 1);
}

#[test]
fn confirmed_delete_removes_the_record_and_clamps_selection() {
    let (_dir, store) = store(&EMPLOYEE);
    seed(&store, &[("A", "Acme"), ("B", "Acme")]);
    let mut table = RecordTable::new(&EMPLOYEE, Some(Role::Administrator));
    table.reload(&store).unwrap();
    table.select(Some(1));

    assert!(table.delete(&store, |_| true).unwrap());
    assert_eq!(names(&table), vec!["A"]);
    assert_eq!(table.selected(), Some(0));
}

#[test]
fn delete_without_selection_is_a_warning() {
    let (_dir, store) = store(&EMPLOYEE);
    let mut table = RecordTable::new(&EMPLOYEE, Some(Role::Administrator));
    table.reload(&store).unwrap();
    let calls = store.calls();

    let err = table.delete(&store, |_| true).unwrap_err();
    assert!(matches!(err, Error::Selection(Operation::Delete)));
    assert!(err.is_warning());
    assert_eq!(store.calls(), calls);
}

#[test]
fn missing_required_field_never_reaches_the_store() {
    let (_dir, store) = store(&ITEM);
    let mut table = RecordTable::new(&ITEM, None);
    table.reload(&store).unwrap();

    let err = table
        .add(&store, today(), fill(&[("name", "Lamp")]))
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(store.mutations(), 0);
    assert_eq!(table.phase(), Phase::Idle);
}

#[test]
fn editing_a_record_deleted_elsewhere_reports_not_found() {
    let (_dir, store) = store(&EMPLOYEE);
    seed(&store, &[("Ivanov", "Acme")]);
    let mut table = RecordTable::new(&EMPLOYEE, Some(Role::Administrator));
    table.reload(&store).unwrap();
    store.inner.delete(RecordId(1)).unwrap();

    let err = table
        .edit(&store, today(), |_| panic!("no form for a missing record"))
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(RecordId(1))));
    assert!(!err.is_warning());
}

#[test]
fn a_second_mutation_waits_for_the_first() {
    let (_dir, store) = store(&ITEM);
    let mut table = RecordTable::new(&ITEM, None);
    table.reload(&store).unwrap();

    let mut form = table.begin_add(today()).unwrap();
    form.set("name", "Lamp");
    form.set("description", "Desk lamp");
    let record = form.confirm().unwrap();
    let mutation = table
        .submit(FormOutcome::Submitted(record.clone()))
        .unwrap()
        .unwrap();
    assert_eq!(table.phase(), Phase::Mutating);

    assert!(matches!(table.begin_add(today()), Err(Error::Busy)));
    assert!(matches!(
        table.submit(FormOutcome::Submitted(record)),
        Err(Error::Busy)
    ));

    let follow = mutation.apply(&store);
    let request = table.finish_mutation(follow).unwrap();
    let snapshot = request.run(&store);
    assert!(table.finish_reload(request.id, snapshot).unwrap());
    assert_eq!(table.records().len(), 1);
    assert_eq!(store.mutations(), 1);
}

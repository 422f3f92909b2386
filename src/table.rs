use chrono::NaiveDate;

use crate::{
    entity::Schema,
    error::{Error, Result},
    form::{FormOutcome, RecordForm, ValidationError},
    query::{CategoryFilter, FilterState},
    record::{Record, RecordId},
    role::{Operation, Permissions, Role, session_permissions},
    store::RecordStore,
};

/// What the controller is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Reloading,
    Mutating,
}

/// Last listing returned by the store, replaced wholesale on every reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub records: Vec<Record>,
    pub categories: Vec<String>,
}

/// A numbered listing request. Only the most recent one is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadRequest {
    pub id: u64,
    pub filter: FilterState,
}

impl ReloadRequest {
    /// Lists the records and, for entities with a category column, the
    /// categories to offer in the filter.
    pub fn run(&self, store: &dyn RecordStore) -> Result<Snapshot> {
        let records = store.list(&self.filter)?;
        let categories = match store.schema().category_column() {
            Some(column) => store.distinct_values(column.name)?,
            None => Vec::new(),
        };
        Ok(Snapshot {
            records,
            categories,
        })
    }
}

/// Resolves the selected row to its persisted record before editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditRequest {
    pub id: RecordId,
}

impl EditRequest {
    pub fn resolve(&self, store: &dyn RecordStore, today: NaiveDate) -> Result<RecordForm> {
        let record = store.get(self.id)?;
        Ok(RecordForm::open(store.schema(), Some(&record), today))
    }
}

/// Record awaiting a yes/no confirmation before deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTarget {
    pub id: RecordId,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create(Record),
    Update { id: RecordId, record: Record },
    Delete(RecordId),
}

impl Mutation {
    pub fn operation(&self) -> Operation {
        match self {
            Mutation::Create(_) => Operation::Create,
            Mutation::Update { .. } => Operation::Edit,
            Mutation::Delete(_) => Operation::Delete,
        }
    }

    /// Runs the mutation. Returns the identity the selection should follow
    /// afterwards, if any.
    pub fn apply(&self, store: &dyn RecordStore) -> Result<Option<RecordId>> {
        match self {
            Mutation::Create(record) => Ok(store.create(record)?.id),
            Mutation::Update { id, record } => store.update(*id, record).map(|()| Some(*id)),
            Mutation::Delete(id) => store.delete(*id).map(|()| None),
        }
    }
}

/// Controller behind the records view.
///
/// The phased API (`request_reload`, `begin_*`, `submit`, `finish_*`) keeps
/// store calls outside the controller so they can run on another thread;
/// `reload`, `add`, `edit` and `delete` chain the phases for blocking
/// callers.
#[derive(Debug)]
pub struct RecordTable {
    schema: &'static Schema,
    role: Option<Role>,
    permissions: Permissions,
    filter: FilterState,
    snapshot: Snapshot,
    selected: Option<usize>,
    follow: Option<RecordId>,
    next_request: u64,
    pending_reload: Option<u64>,
    mutating: bool,
}

impl RecordTable {
    pub fn new(schema: &'static Schema, role: Option<Role>) -> Self {
        let permissions = session_permissions(role, schema.role_gated);
        tracing::debug!(entity = %schema.entity, ?role, ?permissions, "table_new");
        Self {
            schema,
            role,
            permissions,
            filter: FilterState::default(),
            snapshot: Snapshot::default(),
            selected: None,
            follow: None,
            next_request: 0,
            pending_reload: None,
            mutating: false,
        }
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn can(&self, operation: Operation) -> bool {
        self.permissions.allows(operation)
    }

    pub fn phase(&self) -> Phase {
        if self.mutating {
            Phase::Mutating
        } else if self.pending_reload.is_some() {
            Phase::Reloading
        } else {
            Phase::Idle
        }
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn set_name_filter(&mut self, text: impl Into<String>) {
        self.filter.name_contains = text.into();
    }

    pub fn set_category(&mut self, category: CategoryFilter) {
        self.filter.category = category;
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn records(&self) -> &[Record] {
        &self.snapshot.records
    }

    pub fn categories(&self) -> &[String] {
        &self.snapshot.categories
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_record(&self) -> Option<&Record> {
        self.selected.and_then(|index| self.snapshot.records.get(index))
    }

    /// Selects a row, clamped to the listing.
    pub fn select(&mut self, index: Option<usize>) {
        let len = self.snapshot.records.len();
        self.selected = match index {
            _ if len == 0 => None,
            Some(index) => Some(index.min(len - 1)),
            None => None,
        };
    }

    pub fn select_next(&mut self) {
        let next = self.selected.map_or(0, |index| index.saturating_add(1));
        self.select(Some(next));
    }

    pub fn select_previous(&mut self) {
        let previous = self.selected.map_or(0, |index| index.saturating_sub(1));
        self.select(Some(previous));
    }

    fn require(&self, operation: Operation) -> Result<()> {
        if self.can(operation) {
            Ok(())
        } else {
            tracing::warn!(role = ?self.role, %operation, "operation_forbidden");
            Err(Error::forbidden(self.role, operation))
        }
    }

    fn require_idle_mutation(&self) -> Result<()> {
        if self.mutating {
            tracing::warn!("mutation_busy");
            return Err(Error::Busy);
        }
        Ok(())
    }

    fn selected_id(&self, operation: Operation) -> Result<(RecordId, &Record)> {
        let record = self
            .selected_record()
            .ok_or(Error::Selection(operation))?;
        let id = record.id.ok_or(Error::Selection(operation))?;
        Ok((id, record))
    }

    /// Numbers a new listing request for the current filter. Any earlier
    /// request still in flight becomes stale.
    pub fn request_reload(&mut self) -> Result<ReloadRequest> {
        self.require(Operation::View)?;
        self.next_request += 1;
        let id = self.next_request;
        self.pending_reload = Some(id);
        tracing::debug!(request = id, filter = ?self.filter, "reload_start");
        Ok(ReloadRequest {
            id,
            filter: self.filter.clone(),
        })
    }

    /// Applies a listing result. Returns `Ok(false)` when the request was
    /// superseded and the result discarded. On failure the previous snapshot
    /// stays in place.
    pub fn finish_reload(&mut self, id: u64, result: Result<Snapshot>) -> Result<bool> {
        if self.pending_reload != Some(id) {
            tracing::debug!(request = id, latest = self.next_request, "reload_stale");
            return Ok(false);
        }
        self.pending_reload = None;
        // A follow target only applies to the reload right after its mutation.
        let follow = self.follow.take();
        let snapshot = result.inspect_err(|err| {
            tracing::error!(request = id, error = %err, "reload_failed");
        })?;

        let keep =
            follow.or_else(|| self.selected_record().and_then(|record| record.id));
        let previous = self.selected;
        self.snapshot = snapshot;
        let position = keep.and_then(|id| {
            self.snapshot
                .records
                .iter()
                .position(|record| record.id == Some(id))
        });
        match position {
            Some(index) => self.select(Some(index)),
            None => self.select(previous.or(Some(0))),
        }
        tracing::debug!(
            request = id,
            rows = self.snapshot.records.len(),
            categories = self.snapshot.categories.len(),
            "reload_ok"
        );
        Ok(true)
    }

    pub fn begin_add(&self, today: NaiveDate) -> Result<RecordForm> {
        self.require(Operation::Create)?;
        self.require_idle_mutation()?;
        Ok(RecordForm::open(self.schema, None, today))
    }

    pub fn begin_edit(&self) -> Result<EditRequest> {
        self.require(Operation::Edit)?;
        self.require_idle_mutation()?;
        let (id, _) = self.selected_id(Operation::Edit)?;
        Ok(EditRequest { id })
    }

    pub fn begin_delete(&self) -> Result<DeleteTarget> {
        self.require(Operation::Delete)?;
        self.require_idle_mutation()?;
        let (id, record) = self.selected_id(Operation::Delete)?;
        Ok(DeleteTarget {
            id,
            summary: record.summary(self.schema),
        })
    }

    /// Turns a form outcome into a mutation and marks it in flight. A
    /// cancelled form yields `None` and touches nothing.
    pub fn submit(&mut self, outcome: FormOutcome) -> Result<Option<Mutation>> {
        let record = match outcome {
            FormOutcome::Cancelled => {
                tracing::debug!("form_cancelled");
                return Ok(None);
            }
            FormOutcome::Submitted(record) => record,
        };
        let mutation = match record.id {
            Some(id) => Mutation::Update { id, record },
            None => Mutation::Create(record),
        };
        self.start(mutation).map(Some)
    }

    /// Marks a confirmed deletion in flight; a declined one yields `None`.
    pub fn confirm_delete(
        &mut self,
        target: DeleteTarget,
        confirmed: bool,
    ) -> Result<Option<Mutation>> {
        if !confirmed {
            tracing::debug!(id = target.id.0, "delete_declined");
            return Ok(None);
        }
        self.start(Mutation::Delete(target.id)).map(Some)
    }

    fn start(&mut self, mutation: Mutation) -> Result<Mutation> {
        self.require(mutation.operation())?;
        self.require_idle_mutation()?;
        self.mutating = true;
        tracing::debug!(operation = %mutation.operation(), "mutation_start");
        Ok(mutation)
    }

    /// Settles the in-flight mutation. Success is followed by exactly one
    /// reload request; failure leaves the snapshot as it was.
    pub fn finish_mutation(&mut self, result: Result<Option<RecordId>>) -> Result<ReloadRequest> {
        self.mutating = false;
        match result {
            Ok(follow) => {
                tracing::debug!(follow = ?follow.map(|id| id.0), "mutation_ok");
                self.follow = follow;
                self.request_reload()
            }
            Err(err) => {
                tracing::error!(error = %err, "mutation_failed");
                Err(err)
            }
        }
    }

    pub fn reload(&mut self, store: &dyn RecordStore) -> Result<()> {
        let request = self.request_reload()?;
        let result = request.run(store);
        self.finish_reload(request.id, result).map(|_| ())
    }

    /// Opens a blank form through `prompt` and creates the record it returns.
    /// Returns whether anything was saved.
    pub fn add(
        &mut self,
        store: &dyn RecordStore,
        today: NaiveDate,
        prompt: impl FnOnce(RecordForm) -> std::result::Result<FormOutcome, ValidationError>,
    ) -> Result<bool> {
        let form = self.begin_add(today)?;
        let outcome = prompt(form)?;
        match self.submit(outcome)? {
            Some(mutation) => self.complete(store, mutation),
            None => Ok(false),
        }
    }

    pub fn edit(
        &mut self,
        store: &dyn RecordStore,
        today: NaiveDate,
        prompt: impl FnOnce(RecordForm) -> std::result::Result<FormOutcome, ValidationError>,
    ) -> Result<bool> {
        let request = self.begin_edit()?;
        let form = request.resolve(store, today)?;
        let outcome = prompt(form)?;
        match self.submit(outcome)? {
            Some(mutation) => self.complete(store, mutation),
            None => Ok(false),
        }
    }

    pub fn delete(
        &mut self,
        store: &dyn RecordStore,
        confirm: impl FnOnce(&DeleteTarget) -> bool,
    ) -> Result<bool> {
        let target = self.begin_delete()?;
        let confirmed = confirm(&target);
        match self.confirm_delete(target, confirmed)? {
            Some(mutation) => self.complete(store, mutation),
            None => Ok(false),
        }
    }

    fn complete(&mut self, store: &dyn RecordStore, mutation: Mutation) -> Result<bool> {
        let result = mutation.apply(store);
        let request = self.finish_mutation(result)?;
        let result = request.run(store);
        self.finish_reload(request.id, result)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        entity::{EMPLOYEE, ITEM},
        store::{StoreError, StoreOp},
    };

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn employee(id: i64, name: &str, company: &str) -> Record {
        Record::from_pairs(
            &EMPLOYEE,
            &[("full_name", name), ("company", company)],
            day(),
        )
        .with_id(RecordId(id))
    }

    fn snapshot(records: Vec<Record>) -> Snapshot {
        Snapshot {
            records,
            categories: vec!["Acme".into()],
        }
    }

    fn store_failure() -> Error {
        Error::Store(StoreError::Shape {
            operation: StoreOp::List,
            reason: "boom".into(),
        })
    }

    fn loaded(role: Role, records: Vec<Record>) -> RecordTable {
        let mut table = RecordTable::new(&EMPLOYEE, Some(role));
        let request = table.request_reload().unwrap();
        assert!(table.finish_reload(request.id, Ok(snapshot(records))).unwrap());
        table
    }

    #[test]
    fn reload_moves_through_phases() {
        let mut table = RecordTable::new(&EMPLOYEE, Some(Role::Viewer));
        assert_eq!(table.phase(), Phase::Idle);
        let request = table.request_reload().unwrap();
        assert_eq!(table.phase(), Phase::Reloading);
        table
            .finish_reload(request.id, Ok(snapshot(vec![employee(1, "Ivanov", "Acme")])))
            .unwrap();
        assert_eq!(table.phase(), Phase::Idle);
        assert_eq!(table.records().len(), 1);
        assert_eq!(table.categories(), ["Acme".to_string()]);
        assert_eq!(table.selected(), Some(0));
    }

    #[test]
    fn stale_reload_is_discarded() {
        let mut table = RecordTable::new(&EMPLOYEE, Some(Role::Viewer));
        let first = table.request_reload().unwrap();
        table.set_name_filter("iv");
        let second = table.request_reload().unwrap();
        assert_eq!(second.filter.name_contains, "iv");

        let applied = table
            .finish_reload(first.id, Ok(snapshot(vec![employee(1, "Petrov", "Acme")])))
            .unwrap();
        assert!(!applied);
        assert!(table.records().is_empty());
        assert_eq!(table.phase(), Phase::Reloading);

        table
            .finish_reload(second.id, Ok(snapshot(vec![employee(2, "Ivanov", "Acme")])))
            .unwrap();
        assert_eq!(table.records()[0].id, Some(RecordId(2)));
    }

    #[test]
    fn failed_reload_keeps_last_snapshot() {
        let mut table = loaded(Role::Viewer, vec![employee(1, "Ivanov", "Acme")]);
        let request = table.request_reload().unwrap();
        assert!(table.finish_reload(request.id, Err(store_failure())).is_err());
        assert_eq!(table.phase(), Phase::Idle);
        assert_eq!(table.records().len(), 1);
    }

    #[test]
    fn failed_reload_after_create_drops_the_follow_target() {
        let mut table = loaded(
            Role::Administrator,
            vec![employee(1, "A", "Acme"), employee(2, "B", "Acme")],
        );
        let form = table.begin_add(day()).unwrap();
        let record = form.confirm().unwrap();
        table.submit(FormOutcome::Submitted(record)).unwrap().unwrap();
        let request = table.finish_mutation(Ok(Some(RecordId(3)))).unwrap();
        assert!(table.finish_reload(request.id, Err(store_failure())).is_err());

        table.select(Some(0));
        let request = table.request_reload().unwrap();
        table
            .finish_reload(
                request.id,
                Ok(snapshot(vec![
                    employee(1, "A", "Acme"),
                    employee(2, "B", "Acme"),
                    employee(3, "C", "Acme"),
                ])),
            )
            .unwrap();
        assert_eq!(table.selected(), Some(0));
    }

    #[test]
    fn selection_follows_identity_across_reloads() {
        let mut table = loaded(
            Role::Viewer,
            vec![employee(1, "A", "Acme"), employee(2, "B", "Acme")],
        );
        table.select(Some(1));
        let request = table.request_reload().unwrap();
        table
            .finish_reload(
                request.id,
                Ok(snapshot(vec![
                    employee(0, "Z", "Acme"),
                    employee(1, "A", "Acme"),
                    employee(2, "B", "Acme"),
                ])),
            )
            .unwrap();
        assert_eq!(table.selected(), Some(2));

        let request = table.request_reload().unwrap();
        table
            .finish_reload(request.id, Ok(snapshot(vec![employee(0, "Z", "Acme")])))
            .unwrap();
        assert_eq!(table.selected(), Some(0));

        let request = table.request_reload().unwrap();
        table.finish_reload(request.id, Ok(snapshot(vec![]))).unwrap();
        assert_eq!(table.selected(), None);
    }

    #[test]
    fn selection_is_clamped() {
        let mut table = loaded(Role::Viewer, vec![employee(1, "A", "Acme")]);
        table.select(Some(9));
        assert_eq!(table.selected(), Some(0));
        table.select_next();
        assert_eq!(table.selected(), Some(0));
        table.select_previous();
        assert_eq!(table.selected(), Some(0));
    }

    #[test]
    fn edit_without_selection_is_a_selection_error() {
        let table = loaded(Role::Administrator, vec![]);
        assert!(matches!(
            table.begin_edit(),
            Err(Error::Selection(Operation::Edit))
        ));
        assert!(matches!(
            table.begin_delete(),
            Err(Error::Selection(Operation::Delete))
        ));
    }

    #[test]
    fn role_gates_actions_before_selection() {
        let table = loaded(Role::Manager, vec![employee(1, "A", "Acme")]);
        assert!(table.begin_add(day()).is_ok());
        assert!(matches!(
            table.begin_edit(),
            Err(Error::Forbidden {
                operation: Operation::Edit,
                ..
            })
        ));
        let viewer = loaded(Role::Viewer, vec![]);
        assert!(matches!(
            viewer.begin_add(day()),
            Err(Error::Forbidden { .. })
        ));
    }

    #[test]
    fn gated_table_without_role_cannot_list() {
        let mut table = RecordTable::new(&EMPLOYEE, None);
        assert!(matches!(
            table.request_reload(),
            Err(Error::Forbidden {
                operation: Operation::View,
                ..
            })
        ));
    }

    #[test]
    fn ungated_entity_permits_everything() {
        let table = RecordTable::new(&ITEM, Some(Role::Viewer));
        assert_eq!(table.permissions(), Permissions::ALL);
    }

    #[test]
    fn second_mutation_is_rejected_while_one_is_in_flight() {
        let mut table = loaded(Role::Administrator, vec![employee(1, "A", "Acme")]);
        let form = table.begin_add(day()).unwrap();
        let record = form.confirm().unwrap();
        let mutation = table
            .submit(FormOutcome::Submitted(record.clone()))
            .unwrap();
        assert!(matches!(mutation, Some(Mutation::Create(_))));
        assert_eq!(table.phase(), Phase::Mutating);

        assert!(matches!(table.begin_add(day()), Err(Error::Busy)));
        assert!(matches!(
            table.submit(FormOutcome::Submitted(record)),
            Err(Error::Busy)
        ));

        let request = table.finish_mutation(Ok(Some(RecordId(5)))).unwrap();
        assert_eq!(table.phase(), Phase::Reloading);
        table
            .finish_reload(
                request.id,
                Ok(snapshot(vec![employee(1, "A", "Acme"), employee(5, "", "")])),
            )
            .unwrap();
        assert_eq!(table.selected(), Some(1));
    }

    #[test]
    fn failed_mutation_does_not_reload() {
        let mut table = loaded(Role::Administrator, vec![employee(1, "A", "Acme")]);
        let target = table.begin_delete().unwrap();
        assert_eq!(target.id, RecordId(1));
        table.confirm_delete(target, true).unwrap();
        assert!(table.finish_mutation(Err(store_failure())).is_err());
        assert_eq!(table.phase(), Phase::Idle);
        assert_eq!(table.records().len(), 1);
    }

    #[test]
    fn cancel_and_decline_produce_nothing() {
        let mut table = loaded(Role::Administrator, vec![employee(1, "A", "Acme")]);
        assert_eq!(table.submit(FormOutcome::Cancelled).unwrap(), None);
        let target = table.begin_delete().unwrap();
        assert_eq!(table.confirm_delete(target, false).unwrap(), None);
        assert_eq!(table.phase(), Phase::Idle);
    }

    #[test]
    fn submitted_edit_becomes_update_of_the_same_identity() {
        let mut table = loaded(Role::Administrator, vec![employee(3, "A", "Acme")]);
        let record = employee(3, "A", "Globex");
        let mutation = table.submit(FormOutcome::Submitted(record.clone())).unwrap();
        assert_eq!(
            mutation,
            Some(Mutation::Update {
                id: RecordId(3),
                record
            })
        );
    }
}

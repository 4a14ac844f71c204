//! Labels couple a name with either a manual flag or a condition tree and
//! know how to apply themselves to observations. The [registry] holds every
//! live label, the [store] is the persistence port they sync through.

pub mod registry;
pub mod store;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::warn;

use crate::engine::{
    error::{EvaluationError, SerialError},
    field::FieldSource,
    group::ConditionGroup,
    serial,
};

use store::{LabelRecord, LabelStore};

/// The label-attachment side of an observation. Attaching a name that is
/// already present must be a no-op, several rules may resolve to one label.
pub trait LabelSink {
    fn attach_label(&mut self, name: &str);
}

/// A named rule. While active, a manual label applies to every observation
/// and a conditional one applies when its tree evaluates true. The name is
/// the identifier observations carry; the numeric id is the storage key.
pub struct Label {
    created_at: DateTime<Utc>,
    state: Mutex<LabelState>,
}

struct LabelState {
    id: Option<u64>,
    name: String,
    manual: bool,
    active: bool,
    conditions: Option<ConditionGroup>,
}

impl Label {
    /// Creates a label and persists it right away when it already matters,
    /// i.e. when it is manual or has conditions.
    pub fn new(
        name: impl Into<String>,
        manual: bool,
        active: bool,
        conditions: Option<ConditionGroup>,
        store: &dyn LabelStore,
    ) -> Result<Self> {
        let qualifies = manual || conditions.is_some();
        let label = Self {
            created_at: Utc::now(),
            state: Mutex::new(LabelState {
                id: None,
                name: name.into(),
                manual,
                active,
                conditions,
            }),
        };
        if qualifies {
            label.add_to_store(store)?;
        }
        Ok(label)
    }

    /// Rebuilds a label from its persisted record. Fails only when the
    /// condition tree doesn't parse; the caller decides whether to skip it.
    pub fn from_record(record: &LabelRecord) -> Result<Self, SerialError> {
        let conditions = record
            .conditions
            .as_ref()
            .map(serial::group_from_value)
            .transpose()?;
        Ok(Self {
            created_at: record.creation_datetime,
            state: Mutex::new(LabelState {
                id: record.id,
                name: record.name.clone(),
                manual: record.manually,
                active: record.active,
                conditions,
            }),
        })
    }

    pub fn id(&self) -> Option<u64> {
        self.state.lock().id
    }

    pub fn name(&self) -> String {
        self.state.lock().name.clone()
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    pub fn is_manual(&self) -> bool {
        self.state.lock().manual
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn enable(&self) {
        self.state.lock().active = true;
    }

    pub fn disable(&self) {
        self.state.lock().active = false;
    }

    pub fn set_manual(&self, manual: bool) {
        self.state.lock().manual = manual;
    }

    pub fn set_conditions(&self, conditions: Option<ConditionGroup>) {
        self.state.lock().conditions = conditions;
    }

    pub fn rename(&self, name: impl Into<String>) {
        self.state.lock().name = name.into();
    }

    /// Snapshot of the current in-memory state in its persisted shape.
    pub fn to_record(&self) -> LabelRecord {
        let state = self.state.lock();
        LabelRecord {
            id: state.id,
            name: state.name.clone(),
            manually: state.manual,
            active: state.active,
            conditions: state.conditions.as_ref().map(serial::group_to_value),
            creation_datetime: self.created_at,
            deleted: false,
        }
    }

    /// First-time persistence. A no-op with a warning when the label already
    /// has an id. The label lock is not held across the store call.
    pub fn add_to_store(&self, store: &dyn LabelStore) -> Result<()> {
        let record = self.to_record();
        if record.id.is_some() {
            warn!("Label `{}` was already added to the store", record.name);
            return Ok(());
        }
        let id = store.add_label(&record)?;
        self.state.lock().id = Some(id);
        Ok(())
    }

    /// Pushes current state keyed by id. Unpersisted labels are skipped with
    /// a warning, there is nothing in the store to update yet.
    pub fn update_in_store(&self, store: &dyn LabelStore) -> Result<()> {
        let record = self.to_record();
        if record.id.is_none() {
            warn!("Label `{}` has no id yet, skipping update", record.name);
            return Ok(());
        }
        store.update_label(&record)
    }

    pub fn delete_in_store(&self, store: &dyn LabelStore) -> Result<()> {
        let id = self.state.lock().id;
        match id {
            Some(id) => store.delete_label(id),
            None => Ok(()),
        }
    }

    /// Applies this label to one observation. Inactive labels never apply,
    /// manual ones always do, conditional ones when their tree evaluates
    /// true. A conditional label without conditions never matches, that is
    /// not an error. Only the observation is mutated.
    pub fn check_and_apply<O: FieldSource + LabelSink>(
        &self,
        observation: &mut O,
    ) -> Result<(), EvaluationError> {
        let state = self.state.lock();
        if !state.active {
            return Ok(());
        }
        if state.manual {
            observation.attach_label(&state.name);
            return Ok(());
        }
        if let Some(conditions) = &state.conditions {
            if conditions.evaluate(observation)? {
                observation.attach_label(&state.name);
            }
        }
        Ok(())
    }
}

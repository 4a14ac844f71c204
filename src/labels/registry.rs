use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::Mutex;
use tracing::warn;

use crate::engine::field::FieldSource;

use super::{
    store::LabelStore,
    Label, LabelSink,
};

/// The live collection of every label in the process. Built once at startup,
/// shared behind an [Arc], mutated through [register]/[unregister] only.
///
/// [register]: LabelRegistry::register
/// [unregister]: LabelRegistry::unregister
#[derive(Default)]
pub struct LabelRegistry {
    labels: Mutex<Vec<Arc<Label>>>,
}

impl LabelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a label. Names identify labels on observations, so they are kept
    /// unique here, compared case-insensitively.
    pub fn register(&self, label: Arc<Label>) -> Result<()> {
        let name = label.name();
        let mut labels = self.labels.lock();
        if labels.iter().any(|l| l.name().eq_ignore_ascii_case(&name)) {
            bail!("a label named `{name}` is already registered");
        }
        labels.push(label);
        Ok(())
    }

    /// Removes a label by name and returns it, if it was registered.
    pub fn unregister(&self, name: &str) -> Option<Arc<Label>> {
        let mut labels = self.labels.lock();
        let index = labels
            .iter()
            .position(|l| l.name().eq_ignore_ascii_case(name))?;
        Some(labels.remove(index))
    }

    pub fn find(&self, name: &str) -> Option<Arc<Label>> {
        self.labels
            .lock()
            .iter()
            .find(|l| l.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Snapshot of the registered labels. The lock is released before the
    /// caller touches any label, so one slow label can't stall registration.
    pub fn all(&self) -> Vec<Arc<Label>> {
        self.labels.lock().clone()
    }

    /// Runs every registered label against one observation. A label whose
    /// evaluation fails is logged and skipped; the remaining labels still see
    /// the same observation snapshot.
    pub fn apply_all<O: FieldSource + LabelSink>(&self, observation: &mut O) {
        for label in self.all() {
            if let Err(e) = label.check_and_apply(observation) {
                warn!("Skipping label `{}` for this observation: {e}", label.name());
            }
        }
    }

    /// Bulk-populates a registry from the store. Records that fail to parse
    /// and soft-deleted records are skipped, a bad label must not take the
    /// whole startup down.
    pub fn load_from_store(store: &dyn LabelStore) -> Result<Self> {
        let registry = Self::new();
        for record in store.all_labels()? {
            if record.deleted {
                continue;
            }
            match Label::from_record(&record) {
                Ok(label) => {
                    if let Err(e) = registry.register(Arc::new(label)) {
                        warn!("Skipping label record `{}`: {e}", record.name);
                    }
                }
                Err(e) => {
                    warn!("Skipping label record `{}`: {e}", record.name);
                }
            }
        }
        Ok(registry)
    }

    /// Pushes every registered label's state to the store. Used at orderly
    /// shutdown.
    pub fn flush_to_store(&self, store: &dyn LabelStore) -> Result<()> {
        for label in self.all() {
            label.update_in_store(store)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::Utc;
    use serde_json::json;

    use crate::labels::{
        store::{LabelRecord, MockLabelStore},
        Label,
    };

    use super::LabelRegistry;

    fn label(name: &str) -> Arc<Label> {
        Arc::new(
            Label::from_record(&LabelRecord {
                id: Some(1),
                name: name.to_owned(),
                manually: true,
                active: true,
                conditions: None,
                creation_datetime: Utc::now(),
                deleted: false,
            })
            .unwrap(),
        )
    }

    #[test]
    fn register_rejects_duplicate_names_case_insensitively() -> Result<()> {
        let registry = LabelRegistry::new();
        registry.register(label("Coding"))?;
        assert!(registry.register(label("coding")).is_err());
        assert_eq!(registry.all().len(), 1);
        Ok(())
    }

    #[test]
    fn unregister_removes_by_name() -> Result<()> {
        let registry = LabelRegistry::new();
        registry.register(label("Coding"))?;
        assert!(registry.unregister("CODING").is_some());
        assert!(registry.unregister("CODING").is_none());
        assert!(registry.all().is_empty());
        Ok(())
    }

    #[test]
    fn load_skips_deleted_and_corrupt_records() -> Result<()> {
        let mut store = MockLabelStore::new();
        store.expect_all_labels().returning(|| {
            Ok(vec![
                LabelRecord {
                    id: Some(1),
                    name: "Good".to_owned(),
                    manually: true,
                    active: true,
                    conditions: None,
                    creation_datetime: Utc::now(),
                    deleted: false,
                },
                LabelRecord {
                    id: Some(2),
                    name: "Gone".to_owned(),
                    manually: true,
                    active: true,
                    conditions: None,
                    creation_datetime: Utc::now(),
                    deleted: true,
                },
                LabelRecord {
                    id: Some(3),
                    name: "Broken".to_owned(),
                    manually: false,
                    active: true,
                    conditions: Some(json!({"operator": "nand"})),
                    creation_datetime: Utc::now(),
                    deleted: false,
                },
            ])
        });

        let registry = LabelRegistry::load_from_store(&store)?;
        let names: Vec<_> = registry.all().iter().map(|l| l.name()).collect();
        assert_eq!(names, vec!["Good"]);
        Ok(())
    }

    #[test]
    fn flush_updates_every_label() -> Result<()> {
        let registry = LabelRegistry::new();
        registry.register(label("One"))?;
        registry.register(label("Two"))?;

        let mut store = MockLabelStore::new();
        store.expect_update_label().times(2).returning(|_| Ok(()));
        registry.flush_to_store(&store)?;
        Ok(())
    }
}

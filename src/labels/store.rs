use std::{
    fs::{self, File},
    io::{Read, Seek, SeekFrom, Write},
    path::PathBuf,
};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Persisted shape of one label. `conditions` holds the serialized condition
/// tree and is absent for manual labels that never had rules defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub id: Option<u64>,
    pub name: String,
    pub manually: bool,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Value>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub creation_datetime: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}

/// Persistence port for labels. The core only ever talks to this trait, the
/// storage below decides how records live on disk and whether a delete is
/// soft or hard.
#[cfg_attr(test, mockall::automock)]
pub trait LabelStore: Send + Sync {
    /// Persists a new record and returns the identifier assigned to it.
    fn add_label(&self, record: &LabelRecord) -> Result<u64>;

    /// Overwrites the record with the same id. Calling this twice with
    /// unchanged state is harmless.
    fn update_label(&self, record: &LabelRecord) -> Result<()>;

    /// Removes a label, or flags it deleted when stored observations still
    /// reference it.
    fn delete_label(&self, id: u64) -> Result<()>;

    fn all_labels(&self) -> Result<Vec<LabelRecord>>;
}

/// [LabelStore] backed by a single json file, rewritten whole under an
/// exclusive advisory lock. Label counts are small enough that rewriting
/// beats anything cleverer.
pub struct JsonLabelStore {
    labels_path: PathBuf,
    /// Directory of observation record files, consulted to decide between
    /// hard and soft delete. [None] disables the reference check.
    records_dir: Option<PathBuf>,
}

impl JsonLabelStore {
    pub fn new(labels_path: PathBuf, records_dir: Option<PathBuf>) -> Result<Self> {
        if let Some(parent) = labels_path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            labels_path,
            records_dir,
        })
    }

    fn with_locked_file<T>(&self, action: impl FnOnce(&mut File) -> Result<T>) -> Result<T> {
        let mut file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.labels_path)
            .with_context(|| format!("opening label store {:?}", self.labels_path))?;
        file.lock_exclusive()?;
        let result = action(&mut file);
        FileExt::unlock(&file)?;
        result
    }

    fn read_records(file: &mut File) -> Result<Vec<LabelRecord>> {
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_records(file: &mut File, records: &[LabelRecord]) -> Result<()> {
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&serde_json::to_vec_pretty(records)?)?;
        file.flush()?;
        Ok(())
    }

    /// Scans stored observation files for the label name. Corrupt lines are
    /// skipped the same way the observation reader skips them.
    fn label_referenced(&self, name: &str) -> Result<bool> {
        let Some(records_dir) = &self.records_dir else {
            return Ok(false);
        };
        let entries = match fs::read_dir(records_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let contents = fs::read_to_string(&path)?;
            for line in contents.lines() {
                let Ok(value) = serde_json::from_str::<Value>(line) else {
                    warn!("Skipping corrupt observation line in {path:?}");
                    continue;
                };
                let referenced = value
                    .get("labels")
                    .and_then(Value::as_array)
                    .is_some_and(|labels| {
                        labels
                            .iter()
                            .filter_map(Value::as_str)
                            .any(|label| label.eq_ignore_ascii_case(name))
                    });
                if referenced {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

impl LabelStore for JsonLabelStore {
    fn add_label(&self, record: &LabelRecord) -> Result<u64> {
        self.with_locked_file(|file| {
            let mut records = Self::read_records(file)?;
            let id = records
                .iter()
                .filter_map(|r| r.id)
                .max()
                .map_or(1, |max| max + 1);
            records.push(LabelRecord {
                id: Some(id),
                ..record.clone()
            });
            Self::write_records(file, &records)?;
            Ok(id)
        })
    }

    fn update_label(&self, record: &LabelRecord) -> Result<()> {
        let Some(id) = record.id else {
            bail!("can't update label `{}` without an id", record.name);
        };
        self.with_locked_file(|file| {
            let mut records = Self::read_records(file)?;
            let Some(stored) = records.iter_mut().find(|r| r.id == Some(id)) else {
                bail!("label id {id} is not in the store");
            };
            *stored = record.clone();
            Self::write_records(file, &records)
        })
    }

    fn delete_label(&self, id: u64) -> Result<()> {
        self.with_locked_file(|file| {
            let mut records = Self::read_records(file)?;
            let Some(index) = records.iter().position(|r| r.id == Some(id)) else {
                // Deleting something already gone is not an error.
                return Ok(());
            };
            if self.label_referenced(&records[index].name)? {
                records[index].deleted = true;
            } else {
                records.remove(index);
            }
            Self::write_records(file, &records)
        })
    }

    fn all_labels(&self) -> Result<Vec<LabelRecord>> {
        if !self.labels_path.exists() {
            return Ok(Vec::new());
        }
        self.with_locked_file(Self::read_records)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::tempdir;

    use super::{JsonLabelStore, LabelRecord, LabelStore};

    fn record(name: &str) -> LabelRecord {
        LabelRecord {
            id: None,
            name: name.to_owned(),
            manually: false,
            active: true,
            conditions: Some(json!({"operator": "and", "conditions": []})),
            creation_datetime: Utc::now(),
            deleted: false,
        }
    }

    #[test]
    fn add_assigns_incrementing_ids() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonLabelStore::new(dir.path().join("labels.json"), None)?;

        assert_eq!(store.add_label(&record("first"))?, 1);
        assert_eq!(store.add_label(&record("second"))?, 2);

        let all = store.all_labels()?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "first");
        assert_eq!(all[1].id, Some(2));
        Ok(())
    }

    #[test]
    fn update_replaces_record_by_id() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonLabelStore::new(dir.path().join("labels.json"), None)?;

        let id = store.add_label(&record("coding"))?;
        let mut updated = record("coding");
        updated.id = Some(id);
        updated.active = false;
        store.update_label(&updated)?;

        let all = store.all_labels()?;
        assert_eq!(all.len(), 1);
        assert!(!all[0].active);

        // Same state again is harmless.
        store.update_label(&updated)?;
        assert_eq!(store.all_labels()?.len(), 1);
        Ok(())
    }

    #[test]
    fn update_without_id_fails() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonLabelStore::new(dir.path().join("labels.json"), None)?;
        assert!(store.update_label(&record("unpersisted")).is_err());
        Ok(())
    }

    #[test]
    fn delete_removes_unreferenced_label() -> Result<()> {
        let dir = tempdir()?;
        let records_dir = dir.path().join("records");
        fs::create_dir_all(&records_dir)?;
        let store = JsonLabelStore::new(dir.path().join("labels.json"), Some(records_dir))?;

        let id = store.add_label(&record("coding"))?;
        store.delete_label(id)?;

        assert!(store.all_labels()?.is_empty());
        Ok(())
    }

    #[test]
    fn delete_soft_deletes_referenced_label() -> Result<()> {
        let dir = tempdir()?;
        let records_dir = dir.path().join("records");
        fs::create_dir_all(&records_dir)?;
        fs::write(
            records_dir.join("2025-01-16"),
            concat!(
                r#"{"window_title":"main.py","labels":["Coding"]}"#,
                "\n",
                "corrupt line\n",
            ),
        )?;
        let store = JsonLabelStore::new(dir.path().join("labels.json"), Some(records_dir))?;

        let id = store.add_label(&record("coding"))?;
        store.delete_label(id)?;

        let all = store.all_labels()?;
        assert_eq!(all.len(), 1);
        assert!(all[0].deleted);
        Ok(())
    }

    #[test]
    fn missing_store_file_reads_as_empty() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonLabelStore::new(dir.path().join("labels.json"), None)?;
        assert!(store.all_labels()?.is_empty());
        Ok(())
    }
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The persisted form of one sampled observation: what was in the foreground,
/// how idle the input devices were and which labels matched. One line per
/// sample in the day's record file.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct ObservationEntity {
    pub window_title: Arc<str>,
    /// Executable name of the foreground process, e.g. `code.exe`.
    pub window_type: Arc<str>,
    #[serde(default)]
    pub window_text_words: Vec<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub idle_millis: u32,
    #[serde(default)]
    pub afk: bool,
    #[serde(default)]
    pub labels: Vec<String>,
}

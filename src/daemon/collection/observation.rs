use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    daemon::storage::entities::ObservationEntity,
    engine::field::{FieldSource, FieldValue},
    labels::LabelSink,
};

/// One live sample of the foreground window, the thing labels are evaluated
/// against. Field names exposed to conditions: `timestamp`, `window_type`,
/// `window_title`, `window_text_words`, `idle_millis`.
#[derive(Debug)]
pub struct WindowObservation {
    pub timestamp: DateTime<Utc>,
    pub window_type: Arc<str>,
    pub window_title: Arc<str>,
    pub window_text_words: Vec<String>,
    pub idle_millis: u32,
    pub afk: bool,
    labels: Vec<String>,
}

impl WindowObservation {
    pub fn new(
        timestamp: DateTime<Utc>,
        window_title: Arc<str>,
        window_type: Arc<str>,
        idle_millis: u32,
        afk: bool,
    ) -> Self {
        let window_text_words = title_words(&window_title);
        Self {
            timestamp,
            window_type,
            window_title,
            window_text_words,
            idle_millis,
            afk,
            labels: Vec::new(),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn into_entity(self) -> ObservationEntity {
        ObservationEntity {
            window_title: self.window_title,
            window_type: self.window_type,
            window_text_words: self.window_text_words,
            timestamp: self.timestamp,
            idle_millis: self.idle_millis,
            afk: self.afk,
            labels: self.labels,
        }
    }
}

impl FieldSource for WindowObservation {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "timestamp" => Some(FieldValue::DateTime(self.timestamp.naive_utc())),
            "window_type" => Some(FieldValue::Str(self.window_type.to_string())),
            "window_title" => Some(FieldValue::Str(self.window_title.to_string())),
            "window_text_words" => Some(FieldValue::Words(self.window_text_words.clone())),
            "idle_millis" => Some(FieldValue::Int(self.idle_millis.into())),
            _ => None,
        }
    }
}

impl LabelSink for WindowObservation {
    fn attach_label(&mut self, name: &str) {
        if !self
            .labels
            .iter()
            .any(|label| label.eq_ignore_ascii_case(name))
        {
            self.labels.push(name.to_owned());
        }
    }
}

const SEPARATOR_CHARS: &[char] = &['.', '_', '-', ',', '!', '?', ';', ':', ' '];

/// Splits a window title into the deduplicated words conditions match
/// against. Titles like `main.py - project - Code` become
/// `["main", "py", "project", "Code"]`.
pub fn title_words(title: &str) -> Vec<String> {
    let normalized = title.replace(['–', '—'], "-");

    let mut words = Vec::new();
    for segment in normalized.split(" - ") {
        for word in segment.split(SEPARATOR_CHARS) {
            let word = word.trim_matches(SEPARATOR_CHARS);
            if word.is_empty() || words.iter().any(|known| known == word) {
                continue;
            }
            words.push(word.to_owned());
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::{
        engine::field::{FieldSource, FieldValue},
        labels::LabelSink,
    };

    use super::{title_words, WindowObservation};

    #[test]
    fn title_is_split_into_deduplicated_words() {
        assert_eq!(
            title_words("main.py - project - Code"),
            vec!["main", "py", "project", "Code"]
        );
        // em dash and duplicate segments
        assert_eq!(title_words("notes — notes"), vec!["notes"]);
        assert_eq!(title_words(""), Vec::<String>::new());
    }

    #[test]
    fn exposes_engine_fields() {
        let observation = WindowObservation::new(
            Utc::now(),
            "main.py - Code".into(),
            "code.exe".into(),
            1500,
            false,
        );
        assert_eq!(
            observation.field("window_type"),
            Some(FieldValue::Str("code.exe".to_owned()))
        );
        assert_eq!(
            observation.field("idle_millis"),
            Some(FieldValue::Int(1500))
        );
        assert!(matches!(
            observation.field("window_text_words"),
            Some(FieldValue::Words(words)) if words.contains(&"main".to_owned())
        ));
        assert_eq!(observation.field("no_such_field"), None);
    }

    #[test]
    fn label_attachment_deduplicates_ignoring_case() {
        let mut observation =
            WindowObservation::new(Utc::now(), "title".into(), "test.exe".into(), 0, false);
        observation.attach_label("Coding");
        observation.attach_label("CODING");
        observation.attach_label("Work");
        assert_eq!(observation.labels(), ["Coding", "Work"]);
    }
}

//! Saved generation records and their storage.
//!
//! A record keeps the raw generated text as the source of truth. The parsed
//! document is stored alongside it when available; when it is missing or no
//! longer decodes, the document is derived again from the text.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::{parse_or_fallback, ContentKind, Document};
use crate::error::{ContentError, Result};

/// One saved generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRecord {
    /// Unique record id, safe to use as a file name.
    pub id: String,
    /// Display title.
    pub title: String,
    /// When the record was saved.
    pub timestamp: DateTime<Utc>,
    /// Content kind name (`quiz`, `lesson-plan`).
    #[serde(default)]
    pub kind: String,
    /// The form fields the generation was requested with.
    #[serde(default)]
    pub form_data: serde_json::Value,
    /// The raw text the service produced.
    pub generated_text: String,
    /// The parsed (and possibly edited) document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_document: Option<serde_json::Value>,
}

impl SavedRecord {
    /// Builds a record for a document of kind `K`, stamped with the current time.
    pub fn new<K: ContentKind>(
        title: impl Into<String>,
        form_data: &K::Metadata,
        generated_text: impl Into<String>,
        document: Option<&Document<K>>,
    ) -> Result<Self> {
        let timestamp = Utc::now();
        Ok(Self {
            id: new_record_id(timestamp),
            title: title.into(),
            timestamp,
            kind: K::NAME.to_string(),
            form_data: serde_json::to_value(form_data)?,
            generated_text: generated_text.into(),
            parsed_document: document.map(serde_json::to_value).transpose()?,
        })
    }

    /// Returns the stored document, deriving it from the text when needed.
    ///
    /// The form data fills any header field the text does not carry.
    #[must_use]
    pub fn document<K: ContentKind>(&self) -> Document<K> {
        if let Some(value) = &self.parsed_document {
            match serde_json::from_value::<Document<K>>(value.clone()) {
                Ok(document) => return document,
                Err(e) => {
                    tracing::warn!(
                        record = %self.id,
                        error = %e,
                        "Stored document does not decode, deriving it from text"
                    );
                }
            }
        }
        let metadata = serde_json::from_value(self.form_data.clone()).unwrap_or_default();
        parse_or_fallback::<K>(&self.generated_text, metadata).document
    }

    /// Stores an edited document on the record.
    pub fn set_document<K: ContentKind>(&mut self, document: &Document<K>) -> Result<()> {
        self.parsed_document = Some(serde_json::to_value(document)?);
        Ok(())
    }
}

/// Builds a sortable, file-name-safe id: the save time plus a random suffix,
/// so records saved within the same millisecond never share an id.
fn new_record_id(timestamp: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", timestamp.format("%Y%m%d%H%M%S%3f"), &suffix[..8])
}

/// Persistence for saved records.
pub trait RecordStore {
    /// Returns all records, newest first.
    fn list(&self) -> Result<Vec<SavedRecord>>;

    /// Returns one record.
    fn get(&self, id: &str) -> Result<SavedRecord>;

    /// Inserts or replaces a record.
    fn put(&self, record: &SavedRecord) -> Result<()>;

    /// Removes a record.
    fn delete(&self, id: &str) -> Result<()>;
}

/// A [`RecordStore`] keeping one JSON file per record in a directory.
#[derive(Debug, Clone)]
pub struct DirRecordStore {
    dir: PathBuf,
}

impl DirRecordStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory records are stored in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ContentError::record_not_found(id));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    fn read(path: &Path) -> Result<SavedRecord> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| ContentError::record_corrupted(path, e.to_string()))
    }
}

impl RecordStore for DirRecordStore {
    fn list(&self) -> Result<Vec<SavedRecord>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read(&path) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable record");
                }
            }
        }
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        Ok(records)
    }

    fn get(&self, id: &str) -> Result<SavedRecord> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Err(ContentError::record_not_found(id));
        }
        Self::read(&path)
    }

    fn put(&self, record: &SavedRecord) -> Result<()> {
        let path = self.path_for(&record.id)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(&path, serde_json::to_string_pretty(record)?)?;
        tracing::debug!(id = %record.id, path = %path.display(), "Saved record");
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ContentError::record_not_found(id))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::lesson_plan::{LessonMetadata, LessonPlan, SectionContent};
    use crate::quiz::{AnswerSpec, Quiz, QuizMetadata};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("classgen_{name}_{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        dir
    }

    fn quiz_record(id: &str, text: &str) -> SavedRecord {
        let metadata = QuizMetadata {
            title: "Form title".to_string(),
            subject: "Math".to_string(),
            ..Default::default()
        };
        let mut record = SavedRecord::new::<Quiz>("Quiz", &metadata, text, None).unwrap();
        record.id = id.to_string();
        record
    }

    #[test]
    fn test_record_json_shape() {
        let record = quiz_record("r1", "Question 1: Why?");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["generatedText"], "Question 1: Why?");
        assert_eq!(json["formData"]["subject"], "Math");
        assert_eq!(json["kind"], "quiz");
        assert!(json.get("parsedDocument").is_none());
    }

    #[test]
    fn test_document_rederived_from_text() {
        let record = quiz_record("r1", "Question 1: What is 2+2?\nA) 3\nB) 4\nCorrect Answer: B");
        let document = record.document::<Quiz>();

        assert_eq!(document.len(), 1);
        assert_eq!(document.metadata.subject, "Math");
        assert!(matches!(
            document.blocks()[0].body.answer,
            AnswerSpec::MultipleChoice {
                correct_answer: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn test_undecodable_document_falls_back_to_text() {
        let mut record = quiz_record("r1", "no structure at all");
        record.parsed_document = Some(serde_json::json!({"blocks": "not a list"}));

        let document = record.document::<Quiz>();
        assert_eq!(document.len(), 1);
        assert_eq!(document.blocks()[0].body.text, "no structure at all");
    }

    #[test]
    fn test_stored_document_wins_over_text() {
        let mut record = SavedRecord::new::<LessonPlan>(
            "Lesson",
            &LessonMetadata::default(),
            "Section 1: Notes\nOriginal",
            None,
        )
        .unwrap();
        let mut edited = record.document::<LessonPlan>();
        edited.metadata.title = "Edited".to_string();
        record.set_document(&edited).unwrap();

        let loaded = record.document::<LessonPlan>();
        assert_eq!(loaded.metadata.title, "Edited");
        assert!(matches!(
            &loaded.blocks()[0].body.content,
            SectionContent::Notes { text } if text == "Original"
        ));
    }

    #[test]
    fn test_dir_store_put_list_get_delete() {
        let dir = scratch_dir("store");
        let store = DirRecordStore::new(&dir);
        assert!(store.list().unwrap().is_empty());

        let mut older = quiz_record("older", "a");
        older.timestamp = DateTime::from_timestamp(1_000, 0).unwrap();
        let newer = quiz_record("newer", "b");
        store.put(&older).unwrap();
        store.put(&newer).unwrap();

        let ids: Vec<String> = store.list().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["newer", "older"]);
        assert_eq!(store.get("older").unwrap(), older);

        store.delete("older").unwrap();
        assert!(matches!(
            store.get("older"),
            Err(ContentError::RecordNotFound { .. })
        ));
        assert!(matches!(
            store.delete("older"),
            Err(ContentError::RecordNotFound { .. })
        ));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_back_to_back_saves_keep_both_records() {
        let dir = scratch_dir("burst");
        let store = DirRecordStore::new(&dir);
        let metadata = QuizMetadata::default();

        let first = SavedRecord::new::<Quiz>("One", &metadata, "a", None).unwrap();
        let second = SavedRecord::new::<Quiz>("Two", &metadata, "b", None).unwrap();
        assert_ne!(first.id, second.id);
        assert!(store.path_for(&first.id).is_ok());

        store.put(&first).unwrap();
        store.put(&second).unwrap();
        assert_eq!(store.list().unwrap().len(), 2);
        assert_eq!(store.get(&first.id).unwrap().title, "One");
        assert_eq!(store.get(&second.id).unwrap().title, "Two");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_dir_store_rejects_path_ids() {
        let store = DirRecordStore::new(scratch_dir("paths"));
        assert!(store.get("../etc/passwd").is_err());
        assert!(store.put(&quiz_record("a/b", "x")).is_err());
    }

    #[test]
    fn test_dir_store_reports_corruption() {
        let dir = scratch_dir("corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("bad.json"), "{ not json").unwrap();

        let store = DirRecordStore::new(&dir);
        assert!(matches!(
            store.get("bad"),
            Err(ContentError::RecordCorrupted { .. })
        ));
        // Listing skips it
        assert!(store.list().unwrap().is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }
}

//! Record Store
//!
//! The exam table is an external collaborator; the coordinator only
//! reaches it through this trait. `InMemoryRecordStore` backs the
//! standalone server and the tests.

use std::collections::BTreeMap;
use parking_lot::RwLock;
use tracing::debug;
use crate::error::{CoordError, Result};
use crate::types::{ExamDraft, ExamRecord};

pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// All scheduled exams, ordered by id
    fn list(&self) -> Result<Vec<ExamRecord>>;

    fn get(&self, name: &str) -> Result<Option<ExamRecord>>;

    /// Count one more registered student for the exam called `name`
    fn register(&self, name: &str) -> Result<ExamRecord>;

    /// Insert a new exam; names are unique
    fn insert(&self, draft: ExamDraft) -> Result<ExamRecord>;
}

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    exams: RwLock<BTreeMap<String, ExamRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing records, last one wins on duplicate names
    pub fn with_records(records: impl IntoIterator<Item = ExamRecord>) -> Self {
        let exams = records
            .into_iter()
            .map(|record| (record.name.clone(), record))
            .collect();
        Self { exams: RwLock::new(exams) }
    }
}

impl RecordStore for InMemoryRecordStore {
    fn list(&self) -> Result<Vec<ExamRecord>> {
        let mut exams: Vec<ExamRecord> = self.exams.read().values().cloned().collect();
        exams.sort_by_key(|exam| exam.id);
        Ok(exams)
    }

    fn get(&self, name: &str) -> Result<Option<ExamRecord>> {
        Ok(self.exams.read().get(name).cloned())
    }

    fn register(&self, name: &str) -> Result<ExamRecord> {
        let mut exams = self.exams.write();
        let exam = exams
            .get_mut(name)
            .ok_or_else(|| CoordError::RecordNotFound(name.to_string()))?;
        exam.students_registered += 1;
        debug!("{} now has {} registered", name, exam.students_registered);
        Ok(exam.clone())
    }

    fn insert(&self, draft: ExamDraft) -> Result<ExamRecord> {
        let mut exams = self.exams.write();
        if exams.contains_key(&draft.exam_id) {
            return Err(CoordError::DuplicateRecord(draft.exam_id));
        }
        let id = exams.values().map(|exam| exam.id).max().map_or(1, |max| max + 1);
        let record = draft.into_record(id);
        exams.insert(record.name.clone(), record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_increments() {
        let store = InMemoryRecordStore::new();
        store.insert(ExamDraft::new("DSGT", vec![])).unwrap();
        assert_eq!(store.register("DSGT").unwrap().students_registered, 1);
        assert_eq!(store.register("DSGT").unwrap().students_registered, 2);
    }

    #[test]
    fn test_register_missing_exam() {
        let store = InMemoryRecordStore::new();
        assert_eq!(
            store.register("nope").unwrap_err(),
            CoordError::RecordNotFound("nope".to_string())
        );
    }

    #[test]
    fn test_insert_assigns_ids_and_rejects_duplicates() {
        let store = InMemoryRecordStore::new();
        assert_eq!(store.insert(ExamDraft::new("a", vec![])).unwrap().id, 1);
        assert_eq!(store.insert(ExamDraft::new("b", vec![])).unwrap().id, 2);
        assert!(matches!(
            store.insert(ExamDraft::new("a", vec![])),
            Err(CoordError::DuplicateRecord(_))
        ));
        let names: Vec<String> = store.list().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}

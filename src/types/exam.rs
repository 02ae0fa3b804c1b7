use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Multiple-choice question attached to an exam
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

/// Scheduled exam as kept by the record store. `name` is the record key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamRecord {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub marks: u32,
    #[serde(default)]
    pub students_registered: u32,
    pub exam_date: NaiveDate,
    pub start_time: NaiveTime,
    /// Duration in minutes
    pub duration: u32,
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// Schedule entry as shown to sessions. Carries no questions, so answers
/// never leave the coordinator through a schedule read or registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledExam {
    pub id: u64,
    pub name: String,
    pub marks: u32,
    pub students_registered: u32,
    pub exam_date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration: u32,
}

impl From<&ExamRecord> for ScheduledExam {
    fn from(record: &ExamRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            marks: record.marks,
            students_registered: record.students_registered,
            exam_date: record.exam_date,
            start_time: record.start_time,
            duration: record.duration,
        }
    }
}

impl ExamRecord {
    /// Replica key holding the exam's question list
    pub fn questions_key(&self) -> String {
        questions_key(&self.name)
    }
}

/// `<name>/questions`; the bare name holds the `ScheduledExam`
pub fn questions_key(name: &str) -> String {
    format!("{}/questions", name)
}

/// Request to create a new exam
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamDraft {
    pub exam_id: String,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default)]
    pub marks: u32,
    #[serde(default)]
    pub exam_date: Option<NaiveDate>,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
}

fn default_duration() -> u32 { 60 }

/// Exams open at nine unless told otherwise
pub fn default_start_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)
}

impl ExamDraft {
    pub fn new(exam_id: impl Into<String>, questions: Vec<Question>) -> Self {
        Self {
            exam_id: exam_id.into(),
            questions,
            duration: default_duration(),
            marks: 0,
            exam_date: None,
            start_time: None,
        }
    }

    /// Materialise the draft as a record with the store-assigned id
    pub fn into_record(self, id: u64) -> ExamRecord {
        ExamRecord {
            id,
            name: self.exam_id,
            marks: self.marks,
            students_registered: 0,
            exam_date: self.exam_date.unwrap_or_else(|| chrono::Local::now().date_naive()),
            start_time: self.start_time.unwrap_or_else(default_start_time),
            duration: self.duration,
            questions: self.questions,
        }
    }
}

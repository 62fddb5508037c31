use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// The mark-history source is unreachable or returned rows we cannot parse.
/// Callers treat either case as an empty history rather than a fault.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read mark history: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed mark history: {0}")]
    Malformed(#[from] csv::Error),
}

/// One scored assessment, as supplied by the surrounding application.
///
/// Optional fields are validated here, once, at the boundary; the rest of
/// the crate only ever sees records whose `percentage()` is defined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkRecord {
    pub student_id: i64,
    pub subject_id: i64,
    pub teacher_id: i64,
    pub exam_date: Option<NaiveDate>,
    pub marks_obtained: Option<f64>,
    pub total_marks: Option<f64>,
}

impl MarkRecord {
    /// Scored percentage, defined only for valid records
    /// (marks present, total present and positive).
    pub fn percentage(&self) -> Option<f64> {
        match (self.marks_obtained, self.total_marks) {
            (Some(obtained), Some(total)) if total > 0.0 => Some(obtained / total * 100.0),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.percentage().is_some()
    }
}

/// Inbound contract with the application that owns the marks.
///
/// Histories come back already filtered to valid records, in ascending
/// exam-date order with undated records last.
pub trait MarkSource {
    /// Entire valid corpus, ordered by (student, subject, exam date). Used
    /// for training.
    fn fetch_all_valid_marks(&self) -> Result<Vec<MarkRecord>, SourceError>;

    /// All of one student's valid marks across subjects. Used for the
    /// recent-form estimate at inference time.
    fn fetch_student_history(&self, student_id: i64) -> Result<Vec<MarkRecord>, SourceError>;

    /// One student's valid marks in one subject. Used for the per-subject
    /// stats at inference time.
    fn fetch_student_subject_history(
        &self,
        student_id: i64,
        subject_id: i64,
    ) -> Result<Vec<MarkRecord>, SourceError>;
}

fn corpus_order(records: &mut [MarkRecord]) {
    // Stable sort: undated records land after dated ones within a group,
    // ties keep insertion order.
    records.sort_by_key(|r| (r.student_id, r.subject_id, r.exam_date.is_none(), r.exam_date));
}

fn date_order(records: &mut [MarkRecord]) {
    records.sort_by_key(|r| (r.exam_date.is_none(), r.exam_date));
}

fn valid_only<'a>(records: impl Iterator<Item = &'a MarkRecord>) -> Vec<MarkRecord> {
    records.filter(|r| r.is_valid()).cloned().collect()
}

/// Mark history held in memory. Backs tests and embedding in a host that
/// already has the records loaded.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarkSource {
    records: Vec<MarkRecord>,
}

impl InMemoryMarkSource {
    pub fn new(records: Vec<MarkRecord>) -> Self {
        Self { records }
    }
}

impl MarkSource for InMemoryMarkSource {
    fn fetch_all_valid_marks(&self) -> Result<Vec<MarkRecord>, SourceError> {
        let mut records = valid_only(self.records.iter());
        corpus_order(&mut records);
        Ok(records)
    }

    fn fetch_student_history(&self, student_id: i64) -> Result<Vec<MarkRecord>, SourceError> {
        let mut records = valid_only(self.records.iter().filter(|r| r.student_id == student_id));
        date_order(&mut records);
        Ok(records)
    }

    fn fetch_student_subject_history(
        &self,
        student_id: i64,
        subject_id: i64,
    ) -> Result<Vec<MarkRecord>, SourceError> {
        let mut records = valid_only(
            self.records
                .iter()
                .filter(|r| r.student_id == student_id && r.subject_id == subject_id),
        );
        date_order(&mut records);
        Ok(records)
    }
}

/// Mark history loaded from a CSV export of the marks table.
///
/// Expected header:
/// `student_id,subject_id,teacher_id,exam_date,marks_obtained,total_marks`
/// with empty cells for missing dates, marks, or totals.
#[derive(Debug, Clone, Default)]
pub struct CsvMarkSource {
    records: Vec<MarkRecord>,
}

impl CsvMarkSource {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for row in rdr.deserialize() {
            let record: MarkRecord = row?;
            records.push(record);
        }
        Ok(Self { records })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl MarkSource for CsvMarkSource {
    fn fetch_all_valid_marks(&self) -> Result<Vec<MarkRecord>, SourceError> {
        let mut records = valid_only(self.records.iter());
        corpus_order(&mut records);
        Ok(records)
    }

    fn fetch_student_history(&self, student_id: i64) -> Result<Vec<MarkRecord>, SourceError> {
        let mut records = valid_only(self.records.iter().filter(|r| r.student_id == student_id));
        date_order(&mut records);
        Ok(records)
    }

    fn fetch_student_subject_history(
        &self,
        student_id: i64,
        subject_id: i64,
    ) -> Result<Vec<MarkRecord>, SourceError> {
        let mut records = valid_only(
            self.records
                .iter()
                .filter(|r| r.student_id == student_id && r.subject_id == subject_id),
        );
        date_order(&mut records);
        Ok(records)
    }
}

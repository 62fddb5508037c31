use crate::data::MarkRecord;
use crate::grades::{percentage_to_grade, Grade};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Serialize, Clone)]
pub struct GradeBucket {
    pub grade: Grade,
    pub count: usize,
    pub share: f64,
}

#[derive(Debug, Serialize, Clone)]
pub struct MarksSummary {
    pub records: usize,
    pub students: usize,
    pub subjects: usize,
    pub mean_percentage: Option<f64>,
    pub grade_distribution: Vec<GradeBucket>,
}

/// Corpus-level summary for the dashboard: counts, mean percentage, and the
/// letter-grade distribution. Grades come from the same mapping the
/// predictor's output goes through, so the display can never disagree with
/// a prediction.
pub fn summarize(records: &[MarkRecord]) -> MarksSummary {
    let mut students = HashSet::new();
    let mut subjects = HashSet::new();
    let mut counts = [0usize; Grade::ALL.len()];
    let mut total_pct = 0.0;
    let mut scored = 0usize;

    for record in records {
        let Some(pct) = record.percentage() else {
            continue;
        };
        students.insert(record.student_id);
        subjects.insert(record.subject_id);
        let grade = percentage_to_grade(pct);
        counts[grade as usize] += 1;
        total_pct += pct;
        scored += 1;
    }

    // best grade first, the way the dashboard lists them
    let grade_distribution = Grade::ALL
        .iter()
        .rev()
        .map(|&grade| GradeBucket {
            grade,
            count: counts[grade as usize],
            share: if scored > 0 {
                counts[grade as usize] as f64 / scored as f64
            } else {
                0.0
            },
        })
        .collect();

    MarksSummary {
        records: scored,
        students: students.len(),
        subjects: subjects.len(),
        mean_percentage: (scored > 0).then(|| total_pct / scored as f64),
        grade_distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark(student_id: i64, subject_id: i64, pct: f64) -> MarkRecord {
        MarkRecord {
            student_id,
            subject_id,
            teacher_id: 1,
            exam_date: None,
            marks_obtained: Some(pct),
            total_marks: Some(100.0),
        }
    }

    #[test]
    fn test_empty_corpus_summary() {
        let summary = summarize(&[]);
        assert_eq!(summary.records, 0);
        assert_eq!(summary.mean_percentage, None);
        assert!(summary.grade_distribution.iter().all(|b| b.count == 0));
    }

    #[test]
    fn test_distribution_uses_the_grade_mapper() {
        let records = vec![
            mark(1, 1, 95.0), // A+
            mark(1, 2, 85.0), // A
            mark(2, 1, 85.0), // A
            mark(2, 2, 40.0), // F
        ];
        let summary = summarize(&records);
        assert_eq!(summary.records, 4);
        assert_eq!(summary.students, 2);
        assert_eq!(summary.subjects, 2);
        assert_eq!(summary.mean_percentage, Some(76.25));

        // listed best grade first
        assert_eq!(summary.grade_distribution[0].grade, Grade::APlus);
        assert_eq!(summary.grade_distribution[0].count, 1);
        let a = &summary.grade_distribution[1];
        assert_eq!(a.grade, Grade::A);
        assert_eq!(a.count, 2);
        assert_eq!(a.share, 0.5);
        assert_eq!(summary.grade_distribution[5].count, 1); // F
    }

    #[test]
    fn test_invalid_records_do_not_count() {
        let mut invalid = mark(1, 1, 50.0);
        invalid.total_marks = Some(0.0);
        let summary = summarize(&[invalid, mark(2, 1, 60.0)]);
        assert_eq!(summary.records, 1);
        assert_eq!(summary.students, 1);
    }
}

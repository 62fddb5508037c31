//! Feature engineering over the mark history.
//!
//! Every derived statistic for a row is computed from records that come
//! strictly before that row, so a row's own score can never leak into the
//! features used to predict it.

use crate::data::MarkRecord;
use chrono::NaiveDate;

/// Names of the numeric feature columns, in matrix order.
pub const NUMERIC_FEATURES: [&str; 4] =
    ["student_overall_avg", "subj_avg", "attempts_subj", "days_since"];

/// Gap assumed when a record has no dated predecessor in its subject.
pub const DEFAULT_GAP_DAYS: f64 = 60.0;

/// One engineered row; pairs with the actual percentage as the target.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    /// Mean of the student's percentages strictly before this record,
    /// across all subjects. Falls back to the global mean on a student's
    /// first-ever attempt.
    pub student_overall_avg: f64,
    /// Mean of the student's percentages in this subject strictly before
    /// this record. Falls back to `student_overall_avg` on the first
    /// attempt in the subject.
    pub subj_avg: f64,
    /// Zero-based count of prior attempts in this subject.
    pub attempts_subj: usize,
    /// Calendar days since the previous attempt in this subject.
    pub days_since: f64,
    pub subject_id: i64,
    pub teacher_id: i64,
}

impl FeatureRow {
    /// The four numeric features, in `NUMERIC_FEATURES` order.
    pub fn numeric(&self) -> [f64; 4] {
        [
            self.student_overall_avg,
            self.subj_avg,
            self.attempts_subj as f64,
            self.days_since,
        ]
    }
}

struct ScoredMark {
    student_id: i64,
    subject_id: i64,
    teacher_id: i64,
    exam_date: Option<NaiveDate>,
    pct: f64,
}

/// Turn the raw history into feature rows aligned 1:1 with a target vector
/// of actual percentages. Pure; invalid records are skipped.
pub fn engineer(records: &[MarkRecord]) -> (Vec<FeatureRow>, Vec<f64>) {
    let mut marks: Vec<ScoredMark> = records
        .iter()
        .filter_map(|r| {
            r.percentage().map(|pct| ScoredMark {
                student_id: r.student_id,
                subject_id: r.subject_id,
                teacher_id: r.teacher_id,
                exam_date: r.exam_date,
                pct,
            })
        })
        .collect();

    if marks.is_empty() {
        return (Vec::new(), Vec::new());
    }

    // Canonical row order: (student, subject, exam date), undated last,
    // ties in input order. Stable sort preserves the tie-break.
    marks.sort_by_key(|m| (m.student_id, m.subject_id, m.exam_date.is_none(), m.exam_date));

    let n = marks.len();
    let global_mean = marks.iter().map(|m| m.pct).sum::<f64>() / n as f64;

    // Per (student, subject): shifted expanding mean, attempt count, and
    // gap to the previous attempt. The canonical order is already
    // date-ascending within each group.
    let mut subj_avg = vec![None; n];
    let mut attempts = vec![0usize; n];
    let mut days_since = vec![None; n];
    let mut group: Option<(i64, i64)> = None;
    let mut sum = 0.0;
    let mut count = 0usize;
    let mut prev_date: Option<NaiveDate> = None;
    for (i, mark) in marks.iter().enumerate() {
        if group != Some((mark.student_id, mark.subject_id)) {
            group = Some((mark.student_id, mark.subject_id));
            sum = 0.0;
            count = 0;
            prev_date = None;
        }
        if count > 0 {
            subj_avg[i] = Some(sum / count as f64);
        }
        attempts[i] = count;
        if let (Some(prev), Some(current)) = (prev_date, mark.exam_date) {
            days_since[i] = Some((current - prev).num_days() as f64);
        }
        sum += mark.pct;
        count += 1;
        prev_date = mark.exam_date;
    }

    // Per student, strictly chronological across subjects: shifted
    // expanding mean of everything the student scored before this record.
    // A record dated later in another subject must not reach earlier rows,
    // so this pass re-orders by date rather than walking the canonical
    // (subject-major) order.
    let mut overall_avg = vec![None; n];
    let mut chron: Vec<usize> = (0..n).collect();
    chron.sort_by_key(|&i| (marks[i].student_id, marks[i].exam_date.is_none(), marks[i].exam_date));
    let mut student: Option<i64> = None;
    let mut sum = 0.0;
    let mut count = 0usize;
    for &i in &chron {
        if student != Some(marks[i].student_id) {
            student = Some(marks[i].student_id);
            sum = 0.0;
            count = 0;
        }
        if count > 0 {
            overall_avg[i] = Some(sum / count as f64);
        }
        sum += marks[i].pct;
        count += 1;
    }

    let mut rows = Vec::with_capacity(n);
    let mut targets = Vec::with_capacity(n);
    for (i, mark) in marks.iter().enumerate() {
        let student_overall_avg = overall_avg[i].unwrap_or(global_mean);
        rows.push(FeatureRow {
            student_overall_avg,
            subj_avg: subj_avg[i].unwrap_or(student_overall_avg),
            attempts_subj: attempts[i],
            days_since: days_since[i].unwrap_or(DEFAULT_GAP_DAYS),
            subject_id: mark.subject_id,
            teacher_id: mark.teacher_id,
        });
        targets.push(mark.pct);
    }

    (rows, targets)
}

//! End-to-end exercises of the prediction pipeline against an in-memory
//! mark source and a throwaway artifact store.

use grade_predictor::forest::ForestConfig;
use grade_predictor::{
    percentage_to_grade, ArtifactStore, Grade, InMemoryMarkSource, MarkRecord, Predictor,
    TrainingConfig,
};

const PHYSICS: i64 = 7;
const CHEMISTRY: i64 = 9;

fn mark(student_id: i64, subject_id: i64, date: &str, obtained: f64, total: f64) -> MarkRecord {
    MarkRecord {
        student_id,
        subject_id,
        teacher_id: subject_id * 10 + 1,
        exam_date: Some(date.parse().unwrap()),
        marks_obtained: Some(obtained),
        total_marks: Some(total),
    }
}

/// A small school: several students with dated histories in two subjects,
/// comfortably above the training row floor.
fn school_corpus() -> Vec<MarkRecord> {
    let mut records = Vec::new();
    // student 1: steadily improving in Physics - the end-to-end scenario
    records.push(mark(1, PHYSICS, "2024-01-10", 60.0, 100.0));
    records.push(mark(1, PHYSICS, "2024-02-10", 70.0, 100.0));
    records.push(mark(1, PHYSICS, "2024-03-10", 80.0, 100.0));
    for student in 2..=5 {
        for subject in [PHYSICS, CHEMISTRY] {
            for (month, score) in [(1, 48.0), (2, 61.0), (3, 74.0)] {
                records.push(mark(
                    student,
                    subject,
                    &format!("2024-0{month}-0{student}"),
                    score + student as f64 * 2.0,
                    100.0,
                ));
            }
        }
    }
    records
}

fn build_predictor(
    records: Vec<MarkRecord>,
    dir: &tempfile::TempDir,
) -> Predictor<InMemoryMarkSource> {
    let config = TrainingConfig {
        forest: ForestConfig {
            n_trees: 30,
            ..ForestConfig::default()
        },
        ..TrainingConfig::default()
    };
    Predictor::with_config(
        InMemoryMarkSource::new(records),
        ArtifactStore::new(dir.path().join("model.bin")),
        config,
    )
}

#[test]
fn improving_student_gets_a_bounded_prediction_and_a_real_grade() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = build_predictor(school_corpus(), &dir);

    assert!(predictor.train_and_save().unwrap());
    let artifact = predictor.load_model().unwrap();
    assert_eq!(artifact.metadata.training_rows, 27);

    let pct = predictor
        .predict_next_percentage(&artifact, 1, PHYSICS)
        .expect("student 1 has three Physics marks");
    assert!(pct.is_finite());
    assert!((0.0..=100.0).contains(&pct));

    let grade = percentage_to_grade(pct);
    assert!(Grade::ALL.contains(&grade));
}

#[test]
fn nineteen_rows_refuse_twenty_train() {
    // 19 single-attempt students: every engineered row survives, so the
    // row count equals the record count
    let dir = tempfile::tempdir().unwrap();
    let records: Vec<MarkRecord> = (1..=19)
        .map(|s| mark(s, PHYSICS, "2024-02-01", 40.0 + s as f64 * 2.0, 100.0))
        .collect();
    let predictor = build_predictor(records.clone(), &dir);

    assert!(!predictor.train_and_save().unwrap());
    assert!(predictor.load_model().is_none());

    // one more record crosses the floor
    let mut enough = records;
    enough.push(mark(20, PHYSICS, "2024-02-01", 77.0, 100.0));
    let predictor = build_predictor(enough, &dir);
    assert!(predictor.train_and_save().unwrap());
    assert!(predictor.load_model().is_some());
}

#[test]
fn invalid_marks_never_reach_the_trainer() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = school_corpus();
    // zero-total and unscored records must be ignored, not crash training
    records.push(MarkRecord {
        student_id: 1,
        subject_id: PHYSICS,
        teacher_id: 71,
        exam_date: Some("2024-04-01".parse().unwrap()),
        marks_obtained: Some(50.0),
        total_marks: Some(0.0),
    });
    records.push(MarkRecord {
        student_id: 1,
        subject_id: PHYSICS,
        teacher_id: 71,
        exam_date: None,
        marks_obtained: None,
        total_marks: Some(100.0),
    });

    let predictor = build_predictor(records, &dir);
    assert!(predictor.train_and_save().unwrap());
    let artifact = predictor.load_model().unwrap();
    assert_eq!(artifact.metadata.training_rows, 27);
}

#[test]
fn prediction_for_unknown_pairs_is_none_with_an_explanation_path() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = build_predictor(school_corpus(), &dir);
    assert!(predictor.train_and_save().unwrap());
    let artifact = predictor.load_model().unwrap();

    // unknown student, and a known student in a subject they never sat
    assert_eq!(predictor.predict_next_percentage(&artifact, 999, PHYSICS), None);
    assert_eq!(predictor.predict_next_percentage(&artifact, 1, CHEMISTRY), None);
}

#[test]
fn retraining_replaces_the_artifact_wholesale() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = build_predictor(school_corpus(), &dir);
    assert!(predictor.train_and_save().unwrap());
    let first = predictor.load_model().unwrap();

    let mut grown = school_corpus();
    grown.push(mark(1, CHEMISTRY, "2024-03-20", 66.0, 100.0));
    let predictor = build_predictor(grown, &dir);
    assert!(predictor.train_and_save().unwrap());
    let second = predictor.load_model().unwrap();

    assert_eq!(second.metadata.training_rows, first.metadata.training_rows + 1);
    assert!(second.metadata.trained_at >= first.metadata.trained_at);
}

#[test]
fn feature_names_line_up_with_the_corpus_categories() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = build_predictor(school_corpus(), &dir);
    assert!(predictor.train_and_save().unwrap());
    let artifact = predictor.load_model().unwrap();

    let names = &artifact.feature_names;
    assert_eq!(&names[..4], &["student_overall_avg", "subj_avg", "attempts_subj", "days_since"]);
    assert!(names.contains(&format!("subject_id={PHYSICS}")));
    assert!(names.contains(&format!("subject_id={CHEMISTRY}")));
    assert!(names.iter().any(|n| n.starts_with("teacher_id=")));
}

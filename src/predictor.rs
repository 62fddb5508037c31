//! Single-point inference for a (student, subject) pair.
//!
//! The predictor reconstructs one feature row for "now" from the student's
//! recent history and runs it through the persisted pipeline. Unlike the
//! training table, which uses shifted expanding means over the whole
//! history, the serving row estimates current form from short tail windows
//! (last 5 overall, last 3 in the subject); the asymmetry is kept as the
//! system has always behaved.

use crate::data::{MarkRecord, MarkSource};
use crate::features::{FeatureRow, DEFAULT_GAP_DAYS};
use crate::model::{train, ArtifactStore, ModelArtifact, StoreError, TrainError, TrainingConfig};
use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

/// Tail window for the student's overall recent form.
pub const OVERALL_FORM_WINDOW: usize = 5;
/// Tail window for the student's recent form in one subject.
pub const SUBJECT_FORM_WINDOW: usize = 3;

/// Owns the mark source, the artifact store, and the training
/// configuration. The artifact itself is always passed explicitly, so a
/// test can inject one that never touched the disk.
pub struct Predictor<S> {
    source: S,
    store: ArtifactStore,
    config: TrainingConfig,
}

impl<S: MarkSource> Predictor<S> {
    pub fn new(source: S, store: ArtifactStore) -> Self {
        Self::with_config(source, store, TrainingConfig::default())
    }

    pub fn with_config(source: S, store: ArtifactStore, config: TrainingConfig) -> Self {
        Self { source, store, config }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Retrain from the full history snapshot and publish the artifact.
    ///
    /// `Ok(false)` means there was not enough data; an unreachable source
    /// degrades to the same outcome. Only artifact-store I/O failures
    /// surface as errors.
    pub fn train_and_save(&self) -> Result<bool, StoreError> {
        let records = match self.source.fetch_all_valid_marks() {
            Ok(records) => records,
            Err(err) => {
                warn!(%err, "mark history unavailable, treating as empty");
                Vec::new()
            }
        };

        let (rows, targets) = crate::features::engineer(&records);
        let artifact = match train(&rows, &targets, &self.config) {
            Ok(artifact) => artifact,
            Err(TrainError::InsufficientData { rows, required }) => {
                warn!(rows, required, "not enough data to train");
                return Ok(false);
            }
        };

        self.store.save(&artifact)?;
        info!(path = %self.store.path().display(), "saved model artifact");
        Ok(true)
    }

    /// Load the persisted artifact, training it lazily if it is missing or
    /// unreadable. `None` means no model can be produced yet.
    pub fn load_model(&self) -> Option<ModelArtifact> {
        match self.store.load() {
            Ok(Some(artifact)) => return Some(artifact),
            Ok(None) => {}
            Err(err) => warn!(%err, "stored model unreadable, retraining"),
        }

        match self.train_and_save() {
            Ok(true) => self.store.load().ok().flatten(),
            Ok(false) => None,
            Err(err) => {
                warn!(%err, "lazy retrain could not persist a model");
                None
            }
        }
    }

    /// Point estimate of the student's next percentage in the subject,
    /// clamped to [0, 100]. `None` when the student has no valid marks at
    /// all or none in this subject.
    pub fn predict_next_percentage(
        &self,
        artifact: &ModelArtifact,
        student_id: i64,
        subject_id: i64,
    ) -> Option<f64> {
        let subject_history = self.history_or_empty(
            self.source.fetch_student_subject_history(student_id, subject_id),
        );
        let student_history = self.history_or_empty(self.source.fetch_student_history(student_id));

        let row = assemble_now_features(
            subject_id,
            &subject_history,
            &student_history,
            Utc::now().date_naive(),
        )?;

        let raw = artifact.pipeline.predict_row(&row);
        Some(raw.clamp(0.0, 100.0))
    }

    fn history_or_empty(
        &self,
        fetched: Result<Vec<MarkRecord>, crate::data::SourceError>,
    ) -> Vec<MarkRecord> {
        fetched.unwrap_or_else(|err| {
            warn!(%err, "history fetch failed, treating as empty");
            Vec::new()
        })
    }
}

/// Build the serving-time feature row. Histories arrive valid-only in
/// ascending date order, undated records last.
fn assemble_now_features(
    subject_id: i64,
    subject_history: &[MarkRecord],
    student_history: &[MarkRecord],
    today: NaiveDate,
) -> Option<FeatureRow> {
    let subject_pcts: Vec<f64> = subject_history.iter().filter_map(|r| r.percentage()).collect();
    let student_pcts: Vec<f64> = student_history.iter().filter_map(|r| r.percentage()).collect();
    if subject_pcts.is_empty() || student_pcts.is_empty() {
        return None;
    }

    let subj_avg = tail_mean(&subject_pcts, SUBJECT_FORM_WINDOW);
    let student_overall_avg = tail_mean(&student_pcts, OVERALL_FORM_WINDOW);

    let latest = subject_history.last()?;
    let days_since = match latest.exam_date {
        Some(last) => ((today - last).num_days().max(1)) as f64,
        None => DEFAULT_GAP_DAYS,
    };

    Some(FeatureRow {
        student_overall_avg,
        subj_avg,
        attempts_subj: subject_pcts.len(),
        days_since,
        subject_id,
        teacher_id: latest.teacher_id,
    })
}

fn tail_mean(values: &[f64], window: usize) -> f64 {
    let tail = &values[values.len().saturating_sub(window)..];
    tail.iter().sum::<f64>() / tail.len() as f64
}

//! Training pipeline and persisted model artifact.
//!
//! Mirrors the serving path exactly: the four numeric features are z-score
//! standardized, the two categorical identifiers are one-hot encoded, and a
//! seeded regression forest fits the encoded matrix. The fitted pipeline,
//! the ordered feature-name list, and the training metrics travel together
//! as one artifact.

use crate::features::{FeatureRow, NUMERIC_FEATURES};
use crate::forest::{ForestConfig, RandomForest};
use chrono::{DateTime, Utc};
use linfa::prelude::*;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Minimum number of feature rows the trainer will accept.
pub const MIN_TRAINING_ROWS: usize = 20;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("not enough data to train: {rows} rows, need at least {required}")]
    InsufficientData { rows: usize, required: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("model artifact i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("model artifact is corrupt: {0}")]
    Corrupt(#[from] bincode::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub min_training_rows: usize,
    pub forest: ForestConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_training_rows: MIN_TRAINING_ROWS,
            forest: ForestConfig::default(),
        }
    }
}

/// Per-column standardization fitted on the numeric block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    fn fit(rows: &[FeatureRow]) -> Self {
        let width = NUMERIC_FEATURES.len();
        let n = rows.len() as f64;
        let mut means = vec![0.0; width];
        let mut stds = vec![0.0; width];
        for row in rows {
            for (j, v) in row.numeric().into_iter().enumerate() {
                means[j] += v;
            }
        }
        for mean in &mut means {
            *mean /= n;
        }
        for row in rows {
            for (j, v) in row.numeric().into_iter().enumerate() {
                let d = v - means[j];
                stds[j] += d * d;
            }
        }
        for std in &mut stds {
            *std = (*std / n).sqrt();
            // a constant column scales by 1 instead of dividing by zero
            if *std == 0.0 {
                *std = 1.0;
            }
        }
        Self { means, stds }
    }

    fn transform(&self, j: usize, value: f64) -> f64 {
        (value - self.means[j]) / self.stds[j]
    }
}

/// Sorted category vocabulary collected at fit time. Unknown values encode
/// to all zeros rather than failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CategoryMap {
    categories: Vec<i64>,
}

impl CategoryMap {
    fn fit(values: impl Iterator<Item = i64>) -> Self {
        let mut categories: Vec<i64> = values.collect();
        categories.sort_unstable();
        categories.dedup();
        Self { categories }
    }

    fn width(&self) -> usize {
        self.categories.len()
    }

    fn encode_into(&self, value: i64, out: &mut Vec<f64>) {
        let hit = self.categories.binary_search(&value).ok();
        for pos in 0..self.categories.len() {
            out.push(if hit == Some(pos) { 1.0 } else { 0.0 });
        }
    }
}

/// Fitted scaling and encoding, applied identically at train and serve
/// time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Preprocessor {
    scaler: StandardScaler,
    subjects: CategoryMap,
    teachers: CategoryMap,
}

impl Preprocessor {
    fn fit(rows: &[FeatureRow]) -> Self {
        Self {
            scaler: StandardScaler::fit(rows),
            subjects: CategoryMap::fit(rows.iter().map(|r| r.subject_id)),
            teachers: CategoryMap::fit(rows.iter().map(|r| r.teacher_id)),
        }
    }

    fn encode_row(&self, row: &FeatureRow) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.encoded_width());
        for (j, v) in row.numeric().into_iter().enumerate() {
            out.push(self.scaler.transform(j, v));
        }
        self.subjects.encode_into(row.subject_id, &mut out);
        self.teachers.encode_into(row.teacher_id, &mut out);
        out
    }

    fn encode_matrix(&self, rows: &[FeatureRow]) -> Array2<f64> {
        let mut x = Array2::zeros((rows.len(), self.encoded_width()));
        for (i, row) in rows.iter().enumerate() {
            for (j, v) in self.encode_row(row).into_iter().enumerate() {
                x[[i, j]] = v;
            }
        }
        x
    }

    fn encoded_width(&self) -> usize {
        NUMERIC_FEATURES.len() + self.subjects.width() + self.teachers.width()
    }

    fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = NUMERIC_FEATURES.iter().map(|s| s.to_string()).collect();
        names.extend(self.subjects.categories.iter().map(|id| format!("subject_id={id}")));
        names.extend(self.teachers.categories.iter().map(|id| format!("teacher_id={id}")));
        names
    }
}

/// Fitted preprocessing plus the forest, serialized as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    preprocessor: Preprocessor,
    forest: RandomForest,
}

impl Pipeline {
    /// Predict one engineered row. The raw output is unbounded; the caller
    /// decides whether to clamp.
    pub fn predict_row(&self, row: &FeatureRow) -> f64 {
        let encoded = Array1::from_vec(self.preprocessor.encode_row(row));
        self.forest.predict_row(encoded.view())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub trained_at: DateTime<Utc>,
    pub training_rows: usize,
    pub tree_count: usize,
    /// Training-set fit metrics; descriptive, not a validation score.
    pub r2: f64,
    pub mae: f64,
}

/// Fitted pipeline plus the exact feature layout it was fitted with.
/// Produced wholesale by [`train`]; never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub pipeline: Pipeline,
    pub feature_names: Vec<String>,
    pub metadata: ArtifactMetadata,
}

/// Fit the full pipeline on the engineered table.
///
/// Refuses with [`TrainError::InsufficientData`] below the configured row
/// floor; that is a reportable condition, not a crash.
pub fn train(
    rows: &[FeatureRow],
    targets: &[f64],
    config: &TrainingConfig,
) -> Result<ModelArtifact, TrainError> {
    if rows.len() < config.min_training_rows {
        return Err(TrainError::InsufficientData {
            rows: rows.len(),
            required: config.min_training_rows,
        });
    }

    let preprocessor = Preprocessor::fit(rows);
    let x = preprocessor.encode_matrix(rows);
    let dataset = Dataset::new(x, Array1::from_vec(targets.to_vec()));
    let forest = RandomForest::fit(&dataset, &config.forest);
    let pipeline = Pipeline { preprocessor, forest };

    let predicted = pipeline.forest.predict(dataset.records());
    let r2 = predicted.r2(&dataset).unwrap_or(f64::NAN);
    let mae = predicted.mean_absolute_error(&dataset).unwrap_or(f64::NAN);
    tracing::info!(
        rows = rows.len(),
        trees = pipeline.forest.tree_count(),
        r2,
        mae,
        "fitted prediction pipeline"
    );

    let feature_names = pipeline.preprocessor.feature_names();
    let metadata = ArtifactMetadata {
        trained_at: Utc::now(),
        training_rows: rows.len(),
        tree_count: pipeline.forest.tree_count(),
        r2,
        mae,
    };

    Ok(ModelArtifact {
        pipeline,
        feature_names,
        metadata,
    })
}

/// On-disk home of the serialized artifact.
///
/// Saving writes a sibling temp file and renames it over the target, so a
/// concurrent reader sees either the old artifact or the new one, never a
/// mix. An absent file simply means "not yet trained".
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    path: PathBuf,
}

impl ArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("models/grade_predictor.bin")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, artifact: &ModelArtifact) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let bytes = bincode::serialize(artifact)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// `Ok(None)` when no artifact has been published yet; `Corrupt` when
    /// the blob exists but cannot be decoded.
    pub fn load(&self) -> Result<Option<ModelArtifact>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(bincode::deserialize(&bytes)?))
    }
}

//! Next-exam percentage prediction over student mark histories.
//!
//! The pipeline engineers leakage-safe features from each student's past
//! marks, fits a seeded regression forest, and serves single-point
//! predictions per (student, subject) pair together with a letter grade.
//! The surrounding application supplies raw marks through [`MarkSource`]
//! and consumes the four operations re-exported below.

pub mod analytics;
pub mod data;
pub mod features;
pub mod forest;
pub mod grades;
pub mod model;
pub mod predictor;

pub use data::{CsvMarkSource, InMemoryMarkSource, MarkRecord, MarkSource, SourceError};
pub use grades::{percentage_to_grade, Grade};
pub use model::{train, ArtifactStore, ModelArtifact, StoreError, TrainError, TrainingConfig};
pub use predictor::Predictor;

//! Simulation, evaluation and summarization engines.

pub mod ai;
pub mod alerts;
pub mod data;
pub mod history;
pub mod severity;
pub mod summarizer;
pub mod vitals;

pub use alerts::AlertEngine;
pub use data::{RawVitals, VitalsReading};
pub use history::{ClinicalHistory, LocalHistory};
pub use severity::classify;
pub use summarizer::SummaryService;
pub use vitals::VitalsSimulator;

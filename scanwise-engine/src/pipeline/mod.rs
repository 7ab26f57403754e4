//! The staged product analysis pipeline
//!
//! `runner` drives the stages, `state` owns the per-run reducer, `persister`
//! writes the one durable record, `recommendations` handles the independent
//! safer-alternative fetch, and `restore` rebuilds reports from history.

pub mod persister;
pub mod recommendations;
pub mod restore;
pub mod runner;
pub mod state;

pub use persister::ResultPersister;
pub use recommendations::RecommendationFetcher;
pub use restore::{snapshot_from_record, view_model_from_record};
pub use runner::{Collaborators, PipelineConfig, RunHandle, StageRunner};
pub use state::{ScanReducer, ScanSnapshot, StageUpdate};

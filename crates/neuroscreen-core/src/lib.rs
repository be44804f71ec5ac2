//! neuroscreen-core: assessment scoring and risk pipeline.
//!
//! This crate defines the data model, collaborator traits and the
//! start/record/score/predict/profile pipeline that the rest of neuroscreen
//! builds on.

pub mod bank;
pub mod difficulty;
pub mod engine;
pub mod error;
pub mod generation;
pub mod model;
pub mod parser;
pub mod predictor;
pub mod profile;
pub mod recorder;
pub mod scoring;
pub mod store;
pub mod submission;
pub mod traits;
